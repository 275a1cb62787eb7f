use http::{HeaderMap, header::AUTHORIZATION};
use keygate_tonic_core::{
    Error, Subject,
    keygate::{TokenCodec, TokenError},
};

pub(crate) const MISSING_TOKEN: &str = "authorization token is not provided";

/// Validates the `authorization` header of protected calls.
///
/// The header carries either the raw token or `Bearer <token>`.
#[derive(Clone, Debug)]
pub struct AuthGate {
    codec: TokenCodec,
}

impl AuthGate {
    pub fn new(codec: TokenCodec) -> Self {
        Self { codec }
    }

    pub fn authenticate(&self, headers: &HeaderMap) -> Result<Subject, Error> {
        let missing = || Error::Unauthenticated {
            reason: MISSING_TOKEN.to_owned(),
        };

        let value = headers.get(AUTHORIZATION).ok_or_else(missing)?;
        let raw = value.to_str().map_err(|_| TokenError::Malformed)?;
        let token = raw.strip_prefix("Bearer ").unwrap_or(raw).trim();
        if token.is_empty() {
            return Err(missing());
        }

        let claim = self.codec.validate(token)?;
        Ok(Subject::new(claim.subject()))
    }
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;
    use tonic::{Code, Status};

    use super::*;

    const SECRET: &[u8] = b"gate-secret";

    fn gate() -> AuthGate {
        AuthGate::new(TokenCodec::new(SECRET))
    }

    fn headers(value: &str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        map
    }

    fn rejection(result: Result<Subject, Error>) -> Status {
        result.unwrap_err().into()
    }

    #[test]
    fn accepts_raw_and_bearer_tokens() {
        let token = TokenCodec::new(SECRET).issue("alice").unwrap();

        let raw = gate().authenticate(&headers(&token)).unwrap();
        assert_eq!(raw.as_str(), "alice");

        let bearer = gate()
            .authenticate(&headers(&format!("Bearer {token}")))
            .unwrap();
        assert_eq!(bearer, raw);
    }

    #[test]
    fn missing_header_is_unauthenticated() {
        let status = rejection(gate().authenticate(&HeaderMap::new()));
        assert_eq!(status.code(), Code::Unauthenticated);
        assert_eq!(status.message(), MISSING_TOKEN);

        let status = rejection(gate().authenticate(&headers("Bearer ")));
        assert_eq!(status.message(), MISSING_TOKEN);
    }

    #[test]
    fn bad_tokens_report_the_reason() {
        let status = rejection(gate().authenticate(&headers("not-a-token")));
        assert_eq!(status.code(), Code::Unauthenticated);
        assert!(status.message().starts_with("invalid token: "));

        let foreign = TokenCodec::new(b"someone-else").issue("mallory").unwrap();
        let status = rejection(gate().authenticate(&headers(&foreign)));
        assert_eq!(status.code(), Code::Unauthenticated);
        assert!(status.message().starts_with("invalid token: "));
    }
}
