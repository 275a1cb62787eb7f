use core::fmt;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Lifetime of an issued token.
pub const TOKEN_TTL_HOURS: i64 = 24;

/// Claim set carried by every bearer token.
///
/// All temporal fields are Unix timestamps in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaim {
    /// The authenticated subject (the account's username).
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub nbf: i64,
}

impl IdentityClaim {
    pub fn subject(&self) -> &str {
        &self.sub
    }
}

/// Why a presented token was rejected.
///
/// Callers outside the service see every variant as "unauthenticated"; the
/// distinction exists for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token has expired")]
    Expired,
    #[error("token is not valid yet")]
    NotYetValid,
    #[error("token signature mismatch")]
    SignatureMismatch,
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::ImmatureSignature => Self::NotYetValid,
            ErrorKind::InvalidSignature => Self::SignatureMismatch,
            _ => Self::Malformed,
        }
    }
}

/// Issues and validates HS256 bearer tokens with a shared secret.
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("secret", &"<redacted>")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl TokenCodec {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&["exp", "nbf", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl: Duration::hours(TOKEN_TTL_HOURS),
        }
    }

    /// Issues a token for `subject` valid from now for [`TOKEN_TTL_HOURS`].
    pub fn issue(&self, subject: &str) -> Result<String> {
        self.issue_at(subject, Utc::now())
    }

    /// Issues a token as if the current time were `now`.
    pub fn issue_at(&self, subject: &str, now: DateTime<Utc>) -> Result<String> {
        let claim = IdentityClaim {
            sub: subject.to_owned(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
            nbf: now.timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claim, &self.encoding)
            .map_err(|e| Error::Signing(e.to_string()))
    }

    /// Validates signature and temporal fields against the current time.
    pub fn validate(&self, token: &str) -> core::result::Result<IdentityClaim, TokenError> {
        let data = decode::<IdentityClaim>(token, &self.decoding, &self.validation)?;
        Ok(data.claims)
    }
}
