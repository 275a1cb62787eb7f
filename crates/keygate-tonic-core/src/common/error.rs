//! Error types for the identity gateway.
//!
//! This module defines the transport-facing `Error` enum and implements
//! `From<Error>` for `tonic::Status`, so handlers can return `?`-propagated
//! failures and clients receive a status code plus a short message.
//!
//! ## Error Cases
//! - `Identity`: a failure surfaced by the [`keygate`] identity operations.
//! - `Unauthenticated`: the auth gate rejected the call before any handler
//!   ran.
//! - `FileTransfer`: a file could not be opened, read or streamed.
//! - `ServiceShutdown`: a request arrived while the service was shutting
//!   down.
//!
//! Store exhaustion is reported as `Internal` with a message naming the
//! operation only. Backend detail stays in the server logs.

use tonic::Status;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the gRPC surface.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Identity(#[from] keygate::Error),

    /// Missing or invalid bearer token.
    #[error("{reason}")]
    Unauthenticated { reason: String },

    #[error("{context}")]
    FileTransfer { context: String },

    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl From<keygate::TokenError> for Error {
    fn from(err: keygate::TokenError) -> Self {
        Self::Identity(keygate::Error::Unauthenticated(err))
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::Identity(e) => identity_status(e),
            Error::Unauthenticated { reason } => Status::unauthenticated(reason),
            Error::FileTransfer { context } => Status::internal(context),
            Error::ServiceShutdown => Status::unavailable("Service is shutting down"),
        }
    }
}

fn identity_status(err: keygate::Error) -> Status {
    use keygate::Error as E;

    match err {
        E::InvalidArgument(reason) => Status::invalid_argument(reason),
        E::Unauthenticated(e) => Status::unauthenticated(format!("invalid token: {e}")),
        E::PermissionDenied => Status::permission_denied("password is incorrect"),
        E::StoreUnavailable { operation, .. } => Status::internal(format!("failed to {operation}")),
        E::Signing(_) => Status::internal("failed to generate jwt"),
        E::Cancelled => Status::cancelled("Request was cancelled"),
        E::WriterClosed => Status::unavailable("Service is shutting down"),
        other => Status::internal(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use keygate::{StoreError, TokenError};
    use tonic::Code;

    use super::*;

    fn status(err: impl Into<Error>) -> Status {
        let err: Error = err.into();
        err.into()
    }

    #[test]
    fn validation_errors_are_invalid_argument() {
        let s = status(keygate::Error::InvalidArgument(
            "username and password cannot be empty",
        ));
        assert_eq!(s.code(), Code::InvalidArgument);
        assert_eq!(s.message(), "username and password cannot be empty");
    }

    #[test]
    fn token_errors_are_unauthenticated_with_reason() {
        let s = status(TokenError::Expired);
        assert_eq!(s.code(), Code::Unauthenticated);
        assert_eq!(s.message(), "invalid token: token has expired");

        let s = status(Error::Unauthenticated {
            reason: "authorization token is not provided".into(),
        });
        assert_eq!(s.code(), Code::Unauthenticated);
    }

    #[test]
    fn password_mismatch_is_permission_denied() {
        let s = status(keygate::Error::PermissionDenied);
        assert_eq!(s.code(), Code::PermissionDenied);
        assert_eq!(s.message(), "password is incorrect");
    }

    #[test]
    fn store_exhaustion_hides_backend_detail() {
        let s = status(keygate::Error::StoreUnavailable {
            operation: "register user",
            attempts: 3,
            source: StoreError::Backend("connection refused to 10.0.0.7:5432".into()),
        });
        assert_eq!(s.code(), Code::Internal);
        assert_eq!(s.message(), "failed to register user");
    }

    #[test]
    fn signing_and_file_failures_are_internal() {
        let s = status(keygate::Error::Signing("bad key".into()));
        assert_eq!(s.code(), Code::Internal);
        assert_eq!(s.message(), "failed to generate jwt");

        let s = status(Error::FileTransfer {
            context: "failed to open file: No such file or directory".into(),
        });
        assert_eq!(s.code(), Code::Internal);
        assert!(s.message().starts_with("failed to open file"));
    }
}
