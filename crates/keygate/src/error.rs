use core::time::Duration;

use crate::TokenError;

/// A specialized `Result` for identity operations.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All failures an identity operation can surface.
///
/// Validation and credential failures are never retried. Store failures are
/// retried by [`Resilient`] and only reach callers as
/// [`Error::StoreUnavailable`] once the attempt budget is spent.
///
/// [`Resilient`]: crate::Resilient
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("{0}")]
    InvalidArgument(&'static str),

    #[error("invalid token: {0}")]
    Unauthenticated(#[from] TokenError),

    #[error("password is incorrect")]
    PermissionDenied,

    #[error("{operation} failed after {attempts} attempt(s)")]
    StoreUnavailable {
        operation: &'static str,
        attempts: u32,
        #[source]
        source: StoreError,
    },

    #[error("failed to sign token: {0}")]
    Signing(String),

    #[error("node id {node_id} exceeds the maximum of {max}")]
    InvalidNodeId { node_id: u64, max: u64 },

    #[error("operation cancelled")]
    Cancelled,

    #[error("cache writer is closed")]
    WriterClosed,

    #[error("cache write did not complete within {0:?}")]
    WriteTimeout(Duration),
}

/// Failure reported by a backing store adapter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn backend(err: impl core::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }
}
