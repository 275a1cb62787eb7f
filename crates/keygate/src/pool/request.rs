use core::time::Duration;

use tokio::sync::oneshot;

use crate::{CacheKey, Error, Result};

/// One cache entry to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheWrite {
    pub key: CacheKey,
    pub value: String,
}

impl CacheWrite {
    pub fn new(key: CacheKey, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }
}

/// How a submitted write ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// Every attempt failed.
    Failed { attempts: u32 },
    /// The pool shut down before the write landed.
    Cancelled,
}

/// Messages understood by a cache write worker.
pub(crate) enum WriteRequest {
    Write {
        write: CacheWrite,
        done: oneshot::Sender<WriteOutcome>,
    },
    Shutdown {
        response: oneshot::Sender<()>,
    },
}

/// Completion handle for a submitted write.
///
/// Dropping the ticket does not cancel the write.
#[derive(Debug)]
pub struct WriteTicket {
    rx: oneshot::Receiver<WriteOutcome>,
}

impl WriteTicket {
    pub(crate) const fn new(rx: oneshot::Receiver<WriteOutcome>) -> Self {
        Self { rx }
    }

    /// Waits for the write to finish.
    ///
    /// # Errors
    /// [`Error::WriterClosed`] if the worker went away without reporting.
    pub async fn outcome(self) -> Result<WriteOutcome> {
        self.rx.await.map_err(|_| Error::WriterClosed)
    }

    /// Waits up to `limit` for the write to finish.
    ///
    /// # Errors
    /// [`Error::WriteTimeout`] when `limit` elapses first, or
    /// [`Error::WriterClosed`] if the worker went away without reporting.
    pub async fn wait(self, limit: Duration) -> Result<WriteOutcome> {
        tokio::time::timeout(limit, self.outcome())
            .await
            .map_err(|_| Error::WriteTimeout(limit))?
    }
}
