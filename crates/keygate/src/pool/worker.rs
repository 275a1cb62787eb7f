use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    CacheStore, Resilient, RetryError, RetryPolicy, SleepProvider,
    pool::{WriteOutcome, WriteRequest},
};

/// Worker task applying queued cache writes until told to stop.
///
/// Writes are attempted under [`RetryPolicy::CACHE`]. Retries are bound to
/// the pool's `shutdown_token`, not to the request that produced the write,
/// so a write outlives its originating call but not the pool.
pub(crate) async fn worker_loop<C, S>(
    worker_id: usize,
    mut rx: mpsc::Receiver<WriteRequest>,
    store: Arc<C>,
    resilient: Resilient<S>,
    pending: Arc<AtomicUsize>,
    shutdown_token: CancellationToken,
) where
    C: CacheStore,
    S: SleepProvider,
{
    tracing::trace!(worker_id, "cache write worker started");

    while let Some(request) = rx.recv().await {
        match request {
            WriteRequest::Write { write, done } => {
                let store = &*store;
                let key = &write.key;
                let value = write.value.as_str();

                let outcome = match resilient
                    .run_cancellable("write cache entry", RetryPolicy::CACHE, &shutdown_token, move || {
                        store.set(key, value)
                    })
                    .await
                {
                    Ok(()) => {
                        tracing::trace!(worker_id, key = %write.key, "cache entry written");
                        WriteOutcome::Written
                    }
                    Err(RetryError::Exhausted {
                        attempts,
                        last_error,
                        ..
                    }) => {
                        tracing::error!(
                            worker_id,
                            key = %write.key,
                            attempts,
                            error = %last_error,
                            "cache write failed"
                        );
                        WriteOutcome::Failed { attempts }
                    }
                    Err(RetryError::Cancelled { attempts, .. }) => {
                        tracing::warn!(worker_id, key = %write.key, attempts, "cache write cancelled");
                        WriteOutcome::Cancelled
                    }
                };

                pending.fetch_sub(1, Ordering::AcqRel);
                // The submitter may have dropped its ticket.
                let _ = done.send(outcome);
            }
            WriteRequest::Shutdown { response } => {
                tracing::debug!(worker_id, "cache write worker received shutdown signal");
                if response.send(()).is_err() {
                    tracing::error!(worker_id, "cache write worker failed to acknowledge shutdown");
                }
                cancel_queued(worker_id, &mut rx, &pending);
                break;
            }
        }
    }

    tracing::trace!(worker_id, "cache write worker stopped");
}

/// Closes the queue and resolves everything still in it as cancelled, so a
/// write that raced with shutdown is neither lost nor left counted as pending.
fn cancel_queued(
    worker_id: usize,
    rx: &mut mpsc::Receiver<WriteRequest>,
    pending: &AtomicUsize,
) {
    rx.close();
    let mut cancelled = 0usize;
    while let Ok(request) = rx.try_recv() {
        match request {
            WriteRequest::Write { done, .. } => {
                pending.fetch_sub(1, Ordering::AcqRel);
                let _ = done.send(WriteOutcome::Cancelled);
                cancelled += 1;
            }
            WriteRequest::Shutdown { response } => {
                let _ = response.send(());
            }
        }
    }
    if cancelled > 0 {
        tracing::warn!(worker_id, cancelled, "cache writes queued after shutdown were cancelled");
    }
}
