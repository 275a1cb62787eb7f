use core::time::Duration;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use tokio::{
    sync::{mpsc, oneshot},
    time::{sleep, timeout},
};
use tokio_util::sync::CancellationToken;

use crate::{
    CacheStore, Error, Resilient, Result, SleepProvider,
    pool::{CacheWrite, WriteRequest, WriteTicket, worker::worker_loop},
};

/// Sizing and shutdown behaviour of a [`CacheWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheWriterConfig {
    pub workers: usize,
    /// Capacity of each worker's queue.
    pub queue_capacity: usize,
    /// How long [`CacheWriter::shutdown`] waits for queued writes to land
    /// before cancelling them.
    pub drain_timeout: Duration,
}

impl Default for CacheWriterConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1024,
            drain_timeout: Duration::from_secs(3),
        }
    }
}

/// A cooperative pool of cache write workers.
///
/// Writes are distributed round-robin over per-worker bounded channels.
/// [`CacheWriter::submit`] waits for queue capacity, which is the only
/// backpressure a caller ever feels from the cache.
pub struct CacheWriter {
    workers: Vec<mpsc::Sender<WriteRequest>>,
    next_worker: AtomicUsize,
    pending: Arc<AtomicUsize>,
    accepting: AtomicBool,
    shutdown_token: CancellationToken,
    drain_timeout: Duration,
}

impl CacheWriter {
    /// Spawns the worker tasks on the current Tokio runtime.
    pub fn spawn<C, S>(store: Arc<C>, resilient: Resilient<S>, config: CacheWriterConfig) -> Self
    where
        C: CacheStore,
        S: SleepProvider + Clone + 'static,
    {
        let shutdown_token = CancellationToken::new();
        let pending = Arc::new(AtomicUsize::new(0));
        let worker_count = config.workers.max(1);
        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
            tokio::spawn(worker_loop(
                worker_id,
                rx,
                Arc::clone(&store),
                resilient.clone(),
                Arc::clone(&pending),
                shutdown_token.clone(),
            ));
            workers.push(tx);
        }

        tracing::debug!(
            workers = worker_count,
            queue_capacity = config.queue_capacity,
            "cache writer started"
        );

        Self {
            workers,
            next_worker: AtomicUsize::new(0),
            pending,
            accepting: AtomicBool::new(true),
            shutdown_token,
            drain_timeout: config.drain_timeout,
        }
    }

    /// Returns the index of the next worker to receive work (round-robin).
    fn next_worker_index(&self) -> usize {
        self.next_worker.fetch_add(1, Ordering::Relaxed) % self.workers.len()
    }

    /// Writes submitted but not yet finished.
    pub fn queue_depth(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire) && !self.shutdown_token.is_cancelled()
    }

    /// Queues a write on the next worker, waiting for capacity if its queue is
    /// full.
    ///
    /// # Errors
    /// [`Error::WriterClosed`] once shutdown has begun or if the worker is
    /// gone.
    pub async fn submit(&self, write: CacheWrite) -> Result<WriteTicket> {
        if !self.is_accepting() {
            return Err(Error::WriterClosed);
        }

        let (done, rx) = oneshot::channel();
        let worker_idx = self.next_worker_index();

        self.pending.fetch_add(1, Ordering::AcqRel);
        if self.workers[worker_idx]
            .send(WriteRequest::Write { write, done })
            .await
            .is_err()
        {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            tracing::error!(worker_idx, "cache write worker channel closed");
            return Err(Error::WriterClosed);
        }

        Ok(WriteTicket::new(rx))
    }

    /// Gracefully shuts down all workers.
    ///
    /// - Refuses new writes.
    /// - Waits up to the drain timeout for queued writes to land.
    /// - Cancels whatever is still retrying.
    /// - Sends [`WriteRequest::Shutdown`] to each worker and waits up to 3
    ///   seconds for acknowledgements.
    pub async fn shutdown(&self) {
        // === Phase 0: Stop accepting new writes ===
        tracing::info!("Refusing new cache writes");
        self.accepting.store(false, Ordering::Release);

        // === Phase 1: Wait for queued writes to drain ===
        tracing::info!(pending = self.queue_depth(), "Draining cache writes");
        let drained = timeout(self.drain_timeout, async {
            while self.queue_depth() > 0 {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await;

        match drained {
            Ok(()) => tracing::debug!("All cache writes drained"),
            Err(_) => tracing::warn!(
                pending = self.queue_depth(),
                "Cache write drain timed out"
            ),
        }

        // === Phase 2: Cancel any remaining work ===
        tracing::debug!("Cancelling remaining cache writes");
        self.shutdown_token.cancel();

        // === Phase 3: Notify workers to shut down ===
        let mut acks = Vec::with_capacity(self.workers.len());
        for (i, worker) in self.workers.iter().enumerate() {
            let (tx, rx) = oneshot::channel();
            if let Err(e) = worker.send(WriteRequest::Shutdown { response: tx }).await {
                tracing::error!("Failed to send shutdown to cache worker {i}: {e}");
            } else {
                acks.push((i, rx));
            }
        }

        let ack_futures = acks.into_iter().map(|(i, rx)| async move {
            match timeout(Duration::from_secs(3), rx).await {
                Ok(Ok(())) => tracing::trace!("Cache worker {i} shutdown acknowledged"),
                Ok(Err(e)) => tracing::error!("Cache worker {i} returned error: {e}"),
                Err(_) => tracing::warn!("Cache worker {i} shutdown timed out"),
            }
        });
        futures::future::join_all(ack_futures).await;

        tracing::info!("Cache writer shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use super::*;
    use crate::{
        CacheKey, RetryPolicy, StoreError, WriteOutcome, sleep::RecordingSleep,
        store::memory::MemoryCacheStore,
    };

    /// Accepts writes and never finishes them.
    struct StalledCache;

    impl CacheStore for StalledCache {
        async fn get(&self, _key: &CacheKey) -> Result<Option<String>, StoreError> {
            Ok(None)
        }

        async fn set(&self, _key: &CacheKey, _value: &str) -> Result<(), StoreError> {
            std::future::pending().await
        }
    }

    fn writer(store: &Arc<MemoryCacheStore>, sleeper: RecordingSleep) -> CacheWriter {
        CacheWriter::spawn(
            Arc::clone(store),
            Resilient::new(sleeper),
            CacheWriterConfig {
                workers: 2,
                queue_capacity: 8,
                drain_timeout: Duration::from_secs(1),
            },
        )
    }

    #[tokio::test]
    async fn submitted_write_lands() {
        let store = Arc::new(MemoryCacheStore::default());
        let writer = writer(&store, RecordingSleep::default());

        let ticket = writer
            .submit(CacheWrite::new(CacheKey::login("alice"), "hash"))
            .await
            .unwrap();

        assert_eq!(
            ticket.wait(Duration::from_secs(1)).await.unwrap(),
            WriteOutcome::Written
        );
        assert_eq!(store.entry(&CacheKey::login("alice")).as_deref(), Some("hash"));
        assert_eq!(writer.queue_depth(), 0);
    }

    #[tokio::test]
    async fn transient_failures_are_retried_with_cache_policy() {
        let store = Arc::new(MemoryCacheStore {
            set_failures: AtomicU32::new(4),
            ..MemoryCacheStore::default()
        });
        let sleeper = RecordingSleep::default();
        let writer = writer(&store, sleeper.clone());

        let outcome = writer
            .submit(CacheWrite::new(CacheKey::registration("bob"), "42"))
            .await
            .unwrap()
            .outcome()
            .await
            .unwrap();

        assert_eq!(outcome, WriteOutcome::Written);
        assert_eq!(sleeper.delays_ms(), vec![2, 4, 8, 16]);
    }

    #[tokio::test]
    async fn persistent_failure_reports_attempts() {
        let store = Arc::new(MemoryCacheStore {
            set_failures: AtomicU32::new(u32::MAX),
            ..MemoryCacheStore::default()
        });
        let writer = writer(&store, RecordingSleep::default());

        let outcome = writer
            .submit(CacheWrite::new(CacheKey::login("carol"), "h"))
            .await
            .unwrap()
            .outcome()
            .await
            .unwrap();

        assert_eq!(
            outcome,
            WriteOutcome::Failed {
                attempts: RetryPolicy::CACHE.max_attempts
            }
        );
        assert!(store.entry(&CacheKey::login("carol")).is_none());
    }

    #[tokio::test]
    async fn shutdown_drains_then_refuses() {
        let store = Arc::new(MemoryCacheStore::default());
        let writer = writer(&store, RecordingSleep::default());

        let mut tickets = Vec::new();
        for i in 0..10 {
            let key = CacheKey::registration(&format!("user-{i}"));
            tickets.push(writer.submit(CacheWrite::new(key, i.to_string())).await.unwrap());
        }

        writer.shutdown().await;

        assert_eq!(writer.queue_depth(), 0);
        assert!(!writer.is_accepting());
        for ticket in tickets {
            assert_eq!(ticket.outcome().await.unwrap(), WriteOutcome::Written);
        }
        assert!(matches!(
            writer
                .submit(CacheWrite::new(CacheKey::login("late"), "h"))
                .await,
            Err(Error::WriterClosed)
        ));
    }

    #[tokio::test]
    async fn wait_gives_up_on_a_stalled_write() {
        let writer = CacheWriter::spawn(
            Arc::new(StalledCache),
            Resilient::new(RecordingSleep::default()),
            CacheWriterConfig {
                workers: 1,
                queue_capacity: 8,
                drain_timeout: Duration::from_millis(10),
            },
        );

        let ticket = writer
            .submit(CacheWrite::new(CacheKey::login("dave"), "hash"))
            .await
            .unwrap();

        let limit = Duration::from_millis(10);
        assert!(matches!(
            ticket.wait(limit).await,
            Err(Error::WriteTimeout(waited)) if waited == limit
        ));
        assert_eq!(writer.queue_depth(), 1);
    }
}
