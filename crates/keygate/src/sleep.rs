use core::time::Duration;

/// Abstracts over how an async task waits out a backoff delay.
///
/// Retry loops are generic over this so tests can record the requested delays
/// instead of waiting for them.
pub trait SleepProvider: Send + Sync {
    fn sleep_for(&self, dur: Duration) -> impl Future<Output = ()> + Send;
}

/// A [`SleepProvider`] backed by Tokio's timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleep;

impl SleepProvider for TokioSleep {
    async fn sleep_for(&self, dur: Duration) {
        tokio::time::sleep(dur).await;
    }
}

#[cfg(test)]
pub(crate) use recording::RecordingSleep;
