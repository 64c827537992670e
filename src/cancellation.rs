use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A clonable, process-local cancellation flag.
///
/// Blocking queue operations poll the caller's token on every loop iteration
/// and immediately before sleeping on the coupling semaphore, so cancellation
/// latency is bounded by the longest timed wait (10 ms). Cancellation is
/// reported as [`QueueError::Cancelled`](crate::QueueError::Cancelled), never
/// as an empty result.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trips the token. Every clone observes the cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
