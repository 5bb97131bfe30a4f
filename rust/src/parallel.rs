//! Bounded worker pools and cooperative cancellation for the parallel passes.

use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag a caller flips to abort a run between iterations or components.
///
/// Passes only poll it at their own granularity, so an abort never leaves a
/// half-computed pass behind.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Build a rayon pool bounded by `max_workers` (0 = rayon's default size).
pub fn build_pool(max_workers: usize) -> Result<ThreadPool, String> {
    let mut builder = ThreadPoolBuilder::new();
    if max_workers > 0 {
        builder = builder.num_threads(max_workers);
    }
    builder.build().map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_shared_between_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_pool_respects_worker_bound() {
        let pool = build_pool(2).unwrap();
        assert_eq!(pool.current_num_threads(), 2);
        assert_eq!(pool.install(|| rayon::current_num_threads()), 2);
    }
}
