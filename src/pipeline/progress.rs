use std::sync::atomic::{AtomicU64, Ordering};

/// Receives work-size and completion notifications from the pipeline.
///
/// `increase` grows the known total as work is discovered, `advance` marks
/// finished units. Both are called concurrently from worker tasks.
pub trait Progress: Send + Sync {
    fn increase(&self, n: u64);
    fn advance(&self, n: u64);
}

/// Discards every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn increase(&self, _n: u64) {}
    fn advance(&self, _n: u64) {}
}

/// Keeps running totals in atomics.
#[derive(Debug, Default)]
pub struct CountingProgress {
    total: AtomicU64,
    done: AtomicU64,
}

impl CountingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn done(&self) -> u64 {
        self.done.load(Ordering::Relaxed)
    }
}

impl Progress for CountingProgress {
    fn increase(&self, n: u64) {
        self.total.fetch_add(n, Ordering::Relaxed);
    }

    fn advance(&self, n: u64) {
        self.done.fetch_add(n, Ordering::Relaxed);
    }
}
