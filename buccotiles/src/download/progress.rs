//! Byte-level progress reporting for transfers.
//!
//! The library only reports numbers; the CLI decides how to draw them.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Creates a progress tracker for each transfer.
pub trait ProgressReporter: Send + Sync {
    /// A transfer named `label` of `total_bytes` starts (0 when unknown).
    fn start(&self, label: &str, total_bytes: u64) -> Box<dyn TransferProgress>;
}

/// Progress of a single transfer.
pub trait TransferProgress: Send {
    /// `bytes` more bytes were written.
    fn advance(&mut self, bytes: u64);

    /// The transfer is complete.
    fn finish(&mut self);
}

/// Reporter that discards all progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn start(&self, _label: &str, _total_bytes: u64) -> Box<dyn TransferProgress> {
        Box::new(NoProgress)
    }
}

impl TransferProgress for NoProgress {
    fn advance(&mut self, _bytes: u64) {}

    fn finish(&mut self) {}
}

/// Reporter that only counts, for tallies and tests.
#[derive(Debug, Default)]
pub struct ByteCounter {
    bytes: std::sync::Arc<AtomicU64>,
    started: AtomicUsize,
}

impl ByteCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total bytes across every transfer so far.
    pub fn total_bytes(&self) -> u64 {
        self.bytes.load(Ordering::SeqCst)
    }

    /// Number of transfers started.
    pub fn transfers(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

struct CountingTransfer {
    bytes: std::sync::Arc<AtomicU64>,
}

impl ProgressReporter for ByteCounter {
    fn start(&self, _label: &str, _total_bytes: u64) -> Box<dyn TransferProgress> {
        self.started.fetch_add(1, Ordering::SeqCst);
        Box::new(CountingTransfer {
            bytes: std::sync::Arc::clone(&self.bytes),
        })
    }
}

impl TransferProgress for CountingTransfer {
    fn advance(&mut self, bytes: u64) {
        self.bytes.fetch_add(bytes, Ordering::SeqCst);
    }

    fn finish(&mut self) {}
}
