//! Progress logging for committed blocks.
//!
//! The output side of the pipeline reports each committed block here; a line is
//! logged every time the block count crosses a multiple of the interval.

use log::info;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::logging::{format_bytes, format_count};

/// Thread-safe progress tracker counting blocks and their payload bytes.
///
/// # Example
/// ```
/// use blockpipe_lib::progress::ProgressTracker;
///
/// let tracker = ProgressTracker::new("Committed").with_interval(100);
/// for _ in 0..250 {
///     tracker.record(1, 65_280); // Logs at 100, 200
/// }
/// tracker.log_final(); // Logs "Committed 250 blocks ... (complete)"
/// ```
pub struct ProgressTracker {
    /// Progress is logged when the block count crosses multiples of this.
    interval: u64,
    /// Message prefix for log output.
    message: String,
    blocks: AtomicU64,
    bytes: AtomicU64,
}

impl ProgressTracker {
    /// Create a tracker with a default interval of 10,000 blocks.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            interval: 10_000,
            message: message.into(),
            blocks: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
        }
    }

    /// Set the logging interval; zero disables interval logging.
    #[must_use]
    pub fn with_interval(mut self, interval: u64) -> Self {
        self.interval = interval;
        self
    }

    /// Add `blocks` blocks carrying `bytes` payload bytes, logging each interval crossed.
    ///
    /// Returns `true` if the block count now sits exactly on an interval boundary.
    pub fn record(&self, blocks: u64, bytes: u64) -> bool {
        let total_bytes = self.bytes.fetch_add(bytes, Ordering::Relaxed) + bytes;
        let prev = self.blocks.fetch_add(blocks, Ordering::Relaxed);
        let count = prev + blocks;
        if self.interval == 0 {
            return false;
        }

        for i in (prev / self.interval + 1)..=(count / self.interval) {
            info!(
                "{} {} blocks ({} uncompressed)",
                self.message,
                format_count(i * self.interval),
                format_bytes(total_bytes)
            );
        }
        count > 0 && count.is_multiple_of(self.interval)
    }

    /// Log the final count unless the last [`record`](Self::record) already did.
    pub fn log_final(&self) {
        let count = self.blocks();
        let on_interval = self.interval > 0 && count.is_multiple_of(self.interval);
        if count > 0 && !on_interval {
            info!(
                "{} {} blocks ({} uncompressed) (complete)",
                self.message,
                format_count(count),
                format_bytes(self.bytes())
            );
        }
    }

    /// Blocks recorded so far.
    #[must_use]
    pub fn blocks(&self) -> u64 {
        self.blocks.load(Ordering::Relaxed)
    }

    /// Payload bytes recorded so far.
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}
