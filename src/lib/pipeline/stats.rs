//! Run statistics returned by [`Pipeline::run_to_completion`](super::Pipeline::run_to_completion).

use std::time::Duration;

use log::info;

use crate::logging::{format_bytes, format_count, format_duration, format_throughput};

/// Counters for one stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Stream these counters belong to.
    pub stream_id: u64,
    /// Block ids issued by the reader, sentinel included.
    pub blocks_read: u64,
    /// Blocks written in order, sentinel excluded.
    pub blocks_committed: u64,
    /// Compressed bytes consumed from the source.
    pub compressed_bytes_in: u64,
    /// Compressed bytes written to the sink, end-of-file marker included.
    pub compressed_bytes_out: u64,
    /// Payload bytes written.
    pub uncompressed_bytes: u64,
    /// Whether the sentinel was committed and the sink closed.
    pub completed: bool,
}

/// Counters for a whole run.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// One entry per submitted stream, in submission order.
    pub streams: Vec<StreamStats>,
    /// Soft errors raised during the run.
    pub soft_errors: u64,
    /// Wall-clock time from dispatch to join.
    pub elapsed: Duration,
    /// Pool buffers still checked out once every stage has stopped and pending
    /// completions have been discarded. Always zero unless a stage leaks a buffer.
    pub buffers_outstanding: usize,
}

impl PipelineStats {
    /// Blocks committed across every stream.
    #[must_use]
    pub fn blocks_committed(&self) -> u64 {
        self.streams.iter().map(|s| s.blocks_committed).sum()
    }

    /// Payload bytes written across every stream.
    #[must_use]
    pub fn uncompressed_bytes(&self) -> u64 {
        self.streams.iter().map(|s| s.uncompressed_bytes).sum()
    }

    /// Compressed bytes written across every stream.
    #[must_use]
    pub fn compressed_bytes_out(&self) -> u64 {
        self.streams.iter().map(|s| s.compressed_bytes_out).sum()
    }

    /// Counters for `stream_id`.
    #[must_use]
    pub fn stream(&self, stream_id: u64) -> Option<&StreamStats> {
        self.streams.iter().find(|s| s.stream_id == stream_id)
    }

    /// Human-readable multi-line summary.
    #[must_use]
    pub fn format_summary(&self) -> String {
        let mut lines = vec!["Pipeline Statistics:".to_string()];
        for stream in &self.streams {
            lines.push(format!(
                "  stream {:<4} {:>12} blocks, {:>10} in, {:>10} out, {:>10} payload{}",
                stream.stream_id,
                format_count(stream.blocks_committed),
                format_bytes(stream.compressed_bytes_in),
                format_bytes(stream.compressed_bytes_out),
                format_bytes(stream.uncompressed_bytes),
                if stream.completed { "" } else { " (incomplete)" }
            ));
        }
        lines.push(format!(
            "  total        {:>12} blocks in {} ({})",
            format_count(self.blocks_committed()),
            format_duration(self.elapsed),
            format_throughput(self.uncompressed_bytes(), self.elapsed)
        ));
        if self.soft_errors > 0 {
            lines.push(format!("  soft errors  {:>12}", format_count(self.soft_errors)));
        }
        if self.buffers_outstanding > 0 {
            lines.push(format!("  leaked       {:>12} buffers", self.buffers_outstanding));
        }
        lines.join("\n")
    }

    /// Log [`format_summary`](Self::format_summary) line by line at info level.
    pub fn log_summary(&self) {
        for line in self.format_summary().lines() {
            info!("{line}");
        }
    }
}
