//! Pipeline configuration.

use blockpipe_bgzf::{CodecError, MAX_BLOCK_PAYLOAD, validate_level};

use crate::errors::{PipelineError, Result};

/// Largest number of output blocks a single input block may be split into.
pub const MAX_SUB_UNITS: usize = 64;

/// Configuration for a [`Pipeline`](super::Pipeline).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of worker threads in the pool.
    pub num_threads: usize,
    /// Compression level for output blocks (0 = store, 1-12 = libdeflate levels).
    pub compression_level: u32,
    /// Maximum payload bytes per output block.
    ///
    /// Larger payloads, from input blocks written by other tools or from transforms
    /// that grow the data, are split across several output blocks.
    pub block_payload_size: usize,
    /// Maximum blocks of one stream between read and commit.
    ///
    /// Bounds the reassembly window and therefore every buffer pool.
    pub blocks_in_flight: usize,
    /// Committed blocks between progress log lines (0 disables progress logging).
    pub progress_interval: u64,
    /// Treat an input stream without the BGZF end-of-file marker as corrupt.
    pub require_eof_marker: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new(1, 6)
    }
}

impl PipelineConfig {
    /// Create a configuration with the given thread count and compression level.
    #[must_use]
    pub fn new(num_threads: usize, compression_level: u32) -> Self {
        Self {
            num_threads,
            compression_level,
            block_payload_size: MAX_BLOCK_PAYLOAD,
            blocks_in_flight: 4 * num_threads.max(1),
            progress_interval: 10_000,
            require_eof_marker: false,
        }
    }

    /// Set the compression level.
    #[must_use]
    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level;
        self
    }

    /// Set the maximum payload bytes per output block.
    #[must_use]
    pub fn with_block_payload_size(mut self, size: usize) -> Self {
        self.block_payload_size = size;
        self
    }

    /// Set the per-stream in-flight block limit.
    #[must_use]
    pub fn with_blocks_in_flight(mut self, blocks: usize) -> Self {
        self.blocks_in_flight = blocks;
        self
    }

    /// Set the progress logging interval in blocks.
    #[must_use]
    pub fn with_progress_interval(mut self, interval: u64) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Require every input stream to end with the BGZF end-of-file marker.
    #[must_use]
    pub fn with_require_eof_marker(mut self, require: bool) -> Self {
        self.require_eof_marker = require;
        self
    }

    /// Check the configuration before any work is dispatched.
    ///
    /// # Errors
    ///
    /// - [`CodecError::InvalidLevel`] for a level outside `0..=12`
    /// - [`CodecError::BufferTooLarge`] for a block payload size above [`MAX_BLOCK_PAYLOAD`]
    /// - [`PipelineError::InvalidParameter`] for zero threads, block size or in-flight limit
    pub fn validate(&self) -> Result<()> {
        validate_level(self.compression_level)?;
        if self.block_payload_size > MAX_BLOCK_PAYLOAD {
            return Err(CodecError::BufferTooLarge { size: self.block_payload_size, max: MAX_BLOCK_PAYLOAD }.into());
        }
        if self.block_payload_size == 0 {
            return Err(PipelineError::invalid_parameter("block_payload_size", "must be >= 1"));
        }
        if self.num_threads == 0 {
            return Err(PipelineError::invalid_parameter("num_threads", "must be >= 1"));
        }
        if self.blocks_in_flight == 0 {
            return Err(PipelineError::invalid_parameter("blocks_in_flight", "must be >= 1"));
        }
        Ok(())
    }
}
