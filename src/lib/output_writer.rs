//! In-order block writer with per-block callbacks.
//!
//! The writer receives blocks only after the reassembly buffer has put them back in
//! stream order. It writes each block's encoded bytes verbatim, then tells every
//! registered [`OutputCallback`] about the block and its offsets. The sentinel block
//! writes the BGZF end-of-file marker, flushes, finalizes the callbacks and closes
//! the writer.

use std::io::Write;
use std::sync::Arc;

use blockpipe_bgzf::{BGZF_EOF, FrameInfo};
use log::debug;

use crate::block::PendingBlock;
use crate::errors::{PipelineError, Result};

/// Everything a callback learns about one written block.
#[derive(Debug, Clone, Copy)]
pub struct BlockEvent<'a> {
    /// Stream the block belongs to.
    pub stream_id: u64,
    /// Sequence number of the input block.
    pub block_id: u64,
    /// Offset of the first output byte of this block in the compressed stream.
    pub compressed_offset: u64,
    /// Offset of the block's payload in the uncompressed stream.
    pub uncompressed_offset: u64,
    /// Bytes written for this block; may hold several BGZF blocks, or none.
    pub encoded: &'a [u8],
    /// Framing of each BGZF block in `encoded`.
    pub frames: &'a [FrameInfo],
    /// Set for the end-of-file marker written after the last block.
    pub is_final: bool,
}

/// Totals reported to callbacks when a stream closes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    /// Stream that closed.
    pub stream_id: u64,
    /// Input blocks committed, excluding the sentinel.
    pub blocks: u64,
    /// Compressed bytes written, including the end-of-file marker.
    pub compressed_bytes: u64,
    /// Payload bytes written.
    pub uncompressed_bytes: u64,
}

/// Observer of written blocks.
///
/// Callbacks run synchronously on the writing thread, in write order. They must not
/// block on pipeline buffer pools.
pub trait OutputCallback: Send + Sync {
    /// Called after each block's bytes have been written.
    fn on_block(&self, event: &BlockEvent<'_>) -> Result<()>;

    /// Called once after the stream's end-of-file marker has been written and flushed.
    fn on_stream_closed(&self, _summary: &StreamSummary) -> Result<()> {
        Ok(())
    }
}

/// Lifecycle of an [`OutputWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    /// Accepting blocks.
    Open,
    /// The sentinel has been written.
    Closed,
}

/// Sink for one stream's committed blocks.
pub struct OutputWriter {
    stream_id: u64,
    sink: Box<dyn Write + Send>,
    callbacks: Vec<Arc<dyn OutputCallback>>,
    state: WriterState,
    compressed_offset: u64,
    uncompressed_offset: u64,
    blocks: u64,
}

impl OutputWriter {
    /// Write stream `stream_id` to `sink`, notifying `callbacks` in order.
    pub fn new(stream_id: u64, sink: Box<dyn Write + Send>, callbacks: Vec<Arc<dyn OutputCallback>>) -> Self {
        Self {
            stream_id,
            sink,
            callbacks,
            state: WriterState::Open,
            compressed_offset: 0,
            uncompressed_offset: 0,
            blocks: 0,
        }
    }

    /// Write the next block in stream order.
    ///
    /// A final block writes the end-of-file marker, flushes the sink, finalizes the
    /// callbacks and closes the writer.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::WriterClosed`] if the sentinel was already written
    /// - [`PipelineError::Io`] if the sink fails
    /// - any error returned by a callback
    pub fn write(&mut self, block: &PendingBlock) -> Result<()> {
        if self.state == WriterState::Closed {
            return Err(PipelineError::WriterClosed { stream_id: self.stream_id });
        }
        debug_assert_eq!(block.stream_id, self.stream_id);

        if block.is_final {
            return self.close(block.block_id);
        }

        let encoded = block.encoded.as_deref().unwrap_or(&[]);
        self.sink.write_all(encoded)?;

        let event = BlockEvent {
            stream_id: self.stream_id,
            block_id: block.block_id,
            compressed_offset: self.compressed_offset,
            uncompressed_offset: self.uncompressed_offset,
            encoded,
            frames: &block.frames,
            is_final: false,
        };
        for callback in &self.callbacks {
            callback.on_block(&event)?;
        }

        self.compressed_offset += encoded.len() as u64;
        self.uncompressed_offset += block.uncompressed_len() as u64;
        self.blocks += 1;
        Ok(())
    }

    fn close(&mut self, block_id: u64) -> Result<()> {
        self.sink.write_all(&BGZF_EOF)?;
        self.sink.flush()?;

        let frame = FrameInfo { compressed_size: BGZF_EOF.len(), uncompressed_size: 0, crc32: 0 };
        let event = BlockEvent {
            stream_id: self.stream_id,
            block_id,
            compressed_offset: self.compressed_offset,
            uncompressed_offset: self.uncompressed_offset,
            encoded: &BGZF_EOF,
            frames: std::slice::from_ref(&frame),
            is_final: true,
        };
        for callback in &self.callbacks {
            callback.on_block(&event)?;
        }
        self.compressed_offset += BGZF_EOF.len() as u64;
        self.state = WriterState::Closed;

        let summary = self.summary();
        for callback in &self.callbacks {
            callback.on_stream_closed(&summary)?;
        }
        debug!(
            "Stream {} closed: {} blocks, {} compressed bytes",
            self.stream_id, summary.blocks, summary.compressed_bytes
        );
        Ok(())
    }

    /// Flush whatever has been written so far without closing.
    ///
    /// # Errors
    ///
    /// Propagates sink flush failures.
    pub fn flush(&mut self) -> Result<()> {
        self.sink.flush()?;
        Ok(())
    }

    /// Totals so far.
    #[must_use]
    pub fn summary(&self) -> StreamSummary {
        StreamSummary {
            stream_id: self.stream_id,
            blocks: self.blocks,
            compressed_bytes: self.compressed_offset,
            uncompressed_bytes: self.uncompressed_offset,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> WriterState {
        self.state
    }
}
