//! Per-stream reader producing numbered raw blocks.
//!
//! ```text
//! Idle ──▶ Reading ──┬──▶ BlockReady ──▶ Reading ...
//!                    ├──▶ EndOfStream
//!                    └──▶ ReadError
//! ```
//!
//! Each stream has its own lock, block counter and end-of-stream flag; streams never
//! share ordering state. The lock is held only while bytes are pulled from the source.

use std::io::Read;

use blockpipe_bgzf::{BGZF_EOF, CodecError, read_raw_block};
use log::debug;
use parking_lot::Mutex;

use crate::block::{BlockFailure, PendingBlock};
use crate::buffer_pool::BufferPool;
use crate::errors::PipelineError;

/// Where a reader is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    /// Nothing read yet.
    Idle,
    /// A read is in progress.
    Reading,
    /// The last call produced a block.
    BlockReady,
    /// The source is exhausted and the sentinel has been issued.
    EndOfStream,
    /// The source failed; the stream cannot continue.
    ReadError,
}

struct ReaderInner {
    source: Box<dyn Read + Send>,
    next_block_id: u64,
    state: ReaderState,
    last_was_eof_marker: bool,
    bytes_read: u64,
}

/// Reads one BGZF source into pool buffers, one block per call.
pub struct InputReader {
    stream_id: u64,
    pool: BufferPool,
    inner: Mutex<ReaderInner>,
}

impl InputReader {
    /// Wrap `source` as stream `stream_id`, filling buffers from `pool`.
    pub fn new(stream_id: u64, source: Box<dyn Read + Send>, pool: BufferPool) -> Self {
        Self {
            stream_id,
            pool,
            inner: Mutex::new(ReaderInner {
                source,
                next_block_id: 0,
                state: ReaderState::Idle,
                last_was_eof_marker: false,
                bytes_read: 0,
            }),
        }
    }

    /// Read the next block.
    ///
    /// At end of input the reader returns a sentinel block with `is_final` set and the
    /// highest block id of the stream. Every call, failed or not, consumes one block id.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::ShortRead`] if the input ends inside a block
    /// - [`PipelineError::UnexpectedEof`] if called after end of stream or a read error
    /// - [`PipelineError::Codec`] for malformed headers, [`PipelineError::Io`] for I/O failures
    pub fn read_next_block(&self) -> Result<PendingBlock, BlockFailure> {
        if let Some(failure) = self.after_end(&self.inner.lock()) {
            return Err(failure);
        }
        // Never wait on the pool while holding the reader lock.
        let acquired = self.pool.acquire();

        let mut inner = self.inner.lock();
        if let Some(failure) = self.after_end(&inner) {
            return Err(failure);
        }

        let block_id = inner.next_block_id;
        inner.next_block_id += 1;
        inner.state = ReaderState::Reading;

        let mut buffer = match acquired {
            Ok(buffer) => buffer,
            Err(e) => {
                inner.state = ReaderState::ReadError;
                return Err(BlockFailure::new(self.stream_id, block_id, e));
            }
        };

        match read_raw_block(&mut inner.source, buffer.as_mut_vec()) {
            Ok(Some(size)) => {
                inner.bytes_read += size as u64;
                inner.last_was_eof_marker = buffer[..] == BGZF_EOF;
                inner.state = ReaderState::BlockReady;
                Ok(PendingBlock::new(self.stream_id, block_id, buffer))
            }
            Ok(None) => {
                inner.state = ReaderState::EndOfStream;
                debug!(
                    "Stream {} reached end of input after {} blocks ({} bytes)",
                    self.stream_id, block_id, inner.bytes_read
                );
                Ok(PendingBlock::sentinel(self.stream_id, block_id))
            }
            Err(e) => {
                inner.state = ReaderState::ReadError;
                let error = match e {
                    CodecError::Truncated { expected, actual } => {
                        PipelineError::ShortRead { stream_id: self.stream_id, expected, actual }
                    }
                    CodecError::Io(io) => PipelineError::Io(io),
                    other => PipelineError::Codec(other),
                };
                Err(BlockFailure::new(self.stream_id, block_id, error))
            }
        }
    }

    fn after_end(&self, inner: &ReaderInner) -> Option<BlockFailure> {
        matches!(inner.state, ReaderState::EndOfStream | ReaderState::ReadError).then(|| {
            BlockFailure::new(
                self.stream_id,
                inner.next_block_id,
                PipelineError::UnexpectedEof { stream_id: self.stream_id },
            )
        })
    }

    /// Stream this reader feeds.
    #[must_use]
    pub fn stream_id(&self) -> u64 {
        self.stream_id
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ReaderState {
        self.inner.lock().state
    }

    /// Whether the last block read was the BGZF end-of-file marker.
    #[must_use]
    pub fn ended_with_eof_marker(&self) -> bool {
        self.inner.lock().last_was_eof_marker
    }

    /// Number of block ids issued so far, including the sentinel.
    #[must_use]
    pub fn blocks_issued(&self) -> u64 {
        self.inner.lock().next_block_id
    }

    /// Compressed bytes consumed from the source.
    #[must_use]
    pub fn bytes_read(&self) -> u64 {
        self.inner.lock().bytes_read
    }
}
