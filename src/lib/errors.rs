//! Error types for pipeline operations.

use std::fmt;
use std::io;

use blockpipe_bgzf::CodecError;
use thiserror::Error;

use crate::pipeline::PipelineStats;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Error type for pipeline operations
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A block could not be framed, inflated or deflated
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The input ended part-way through a block
    #[error("Short read on stream {stream_id}: expected {expected} bytes, got {actual}")]
    ShortRead {
        /// The stream being read
        stream_id: u64,
        /// Number of bytes the block framing promised
        expected: usize,
        /// Number of bytes available
        actual: usize,
    },

    /// A stream was read again after it reached end of input or failed
    #[error("Unexpected end of input on stream {stream_id}")]
    UnexpectedEof {
        /// The stream being read
        stream_id: u64,
    },

    /// A worker raised an unrecoverable error and the pool halted
    #[error("Worker pool panicked: {0}")]
    PoolPanic(String),

    /// A non-blocking buffer pool had no free buffer
    #[error("Buffer pool '{0}' is exhausted")]
    PoolExhausted(&'static str),

    /// The buffer pool was closed while waiting for a buffer
    #[error("Buffer pool '{0}' is closed")]
    PoolClosed(&'static str),

    /// Two handlers were registered for one dispatcher id
    #[error("Dispatcher id {0} is already registered")]
    DuplicateDispatcher(u64),

    /// A package named a dispatcher id with no registered handler
    #[error("No dispatcher registered for id {0}")]
    UnknownDispatcher(u64),

    /// A block was written after the stream's terminal block
    #[error("Output for stream {stream_id} is already closed")]
    WriterClosed {
        /// The stream whose writer was closed
        stream_id: u64,
    },

    /// Invalid parameter value provided
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// The parameter name
        parameter: String,
        /// Explanation of why it's invalid
        reason: String,
    },

    /// Underlying I/O failure on a source or sink
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl PipelineError {
    /// Convenience constructor for configuration errors.
    pub fn invalid_parameter(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter { parameter: parameter.into(), reason: reason.into() }
    }

    /// Return the codec error if this error wraps one.
    #[must_use]
    pub fn as_codec(&self) -> Option<&CodecError> {
        match self {
            Self::Codec(e) => Some(e),
            _ => None,
        }
    }
}

/// Error returned by [`Pipeline::run_to_completion`](crate::pipeline::Pipeline::run_to_completion).
///
/// Carries the first fatal error recorded by the pool together with statistics on
/// what was committed before the halt. Output written up to that point is left in place.
#[derive(Debug)]
pub struct FatalError {
    /// First fatal error recorded
    pub error: PipelineError,
    /// Statistics at the time the pool halted
    pub stats: PipelineStats,
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pipeline halted after committing {} blocks: {}",
            self.stats.blocks_committed(),
            self.error
        )
    }
}

impl std::error::Error for FatalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
