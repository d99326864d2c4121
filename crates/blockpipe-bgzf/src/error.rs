//! Error type for single-block BGZF operations.

use std::io;
use thiserror::Error;

/// Result type alias for block codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;

/// Errors raised while framing, inflating or deflating one BGZF block.
#[derive(Error, Debug)]
pub enum CodecError {
    /// The block header is missing or does not describe a BGZF block.
    #[error("Corrupt BGZF header: {reason}")]
    CorruptHeader {
        /// Explanation of the problem
        reason: String,
    },

    /// The CRC32 in the footer does not match the inflated payload.
    #[error("BGZF CRC32 mismatch: expected 0x{expected:08x}, got 0x{actual:08x}")]
    ChecksumMismatch {
        /// CRC32 stored in the block footer
        expected: u32,
        /// CRC32 of the inflated payload
        actual: u32,
    },

    /// The inflated payload length differs from the footer's ISIZE.
    #[error("BGZF size mismatch: footer declares {expected} bytes, inflated {actual}")]
    SizeMismatch {
        /// ISIZE stored in the block footer
        expected: usize,
        /// Number of bytes produced by inflation
        actual: usize,
    },

    /// The input ended part-way through a block.
    #[error("Truncated BGZF block: expected {expected} bytes, read {actual}")]
    Truncated {
        /// Number of bytes the framing promised
        expected: usize,
        /// Number of bytes actually available
        actual: usize,
    },

    /// Compression level outside the accepted range.
    #[error("Invalid compression level {0} (must be between 0 and 12)")]
    InvalidLevel(u32),

    /// A payload larger than one block was handed to the codec.
    #[error("Payload of {size} bytes exceeds the maximum block payload of {max} bytes")]
    BufferTooLarge {
        /// Size of the rejected payload
        size: usize,
        /// Maximum accepted size
        max: usize,
    },

    /// The deflated payload does not fit into a single 64 KiB block.
    #[error("Deflated block of {size} bytes does not fit in a BGZF block")]
    BlockOverflow {
        /// Total size the framed block would have had
        size: usize,
    },

    /// A compressed offset does not fit into the 48 bits of a virtual offset.
    #[error("Offset {0} cannot be represented in a virtual offset")]
    OffsetOutOfRange(u64),

    /// The deflate primitive rejected the input.
    #[error("Deflate failed: {0}")]
    Deflate(String),

    /// The inflate primitive rejected the input.
    #[error("Inflate failed: {0}")]
    Inflate(String),

    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl CodecError {
    /// Convenience constructor for header failures.
    pub fn corrupt(reason: impl Into<String>) -> Self {
        Self::CorruptHeader { reason: reason.into() }
    }
}
