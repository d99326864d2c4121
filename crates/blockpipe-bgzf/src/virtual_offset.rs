//! BGZF virtual offsets.
//!
//! A virtual offset packs the compressed offset of a block's first byte into the
//! upper 48 bits and the position within that block's payload into the lower 16.

use std::fmt;

use crate::error::{CodecError, Result};

/// Largest compressed offset representable in a virtual offset.
pub const MAX_COMPRESSED_OFFSET: u64 = (1 << 48) - 1;

/// Compressed/uncompressed position pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct VirtualOffset(u64);

impl VirtualOffset {
    /// Start of the stream.
    pub const MIN: Self = Self(0);

    /// Build a virtual offset from a block's compressed offset and a payload offset.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::OffsetOutOfRange`] if `compressed` needs more than 48 bits.
    pub fn new(compressed: u64, uncompressed: u16) -> Result<Self> {
        if compressed > MAX_COMPRESSED_OFFSET {
            return Err(CodecError::OffsetOutOfRange(compressed));
        }
        Ok(Self((compressed << 16) | u64::from(uncompressed)))
    }

    /// Offset of the containing block in the compressed stream.
    #[must_use]
    pub fn compressed(self) -> u64 {
        self.0 >> 16
    }

    /// Offset within the containing block's payload.
    #[must_use]
    pub fn uncompressed(self) -> u16 {
        (self.0 & 0xffff) as u16
    }
}

impl From<u64> for VirtualOffset {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl From<VirtualOffset> for u64 {
    fn from(offset: VirtualOffset) -> Self {
        offset.0
    }
}

impl fmt::Display for VirtualOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.compressed(), self.uncompressed())
    }
}
