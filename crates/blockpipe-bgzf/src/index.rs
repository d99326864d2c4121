//! bgzip-compatible `.gzi` block index.
//!
//! The on-disk layout is a little-endian `u64` entry count followed by that many
//! `(compressed_offset, uncompressed_offset)` pairs of `u64`s. The implicit first
//! block at `(0, 0)` is not stored.

use std::io::{Read, Write};

use crate::error::{CodecError, Result};
use crate::format::MAX_BLOCK_SIZE;
use crate::virtual_offset::VirtualOffset;

/// Start of one block in both coordinate systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexEntry {
    /// Byte offset of the block in the compressed stream.
    pub compressed_offset: u64,
    /// Byte offset of the block's payload in the uncompressed stream.
    pub uncompressed_offset: u64,
}

/// Ordered list of block starts for one BGZF stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockIndex {
    entries: Vec<IndexEntry>,
    compressed_end: u64,
    uncompressed_end: u64,
}

impl Default for BlockIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockIndex {
    /// Create an index holding only the implicit first block.
    #[must_use]
    pub fn new() -> Self {
        Self { entries: vec![IndexEntry::default()], compressed_end: 0, uncompressed_end: 0 }
    }

    /// Record a block of the given sizes written after all previously pushed blocks.
    pub fn push(&mut self, compressed_size: usize, uncompressed_size: usize) {
        if self.compressed_end > 0 {
            self.entries.push(IndexEntry {
                compressed_offset: self.compressed_end,
                uncompressed_offset: self.uncompressed_end,
            });
        }
        self.compressed_end += compressed_size as u64;
        self.uncompressed_end += uncompressed_size as u64;
    }

    /// Block starts in stream order, including the implicit first block.
    #[must_use]
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Number of indexed blocks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false: the first block is implicit.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total payload bytes covered by pushed blocks (zero for a loaded index).
    #[must_use]
    pub fn uncompressed_len(&self) -> u64 {
        self.uncompressed_end
    }

    /// Map an uncompressed position to the virtual offset of the byte at that position.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::OffsetOutOfRange`] if the position lies further than one
    /// block past the last indexed block start.
    pub fn virtual_offset_for(&self, position: u64) -> Result<VirtualOffset> {
        let idx = self.entries.partition_point(|e| e.uncompressed_offset <= position) - 1;
        let entry = self.entries[idx];
        let within = position - entry.uncompressed_offset;
        if within >= MAX_BLOCK_SIZE as u64 {
            return Err(CodecError::OffsetOutOfRange(position));
        }
        VirtualOffset::new(entry.compressed_offset, within as u16)
    }

    /// Serialize in `.gzi` format.
    ///
    /// # Errors
    ///
    /// Propagates write failures.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let stored = &self.entries[1..];
        writer.write_all(&(stored.len() as u64).to_le_bytes())?;
        for entry in stored {
            writer.write_all(&entry.compressed_offset.to_le_bytes())?;
            writer.write_all(&entry.uncompressed_offset.to_le_bytes())?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Parse a `.gzi` index.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Io`] on short reads and [`CodecError::CorruptHeader`] if the
    /// entries are not strictly increasing.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let count = read_u64(reader)?;
        let mut entries = vec![IndexEntry::default()];
        for _ in 0..count {
            let entry = IndexEntry {
                compressed_offset: read_u64(reader)?,
                uncompressed_offset: read_u64(reader)?,
            };
            let prev = entries[entries.len() - 1];
            if entry.compressed_offset <= prev.compressed_offset
                || entry.uncompressed_offset < prev.uncompressed_offset
            {
                return Err(CodecError::corrupt(format!(
                    "gzi entries out of order at compressed offset {}",
                    entry.compressed_offset
                )));
            }
            entries.push(entry);
        }
        Ok(Self { entries, compressed_end: 0, uncompressed_end: 0 })
    }
}

fn read_u64<R: Read>(reader: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}
