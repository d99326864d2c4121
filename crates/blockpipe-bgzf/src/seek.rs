//! Random access into a BGZF stream by virtual offset.

use std::io::{self, Read, Seek, SeekFrom};

use crate::codec::BlockCodec;
use crate::error::{CodecError, Result};
use crate::format::read_raw_block;
use crate::virtual_offset::VirtualOffset;

/// Sequential payload reader that can be repositioned at any virtual offset.
///
/// Blocks are inflated one at a time with the calling thread's codec.
pub struct BlockSeeker<R> {
    inner: R,
    codec: BlockCodec,
    raw: Vec<u8>,
    payload: Vec<u8>,
    /// Read position within `payload`.
    cursor: usize,
    /// Compressed offset of the block held in `payload`.
    block_offset: u64,
    /// Compressed offset of the next block to read.
    next_offset: u64,
}

impl<R: Read + Seek> BlockSeeker<R> {
    /// Wrap a seekable BGZF source positioned at its start.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            codec: BlockCodec::new(),
            raw: Vec::new(),
            payload: Vec::new(),
            cursor: 0,
            block_offset: 0,
            next_offset: 0,
        }
    }

    /// Current position as a virtual offset.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::OffsetOutOfRange`] for streams larger than 256 TiB.
    pub fn virtual_offset(&self) -> Result<VirtualOffset> {
        if self.cursor == self.payload.len() && !self.payload.is_empty() {
            return VirtualOffset::new(self.next_offset, 0);
        }
        VirtualOffset::new(self.block_offset, self.cursor as u16)
    }

    /// Position the reader at `offset`.
    ///
    /// # Errors
    ///
    /// Fails if the target block cannot be read or inflated, or if the in-block
    /// offset lies past the end of the block's payload.
    pub fn seek_to(&mut self, offset: VirtualOffset) -> Result<()> {
        self.inner.seek(SeekFrom::Start(offset.compressed()))?;
        self.next_offset = offset.compressed();
        self.payload.clear();
        self.cursor = 0;
        self.load_block()?;

        let within = usize::from(offset.uncompressed());
        if within > self.payload.len() {
            return Err(CodecError::OffsetOutOfRange(u64::from(offset)));
        }
        self.cursor = within;
        Ok(())
    }

    /// Consume the seeker, returning the wrapped source.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Read and inflate the block at `next_offset`; returns false at end of input.
    fn load_block(&mut self) -> Result<bool> {
        let Some(size) = read_raw_block(&mut self.inner, &mut self.raw)? else {
            return Ok(false);
        };
        self.payload.clear();
        self.codec.decompress_into(&self.raw, &mut self.payload)?;
        self.block_offset = self.next_offset;
        self.next_offset += size as u64;
        self.cursor = 0;
        Ok(true)
    }
}

impl<R: Read + Seek> Read for BlockSeeker<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.cursor == self.payload.len() {
            if !self.load_block().map_err(io::Error::other)? {
                return Ok(0);
            }
        }
        let n = buf.len().min(self.payload.len() - self.cursor);
        buf[..n].copy_from_slice(&self.payload[self.cursor..self.cursor + n]);
        self.cursor += n;
        Ok(n)
    }
}
