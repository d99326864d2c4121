//! One-shot inflate/deflate of a single BGZF block.
//!
//! [`BlockCodec`] keeps a raw flate2 inflater and one libdeflater compressor per level
//! purely as scratch state: no data survives between calls, so every call is
//! independent of the previous one. A codec is not `Sync`; each worker thread
//! owns its own instance.
//!
//! # Usage
//!
//! ```
//! use blockpipe_bgzf::BlockCodec;
//!
//! let mut codec = BlockCodec::new();
//! let mut block = Vec::new();
//! codec.compress_into(b"Hello, BGZF!", 6, &mut block).unwrap();
//!
//! let mut payload = Vec::new();
//! codec.decompress_into(&block, &mut payload).unwrap();
//! assert_eq!(payload, b"Hello, BGZF!");
//! ```

use std::io::Write;

use flate2::{Compression, Decompress, FlushDecompress, Status};
use flate2::write::DeflateEncoder;
use libdeflater::{CompressionLvl, Compressor};

use crate::error::{CodecError, Result};
use crate::format::{
    BGZF_FOOTER_SIZE, BGZF_HEADER_SIZE, HEADER_TEMPLATE, MAX_BLOCK_PAYLOAD, MAX_BLOCK_SIZE, footer,
    parse_header,
};

/// Highest accepted compression level.
pub const MAX_LEVEL: u32 = 12;

/// Framing metadata of one block, as written or as read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameInfo {
    /// Total framed block size (header + deflate data + footer).
    pub compressed_size: usize,
    /// Size of the payload carried by the block.
    pub uncompressed_size: usize,
    /// CRC32 of the payload.
    pub crc32: u32,
}

/// Check that `level` is within `0..=12`.
///
/// Level 0 stores the payload without compression; 1-12 are libdeflate levels.
///
/// # Errors
///
/// Returns [`CodecError::InvalidLevel`] for any other value.
pub fn validate_level(level: u32) -> Result<()> {
    if level > MAX_LEVEL { Err(CodecError::InvalidLevel(level)) } else { Ok(()) }
}

/// Per-thread BGZF block compressor/decompressor.
pub struct BlockCodec {
    inflater: Decompress,
    /// Lazily created compressors, indexed by `level - 1`.
    compressors: Vec<Option<Compressor>>,
}

impl Default for BlockCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockCodec {
    /// Create a codec with no compressors allocated yet.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inflater: Decompress::new(false),
            compressors: (0..MAX_LEVEL).map(|_| None).collect(),
        }
    }

    /// Inflate one complete block, appending its payload to `out`.
    ///
    /// The header is validated, exactly the declared compressed length is
    /// inflated, and the payload is checked against the footer's ISIZE and CRC32.
    ///
    /// # Errors
    ///
    /// - [`CodecError::CorruptHeader`] if the framing is malformed, the block length
    ///   disagrees with BSIZE, or the deflate stream ends before the footer
    /// - [`CodecError::Inflate`] if the deflate data is invalid, truncated, or longer than ISIZE
    /// - [`CodecError::SizeMismatch`] if the inflated length differs from ISIZE
    /// - [`CodecError::ChecksumMismatch`] if the CRC32 does not match
    pub fn decompress_into(&mut self, block: &[u8], out: &mut Vec<u8>) -> Result<FrameInfo> {
        let block_size = parse_header(block)?;
        if block_size != block.len() {
            return Err(CodecError::corrupt(format!(
                "BSIZE declares {block_size} bytes but block holds {}",
                block.len()
            )));
        }

        let (expected_crc, uncompressed_size) = footer(block);
        if uncompressed_size > MAX_BLOCK_SIZE {
            return Err(CodecError::corrupt(format!(
                "ISIZE {uncompressed_size} exceeds the {MAX_BLOCK_SIZE} byte block limit"
            )));
        }

        let compressed = &block[BGZF_HEADER_SIZE..block.len() - BGZF_FOOTER_SIZE];
        let start = out.len();
        out.resize(start + uncompressed_size, 0);
        if let Err(e) = self.inflate_exact(compressed, &mut out[start..]) {
            out.truncate(start);
            return Err(e);
        }

        let actual_crc = crc32fast::hash(&out[start..]);
        if actual_crc != expected_crc {
            out.truncate(start);
            return Err(CodecError::ChecksumMismatch { expected: expected_crc, actual: actual_crc });
        }

        Ok(FrameInfo { compressed_size: block.len(), uncompressed_size, crc32: actual_crc })
    }

    /// Inflate `compressed` into `dest`.
    ///
    /// The deflate stream must end exactly at the end of `compressed` and
    /// produce exactly `dest.len()` bytes, even when `dest` is empty.
    fn inflate_exact(&mut self, compressed: &[u8], dest: &mut [u8]) -> Result<()> {
        self.inflater.reset(false);
        let status = self
            .inflater
            .decompress(compressed, dest, FlushDecompress::Finish)
            .map_err(|e| CodecError::Inflate(e.to_string()))?;
        let consumed = self.inflater.total_in() as usize;
        let produced = self.inflater.total_out() as usize;

        if status != Status::StreamEnd {
            return Err(if produced == dest.len() {
                CodecError::Inflate(format!("deflate data continues past the declared ISIZE of {produced} bytes"))
            } else {
                CodecError::Inflate(format!("deflate stream is truncated after {produced} bytes"))
            });
        }
        if produced != dest.len() {
            return Err(CodecError::SizeMismatch { expected: dest.len(), actual: produced });
        }
        if consumed != compressed.len() {
            return Err(CodecError::corrupt(format!(
                "deflate stream ends after {consumed} of {} compressed bytes",
                compressed.len()
            )));
        }
        Ok(())
    }

    /// Deflate `payload` into one framed block appended to `out`.
    ///
    /// # Errors
    ///
    /// - [`CodecError::BufferTooLarge`] if `payload` exceeds [`MAX_BLOCK_PAYLOAD`]
    /// - [`CodecError::InvalidLevel`] if `level` is outside `0..=12`
    /// - [`CodecError::BlockOverflow`] if the framed block would exceed 64 KiB
    /// - [`CodecError::Deflate`] if the deflate primitive fails
    pub fn compress_into(&mut self, payload: &[u8], level: u32, out: &mut Vec<u8>) -> Result<FrameInfo> {
        if payload.len() > MAX_BLOCK_PAYLOAD {
            return Err(CodecError::BufferTooLarge { size: payload.len(), max: MAX_BLOCK_PAYLOAD });
        }
        validate_level(level)?;

        let start = out.len();
        out.extend_from_slice(&HEADER_TEMPLATE);
        out.extend_from_slice(&[0, 0]);
        let data_start = out.len();

        if let Err(e) = self.deflate(payload, level, out, data_start) {
            out.truncate(start);
            return Err(e);
        }

        let crc32 = crc32fast::hash(payload);
        out.extend_from_slice(&crc32.to_le_bytes());
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());

        let block_size = out.len() - start;
        if block_size > MAX_BLOCK_SIZE {
            out.truncate(start);
            return Err(CodecError::BlockOverflow { size: block_size });
        }
        let bsize = (block_size - 1) as u16;
        out[start + 16..start + 18].copy_from_slice(&bsize.to_le_bytes());

        Ok(FrameInfo { compressed_size: block_size, uncompressed_size: payload.len(), crc32 })
    }

    /// Append raw deflate data for `payload` to `out` (which ends at `data_start`).
    fn deflate(&mut self, payload: &[u8], level: u32, out: &mut Vec<u8>, data_start: usize) -> Result<()> {
        if level == 0 {
            let mut encoder = DeflateEncoder::new(&mut *out, Compression::none());
            encoder.write_all(payload)?;
            encoder.finish()?;
            return Ok(());
        }

        let compressor = self.compressor(level)?;
        let bound = compressor.deflate_compress_bound(payload.len());
        out.resize(data_start + bound, 0);
        let written = compressor
            .deflate_compress(payload, &mut out[data_start..])
            .map_err(|e| CodecError::Deflate(format!("{e:?}")))?;
        out.truncate(data_start + written);
        Ok(())
    }

    fn compressor(&mut self, level: u32) -> Result<&mut Compressor> {
        let slot = &mut self.compressors[(level - 1) as usize];
        if slot.is_none() {
            let lvl = CompressionLvl::new(level as i32)
                .map_err(|e| CodecError::Deflate(format!("{e:?}")))?;
            *slot = Some(Compressor::new(lvl));
        }
        slot.as_mut().ok_or(CodecError::InvalidLevel(level))
    }
}

// ============================================================================
// Tests
// ============================================================================
