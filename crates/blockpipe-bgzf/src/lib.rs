#![deny(unsafe_code)]

//! BGZF (Blocked GZIP Format) block layer.
//!
//! This crate provides the single-block primitives the threaded pipeline is built on:
//! - [`format`] - Framing constants, header parsing and raw block reads
//! - [`codec`] - [`BlockCodec`], one-shot inflate/deflate of a single block
//! - [`virtual_offset`] - 48/16-bit compressed/uncompressed positions
//! - [`index`] - bgzip-compatible `.gzi` block index
//! - [`seek`] - Random access into a BGZF stream by virtual offset

pub mod codec;
pub mod error;
pub mod format;
pub mod index;
pub mod seek;
pub mod virtual_offset;

pub use codec::{BlockCodec, FrameInfo, MAX_LEVEL, validate_level};
pub use error::{CodecError, Result};
pub use format::{
    BGZF_EOF, BGZF_FOOTER_SIZE, BGZF_HEADER_SIZE, MAX_BLOCK_PAYLOAD, MAX_BLOCK_SIZE, footer,
    parse_header, read_raw_block,
};
pub use index::{BlockIndex, IndexEntry};
pub use seek::BlockSeeker;
pub use virtual_offset::VirtualOffset;
