//! Builders for BGZF test inputs.
//!
//! Blocks are deflated with flate2 rather than the library codec so that inputs are
//! produced independently of the code under test, and so that payloads of a full
//! 65536 bytes (as written by other BGZF producers) can be generated.

#![allow(dead_code)]

use std::io::{Read, Write};

use blockpipe_lib::bgzf::{BGZF_EOF, read_raw_block};
use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::DeflateEncoder;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Encode `payload` as one BGZF block at `level` (0-9).
///
/// # Panics
///
/// Panics if the deflated block does not fit in 64 KiB.
pub fn bgzf_block(payload: &[u8], level: u32) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::new(level));
    encoder.write_all(payload).unwrap();
    let cdata = encoder.finish().unwrap();

    let bsize = 18 + cdata.len() + 8;
    assert!(bsize <= 65536, "payload of {} bytes does not fit a block", payload.len());
    let mut block = vec![0x1f, 0x8b, 0x08, 0x04, 0, 0, 0, 0, 0, 0xff, 0x06, 0x00, b'B', b'C', 0x02, 0x00];
    block.extend_from_slice(&((bsize - 1) as u16).to_le_bytes());
    block.extend_from_slice(&cdata);
    block.extend_from_slice(&crc32fast::hash(payload).to_le_bytes());
    block.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    block
}

/// A BGZF input: its bytes plus the byte range of every block.
pub struct BgzfInput {
    pub bytes: Vec<u8>,
    pub block_offsets: Vec<usize>,
    pub payloads: Vec<Vec<u8>>,
    pub has_eof: bool,
}

impl BgzfInput {
    /// Concatenation of every payload.
    pub fn concatenated(&self) -> Vec<u8> {
        self.payloads.concat()
    }

    /// Concatenation of the first `k` payloads.
    pub fn prefix(&self, k: usize) -> Vec<u8> {
        self.payloads[..k].concat()
    }

    /// Flip a bit in the stored CRC32 of block `k`.
    pub fn corrupt_crc(&mut self, k: usize) {
        let end = self.block_end(k);
        self.bytes[end - 8] ^= 0x01;
    }

    /// Zero the CRC32 and ISIZE footer of block `k`.
    pub fn zero_footer(&mut self, k: usize) {
        let end = self.block_end(k);
        self.bytes[end - 8..end].fill(0);
    }

    /// Break the magic bytes of block `k`.
    pub fn corrupt_header(&mut self, k: usize) {
        self.bytes[self.block_offsets[k]] = b'X';
    }

    fn block_end(&self, k: usize) -> usize {
        let trailer = if self.has_eof { BGZF_EOF.len() } else { 0 };
        self.block_offsets.get(k + 1).copied().unwrap_or(self.bytes.len() - trailer)
    }
}

/// Build a stream of one block per payload, optionally followed by the end-of-file marker.
pub fn bgzf_input(payloads: Vec<Vec<u8>>, level: u32, eof: bool) -> BgzfInput {
    let mut bytes = Vec::new();
    let mut block_offsets = Vec::with_capacity(payloads.len());
    for payload in &payloads {
        block_offsets.push(bytes.len());
        bytes.extend_from_slice(&bgzf_block(payload, level));
    }
    if eof {
        bytes.extend_from_slice(&BGZF_EOF);
    }
    BgzfInput { bytes, block_offsets, payloads, has_eof: eof }
}

/// Compressible pseudo-random payload of `len` bytes.
pub fn random_payload(rng: &mut StdRng, len: usize) -> Vec<u8> {
    const ALPHABET: &[u8] = b"ACGTN\n";
    (0..len).map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())]).collect()
}

/// `count` payloads with lengths drawn from `0..=max_len`, seeded for reproducibility.
pub fn random_payloads(seed: u64, count: usize, max_len: usize) -> Vec<Vec<u8>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let len = rng.random_range(0..=max_len);
            random_payload(&mut rng, len)
        })
        .collect()
}

/// Decode a whole BGZF stream with an independent gzip decoder.
pub fn gunzip(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    MultiGzDecoder::new(bytes).read_to_end(&mut out).unwrap();
    out
}

/// Split a BGZF stream into its raw blocks.
pub fn split_blocks(bytes: &[u8]) -> Vec<Vec<u8>> {
    let mut reader = bytes;
    let mut blocks = Vec::new();
    loop {
        let mut block = Vec::new();
        match read_raw_block(&mut reader, &mut block).unwrap() {
            Some(_) => blocks.push(block),
            None => return blocks,
        }
    }
}

/// ISIZE of every block in a BGZF stream.
pub fn block_payload_sizes(bytes: &[u8]) -> Vec<usize> {
    split_blocks(bytes)
        .iter()
        .map(|block| u32::from_le_bytes(block[block.len() - 4..].try_into().unwrap()) as usize)
        .collect()
}
