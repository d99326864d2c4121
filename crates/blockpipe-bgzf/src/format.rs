//! BGZF block framing.
//!
//! BGZF is a variant of gzip that stores data in independent blocks, each
//! holding at most 64 KiB of uncompressed payload. The block structure:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │ Header (18 bytes)                                               │
//! │  - Magic: 0x1f 0x8b (gzip)                                      │
//! │  - Method: 0x08 (deflate)                                       │
//! │  - Flags: 0x04 (FEXTRA)                                         │
//! │  - MTIME, XFL, OS: 6 bytes                                      │
//! │  - XLEN: 2 bytes (= 6)                                          │
//! │  - Subfield: "BC" + len(2) + BSIZE(2)                           │
//! │    where BSIZE = total_block_size - 1                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ Compressed data (raw deflate)                                   │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ Footer (8 bytes)                                                │
//! │  - CRC32: 4 bytes                                               │
//! │  - ISIZE: 4 bytes (uncompressed size)                           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::io::{self, Read};

use crate::error::{CodecError, Result};

// ============================================================================
// Constants
// ============================================================================

/// Size of the BGZF block header.
pub const BGZF_HEADER_SIZE: usize = 18;

/// Size of the BGZF block footer (CRC32 + ISIZE).
pub const BGZF_FOOTER_SIZE: usize = 8;

/// Largest total (framed, compressed) block size; BSIZE is a 16-bit `size - 1`.
pub const MAX_BLOCK_SIZE: usize = 65536;

/// Largest uncompressed payload the codec will deflate into a single block.
///
/// Smaller than [`MAX_BLOCK_SIZE`] so that incompressible payloads still fit
/// into one block once stored. Inflation accepts up to [`MAX_BLOCK_SIZE`] bytes
/// of payload, as written by other BGZF producers.
pub const MAX_BLOCK_PAYLOAD: usize = 65280;

/// BGZF EOF marker block (empty block signaling end of file).
pub const BGZF_EOF: [u8; 28] = [
    0x1f, 0x8b, // ID1, ID2
    0x08, // CM = DEFLATE
    0x04, // FLG = FEXTRA
    0x00, 0x00, 0x00, 0x00, // MTIME = 0
    0x00, // XFL = 0
    0xff, // OS = 255 (unknown)
    0x06, 0x00, // XLEN = 6
    0x42, 0x43, // SI1, SI2
    0x02, 0x00, // SLEN = 2
    0x1b, 0x00, // BSIZE = 27
    0x03, 0x00, // CDATA
    0x00, 0x00, 0x00, 0x00, // CRC32 = 0x00000000
    0x00, 0x00, 0x00, 0x00, // ISIZE = 0
];

/// Fixed header bytes preceding BSIZE in every block this crate writes.
pub(crate) const HEADER_TEMPLATE: [u8; 16] = [
    0x1f, 0x8b, 0x08, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0x06, 0x00, b'B', b'C', 0x02, 0x00,
];

// ============================================================================
// Header parsing
// ============================================================================

/// Validate a block header and return the total block size it declares.
///
/// # Errors
///
/// Returns [`CodecError::CorruptHeader`] when the magic bytes, compression method,
/// FEXTRA flag, extra-field length or `BC` subfield are wrong, or when the declared
/// size cannot hold a header and footer.
pub fn parse_header(header: &[u8]) -> Result<usize> {
    if header.len() < BGZF_HEADER_SIZE {
        return Err(CodecError::corrupt(format!(
            "header is {} bytes, expected {BGZF_HEADER_SIZE}",
            header.len()
        )));
    }

    if header[0] != 0x1f || header[1] != 0x8b {
        return Err(CodecError::corrupt(format!(
            "invalid magic: expected 0x1f 0x8b, got 0x{:02x} 0x{:02x}",
            header[0], header[1]
        )));
    }

    if header[2] != 0x08 {
        return Err(CodecError::corrupt(format!(
            "invalid compression method: expected 0x08, got 0x{:02x}",
            header[2]
        )));
    }

    if header[3] & 0x04 == 0 {
        return Err(CodecError::corrupt("missing FEXTRA flag"));
    }

    let xlen = u16::from_le_bytes([header[10], header[11]]);
    if xlen != 6 {
        return Err(CodecError::corrupt(format!("extra field length {xlen}, expected 6")));
    }

    if header[12] != b'B' || header[13] != b'C' {
        return Err(CodecError::corrupt(format!(
            "invalid subfield ID: expected 'BC', got '{}{}'",
            header[12] as char, header[13] as char
        )));
    }

    let slen = u16::from_le_bytes([header[14], header[15]]);
    if slen != 2 {
        return Err(CodecError::corrupt(format!("subfield length {slen}, expected 2")));
    }

    let block_size = usize::from(u16::from_le_bytes([header[16], header[17]])) + 1;
    if block_size < BGZF_HEADER_SIZE + BGZF_FOOTER_SIZE {
        return Err(CodecError::corrupt(format!("block too small: {block_size} bytes")));
    }

    Ok(block_size)
}

/// Read the CRC32 and ISIZE fields from the footer of a complete block.
#[must_use]
pub fn footer(block: &[u8]) -> (u32, usize) {
    let len = block.len();
    if len < BGZF_FOOTER_SIZE {
        return (0, 0);
    }
    let crc = u32::from_le_bytes([block[len - 8], block[len - 7], block[len - 6], block[len - 5]]);
    let isize = u32::from_le_bytes([block[len - 4], block[len - 3], block[len - 2], block[len - 1]]);
    (crc, isize as usize)
}

// ============================================================================
// Reading
// ============================================================================

/// Fill `buf` from `reader`, returning the number of bytes read (short only at EOF).
fn read_fully<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Read one complete raw block (header + deflate data + footer) into `out`.
///
/// `out` is cleared first. Returns `Ok(Some(size))` when a block was read and
/// `Ok(None)` when the reader was already at end of input.
///
/// # Errors
///
/// - [`CodecError::Truncated`] if the input ends inside the header or body
/// - [`CodecError::CorruptHeader`] if the header is not a BGZF header
/// - [`CodecError::Io`] on read failures
pub fn read_raw_block<R: Read + ?Sized>(reader: &mut R, out: &mut Vec<u8>) -> Result<Option<usize>> {
    out.clear();
    out.resize(BGZF_HEADER_SIZE, 0);

    let got = read_fully(reader, &mut out[..BGZF_HEADER_SIZE])?;
    if got == 0 {
        out.clear();
        return Ok(None);
    }
    if got < BGZF_HEADER_SIZE {
        out.truncate(got);
        return Err(CodecError::Truncated { expected: BGZF_HEADER_SIZE, actual: got });
    }

    let block_size = parse_header(&out[..BGZF_HEADER_SIZE])?;
    out.resize(block_size, 0);

    let body = read_fully(reader, &mut out[BGZF_HEADER_SIZE..])?;
    if body < block_size - BGZF_HEADER_SIZE {
        let actual = BGZF_HEADER_SIZE + body;
        out.truncate(actual);
        return Err(CodecError::Truncated { expected: block_size, actual });
    }

    Ok(Some(block_size))
}

// ============================================================================
// Tests
// ============================================================================
