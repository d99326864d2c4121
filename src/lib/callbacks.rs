//! Output callbacks shipped with the library.
//!
//! - [`StreamChecksums`] - CRC32 of each stream's compressed output and, combined from
//!   the per-block footers, of its uncompressed payload
//! - [`BlockIndexBuilder`] - bgzip-compatible `.gzi` index of each output stream

use std::collections::HashMap;
use std::io::Write;

use blockpipe_bgzf::BlockIndex;
use crc32fast::Hasher;
use parking_lot::Mutex;

use crate::errors::Result;
use crate::output_writer::{BlockEvent, OutputCallback, StreamSummary};

// ============================================================================
// Checksums
// ============================================================================

/// Final checksums of one output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamChecksum {
    /// CRC32 over every output byte, end-of-file marker included.
    pub compressed_crc32: u32,
    /// Output length in bytes.
    pub compressed_len: u64,
    /// CRC32 of the concatenated payloads.
    pub uncompressed_crc32: u32,
    /// Payload length in bytes.
    pub uncompressed_len: u64,
}

#[derive(Default)]
struct ChecksumState {
    compressed: Hasher,
    uncompressed: Hasher,
}

/// Accumulates CRC32s of the output as it is written.
///
/// The uncompressed CRC is never recomputed from payload bytes: each block's footer
/// CRC is folded into the running value with [`Hasher::combine`].
#[derive(Default)]
pub struct StreamChecksums {
    running: Mutex<HashMap<u64, ChecksumState>>,
    finished: Mutex<HashMap<u64, StreamChecksum>>,
}

impl StreamChecksums {
    /// Create an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Checksums of a closed stream.
    #[must_use]
    pub fn get(&self, stream_id: u64) -> Option<StreamChecksum> {
        self.finished.lock().get(&stream_id).copied()
    }
}

impl OutputCallback for StreamChecksums {
    fn on_block(&self, event: &BlockEvent<'_>) -> Result<()> {
        let mut running = self.running.lock();
        let state = running.entry(event.stream_id).or_default();
        state.compressed.update(event.encoded);
        for frame in event.frames {
            let block = Hasher::new_with_initial_len(frame.crc32, frame.uncompressed_size as u64);
            state.uncompressed.combine(&block);
        }
        Ok(())
    }

    fn on_stream_closed(&self, summary: &StreamSummary) -> Result<()> {
        let state = self.running.lock().remove(&summary.stream_id).unwrap_or_default();
        let checksum = StreamChecksum {
            compressed_crc32: state.compressed.finalize(),
            compressed_len: summary.compressed_bytes,
            uncompressed_crc32: state.uncompressed.finalize(),
            uncompressed_len: summary.uncompressed_bytes,
        };
        self.finished.lock().insert(summary.stream_id, checksum);
        Ok(())
    }
}

// ============================================================================
// Block index
// ============================================================================

/// Builds a [`BlockIndex`] per output stream, optionally writing it out on close.
#[derive(Default)]
pub struct BlockIndexBuilder {
    indexes: Mutex<HashMap<u64, BlockIndex>>,
    destinations: Mutex<HashMap<u64, Box<dyn Write + Send>>>,
}

impl BlockIndexBuilder {
    /// Create a builder with no destinations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize the index of `stream_id` to `destination` when the stream closes.
    #[must_use]
    pub fn with_destination(self, stream_id: u64, destination: Box<dyn Write + Send>) -> Self {
        self.destinations.lock().insert(stream_id, destination);
        self
    }

    /// The index built so far for `stream_id`.
    #[must_use]
    pub fn index(&self, stream_id: u64) -> Option<BlockIndex> {
        self.indexes.lock().get(&stream_id).cloned()
    }
}

impl OutputCallback for BlockIndexBuilder {
    fn on_block(&self, event: &BlockEvent<'_>) -> Result<()> {
        let mut indexes = self.indexes.lock();
        let index = indexes.entry(event.stream_id).or_default();
        if event.is_final {
            return Ok(());
        }
        for frame in event.frames {
            index.push(frame.compressed_size, frame.uncompressed_size);
        }
        Ok(())
    }

    fn on_stream_closed(&self, summary: &StreamSummary) -> Result<()> {
        let Some(mut destination) = self.destinations.lock().remove(&summary.stream_id) else {
            return Ok(());
        };
        let index = self.index(summary.stream_id).unwrap_or_default();
        index.write_to(&mut destination)?;
        Ok(())
    }
}
