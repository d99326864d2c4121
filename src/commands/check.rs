//! Validate BGZF files without writing anything.
//!
//! Every block is inflated and checked against its CRC32. The payload checksum of each
//! file is folded from per-block CRCs computed by a transform stage, which then empties
//! the payload so nothing is recompressed.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use crc32fast::Hasher;
use log::{debug, info};
use parking_lot::Mutex;

use blockpipe_lib::buffer_pool::{Buffer, BufferPool};
use blockpipe_lib::errors;
use blockpipe_lib::logging::{OperationTimer, format_bytes, format_count};
use blockpipe_lib::pipeline::{BlockTransform, Pipeline, TransformContext};
use blockpipe_lib::reorder_buffer::ReorderBuffer;

use crate::commands::command::Command;
use crate::commands::common::{PipelineOptions, ThreadingOptions, open_input, validate_input};

const DIGEST_DISPATCHER: u64 = 100;

/// Running payload checksum of one stream.
///
/// Block CRCs are folded in block order as soon as the prefix is contiguous, so only
/// blocks that finished ahead of an earlier one are held.
#[derive(Default)]
struct StreamDigest {
    pending: ReorderBuffer<(u32, u64)>,
    hasher: Hasher,
    len: u64,
}

impl StreamDigest {
    fn record(&mut self, block_id: u64, crc: u32, len: u64) {
        self.pending.insert(block_id, (crc, len));
        for (crc, block_len) in self.pending.drain_ready() {
            self.hasher.combine(&Hasher::new_with_initial_len(crc, block_len));
            self.len += block_len;
        }
    }
}

/// Payload CRC32 of every stream, assembled from per-block CRCs.
#[derive(Default)]
pub struct PayloadDigest {
    streams: Mutex<BTreeMap<u64, StreamDigest>>,
}

impl PayloadDigest {
    /// CRC32 and length of the concatenated payloads of `stream_id`.
    pub fn stream_checksum(&self, stream_id: u64) -> (u32, u64) {
        self.streams
            .lock()
            .get(&stream_id)
            .map_or((Hasher::new().finalize(), 0), |digest| (digest.hasher.clone().finalize(), digest.len))
    }

    /// Largest number of block CRCs held for `stream_id` while waiting on an earlier block.
    pub fn peak_pending(&self, stream_id: u64) -> usize {
        self.streams.lock().get(&stream_id).map_or(0, |digest| digest.pending.peak())
    }
}

impl BlockTransform for PayloadDigest {
    fn transform(&self, ctx: &TransformContext, mut input: Buffer, _: &BufferPool) -> errors::Result<Buffer> {
        let crc = crc32fast::hash(&input);
        self.streams.lock().entry(ctx.stream_id).or_default().record(ctx.block_id, crc, input.len() as u64);
        input.as_mut_vec().clear();
        Ok(input)
    }
}

/// Decode BGZF files and report their payload checksums.
#[derive(Debug, Parser)]
#[command(
    name = "check",
    about = "\x1b[38;5;72m[BGZF]\x1b[0m           \x1b[36mValidate BGZF files and report payload checksums\x1b[0m",
    long_about = r#"
Decode one or more BGZF files on the parallel block pipeline without writing output.

Every block's header and CRC32 are verified. For each file the number of blocks, the
payload size and the CRC32 of the concatenated payload are reported. The command fails
at the first corrupt block.

Example usage:
  blockpipe check -i a.bgz -i b.bgz --threads 8
  blockpipe check -i a.bgz --require-eof
"#
)]
pub struct Check {
    /// Input BGZF files ("-" for stdin)
    #[arg(short = 'i', long = "input", required = true, num_args = 1..)]
    pub inputs: Vec<PathBuf>,

    /// Threading options
    #[command(flatten)]
    pub threading: ThreadingOptions,

    /// Pipeline tuning options
    #[command(flatten)]
    pub pipeline: PipelineOptions,
}

impl Command for Check {
    fn execute(&self, command_line: &str) -> Result<()> {
        debug!("Command line: {command_line}");
        for input in &self.inputs {
            validate_input(input)?;
        }

        let timer = OperationTimer::new("Checking");
        let mut pipeline = Pipeline::new(self.pipeline.to_config(self.threading.threads, 0));
        let digest = Arc::new(PayloadDigest::default());
        pipeline.register_transform(DIGEST_DISPATCHER, digest.clone())?;

        let mut handles = Vec::with_capacity(self.inputs.len());
        for input in &self.inputs {
            let handle = pipeline.submit_stream_for_reading(open_input(input)?, Box::new(std::io::sink()));
            handles.push((input, handle));
        }

        let stats = pipeline.run_to_completion()?;
        let mut total_bytes = 0;
        for (input, handle) in handles {
            let (crc, len) = digest.stream_checksum(handle.id());
            let blocks = stats.stream(handle.id()).map_or(0, |s| s.blocks_committed);
            total_bytes += len;
            info!(
                "{}: {} blocks, {} payload, crc32 {crc:08x}",
                input.display(),
                format_count(blocks),
                format_bytes(len)
            );
        }
        timer.log_completion(stats.blocks_committed(), total_bytes);
        Ok(())
    }
}
