//! Re-encode a BGZF file through the block pipeline.
//!
//! Every block is inflated, verified against its CRC32 and deflated again at the
//! requested level. Oversized payloads written by other tools are split so that every
//! output block carries at most 65280 bytes.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use log::{debug, info};

use blockpipe_lib::callbacks::{BlockIndexBuilder, StreamChecksums};
use blockpipe_lib::logging::{OperationTimer, format_bytes};
use blockpipe_lib::pipeline::Pipeline;

use crate::commands::command::Command;
use crate::commands::common::{BgzfIoOptions, CompressionOptions, PipelineOptions, ThreadingOptions, create_output, open_input};

/// Re-encode a BGZF file at a new compression level.
#[derive(Debug, Parser)]
#[command(
    name = "recompress",
    about = "\x1b[38;5;72m[BGZF]\x1b[0m           \x1b[36mRe-encode a BGZF file at a new compression level\x1b[0m",
    long_about = r#"
Re-encode a BGZF file through the parallel block pipeline.

Blocks are decompressed, checked against their CRC32 and recompressed on a shared pool
of worker threads, then written in their original order. The output always ends with
exactly one BGZF end-of-file marker block. A bgzip-compatible .gzi index of the output
can be written alongside it.

Example usage:
  blockpipe recompress -i in.bgz -o out.bgz --compression-level 9 --threads 8
  blockpipe recompress -i in.bgz -o out.bgz --index out.bgz.gzi
"#
)]
pub struct Recompress {
    /// Input/output options
    #[command(flatten)]
    pub io: BgzfIoOptions,

    /// Threading options
    #[command(flatten)]
    pub threading: ThreadingOptions,

    /// Compression options for output blocks
    #[command(flatten)]
    pub compression: CompressionOptions,

    /// Pipeline tuning options
    #[command(flatten)]
    pub pipeline: PipelineOptions,

    /// Write a .gzi block index of the output to this path
    #[arg(long = "index")]
    pub index: Option<PathBuf>,
}

impl Command for Recompress {
    fn execute(&self, command_line: &str) -> Result<()> {
        debug!("Command line: {command_line}");
        self.io.validate()?;

        info!("Input: {}", self.io.input.display());
        info!("Output: {}", self.io.output.display());
        info!("Compression level: {}", self.compression.compression_level);

        let timer = OperationTimer::new("Recompressing");
        let config = self.pipeline.to_config(self.threading.threads, self.compression.compression_level);
        let mut pipeline = Pipeline::new(config);
        let stream = pipeline.submit_stream_for_reading(open_input(&self.io.input)?, create_output(&self.io.output)?);

        let checksums = Arc::new(StreamChecksums::new());
        pipeline.register_output_callback(checksums.clone());
        if let Some(index) = &self.index {
            info!("Index: {}", index.display());
            let destination = BufWriter::new(File::create(index)?);
            let builder = BlockIndexBuilder::new().with_destination(stream.id(), Box::new(destination));
            pipeline.register_output_callback(Arc::new(builder));
        }

        let stats = pipeline.run_to_completion()?;
        if let Some(sums) = checksums.get(stream.id()) {
            info!(
                "Output crc32 {:08x} ({} bytes), payload crc32 {:08x} ({} bytes)",
                sums.compressed_crc32, sums.compressed_len, sums.uncompressed_crc32, sums.uncompressed_len
            );
        }
        info!(
            "Recompressed {} into {}",
            format_bytes(stats.streams.iter().map(|s| s.compressed_bytes_in).sum()),
            format_bytes(stats.compressed_bytes_out())
        );
        timer.log_completion(stats.blocks_committed(), stats.uncompressed_bytes());
        Ok(())
    }
}
