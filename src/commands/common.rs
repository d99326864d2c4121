//! Common CLI options shared across commands.
//!
//! This module provides shared argument structures that can be composed into
//! command structs using `#[command(flatten)]`.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Args;

use blockpipe_lib::pipeline::PipelineConfig;

/// Returns true if the path is "-" or "/dev/stdin".
pub fn is_stdin_path<P: AsRef<Path>>(path: P) -> bool {
    let path_str = path.as_ref().to_string_lossy();
    path_str == "-" || path_str == "/dev/stdin"
}

/// Returns true if the path is "-" or "/dev/stdout".
pub fn is_stdout_path<P: AsRef<Path>>(path: P) -> bool {
    let path_str = path.as_ref().to_string_lossy();
    path_str == "-" || path_str == "/dev/stdout"
}

/// Open a BGZF input for the pipeline; "-" reads stdin.
pub fn open_input(path: &Path) -> Result<Box<dyn Read + Send>> {
    if is_stdin_path(path) {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let file = File::open(path).with_context(|| format!("Failed to open input {}", path.display()))?;
    Ok(Box::new(BufReader::new(file)))
}

/// Create an output for the pipeline; "-" writes stdout.
pub fn create_output(path: &Path) -> Result<Box<dyn Write + Send>> {
    if is_stdout_path(path) {
        return Ok(Box::new(BufWriter::new(io::stdout())));
    }
    let file = File::create(path).with_context(|| format!("Failed to create output {}", path.display()))?;
    Ok(Box::new(BufWriter::new(file)))
}

/// Check that an input path exists (skipped for stdin paths).
pub fn validate_input(path: &Path) -> Result<()> {
    if !is_stdin_path(path) && !path.exists() {
        bail!("Input BGZF file does not exist: {}", path.display());
    }
    Ok(())
}

/// Common input/output options for commands that read a BGZF file and write a BGZF file.
#[derive(Debug, Clone, Args)]
pub struct BgzfIoOptions {
    /// Input BGZF file ("-" for stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// Output BGZF file ("-" for stdout)
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,
}

impl BgzfIoOptions {
    /// Validates that the input file exists (skipped for stdin paths).
    ///
    /// # Errors
    ///
    /// Returns an error if the input file does not exist.
    pub fn validate(&self) -> Result<()> {
        validate_input(&self.input)
    }
}

/// Options for the worker pool.
///
/// ```bash
/// blockpipe recompress --threads 8 ...
/// ```
#[derive(Debug, Clone, Args)]
pub struct ThreadingOptions {
    /// Number of worker threads.
    #[arg(short = 't', long = "threads", default_value_t = 4)]
    pub threads: usize,
}

/// Options for output compression.
#[derive(Debug, Clone, Default, Args)]
pub struct CompressionOptions {
    /// Compression level for output blocks (0-12).
    ///
    /// Level 0 stores blocks uncompressed; level 1 is fastest with larger files;
    /// level 12 produces the smallest files but is slowest.
    #[arg(long, default_value_t = 1)]
    pub compression_level: u32,
}

/// Options controlling the block pipeline.
#[derive(Debug, Clone, Default, Args)]
pub struct PipelineOptions {
    /// Maximum blocks per stream between read and write (default: 4 per thread).
    #[arg(long = "blocks-in-flight")]
    pub blocks_in_flight: Option<usize>,

    /// Log progress every N committed blocks (0 disables).
    #[arg(long = "progress-interval", default_value_t = 10_000)]
    pub progress_interval: u64,

    /// Fail if an input does not end with the BGZF end-of-file marker block.
    #[arg(long = "require-eof", default_value_t = false)]
    pub require_eof: bool,
}

impl PipelineOptions {
    /// Build a [`PipelineConfig`] from these options.
    pub fn to_config(&self, threads: usize, compression_level: u32) -> PipelineConfig {
        let mut config = PipelineConfig::new(threads, compression_level)
            .with_progress_interval(self.progress_interval)
            .with_require_eof_marker(self.require_eof);
        if let Some(blocks) = self.blocks_in_flight {
            config = config.with_blocks_in_flight(blocks);
        }
        config
    }
}
