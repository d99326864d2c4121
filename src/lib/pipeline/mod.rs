//! Parallel BGZF block pipeline.
//!
//! A [`Pipeline`] reads any number of BGZF streams, inflates every block, runs the
//! payload through zero or more [`BlockTransform`]s, deflates it again and writes the
//! result to each stream's sink. All stages run on one fixed [`ThreadPool`]; each
//! stream's blocks are written in the order they were read no matter which worker
//! finishes first.
//!
//! ```no_run
//! use std::fs::File;
//! use blockpipe_lib::pipeline::{Pipeline, PipelineConfig};
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut pipeline = Pipeline::new(PipelineConfig::new(8, 1));
//! pipeline.submit_stream_for_reading(Box::new(File::open("in.bgz")?), Box::new(File::create("out.bgz")?));
//! let stats = pipeline.run_to_completion()?;
//! println!("{} blocks", stats.blocks_committed());
//! # Ok(())
//! # }
//! ```
//!
//! # Errors and partial output
//!
//! Errors tied to a block (corrupt header, checksum mismatch, short read, transform
//! failure) halt the pool when that block is next in line to be written. Everything
//! before it has been written, nothing after it is, and the output is a valid truncation
//! point of the stream. The first error and the statistics at the halt are returned in
//! a [`FatalError`].

mod config;
mod stages;
mod stats;

pub use config::{MAX_SUB_UNITS, PipelineConfig};
pub use stages::{BlockTask, COMPRESS_DISPATCHER, DECOMPRESS_DISPATCHER, READ_DISPATCHER, RESERVED_DISPATCHERS};
pub use stats::{PipelineStats, StreamStats};

use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Instant;

use blockpipe_bgzf::BlockCodec;
use log::{debug, info, warn};

use crate::buffer_pool::{Buffer, BufferPool};
use crate::errors::{FatalError, PipelineError, Result};
use crate::output_writer::{OutputCallback, OutputWriter, WriterState};
use crate::thread_pool::ThreadPool;

use stages::PipelineShared;

/// Identifies a stream submitted to a [`Pipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamHandle {
    id: u64,
}

impl StreamHandle {
    /// Stream id used in block events, errors and statistics.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Which block a transform is working on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformContext {
    /// Stream the block belongs to.
    pub stream_id: u64,
    /// Position of the block in its stream.
    pub block_id: u64,
}

/// A stage that rewrites a block's inflated payload.
///
/// The transform owns `input` and returns the buffer to pass on, either `input` itself
/// or a new buffer taken from `pool`. It should take at most one buffer from `pool`
/// per call. The output may be larger than one BGZF block; it is split across as many
/// output blocks as needed.
pub trait BlockTransform: Send + Sync {
    /// Transform one payload.
    fn transform(&self, ctx: &TransformContext, input: Buffer, pool: &BufferPool) -> Result<Buffer>;
}

impl<F> BlockTransform for F
where
    F: Fn(&TransformContext, Buffer, &BufferPool) -> Result<Buffer> + Send + Sync,
{
    fn transform(&self, ctx: &TransformContext, input: Buffer, pool: &BufferPool) -> Result<Buffer> {
        self(ctx, input, pool)
    }
}

/// Builder and runner for one pipeline execution.
pub struct Pipeline {
    config: PipelineConfig,
    streams: Vec<(Box<dyn Read + Send>, Box<dyn Write + Send>)>,
    transforms: Vec<(u64, Arc<dyn BlockTransform>)>,
    callbacks: Vec<Arc<dyn OutputCallback>>,
}

impl Pipeline {
    /// Create a pipeline; the configuration is validated by [`run_to_completion`](Self::run_to_completion).
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self { config, streams: Vec::new(), transforms: Vec::new(), callbacks: Vec::new() }
    }

    /// Add a BGZF `source` whose recompressed blocks go to `sink`.
    ///
    /// Streams are numbered from zero in submission order.
    pub fn submit_stream_for_reading(
        &mut self,
        source: Box<dyn Read + Send>,
        sink: Box<dyn Write + Send>,
    ) -> StreamHandle {
        let id = self.streams.len() as u64;
        self.streams.push((source, sink));
        StreamHandle { id }
    }

    /// Add a transform stage under `dispatcher_id`. Transforms run in registration order.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DuplicateDispatcher`] if the id is taken, including the
    /// ids in [`RESERVED_DISPATCHERS`].
    pub fn register_transform(&mut self, dispatcher_id: u64, handler: Arc<dyn BlockTransform>) -> Result<()> {
        let taken = RESERVED_DISPATCHERS.contains(&dispatcher_id)
            || self.transforms.iter().any(|(id, _)| *id == dispatcher_id);
        if taken {
            return Err(PipelineError::DuplicateDispatcher(dispatcher_id));
        }
        self.transforms.push((dispatcher_id, handler));
        Ok(())
    }

    /// Add a callback notified of every block written, on every stream.
    pub fn register_output_callback(&mut self, callback: Arc<dyn OutputCallback>) {
        self.callbacks.push(callback);
    }

    /// Run every submitted stream to its end, or until the first fatal error.
    ///
    /// # Errors
    ///
    /// Returns a [`FatalError`] with the first recorded error and the statistics of what
    /// was committed. Configuration errors are reported before any block is read.
    pub fn run_to_completion(self) -> std::result::Result<PipelineStats, FatalError> {
        let Self { config, streams, transforms, callbacks } = self;
        if let Err(error) = config.validate() {
            return Err(FatalError { error, stats: PipelineStats::default() });
        }
        if streams.is_empty() {
            debug!("No streams submitted; nothing to do");
            return Ok(PipelineStats::default());
        }

        let threads = config.num_threads;
        info!(
            "Starting pipeline: {} stream(s), {} thread(s), level {}, {} transform(s)",
            streams.len(),
            threads,
            config.compression_level,
            transforms.len()
        );

        let parts = streams
            .into_iter()
            .enumerate()
            .map(|(i, (source, sink))| {
                let stream_id = i as u64;
                ((stream_id, source), OutputWriter::new(stream_id, sink, callbacks.clone()))
            })
            .collect();
        let first_transform = transforms.first().map(|(id, _)| *id);
        let shared = Arc::new(PipelineShared::new(config, parts, first_transform));

        let registry = match stages::build_registry(&shared, &transforms) {
            Ok(registry) => registry,
            Err(error) => return Err(FatalError { error, stats: collect_stats(&shared, 0, Instant::now()) }),
        };

        let start = Instant::now();
        let pool = ThreadPool::start(threads, registry, |_| BlockCodec::new());
        let handle = pool.handle().clone();
        {
            let shared = Arc::clone(&shared);
            handle.on_halt(move || shared.close_pools());
        }
        for stream_id in 0..shared.streams.len() as u64 {
            handle.submit(stages::read_package(stream_id));
        }

        let joined = pool.join();
        shared.log_progress();
        let stats = collect_stats(&shared, handle.panic_flag().soft_error_count(), start);

        if let Some(error) = handle.panic_flag().take_error() {
            warn!("Pipeline halted: {error}");
            return Err(FatalError { error, stats });
        }
        if let Err(error) = joined {
            return Err(FatalError { error, stats });
        }
        stats.log_summary();
        Ok(stats)
    }
}

/// Flush writers left open by a halt, release pending completions and gather counters.
fn collect_stats(shared: &PipelineShared, soft_errors: u64, start: Instant) -> PipelineStats {
    let streams = shared
        .streams
        .iter()
        .map(|stream| {
            let mut writer = stream.writer.lock();
            let completed = writer.state() == WriterState::Closed;
            if !completed {
                if let Err(e) = writer.flush() {
                    warn!("Failed to flush partial output of stream {}: {e}", stream.reader.stream_id());
                }
            }
            let summary = writer.summary();
            debug!(
                "Stream {} reorder buffer peaked at {} blocks",
                summary.stream_id,
                stream.reorder.lock().peak()
            );
            StreamStats {
                stream_id: summary.stream_id,
                blocks_read: stream.reader.blocks_issued(),
                blocks_committed: summary.blocks,
                compressed_bytes_in: stream.reader.bytes_read(),
                compressed_bytes_out: summary.compressed_bytes,
                uncompressed_bytes: summary.uncompressed_bytes,
                completed,
            }
        })
        .collect();

    let discarded = shared.discard_pending();
    if discarded > 0 {
        debug!("Discarded {discarded} completed block(s) behind the halt point");
    }
    let buffers_outstanding = shared.buffers_outstanding();
    if buffers_outstanding > 0 {
        warn!("{buffers_outstanding} pool buffer(s) were not returned");
    }
    PipelineStats { streams, soft_errors, elapsed: start.elapsed(), buffers_outstanding }
}
