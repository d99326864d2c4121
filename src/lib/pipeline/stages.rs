//! Stage dispatchers and the in-order commit path.
//!
//! ```text
//!  Read ──▶ Decompress ──▶ Transform* ──▶ fan-out ──▶ Compress ×n ──▶ assemble
//!                                                                        │
//!  writer ◀── try_write ◀── ReorderBuffer ◀──────── complete ◀───────────┘
//! ```
//!
//! Every block ends in [`complete`], successful or not. Failures travel through the
//! reorder buffer like any other completion and only halt the pool once they are next
//! in line, so the blocks before a failure are always committed and the blocks after
//! it never are.

use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use blockpipe_bgzf::{BlockCodec, CodecError, FrameInfo, MAX_BLOCK_SIZE};
use log::debug;
use parking_lot::Mutex;

use crate::block::{BlockFailure, Completion, PendingBlock};
use crate::buffer_pool::{Buffer, BufferPool, BufferPoolConfig, SubBlockGroup};
use crate::errors::{PipelineError, Result};
use crate::input_reader::InputReader;
use crate::output_writer::OutputWriter;
use crate::progress::ProgressTracker;
use crate::reorder_buffer::ReorderBuffer;
use crate::thread_pool::{Dispatcher, DispatcherRegistry, PoolHandle, WorkPackage};

use super::config::{MAX_SUB_UNITS, PipelineConfig};
use super::{BlockTransform, TransformContext};

// ============================================================================
// Dispatcher ids and priorities
// ============================================================================

/// Dispatcher id of the read stage.
pub const READ_DISPATCHER: u64 = 0;
/// Dispatcher id of the decompress stage.
pub const DECOMPRESS_DISPATCHER: u64 = 1;
/// Dispatcher id of the compress stage.
pub const COMPRESS_DISPATCHER: u64 = 2;
/// Ids reserved for built-in stages; transforms must use others.
pub const RESERVED_DISPATCHERS: [u64; 3] = [READ_DISPATCHER, DECOMPRESS_DISPATCHER, COMPRESS_DISPATCHER];

// Later stages run first so finished work drains before new blocks are read.
const READ_PRIORITY: u64 = 0;
const DECOMPRESS_PRIORITY: u64 = 1;
const TRANSFORM_PRIORITY: u64 = 2;
const COMPRESS_PRIORITY: u64 = 3;

// ============================================================================
// Payloads
// ============================================================================

/// Payload of every pipeline work package.
pub enum BlockTask {
    /// Read the next block of a stream.
    Read {
        /// Stream to read from
        stream_id: u64,
    },
    /// A whole block between stages.
    Block(PendingBlock),
    /// One slice of a block's payload to compress.
    SubUnit(SubUnit),
}

impl BlockTask {
    fn kind(&self) -> &'static str {
        match self {
            Self::Read { .. } => "read",
            Self::Block(_) => "block",
            Self::SubUnit(_) => "sub-unit",
        }
    }
}

/// A range of a shared payload, compressed into one output block.
pub struct SubUnit {
    sub_id: usize,
    range: Range<usize>,
    group: Arc<SubBlockGroup>,
    assembly: Arc<Assembly>,
}

fn unexpected(stage: &str, task: &BlockTask) -> PipelineError {
    PipelineError::PoolPanic(format!("{stage} stage received a {} package", task.kind()))
}

// ============================================================================
// Shared state
// ============================================================================

#[derive(Debug, Default)]
struct Flow {
    /// Blocks read but not yet committed.
    in_flight: usize,
    /// The read package was not resubmitted because `in_flight` hit the limit.
    parked: bool,
    /// The reader produced its sentinel or failed.
    exhausted: bool,
}

/// Per-stream ordering and output state.
pub(super) struct StreamState {
    pub(super) reader: InputReader,
    pub(super) writer: Mutex<OutputWriter>,
    pub(super) reorder: Mutex<ReorderBuffer<Completion>>,
    flow: Mutex<Flow>,
}

/// State shared by every dispatcher of one run.
pub(super) struct PipelineShared {
    pub(super) config: PipelineConfig,
    pub(super) streams: Vec<StreamState>,
    first_transform: Option<u64>,
    raw_pool: BufferPool,
    payload_pool: BufferPool,
    encoded_pool: BufferPool,
    progress: ProgressTracker,
    streams_remaining: AtomicUsize,
}

impl PipelineShared {
    /// Build the stream states and size the buffer pools from the in-flight limit.
    pub(super) fn new(
        config: PipelineConfig,
        streams: Vec<(InputReaderParts, OutputWriter)>,
        first_transform: Option<u64>,
    ) -> Self {
        let in_flight_total = config.blocks_in_flight * streams.len().max(1);
        let raw_pool = BufferPool::new("raw", BufferPoolConfig::fixed(MAX_BLOCK_SIZE, in_flight_total));
        let payload_pool = BufferPool::new("payload", BufferPoolConfig::growable(MAX_BLOCK_SIZE, in_flight_total * 2));
        let encoded_pool =
            BufferPool::new("encoded", BufferPoolConfig::growable(MAX_BLOCK_SIZE, in_flight_total * MAX_SUB_UNITS));

        let streams: Vec<StreamState> = streams
            .into_iter()
            .map(|((stream_id, source), writer)| StreamState {
                reader: InputReader::new(stream_id, source, raw_pool.clone()),
                writer: Mutex::new(writer),
                reorder: Mutex::new(ReorderBuffer::new()),
                flow: Mutex::new(Flow::default()),
            })
            .collect();

        let progress = ProgressTracker::new("Committed").with_interval(config.progress_interval);
        let streams_remaining = AtomicUsize::new(streams.len());
        Self {
            config,
            streams,
            first_transform,
            raw_pool,
            payload_pool,
            encoded_pool,
            progress,
            streams_remaining,
        }
    }

    /// Close every buffer pool, waking workers blocked in `acquire`.
    pub(super) fn close_pools(&self) {
        self.raw_pool.close();
        self.payload_pool.close();
        self.encoded_pool.close();
    }

    /// Drop completions still waiting for an earlier block, returning their buffers.
    pub(super) fn discard_pending(&self) -> usize {
        self.streams
            .iter()
            .map(|stream| std::mem::take(&mut *stream.reorder.lock()).len())
            .sum()
    }

    /// Buffers checked out of any pool.
    pub(super) fn buffers_outstanding(&self) -> usize {
        self.raw_pool.checked_out() + self.payload_pool.checked_out() + self.encoded_pool.checked_out()
    }

    /// Log the final progress line.
    pub(super) fn log_progress(&self) {
        self.progress.log_final();
    }

    fn stream(&self, stream_id: u64) -> Result<&StreamState> {
        self.streams
            .get(stream_id as usize)
            .ok_or_else(|| PipelineError::PoolPanic(format!("no stream with id {stream_id}")))
    }
}

/// Source half of a stream before the reader is built.
pub(super) type InputReaderParts = (u64, Box<dyn std::io::Read + Send>);

// ============================================================================
// Registry
// ============================================================================

/// Register the built-in stages plus `transforms`, chained in the given order.
pub(super) fn build_registry(
    shared: &Arc<PipelineShared>,
    transforms: &[(u64, Arc<dyn BlockTransform>)],
) -> Result<DispatcherRegistry<BlockTask, BlockCodec>> {
    let mut registry = DispatcherRegistry::new();
    registry.register(READ_DISPATCHER, Box::new(ReadStage { shared: Arc::clone(shared) }))?;
    registry.register(DECOMPRESS_DISPATCHER, Box::new(DecompressStage { shared: Arc::clone(shared) }))?;
    registry.register(COMPRESS_DISPATCHER, Box::new(CompressStage { shared: Arc::clone(shared) }))?;

    for (i, (id, handler)) in transforms.iter().enumerate() {
        let next = transforms.get(i + 1).map(|(next, _)| *next);
        let stage = TransformStage { shared: Arc::clone(shared), handler: Arc::clone(handler), next };
        registry.register(*id, Box::new(stage))?;
    }
    Ok(registry)
}

/// The package that starts (or resumes) reading `stream_id`.
pub(super) fn read_package(stream_id: u64) -> WorkPackage<BlockTask> {
    WorkPackage::new(READ_PRIORITY, READ_DISPATCHER, 0, BlockTask::Read { stream_id })
}

// ============================================================================
// Read
// ============================================================================

struct ReadStage {
    shared: Arc<PipelineShared>,
}

impl Dispatcher<BlockTask, BlockCodec> for ReadStage {
    fn dispatch(&self, package: WorkPackage<BlockTask>, pool: &PoolHandle<BlockTask>, _: &mut BlockCodec) -> Result<()> {
        let BlockTask::Read { stream_id } = package.payload else {
            return Err(unexpected("read", &package.payload));
        };
        let stream = self.shared.stream(stream_id)?;

        {
            let mut flow = stream.flow.lock();
            if flow.exhausted {
                return Ok(());
            }
            flow.in_flight += 1;
        }

        let result = stream.reader.read_next_block();
        let ends_stream = !matches!(result, Ok(ref block) if !block.is_final);

        {
            let mut flow = stream.flow.lock();
            if ends_stream {
                flow.exhausted = true;
            } else if flow.in_flight < self.shared.config.blocks_in_flight {
                pool.submit(read_package(stream_id));
            } else {
                flow.parked = true;
            }
        }

        match result {
            Ok(block) if block.is_final => {
                let completion = self.check_eof_marker(stream, block, pool);
                complete(&self.shared, pool, completion);
            }
            Ok(block) => {
                let block_id = block.block_id;
                pool.submit(WorkPackage::new(DECOMPRESS_PRIORITY, DECOMPRESS_DISPATCHER, block_id, BlockTask::Block(block)));
            }
            Err(failure) => complete(&self.shared, pool, Err(failure)),
        }
        Ok(())
    }
}

impl ReadStage {
    fn check_eof_marker(&self, stream: &StreamState, sentinel: PendingBlock, pool: &PoolHandle<BlockTask>) -> Completion {
        if stream.reader.ended_with_eof_marker() {
            return Ok(sentinel);
        }
        let stream_id = sentinel.stream_id;
        if self.shared.config.require_eof_marker {
            let error = CodecError::CorruptHeader { reason: format!("stream {stream_id} has no end-of-file marker block") };
            return Err(BlockFailure::new(stream_id, sentinel.block_id, error));
        }
        pool.panic_flag().raise_soft(&format!("Stream {stream_id} ended without a BGZF end-of-file marker"));
        Ok(sentinel)
    }
}

// ============================================================================
// Decompress
// ============================================================================

struct DecompressStage {
    shared: Arc<PipelineShared>,
}

impl Dispatcher<BlockTask, BlockCodec> for DecompressStage {
    fn dispatch(&self, package: WorkPackage<BlockTask>, pool: &PoolHandle<BlockTask>, codec: &mut BlockCodec) -> Result<()> {
        let BlockTask::Block(mut block) = package.payload else {
            return Err(unexpected("decompress", &package.payload));
        };
        match self.decompress(codec, &mut block) {
            Ok(()) => forward(&self.shared, pool, self.shared.first_transform, block),
            Err(error) => {
                debug!("Block {} of stream {} failed to decompress: {error}", block.block_id, block.stream_id);
                complete(&self.shared, pool, Err(BlockFailure::new(block.stream_id, block.block_id, error)));
            }
        }
        Ok(())
    }
}

impl DecompressStage {
    fn decompress(&self, codec: &mut BlockCodec, block: &mut PendingBlock) -> Result<()> {
        let raw = block
            .raw
            .take()
            .ok_or_else(|| PipelineError::PoolPanic(format!("block {} reached decompression without data", block.block_id)))?;
        let mut decoded = self.shared.payload_pool.acquire()?;
        let frame = codec.decompress_into(&raw, decoded.as_mut_vec())?;
        block.decoded = Some(decoded);
        block.input_frame = Some(frame);
        Ok(())
    }
}

// ============================================================================
// Transform
// ============================================================================

struct TransformStage {
    shared: Arc<PipelineShared>,
    handler: Arc<dyn BlockTransform>,
    next: Option<u64>,
}

impl Dispatcher<BlockTask, BlockCodec> for TransformStage {
    fn dispatch(&self, package: WorkPackage<BlockTask>, pool: &PoolHandle<BlockTask>, _: &mut BlockCodec) -> Result<()> {
        let BlockTask::Block(mut block) = package.payload else {
            return Err(unexpected("transform", &package.payload));
        };
        let Some(input) = block.decoded.take() else {
            forward(&self.shared, pool, self.next, block);
            return Ok(());
        };

        let ctx = TransformContext { stream_id: block.stream_id, block_id: block.block_id };
        match self.handler.transform(&ctx, input, &self.shared.payload_pool) {
            Ok(output) => {
                block.decoded = Some(output);
                forward(&self.shared, pool, self.next, block);
            }
            Err(error) => {
                complete(&self.shared, pool, Err(BlockFailure::new(block.stream_id, block.block_id, error)));
            }
        }
        Ok(())
    }
}

/// Hand `block` to transform `next`, or fan it out for compression after the last one.
fn forward(shared: &PipelineShared, pool: &PoolHandle<BlockTask>, next: Option<u64>, block: PendingBlock) {
    match next {
        Some(id) => {
            let block_id = block.block_id;
            pool.submit(WorkPackage::new(TRANSFORM_PRIORITY, id, block_id, BlockTask::Block(block)));
        }
        None => fan_out(shared, pool, block),
    }
}

// ============================================================================
// Compress
// ============================================================================

/// Split a block's payload into sub-units and submit one compress package per unit.
fn fan_out(shared: &PipelineShared, pool: &PoolHandle<BlockTask>, mut block: PendingBlock) {
    let Some(payload) = block.decoded.take().filter(|payload| !payload.is_empty()) else {
        complete(shared, pool, Ok(block));
        return;
    };

    let unit_size = shared.config.block_payload_size;
    let ranges = SubBlockGroup::split(payload.len(), unit_size);
    if ranges.len() > MAX_SUB_UNITS {
        let error = CodecError::BufferTooLarge { size: payload.len(), max: unit_size * MAX_SUB_UNITS };
        complete(shared, pool, Err(BlockFailure::new(block.stream_id, block.block_id, error)));
        return;
    }

    let block_id = block.block_id;
    let units = ranges.len();
    let group = SubBlockGroup::new(payload, units);
    let assembly = Arc::new(Assembly::new(block, units));
    for (sub_id, range) in ranges.into_iter().enumerate() {
        let unit = SubUnit { sub_id, range, group: Arc::clone(&group), assembly: Arc::clone(&assembly) };
        pool.submit(WorkPackage::new(COMPRESS_PRIORITY, COMPRESS_DISPATCHER, block_id, BlockTask::SubUnit(unit)));
    }
}

struct CompressStage {
    shared: Arc<PipelineShared>,
}

impl Dispatcher<BlockTask, BlockCodec> for CompressStage {
    fn dispatch(&self, package: WorkPackage<BlockTask>, pool: &PoolHandle<BlockTask>, codec: &mut BlockCodec) -> Result<()> {
        let BlockTask::SubUnit(unit) = package.payload else {
            return Err(unexpected("compress", &package.payload));
        };
        let result = self.compress(codec, &unit);
        unit.group.return_unit();
        if let Some(completion) = unit.assembly.store(unit.sub_id, result) {
            complete(&self.shared, pool, completion);
        }
        Ok(())
    }
}

impl CompressStage {
    fn compress(&self, codec: &mut BlockCodec, unit: &SubUnit) -> Result<(Buffer, FrameInfo)> {
        let mut encoded = self.shared.encoded_pool.acquire()?;
        let level = self.shared.config.compression_level;
        let frame = unit
            .group
            .with_unit(unit.range.clone(), |bytes| codec.compress_into(bytes, level, encoded.as_mut_vec()))
            .ok_or_else(|| PipelineError::PoolPanic(format!("payload of sub-unit {} was released early", unit.sub_id)))??;
        Ok((encoded, frame))
    }
}

struct AssemblyState {
    block: Option<PendingBlock>,
    parts: Vec<Option<(Buffer, FrameInfo)>>,
    error: Option<PipelineError>,
    remaining: usize,
}

/// Collects the compressed sub-units of one block.
struct Assembly {
    state: Mutex<AssemblyState>,
}

impl Assembly {
    fn new(block: PendingBlock, units: usize) -> Self {
        let parts = std::iter::repeat_with(|| None).take(units).collect();
        Self { state: Mutex::new(AssemblyState { block: Some(block), parts, error: None, remaining: units }) }
    }

    /// Store one sub-unit's result; the last one yields the block's completion.
    fn store(&self, sub_id: usize, result: Result<(Buffer, FrameInfo)>) -> Option<Completion> {
        let mut state = self.state.lock();
        match result {
            Ok(part) => state.parts[sub_id] = Some(part),
            Err(error) => {
                state.error.get_or_insert(error);
            }
        }
        state.remaining -= 1;
        if state.remaining > 0 {
            return None;
        }

        let mut block = state.block.take()?;
        let parts = std::mem::take(&mut state.parts);
        let error = state.error.take();
        drop(state);

        if let Some(error) = error {
            return Some(Err(BlockFailure::new(block.stream_id, block.block_id, error)));
        }

        block.sub_id = parts.len().saturating_sub(1) as u64;
        let mut encoded: Option<Buffer> = None;
        for (buffer, frame) in parts.into_iter().flatten() {
            block.frames.push(frame);
            match encoded.as_mut() {
                Some(first) => first.as_mut_vec().extend_from_slice(&buffer),
                None => encoded = Some(buffer),
            }
        }
        block.encoded = encoded;
        Some(Ok(block))
    }
}

// ============================================================================
// Commit
// ============================================================================

/// Insert a finished block into its stream's reorder buffer and drain what is ready.
fn complete(shared: &PipelineShared, pool: &PoolHandle<BlockTask>, completion: Completion) {
    let (stream_id, block_id) = match &completion {
        Ok(block) => (block.stream_id, block.block_id),
        Err(failure) => (failure.stream_id, failure.block_id),
    };
    let Some(stream) = shared.streams.get(stream_id as usize) else {
        pool.panic(PipelineError::PoolPanic(format!("completion for unknown stream {stream_id}")));
        return;
    };
    stream.reorder.lock().insert(block_id, completion);
    try_write(shared, pool, stream);
}

/// Write the contiguous ready prefix of `stream`, if no other thread is already doing so.
///
/// Whoever holds the writer drains; everyone else returns at once. After releasing the
/// writer the drainer re-checks the buffer, so a completion inserted while it was
/// finishing is never stranded.
fn try_write(shared: &PipelineShared, pool: &PoolHandle<BlockTask>, stream: &StreamState) {
    loop {
        let Some(mut writer) = stream.writer.try_lock() else {
            return;
        };

        loop {
            if pool.is_halted() {
                return;
            }
            let next = stream.reorder.lock().try_pop_next();
            let Some(completion) = next else {
                break;
            };

            let block = match completion {
                Ok(block) => block,
                Err(failure) => {
                    debug!(
                        "Halting at block {} of stream {}: {}",
                        failure.block_id, failure.stream_id, failure.error
                    );
                    pool.panic(failure.error);
                    return;
                }
            };

            if let Err(error) = writer.write(&block) {
                pool.panic(error);
                return;
            }

            if block.is_final {
                finish_stream(shared, pool, block.stream_id);
            } else {
                shared.progress.record(1, block.uncompressed_len() as u64);
                release_slot(stream, pool, block.stream_id);
            }
        }

        drop(writer);
        if !stream.reorder.lock().can_pop() {
            return;
        }
    }
}

/// Free one in-flight slot, resuming a parked reader.
fn release_slot(stream: &StreamState, pool: &PoolHandle<BlockTask>, stream_id: u64) {
    let mut flow = stream.flow.lock();
    flow.in_flight -= 1;
    if flow.parked && !flow.exhausted {
        flow.parked = false;
        pool.submit(read_package(stream_id));
    }
}

fn finish_stream(shared: &PipelineShared, pool: &PoolHandle<BlockTask>, stream_id: u64) {
    debug!("Stream {stream_id} committed its final block");
    if shared.streams_remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
        pool.shutdown();
    }
}
