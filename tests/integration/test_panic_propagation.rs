//! Fatal error tests: the first failing block halts the pool at exactly its position.
//!
//! A failure on block `k` of `M` must leave exactly `k` blocks committed, never let a
//! block after `k` reach the writer, and leave output that decodes to the first `k`
//! payloads.

use std::io::Cursor;
use std::sync::Arc;

use blockpipe_lib::bgzf::CodecError;
use blockpipe_lib::buffer_pool::{Buffer, BufferPool};
use blockpipe_lib::errors::{PipelineError, Result};
use blockpipe_lib::pipeline::{Pipeline, PipelineConfig, TransformContext};
use rstest::rstest;

use crate::helpers::{BgzfInput, BlockRecorder, FailingSink, SharedSink, bgzf_input, gunzip, random_payloads};

const BLOCKS: usize = 12;

fn input() -> BgzfInput {
    bgzf_input(random_payloads(7, BLOCKS, 6000), 6, true)
}

struct Outcome {
    error: PipelineError,
    committed: u64,
    ids: Vec<u64>,
    output: Vec<u8>,
}

fn run_expecting_failure(bytes: Vec<u8>, threads: usize, configure: impl FnOnce(&mut Pipeline)) -> Outcome {
    let sink = SharedSink::new();
    let recorder = BlockRecorder::new();
    let mut pipeline = Pipeline::new(PipelineConfig::new(threads, 6).with_progress_interval(0));
    pipeline.submit_stream_for_reading(Box::new(Cursor::new(bytes)), sink.boxed());
    pipeline.register_output_callback(recorder.clone());
    configure(&mut pipeline);

    let err = pipeline.run_to_completion().unwrap_err();
    Outcome { committed: err.stats.blocks_committed(), error: err.error, ids: recorder.block_ids(0), output: sink.contents() }
}

#[rstest]
#[case(0, 1)]
#[case(0, 4)]
#[case(5, 2)]
#[case(5, 8)]
#[case(11, 4)]
fn test_checksum_mismatch_commits_exactly_k(#[case] k: usize, #[case] threads: usize) {
    let mut input = input();
    input.corrupt_crc(k);
    let outcome = run_expecting_failure(input.bytes.clone(), threads, |_| {});

    assert!(matches!(outcome.error.as_codec(), Some(CodecError::ChecksumMismatch { .. })), "{}", outcome.error);
    assert_eq!(outcome.committed, k as u64);
    assert_eq!(outcome.ids, (0..k as u64).collect::<Vec<_>>());
    assert_eq!(gunzip(&outcome.output), input.prefix(k));
}

#[rstest]
#[case(0)]
#[case(6)]
fn test_corrupt_header_commits_exactly_k(#[case] k: usize) {
    let mut input = input();
    input.corrupt_header(k);
    let outcome = run_expecting_failure(input.bytes.clone(), 4, |_| {});

    assert!(matches!(outcome.error.as_codec(), Some(CodecError::CorruptHeader { .. })), "{}", outcome.error);
    assert_eq!(outcome.committed, k as u64);
    assert_eq!(gunzip(&outcome.output), input.prefix(k));
}

#[rstest]
#[case(1, 1)]
#[case(1, 4)]
#[case(7, 3)]
fn test_zeroed_footer_commits_exactly_k(#[case] k: usize, #[case] threads: usize) {
    let mut input = input();
    input.zero_footer(k);
    let outcome = run_expecting_failure(input.bytes.clone(), threads, |_| {});

    assert!(matches!(outcome.error.as_codec(), Some(CodecError::Inflate(_))), "{}", outcome.error);
    assert_eq!(outcome.committed, k as u64);
    assert_eq!(outcome.ids, (0..k as u64).collect::<Vec<_>>());
    assert_eq!(gunzip(&outcome.output), input.prefix(k));
}

#[test]
fn test_short_read_stops_before_truncated_block() {
    let input = bgzf_input(random_payloads(8, BLOCKS, 6000), 6, false);
    let mut bytes = input.bytes.clone();
    bytes.truncate(bytes.len() - 10);
    let outcome = run_expecting_failure(bytes, 3, |_| {});

    assert!(matches!(outcome.error, PipelineError::ShortRead { stream_id: 0, .. }), "{}", outcome.error);
    assert_eq!(outcome.committed, BLOCKS as u64 - 1);
    assert_eq!(gunzip(&outcome.output), input.prefix(BLOCKS - 1));
}

#[rstest]
#[case(3, 2)]
#[case(9, 6)]
fn test_transform_failure_commits_exactly_k(#[case] k: usize, #[case] threads: usize) {
    let input = input();
    let failing = move |ctx: &TransformContext, buffer: Buffer, _: &BufferPool| -> Result<Buffer> {
        if ctx.block_id == k as u64 {
            return Err(PipelineError::invalid_parameter("payload", format!("block {} rejected", ctx.block_id)));
        }
        Ok(buffer)
    };
    let outcome = run_expecting_failure(input.bytes.clone(), threads, |pipeline| {
        pipeline.register_transform(10, Arc::new(failing)).unwrap();
    });

    assert!(outcome.error.to_string().contains(&format!("block {k} rejected")));
    assert_eq!(outcome.committed, k as u64);
    assert!(outcome.ids.iter().all(|&id| id < k as u64));
}

#[test]
fn test_sink_failure_halts_pool() {
    let input = input();
    let mut pipeline = Pipeline::new(PipelineConfig::new(4, 6).with_progress_interval(0));
    pipeline.submit_stream_for_reading(
        Box::new(Cursor::new(input.bytes.clone())),
        Box::new(FailingSink { written: 0, limit: 1000 }),
    );
    let err = pipeline.run_to_completion().unwrap_err();
    assert!(matches!(err.error, PipelineError::Io(_)), "{}", err.error);
    assert!(err.stats.blocks_committed() < BLOCKS as u64);
    assert!(!err.stats.streams[0].completed);
    assert!(err.to_string().contains("pipeline halted after committing"));
}

#[test]
fn test_failure_on_one_stream_halts_all_streams() {
    let healthy = bgzf_input(random_payloads(9, 400, 6000), 6, true);
    let mut broken = input();
    broken.corrupt_crc(2);

    let mut pipeline = Pipeline::new(PipelineConfig::new(4, 6).with_progress_interval(0));
    pipeline.submit_stream_for_reading(Box::new(Cursor::new(healthy.bytes.clone())), Box::new(std::io::sink()));
    pipeline.submit_stream_for_reading(Box::new(Cursor::new(broken.bytes.clone())), Box::new(std::io::sink()));
    let err = pipeline.run_to_completion().unwrap_err();

    assert!(matches!(err.error.as_codec(), Some(CodecError::ChecksumMismatch { .. })));
    assert_eq!(err.stats.stream(1).unwrap().blocks_committed, 2);
    assert!(!err.stats.stream(1).unwrap().completed);
}

#[test]
fn test_missing_eof_marker_is_soft_by_default() {
    let input = bgzf_input(random_payloads(10, 5, 1000), 6, false);
    let sink = SharedSink::new();
    let mut pipeline = Pipeline::new(PipelineConfig::new(2, 6));
    pipeline.submit_stream_for_reading(Box::new(Cursor::new(input.bytes.clone())), sink.boxed());
    let stats = pipeline.run_to_completion().unwrap();

    assert_eq!(stats.soft_errors, 1);
    assert_eq!(stats.blocks_committed(), 5);
    assert_eq!(gunzip(&sink.contents()), input.concatenated());
}

#[test]
fn test_missing_eof_marker_is_fatal_when_required() {
    let input = bgzf_input(random_payloads(11, 5, 1000), 6, false);
    let sink = SharedSink::new();
    let mut pipeline = Pipeline::new(PipelineConfig::new(2, 6).with_require_eof_marker(true));
    pipeline.submit_stream_for_reading(Box::new(Cursor::new(input.bytes.clone())), sink.boxed());
    let err = pipeline.run_to_completion().unwrap_err();

    assert!(matches!(err.error.as_codec(), Some(CodecError::CorruptHeader { .. })));
    assert_eq!(err.stats.blocks_committed(), 5);
    // Every block was written; only the end-of-file marker is missing.
    assert_eq!(gunzip(&sink.contents()), input.concatenated());
}
