//! Configuration and registration errors surface before any input is read.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use blockpipe_lib::bgzf::CodecError;
use blockpipe_lib::buffer_pool::{Buffer, BufferPool};
use blockpipe_lib::errors::{PipelineError, Result};
use blockpipe_lib::pipeline::{
    COMPRESS_DISPATCHER, DECOMPRESS_DISPATCHER, Pipeline, PipelineConfig, READ_DISPATCHER, TransformContext,
};
use rstest::rstest;

use crate::helpers::{SharedSink, WatchedSource, bgzf_input, random_payloads};

fn passthrough(_: &TransformContext, input: Buffer, _: &BufferPool) -> Result<Buffer> {
    Ok(input)
}

#[rstest]
#[case::level_too_high(PipelineConfig::new(2, 13), "level")]
#[case::unit_above_block_limit(PipelineConfig::new(2, 6).with_block_payload_size(70_000), "payload")]
#[case::zero_unit(PipelineConfig::new(2, 6).with_block_payload_size(0), "block_payload_size")]
#[case::zero_threads(PipelineConfig::new(0, 6), "num_threads")]
#[case::zero_in_flight(PipelineConfig::new(2, 6).with_blocks_in_flight(0), "blocks_in_flight")]
fn test_invalid_config_never_reads_input(#[case] config: PipelineConfig, #[case] mentions: &str) {
    let input = bgzf_input(random_payloads(61, 3, 100), 6, true);
    let (source, touched) = WatchedSource::new(input.bytes);
    let sink = SharedSink::new();

    let mut pipeline = Pipeline::new(config);
    pipeline.submit_stream_for_reading(Box::new(source), sink.boxed());
    let err = pipeline.run_to_completion().unwrap_err();

    assert!(err.error.to_string().contains(mentions), "{}", err.error);
    assert!(!touched.load(Ordering::SeqCst));
    assert!(sink.contents().is_empty());
    assert_eq!(err.stats.blocks_committed(), 0);
}

#[test]
fn test_level_error_is_codec_error() {
    let mut pipeline = Pipeline::new(PipelineConfig::new(1, 42));
    pipeline.submit_stream_for_reading(Box::new(std::io::empty()), Box::new(std::io::sink()));
    let err = pipeline.run_to_completion().unwrap_err();
    assert!(matches!(err.error.as_codec(), Some(CodecError::InvalidLevel(42))));
}

#[rstest]
#[case(READ_DISPATCHER)]
#[case(DECOMPRESS_DISPATCHER)]
#[case(COMPRESS_DISPATCHER)]
fn test_reserved_dispatcher_ids_are_rejected(#[case] id: u64) {
    let mut pipeline = Pipeline::new(PipelineConfig::default());
    let err = pipeline.register_transform(id, Arc::new(passthrough)).unwrap_err();
    assert!(matches!(err, PipelineError::DuplicateDispatcher(rejected) if rejected == id));
}

#[test]
fn test_duplicate_transform_id_is_rejected() {
    let mut pipeline = Pipeline::new(PipelineConfig::default());
    pipeline.register_transform(7, Arc::new(passthrough)).unwrap();
    assert!(matches!(pipeline.register_transform(7, Arc::new(passthrough)), Err(PipelineError::DuplicateDispatcher(7))));
}

#[test]
fn test_corrupt_first_block_reads_nothing_further() {
    let mut input = bgzf_input(random_payloads(62, 3, 100), 6, true);
    input.corrupt_header(0);
    let sink = SharedSink::new();

    let mut pipeline = Pipeline::new(PipelineConfig::new(2, 6));
    pipeline.submit_stream_for_reading(Box::new(std::io::Cursor::new(input.bytes.clone())), sink.boxed());
    let err = pipeline.run_to_completion().unwrap_err();

    assert!(matches!(err.error.as_codec(), Some(CodecError::CorruptHeader { .. })));
    assert!(sink.contents().is_empty());
    assert_eq!(err.stats.stream(0).unwrap().blocks_read, 1);
}
