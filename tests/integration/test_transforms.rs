//! Transform stage tests: chaining, payload growth and sub-unit fan-out.

use std::io::Cursor;
use std::sync::Arc;

use blockpipe_lib::bgzf::{CodecError, MAX_BLOCK_PAYLOAD};
use blockpipe_lib::buffer_pool::{Buffer, BufferPool};
use blockpipe_lib::errors::Result;
use blockpipe_lib::pipeline::{Pipeline, PipelineConfig, TransformContext};

use crate::helpers::{BlockRecorder, SharedSink, bgzf_input, block_payload_sizes, gunzip, random_payloads};

fn append(suffix: &'static [u8]) -> impl Fn(&TransformContext, Buffer, &BufferPool) -> Result<Buffer> {
    move |_: &TransformContext, mut input: Buffer, _: &BufferPool| {
        input.as_mut_vec().extend_from_slice(suffix);
        Ok(input)
    }
}

fn repeat(times: usize) -> impl Fn(&TransformContext, Buffer, &BufferPool) -> Result<Buffer> {
    move |_: &TransformContext, input: Buffer, pool: &BufferPool| {
        let mut output = pool.acquire()?;
        for _ in 0..times {
            output.as_mut_vec().extend_from_slice(&input);
        }
        Ok(output)
    }
}

#[test]
fn test_transforms_run_in_registration_order() {
    let input = bgzf_input(random_payloads(31, 10, 2000), 6, true);
    let sink = SharedSink::new();
    let mut pipeline = Pipeline::new(PipelineConfig::new(3, 6));
    pipeline.submit_stream_for_reading(Box::new(Cursor::new(input.bytes.clone())), sink.boxed());
    pipeline.register_transform(20, Arc::new(append(b"<first>"))).unwrap();
    pipeline.register_transform(10, Arc::new(append(b"<second>"))).unwrap();
    pipeline.run_to_completion().unwrap();

    // The input's end-of-file marker block is an ordinary empty block to the transforms.
    let mut expected = Vec::new();
    for payload in input.payloads.iter().chain(std::iter::once(&Vec::new())) {
        expected.extend_from_slice(payload);
        expected.extend_from_slice(b"<first><second>");
    }
    assert_eq!(gunzip(&sink.contents()), expected);
}

#[test]
fn test_grown_payload_fans_out_into_several_blocks() {
    let input = bgzf_input(random_payloads(32, 6, 40_000), 6, false);
    let sink = SharedSink::new();
    let recorder = BlockRecorder::new();
    let mut pipeline = Pipeline::new(PipelineConfig::new(4, 1));
    pipeline.submit_stream_for_reading(Box::new(Cursor::new(input.bytes.clone())), sink.boxed());
    pipeline.register_transform(10, Arc::new(repeat(5))).unwrap();
    pipeline.register_output_callback(recorder.clone());
    let stats = pipeline.run_to_completion().unwrap();

    let expected: Vec<u8> = input.payloads.iter().flat_map(|p| p.repeat(5)).collect();
    let output = sink.contents();
    assert_eq!(gunzip(&output), expected);
    assert_eq!(stats.uncompressed_bytes(), expected.len() as u64);
    assert!(block_payload_sizes(&output).iter().all(|&size| size <= MAX_BLOCK_PAYLOAD));

    for (event, payload) in recorder.events(0).iter().zip(&input.payloads) {
        assert_eq!(event.frames, (payload.len() * 5).div_ceil(MAX_BLOCK_PAYLOAD));
    }
}

#[test]
fn test_small_unit_size_splits_every_block() {
    let input = bgzf_input(random_payloads(33, 8, 10_000), 6, true);
    let sink = SharedSink::new();
    let config = PipelineConfig::new(2, 6).with_block_payload_size(1000);
    let mut pipeline = Pipeline::new(config);
    pipeline.submit_stream_for_reading(Box::new(Cursor::new(input.bytes.clone())), sink.boxed());
    pipeline.run_to_completion().unwrap();

    let output = sink.contents();
    assert_eq!(gunzip(&output), input.concatenated());
    let sizes = block_payload_sizes(&output);
    assert!(sizes.iter().all(|&size| size <= 1000));
    assert_eq!(sizes.iter().filter(|&&size| size == 0).count(), 1);
}

#[test]
fn test_payload_needing_too_many_units_is_fatal() {
    let input = bgzf_input(vec![vec![b'A'; 100], vec![b'C'; 100], vec![b'G'; 2000]], 6, true);
    let sink = SharedSink::new();
    let config = PipelineConfig::new(2, 6).with_block_payload_size(100);
    let mut pipeline = Pipeline::new(config);
    pipeline.submit_stream_for_reading(Box::new(Cursor::new(input.bytes.clone())), sink.boxed());
    // 2000 bytes * 4 = 80 units of 100 bytes, above the 64-unit limit.
    pipeline.register_transform(10, Arc::new(repeat(4))).unwrap();
    let err = pipeline.run_to_completion().unwrap_err();

    assert!(
        matches!(err.error.as_codec(), Some(CodecError::BufferTooLarge { size: 8000, max: 6400 })),
        "{}",
        err.error
    );
    assert_eq!(err.stats.blocks_committed(), 2);
    assert_eq!(gunzip(&sink.contents()), [vec![b'A'; 400], vec![b'C'; 400]].concat());
}

#[test]
fn test_transform_emptying_payload_writes_nothing() {
    let input = bgzf_input(random_payloads(34, 5, 3000), 6, true);
    let sink = SharedSink::new();
    let recorder = BlockRecorder::new();
    let mut pipeline = Pipeline::new(PipelineConfig::new(2, 6));
    pipeline.submit_stream_for_reading(Box::new(Cursor::new(input.bytes.clone())), sink.boxed());
    pipeline
        .register_transform(10, Arc::new(|_: &TransformContext, mut input: Buffer, _: &BufferPool| -> Result<Buffer> {
            input.as_mut_vec().clear();
            Ok(input)
        }))
        .unwrap();
    pipeline.register_output_callback(recorder.clone());
    let stats = pipeline.run_to_completion().unwrap();

    assert_eq!(sink.contents(), blockpipe_lib::bgzf::BGZF_EOF.to_vec());
    assert_eq!(stats.blocks_committed(), 6);
    assert!(recorder.events(0).iter().all(|event| event.frames == 0 || event.is_final));
}
