//! End-to-end recompression of a small stream with mixed block sizes.
//!
//! The input holds five blocks with payloads of 0, 1, 65536, 65536 and 0 bytes. The
//! two full-size blocks exceed the 65280-byte output payload limit and are each split
//! in two; the empty blocks produce no output; exactly one end-of-file marker closes
//! the output.

use std::io::Cursor;

use blockpipe_lib::bgzf::{BGZF_EOF, BlockCodec, MAX_BLOCK_PAYLOAD};
use blockpipe_lib::pipeline::{Pipeline, PipelineConfig};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::helpers::{BlockRecorder, SharedSink, bgzf_input, block_payload_sizes, gunzip, random_payload, split_blocks};

fn scenario_payloads() -> Vec<Vec<u8>> {
    let mut rng = StdRng::seed_from_u64(42);
    [0usize, 1, 65536, 65536, 0].into_iter().map(|len| random_payload(&mut rng, len)).collect()
}

#[test]
fn test_mixed_block_sizes_reassemble_byte_identically() {
    let input = bgzf_input(scenario_payloads(), 6, false);
    // The trailing empty block is itself the end-of-file marker.
    assert!(input.bytes.ends_with(&BGZF_EOF));

    let sink = SharedSink::new();
    let recorder = BlockRecorder::new();
    let mut pipeline = Pipeline::new(PipelineConfig::new(2, 6));
    let stream = pipeline.submit_stream_for_reading(Box::new(Cursor::new(input.bytes.clone())), sink.boxed());
    pipeline.register_output_callback(recorder.clone());
    let stats = pipeline.run_to_completion().unwrap();

    let output = sink.contents();
    assert_eq!(gunzip(&output), input.concatenated());

    let stream_stats = stats.stream(stream.id()).unwrap();
    assert!(stream_stats.completed);
    assert_eq!(stream_stats.blocks_committed, 5);
    assert_eq!(stream_stats.blocks_read, 6);
    assert_eq!(stream_stats.uncompressed_bytes, 1 + 2 * 65536);
    assert_eq!(stream_stats.compressed_bytes_out, output.len() as u64);
    assert_eq!(stream_stats.compressed_bytes_in, input.bytes.len() as u64);
    assert_eq!(stats.soft_errors, 0);

    assert_eq!(block_payload_sizes(&output), vec![1, MAX_BLOCK_PAYLOAD, 256, MAX_BLOCK_PAYLOAD, 256, 0]);
    assert!(output.ends_with(&BGZF_EOF));
    let blocks = split_blocks(&output);
    assert_eq!(blocks.iter().filter(|block| block[..] == BGZF_EOF).count(), 1);

    assert_eq!(recorder.block_ids(stream.id()), vec![0, 1, 2, 3, 4, 5]);
    let events = recorder.events(stream.id());
    assert!(events.last().unwrap().is_final);
    assert_eq!(events[0].encoded_len, 0);
    assert_eq!(events[2].frames, 2);
    assert_eq!(events[4].encoded_len, 0);
}

#[test]
fn test_output_blocks_decode_with_library_codec() {
    let input = bgzf_input(scenario_payloads(), 6, true);
    let sink = SharedSink::new();
    let mut pipeline = Pipeline::new(PipelineConfig::new(2, 6));
    pipeline.submit_stream_for_reading(Box::new(Cursor::new(input.bytes.clone())), sink.boxed());
    pipeline.run_to_completion().unwrap();

    let mut codec = BlockCodec::new();
    let mut payload = Vec::new();
    for block in split_blocks(&sink.contents()) {
        let frame = codec.decompress_into(&block, &mut payload).unwrap();
        assert!(frame.uncompressed_size <= MAX_BLOCK_PAYLOAD);
        assert_eq!(frame.compressed_size, block.len());
    }
    assert_eq!(payload, input.concatenated());
}

#[test]
fn test_store_level_round_trips() {
    let input = bgzf_input(scenario_payloads(), 6, true);
    let sink = SharedSink::new();
    let mut pipeline = Pipeline::new(PipelineConfig::new(2, 0));
    pipeline.submit_stream_for_reading(Box::new(Cursor::new(input.bytes.clone())), sink.boxed());
    pipeline.run_to_completion().unwrap();

    let output = sink.contents();
    assert!(output.len() > input.concatenated().len());
    assert_eq!(gunzip(&output), input.concatenated());
}
