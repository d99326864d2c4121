//! Output callbacks: `.gzi` index generation and random access through it.

use std::io::{Cursor, Read};
use std::sync::Arc;

use blockpipe_lib::bgzf::{BlockIndex, BlockSeeker, MAX_BLOCK_PAYLOAD, VirtualOffset};
use blockpipe_lib::callbacks::{BlockIndexBuilder, StreamChecksums};
use blockpipe_lib::pipeline::{Pipeline, PipelineConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::helpers::{SharedSink, bgzf_input, random_payloads, split_blocks};

struct Recompressed {
    output: Vec<u8>,
    gzi: Vec<u8>,
    payload: Vec<u8>,
    index: BlockIndex,
}

fn recompress_with_index(unit_size: usize) -> Recompressed {
    let input = bgzf_input(random_payloads(51, 40, 30_000), 6, true);
    let sink = SharedSink::new();
    let gzi = SharedSink::new();
    let builder = Arc::new(BlockIndexBuilder::new().with_destination(0, gzi.boxed()));

    let config = PipelineConfig::new(4, 6).with_block_payload_size(unit_size);
    let mut pipeline = Pipeline::new(config);
    pipeline.submit_stream_for_reading(Box::new(Cursor::new(input.bytes.clone())), sink.boxed());
    pipeline.register_output_callback(builder.clone());
    pipeline.run_to_completion().unwrap();

    Recompressed {
        output: sink.contents(),
        gzi: gzi.contents(),
        payload: input.concatenated(),
        index: builder.index(0).unwrap(),
    }
}

#[test]
fn test_gzi_round_trips_through_reader() {
    let run = recompress_with_index(4096);
    let loaded = BlockIndex::read_from(&mut Cursor::new(&run.gzi)).unwrap();
    assert_eq!(loaded.entries(), run.index.entries());

    let stored = u64::from_le_bytes(run.gzi[..8].try_into().unwrap());
    // The first block and the end-of-file marker are never stored.
    assert_eq!(stored as usize, split_blocks(&run.output).len() - 2);
    assert_eq!(run.gzi.len(), 8 + 16 * stored as usize);
}

#[test]
fn test_index_entries_match_block_starts() {
    let run = recompress_with_index(MAX_BLOCK_PAYLOAD);
    let mut offset = 0u64;
    let starts: Vec<u64> = split_blocks(&run.output)
        .iter()
        .map(|block| {
            let start = offset;
            offset += block.len() as u64;
            start
        })
        .collect();
    let indexed: Vec<u64> = run.index.entries().iter().map(|e| e.compressed_offset).collect();
    assert_eq!(indexed, starts[..starts.len() - 1]);
}

#[test]
fn test_random_access_through_index() {
    let run = recompress_with_index(4096);
    let index = BlockIndex::read_from(&mut Cursor::new(&run.gzi)).unwrap();
    let mut seeker = BlockSeeker::new(Cursor::new(run.output.clone()));
    let mut rng = StdRng::seed_from_u64(52);

    for _ in 0..200 {
        let position = rng.random_range(0..run.payload.len() as u64);
        let len = rng.random_range(1..=10_000).min(run.payload.len() - position as usize);
        let offset = index.virtual_offset_for(position).unwrap();
        seeker.seek_to(offset).unwrap();

        let mut buf = vec![0u8; len];
        seeker.read_exact(&mut buf).unwrap();
        assert_eq!(buf, run.payload[position as usize..position as usize + len]);
    }
}

#[test]
fn test_seek_to_start_reads_everything() {
    let run = recompress_with_index(10_000);
    let mut seeker = BlockSeeker::new(Cursor::new(run.output.clone()));
    seeker.seek_to(VirtualOffset::MIN).unwrap();
    let mut all = Vec::new();
    seeker.read_to_end(&mut all).unwrap();
    assert_eq!(all, run.payload);
}

#[test]
fn test_checksums_match_direct_crc() {
    let input = bgzf_input(random_payloads(53, 25, 12_000), 6, true);
    let sink = SharedSink::new();
    let checksums = Arc::new(StreamChecksums::new());

    let mut pipeline = Pipeline::new(PipelineConfig::new(3, 5).with_block_payload_size(5000));
    pipeline.submit_stream_for_reading(Box::new(Cursor::new(input.bytes.clone())), sink.boxed());
    pipeline.register_output_callback(checksums.clone());
    pipeline.run_to_completion().unwrap();

    let checksum = checksums.get(0).unwrap();
    let payload = input.concatenated();
    assert_eq!(checksum.uncompressed_crc32, crc32fast::hash(&payload));
    assert_eq!(checksum.uncompressed_len, payload.len() as u64);
    assert_eq!(checksum.compressed_crc32, crc32fast::hash(&sink.contents()));
}

#[test]
fn test_checksums_absent_for_failed_stream() {
    let mut input = bgzf_input(random_payloads(54, 6, 1000), 6, true);
    input.corrupt_crc(3);
    let checksums = Arc::new(StreamChecksums::new());

    let mut pipeline = Pipeline::new(PipelineConfig::new(2, 6));
    pipeline.submit_stream_for_reading(Box::new(Cursor::new(input.bytes.clone())), Box::new(std::io::sink()));
    pipeline.register_output_callback(checksums.clone());
    assert!(pipeline.run_to_completion().is_err());
    assert!(checksums.get(0).is_none());
}
