#![deny(unsafe_code)]
// Clippy lint configuration for CI
// These lints are allowed because:
// - cast_*: Block sizes, offsets and counters are cast between usize and u64 throughout
// - missing_*_doc: Documentation improvements tracked separately
// - needless_pass_by_value: Some APIs designed for ownership transfer
// - items_after_statements: Some test code uses late item declarations
// - unused_self: Trait implementations may not use self
// - match_same_arms: Sometimes clearer to list arms explicitly
// - unnecessary_wraps: Some Result returns are for API consistency
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::needless_pass_by_value,
    clippy::items_after_statements,
    clippy::unused_self,
    clippy::match_same_arms,
    clippy::unnecessary_wraps,
    clippy::too_many_lines,
    clippy::redundant_closure_for_method_calls,
    clippy::explicit_iter_loop,
    clippy::struct_excessive_bools,
    clippy::map_unwrap_or,
    clippy::uninlined_format_args
)]

//! # blockpipe - Parallel BGZF Block Pipeline
//!
//! This library drives BGZF streams through read → decompress → transform →
//! compress → write stages on a shared pool of worker threads, writing every
//! stream's blocks back out in their original order.
//!
//! ## Overview
//!
//! ### Scheduling
//!
//! - **[`thread_pool`]** - Worker pool, typed work packages, dispatcher registry and panic flag
//! - **[`pipeline`]** - The stage dispatchers, flow control and [`Pipeline`](pipeline::Pipeline) API
//! - **[`reorder_buffer`]** - Turns out-of-order completions into in-order commits
//!
//! ### Data
//!
//! - **[`buffer_pool`]** - Bounded pools of owned, move-only buffers
//! - **[`block`]** - The block record carried between stages
//! - **[`input_reader`]** - Splits a BGZF source into numbered raw blocks
//! - **[`output_writer`]** - Writes committed blocks and notifies callbacks
//! - **[`callbacks`]** - Checksum and `.gzi` index callbacks
//!
//! ### Utilities
//!
//! - **[`errors`]** - Error types
//! - **[`progress`]** - Progress tracking and logging
//! - **[`logging`]** - Formatting helpers for log output
//!
//! The block format itself (framing, codec, virtual offsets, index and random access)
//! lives in the `blockpipe-bgzf` crate and is re-exported as [`bgzf`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::fs::File;
//! use std::sync::Arc;
//! use blockpipe_lib::callbacks::StreamChecksums;
//! use blockpipe_lib::pipeline::{Pipeline, PipelineConfig};
//!
//! # fn main() -> anyhow::Result<()> {
//! let checksums = Arc::new(StreamChecksums::new());
//! let mut pipeline = Pipeline::new(PipelineConfig::new(4, 6));
//! let stream = pipeline.submit_stream_for_reading(
//!     Box::new(File::open("input.bgz")?),
//!     Box::new(File::create("output.bgz")?),
//! );
//! pipeline.register_output_callback(checksums.clone());
//! pipeline.run_to_completion()?;
//!
//! let sums = checksums.get(stream.id()).expect("stream closed");
//! println!("payload crc32 {:08x}", sums.uncompressed_crc32);
//! # Ok(())
//! # }
//! ```

pub use blockpipe_bgzf as bgzf;

pub mod block;
pub mod buffer_pool;
pub mod callbacks;
pub mod errors;
pub mod input_reader;
pub mod logging;
pub mod output_writer;
pub mod pipeline;
pub mod progress;
pub mod reorder_buffer;
pub mod thread_pool;
