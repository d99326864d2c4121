//! CLI command implementations for blockpipe.
//!
//! - [`recompress`] - Re-encode a BGZF file at a new compression level, optionally writing a `.gzi` index
//! - [`check`] - Decode one or more BGZF files and report block counts and payload checksums

#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::uninlined_format_args
)]

pub mod check;
pub mod command;
pub mod common;
pub mod recompress;
