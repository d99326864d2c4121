//! Helper utilities for integration tests.

pub mod bgzf_generator;

pub use bgzf_generator::*;
pub use sinks::*;
