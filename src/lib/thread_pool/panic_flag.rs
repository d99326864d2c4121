//! Pool-wide error latch.

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use log::{debug, warn};
use parking_lot::Mutex;

use crate::errors::PipelineError;

/// State of a [`PanicFlag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanicState {
    /// No error recorded.
    Clear,
    /// At least one non-fatal error was reported; work continues.
    SoftError,
    /// A fatal error was recorded; no further work is dispatched.
    Fatal,
}

const CLEAR: u8 = 0;
const SOFT: u8 = 1;
const FATAL: u8 = 2;

/// Tri-state latch read by every worker before it takes new work.
///
/// The first fatal error wins; later ones are logged at debug level and dropped.
#[derive(Debug)]
pub struct PanicFlag {
    state: AtomicU8,
    first_error: Mutex<Option<PipelineError>>,
    soft_errors: AtomicU64,
}

impl Default for PanicFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl PanicFlag {
    /// Create a cleared flag.
    #[must_use]
    pub fn new() -> Self {
        Self { state: AtomicU8::new(CLEAR), first_error: Mutex::new(None), soft_errors: AtomicU64::new(0) }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> PanicState {
        match self.state.load(Ordering::Acquire) {
            CLEAR => PanicState::Clear,
            SOFT => PanicState::SoftError,
            _ => PanicState::Fatal,
        }
    }

    /// Whether a fatal error has been recorded.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.state.load(Ordering::Acquire) == FATAL
    }

    /// Record a non-fatal problem.
    pub fn raise_soft(&self, message: &str) {
        warn!("{message}");
        self.soft_errors.fetch_add(1, Ordering::Relaxed);
        let _ = self.state.compare_exchange(CLEAR, SOFT, Ordering::AcqRel, Ordering::Acquire);
    }

    /// Record a fatal error; returns `false` if another fatal error was recorded first.
    pub fn raise_fatal(&self, error: PipelineError) -> bool {
        let mut slot = self.first_error.lock();
        if self.is_fatal() {
            debug!("Discarding error raised after pool halt: {error}");
            return false;
        }
        *slot = Some(error);
        self.state.store(FATAL, Ordering::Release);
        true
    }

    /// Take the recorded fatal error, if any.
    pub fn take_error(&self) -> Option<PipelineError> {
        self.first_error.lock().take()
    }

    /// Number of soft errors reported.
    #[must_use]
    pub fn soft_error_count(&self) -> u64 {
        self.soft_errors.load(Ordering::Relaxed)
    }
}
