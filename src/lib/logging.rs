//! Formatting helpers for log output.
//!
//! Counts, byte sizes, durations and rates are rendered consistently across the
//! pipeline summary, the progress tracker and the CLI.

use std::time::{Duration, Instant};

/// Formats an integer with thousands separators.
///
/// # Examples
///
/// ```
/// use blockpipe_lib::logging::format_count;
///
/// assert_eq!(format_count(0), "0");
/// assert_eq!(format_count(1_234_567), "1,234,567");
/// ```
#[must_use]
pub fn format_count(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Formats a byte count using binary units.
///
/// # Examples
///
/// ```
/// use blockpipe_lib::logging::format_bytes;
///
/// assert_eq!(format_bytes(512), "512 B");
/// assert_eq!(format_bytes(65_536), "64.0 KiB");
/// assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.0 GiB");
/// ```
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

/// Formats a duration in human-readable form.
///
/// # Examples
///
/// ```
/// use blockpipe_lib::logging::format_duration;
/// use std::time::Duration;
///
/// assert_eq!(format_duration(Duration::from_secs(45)), "45s");
/// assert_eq!(format_duration(Duration::from_secs(135)), "2m 15s");
/// assert_eq!(format_duration(Duration::from_secs(5400)), "1h 30m");
/// ```
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        let mins = secs / 60;
        let remaining_secs = secs % 60;
        if remaining_secs == 0 { format!("{mins}m") } else { format!("{mins}m {remaining_secs}s") }
    } else {
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        if mins == 0 { format!("{hours}h") } else { format!("{hours}h {mins}m") }
    }
}

/// Formats a throughput in bytes per second.
///
/// ```
/// use blockpipe_lib::logging::format_throughput;
/// use std::time::Duration;
///
/// assert_eq!(format_throughput(2048, Duration::from_secs(2)), "1.0 KiB/s");
/// ```
#[must_use]
pub fn format_throughput(bytes: u64, duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs < 0.001 {
        return format!("{}/s", format_bytes(bytes));
    }
    format!("{}/s", format_bytes((bytes as f64 / secs) as u64))
}

/// Logs the start and completion of a long-running operation.
///
/// ```no_run
/// use blockpipe_lib::logging::OperationTimer;
///
/// let timer = OperationTimer::new("Recompressing input.bgz");
/// // ... do work ...
/// timer.log_completion(1_024, 4_194_304);
/// ```
pub struct OperationTimer {
    operation: String,
    start_time: Instant,
}

impl OperationTimer {
    /// Creates a new operation timer and logs the start.
    #[must_use]
    pub fn new(operation: &str) -> Self {
        log::info!("{operation} ...");
        Self { operation: operation.to_string(), start_time: Instant::now() }
    }

    /// Logs the completion with block and byte counts.
    pub fn log_completion(&self, blocks: u64, bytes: u64) {
        let duration = self.start_time.elapsed();
        log::info!(
            "{} completed: {} blocks, {} in {} ({})",
            self.operation,
            format_count(blocks),
            format_bytes(bytes),
            format_duration(duration),
            format_throughput(bytes, duration)
        );
    }
}
