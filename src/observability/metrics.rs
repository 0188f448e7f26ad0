//! Metrics collection using metrics-rs.

use crate::cell::CellKind;
use metrics::{Counter, Histogram, Unit, counter, gauge, histogram};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Whether metrics have been initialized.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

const FRAMES_PRODUCED: &str = "gridstreamer_frames_produced";
const FRAMES_CONSUMED: &str = "gridstreamer_frames_consumed";
const FRAMES_DROPPED: &str = "gridstreamer_frames_dropped";
const BYTES_PRODUCED: &str = "gridstreamer_bytes_produced";
const STEP_TIME_NS: &str = "gridstreamer_step_time_ns";
const TICKS_COMPLETED: &str = "gridstreamer_ticks_completed";
const BACKPRESSURE_STALLS: &str = "gridstreamer_backpressure_stalls";
const CHANNEL_ERRORS: &str = "gridstreamer_channel_errors";
const CHANNELS_RUNNING: &str = "gridstreamer_channels_running";

/// Initialize metrics descriptions.
///
/// Safe to call multiple times.
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    metrics::describe_counter!(
        FRAMES_PRODUCED,
        Unit::Count,
        "Frames produced by source cells"
    );
    metrics::describe_counter!(FRAMES_CONSUMED, Unit::Count, "Frames consumed by sink cells");
    metrics::describe_counter!(
        FRAMES_DROPPED,
        Unit::Count,
        "Frames dropped by filter cells"
    );
    metrics::describe_counter!(BYTES_PRODUCED, Unit::Bytes, "Payload bytes produced");
    metrics::describe_histogram!(
        STEP_TIME_NS,
        Unit::Nanoseconds,
        "Time spent in a single cell step"
    );
    metrics::describe_counter!(
        TICKS_COMPLETED,
        Unit::Count,
        "Lockstep ticks completed per channel"
    );
    metrics::describe_counter!(
        BACKPRESSURE_STALLS,
        Unit::Count,
        "Sends that had to wait for a full downstream link"
    );
    metrics::describe_counter!(
        CHANNEL_ERRORS,
        Unit::Count,
        "Channels torn down by a step failure"
    );
    metrics::describe_gauge!(CHANNELS_RUNNING, Unit::Count, "Channels currently running");
}

/// Record a completed lockstep tick.
#[inline]
pub fn record_tick(channel: &str) {
    counter!(TICKS_COMPLETED, "channel" => channel.to_string()).increment(1);
}

/// Record a channel torn down by an error.
#[inline]
pub fn record_channel_error(channel: &str) {
    counter!(CHANNEL_ERRORS, "channel" => channel.to_string()).increment(1);
}

/// Adjust the running-channels gauge.
#[inline]
pub fn record_channel_running(running: bool) {
    if running {
        gauge!(CHANNELS_RUNNING).increment(1.0);
    } else {
        gauge!(CHANNELS_RUNNING).decrement(1.0);
    }
}

/// Metrics for one cell, with labels resolved up front.
#[derive(Clone)]
pub struct CellMetrics {
    cell: String,
    kind: CellKind,
    frames: Counter,
    bytes: Counter,
    dropped: Counter,
    stalls: Counter,
    step_time: Histogram,
}

impl CellMetrics {
    /// Create a collector for `cell` in `pipeline` of `channel`.
    pub fn new(channel: &str, pipeline: &str, cell: &str, kind: CellKind) -> Self {
        let labels = [
            ("channel", channel.to_string()),
            ("pipeline", pipeline.to_string()),
            ("cell", cell.to_string()),
        ];
        let frames_name = match kind {
            CellKind::Sink => FRAMES_CONSUMED,
            CellKind::Source | CellKind::Filter => FRAMES_PRODUCED,
        };
        Self {
            cell: cell.to_string(),
            kind,
            frames: counter!(frames_name, &labels),
            bytes: counter!(BYTES_PRODUCED, &labels),
            dropped: counter!(FRAMES_DROPPED, &labels),
            stalls: counter!(BACKPRESSURE_STALLS, &labels),
            step_time: histogram!(STEP_TIME_NS, &labels),
        }
    }

    /// Record one step: its duration and whether a frame came out.
    ///
    /// `emitted` is ignored for sinks, which count every frame they accept.
    #[inline]
    pub fn record_step(&self, duration: Duration, emitted: Option<usize>, had_input: bool) {
        self.step_time.record(duration.as_nanos() as f64);
        match (self.kind, emitted) {
            (CellKind::Sink, _) if had_input => self.frames.increment(1),
            (CellKind::Sink, _) => {}
            (_, Some(bytes)) => {
                self.frames.increment(1);
                self.bytes.increment(bytes as u64);
            }
            (CellKind::Filter, None) if had_input => self.dropped.increment(1),
            _ => {}
        }
    }

    /// Record a send that found the downstream link full.
    #[inline]
    pub fn record_stall(&self) {
        self.stalls.increment(1);
    }

    /// Cell role.
    pub fn cell(&self) -> &str {
        &self.cell
    }
}
