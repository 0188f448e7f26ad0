//! Observability: metrics and tracing.
//!
//! ## Metrics
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `gridstreamer_frames_produced` | Counter | Frames out of sources and filters |
//! | `gridstreamer_frames_consumed` | Counter | Frames accepted by sinks |
//! | `gridstreamer_frames_dropped` | Counter | Frames dropped by filters |
//! | `gridstreamer_bytes_produced` | Counter | Payload bytes produced |
//! | `gridstreamer_step_time_ns` | Histogram | Time per cell step |
//! | `gridstreamer_ticks_completed` | Counter | Lockstep ticks per channel |
//! | `gridstreamer_backpressure_stalls` | Counter | Sends that waited on a full link |
//! | `gridstreamer_channel_errors` | Counter | Channels closed by a failure |
//! | `gridstreamer_channels_running` | Gauge | Channels currently running |
//!
//! ## Tracing
//!
//! Spans are opened per grid operation, per channel scheduling thread and
//! per cell, as selected by [`TracingConfig`].
//!
//! ```rust,ignore
//! use gridstreamer::observability::init_metrics;
//!
//! init_metrics();
//! // install any metrics exporter to collect them
//! ```

mod metrics;
mod tracing_support;

pub use metrics::{
    CellMetrics, init_metrics, record_channel_error, record_channel_running, record_tick,
};
pub use tracing_support::{
    TracingConfig, cell_span_if, channel_span_if, span_cell, span_channel, span_grid, trace_frame,
    trace_state_change,
};
