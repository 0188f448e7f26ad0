//! Tracing integration for structured logging and spans.

use serde::{Deserialize, Serialize};
use tracing::{Level, Span, span};

/// Which spans the schedulers open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    /// Span around each scheduling thread of a channel.
    pub channel_spans: bool,
    /// Span around each cell worker (free mode) or cell step (lockstep).
    pub cell_spans: bool,
    /// Trace-level event per frame handed downstream.
    pub frame_events: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            channel_spans: true,
            cell_spans: true,
            frame_events: false,
        }
    }
}

impl TracingConfig {
    /// Everything on.
    pub fn all() -> Self {
        Self {
            channel_spans: true,
            cell_spans: true,
            frame_events: true,
        }
    }

    /// Channel spans only.
    pub fn minimal() -> Self {
        Self {
            channel_spans: true,
            cell_spans: false,
            frame_events: false,
        }
    }

    /// Nothing.
    pub fn none() -> Self {
        Self {
            channel_spans: false,
            cell_spans: false,
            frame_events: false,
        }
    }
}

/// Span for operations on a grid.
#[inline]
pub fn span_grid(name: &str) -> Span {
    span!(Level::INFO, "grid", name = %name)
}

/// Span for a channel's scheduling.
///
/// # Example
///
/// ```rust,ignore
/// let span = span_channel("main", "lockstep");
/// let _guard = span.enter();
/// ```
#[inline]
pub fn span_channel(name: &str, mode: &str) -> Span {
    span!(Level::INFO, "channel", name = %name, mode = %mode)
}

/// Span for a cell.
#[inline]
pub fn span_cell(pipeline: &str, cell: &str, type_name: &str) -> Span {
    span!(
        Level::DEBUG,
        "cell",
        pipeline = %pipeline,
        cell = %cell,
        type_name = %type_name
    )
}

/// Span for a channel if enabled, otherwise a disabled span.
pub fn channel_span_if(config: &TracingConfig, name: &str, mode: &str) -> Span {
    if config.channel_spans {
        span_channel(name, mode)
    } else {
        Span::none()
    }
}

/// Span for a cell if enabled, otherwise a disabled span.
pub fn cell_span_if(config: &TracingConfig, pipeline: &str, cell: &str, type_name: &str) -> Span {
    if config.cell_spans {
        span_cell(pipeline, cell, type_name)
    } else {
        Span::none()
    }
}

/// Log a frame handed downstream.
#[inline]
pub fn trace_frame(pipeline: &str, cell: &str, size: usize, sequence: u64) {
    tracing::trace!(
        pipeline = %pipeline,
        cell = %cell,
        size = size,
        sequence = sequence,
        "frame"
    );
}

/// Log a channel state change.
#[inline]
pub fn trace_state_change(channel: &str, from: &str, to: &str) {
    tracing::info!(channel = %channel, from = %from, to = %to, "channel state changed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_config_presets() {
        let config = TracingConfig::default();
        assert!(config.channel_spans);
        assert!(config.cell_spans);
        assert!(!config.frame_events);

        assert!(TracingConfig::all().frame_events);
        assert!(!TracingConfig::minimal().cell_spans);
        assert!(!TracingConfig::none().channel_spans);
    }

    #[test]
    fn test_disabled_spans() {
        let span = cell_span_if(&TracingConfig::none(), "BasePipeline", "src", "TestImage");
        assert!(span.is_none());
    }

    #[test]
    fn test_span_creation() {
        let _span = span_grid("grid");
        let _span = span_channel("main", "lockstep");
        let _span = span_cell("BasePipeline", "src", "TestImage");
        trace_frame("BasePipeline", "src", 100, 0);
        trace_state_change("main", "idle", "running");
    }
}
