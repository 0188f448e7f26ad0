//! Grid and channel configuration.
//!
//! Durations are written in milliseconds:
//!
//! ```toml
//! [channel]
//! scheduling = "free"
//! tick_interval_ms = 33
//! backpressure_timeout_ms = 2000
//! default_source = "TestImage"
//! default_sink = "NullSink"
//!
//! [channel.tracing]
//! cell_spans = true
//! ```

use crate::error::{Error, Result};
use crate::observability::TracingConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// How a channel drives its pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingMode {
    /// One thread advances every pipeline by one frame per tick.
    #[default]
    Lockstep,
    /// One thread per cell, adjacent cells linked by single-frame buffers.
    Free,
}

impl SchedulingMode {
    /// Lowercase name, as written in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulingMode::Lockstep => "lockstep",
            SchedulingMode::Free => "free",
        }
    }
}

impl fmt::Display for SchedulingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings of a single channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Scheduling mode.
    pub scheduling: SchedulingMode,

    /// Minimum period of the scheduling loop. `None` runs as fast as the
    /// cells allow.
    #[serde(
        rename = "tick_interval_ms",
        with = "opt_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub tick_interval: Option<Duration>,

    /// How long a cell in free mode may wait on a full downstream link.
    #[serde(rename = "backpressure_timeout_ms", with = "millis")]
    pub backpressure_timeout: Duration,

    /// Source type of the layout used when none is given.
    pub default_source: String,

    /// Sink type of the layout used when none is given.
    pub default_sink: String,

    /// Capacity of the event broadcast buffer.
    pub event_capacity: usize,

    /// Which spans the schedulers open.
    pub tracing: TracingConfig,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            scheduling: SchedulingMode::Lockstep,
            tick_interval: None,
            backpressure_timeout: Duration::from_secs(5),
            default_source: "TestImage".to_string(),
            default_sink: "NullSink".to_string(),
            event_capacity: 256,
            tracing: TracingConfig::default(),
        }
    }
}

impl ChannelConfig {
    /// Lockstep scheduling (the default).
    pub fn lockstep() -> Self {
        Self::default()
    }

    /// Free-running scheduling.
    pub fn free() -> Self {
        Self {
            scheduling: SchedulingMode::Free,
            ..Default::default()
        }
    }

    /// Set the scheduling mode.
    pub fn with_scheduling(mut self, scheduling: SchedulingMode) -> Self {
        self.scheduling = scheduling;
        self
    }

    /// Pace the scheduling loop.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = Some(interval);
        self
    }

    /// Set the backpressure timeout.
    pub fn with_backpressure_timeout(mut self, timeout: Duration) -> Self {
        self.backpressure_timeout = timeout;
        self
    }

    /// Set the cell types of the default layout.
    pub fn with_default_cells(mut self, source: impl Into<String>, sink: impl Into<String>) -> Self {
        self.default_source = source.into();
        self.default_sink = sink.into();
        self
    }

    /// Set the event buffer capacity (at least 1).
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Set the tracing configuration.
    pub fn with_tracing(mut self, tracing: TracingConfig) -> Self {
        self.tracing = tracing;
        self
    }
}

/// Settings of a grid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Configuration given to every channel the grid allocates.
    pub channel: ChannelConfig,
}

impl GridConfig {
    /// Use `channel` for every channel.
    pub fn with_channel(mut self, channel: ChannelConfig) -> Self {
        self.channel = channel;
        self
    }

    /// Parse a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|e| Error::Config(e.to_string()))
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// Serialize to TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| Error::Config(e.to_string()))
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

mod opt_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => super::millis::serialize(d, s),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(d).map(|ms| ms.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ChannelConfig::default();
        assert_eq!(config.scheduling, SchedulingMode::Lockstep);
        assert_eq!(config.backpressure_timeout, Duration::from_secs(5));
        assert_eq!(config.tick_interval, None);
        assert_eq!(config.default_source, "TestImage");
        assert_eq!(config.default_sink, "NullSink");
    }

    #[test]
    fn test_builders() {
        let config = ChannelConfig::free()
            .with_tick_interval(Duration::from_millis(10))
            .with_backpressure_timeout(Duration::from_millis(50))
            .with_event_capacity(0);
        assert_eq!(config.scheduling, SchedulingMode::Free);
        assert_eq!(config.tick_interval, Some(Duration::from_millis(10)));
        assert_eq!(config.event_capacity, 1);
    }

    #[test]
    fn test_partial_toml() {
        let config = GridConfig::from_toml_str(
            r#"
            [channel]
            scheduling = "free"
            backpressure_timeout_ms = 250

            [channel.tracing]
            cell_spans = true
            "#,
        )
        .unwrap();
        assert_eq!(config.channel.scheduling, SchedulingMode::Free);
        assert_eq!(config.channel.backpressure_timeout, Duration::from_millis(250));
        assert_eq!(config.channel.default_sink, "NullSink");
        assert!(config.channel.tracing.cell_spans);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = GridConfig::default().with_channel(
            ChannelConfig::free().with_tick_interval(Duration::from_millis(33)),
        );
        let text = config.to_toml_string().unwrap();
        assert!(text.contains("tick_interval_ms = 33"));
        assert_eq!(GridConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_invalid_toml() {
        let err = GridConfig::from_toml_str("[channel]\nscheduling = \"sometimes\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[channel]\ntick_interval_ms = 5").unwrap();
        let config = GridConfig::load(file.path()).unwrap();
        assert_eq!(config.channel.tick_interval, Some(Duration::from_millis(5)));

        assert!(matches!(
            GridConfig::load("/nonexistent/gridstreamer.toml"),
            Err(Error::Config(_))
        ));
    }
}
