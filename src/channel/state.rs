//! Channel state machine.

use crate::error::Error;
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a channel.
///
/// ```text
/// Idle --open--> Ready --run--> Running <--pause/resume--> Paused
///   \              ^               |                          |
///    \             +-----stop------+--------------------------+
///     +--------------------------------close--------------------> Closed
///
/// Running/Paused --flush--> Flushing --> back to Running/Paused
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChannelState {
    /// Built, nothing acquired.
    #[default]
    Idle,
    /// Cells initialized, no scheduling.
    Ready,
    /// Frames are flowing.
    Running,
    /// Scheduling suspended at a tick boundary.
    Paused,
    /// Discarding undelivered frames; returns to the previous live state.
    Flushing,
    /// Torn down. Terminal.
    Closed,
}

impl ChannelState {
    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelState::Idle => "idle",
            ChannelState::Ready => "ready",
            ChannelState::Running => "running",
            ChannelState::Paused => "paused",
            ChannelState::Flushing => "flushing",
            ChannelState::Closed => "closed",
        }
    }

    /// Whether a scheduler exists (running, paused or flushing).
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            ChannelState::Running | ChannelState::Paused | ChannelState::Flushing
        )
    }

    /// Whether the cells are initialized.
    pub fn is_open(&self) -> bool {
        self.is_live() || *self == ChannelState::Ready
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "idle" => Ok(ChannelState::Idle),
            "ready" => Ok(ChannelState::Ready),
            "running" => Ok(ChannelState::Running),
            "paused" => Ok(ChannelState::Paused),
            "flushing" => Ok(ChannelState::Flushing),
            "closed" => Ok(ChannelState::Closed),
            other => Err(Error::validation(
                "state",
                format!("'{other}' is not one of idle, ready, running, paused, flushing, closed"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!("running".parse::<ChannelState>().unwrap(), ChannelState::Running);
        assert_eq!(" Paused ".parse::<ChannelState>().unwrap(), ChannelState::Paused);
        assert!(matches!(
            "playing".parse::<ChannelState>(),
            Err(Error::Validation { .. })
        ));
    }

    #[test]
    fn test_display_roundtrip() {
        for state in [
            ChannelState::Idle,
            ChannelState::Ready,
            ChannelState::Running,
            ChannelState::Paused,
            ChannelState::Flushing,
            ChannelState::Closed,
        ] {
            assert_eq!(state.to_string().parse::<ChannelState>().unwrap(), state);
        }
    }

    #[test]
    fn test_predicates() {
        assert!(ChannelState::Paused.is_live());
        assert!(ChannelState::Flushing.is_live());
        assert!(ChannelState::Flushing.is_open());
        assert!(!ChannelState::Ready.is_live());
        assert!(ChannelState::Ready.is_open());
        assert!(!ChannelState::Closed.is_open());
    }
}
