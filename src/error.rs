//! Error types for gridstreamer.
//!
//! Every failing operation returns a distinguishable variant so callers can
//! branch on the cause. Errors stay local to the channel they occurred in.

use std::time::Duration;
use thiserror::Error;

/// Result type alias using gridstreamer's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for gridstreamer operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The layout string is malformed.
    #[error("parse error at offset {position} near '{token}': {message}")]
    Parse {
        /// What went wrong.
        message: String,
        /// Byte offset of the offending token.
        position: usize,
        /// Text of the offending token (`end of input` at the end).
        token: String,
    },

    /// The layout references a cell type nobody registered.
    #[error("unknown cell type: {0}")]
    UnknownCellType(String),

    /// A cell failed to acquire its resources.
    #[error("cell '{cell}' failed to initialize: {message}")]
    Init {
        /// Role of the failing cell.
        cell: String,
        /// Reason reported by the cell.
        message: String,
    },

    /// A cell failed while streaming.
    #[error("cell '{cell}' failed: {message}")]
    Step {
        /// Role of the failing cell.
        cell: String,
        /// Reason reported by the cell.
        message: String,
    },

    /// A cell could not hand its frame downstream in time.
    #[error("cell '{cell}' timed out after {waited:?} waiting for downstream")]
    Timeout {
        /// Role of the stalled cell.
        cell: String,
        /// How long the cell waited.
        waited: Duration,
    },

    /// A parameter value does not satisfy its format.
    #[error("invalid value for parameter '{parameter}': {message}")]
    Validation {
        /// Parameter name.
        parameter: String,
        /// Why the value was rejected.
        message: String,
    },

    /// A live cell cannot accommodate a parameter change.
    #[error("parameter '{parameter}' requires a restart: {message}")]
    Renegotiation {
        /// Parameter name.
        parameter: String,
        /// Reason reported by the cell.
        message: String,
    },

    /// `run()` was called on a running channel.
    #[error("channel '{0}' is already running")]
    AlreadyRunning(String),

    /// The channel has been closed.
    #[error("channel '{0}' is closed")]
    ClosedChannel(String),

    /// The requested transition is not allowed from the current state.
    #[error("cannot {operation} channel '{channel}' in state {state}")]
    InvalidState {
        /// Channel name.
        channel: String,
        /// Operation that was attempted.
        operation: &'static str,
        /// State the channel was in.
        state: String,
    },

    /// A grid or channel name is unusable.
    #[error("invalid name: {0:?}")]
    InvalidName(String),

    /// The cell has no parameter of that name.
    #[error("cell '{cell}' has no parameter '{parameter}'")]
    UnknownParameter {
        /// Cell role.
        cell: String,
        /// Requested parameter.
        parameter: String,
    },

    /// The cell has no hook of that name.
    #[error("cell '{cell}' has no hook '{hook}'")]
    UnknownHook {
        /// Cell role.
        cell: String,
        /// Requested hook.
        hook: String,
    },

    /// Configuration could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// A scheduling thread could not be started or panicked.
    #[error("scheduler error: {0}")]
    Spawn(String),
}

impl Error {
    /// Build a step error for `cell`.
    pub fn step(cell: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Step {
            cell: cell.into(),
            message: message.into(),
        }
    }

    /// Build an init error for `cell`.
    pub fn init(cell: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Init {
            cell: cell.into(),
            message: message.into(),
        }
    }

    /// Build a validation error for `parameter`.
    pub fn validation(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Runtime streaming failure (terminates the owning channel).
    pub fn is_step_error(&self) -> bool {
        matches!(self, Error::Step { .. } | Error::Timeout { .. })
    }

    /// Failure while compiling a layout.
    pub fn is_parse_error(&self) -> bool {
        matches!(self, Error::Parse { .. } | Error::UnknownCellType(_))
    }

    /// Role of the cell the error originated from, if any.
    pub fn cell(&self) -> Option<&str> {
        match self {
            Error::Init { cell, .. } | Error::Step { cell, .. } | Error::Timeout { cell, .. } => {
                Some(cell)
            }
            Error::UnknownParameter { cell, .. } | Error::UnknownHook { cell, .. } => Some(cell),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_classification() {
        assert!(Error::step("src", "boom").is_step_error());
        assert!(
            Error::Timeout {
                cell: "src".into(),
                waited: Duration::from_millis(5),
            }
            .is_step_error()
        );
        assert!(!Error::AlreadyRunning("c".into()).is_step_error());
    }

    #[test]
    fn test_parse_classification() {
        assert!(Error::UnknownCellType("Foo".into()).is_parse_error());
        assert!(!Error::validation("Dimension", "bad").is_parse_error());
    }

    #[test]
    fn test_cell_accessor() {
        assert_eq!(Error::init("dst", "no display").cell(), Some("dst"));
        assert_eq!(Error::ClosedChannel("c".into()).cell(), None);
    }

    #[test]
    fn test_display_mentions_position() {
        let err = Error::Parse {
            message: "expected ':'".into(),
            position: 6,
            token: "TestImage".into(),
        };
        let text = err.to_string();
        assert!(text.contains("offset 6"));
        assert!(text.contains("TestImage"));
    }
}
