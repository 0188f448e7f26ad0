//! # gridstreamer
//!
//! A grid of channels running pipelines of cells, described by a small
//! textual layout language.
//!
//! - A [`Grid`] owns named [`Channel`](channel::Channel)s
//! - A channel owns one or more [`Pipeline`](pipeline::Pipeline)s and
//!   schedules them, either in lockstep or free-running
//! - A pipeline is a chain of [`Cell`](cell::Cell)s: one source, any number
//!   of filters, one sink
//! - Cells expose typed [`Parameter`](cell::Parameter)s and named
//!   [`Hook`](cell::Hook)s that observers connect to
//!
//! ## Quick Start
//!
//! ```rust
//! use gridstreamer::prelude::*;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let grid = Grid::new("studio");
//! let channel = grid
//!     .allocate_channel("preview", Some("{ src: TestImage Dimension='64x48' ! dst: TestImageVerify }"))
//!     .unwrap();
//!
//! let seen = Arc::new(AtomicUsize::new(0));
//! let counter = seen.clone();
//! channel
//!     .cell("BasePipeline", "dst")
//!     .unwrap()
//!     .hook("on_verify")
//!     .unwrap()
//!     .connect(move |frame, _metadata| {
//!         assert_eq!(frame.map(|f| f.width()), Some(64));
//!         counter.fetch_add(1, Ordering::SeqCst);
//!     });
//!
//! channel.open().unwrap();
//! channel.tick().unwrap();
//! assert_eq!(seen.load(Ordering::SeqCst), 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cell;
pub mod cells;
pub mod channel;
pub mod config;
pub mod error;
pub mod frame;
pub mod grid;
pub mod layout;
pub mod metadata;
pub mod observability;
pub mod pipeline;
pub mod registry;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::cell::{Cell, CellKind, Filter, ParamValue, Sink, Source};
    pub use crate::channel::{Channel, ChannelEvent, ChannelState};
    pub use crate::config::{ChannelConfig, GridConfig, SchedulingMode};
    pub use crate::error::{Error, Result};
    pub use crate::frame::{Frame, FrameFormat, PixelFormat};
    pub use crate::grid::Grid;
    pub use crate::metadata::{Metadata, MetadataValue};
    pub use crate::pipeline::Pipeline;
    pub use crate::registry::{CellDescriptor, CellRegistry};
}

pub use error::{Error, Result};
pub use grid::Grid;
