//! Cells: the processing units of a pipeline.
//!
//! A cell is either a [`Source`], a [`Filter`] or a [`Sink`]. Concrete cell
//! types are registered in a [`CellRegistry`](crate::registry::CellRegistry)
//! and instantiated by the layout builder; callers interact with them through
//! the [`Cell`] handle, its [`Parameter`]s and its [`Hook`]s.

mod context;
mod handle;
mod hooks;
mod parameter;
mod traits;

pub use context::{Emission, InitContext, StepContext};
pub use handle::{Cell, Lifecycle};
pub use hooks::{Hook, HookSet, Observer, ObserverId};
pub use parameter::{ParamFormat, ParamInput, ParamSpec, ParamValue, Parameter, ParameterSet};
pub use traits::{
    CellDyn, CellKind, Filter, FilterAdapter, Sink, SinkAdapter, Source, SourceAdapter,
};
