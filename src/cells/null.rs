//! NullSink: discards frames.

use crate::cell::{Sink, StepContext};
use crate::error::Result;
use crate::frame::Frame;
use crate::registry::CellDescriptor;

/// Registered type identifier.
pub const TYPE_NAME: &str = "NullSink";

/// A sink that discards every frame.
///
/// The default sink of a channel allocated without a layout.
#[derive(Debug, Default)]
pub struct NullSink;

impl NullSink {
    /// Describe the type for a registry.
    pub fn descriptor() -> CellDescriptor {
        CellDescriptor::sink(TYPE_NAME, || NullSink).with_description("Discards frames")
    }
}

impl Sink for NullSink {
    fn consume(&mut self, frame: Frame, ctx: &mut StepContext<'_>) -> Result<()> {
        tracing::trace!(cell = %ctx.cell_name(), sequence = frame.sequence(), "frame discarded");
        Ok(())
    }
}
