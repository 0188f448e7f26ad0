//! Core cell traits.
//!
//! Concrete cells implement one of [`Source`], [`Filter`] or [`Sink`]. The
//! schedulers only ever talk to the object-safe [`CellDyn`], which the
//! adapters below provide for each capability.

use super::context::{InitContext, StepContext};
use super::parameter::ParamValue;
use crate::error::Result;
use crate::frame::Frame;
use std::fmt;

/// Capability variant of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellKind {
    /// Produces frames, has no input.
    Source,
    /// Consumes one frame and produces one or none.
    Filter,
    /// Consumes frames, produces none.
    Sink,
}

impl CellKind {
    /// Number of input ports.
    pub const fn input_ports(&self) -> usize {
        match self {
            CellKind::Source => 0,
            CellKind::Filter | CellKind::Sink => 1,
        }
    }

    /// Number of output ports.
    pub const fn output_ports(&self) -> usize {
        match self {
            CellKind::Source | CellKind::Filter => 1,
            CellKind::Sink => 0,
        }
    }

    /// Lowercase name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            CellKind::Source => "source",
            CellKind::Filter => "filter",
            CellKind::Sink => "sink",
        }
    }
}

impl fmt::Display for CellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Source Trait
// ============================================================================

/// A cell that produces frames.
///
/// # Lifecycle
///
/// - `initialize()` runs once before the first step and acquires resources
/// - `produce()` is called once per tick; it may block (e.g. on capture)
/// - Return `Ok(None)` when no frame is available this tick
/// - `shutdown()` releases whatever `initialize()` acquired
///
/// # Example
///
/// ```rust,ignore
/// struct Counter {
///     next: u64,
/// }
///
/// impl Source for Counter {
///     fn produce(&mut self, _ctx: &mut StepContext<'_>) -> Result<Option<Frame>> {
///         let format = FrameFormat::new(1, 1, PixelFormat::Gray8);
///         let frame = Frame::new(vec![self.next as u8], format, self.next);
///         self.next += 1;
///         Ok(Some(frame))
///     }
/// }
/// ```
pub trait Source: Send {
    /// Acquire resources before streaming.
    fn initialize(&mut self, _ctx: &InitContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Produce the next frame.
    fn produce(&mut self, ctx: &mut StepContext<'_>) -> Result<Option<Frame>>;

    /// React to a parameter change while initialized.
    ///
    /// Return an error if the change needs a restart.
    fn renegotiate(&mut self, _name: &str, _value: &ParamValue) -> Result<()> {
        Ok(())
    }

    /// Release resources. Must tolerate being called without `initialize`.
    fn shutdown(&mut self) {}
}

// ============================================================================
// Filter Trait
// ============================================================================

/// A cell that transforms one frame into one frame, or drops it.
pub trait Filter: Send {
    /// Acquire resources before streaming.
    fn initialize(&mut self, _ctx: &InitContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Process a frame. `Ok(None)` drops it.
    fn process(&mut self, frame: Frame, ctx: &mut StepContext<'_>) -> Result<Option<Frame>>;

    /// React to a parameter change while initialized.
    fn renegotiate(&mut self, _name: &str, _value: &ParamValue) -> Result<()> {
        Ok(())
    }

    /// Release resources.
    fn shutdown(&mut self) {}
}

// ============================================================================
// Sink Trait
// ============================================================================

/// A cell that consumes frames.
pub trait Sink: Send {
    /// Acquire resources before streaming.
    fn initialize(&mut self, _ctx: &InitContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Consume a frame.
    fn consume(&mut self, frame: Frame, ctx: &mut StepContext<'_>) -> Result<()>;

    /// React to a parameter change while initialized.
    fn renegotiate(&mut self, _name: &str, _value: &ParamValue) -> Result<()> {
        Ok(())
    }

    /// Release resources.
    fn shutdown(&mut self) {}
}

// ============================================================================
// Dynamic dispatch
// ============================================================================

/// Object-safe view of any cell, used by the schedulers.
pub trait CellDyn: Send {
    /// Capability variant.
    fn kind(&self) -> CellKind;

    /// Acquire resources.
    fn initialize(&mut self, ctx: &InitContext<'_>) -> Result<()>;

    /// Run one step.
    ///
    /// - Sources ignore `input` and return the produced frame
    /// - Filters take `input` and return the transformed frame or `None`
    /// - Sinks take `input` and return `None`
    fn step(&mut self, input: Option<Frame>, ctx: &mut StepContext<'_>) -> Result<Option<Frame>>;

    /// React to a parameter change.
    fn renegotiate(&mut self, name: &str, value: &ParamValue) -> Result<()>;

    /// Release resources.
    fn shutdown(&mut self);
}

/// Wrapper to adapt a [`Source`] to [`CellDyn`].
pub struct SourceAdapter<S: Source> {
    inner: S,
}

impl<S: Source> SourceAdapter<S> {
    /// Create a new source adapter.
    pub fn new(source: S) -> Self {
        Self { inner: source }
    }
}

impl<S: Source> CellDyn for SourceAdapter<S> {
    fn kind(&self) -> CellKind {
        CellKind::Source
    }

    fn initialize(&mut self, ctx: &InitContext<'_>) -> Result<()> {
        self.inner.initialize(ctx)
    }

    fn step(&mut self, _input: Option<Frame>, ctx: &mut StepContext<'_>) -> Result<Option<Frame>> {
        self.inner.produce(ctx)
    }

    fn renegotiate(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        self.inner.renegotiate(name, value)
    }

    fn shutdown(&mut self) {
        self.inner.shutdown()
    }
}

/// Wrapper to adapt a [`Filter`] to [`CellDyn`].
pub struct FilterAdapter<F: Filter> {
    inner: F,
}

impl<F: Filter> FilterAdapter<F> {
    /// Create a new filter adapter.
    pub fn new(filter: F) -> Self {
        Self { inner: filter }
    }
}

impl<F: Filter> CellDyn for FilterAdapter<F> {
    fn kind(&self) -> CellKind {
        CellKind::Filter
    }

    fn initialize(&mut self, ctx: &InitContext<'_>) -> Result<()> {
        self.inner.initialize(ctx)
    }

    fn step(&mut self, input: Option<Frame>, ctx: &mut StepContext<'_>) -> Result<Option<Frame>> {
        match input {
            Some(frame) => self.inner.process(frame, ctx),
            None => Ok(None),
        }
    }

    fn renegotiate(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        self.inner.renegotiate(name, value)
    }

    fn shutdown(&mut self) {
        self.inner.shutdown()
    }
}

/// Wrapper to adapt a [`Sink`] to [`CellDyn`].
pub struct SinkAdapter<S: Sink> {
    inner: S,
}

impl<S: Sink> SinkAdapter<S> {
    /// Create a new sink adapter.
    pub fn new(sink: S) -> Self {
        Self { inner: sink }
    }
}

impl<S: Sink> CellDyn for SinkAdapter<S> {
    fn kind(&self) -> CellKind {
        CellKind::Sink
    }

    fn initialize(&mut self, ctx: &InitContext<'_>) -> Result<()> {
        self.inner.initialize(ctx)
    }

    fn step(&mut self, input: Option<Frame>, ctx: &mut StepContext<'_>) -> Result<Option<Frame>> {
        if let Some(frame) = input {
            self.inner.consume(frame, ctx)?;
        }
        Ok(None)
    }

    fn renegotiate(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        self.inner.renegotiate(name, value)
    }

    fn shutdown(&mut self) {
        self.inner.shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::ParameterSet;
    use crate::frame::{FrameFormat, PixelFormat};

    struct OneShot {
        done: bool,
    }

    impl Source for OneShot {
        fn produce(&mut self, _ctx: &mut StepContext<'_>) -> Result<Option<Frame>> {
            if self.done {
                return Ok(None);
            }
            self.done = true;
            let format = FrameFormat::new(1, 1, PixelFormat::Gray8);
            Ok(Some(Frame::new(vec![9u8], format, 0)))
        }
    }

    struct Drop;

    impl Filter for Drop {
        fn process(&mut self, _frame: Frame, _ctx: &mut StepContext<'_>) -> Result<Option<Frame>> {
            Ok(None)
        }
    }

    #[test]
    fn test_port_arity() {
        assert_eq!(CellKind::Source.input_ports(), 0);
        assert_eq!(CellKind::Source.output_ports(), 1);
        assert_eq!(CellKind::Filter.input_ports(), 1);
        assert_eq!(CellKind::Sink.output_ports(), 0);
    }

    #[test]
    fn test_source_adapter() {
        let params = ParameterSet::default();
        let mut emissions = Vec::new();
        let mut ctx = StepContext::new("src", &params, 0, &mut emissions);

        let mut cell = SourceAdapter::new(OneShot { done: false });
        assert_eq!(cell.kind(), CellKind::Source);
        assert!(cell.step(None, &mut ctx).unwrap().is_some());
        assert!(cell.step(None, &mut ctx).unwrap().is_none());
    }

    #[test]
    fn test_filter_adapter_drops() {
        let params = ParameterSet::default();
        let mut emissions = Vec::new();
        let mut ctx = StepContext::new("f", &params, 0, &mut emissions);

        let mut cell = FilterAdapter::new(Drop);
        let format = FrameFormat::new(1, 1, PixelFormat::Gray8);
        let out = cell
            .step(Some(Frame::new(vec![1u8], format, 0)), &mut ctx)
            .unwrap();
        assert!(out.is_none());
        assert!(cell.step(None, &mut ctx).unwrap().is_none());
    }
}
