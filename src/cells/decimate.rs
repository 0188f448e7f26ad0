//! Decimate filter.

use crate::cell::{Filter, InitContext, ParamFormat, ParamSpec, ParamValue, StepContext};
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::registry::CellDescriptor;

/// Registered type identifier.
pub const TYPE_NAME: &str = "Decimate";

/// Keeps one frame out of every `Every`, dropping the rest.
///
/// The first frame always passes.
#[derive(Debug)]
pub struct Decimate {
    every: u64,
    seen: u64,
}

impl Default for Decimate {
    fn default() -> Self {
        Self { every: 2, seen: 0 }
    }
}

impl Decimate {
    /// Create a decimator keeping every second frame.
    pub fn new() -> Self {
        Self::default()
    }

    /// Describe the type for a registry.
    pub fn descriptor() -> CellDescriptor {
        CellDescriptor::filter(TYPE_NAME, Decimate::new)
            .with_description("Drops all but every Nth frame")
            .with_param(ParamSpec::new(
                "Every",
                ParamFormat::integer_range(1, 1 << 20),
                ParamValue::Integer(2),
            ))
    }

    fn set_every(&mut self, value: &ParamValue) -> Result<()> {
        let every = value
            .as_i64()
            .and_then(|v| u64::try_from(v).ok())
            .filter(|v| *v > 0)
            .ok_or_else(|| Error::validation("Every", format!("expected a positive integer, got {value}")))?;
        self.every = every;
        self.seen = 0;
        Ok(())
    }
}

impl Filter for Decimate {
    fn initialize(&mut self, ctx: &InitContext<'_>) -> Result<()> {
        if let Some(value) = ctx.params().value("Every") {
            self.set_every(&value).map_err(|e| ctx.fail(e.to_string()))?;
        }
        Ok(())
    }

    fn process(&mut self, frame: Frame, _ctx: &mut StepContext<'_>) -> Result<Option<Frame>> {
        let keep = self.seen % self.every == 0;
        self.seen += 1;
        Ok(keep.then_some(frame))
    }

    fn renegotiate(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        if name == "Every" {
            self.set_every(value)?;
        }
        Ok(())
    }
}
