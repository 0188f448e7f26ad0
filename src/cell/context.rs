//! Contexts handed to cells during initialization and steps.

use super::parameter::ParameterSet;
use crate::error::Error;
use crate::frame::Frame;
use crate::metadata::Metadata;

/// A hook invocation staged by a cell during a step.
///
/// Emissions fire after the step returns and the cell lock is released.
#[derive(Debug, Clone)]
pub struct Emission {
    /// Hook name.
    pub hook: String,
    /// Frame handed to observers.
    pub frame: Option<Frame>,
    /// Cell-specific measurements.
    pub metadata: Metadata,
}

/// Context for [`initialize`](super::CellDyn::initialize).
pub struct InitContext<'a> {
    cell: &'a str,
    params: &'a ParameterSet,
}

impl<'a> InitContext<'a> {
    /// Create an init context.
    pub fn new(cell: &'a str, params: &'a ParameterSet) -> Self {
        Self { cell, params }
    }

    /// Role of the cell being initialized.
    pub fn cell_name(&self) -> &str {
        self.cell
    }

    /// The cell's parameters.
    pub fn params(&self) -> &ParameterSet {
        self.params
    }

    /// Build an init error for this cell.
    pub fn fail(&self, message: impl Into<String>) -> Error {
        Error::init(self.cell, message)
    }
}

/// Context for a single step.
pub struct StepContext<'a> {
    cell: &'a str,
    params: &'a ParameterSet,
    tick: u64,
    emissions: &'a mut Vec<Emission>,
}

impl<'a> StepContext<'a> {
    /// Create a step context collecting emissions into `emissions`.
    pub fn new(
        cell: &'a str,
        params: &'a ParameterSet,
        tick: u64,
        emissions: &'a mut Vec<Emission>,
    ) -> Self {
        Self {
            cell,
            params,
            tick,
            emissions,
        }
    }

    /// Role of the stepping cell.
    pub fn cell_name(&self) -> &str {
        self.cell
    }

    /// The cell's parameters.
    pub fn params(&self) -> &ParameterSet {
        self.params
    }

    /// Tick number of this step (per scheduling unit, starting at 0).
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Stage a hook invocation.
    pub fn emit(&mut self, hook: impl Into<String>, frame: Option<Frame>, metadata: Metadata) {
        self.emissions.push(Emission {
            hook: hook.into(),
            frame,
            metadata,
        });
    }

    /// Build a step error for this cell.
    pub fn fail(&self, message: impl Into<String>) -> Error {
        Error::step(self.cell, message)
    }
}
