//! Layout syntax tree and its canonical serialization.

use std::fmt;

/// A whole layout: one or more pipelines.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LayoutAst {
    /// Pipelines in declaration order.
    pub pipelines: Vec<PipelineAst>,
}

/// A chain of cells linked by `!`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PipelineAst {
    /// Cells from entry to exit.
    pub cells: Vec<CellAst>,
}

/// `role: Type Name='value' ...`
///
/// Equality ignores source positions.
#[derive(Debug, Clone)]
pub struct CellAst {
    /// Role name (`src`, `dst`, ...).
    pub role: String,
    /// Registered type identifier.
    pub type_name: String,
    /// Parameter overrides in source order.
    pub params: Vec<ParamAst>,
    /// Byte offset of the role token.
    pub position: usize,
    /// Byte offset of the type token.
    pub type_position: usize,
}

/// `Name='value'`
///
/// Equality ignores source positions.
#[derive(Debug, Clone)]
pub struct ParamAst {
    /// Parameter name.
    pub name: String,
    /// Raw value text.
    pub value: String,
    /// Byte offset of the value token.
    pub position: usize,
}

impl CellAst {
    /// Build a cell node without source positions.
    pub fn new(role: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            type_name: type_name.into(),
            params: Vec::new(),
            position: 0,
            type_position: 0,
        }
    }

    /// Add a parameter override.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push(ParamAst {
            name: name.into(),
            value: value.into(),
            position: 0,
        });
        self
    }
}

impl PartialEq for CellAst {
    fn eq(&self, other: &Self) -> bool {
        self.role == other.role && self.type_name == other.type_name && self.params == other.params
    }
}

impl PartialEq for ParamAst {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.value == other.value
    }
}

impl fmt::Display for LayoutAst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{ ")?;
        for (i, pipeline) in self.pipelines.iter().enumerate() {
            if i > 0 {
                f.write_str(" ; ")?;
            }
            write!(f, "{pipeline}")?;
        }
        f.write_str(" }")
    }
}

impl fmt::Display for PipelineAst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, cell) in self.cells.iter().enumerate() {
            if i > 0 {
                f.write_str(" ! ")?;
            }
            write!(f, "{cell}")?;
        }
        Ok(())
    }
}

impl fmt::Display for CellAst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.role, self.type_name)?;
        for param in &self.params {
            write!(f, " {param}")?;
        }
        Ok(())
    }
}

impl fmt::Display for ParamAst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // No escapes in the grammar: pick the quote the value does not use.
        if self.value.contains('\'') {
            write!(f, "{}=\"{}\"", self.name, self.value)
        } else {
            write!(f, "{}='{}'", self.name, self.value)
        }
    }
}
