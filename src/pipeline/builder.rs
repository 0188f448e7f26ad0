//! Turns a parsed layout into live pipelines.
//!
//! # Example
//!
//! ```rust
//! use gridstreamer::pipeline::PipelineBuilder;
//! use gridstreamer::registry::CellRegistry;
//!
//! let registry = CellRegistry::with_builtin();
//! let pipelines = PipelineBuilder::new(&registry)
//!     .compile("{ src: TestImage Dimension='320x240' ! dst: NullSink }")
//!     .unwrap();
//! assert_eq!(pipelines[0].name(), "BasePipeline");
//! ```

use super::graph::{NodeId, Pipeline};
use crate::cell::Cell;
use crate::error::{Error, Result};
use crate::layout::{CellAst, LayoutAst, PipelineAst, parse_layout};
use crate::registry::CellRegistry;

/// Name of the first pipeline of a channel.
pub const BASE_PIPELINE: &str = "BasePipeline";

/// Name of the pipeline at `index` in layout order.
pub fn pipeline_name(index: usize) -> String {
    match index {
        0 => BASE_PIPELINE.to_string(),
        n => format!("Pipeline{n}"),
    }
}

/// The layout used when a channel is allocated without one.
pub fn default_layout(source_type: &str, sink_type: &str) -> LayoutAst {
    LayoutAst {
        pipelines: vec![PipelineAst {
            cells: vec![CellAst::new("src", source_type), CellAst::new("dst", sink_type)],
        }],
    }
}

/// Builds pipelines against a cell registry.
pub struct PipelineBuilder<'a> {
    registry: &'a CellRegistry,
}

impl<'a> PipelineBuilder<'a> {
    /// Create a builder resolving types in `registry`.
    pub fn new(registry: &'a CellRegistry) -> Self {
        Self { registry }
    }

    /// Parse and build a layout string.
    pub fn compile(&self, layout: &str) -> Result<Vec<Pipeline>> {
        self.build_layout(&parse_layout(layout)?)
    }

    /// Build every pipeline of a layout.
    ///
    /// All or nothing: if any pipeline fails, the cells already created are
    /// shut down and the error is returned.
    pub fn build_layout(&self, layout: &LayoutAst) -> Result<Vec<Pipeline>> {
        let mut pipelines = Vec::with_capacity(layout.pipelines.len());
        for (index, ast) in layout.pipelines.iter().enumerate() {
            match self.build_pipeline(&pipeline_name(index), ast) {
                Ok(pipeline) => pipelines.push(pipeline),
                Err(e) => {
                    for pipeline in &pipelines {
                        discard(pipeline.cells().into_values());
                    }
                    return Err(e);
                }
            }
        }
        tracing::debug!(pipelines = pipelines.len(), "layout built");
        Ok(pipelines)
    }

    /// Build a single pipeline.
    pub fn build_pipeline(&self, name: &str, ast: &PipelineAst) -> Result<Pipeline> {
        let mut created: Vec<Cell> = Vec::with_capacity(ast.cells.len());
        let result = self.assemble(name, ast, &mut created);
        if result.is_err() {
            discard(created);
        }
        result
    }

    fn assemble(&self, name: &str, ast: &PipelineAst, created: &mut Vec<Cell>) -> Result<Pipeline> {
        let mut pipeline = Pipeline::new(name);
        let mut previous: Option<NodeId> = None;

        for cell_ast in &ast.cells {
            let id = match pipeline.node_id(&cell_ast.role) {
                // A repeated role refers back to an earlier cell.
                Some(existing) => existing,
                None => {
                    let cell = self.instantiate(cell_ast)?;
                    created.push(cell.clone());
                    pipeline.add_cell(cell)?
                }
            };
            if let Some(prev) = previous {
                pipeline
                    .link(prev, id)
                    .map_err(|e| at_cell(e, cell_ast))?;
            }
            previous = Some(id);
        }

        pipeline.validate().map_err(|e| {
            let culprit = match &e {
                Error::Parse { token, .. } => ast.cells.iter().find(|c| &c.role == token),
                _ => None,
            };
            match culprit {
                Some(cell) => at_cell(e, cell),
                None => e,
            }
        })?;
        Ok(pipeline)
    }

    fn instantiate(&self, ast: &CellAst) -> Result<Cell> {
        let cell = self.registry.instantiate(&ast.role, &ast.type_name)?;
        let overrides = ast.params.iter().map(|p| (p.name.as_str(), p.value.as_str()));
        if let Err((index, e)) = cell.parameters().apply_overrides(&ast.role, overrides) {
            discard([cell]);
            let param = &ast.params[index];
            return Err(Error::Parse {
                message: e.to_string(),
                position: param.position,
                token: param.value.clone(),
            });
        }
        Ok(cell)
    }
}

/// Relocate a structural error to the cell's position in the layout.
fn at_cell(e: Error, cell: &CellAst) -> Error {
    match e {
        Error::Parse { message, .. } => Error::Parse {
            message,
            position: cell.position,
            token: cell.role.clone(),
        },
        other => other,
    }
}

fn discard(cells: impl IntoIterator<Item = Cell>) {
    for cell in cells {
        cell.shutdown();
    }
}
