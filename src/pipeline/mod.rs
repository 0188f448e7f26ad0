//! Pipelines: linear chains of cells.
//!
//! - [`Pipeline`]: the cell graph of one chain, backed by a DAG
//! - [`PipelineBuilder`]: builds pipelines from a [`LayoutAst`](crate::layout::LayoutAst)
//!
//! Pipelines are passive. The owning [`Channel`](crate::channel::Channel)
//! decides when their cells run.

mod builder;
mod graph;

pub use builder::{BASE_PIPELINE, PipelineBuilder, default_layout, pipeline_name};
pub use graph::{CHAIN, NodeId, Pipeline};
