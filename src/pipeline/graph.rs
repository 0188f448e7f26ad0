//! Pipeline graph structure using daggy.

use crate::cell::{Cell, CellKind};
use crate::error::{Error, Result};
use crate::layout::{CellAst, PipelineAst};
use daggy::petgraph::Direction;
use daggy::{Dag, NodeIndex};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Topology label of every pipeline the layout language can express.
pub const CHAIN: &str = "Chain";

/// Unique identifier for a cell node in a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) NodeIndex);

impl NodeId {
    /// Get the underlying index.
    pub fn index(&self) -> usize {
        self.0.index()
    }
}

/// A connected chain of cells from one source to one sink.
///
/// Pipelines have no run loop of their own; the owning channel schedules
/// them. Cells are owned by the pipeline and shut down with it.
pub struct Pipeline {
    name: String,
    graph: Dag<Cell, ()>,
    roles: BTreeMap<String, NodeId>,
    /// Entry to exit, filled by `validate`.
    order: Vec<NodeId>,
    ticks: AtomicU64,
    frames_delivered: AtomicU64,
    frames_flushed: AtomicU64,
}

impl Pipeline {
    /// Create an empty pipeline.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            graph: Dag::new(),
            roles: BTreeMap::new(),
            order: Vec::new(),
            ticks: AtomicU64::new(0),
            frames_delivered: AtomicU64::new(0),
            frames_flushed: AtomicU64::new(0),
        }
    }

    /// Pipeline name (`BasePipeline`, `Pipeline1`, ...).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Topology label.
    pub fn type_name(&self) -> &'static str {
        CHAIN
    }

    /// Add a cell. Fails if its role is already taken.
    pub fn add_cell(&mut self, cell: Cell) -> Result<NodeId> {
        if self.roles.contains_key(cell.name()) {
            return Err(Error::InvalidName(format!(
                "role '{}' already exists in pipeline '{}'",
                cell.name(),
                self.name
            )));
        }
        let role = cell.name().to_string();
        let id = NodeId(self.graph.add_node(cell));
        self.roles.insert(role, id);
        self.order.clear();
        Ok(id)
    }

    /// Node of a role, if present.
    pub fn node_id(&self, role: &str) -> Option<NodeId> {
        self.roles.get(role).copied()
    }

    /// Connect the output of `from` to the input of `to`.
    ///
    /// Rejects links that would close a cycle and links into or out of a
    /// port the cells do not have.
    pub fn link(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        let (from_cell, to_cell) = match (
            self.graph.node_weight(from.0),
            self.graph.node_weight(to.0),
        ) {
            (Some(a), Some(b)) => (a, b),
            _ => return Err(Error::InvalidName("link references an unknown node".into())),
        };

        let cycle = || Error::Parse {
            message: format!(
                "linking '{}' to '{}' would create a cycle",
                from_cell.name(),
                to_cell.name()
            ),
            position: 0,
            token: to_cell.name().to_string(),
        };
        if from == to {
            return Err(cycle());
        }
        if self.out_degree(from) >= from_cell.output_ports() {
            return Err(arity_error(from_cell, "has no free output port"));
        }
        if self.in_degree(to) >= to_cell.input_ports() {
            return Err(arity_error(to_cell, "has no free input port"));
        }

        let err = cycle();
        self.graph.add_edge(from.0, to.0, ()).map_err(|_| err)?;
        self.order.clear();
        Ok(())
    }

    /// Check the graph is a single chain from a source to a sink and fix
    /// the entry-to-exit order.
    pub fn validate(&mut self) -> Result<()> {
        let count = self.graph.node_count();
        if count == 0 {
            return Err(self.structure_error("pipeline has no cells"));
        }
        if self.graph.edge_count() + 1 != count {
            return Err(self.structure_error("cells are not connected into one chain"));
        }

        let entries: Vec<NodeId> = self.node_ids().filter(|&id| self.in_degree(id) == 0).collect();
        let entry = match entries.as_slice() {
            [entry] => *entry,
            _ => return Err(self.structure_error("pipeline must have exactly one entry")),
        };

        let mut order = Vec::with_capacity(count);
        let mut current = Some(entry);
        while let Some(id) = current {
            order.push(id);
            let mut next = self.graph.graph().neighbors_directed(id.0, Direction::Outgoing);
            current = next.next().map(NodeId);
            if next.next().is_some() {
                return Err(self.structure_error("a cell feeds more than one cell"));
            }
        }
        if order.len() != count {
            return Err(self.structure_error("cells are not connected into one chain"));
        }

        for (i, id) in order.iter().enumerate() {
            let cell = &self.graph[id.0];
            let expected = if i + 1 == count {
                CellKind::Sink
            } else if i == 0 {
                CellKind::Source
            } else {
                CellKind::Filter
            };
            if cell.kind() != expected {
                return Err(arity_error(
                    cell,
                    &format!("is a {} but sits where a {expected} belongs", cell.kind()),
                ));
            }
        }

        self.order = order;
        Ok(())
    }

    /// Cells keyed by role.
    pub fn cells(&self) -> BTreeMap<String, Cell> {
        self.roles
            .iter()
            .map(|(role, id)| (role.clone(), self.graph[id.0].clone()))
            .collect()
    }

    /// Cells from entry to exit.
    pub fn cells_in_order(&self) -> Vec<Cell> {
        self.order.iter().map(|id| self.graph[id.0].clone()).collect()
    }

    /// Cell with the given role.
    pub fn cell(&self, role: &str) -> Option<&Cell> {
        self.roles.get(role).map(|id| &self.graph[id.0])
    }

    /// The source cell.
    pub fn entry(&self) -> Option<&Cell> {
        self.order.first().map(|id| &self.graph[id.0])
    }

    /// The sink cell.
    pub fn exit(&self) -> Option<&Cell> {
        self.order.last().map(|id| &self.graph[id.0])
    }

    /// Number of cells.
    pub fn cell_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of links.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Ticks in which this pipeline ran.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Frames accepted by the exit cell.
    pub fn frames_delivered(&self) -> u64 {
        self.frames_delivered.load(Ordering::Relaxed)
    }

    /// Frames discarded from links by a channel flush.
    pub fn frames_flushed(&self) -> u64 {
        self.frames_flushed.load(Ordering::Relaxed)
    }

    /// Describe the current graph, with current parameter values.
    pub fn to_ast(&self) -> PipelineAst {
        let cells = self
            .order
            .iter()
            .map(|id| {
                let cell = &self.graph[id.0];
                cell.parameters().iter().fold(
                    CellAst::new(cell.name(), cell.type_name()),
                    |ast, param| ast.with_param(param.name(), param.get().to_string()),
                )
            })
            .collect();
        PipelineAst { cells }
    }

    pub(crate) fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivery(&self) {
        self.frames_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_flushed(&self) {
        self.frames_flushed.fetch_add(1, Ordering::Relaxed);
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.graph().node_indices().map(NodeId)
    }

    fn in_degree(&self, id: NodeId) -> usize {
        self.graph
            .graph()
            .neighbors_directed(id.0, Direction::Incoming)
            .count()
    }

    fn out_degree(&self, id: NodeId) -> usize {
        self.graph
            .graph()
            .neighbors_directed(id.0, Direction::Outgoing)
            .count()
    }

    fn structure_error(&self, message: &str) -> Error {
        Error::Parse {
            message: format!("pipeline '{}': {message}", self.name),
            position: 0,
            token: self.name.clone(),
        }
    }
}

fn arity_error(cell: &Cell, message: &str) -> Error {
    Error::Parse {
        message: format!("cell '{}' ({}) {message}", cell.name(), cell.type_name()),
        position: 0,
        token: cell.name().to_string(),
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("cells", &self.order.iter().map(|id| self.graph[id.0].name()).collect::<Vec<_>>())
            .field("ticks", &self.ticks())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::CellRegistry;

    fn chain(types: &[(&str, &str)]) -> Result<Pipeline> {
        let registry = CellRegistry::with_builtin();
        let mut pipeline = Pipeline::new("BasePipeline");
        let mut previous = None;
        for (role, type_name) in types {
            let id = pipeline.add_cell(registry.instantiate(role, type_name)?)?;
            if let Some(prev) = previous {
                pipeline.link(prev, id)?;
            }
            previous = Some(id);
        }
        pipeline.validate()?;
        Ok(pipeline)
    }

    #[test]
    fn test_three_cell_chain() {
        let pipeline = chain(&[
            ("src", "TestImage"),
            ("mid", "Passthrough"),
            ("dst", "NullSink"),
        ])
        .unwrap();

        assert_eq!(pipeline.type_name(), "Chain");
        assert_eq!(pipeline.cell_count(), 3);
        assert_eq!(pipeline.edge_count(), 2);
        assert_eq!(pipeline.entry().unwrap().name(), "src");
        assert_eq!(pipeline.exit().unwrap().name(), "dst");

        let order: Vec<String> = pipeline
            .cells_in_order()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(order, vec!["src", "mid", "dst"]);

        let keys: Vec<String> = pipeline.cells().into_keys().collect();
        assert_eq!(keys, vec!["dst", "mid", "src"]);
    }

    #[test]
    fn test_sink_first_is_rejected() {
        let err = chain(&[("dst", "NullSink"), ("src", "TestImage")]).unwrap_err();
        assert!(err.is_parse_error());
    }

    #[test]
    fn test_filter_at_the_end_is_rejected() {
        let err = chain(&[("src", "TestImage"), ("mid", "Passthrough")]).unwrap_err();
        assert!(matches!(err, Error::Parse { ref token, .. } if token == "mid"));
    }

    #[test]
    fn test_self_link_is_a_cycle() {
        let registry = CellRegistry::with_builtin();
        let mut pipeline = Pipeline::new("BasePipeline");
        let id = pipeline
            .add_cell(registry.instantiate("mid", "Passthrough").unwrap())
            .unwrap();
        let err = pipeline.link(id, id).unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_back_link_is_a_cycle() {
        let registry = CellRegistry::with_builtin();
        let mut pipeline = Pipeline::new("BasePipeline");
        let a = pipeline
            .add_cell(registry.instantiate("a", "Passthrough").unwrap())
            .unwrap();
        let b = pipeline
            .add_cell(registry.instantiate("b", "Passthrough").unwrap())
            .unwrap();
        pipeline.link(a, b).unwrap();
        assert!(pipeline.link(b, a).unwrap_err().to_string().contains("cycle"));
    }

    #[test]
    fn test_duplicate_role() {
        let registry = CellRegistry::with_builtin();
        let mut pipeline = Pipeline::new("BasePipeline");
        pipeline
            .add_cell(registry.instantiate("src", "TestImage").unwrap())
            .unwrap();
        assert!(
            pipeline
                .add_cell(registry.instantiate("src", "TestImage").unwrap())
                .is_err()
        );
    }

    #[test]
    fn test_to_ast_carries_current_values() {
        let pipeline = chain(&[("src", "TestImage"), ("dst", "NullSink")]).unwrap();
        pipeline
            .cell("src")
            .unwrap()
            .set_parameter("Dimension", [320, 200])
            .unwrap();

        let ast = pipeline.to_ast();
        assert_eq!(ast.cells.len(), 2);
        let dimension = ast.cells[0]
            .params
            .iter()
            .find(|p| p.name == "Dimension")
            .unwrap();
        assert_eq!(dimension.value, "320x200");
    }
}
