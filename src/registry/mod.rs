//! Registry of cell types.
//!
//! Layouts name cell types by identifier; the registry maps each identifier
//! to a [`CellDescriptor`] holding the factory, parameter schema and hooks.
//! It is an explicit object, usually shared as `Arc<CellRegistry>` between
//! the grids that use it, and is populated before any layout is parsed.

mod descriptor;

pub use descriptor::{CellDescriptor, CellFactory};

use crate::cell::Cell;
use crate::cells;
use crate::error::{Error, Result};
use std::collections::HashMap;

/// Map from type identifier to descriptor.
#[derive(Debug, Clone, Default)]
pub struct CellRegistry {
    types: HashMap<String, CellDescriptor>,
}

impl CellRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in cells registered.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        cells::register_builtin(&mut registry);
        registry
    }

    /// Register a cell type, replacing any type of the same name.
    pub fn register(&mut self, descriptor: CellDescriptor) {
        tracing::debug!(type_name = %descriptor.type_name, kind = %descriptor.kind, "cell type registered");
        self.types.insert(descriptor.type_name.clone(), descriptor);
    }

    /// Look up a cell type.
    pub fn get(&self, type_name: &str) -> Option<&CellDescriptor> {
        self.types.get(type_name)
    }

    /// Whether a type is registered.
    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    /// Registered type identifiers, sorted.
    pub fn cell_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.types.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Create a cell of `type_name` under the role `role`.
    pub fn instantiate(&self, role: &str, type_name: &str) -> Result<Cell> {
        let descriptor = self
            .get(type_name)
            .ok_or_else(|| Error::UnknownCellType(type_name.to_string()))?;
        Cell::new(role, descriptor)
    }
}
