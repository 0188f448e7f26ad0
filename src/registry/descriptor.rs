//! Cell type descriptors.

use crate::cell::{
    CellDyn, CellKind, Filter, FilterAdapter, ParamSpec, Sink, SinkAdapter, Source, SourceAdapter,
};
use std::fmt;
use std::sync::Arc;

/// Builds a fresh implementation of a cell type.
pub type CellFactory = Arc<dyn Fn() -> Box<dyn CellDyn> + Send + Sync>;

/// Everything the engine needs to know about a cell type.
#[derive(Clone)]
pub struct CellDescriptor {
    /// Type identifier used in layouts.
    pub type_name: String,
    /// Capability variant.
    pub kind: CellKind,
    /// One-line description.
    pub description: String,
    /// Parameter schema, in declaration order.
    pub parameters: Vec<ParamSpec>,
    /// Names of the hooks the type fires.
    pub hooks: Vec<&'static str>,
    factory: CellFactory,
}

impl CellDescriptor {
    /// Describe a type from a raw factory.
    ///
    /// `kind` must match what the factory builds; a mismatch is reported
    /// when the type is instantiated.
    pub fn new(type_name: impl Into<String>, kind: CellKind, factory: CellFactory) -> Self {
        Self {
            type_name: type_name.into(),
            kind,
            description: String::new(),
            parameters: Vec::new(),
            hooks: Vec::new(),
            factory,
        }
    }

    /// Describe a source type.
    pub fn source<S, F>(type_name: impl Into<String>, make: F) -> Self
    where
        S: Source + 'static,
        F: Fn() -> S + Send + Sync + 'static,
    {
        Self::new(
            type_name,
            CellKind::Source,
            Arc::new(move || Box::new(SourceAdapter::new(make())) as Box<dyn CellDyn>),
        )
    }

    /// Describe a filter type.
    pub fn filter<T, F>(type_name: impl Into<String>, make: F) -> Self
    where
        T: Filter + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::new(
            type_name,
            CellKind::Filter,
            Arc::new(move || Box::new(FilterAdapter::new(make())) as Box<dyn CellDyn>),
        )
    }

    /// Describe a sink type.
    pub fn sink<S, F>(type_name: impl Into<String>, make: F) -> Self
    where
        S: Sink + 'static,
        F: Fn() -> S + Send + Sync + 'static,
    {
        Self::new(
            type_name,
            CellKind::Sink,
            Arc::new(move || Box::new(SinkAdapter::new(make())) as Box<dyn CellDyn>),
        )
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Declare a parameter.
    pub fn with_param(mut self, spec: ParamSpec) -> Self {
        self.parameters.push(spec);
        self
    }

    /// Declare a hook.
    pub fn with_hook(mut self, name: &'static str) -> Self {
        self.hooks.push(name);
        self
    }

    /// Look up a parameter spec.
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub(crate) fn create(&self) -> Box<dyn CellDyn> {
        (self.factory)()
    }
}

impl fmt::Debug for CellDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellDescriptor")
            .field("type_name", &self.type_name)
            .field("kind", &self.kind)
            .field("parameters", &self.parameters)
            .field("hooks", &self.hooks)
            .finish()
    }
}
