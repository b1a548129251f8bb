//! Middleware registration, by scope

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use contracts::DestinationId;

use crate::middleware::Middleware;

/// Where a middleware is attached
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MiddlewareScope {
    /// Runs once per payload before routing
    Source,
    /// Runs per payload for a single destination
    Destination(DestinationId),
}

impl fmt::Display for MiddlewareScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => f.write_str("source"),
            Self::Destination(id) => write!(f, "destination:{id}"),
        }
    }
}

/// Ordered middleware lists. Filled while the client is being built,
/// read-only afterwards.
#[derive(Clone, Default)]
pub struct MiddlewareRegistry {
    source: Vec<Arc<dyn Middleware>>,
    destination: HashMap<DestinationId, Vec<Arc<dyn Middleware>>>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the source chain
    pub fn add_source(&mut self, middleware: Arc<dyn Middleware>) {
        self.source.push(middleware);
    }

    /// Append to the chain of `destination`
    pub fn add_destination(&mut self, destination: impl Into<DestinationId>, middleware: Arc<dyn Middleware>) {
        self.destination
            .entry(destination.into())
            .or_default()
            .push(middleware);
    }

    /// Append to the chain selected by `scope`
    pub fn add(&mut self, scope: MiddlewareScope, middleware: Arc<dyn Middleware>) {
        match scope {
            MiddlewareScope::Source => self.add_source(middleware),
            MiddlewareScope::Destination(id) => self.add_destination(id, middleware),
        }
    }

    pub fn source(&self) -> &[Arc<dyn Middleware>] {
        &self.source
    }

    /// Chain for `destination`; empty when none was registered
    pub fn for_destination(&self, destination: &str) -> &[Arc<dyn Middleware>] {
        self.destination
            .get(destination)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Destinations that have at least one middleware
    pub fn destinations(&self) -> impl Iterator<Item = &DestinationId> {
        self.destination.keys()
    }

    pub fn len(&self, scope: &MiddlewareScope) -> usize {
        match scope {
            MiddlewareScope::Source => self.source.len(),
            MiddlewareScope::Destination(id) => self.for_destination(id).len(),
        }
    }
}

impl fmt::Debug for MiddlewareRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let destination: HashMap<&str, usize> = self
            .destination
            .iter()
            .map(|(k, v)| (k.as_ref(), v.len()))
            .collect();
        f.debug_struct("MiddlewareRegistry")
            .field("source", &self.source.len())
            .field("destination", &destination)
            .finish()
    }
}
