//! # Resource Registry
//!
//! Maps the first path segment onto a handler constructor. The set of
//! resource families is closed ([`Resource`]); which families are actually
//! served is decided once at startup by registering a [`HandlerFactory`] for
//! each. The registry is immutable afterwards and read concurrently by every
//! request without locking.

use crate::session::Session;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Resource families addressable through `/<resource>/...`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Commands,
    Files,
    Databases,
}

impl Resource {
    pub const ALL: [Resource; 3] = [Resource::Commands, Resource::Files, Resource::Databases];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Resource::Commands => "commands",
            Resource::Files => "files",
            Resource::Databases => "databases",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Path segment naming no known resource family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownResource(pub String);

impl fmt::Display for UnknownResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown resource '{}'", self.0)
    }
}

impl std::error::Error for UnknownResource {}

impl FromStr for Resource {
    type Err = UnknownResource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Resource::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| UnknownResource(s.to_string()))
    }
}

/// Resource-specific work for one request.
///
/// A handler owns the remainder of the response once invoked: everything it
/// wants the client to see goes through the session it was built from.
pub trait Handler {
    fn serve(&mut self);
}

/// Builds the handler for one request from its session.
pub type HandlerFactory = for<'s> fn(&'s mut Session) -> Box<dyn Handler + 's>;

/// Immutable resource → constructor table.
#[derive(Clone, Default)]
pub struct ResourceRegistry {
    factories: HashMap<Resource, HandlerFactory>,
}

impl ResourceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the constructor for a resource family.
    pub fn register(&mut self, resource: Resource, factory: HandlerFactory) {
        self.factories.insert(resource, factory);
    }

    /// Constructor for a path segment.
    ///
    /// Unknown names, the empty "no match" segment, and families without a
    /// registered constructor all yield `None`.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<HandlerFactory> {
        let resource = name.parse::<Resource>().ok()?;
        self.factories.get(&resource).copied()
    }

    #[must_use]
    pub fn contains(&self, resource: Resource) -> bool {
        self.factories.contains_key(&resource)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}
