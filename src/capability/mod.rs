//! Capability Registry
//!
//! Capabilities are the named units of work nodes invoke. The engine only
//! consumes them through [`CapabilityLookup`]; [`CapabilityRegistry`] is a
//! thread-safe in-memory implementation.
//!
//! # Components
//!
//! - [`CapabilityRegistry`]: name -> callable storage
//! - [`review`]: built-in code review capabilities and example graph

pub mod review;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;

use crate::error::{CapabilityError, StepError};
use crate::workflow::node::{ConditionFn, RouteFn, StepFn};
use crate::workflow::WorkflowState;

/// A registered callable.
#[derive(Clone)]
pub enum Capability {
    Step(StepFn),
    Router(RouteFn),
    Condition(ConditionFn),
}

impl Capability {
    /// Returns what this capability can be bound to.
    pub fn kind(&self) -> CapabilityKind {
        match self {
            Self::Step(_) => CapabilityKind::Step,
            Self::Router(_) => CapabilityKind::Router,
            Self::Condition(_) => CapabilityKind::Condition,
        }
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Capability::{:?}", self.kind())
    }
}

/// The role a capability plays in a graph.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityKind {
    /// Node step implementation
    Step,
    /// Routing function of a conditional node
    Router,
    /// Continuation function of a loop node
    Condition,
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Step => write!(f, "step"),
            Self::Router => write!(f, "router"),
            Self::Condition => write!(f, "condition"),
        }
    }
}

/// Name-based capability lookup used during graph activation.
pub trait CapabilityLookup: Send + Sync {
    /// Returns true if a capability with this name exists.
    fn has(&self, name: &str) -> bool;

    /// Looks up a capability by name.
    fn lookup(&self, name: &str) -> Result<Capability, CapabilityError>;

    /// Lists registered names and their kinds.
    fn list(&self) -> BTreeMap<String, CapabilityKind>;
}

/// Thread-safe capability registry.
///
/// # Example
///
/// ```
/// use flowrunner::capability::{CapabilityLookup, CapabilityRegistry};
/// use serde_json::json;
///
/// let registry = CapabilityRegistry::new();
/// registry
///     .register_step("greet", |state| {
///         state.set("greeting", "hello");
///         Ok(Some(json!("hello")))
///     })
///     .unwrap();
///
/// assert!(registry.has("greet"));
/// ```
#[derive(Default)]
pub struct CapabilityRegistry {
    items: DashMap<String, Capability>,
}

impl CapabilityRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            items: DashMap::new(),
        }
    }

    /// Registers a capability under `name`.
    ///
    /// Returns an error if the name is taken.
    pub fn register(&self, name: impl Into<String>, capability: Capability) -> Result<(), CapabilityError> {
        let name = name.into();
        if self.items.contains_key(&name) {
            return Err(CapabilityError::AlreadyRegistered(name));
        }
        self.items.insert(name, capability);
        Ok(())
    }

    /// Registers a node step.
    pub fn register_step<F>(&self, name: impl Into<String>, step: F) -> Result<(), CapabilityError>
    where
        F: Fn(&mut WorkflowState) -> Result<Option<Value>, StepError> + Send + Sync + 'static,
    {
        self.register(name, Capability::Step(Arc::new(step)))
    }

    /// Registers a routing function for conditional nodes.
    pub fn register_router<F>(&self, name: impl Into<String>, router: F) -> Result<(), CapabilityError>
    where
        F: Fn(&mut WorkflowState) -> Result<Option<String>, StepError> + Send + Sync + 'static,
    {
        self.register(name, Capability::Router(Arc::new(router)))
    }

    /// Registers a continuation function for loop nodes.
    pub fn register_condition<F>(&self, name: impl Into<String>, condition: F) -> Result<(), CapabilityError>
    where
        F: Fn(&mut WorkflowState) -> Result<bool, StepError> + Send + Sync + 'static,
    {
        self.register(name, Capability::Condition(Arc::new(condition)))
    }

    /// Removes a capability.
    pub fn unregister(&self, name: &str) -> Result<(), CapabilityError> {
        self.items
            .remove(name)
            .ok_or_else(|| CapabilityError::NotFound(name.to_string()))?;
        Ok(())
    }

    /// Returns the number of registered capabilities.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl CapabilityLookup for CapabilityRegistry {
    fn has(&self, name: &str) -> bool {
        self.items.contains_key(name)
    }

    fn lookup(&self, name: &str) -> Result<Capability, CapabilityError> {
        self.items
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| CapabilityError::NotFound(name.to_string()))
    }

    fn list(&self) -> BTreeMap<String, CapabilityKind> {
        self.items
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().kind()))
            .collect()
    }
}
