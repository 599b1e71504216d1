//! Graph Nodes
//!
//! A node is a named unit of work. Its step, and the routing or loop
//! function for conditional and loop nodes, start out as symbolic
//! capability names and are bound to callables when the graph is
//! activated.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StepError;
use crate::workflow::state::WorkflowState;

/// Step implementation invoked when a node executes.
pub type StepFn = Arc<dyn Fn(&mut WorkflowState) -> Result<Option<Value>, StepError> + Send + Sync>;

/// Routing function of a conditional node. Returns the id of the node to
/// jump to, if any.
pub type RouteFn =
    Arc<dyn Fn(&mut WorkflowState) -> Result<Option<String>, StepError> + Send + Sync>;

/// Continuation function of a loop node. `true` keeps looping.
pub type ConditionFn = Arc<dyn Fn(&mut WorkflowState) -> Result<bool, StepError> + Send + Sync>;

/// A reference that is either still a capability name or already bound.
#[derive(Clone)]
pub enum Binding<F> {
    Unresolved(String),
    Resolved(F),
}

impl<F> Binding<F> {
    /// Returns true once the reference has been bound to a callable.
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }

    /// Returns the capability name of an unresolved reference.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Unresolved(name) => Some(name),
            Self::Resolved(_) => None,
        }
    }

    /// Returns the callable of a resolved reference.
    pub fn callable(&self) -> Option<&F> {
        match self {
            Self::Resolved(f) => Some(f),
            Self::Unresolved(_) => None,
        }
    }
}

impl<F> fmt::Debug for Binding<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unresolved(name) => write!(f, "Unresolved({:?})", name),
            Self::Resolved(_) => write!(f, "Resolved(<fn>)"),
        }
    }
}

/// Node type tag as it appears in graph definitions.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    #[default]
    Standard,
    Conditional,
    Loop,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard => write!(f, "standard"),
            Self::Conditional => write!(f, "conditional"),
            Self::Loop => write!(f, "loop"),
        }
    }
}

/// Routing behavior of a node.
///
/// A conditional or loop node without its function routes like a
/// standard node.
#[derive(Debug, Clone)]
pub enum NodeKind {
    Standard,
    Conditional(Option<Binding<RouteFn>>),
    Loop(Option<Binding<ConditionFn>>),
}

impl NodeKind {
    /// Returns the type tag of this kind.
    pub fn node_type(&self) -> NodeType {
        match self {
            Self::Standard => NodeType::Standard,
            Self::Conditional(_) => NodeType::Conditional,
            Self::Loop(_) => NodeType::Loop,
        }
    }
}

/// A node in a workflow graph.
#[derive(Debug, Clone)]
pub struct Node {
    id: String,

    /// Display name
    pub name: String,

    /// Step implementation or capability name
    pub(crate) step: Binding<StepFn>,

    /// Routing behavior
    pub(crate) kind: NodeKind,
}

impl Node {
    /// Creates a standard node whose step is a capability name.
    ///
    /// # Example
    ///
    /// ```
    /// use flowrunner::workflow::Node;
    ///
    /// let node = Node::new("extract", "Extract Functions", "extract_functions");
    /// assert_eq!(node.id(), "extract");
    /// ```
    pub fn new(id: impl Into<String>, name: impl Into<String>, step: impl Into<String>) -> Self {
        Self {
            id: id.into().trim().to_string(),
            name: name.into(),
            step: Binding::Unresolved(step.into().trim().to_string()),
            kind: NodeKind::Standard,
        }
    }

    /// Creates a standard node bound directly to a callable.
    pub fn from_fn<F>(id: impl Into<String>, name: impl Into<String>, step: F) -> Self
    where
        F: Fn(&mut WorkflowState) -> Result<Option<Value>, StepError> + Send + Sync + 'static,
    {
        Self {
            id: id.into().trim().to_string(),
            name: name.into(),
            step: Binding::Resolved(Arc::new(step)),
            kind: NodeKind::Standard,
        }
    }

    /// Makes this a conditional node routed by the named capability.
    pub fn with_router(mut self, router: impl Into<String>) -> Self {
        self.kind = NodeKind::Conditional(Some(Binding::Unresolved(router.into())));
        self
    }

    /// Makes this a conditional node routed by `router`.
    pub fn with_router_fn<F>(mut self, router: F) -> Self
    where
        F: Fn(&mut WorkflowState) -> Result<Option<String>, StepError> + Send + Sync + 'static,
    {
        self.kind = NodeKind::Conditional(Some(Binding::Resolved(Arc::new(router))));
        self
    }

    /// Makes this a loop node continued by the named capability.
    pub fn with_loop_condition(mut self, condition: impl Into<String>) -> Self {
        self.kind = NodeKind::Loop(Some(Binding::Unresolved(condition.into())));
        self
    }

    /// Makes this a loop node continued by `condition`.
    pub fn with_loop_condition_fn<F>(mut self, condition: F) -> Self
    where
        F: Fn(&mut WorkflowState) -> Result<bool, StepError> + Send + Sync + 'static,
    {
        self.kind = NodeKind::Loop(Some(Binding::Resolved(Arc::new(condition))));
        self
    }

    /// Sets the kind directly.
    pub fn with_kind(mut self, kind: NodeKind) -> Self {
        self.kind = kind;
        self
    }

    /// Returns the node identity.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the step binding.
    pub fn step(&self) -> &Binding<StepFn> {
        &self.step
    }

    /// Returns the routing behavior.
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Returns the type tag of this node.
    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }

    /// Returns true if every reference on this node is bound.
    pub fn is_resolved(&self) -> bool {
        let kind_resolved = match &self.kind {
            NodeKind::Standard => true,
            NodeKind::Conditional(route) => route.as_ref().map_or(true, Binding::is_resolved),
            NodeKind::Loop(condition) => condition.as_ref().map_or(true, Binding::is_resolved),
        };
        self.step.is_resolved() && kind_resolved
    }
}
