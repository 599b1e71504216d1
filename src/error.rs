//! Error Types
//!
//! Errors surfaced to callers of the graph and engine APIs. Failures raised
//! by capabilities while a run is executing never appear here: the engine
//! converts them into the run's terminal error instead.

use thiserror::Error;

/// Error returned by a step, routing, or loop-continuation callable.
///
/// Capabilities may return any error type; the engine only keeps its
/// message.
pub type StepError = Box<dyn std::error::Error + Send + Sync>;

/// Graph construction and activation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("Node '{0}' already exists in graph")]
    DuplicateNode(String),

    #[error("Node '{0}' not found in graph")]
    UnknownNode(String),

    #[error("Node '{0}' must have a 'func' field")]
    MissingStep(String),

    #[error("Capability '{0}' not found in registry")]
    UnresolvedCapability(String),

    #[error("Node '{node}' has invalid function: {reason}")]
    InvalidStep { node: String, reason: String },
}

/// Capability registry failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    #[error("Capability '{0}' not found")]
    NotFound(String),

    #[error("Capability '{0}' is already registered")]
    AlreadyRegistered(String),
}

/// Errors returned by the workflow engine and its loaders.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Graph '{0}' not found")]
    GraphNotFound(String),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("{0}")]
    Definition(String),

    #[error("Invalid engine configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Returns true for failures a transport layer would report as "not found".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::GraphNotFound(_))
    }
}
