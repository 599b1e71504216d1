//! FlowRunner - Workflow Graph Engine
//!
//! A small engine for running directed graphs of pluggable steps. Nodes
//! name the capabilities they invoke; the engine resolves those names on
//! first use, then threads a shared state through the graph, following
//! loop and conditional routing until a node has no successor.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - [`workflow`]: Nodes, graphs, graph definitions, and run state
//! - [`capability`]: The capability registry and built-in code review steps
//! - [`execution`]: The workflow engine and its request/response shapes
//! - [`monitoring`]: Per-node execution timeline
//! - [`config`]: Engine configuration
//! - [`error`]: Error types
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use flowrunner::capability::{review, CapabilityRegistry};
//! use flowrunner::execution::WorkflowEngine;
//! use flowrunner::load_graph_definition;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Register the capabilities graphs may refer to
//!     let registry = CapabilityRegistry::new();
//!     review::register_builtins(&registry)?;
//!
//!     // Load a graph definition from YAML
//!     let definition = load_graph_definition("review.yaml")?;
//!
//!     let engine = WorkflowEngine::new(Arc::new(registry));
//!     let graph_id = engine.create_graph(&definition)?;
//!
//!     let state = engine.run(&graph_id, Default::default(), None)?;
//!     println!("completed: {}, error: {:?}", state.completed, state.error);
//!     Ok(())
//! }
//! ```

pub mod capability;
pub mod config;
pub mod error;
pub mod execution;
pub mod monitoring;
pub mod workflow;

// Re-export commonly used types
pub use capability::{CapabilityLookup, CapabilityRegistry};
pub use config::EngineConfig;
pub use error::{CapabilityError, EngineError, GraphError, StepError};
pub use execution::engine::WorkflowEngine;
pub use workflow::definition::load_graph_definition;
pub use workflow::{Graph, Node, WorkflowState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "FlowRunner";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_version() {
        assert!(!VERSION.is_empty());
        assert!(VERSION.contains('.'));
    }

    #[test]
    fn test_app_name() {
        assert_eq!(APP_NAME, "FlowRunner");
    }

    #[test]
    fn test_module_exports_node() {
        let node = Node::new("extract", "Extract Functions", "extract_functions");
        assert_eq!(node.id(), "extract");
        assert!(!node.is_resolved());
    }

    #[test]
    fn test_module_exports_graph() {
        let graph = Graph::new("empty");
        assert!(graph.is_empty());
        assert!(graph.infer_start_node().is_none());
    }

    #[test]
    fn test_version_format() {
        let parts: Vec<&str> = VERSION.split('.').collect();
        assert!(parts.len() >= 2, "Version should have at least major.minor");
        for part in parts {
            assert!(part.parse::<u32>().is_ok(), "Version components should be numeric");
        }
    }
}
