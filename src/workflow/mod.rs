//! Workflow Definition Module
//!
//! Provides data structures and utilities for declaring workflow graphs
//! and the state threaded through their runs.
//!
//! # Structure
//!
//! - [`node`]: Nodes, node kinds, and capability bindings
//! - [`graph`]: Graphs, edges, and start-node inference
//! - [`state`]: Per-run data, execution log, and status
//! - [`definition`]: YAML/JSON graph definitions

pub mod definition;
pub mod graph;
pub mod node;
pub mod state;

pub use definition::{load_graph_definition, parse_graph_definition, GraphDefinition, NodeDefinition};
pub use graph::Graph;
pub use node::{Binding, Node, NodeKind, NodeType};
pub use state::{LogEntry, StateData, WorkflowState};
