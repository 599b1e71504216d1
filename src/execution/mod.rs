//! Workflow Execution Module
//!
//! Provides the engine that registers graphs and drives runs through them,
//! plus the request and response shapes a transport layer would exchange.
//!
//! # Architecture
//!
//! - [`engine`]: Graph and run registries, and the step loop
//! - [`report`]: Serializable run requests and responses

pub mod engine;
pub mod report;

pub use engine::WorkflowEngine;
pub use report::{RunRequest, RunResponse, StateResponse};
