//! Run Requests and Responses
//!
//! Serializable shapes exchanged with whatever transport fronts the
//! engine: a run request, the run response, and the state query response.

use serde::{Deserialize, Serialize};

use crate::workflow::{LogEntry, StateData, WorkflowState};

/// Request to run a registered graph.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct RunRequest {
    pub graph_id: String,

    #[serde(default)]
    pub initial_state: StateData,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_node: Option<String>,
}

/// Outcome of a run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RunResponse {
    pub run_id: String,
    pub final_state: StateData,
    pub execution_log: Vec<LogEntry>,
    pub completed: bool,
    pub error: Option<String>,
}

impl RunResponse {
    pub fn from_state(state: &WorkflowState) -> Self {
        Self {
            run_id: state.run_id.clone(),
            final_state: state.data.clone(),
            execution_log: state.execution_log.clone(),
            completed: state.completed,
            error: state.error.clone(),
        }
    }
}

/// State of a run as returned by a state query.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StateResponse {
    pub run_id: String,
    pub current_node: Option<String>,
    pub state: StateData,
    pub execution_log: Vec<LogEntry>,
    pub completed: bool,
    pub error: Option<String>,
}

impl StateResponse {
    pub fn from_state(state: &WorkflowState) -> Self {
        Self {
            run_id: state.run_id.clone(),
            current_node: state.current_node.clone(),
            state: state.data.clone(),
            execution_log: state.execution_log.clone(),
            completed: state.completed,
            error: state.error.clone(),
        }
    }
}
