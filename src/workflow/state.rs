//! Workflow Run State
//!
//! The mutable value threaded through every node of a single run: the
//! key/value data capabilities read and write, the append-only execution
//! log, and the run's identity and completion status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Key/value data carried by a run.
pub type StateData = Map<String, Value>;

/// Pseudo node identity used for entries written by the engine itself.
pub const ENGINE_LOG_ID: &str = "engine";

/// Pseudo node identity used by loop-continuation functions.
pub const LOOP_LOG_ID: &str = "loop";

/// A single entry in a run's execution log.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LogEntry {
    /// When the entry was appended (RFC 3339)
    pub timestamp: DateTime<Utc>,

    /// Node that produced the entry, or a pseudo identity such as `engine`
    pub node_id: String,

    /// Human-readable message
    pub message: String,

    /// Optional result payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

/// State of one workflow run.
///
/// Created by the engine when a run starts. Once `completed` is set the
/// engine never touches it again.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WorkflowState {
    /// Globally unique run identity
    pub run_id: String,

    /// When the run was created
    pub created_at: DateTime<Utc>,

    /// Key/value data shared between nodes
    pub data: StateData,

    /// Ordered execution log
    pub execution_log: Vec<LogEntry>,

    /// Node most recently entered
    pub current_node: Option<String>,

    /// Set once the run has terminated, successfully or not
    pub completed: bool,

    /// Terminal error message, if the run failed
    pub error: Option<String>,
}

impl WorkflowState {
    /// Creates a new run state with a fresh identity and no data.
    pub fn new() -> Self {
        Self::with_data(StateData::new())
    }

    /// Creates a new run state seeded with `data`.
    pub fn with_data(data: StateData) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            data,
            execution_log: Vec::new(),
            current_node: None,
            completed: false,
            error: None,
        }
    }

    /// Merges key/value pairs into the data mapping. Later writes win.
    pub fn set_many<I, K>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        for (key, value) in entries {
            self.data.insert(key.into(), value);
        }
    }

    /// Sets a single key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(key.into(), value.into());
    }

    /// Gets a value from the data mapping.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Gets a value, or `default` when the key is absent.
    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.data.get(key).cloned().unwrap_or(default)
    }

    /// Appends an entry to the execution log, stamped with the current time.
    pub fn append_log(&mut self, node_id: &str, message: impl Into<String>, result: Option<Value>) {
        self.execution_log.push(LogEntry {
            timestamp: Utc::now(),
            node_id: node_id.to_string(),
            message: message.into(),
            result,
        });
    }

    /// Marks the run as successfully completed.
    pub(crate) fn finish(&mut self) {
        self.completed = true;
    }

    /// Marks the run as completed with a terminal error.
    pub(crate) fn fail(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
        self.completed = true;
    }

    /// Returns true if the run completed without error.
    pub fn succeeded(&self) -> bool {
        self.completed && self.error.is_none()
    }
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self::new()
    }
}
