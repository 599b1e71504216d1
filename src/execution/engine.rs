//! Workflow Execution Engine
//!
//! Owns the graph and run registries and drives runs step by step:
//! - Lazy, once-only graph activation against the capability registry
//! - Node dispatch with loop and conditional routing
//! - An iteration cap guarding against runaway cycles
//! - Run state that stays queryable while a run is in progress

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{debug, error, info, warn};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde_json::Value;

use crate::capability::CapabilityLookup;
use crate::config::EngineConfig;
use crate::error::{EngineError, GraphError, StepError};
use crate::monitoring::{EventType, ExecutionTimeline};
use crate::workflow::state::ENGINE_LOG_ID;
use crate::workflow::{Binding, Graph, GraphDefinition, Node, NodeKind, NodeType, StateData, WorkflowState};

use super::report::{RunRequest, RunResponse, StateResponse};

/// Shared handle to the state of one run.
type RunHandle = Arc<Mutex<WorkflowState>>;

/// A registered graph and its activated form.
struct GraphSlot {
    declared: Graph,
    resolved: OnceCell<Arc<Graph>>,
}

impl GraphSlot {
    fn new(declared: Graph) -> Self {
        Self {
            declared,
            resolved: OnceCell::new(),
        }
    }

    /// Returns the resolved graph, resolving it on first use.
    ///
    /// Concurrent callers block until one of them finishes resolving. A
    /// failed resolution is not cached, so a later call retries.
    fn activate(&self, capabilities: &dyn CapabilityLookup) -> Result<Arc<Graph>, GraphError> {
        self.resolved
            .get_or_try_init(|| {
                let mut graph = self.declared.clone();
                graph.resolve_step_references(capabilities)?;
                info!("Activated graph '{}' ({} nodes)", graph.id(), graph.len());
                Ok(Arc::new(graph))
            })
            .map(Arc::clone)
    }
}

/// Workflow execution engine.
///
/// Safe to share between threads: every method takes `&self`, and each
/// run only locks its own state.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
///
/// use flowrunner::capability::CapabilityRegistry;
/// use flowrunner::execution::WorkflowEngine;
/// use flowrunner::workflow::{Graph, Node, StateData};
/// use serde_json::json;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let registry = CapabilityRegistry::new();
///     registry.register_step("inc", |state| {
///         let x = state.get("x").and_then(|v| v.as_i64()).unwrap_or(0);
///         state.set("x", x + 1);
///         Ok(None)
///     })?;
///
///     let mut graph = Graph::new("counter");
///     graph.add_node(Node::new("inc", "Increment", "inc"))?;
///
///     let engine = WorkflowEngine::new(Arc::new(registry));
///     engine.register_graph(graph)?;
///
///     let mut data = StateData::new();
///     data.insert("x".into(), json!(1));
///     let state = engine.run("counter", data, None)?;
///
///     assert_eq!(state.get("x"), Some(&json!(2)));
///     Ok(())
/// }
/// ```
pub struct WorkflowEngine {
    config: EngineConfig,
    capabilities: Arc<dyn CapabilityLookup>,
    graphs: DashMap<String, Arc<GraphSlot>>,
    runs: DashMap<String, RunHandle>,
    run_order: Mutex<VecDeque<String>>,
}

impl WorkflowEngine {
    /// Creates an engine with the default configuration.
    pub fn new(capabilities: Arc<dyn CapabilityLookup>) -> Self {
        Self::with_config(capabilities, EngineConfig::default())
    }

    /// Creates an engine with the given configuration.
    pub fn with_config(capabilities: Arc<dyn CapabilityLookup>, config: EngineConfig) -> Self {
        Self {
            config,
            capabilities,
            graphs: DashMap::new(),
            runs: DashMap::new(),
            run_order: Mutex::new(VecDeque::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the capability registry graphs are resolved against.
    pub fn capabilities(&self) -> &dyn CapabilityLookup {
        self.capabilities.as_ref()
    }

    /// Registers a graph under its own identity, replacing any graph
    /// registered under the same identity.
    ///
    /// With `resolve_on_create` set, the graph is resolved right away and
    /// resolution failures are returned here instead of at the first run.
    pub fn register_graph(&self, graph: Graph) -> Result<String, EngineError> {
        let graph_id = graph.id().to_string();
        let slot = self.prepare_slot(graph)?;

        if self.graphs.insert(graph_id.clone(), slot).is_some() {
            warn!("Graph '{}' replaced", graph_id);
        } else {
            info!("Registered graph '{}'", graph_id);
        }
        Ok(graph_id)
    }

    /// Builds and registers a graph from a declaration.
    ///
    /// Declarations without a `graph_id` get a generated `graph_<n>` id
    /// that is claimed atomically, so a generated id never replaces a
    /// registered graph.
    pub fn create_graph(&self, definition: &GraphDefinition) -> Result<String, EngineError> {
        if let Some(graph_id) = definition.graph_id.as_deref().filter(|id| !id.trim().is_empty()) {
            return self.register_graph(definition.build(graph_id)?);
        }

        let mut n = self.graphs.len() + 1;
        loop {
            let graph_id = format!("graph_{}", n);
            n += 1;
            if self.graphs.contains_key(&graph_id) {
                continue;
            }

            let slot = self.prepare_slot(definition.build(&graph_id)?)?;
            match self.graphs.entry(graph_id) {
                Entry::Vacant(entry) => {
                    info!("Registered graph '{}'", entry.key());
                    let graph_id = entry.key().clone();
                    entry.insert(slot);
                    return Ok(graph_id);
                }
                Entry::Occupied(entry) => {
                    debug!("Graph id '{}' claimed concurrently, trying the next one", entry.key());
                }
            }
        }
    }

    fn prepare_slot(&self, graph: Graph) -> Result<Arc<GraphSlot>, EngineError> {
        let slot = Arc::new(GraphSlot::new(graph));
        if self.config.resolve_on_create {
            slot.activate(self.capabilities.as_ref())?;
        }
        Ok(slot)
    }

    /// Returns true if a graph with this identity is registered.
    pub fn has_graph(&self, graph_id: &str) -> bool {
        self.graphs.contains_key(graph_id)
    }

    /// Lists registered graph identities in sorted order.
    pub fn graph_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.graphs.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Runs a registered graph to completion and returns its final state.
    ///
    /// The only error returned is [`EngineError::GraphNotFound`]. Every
    /// other failure, including resolution failures and capability errors,
    /// completes the run with its `error` set.
    pub fn run(
        &self,
        graph_id: &str,
        initial_data: StateData,
        start_node: Option<&str>,
    ) -> Result<WorkflowState, EngineError> {
        let slot = self
            .graphs
            .get(graph_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| EngineError::GraphNotFound(graph_id.to_string()))?;

        let state = WorkflowState::with_data(initial_data);
        let run_id = state.run_id.clone();
        let handle: RunHandle = Arc::new(Mutex::new(state));
        self.track_run(&run_id, Arc::clone(&handle));
        info!("Run {} started on graph '{}'", run_id, graph_id);

        match slot.activate(self.capabilities.as_ref()) {
            Ok(graph) => {
                let start = start_node
                    .map(str::to_string)
                    .or_else(|| graph.infer_start_node().map(str::to_string));

                match start {
                    Some(start) => {
                        handle.lock().append_log(
                            ENGINE_LOG_ID,
                            format!("Starting workflow from node: {}", start),
                            None,
                        );
                        self.drive(&graph, &handle, start);
                    }
                    None => terminate(&mut handle.lock(), "no start node found"),
                }
            }
            Err(e) => terminate(&mut handle.lock(), e.to_string()),
        }

        let state = handle.lock().clone();
        match &state.error {
            None => info!("Run {} completed", run_id),
            Some(e) => error!("Run {} failed: {}", run_id, e),
        }
        Ok(state)
    }

    /// Runs a graph as described by a transport request.
    pub fn run_request(&self, request: RunRequest) -> Result<RunResponse, EngineError> {
        let state = self.run(
            &request.graph_id,
            request.initial_state,
            request.start_node.as_deref(),
        )?;
        Ok(RunResponse::from_state(&state))
    }

    /// Returns a snapshot of a run's state, or `None` for unknown runs.
    ///
    /// Snapshots of an in-progress run reflect the last finished step.
    pub fn get_run_state(&self, run_id: &str) -> Option<WorkflowState> {
        let handle = self.runs.get(run_id).map(|entry| Arc::clone(entry.value()))?;
        let state = handle.lock().clone();
        Some(state)
    }

    /// Returns a state query response, or `None` for unknown runs.
    pub fn state_response(&self, run_id: &str) -> Option<StateResponse> {
        self.get_run_state(run_id).map(|state| StateResponse::from_state(&state))
    }

    /// Returns the number of runs currently retained.
    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    /// Steps through the graph from `start` until the run completes.
    fn drive(&self, graph: &Graph, handle: &RunHandle, start: String) {
        let mut timeline = ExecutionTimeline::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut current = start;
        let mut iterations = 0;

        while iterations < self.config.max_iterations {
            iterations += 1;
            let mut state = handle.lock();

            let Some(node) = graph.node(&current) else {
                terminate(&mut state, format!("node '{}' not found in graph", current));
                break;
            };

            timeline.add_event(node.id(), EventType::Started);
            match execute_node(graph, node, &mut state) {
                Ok(Some(next)) => {
                    timeline.add_event(node.id(), EventType::Completed);

                    if visited.contains(&next) && node.node_type() != NodeType::Loop {
                        debug!(
                            "Run {}: '{}' revisited outside a loop node, resetting visited set",
                            state.run_id, next
                        );
                        visited.clear();
                    }
                    visited.insert(next.clone());
                    current = next;
                }
                Ok(None) => {
                    timeline.add_event(node.id(), EventType::Completed);
                    state.append_log(ENGINE_LOG_ID, "Workflow completed", None);
                    state.finish();
                    break;
                }
                Err(e) => {
                    timeline.add_event(node.id(), EventType::Failed);
                    warn!("Node '{}' failed: {}", node.id(), e);
                    terminate(&mut state, e.to_string());
                    break;
                }
            }
        }

        let mut state = handle.lock();
        if !state.completed {
            warn!(
                "Run {} stopped after {} iterations",
                state.run_id, self.config.max_iterations
            );
            terminate(&mut state, "maximum iterations reached");
        }
        debug!("Run {} finished after {} steps\n{}", state.run_id, timeline.steps(), timeline.summary());
    }

    /// Adds a run to the registry, evicting the oldest completed runs when
    /// retention is capped.
    fn track_run(&self, run_id: &str, handle: RunHandle) {
        self.runs.insert(run_id.to_string(), handle);

        let mut order = self.run_order.lock();
        order.push_back(run_id.to_string());

        let Some(limit) = self.config.max_retained_runs else {
            return;
        };

        let mut index = 0;
        while order.len() > limit && index < order.len() {
            let handle = self.runs.get(&order[index]).map(|entry| Arc::clone(entry.value()));
            let completed = handle.map_or(true, |h| h.lock().completed);

            if completed {
                if let Some(evicted) = order.remove(index) {
                    self.runs.remove(&evicted);
                    warn!("Evicted run {}", evicted);
                }
            } else {
                index += 1;
            }
        }
    }
}

/// Runs one node and picks the next node, or `None` when the run is done.
fn execute_node(graph: &Graph, node: &Node, state: &mut WorkflowState) -> Result<Option<String>, StepError> {
    state.current_node = Some(node.id().to_string());
    state.append_log(node.id(), format!("Executing node: {}", node.name), None);

    let step = node.step().callable().ok_or_else(|| {
        format!(
            "step '{}' of node '{}' is not resolved",
            node.step().name().unwrap_or_default(),
            node.id()
        )
    })?;

    if let Some(result) = step(state)?.filter(|value| !is_empty_result(value)) {
        state.append_log(node.id(), "Node completed", Some(result));
    }

    let default_successor = || graph.default_successor(node.id()).map(str::to_string);

    let next = match node.kind() {
        NodeKind::Loop(Some(Binding::Resolved(condition))) => {
            if condition(state)? {
                state.append_log(node.id(), "Loop condition met, continuing loop", None);
                default_successor()
            } else {
                state.append_log(node.id(), "Loop condition not met, exiting loop", None);
                None
            }
        }
        NodeKind::Conditional(Some(Binding::Resolved(route))) => match route(state)? {
            Some(target) if graph.contains(&target) => {
                debug!("Node '{}' routed to '{}'", node.id(), target);
                Some(target)
            }
            Some(target) => {
                debug!(
                    "Node '{}' routed to unknown node '{}', using default successor",
                    node.id(),
                    target
                );
                default_successor()
            }
            None => default_successor(),
        },
        _ => default_successor(),
    };

    Ok(next)
}

/// Completes a run with an error and records it in the log.
fn terminate(state: &mut WorkflowState, message: impl Into<String>) {
    let message = message.into();
    state.append_log(ENGINE_LOG_ID, format!("Error: {}", message), None);
    state.fail(message);
}

/// Results that carry nothing worth logging.
fn is_empty_result(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}
