//! Workflow Graph
//!
//! A named set of nodes connected by default successor edges. Nodes keep
//! their declaration order, which decides start-node inference.

use std::collections::{HashMap, HashSet};

use log::debug;

use crate::capability::{Capability, CapabilityKind, CapabilityLookup};
use crate::error::GraphError;

use super::node::{Binding, Node, NodeKind};

/// A workflow graph.
///
/// # Example
///
/// ```
/// use flowrunner::workflow::{Graph, Node};
///
/// let mut graph = Graph::new("review");
/// graph.add_node(Node::new("extract", "Extract", "extract_functions")).unwrap();
/// graph.add_node(Node::new("detect", "Detect", "detect_issues")).unwrap();
/// graph.add_edge("extract", "detect").unwrap();
///
/// assert_eq!(graph.infer_start_node(), Some("extract"));
/// assert_eq!(graph.default_successor("extract"), Some("detect"));
/// ```
#[derive(Debug, Clone)]
pub struct Graph {
    id: String,
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
    edges: HashMap<String, String>,
}

impl Graph {
    /// Creates an empty graph.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            nodes: Vec::new(),
            index: HashMap::new(),
            edges: HashMap::new(),
        }
    }

    /// Returns the graph identity.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Adds a node. Node identities must be unique.
    pub fn add_node(&mut self, node: Node) -> Result<(), GraphError> {
        if self.index.contains_key(node.id()) {
            return Err(GraphError::DuplicateNode(node.id().to_string()));
        }
        self.index.insert(node.id().to_string(), self.nodes.len());
        self.nodes.push(node);
        Ok(())
    }

    /// Sets the default successor of `from`, replacing any previous one.
    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<(), GraphError> {
        for endpoint in [from, to] {
            if !self.contains(endpoint) {
                return Err(GraphError::UnknownNode(endpoint.to_string()));
            }
        }

        if let Some(previous) = self.edges.insert(from.to_string(), to.to_string()) {
            if previous != to {
                debug!("Edge {} -> {} replaced by {} -> {}", from, previous, from, to);
            }
        }
        Ok(())
    }

    /// Binds every symbolic reference to a callable from `capabilities`.
    ///
    /// Already-bound references are left alone, so calling this twice is
    /// harmless.
    pub fn resolve_step_references(
        &mut self,
        capabilities: &dyn CapabilityLookup,
    ) -> Result<(), GraphError> {
        for node in &mut self.nodes {
            if node.is_resolved() {
                continue;
            }
            let node_id = node.id().to_string();

            if let Some(name) = node.step.name().map(str::to_string) {
                if name.is_empty() {
                    return Err(GraphError::MissingStep(node_id));
                }
                node.step = match lookup(capabilities, &name)? {
                    Capability::Step(f) => Binding::Resolved(f),
                    other => return Err(wrong_kind(&node_id, &name, other.kind(), CapabilityKind::Step)),
                };
            }

            match &mut node.kind {
                NodeKind::Conditional(Some(route)) => {
                    if let Some(name) = route.name().map(str::to_string) {
                        *route = match lookup(capabilities, &name)? {
                            Capability::Router(f) => Binding::Resolved(f),
                            other => {
                                return Err(wrong_kind(&node_id, &name, other.kind(), CapabilityKind::Router))
                            }
                        };
                    }
                }
                NodeKind::Loop(Some(condition)) => {
                    if let Some(name) = condition.name().map(str::to_string) {
                        *condition = match lookup(capabilities, &name)? {
                            Capability::Condition(f) => Binding::Resolved(f),
                            other => {
                                return Err(wrong_kind(
                                    &node_id,
                                    &name,
                                    other.kind(),
                                    CapabilityKind::Condition,
                                ))
                            }
                        };
                    }
                }
                _ => {}
            }

            debug!("Resolved references of node '{}' in graph '{}'", node_id, self.id);
        }
        Ok(())
    }

    /// Returns true if every node's references are bound.
    pub fn is_resolved(&self) -> bool {
        self.nodes.iter().all(Node::is_resolved)
    }

    /// Picks the node execution starts from when none is given.
    ///
    /// This is the first declared node without an incoming edge, or the
    /// first declared node if every node has one.
    pub fn infer_start_node(&self) -> Option<&str> {
        let targets: HashSet<&str> = self.edges.values().map(String::as_str).collect();

        self.nodes
            .iter()
            .map(Node::id)
            .find(|id| !targets.contains(id))
            .or_else(|| self.nodes.first().map(Node::id))
    }

    /// Returns the default successor of a node.
    pub fn default_successor(&self, node_id: &str) -> Option<&str> {
        self.edges.get(node_id).map(String::as_str)
    }

    /// Gets a node by identity.
    pub fn node(&self, node_id: &str) -> Option<&Node> {
        self.index.get(node_id).map(|&i| &self.nodes[i])
    }

    /// Returns true if the graph has a node with this identity.
    pub fn contains(&self, node_id: &str) -> bool {
        self.index.contains_key(node_id)
    }

    /// Iterates nodes in declaration order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// Returns the number of edges.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Returns the number of nodes in the graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

fn lookup(capabilities: &dyn CapabilityLookup, name: &str) -> Result<Capability, GraphError> {
    if !capabilities.has(name) {
        return Err(GraphError::UnresolvedCapability(name.to_string()));
    }
    capabilities
        .lookup(name)
        .map_err(|_| GraphError::UnresolvedCapability(name.to_string()))
}

fn wrong_kind(node: &str, name: &str, found: CapabilityKind, expected: CapabilityKind) -> GraphError {
    GraphError::InvalidStep {
        node: node.to_string(),
        reason: format!("capability '{}' is a {}, expected a {}", name, found, expected),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilityRegistry;
    use crate::workflow::NodeType;

    fn linear_graph(ids: &[&str]) -> Graph {
        let mut graph = Graph::new("linear");
        for id in ids {
            graph.add_node(Node::new(*id, *id, "noop")).unwrap();
        }
        for pair in ids.windows(2) {
            graph.add_edge(pair[0], pair[1]).unwrap();
        }
        graph
    }

    fn registry() -> CapabilityRegistry {
        let registry = CapabilityRegistry::new();
        registry.register_step("noop", |_| Ok(None)).unwrap();
        registry.register_router("pick", |_| Ok(Some("b".to_string()))).unwrap();
        registry.register_condition("again", |_| Ok(false)).unwrap();
        registry
    }

    #[test]
    fn test_add_node_rejects_duplicates() {
        let mut graph = Graph::new("g");
        graph.add_node(Node::new("a", "A", "noop")).unwrap();

        let result = graph.add_node(Node::new("a", "Other", "noop"));
        assert_eq!(result, Err(GraphError::DuplicateNode("a".into())));
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.node("a").unwrap().name, "A");
    }

    #[test]
    fn test_add_edge_unknown_endpoints() {
        let mut graph = linear_graph(&["a"]);

        assert_eq!(graph.add_edge("a", "zzz"), Err(GraphError::UnknownNode("zzz".into())));
        assert_eq!(graph.add_edge("yyy", "a"), Err(GraphError::UnknownNode("yyy".into())));
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_add_edge_replaces_default_successor() {
        let mut graph = linear_graph(&["a", "b", "c"]);
        graph.add_edge("a", "c").unwrap();

        assert_eq!(graph.default_successor("a"), Some("c"));
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn test_infer_start_node_linear() {
        let graph = linear_graph(&["a", "b", "c"]);
        assert_eq!(graph.infer_start_node(), Some("a"));
    }

    #[test]
    fn test_infer_start_node_first_declared_candidate() {
        let mut graph = linear_graph(&["a", "b", "c"]);
        graph.add_node(Node::new("d", "d", "noop")).unwrap();
        graph.add_node(Node::new("e", "e", "noop")).unwrap();
        // a, b and c all have incoming edges; d is declared before e
        graph.add_edge("c", "a").unwrap();
        graph.add_edge("e", "b").unwrap();

        assert_eq!(graph.infer_start_node(), Some("d"));
    }

    #[test]
    fn test_infer_start_node_fully_cyclic() {
        let mut graph = linear_graph(&["a", "b", "c"]);
        graph.add_edge("c", "a").unwrap();
        assert_eq!(graph.infer_start_node(), Some("a"));
    }

    #[test]
    fn test_infer_start_node_empty() {
        let graph = Graph::new("empty");
        assert!(graph.is_empty());
        assert_eq!(graph.infer_start_node(), None);
    }

    #[test]
    fn test_default_successor_absent() {
        let graph = linear_graph(&["a", "b"]);
        assert_eq!(graph.default_successor("b"), None);
        assert_eq!(graph.default_successor("nope"), None);
    }

    #[test]
    fn test_resolve_binds_all_references() {
        let mut graph = linear_graph(&["a", "b"]);
        graph
            .add_node(Node::new("c", "C", "noop").with_router("pick"))
            .unwrap();
        graph
            .add_node(Node::new("d", "D", "noop").with_loop_condition("again"))
            .unwrap();

        assert!(!graph.is_resolved());
        graph.resolve_step_references(&registry()).unwrap();
        assert!(graph.is_resolved());
        assert_eq!(graph.node("c").unwrap().node_type(), NodeType::Conditional);

        let a = graph.node("a").unwrap();
        assert!(a.step().callable().is_some());
        assert!(a.step().name().is_none());
        match graph.node("d").unwrap().kind() {
            NodeKind::Loop(Some(condition)) => assert!(condition.callable().is_some()),
            other => panic!("unexpected kind: {:?}", other),
        }
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let mut graph = linear_graph(&["a", "b"]);
        let registry = registry();

        graph.resolve_step_references(&registry).unwrap();
        registry.unregister("noop").unwrap();

        // Already bound, so the registry is not consulted again
        assert!(graph.resolve_step_references(&registry).is_ok());
        assert!(graph.is_resolved());
    }

    #[test]
    fn test_resolve_unknown_capability() {
        let mut graph = Graph::new("g");
        graph.add_node(Node::new("a", "A", "does_not_exist")).unwrap();

        let err = graph.resolve_step_references(&registry()).unwrap_err();
        assert_eq!(err, GraphError::UnresolvedCapability("does_not_exist".into()));
        assert!(err.to_string().contains("does_not_exist"));
    }

    #[test]
    fn test_resolve_wrong_capability_kind() {
        let mut graph = Graph::new("g");
        graph.add_node(Node::new("a", "A", "pick")).unwrap();

        let err = graph.resolve_step_references(&registry()).unwrap_err();
        assert!(matches!(err, GraphError::InvalidStep { ref node, .. } if node == "a"));
        assert!(err.to_string().contains("expected a step"));
    }

    #[test]
    fn test_resolve_router_naming_a_step() {
        let mut graph = Graph::new("g");
        graph
            .add_node(Node::new("a", "A", "noop").with_router("noop"))
            .unwrap();

        let err = graph.resolve_step_references(&registry()).unwrap_err();
        assert!(matches!(err, GraphError::InvalidStep { .. }));
    }

    #[test]
    fn test_resolve_empty_step_name() {
        let mut graph = Graph::new("g");
        graph.add_node(Node::new("a", "A", "  ")).unwrap();

        let err = graph.resolve_step_references(&registry()).unwrap_err();
        assert_eq!(err, GraphError::MissingStep("a".into()));
    }

    #[test]
    fn test_nodes_keep_declaration_order() {
        let graph = linear_graph(&["z", "m", "a"]);
        let ids: Vec<_> = graph.nodes().map(Node::id).collect();
        assert_eq!(ids, vec!["z", "m", "a"]);
    }
}
