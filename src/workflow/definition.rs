//! Graph Definitions
//!
//! Handles loading graph definitions from YAML or JSON and turning them
//! into [`Graph`]s. Capability names stay symbolic until the graph is
//! activated by the engine.
//!
//! # Example YAML Format
//!
//! ```yaml
//! graph_id: review
//! nodes:
//!   extract:
//!     name: Extract Functions
//!     func: extract_functions
//!   loop_check:
//!     name: Check Quality Loop
//!     func: noop
//!     type: loop
//!     loop_condition_func: quality_below_threshold
//! edges:
//!   extract: loop_check
//!   loop_check: extract
//! ```

use std::fmt;
use std::fs;
use std::marker::PhantomData;

use log::{debug, info};
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{EngineError, GraphError};

use super::graph::Graph;
use super::node::{Binding, Node, NodeKind, NodeType};

/// Declaration of a single node.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct NodeDefinition {
    /// Display name (defaults to the node id)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Capability name of the step
    #[serde(default)]
    pub func: String,

    /// Node type
    #[serde(rename = "type", default)]
    pub node_type: NodeType,

    /// Routing capability of a conditional node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_func: Option<String>,

    /// Continuation capability of a loop node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_condition_func: Option<String>,
}

impl NodeDefinition {
    /// Creates a standard node definition.
    pub fn new(func: impl Into<String>) -> Self {
        Self {
            func: func.into(),
            ..Self::default()
        }
    }
}

/// Declaration of a whole graph.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct GraphDefinition {
    /// Graph identity (generated by the engine when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_id: Option<String>,

    /// Nodes in declaration order
    #[serde(
        deserialize_with = "ordered_entries",
        serialize_with = "entries_as_map"
    )]
    pub nodes: Vec<(String, NodeDefinition)>,

    /// Default successor of each node
    #[serde(
        default,
        deserialize_with = "ordered_entries",
        serialize_with = "entries_as_map"
    )]
    pub edges: Vec<(String, String)>,
}

/// Deserializes a map into a list of entries, keeping source order.
fn ordered_entries<'de, D, V>(deserializer: D) -> Result<Vec<(String, V)>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    struct EntriesVisitor<V>(PhantomData<V>);

    impl<'de, V: Deserialize<'de>> Visitor<'de> for EntriesVisitor<V> {
        type Value = Vec<(String, V)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "a map keyed by node id")
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((key, value)) = map.next_entry::<String, V>()? {
                entries.push((key, value));
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_any(EntriesVisitor(PhantomData))
}

fn entries_as_map<S, V>(entries: &[(String, V)], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    V: Serialize,
{
    serializer.collect_map(entries.iter().map(|(k, v)| (k, v)))
}

impl GraphDefinition {
    /// Adds a node declaration.
    pub fn with_node(mut self, id: impl Into<String>, node: NodeDefinition) -> Self {
        self.nodes.push((id.into(), node));
        self
    }

    /// Adds an edge declaration.
    pub fn with_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.push((from.into(), to.into()));
        self
    }

    /// Builds a graph with the given identity.
    ///
    /// Validates node uniqueness and edge endpoints; capability names are
    /// left unresolved.
    pub fn build(&self, graph_id: &str) -> Result<Graph, GraphError> {
        let mut graph = Graph::new(graph_id);

        for (id, def) in &self.nodes {
            if def.func.trim().is_empty() {
                return Err(GraphError::MissingStep(id.clone()));
            }

            let kind = match def.node_type {
                NodeType::Standard => NodeKind::Standard,
                NodeType::Conditional => {
                    NodeKind::Conditional(def.condition_func.clone().map(Binding::Unresolved))
                }
                NodeType::Loop => NodeKind::Loop(def.loop_condition_func.clone().map(Binding::Unresolved)),
            };

            let name = def.name.clone().unwrap_or_else(|| id.clone());
            graph.add_node(Node::new(id.as_str(), name, def.func.as_str()).with_kind(kind))?;
        }

        for (from, to) in &self.edges {
            graph.add_edge(from, to)?;
        }

        debug!(
            "Built graph '{}' with {} nodes and {} edges",
            graph_id,
            graph.len(),
            graph.edge_count()
        );
        Ok(graph)
    }
}

/// Parses a graph definition from YAML text. JSON is accepted as well.
pub fn parse_graph_definition(content: &str) -> Result<GraphDefinition, EngineError> {
    serde_yaml::from_str(content).map_err(|e| {
        EngineError::Definition(format!("Failed to parse graph definition: {}. Check the file format.", e))
    })
}

/// Loads a graph definition from a YAML or JSON file.
///
/// # Example
///
/// ```rust,no_run
/// use flowrunner::workflow::load_graph_definition;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let definition = load_graph_definition("review.yaml")?;
///     println!("Loaded {} nodes", definition.nodes.len());
///     Ok(())
/// }
/// ```
pub fn load_graph_definition(path: &str) -> Result<GraphDefinition, EngineError> {
    info!("Loading graph definition from: {}", path);

    let content = fs::read_to_string(path).map_err(|e| {
        EngineError::Definition(format!(
            "Failed to read graph file '{}': {}. Check that the file exists and is readable.",
            path, e
        ))
    })?;

    debug!("Definition loaded ({} bytes)", content.len());

    let definition = parse_graph_definition(&content)?;
    info!(
        "Parsed {} nodes, {} edges",
        definition.nodes.len(),
        definition.edges.len()
    );
    Ok(definition)
}

/// Saves a graph definition to a YAML file.
pub fn save_graph_definition(definition: &GraphDefinition, path: &str) -> Result<(), EngineError> {
    let content = serde_yaml::to_string(definition)
        .map_err(|e| EngineError::Definition(format!("Failed to serialize graph definition: {}", e)))?;
    fs::write(path, content)?;
    info!("Graph definition saved to: {}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const REVIEW_YAML: &str = r#"
graph_id: review
nodes:
  suggest:
    name: Suggest
    func: suggest_improvements
  extract:
    func: extract_functions
  branch:
    func: noop
    type: conditional
    condition_func: pick
  loop_check:
    func: noop
    type: loop
    loop_condition_func: again
edges:
  suggest: extract
  extract: branch
  branch: loop_check
"#;

    #[test]
    fn test_parse_keeps_declaration_order() {
        let definition = parse_graph_definition(REVIEW_YAML).unwrap();
        let ids: Vec<_> = definition.nodes.iter().map(|(id, _)| id.as_str()).collect();

        assert_eq!(definition.graph_id.as_deref(), Some("review"));
        assert_eq!(ids, vec!["suggest", "extract", "branch", "loop_check"]);
        assert_eq!(definition.edges.len(), 3);
    }

    #[test]
    fn test_parse_node_fields() {
        let definition = parse_graph_definition(REVIEW_YAML).unwrap();
        let (_, branch) = &definition.nodes[2];
        let (_, extract) = &definition.nodes[1];

        assert_eq!(branch.node_type, NodeType::Conditional);
        assert_eq!(branch.condition_func.as_deref(), Some("pick"));
        assert_eq!(extract.node_type, NodeType::Standard);
        assert!(extract.name.is_none());
    }

    #[test]
    fn test_build_graph() {
        let graph = parse_graph_definition(REVIEW_YAML).unwrap().build("review").unwrap();

        assert_eq!(graph.len(), 4);
        assert_eq!(graph.node("extract").unwrap().name, "extract");
        assert_eq!(graph.node("suggest").unwrap().name, "Suggest");
        assert_eq!(graph.node("loop_check").unwrap().node_type(), NodeType::Loop);
        assert_eq!(graph.infer_start_node(), Some("suggest"));
        assert!(!graph.is_resolved());
    }

    #[test]
    fn test_parse_json() {
        let json = r#"{"nodes": {"a": {"func": "noop"}, "b": {"func": "noop"}}, "edges": {"a": "b"}}"#;
        let graph = parse_graph_definition(json).unwrap().build("g").unwrap();

        assert_eq!(graph.default_successor("a"), Some("b"));
    }

    #[test]
    fn test_parse_without_edges() {
        let definition = parse_graph_definition("nodes:\n  only:\n    func: noop\n").unwrap();
        assert!(definition.edges.is_empty());
        assert!(definition.graph_id.is_none());
    }

    #[test]
    fn test_parse_unknown_type() {
        let err = parse_graph_definition("nodes:\n  a:\n    func: noop\n    type: parallel\n").unwrap_err();
        assert!(matches!(err, EngineError::Definition(_)));
        assert!(err.to_string().contains("Failed to parse graph definition"));
    }

    #[test]
    fn test_build_missing_func() {
        let definition = parse_graph_definition("nodes:\n  a:\n    name: A\n").unwrap();
        assert_eq!(definition.build("g").unwrap_err(), GraphError::MissingStep("a".into()));
    }

    #[test]
    fn test_build_edge_to_unknown_node() {
        let definition = GraphDefinition::default()
            .with_node("a", NodeDefinition::new("noop"))
            .with_edge("a", "ghost");

        assert_eq!(
            definition.build("g").unwrap_err(),
            GraphError::UnknownNode("ghost".into())
        );
    }

    #[test]
    fn test_build_duplicate_node() {
        let definition = GraphDefinition::default()
            .with_node("a", NodeDefinition::new("noop"))
            .with_node("a", NodeDefinition::new("other"));

        assert_eq!(
            definition.build("g").unwrap_err(),
            GraphError::DuplicateNode("a".into())
        );
    }

    #[test]
    fn test_save_and_load_definition() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("graph.yaml");
        let path = path.to_str().unwrap();

        let definition = parse_graph_definition(REVIEW_YAML).unwrap();
        save_graph_definition(&definition, path).unwrap();
        let loaded = load_graph_definition(path).unwrap();

        assert_eq!(loaded, definition);
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_graph_definition("/nonexistent/graph.yaml").unwrap_err();
        assert!(matches!(err, EngineError::Definition(_)));
        assert!(err.to_string().contains("Failed to read graph file"));
    }

    #[test]
    fn test_save_into_missing_directory() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("missing").join("graph.yaml");

        let definition = parse_graph_definition(REVIEW_YAML).unwrap();
        let err = save_graph_definition(&definition, path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, EngineError::Io(_)));
    }
}
