//! Graph data model.

use serde::{Deserialize, Serialize};

/// A named input or output slot on a node, optionally bound to a schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Port {
    pub name: String,
    /// Display/type tag ("input", "output", a schema name) — editor-facing.
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_id: Option<String>,
}

/// Editor-only canvas position. Carried through persistence, ignored by
/// the engine.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct NodePosition {
    pub x: f64,
    pub y: f64,
}

/// A graph vertex wrapping a remote assistant call or a local function.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: String,
    pub assistant_id: String,
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<Port>,
    #[serde(default)]
    pub outputs: Vec<Port>,
    #[serde(default)]
    pub position: NodePosition,
}

/// A directed edge from one node's output port to another node's input
/// port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub from_node: String,
    pub from_output: String,
    pub to_node: String,
    pub to_input: String,
}

/// The live graph state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphState {
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}

/// Persisted form of the graph: state plus version and modification stamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphDocument {
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub connections: Vec<Connection>,
    pub version: String,
    pub last_modified: String,
}
