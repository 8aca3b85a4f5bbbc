//! Graph store — owned state, persisted as one versioned document per
//! profile.

use std::path::{Path, PathBuf};

use chrono::Utc;

use conveyor_core::error::Result;

use crate::types::{Connection, GraphDocument, GraphNode, GraphState, NodePosition, Port};

pub const CURRENT_VERSION: &str = "1.0.0";

/// Owns the node/connection graph. All mutation goes through the add/remove
/// operations; callers persist an edit session with [`GraphStore::save`],
/// which rewrites the whole document.
pub struct GraphStore {
    path: PathBuf,
    state: GraphState,
}

impl GraphStore {
    /// Open the graph for a profile, loading the saved document if its
    /// version matches. Unknown versions load as an empty graph.
    pub fn open(dir: &Path, profile: &str) -> Self {
        std::fs::create_dir_all(dir).ok();
        let path = dir.join(format!("graph-{profile}.json"));
        let state = match std::fs::read_to_string(&path) {
            Ok(json) => match serde_json::from_str::<GraphDocument>(&json) {
                Ok(doc) if doc.version == CURRENT_VERSION => GraphState {
                    nodes: doc.nodes,
                    connections: doc.connections,
                },
                Ok(doc) => {
                    tracing::warn!(
                        "⚠️ Graph document version {} unsupported, starting empty",
                        doc.version
                    );
                    GraphState::default()
                }
                Err(e) => {
                    tracing::warn!("⚠️ Failed to parse {}: {e}", path.display());
                    GraphState::default()
                }
            },
            Err(_) => GraphState::default(),
        };
        Self { path, state }
    }

    pub fn save(&self) -> Result<()> {
        let doc = GraphDocument {
            nodes: self.state.nodes.clone(),
            connections: self.state.connections.clone(),
            version: CURRENT_VERSION.into(),
            last_modified: Utc::now().to_rfc3339(),
        };
        let json = serde_json::to_string_pretty(&doc)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    /// Add a node for an assistant. Ports are populated afterwards from
    /// the assistant's schema bindings.
    pub fn add_node(
        &mut self,
        assistant_id: &str,
        name: &str,
        position: NodePosition,
    ) -> GraphNode {
        let node = GraphNode {
            id: uuid::Uuid::new_v4().to_string(),
            assistant_id: assistant_id.to_string(),
            name: name.to_string(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            position,
        };
        self.state.nodes.push(node.clone());
        node
    }

    /// Insert a fully-built node (imports, tests).
    pub fn insert_node(&mut self, node: GraphNode) {
        self.state.nodes.push(node);
    }

    /// Remove a node and every connection touching it.
    pub fn remove_node(&mut self, node_id: &str) {
        self.state.nodes.retain(|n| n.id != node_id);
        self.state
            .connections
            .retain(|c| c.from_node != node_id && c.to_node != node_id);
    }

    pub fn add_connection(
        &mut self,
        from_node: &str,
        from_output: &str,
        to_node: &str,
        to_input: &str,
    ) {
        self.state.connections.push(Connection {
            from_node: from_node.to_string(),
            from_output: from_output.to_string(),
            to_node: to_node.to_string(),
            to_input: to_input.to_string(),
        });
    }

    pub fn remove_connection(&mut self, connection: &Connection) {
        self.state.connections.retain(|c| c != connection);
    }

    pub fn node(&self, node_id: &str) -> Option<&GraphNode> {
        self.state.nodes.iter().find(|n| n.id == node_id)
    }

    /// Every node bound to the given assistant.
    pub fn nodes_for_assistant(&self, assistant_id: &str) -> Vec<GraphNode> {
        self.state
            .nodes
            .iter()
            .filter(|n| n.assistant_id == assistant_id)
            .cloned()
            .collect()
    }

    /// Connections originating at the given node and output port.
    pub fn connections_from(&self, node_id: &str, output: &str) -> Vec<Connection> {
        self.state
            .connections
            .iter()
            .filter(|c| c.from_node == node_id && c.from_output == output)
            .cloned()
            .collect()
    }

    pub fn state(&self) -> &GraphState {
        &self.state
    }

    /// Attach an output port to an existing node.
    pub fn add_output_port(&mut self, node_id: &str, port: Port) {
        if let Some(node) = self.state.nodes.iter_mut().find(|n| n.id == node_id) {
            node.outputs.push(port);
        }
    }

    /// Attach an input port to an existing node.
    pub fn add_input_port(&mut self, node_id: &str, port: Port) {
        if let Some(node) = self.state.nodes.iter_mut().find(|n| n.id == node_id) {
            node.inputs.push(port);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(tag: &str) -> (PathBuf, GraphStore) {
        let dir = std::env::temp_dir().join(format!("conveyor-test-graph-{tag}"));
        std::fs::remove_dir_all(&dir).ok();
        let store = GraphStore::open(&dir, "p1");
        (dir, store)
    }

    #[test]
    fn test_add_and_query() {
        let (dir, mut store) = temp_store("query");
        let a = store.add_node("asst_a", "Writer", NodePosition::default());
        let b = store.add_node("asst_b", "Renderer", NodePosition::default());
        store.add_connection(&a.id, "script", &b.id, "script");

        assert_eq!(store.nodes_for_assistant("asst_a").len(), 1);
        assert_eq!(store.connections_from(&a.id, "script").len(), 1);
        assert!(store.connections_from(&a.id, "other").is_empty());
        assert!(store.connections_from(&b.id, "script").is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_remove_node_drops_connections() {
        let (dir, mut store) = temp_store("remove");
        let a = store.add_node("asst_a", "A", NodePosition::default());
        let b = store.add_node("asst_b", "B", NodePosition::default());
        store.add_connection(&a.id, "out", &b.id, "in");

        store.remove_node(&b.id);
        assert!(store.node(&b.id).is_none());
        assert!(store.connections_from(&a.id, "out").is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_save_and_reload() {
        let dir = std::env::temp_dir().join("conveyor-test-graph-reload");
        std::fs::remove_dir_all(&dir).ok();

        let mut store = GraphStore::open(&dir, "p1");
        let a = store.add_node("asst_a", "A", NodePosition { x: 10.0, y: 20.0 });
        store.save().unwrap();

        let store2 = GraphStore::open(&dir, "p1");
        let reloaded = store2.node(&a.id).unwrap();
        assert_eq!(reloaded.assistant_id, "asst_a");
        assert_eq!(reloaded.position.x, 10.0);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unknown_version_loads_empty() {
        let dir = std::env::temp_dir().join("conveyor-test-graph-version");
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("graph-p1.json"),
            r#"{"nodes": [], "connections": [], "version": "0.9.0", "lastModified": ""}"#,
        )
        .unwrap();

        let store = GraphStore::open(&dir, "p1");
        assert!(store.state().nodes.is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }
}
