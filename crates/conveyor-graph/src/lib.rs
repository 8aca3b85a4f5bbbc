//! # Conveyor Graph
//!
//! The graph state store: assistant/function nodes, their ports, and the
//! directed connections between them. The store owns the in-memory state,
//! persists it as a single versioned JSON document per profile, and
//! answers the router's "which connections originate at node X / output Y"
//! queries.

pub mod store;
pub mod types;

pub use store::{GraphStore, CURRENT_VERSION};
pub use types::{Connection, GraphDocument, GraphNode, GraphState, NodePosition, Port};
