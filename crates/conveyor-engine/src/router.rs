//! Output routing: match, validate, persist, forward.
//!
//! When an output function finishes, its result is split across the
//! node's declared output ports, validated against each port's schema,
//! persisted as object instances, and forwarded along the graph's
//! connections to downstream assistants. Failures are recorded at the
//! finest granularity that makes sense (array element, port, connection)
//! and never abort sibling work.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use conveyor_core::{DiagnosticSink, MessageSender};
use conveyor_graph::{GraphNode, GraphStore, Port};
use conveyor_objects::{InstanceStore, ObjectInstance, SchemaRegistry, SchemaValidator};

use crate::casing::match_field;

/// Everything that happened during one routing pass.
#[derive(Debug, Default)]
pub struct RoutingReport {
    /// Ids of instances persisted after successful validation.
    pub persisted: Vec<String>,
    /// Schema validation failures, one entry per invalid value.
    pub validation_errors: Vec<String>,
    /// Downstream delivery failures, one entry per connection.
    pub delivery_errors: Vec<String>,
    /// Ports the result carried no field for.
    pub skipped_ports: Vec<String>,
}

impl RoutingReport {
    fn merge(&mut self, other: RoutingReport) {
        self.persisted.extend(other.persisted);
        self.validation_errors.extend(other.validation_errors);
        self.delivery_errors.extend(other.delivery_errors);
        self.skipped_ports.extend(other.skipped_ports);
    }
}

pub struct OutputRouter {
    schemas: SchemaRegistry,
    validator: SchemaValidator,
    instances: InstanceStore,
    sender: Arc<dyn MessageSender>,
    diag: Arc<dyn DiagnosticSink>,
}

impl OutputRouter {
    pub fn new(
        schemas: SchemaRegistry,
        instances: InstanceStore,
        sender: Arc<dyn MessageSender>,
        diag: Arc<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            schemas,
            validator: SchemaValidator::new(),
            instances,
            sender,
            diag,
        }
    }

    pub fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    pub fn schemas_mut(&mut self) -> &mut SchemaRegistry {
        &mut self.schemas
    }

    pub fn instances(&self) -> &InstanceStore {
        &self.instances
    }

    /// Route one function result through a node's output ports.
    pub async fn route(
        &mut self,
        graph: &GraphStore,
        node: &GraphNode,
        result: &Value,
    ) -> RoutingReport {
        let mut report = RoutingReport::default();
        let ports = node.outputs.clone();

        match ports.len() {
            0 => {
                self.diag
                    .emit(&format!("node {} declares no output ports", node.name));
            }
            1 => {
                let port = &ports[0];
                let value = match result.as_object().and_then(|m| match_field(m, &port.name)) {
                    Some(v) => v.clone(),
                    // No matching field: the whole result goes through the
                    // single port.
                    None => result.clone(),
                };
                let r = self.route_port(graph, node, port, value).await;
                report.merge(r);
            }
            _ => {
                let Some(map) = result.as_object() else {
                    report.validation_errors.push(format!(
                        "node {} has {} output ports but the result is not an object",
                        node.name,
                        ports.len()
                    ));
                    return report;
                };
                for port in &ports {
                    match match_field(map, &port.name) {
                        Some(v) => {
                            let r = self.route_port(graph, node, port, v.clone()).await;
                            report.merge(r);
                        }
                        None => {
                            self.diag.emit(&format!(
                                "no field in result for output port '{}', skipping",
                                port.name
                            ));
                            report.skipped_ports.push(port.name.clone());
                        }
                    }
                }
            }
        }

        info!(
            "🔀 routed result of {}: {} persisted, {} validation errors, {} delivery errors",
            node.name,
            report.persisted.len(),
            report.validation_errors.len(),
            report.delivery_errors.len()
        );
        report
    }

    async fn route_port(
        &mut self,
        graph: &GraphStore,
        node: &GraphNode,
        port: &Port,
        value: Value,
    ) -> RoutingReport {
        let mut report = RoutingReport::default();

        let Some(schema_id) = port.schema_id.clone() else {
            report.validation_errors.push(format!(
                "output port '{}' has no schema bound",
                port.name
            ));
            return report;
        };
        if self.schemas.get(&schema_id).is_none() {
            // A schema may have been deleted after the graph was edited.
            report
                .validation_errors
                .push(format!("schema {schema_id} not found for port '{}'", port.name));
            self.diag
                .emit(&format!("schema {schema_id} not found, cannot route '{}'", port.name));
            return report;
        }

        match value {
            Value::Array(items) => {
                for item in items {
                    let r = self.route_value(graph, node, port, &schema_id, item).await;
                    report.merge(r);
                }
            }
            other => {
                let r = self.route_value(graph, node, port, &schema_id, other).await;
                report.merge(r);
            }
        }
        report
    }

    async fn route_value(
        &mut self,
        graph: &GraphStore,
        node: &GraphNode,
        port: &Port,
        schema_id: &str,
        value: Value,
    ) -> RoutingReport {
        let mut report = RoutingReport::default();

        // Scalars are persisted under the port's canonical field name so
        // the stored instance matches the schema, not the caller's casing.
        let data = match value {
            Value::Object(_) => value,
            other => {
                let mut wrapped = serde_json::Map::new();
                wrapped.insert(port.name.clone(), other);
                Value::Object(wrapped)
            }
        };

        let schema = match self.schemas.get(schema_id) {
            Some(s) => s.clone(),
            None => return report,
        };
        let verdict = self.validator.validate(&schema, &data);
        if !verdict.valid {
            for err in &verdict.errors {
                report
                    .validation_errors
                    .push(format!("{}: {err}", schema.name));
            }
            self.diag.emit(&format!(
                "validation failed for '{}': {}",
                port.name,
                verdict.errors.join("; ")
            ));
            return report;
        }

        let instance = match self.instances.persist(schema_id, data) {
            Ok(i) => i,
            Err(e) => {
                warn!("⚠️ failed to persist instance: {e}");
                report
                    .validation_errors
                    .push(format!("persist failed for '{}': {e}", port.name));
                return report;
            }
        };
        report.persisted.push(instance.id.clone());

        self.forward(graph, node, port, &instance, &mut report).await;
        report
    }

    /// Deliver a persisted instance along every connection leaving the
    /// port. Connections whose target node no longer exists are inert.
    async fn forward(
        &self,
        graph: &GraphStore,
        node: &GraphNode,
        port: &Port,
        instance: &ObjectInstance,
        report: &mut RoutingReport,
    ) {
        for conn in graph.connections_from(&node.id, &port.name) {
            let Some(target) = graph.node(&conn.to_node) else {
                continue;
            };
            let payload = match serde_json::to_string(instance) {
                Ok(p) => p,
                Err(e) => {
                    report
                        .delivery_errors
                        .push(format!("{} -> {}: {e}", port.name, conn.to_node));
                    continue;
                }
            };
            match self
                .sender
                .send(&target.assistant_id, &payload, None)
                .await
            {
                Ok(_) => {
                    info!("📤 forwarded {} to {}", instance.id, target.name);
                }
                Err(e) => {
                    warn!("⚠️ delivery to {} failed: {e}", target.name);
                    report
                        .delivery_errors
                        .push(format!("{} -> {}: {e}", port.name, target.name));
                }
            }
        }
    }
}
