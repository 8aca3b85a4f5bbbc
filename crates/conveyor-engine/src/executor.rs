//! Function dispatch.
//!
//! The engine resolves a named function against the invoking assistant's
//! persisted implementations, runs it through the process invoker, decodes
//! and reshapes the payload, and hands output functions to the router.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use conveyor_core::{
    ConveyorError, DiagnosticSink, FunctionImplementation, InvokeRequest, ProcessInvoker, Result,
};
use conveyor_graph::GraphStore;

use crate::impls::FunctionsStore;
use crate::invoker::split_sentinel;
use crate::normalize::{decode_output, normalize_args, reshape_send_output, resolve_working_dir};
use crate::router::{OutputRouter, RoutingReport};

/// Function name whose results get the `results`/`result` reshaping.
const SEND_OUTPUT: &str = "sendOutput";

pub struct FunctionEngine {
    base_dir: PathBuf,
    profile: String,
    functions: FunctionsStore,
    invoker: Arc<dyn ProcessInvoker>,
    graph: GraphStore,
    router: OutputRouter,
    diag: Arc<dyn DiagnosticSink>,
}

impl FunctionEngine {
    pub fn new(
        base_dir: PathBuf,
        profile: String,
        functions: FunctionsStore,
        invoker: Arc<dyn ProcessInvoker>,
        graph: GraphStore,
        router: OutputRouter,
        diag: Arc<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            base_dir,
            profile,
            functions,
            invoker,
            graph,
            router,
            diag,
        }
    }

    pub fn graph(&self) -> &GraphStore {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut GraphStore {
        &mut self.graph
    }

    pub fn router(&self) -> &OutputRouter {
        &self.router
    }

    /// Execute a function call made by an assistant and return the value
    /// to hand back to it. Output functions additionally route their
    /// result through the graph; the routing outcome is folded into the
    /// reply so the assistant can see what happened downstream.
    pub async fn execute(
        &mut self,
        name: &str,
        args: &Value,
        assistant_id: &str,
    ) -> Result<Value> {
        info!("🤖 {assistant_id} called {name}");

        let functions = self.functions.load(&self.profile, assistant_id)?;
        let Some(imp) = functions.get(name).cloned() else {
            let msg = format!("function '{name}' has no implementation for {assistant_id}");
            self.diag.emit(&msg);
            return Err(ConveyorError::FunctionNotImplemented(name.to_string()));
        };

        let result = self.run(&imp, args).await?;
        let result = if name == SEND_OUTPUT {
            reshape_send_output(result, self.diag.as_ref())
        } else {
            result
        };

        if !imp.is_output {
            debug!("{name} is not an output function, returning directly");
            return Ok(result);
        }

        let nodes = self.graph.nodes_for_assistant(assistant_id);
        if nodes.is_empty() {
            debug!("no graph node references {assistant_id}, nothing to route");
            return Ok(result);
        }

        let mut totals = RoutingReport::default();
        for node in nodes {
            let report = self.router.route(&self.graph, &node, &result).await;
            totals.persisted.extend(report.persisted);
            totals.validation_errors.extend(report.validation_errors);
            totals.delivery_errors.extend(report.delivery_errors);
            totals.skipped_ports.extend(report.skipped_ports);
        }

        Ok(serde_json::json!({
            "result": result,
            "persisted": totals.persisted,
            "validationErrors": totals.validation_errors,
            "deliveryErrors": totals.delivery_errors,
        }))
    }

    /// Run the implementation through the process invoker and decode its
    /// payload. An implementation must carry both a command and a script;
    /// anything less is a configuration error, not a silent bare-command
    /// run.
    async fn run(&self, imp: &FunctionImplementation, args: &Value) -> Result<Value> {
        let Some(script) = imp.script.clone().filter(|s| !s.is_empty()) else {
            return Err(ConveyorError::Config(format!(
                "invalid implementation for '{}': no script declared",
                imp.name
            )));
        };
        if imp.command.is_empty() {
            return Err(ConveyorError::Config(format!(
                "invalid implementation for '{}': no command declared",
                imp.name
            )));
        }

        let normalized = normalize_args(args, &self.base_dir);
        let cwd = resolve_working_dir(imp.working_dir.as_deref(), &self.base_dir);

        let req = InvokeRequest {
            command: imp.command.clone(),
            args: vec![script],
            cwd,
            stdin: Some(serde_json::to_string(&normalized)?),
            env: imp.environment_variables.clone(),
            timeout: imp.timeout,
        };
        let raw = self.invoker.invoke(req).await?;
        let (log, payload) = split_sentinel(&raw);
        if let Some(log) = log {
            debug!("process log: {log}");
        }
        Ok(decode_output(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use conveyor_core::{AssistantFunctions, AssistantReply, MessageSender};
    use conveyor_graph::{NodePosition, Port};
    use conveyor_objects::{
        FieldKind, InstanceStore, ObjectField, SchemaRegistry,
    };
    use serde_json::json;
    use std::sync::Mutex;

    struct NullSink;
    impl DiagnosticSink for NullSink {
        fn emit(&self, _message: &str) {}
    }

    struct NullSender;
    #[async_trait]
    impl MessageSender for NullSender {
        async fn send(
            &self,
            _assistant_id: &str,
            _payload: &str,
            _thread_id: Option<&str>,
        ) -> Result<AssistantReply> {
            Ok(AssistantReply {
                thread_id: "t".to_string(),
                content: "ok".to_string(),
            })
        }
    }

    /// Invoker that records the request and replies with canned output.
    struct CannedInvoker {
        output: String,
        seen: Mutex<Vec<InvokeRequest>>,
    }

    #[async_trait]
    impl ProcessInvoker for CannedInvoker {
        async fn invoke(&self, req: InvokeRequest) -> Result<String> {
            self.seen.lock().unwrap().push(req);
            Ok(self.output.clone())
        }
    }

    fn temp_dir(tag: &str) -> PathBuf {
        let dir =
            std::env::temp_dir().join(format!("conveyor-exec-{tag}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_functions(dir: &PathBuf, assistant_id: &str, is_output: bool, name: &str) {
        let store = FunctionsStore::new(dir);
        store
            .save(
                "test",
                &AssistantFunctions {
                    assistant_id: assistant_id.to_string(),
                    functions: vec![FunctionImplementation {
                        name: name.to_string(),
                        command: "python3".to_string(),
                        script: Some("run.py".to_string()),
                        working_dir: None,
                        timeout: None,
                        environment_variables: Default::default(),
                        is_output,
                    }],
                },
            )
            .unwrap();
    }

    fn engine(dir: &PathBuf, invoker: Arc<dyn ProcessInvoker>) -> FunctionEngine {
        let schemas = SchemaRegistry::open(dir, "test");
        let instances = InstanceStore::open(dir, "test");
        let router = OutputRouter::new(schemas, instances, Arc::new(NullSender), Arc::new(NullSink));
        FunctionEngine::new(
            dir.clone(),
            "test".to_string(),
            FunctionsStore::new(dir),
            invoker,
            GraphStore::open(dir, "test"),
            router,
            Arc::new(NullSink),
        )
    }

    #[tokio::test]
    async fn test_missing_implementation_is_error() {
        let dir = temp_dir("missing");
        write_functions(&dir, "asst_1", false, "other");
        let invoker = Arc::new(CannedInvoker {
            output: "{}".to_string(),
            seen: Mutex::new(Vec::new()),
        });
        let mut engine = engine(&dir, invoker);

        let err = engine.execute("ghost", &json!({}), "asst_1").await.unwrap_err();
        assert!(matches!(err, ConveyorError::FunctionNotImplemented(_)));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_implementation_without_script_is_config_error() {
        let dir = temp_dir("noscript");
        let store = FunctionsStore::new(&dir);
        store
            .save(
                "test",
                &AssistantFunctions {
                    assistant_id: "asst_1".to_string(),
                    functions: vec![FunctionImplementation {
                        name: "broken".to_string(),
                        command: "python3".to_string(),
                        script: None,
                        working_dir: None,
                        timeout: None,
                        environment_variables: Default::default(),
                        is_output: false,
                    }],
                },
            )
            .unwrap();
        let invoker = Arc::new(CannedInvoker {
            output: "{}".to_string(),
            seen: Mutex::new(Vec::new()),
        });
        let mut engine = engine(&dir, invoker.clone());

        let err = engine.execute("broken", &json!({}), "asst_1").await.unwrap_err();
        assert!(err.is_config());
        // The bare command must never reach the invoker.
        assert!(invoker.seen.lock().unwrap().is_empty());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_non_output_function_returns_decoded_payload() {
        let dir = temp_dir("plain");
        write_functions(&dir, "asst_1", false, "render");
        let invoker = Arc::new(CannedInvoker {
            output: "progress 50%\n$%*%$Output: {\"frames\": 120}".to_string(),
            seen: Mutex::new(Vec::new()),
        });
        let mut engine = engine(&dir, invoker.clone());

        let out = engine
            .execute("render", &json!({ "clip": "intro" }), "asst_1")
            .await
            .unwrap();
        assert_eq!(out, json!({ "frames": 120 }));

        // The script rides along as the sole positional argument and the
        // args go in over stdin.
        let seen = invoker.seen.lock().unwrap();
        assert_eq!(seen[0].args, vec!["run.py".to_string()]);
        assert_eq!(seen[0].stdin.as_deref(), Some("{\"clip\":\"intro\"}"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_output_function_routes_and_persists() {
        let dir = temp_dir("routed");
        write_functions(&dir, "asst_1", true, "sendOutput");
        let invoker = Arc::new(CannedInvoker {
            output: "{\"results\": \"{\\\"title\\\": \\\"hello\\\"}\"}".to_string(),
            seen: Mutex::new(Vec::new()),
        });
        let mut engine = engine(&dir, invoker);

        let schema = engine
            .router
            .schemas_mut()
            .create(
                "Video",
                None,
                vec![ObjectField {
                    name: "title".to_string(),
                    kind: FieldKind::String,
                    description: None,
                    required: true,
                    validation: Default::default(),
                }],
            )
            .unwrap();
        let node = engine
            .graph_mut()
            .add_node("asst_1", "writer", NodePosition::default());
        engine.graph_mut().add_output_port(
            &node.id,
            Port {
                name: "result".to_string(),
                kind: "output".to_string(),
                schema_id: Some(schema.id),
            },
        );

        let out = engine.execute("sendOutput", &json!({}), "asst_1").await.unwrap();
        assert_eq!(out["persisted"].as_array().unwrap().len(), 1);
        assert_eq!(out["result"], json!({ "result": { "title": "hello" } }));
        assert_eq!(engine.router().instances().len(), 1);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_output_function_without_nodes_returns_directly() {
        let dir = temp_dir("nonode");
        write_functions(&dir, "asst_1", true, "sendOutput");
        let invoker = Arc::new(CannedInvoker {
            output: "{\"result\": 1}".to_string(),
            seen: Mutex::new(Vec::new()),
        });
        let mut engine = engine(&dir, invoker);

        let out = engine.execute("sendOutput", &json!({}), "asst_1").await.unwrap();
        assert_eq!(out, json!({ "result": 1 }));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
