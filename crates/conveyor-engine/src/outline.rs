//! Bulk outline fan-out.
//!
//! A planning assistant can emit a whole collection of outline objects in
//! one result. Each outline is persisted and dispatched to the production
//! assistant as its own message, rate-limited through the batch processor
//! so the remote API is not flooded.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::info;

use conveyor_core::{ConveyorError, DiagnosticSink, MessageSender, Result};
use conveyor_objects::InstanceStore;

use crate::batch::{process_batches, BatchReport};

const BATCH_SIZE: usize = 3;
const BATCH_DELAY: Duration = Duration::from_secs(5);

/// Extract individual outline objects from a result payload. Accepts a
/// bare array, an object wrapping an array under any key, or a single
/// object (treated as one outline).
pub fn parse_outlines(raw: &Value) -> Vec<Value> {
    match raw {
        Value::Array(items) => items.clone(),
        Value::Object(map) => {
            for value in map.values() {
                if let Value::Array(items) = value {
                    return items.clone();
                }
            }
            vec![raw.clone()]
        }
        _ => Vec::new(),
    }
}

/// Persist each outline and dispatch it to the assistant, in batches.
pub async fn send_outlines(
    raw: &Value,
    assistant_id: &str,
    schema_id: &str,
    sender: Arc<dyn MessageSender>,
    instances: &Mutex<InstanceStore>,
    diag: &dyn DiagnosticSink,
) -> BatchReport {
    let outlines = parse_outlines(raw);
    info!(
        "📦 fanning out {} outlines to {assistant_id}",
        outlines.len()
    );
    diag.emit(&format!(
        "sending {} outlines in batches of {BATCH_SIZE}",
        outlines.len()
    ));

    let results = process_batches(
        outlines,
        |outline| {
            let sender = sender.clone();
            async move {
                let instance = {
                    let mut store = instances.lock().await;
                    store.persist(schema_id, outline)?
                };
                let payload = serde_json::to_string(&instance)?;
                sender.send(assistant_id, &payload, None).await?;
                Ok::<(), ConveyorError>(())
            }
        },
        BATCH_SIZE,
        BATCH_DELAY,
        diag,
    )
    .await;
    BatchReport::tally(&results)
}

/// Convenience wrapper that surfaces a wholly-failed fan-out as an error.
pub async fn send_outlines_strict(
    raw: &Value,
    assistant_id: &str,
    schema_id: &str,
    sender: Arc<dyn MessageSender>,
    instances: &Mutex<InstanceStore>,
    diag: &dyn DiagnosticSink,
) -> Result<BatchReport> {
    let report = send_outlines(raw, assistant_id, schema_id, sender, instances, diag).await;
    if report.succeeded == 0 && report.failed > 0 {
        return Err(ConveyorError::Routing(format!(
            "all {} outline deliveries failed",
            report.failed
        )));
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use conveyor_core::AssistantReply;
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::Mutex as StdMutex;

    struct NullSink;
    impl DiagnosticSink for NullSink {
        fn emit(&self, _message: &str) {}
    }

    #[derive(Default)]
    struct RecordingSender {
        sent: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl MessageSender for RecordingSender {
        async fn send(
            &self,
            _assistant_id: &str,
            payload: &str,
            _thread_id: Option<&str>,
        ) -> Result<AssistantReply> {
            self.sent.lock().unwrap().push(payload.to_string());
            Ok(AssistantReply {
                thread_id: "t".to_string(),
                content: "ok".to_string(),
            })
        }
    }

    fn temp_dir(tag: &str) -> PathBuf {
        let dir =
            std::env::temp_dir().join(format!("conveyor-outline-{tag}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_parse_wrapped_array() {
        let raw = json!({ "videos": [{ "a": 1 }, { "a": 2 }] });
        assert_eq!(parse_outlines(&raw).len(), 2);
    }

    #[test]
    fn test_parse_bare_array() {
        assert_eq!(parse_outlines(&json!([1, 2, 3])).len(), 3);
    }

    #[test]
    fn test_parse_single_object() {
        let outlines = parse_outlines(&json!({ "title": "one" }));
        assert_eq!(outlines, vec![json!({ "title": "one" })]);
    }

    #[test]
    fn test_parse_scalar_is_empty() {
        assert!(parse_outlines(&json!("nope")).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_outline_persisted_and_sent() {
        let dir = temp_dir("fanout");
        let sender = Arc::new(RecordingSender::default());
        let instances = Mutex::new(InstanceStore::open(&dir, "test"));

        let raw = json!({ "videos": [
            { "title": "a" }, { "title": "b" }, { "title": "c" },
            { "title": "d" }, { "title": "e" },
        ]});
        let report = send_outlines(
            &raw,
            "asst_prod",
            "sch_video",
            sender.clone(),
            &instances,
            &NullSink,
        )
        .await;

        assert_eq!(report.succeeded, 5);
        assert_eq!(report.failed, 0);
        assert_eq!(sender.sent.lock().unwrap().len(), 5);
        assert_eq!(instances.lock().await.len(), 5);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
