//! HTTP client for the assistants API.

use async_trait::async_trait;
use serde_json::{json, Value};

use conveyor_core::config::ApiConfig;
use conveyor_core::error::{ConveyorError, Result};
use conveyor_core::traits::MessageSender;
use conveyor_core::types::AssistantReply;

/// Client for an OpenAI-compatible threads/runs API.
pub struct AssistantClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AssistantClient {
    pub fn new(config: &ApiConfig) -> Self {
        Self {
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            client: reqwest::Client::new(),
        }
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let req = req.header("OpenAI-Beta", "assistants=v2");
        if self.api_key.is_empty() {
            req
        } else {
            req.header("Authorization", format!("Bearer {}", self.api_key))
        }
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .apply_auth(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| ConveyorError::Assistant(format!("request failed: {e}")))?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| ConveyorError::Assistant(format!("invalid response body: {e}")))?;

        if !status.is_success() {
            let detail = payload["error"]["message"]
                .as_str()
                .unwrap_or("unknown error")
                .to_string();
            return Err(ConveyorError::Assistant(format!("{status}: {detail}")));
        }
        Ok(payload)
    }
}

#[async_trait]
impl MessageSender for AssistantClient {
    /// Deliver a payload to an assistant. Without a thread id, a new
    /// thread is created and run in one call; with one, the payload is
    /// appended to the existing thread and a run is started.
    async fn send(
        &self,
        assistant_id: &str,
        payload: &str,
        thread_id: Option<&str>,
    ) -> Result<AssistantReply> {
        let response = match thread_id {
            None => {
                let body = json!({
                    "assistant_id": assistant_id,
                    "thread": {
                        "messages": [{ "role": "user", "content": payload }]
                    }
                });
                self.post("/threads/runs", body).await?
            }
            Some(tid) => {
                let body = json!({
                    "assistant_id": assistant_id,
                    "additional_messages": [{ "role": "user", "content": payload }]
                });
                self.post(&format!("/threads/{tid}/runs"), body).await?
            }
        };

        let run_thread = response["thread_id"]
            .as_str()
            .or(thread_id)
            .unwrap_or_default()
            .to_string();
        let status = response["status"].as_str().unwrap_or("queued");
        let run_id = response["id"].as_str().unwrap_or_default();
        tracing::debug!("🤖 Run {run_id} on thread {run_thread}: {status}");

        Ok(AssistantReply {
            thread_id: run_thread,
            content: format!("run {run_id} {status}"),
        })
    }
}
