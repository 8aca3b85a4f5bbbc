//! Collaborator contracts.
//!
//! The engine consumes three external capabilities through these traits so
//! the real implementations (shell process spawning, the remote assistant
//! HTTP API, the chat UI's system-message stream) can be replaced with
//! in-memory fakes in tests.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{AssistantReply, InvokeRequest};

/// Runs an external command with piped input and captures its combined
/// output. Resolves with the captured text, errs on non-zero exit.
#[async_trait]
pub trait ProcessInvoker: Send + Sync {
    async fn invoke(&self, req: InvokeRequest) -> Result<String>;
}

/// Dispatches a payload to a remote assistant, optionally on an existing
/// thread, and returns the reply or a run acknowledgement.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(
        &self,
        assistant_id: &str,
        payload: &str,
        thread_id: Option<&str>,
    ) -> Result<AssistantReply>;
}

/// User-visible diagnostic stream. Distinct from tracing: these messages
/// surface in the chat UI, not in the operator log.
pub trait DiagnosticSink: Send + Sync {
    fn emit(&self, message: &str);
}

/// Default sink that forwards diagnostics to the tracing log.
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&self, message: &str) {
        tracing::info!("📢 {message}");
    }
}
