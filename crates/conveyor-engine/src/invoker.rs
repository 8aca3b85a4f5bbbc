//! External process invocation.
//!
//! Functions are backed by shell commands. A command may prefix the
//! payload it wants returned with a sentinel marker; everything after the
//! marker is the function result, everything before is log noise.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use conveyor_core::{ConveyorError, InvokeRequest, ProcessInvoker, Result};

/// Marker a script prints to delimit its structured output.
pub const OUTPUT_SENTINEL: &str = "$%*%$Output:";

/// Split combined process output at the sentinel. Returns the log prefix
/// (if any) and the payload. Without a sentinel the whole output is the
/// payload.
pub fn split_sentinel(output: &str) -> (Option<&str>, &str) {
    match output.find(OUTPUT_SENTINEL) {
        Some(idx) => {
            let prefix = output[..idx].trim();
            let payload = output[idx + OUTPUT_SENTINEL.len()..].trim();
            let prefix = if prefix.is_empty() { None } else { Some(prefix) };
            (prefix, payload)
        }
        None => (None, output.trim()),
    }
}

/// Runs commands through the local shell environment.
pub struct ShellInvoker;

#[async_trait]
impl ProcessInvoker for ShellInvoker {
    async fn invoke(&self, req: InvokeRequest) -> Result<String> {
        debug!("🚀 invoking {} in {}", req.command, req.cwd.display());

        let mut parts = req.command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| ConveyorError::Execution("empty command".to_string()))?;

        let mut cmd = Command::new(program);
        cmd.args(parts)
            .args(&req.args)
            .current_dir(&req.cwd)
            .envs(&req.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| ConveyorError::Execution(format!("failed to spawn {program}: {e}")))?;

        if let Some(input) = &req.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(input.as_bytes()).await?;
                // Drop closes the pipe so the child sees EOF.
            }
        }

        let waited = match req.timeout {
            Some(secs) => {
                let deadline = std::time::Duration::from_secs(secs);
                match tokio::time::timeout(deadline, child.wait_with_output()).await {
                    Ok(out) => out,
                    Err(_) => {
                        return Err(ConveyorError::Execution(format!(
                            "{program} timed out after {secs}s"
                        )))
                    }
                }
            }
            None => child.wait_with_output().await,
        };

        let output = waited
            .map_err(|e| ConveyorError::Execution(format!("failed to wait on {program}: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            warn!("⚠️ {} exited with {}", program, output.status);
            return Err(ConveyorError::Execution(format!(
                "{program} exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let mut combined = stdout.to_string();
        if !stderr.trim().is_empty() {
            combined.push('\n');
            combined.push_str(stderr.trim());
        }
        Ok(combined)
    }
}
