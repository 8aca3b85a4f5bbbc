//! Shared data model: function implementations and collaborator payloads.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How to execute a node's callable: an external command plus a script,
/// optionally pinned to a working directory and environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionImplementation {
    /// Must match the function name the assistant invokes.
    pub name: String,
    pub command: String,
    /// Script file passed to the command as its sole positional argument.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment_variables: BTreeMap<String, String>,
    /// Marks a data-producing function whose result is validated,
    /// persisted, and routed downstream. Non-output functions return
    /// their result directly even when the node has outgoing connections.
    #[serde(default)]
    pub is_output: bool,
}

/// The persisted per-assistant function set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantFunctions {
    pub assistant_id: String,
    #[serde(default)]
    pub functions: Vec<FunctionImplementation>,
}

impl AssistantFunctions {
    pub fn get(&self, name: &str) -> Option<&FunctionImplementation> {
        self.functions.iter().find(|f| f.name == name)
    }
}

/// A fully resolved external process invocation.
#[derive(Debug, Clone)]
pub struct InvokeRequest {
    pub command: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Serialized arguments piped to the process's standard input.
    pub stdin: Option<String>,
    pub env: BTreeMap<String, String>,
    pub timeout: Option<u64>,
}

/// Acknowledgement from the message-send collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantReply {
    pub thread_id: String,
    /// Reply content, or a run acknowledgement when the assistant is
    /// still working.
    pub content: String,
}
