//! Per-conversation system-message overlays.
//!
//! Diagnostics and routed system messages are stored beside the remote
//! conversation, each anchored to the message it should appear after.
//! `merge` splices them into a thread's message list for display without
//! ever mutating the remote thread. Appends from different async contexts
//! race on the whole-file rewrite, so every read-modify-write holds the
//! overlay lock.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use conveyor_core::Result;

/// One overlaid system message, anchored to a conversation message id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayMessage {
    pub content: String,
    /// Id of the thread message this one is displayed after.
    pub insert_after: String,
}

/// A message as it appears in the merged conversation view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadMessage {
    pub id: String,
    pub role: String,
    pub content: String,
    pub created_at: String,
}

pub struct MessageOverlay {
    path: PathBuf,
    threads: Mutex<HashMap<String, Vec<OverlayMessage>>>,
}

impl MessageOverlay {
    pub fn open(dir: &Path, profile: &str) -> Self {
        std::fs::create_dir_all(dir).ok();
        let path = dir.join(format!("overlays-{profile}.json"));
        let threads = match std::fs::read_to_string(&path) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                tracing::warn!("⚠️ Failed to parse {}: {e}", path.display());
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        };
        Self {
            path,
            threads: Mutex::new(threads),
        }
    }

    /// Record a system message anchored after an existing thread message.
    pub async fn append(&self, thread_id: &str, content: &str, insert_after: &str) -> Result<()> {
        let mut threads = self.threads.lock().await;
        threads
            .entry(thread_id.to_string())
            .or_default()
            .push(OverlayMessage {
                content: content.to_string(),
                insert_after: insert_after.to_string(),
            });
        self.save(&threads)
    }

    /// Splice a thread's overlay into its conversation messages. Each
    /// overlay message is inserted directly after its anchor; overlays
    /// whose anchor is no longer in the list are left out.
    pub async fn merge(&self, thread_id: &str, messages: &[ThreadMessage]) -> Vec<ThreadMessage> {
        let threads = self.threads.lock().await;
        let Some(overlay) = threads.get(thread_id) else {
            return messages.to_vec();
        };

        let mut merged = messages.to_vec();
        for sys in overlay {
            if let Some(idx) = merged.iter().position(|m| m.id == sys.insert_after) {
                merged.insert(
                    idx + 1,
                    ThreadMessage {
                        id: format!("sys_{}", uuid::Uuid::new_v4()),
                        role: "system".to_string(),
                        content: sys.content.clone(),
                        created_at: chrono::Utc::now().to_rfc3339(),
                    },
                );
            }
        }
        merged
    }

    pub async fn messages(&self, thread_id: &str) -> Vec<OverlayMessage> {
        let threads = self.threads.lock().await;
        threads.get(thread_id).cloned().unwrap_or_default()
    }

    /// Drop a thread's overlay entirely (the thread was deleted).
    pub async fn clear(&self, thread_id: &str) -> Result<()> {
        let mut threads = self.threads.lock().await;
        threads.remove(thread_id);
        self.save(&threads)
    }

    fn save(&self, threads: &HashMap<String, Vec<OverlayMessage>>) -> Result<()> {
        let json = serde_json::to_string_pretty(threads)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir =
            std::env::temp_dir().join(format!("conveyor-overlay-{tag}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn thread_message(id: &str, content: &str) -> ThreadMessage {
        ThreadMessage {
            id: id.to_string(),
            role: "user".to_string(),
            content: content.to_string(),
            created_at: "2026-01-05T09:00:00+00:00".to_string(),
        }
    }

    #[tokio::test]
    async fn test_append_and_reload() {
        let dir = temp_dir("reload");
        let overlay = MessageOverlay::open(&dir, "test");
        overlay.append("t1", "routed 2 objects", "m1").await.unwrap();
        overlay.append("t1", "1 validation error", "m2").await.unwrap();
        overlay.append("t2", "other thread", "m1").await.unwrap();

        let reloaded = MessageOverlay::open(&dir, "test");
        assert_eq!(reloaded.messages("t1").await.len(), 2);
        assert_eq!(reloaded.messages("t1").await[0].insert_after, "m1");
        assert_eq!(reloaded.messages("t2").await.len(), 1);
        assert!(reloaded.messages("t3").await.is_empty());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_merge_splices_after_anchor() {
        let dir = temp_dir("merge");
        let overlay = MessageOverlay::open(&dir, "test");
        overlay.append("t1", "routed 2 objects", "m1").await.unwrap();

        let base = vec![thread_message("m1", "hello"), thread_message("m2", "world")];
        let merged = overlay.merge("t1", &base).await;

        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].id, "m1");
        assert_eq!(merged[1].role, "system");
        assert_eq!(merged[1].content, "routed 2 objects");
        assert_eq!(merged[2].id, "m2");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_merge_skips_missing_anchor() {
        let dir = temp_dir("anchor");
        let overlay = MessageOverlay::open(&dir, "test");
        overlay.append("t1", "orphaned", "gone").await.unwrap();

        let base = vec![thread_message("m1", "hello")];
        let merged = overlay.merge("t1", &base).await;
        assert_eq!(merged, base);

        // A thread with no overlay merges to the input unchanged.
        assert_eq!(overlay.merge("t2", &base).await, base);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_appends_lose_nothing() {
        let dir = temp_dir("race");
        let overlay = Arc::new(MessageOverlay::open(&dir, "test"));

        let tasks: Vec<_> = (0..20)
            .map(|i| {
                let overlay = overlay.clone();
                tokio::spawn(async move {
                    overlay
                        .append("t1", &format!("message {i}"), "m1")
                        .await
                        .unwrap();
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(overlay.messages("t1").await.len(), 20);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_clear_drops_thread() {
        let dir = temp_dir("clear");
        let overlay = MessageOverlay::open(&dir, "test");
        overlay.append("t1", "m", "m1").await.unwrap();
        overlay.clear("t1").await.unwrap();
        assert!(overlay.messages("t1").await.is_empty());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
