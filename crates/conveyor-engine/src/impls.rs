//! Per-assistant function implementation files.
//!
//! Implementations live in `functions-{profile}-{assistant}.json` beside
//! the rest of the profile data. The file is read fresh on each load so
//! edits made while the engine runs are picked up.

use std::path::{Path, PathBuf};

use tracing::debug;

use conveyor_core::{AssistantFunctions, ConveyorError, Result};

pub struct FunctionsStore {
    dir: PathBuf,
}

impl FunctionsStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn file_path(&self, profile: &str, assistant_id: &str) -> PathBuf {
        self.dir
            .join(format!("functions-{profile}-{assistant_id}.json"))
    }

    pub fn load(&self, profile: &str, assistant_id: &str) -> Result<AssistantFunctions> {
        let path = self.file_path(profile, assistant_id);
        if !path.exists() {
            return Err(ConveyorError::Config(format!(
                "no function implementations for assistant {assistant_id} (profile {profile})"
            )));
        }
        let raw = std::fs::read_to_string(&path)?;
        let functions: AssistantFunctions = serde_json::from_str(&raw)?;
        debug!(
            "loaded {} implementations for {}",
            functions.functions.len(),
            assistant_id
        );
        Ok(functions)
    }

    pub fn save(&self, profile: &str, functions: &AssistantFunctions) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.file_path(profile, &functions.assistant_id);
        let raw = serde_json::to_string_pretty(functions)?;
        std::fs::write(&path, raw)?;
        Ok(())
    }
}
