//! Durable object instances, one JSON file per profile.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use conveyor_core::error::{ConveyorError, Result};

/// An instance of an object conforming to a schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectInstance {
    pub id: String,
    pub schema_id: String,
    pub data: Value,
    pub created_at: String,
    pub updated_at: String,
}

/// Instance store — full-file JSON rewrite on every mutation.
pub struct InstanceStore {
    path: PathBuf,
    instances: Vec<ObjectInstance>,
}

impl InstanceStore {
    pub fn open(dir: &Path, profile: &str) -> Self {
        std::fs::create_dir_all(dir).ok();
        let path = dir.join(format!("instances-{profile}.json"));
        let instances = match std::fs::read_to_string(&path) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                tracing::warn!("⚠️ Failed to parse {}: {e}", path.display());
                Vec::new()
            }),
            Err(_) => Vec::new(),
        };
        Self { path, instances }
    }

    fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.instances)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    /// Persist validated data as a new instance with generated id and
    /// timestamps.
    pub fn persist(&mut self, schema_id: &str, data: Value) -> Result<ObjectInstance> {
        let now = Utc::now().to_rfc3339();
        let instance = ObjectInstance {
            id: uuid::Uuid::new_v4().to_string(),
            schema_id: schema_id.to_string(),
            data,
            created_at: now.clone(),
            updated_at: now,
        };
        self.instances.push(instance.clone());
        self.save()?;
        Ok(instance)
    }

    pub fn get(&self, id: &str) -> Option<&ObjectInstance> {
        self.instances.iter().find(|i| i.id == id)
    }

    /// All instances, optionally filtered by schema.
    pub fn list(&self, schema_id: Option<&str>) -> Vec<&ObjectInstance> {
        self.instances
            .iter()
            .filter(|i| schema_id.map_or(true, |s| i.schema_id == s))
            .collect()
    }

    /// Attach a locally-resolved media file path to a field after the
    /// remote media it referenced has been downloaded. The only mutation
    /// the pipeline performs on an existing instance.
    pub fn attach_media_path(&mut self, id: &str, field: &str, local_path: &str) -> Result<()> {
        let instance = self
            .instances
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| ConveyorError::Routing(format!("instance not found: {id}")))?;
        if let Some(obj) = instance.data.as_object_mut() {
            obj.insert(field.to_string(), Value::String(local_path.to_string()));
        }
        instance.updated_at = Utc::now().to_rfc3339();
        self.save()
    }

    pub fn delete(&mut self, id: &str) -> Result<()> {
        self.instances.retain(|i| i.id != id);
        self.save()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}
