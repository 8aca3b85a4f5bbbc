//! Object schema model and the per-profile schema registry.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use conveyor_core::error::{ConveyorError, Result};

/// Base field types supported by the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    Date,
    Array,
    Object,
}

/// Validation rules attached to a field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRules {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, rename = "enum", skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<serde_json::Value>,
    /// Element schema for array fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<ObjectField>>,
    /// Nested fields for object fields.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<ObjectField>,
}

/// A named, typed, optionally-required field within a schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectField {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "is_default_rules")]
    pub validation: FieldRules,
}

fn is_default_rules(rules: &FieldRules) -> bool {
    rules.pattern.is_none()
        && rules.min.is_none()
        && rules.max.is_none()
        && rules.enum_values.is_empty()
        && rules.items.is_none()
        && rules.properties.is_empty()
}

/// Schema definition for an object type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectSchema {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub fields: Vec<ObjectField>,
    pub version: u32,
    pub created_at: String,
    pub updated_at: String,
}

/// Translate an [`ObjectSchema`] into a draft-7 JSON Schema document.
pub fn build_json_schema(schema: &ObjectSchema) -> serde_json::Value {
    let mut properties = serde_json::Map::new();
    let mut required = Vec::new();

    for field in &schema.fields {
        properties.insert(field.name.clone(), field_schema(field));
        if field.required {
            required.push(serde_json::Value::String(field.name.clone()));
        }
    }

    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

fn field_schema(field: &ObjectField) -> serde_json::Value {
    let rules = &field.validation;
    let mut s = match field.kind {
        FieldKind::String => {
            let mut s = serde_json::json!({ "type": "string" });
            if let Some(pattern) = &rules.pattern {
                s["pattern"] = serde_json::Value::String(pattern.clone());
            }
            s
        }
        FieldKind::Number => {
            let mut s = serde_json::json!({ "type": "number" });
            if let Some(min) = rules.min {
                s["minimum"] = serde_json::json!(min);
            }
            if let Some(max) = rules.max {
                s["maximum"] = serde_json::json!(max);
            }
            s
        }
        FieldKind::Boolean => serde_json::json!({ "type": "boolean" }),
        FieldKind::Date => serde_json::json!({ "type": "string", "format": "date-time" }),
        FieldKind::Array => {
            let mut s = serde_json::json!({ "type": "array" });
            if let Some(items) = &rules.items {
                s["items"] = field_schema(items);
            }
            s
        }
        FieldKind::Object => {
            let mut s = serde_json::json!({ "type": "object" });
            if !rules.properties.is_empty() {
                let mut props = serde_json::Map::new();
                let mut req = Vec::new();
                for f in &rules.properties {
                    props.insert(f.name.clone(), field_schema(f));
                    if f.required {
                        req.push(serde_json::Value::String(f.name.clone()));
                    }
                }
                s["properties"] = serde_json::Value::Object(props);
                s["required"] = serde_json::Value::Array(req);
            }
            s
        }
    };

    if !rules.enum_values.is_empty() {
        s["enum"] = serde_json::Value::Array(rules.enum_values.clone());
    }
    s
}

#[derive(Serialize, Deserialize)]
struct StoredSchemas {
    version: String,
    schemas: Vec<ObjectSchema>,
}

/// Per-profile schema registry, persisted as one JSON file.
pub struct SchemaRegistry {
    path: PathBuf,
    schemas: Vec<ObjectSchema>,
}

impl SchemaRegistry {
    /// Open the registry for a profile, loading existing schemas if present.
    pub fn open(dir: &Path, profile: &str) -> Self {
        std::fs::create_dir_all(dir).ok();
        let path = dir.join(format!("schemas-{profile}.json"));
        let schemas = match std::fs::read_to_string(&path) {
            Ok(json) => serde_json::from_str::<StoredSchemas>(&json)
                .map(|s| s.schemas)
                .unwrap_or_else(|e| {
                    tracing::warn!("⚠️ Failed to parse {}: {e}", path.display());
                    Vec::new()
                }),
            Err(_) => Vec::new(),
        };
        Self { path, schemas }
    }

    fn save(&self) -> Result<()> {
        let stored = StoredSchemas {
            version: "1.0".into(),
            schemas: self.schemas.clone(),
        };
        let json = serde_json::to_string_pretty(&stored)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    /// Create a schema; id, version, and timestamps are generated.
    pub fn create(
        &mut self,
        name: &str,
        description: Option<String>,
        fields: Vec<ObjectField>,
    ) -> Result<ObjectSchema> {
        let now = Utc::now().to_rfc3339();
        let schema = ObjectSchema {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            description,
            fields,
            version: 1,
            created_at: now.clone(),
            updated_at: now,
        };
        self.schemas.push(schema.clone());
        self.save()?;
        Ok(schema)
    }

    /// Replace a schema's fields, bumping its version.
    pub fn update_fields(&mut self, id: &str, fields: Vec<ObjectField>) -> Result<ObjectSchema> {
        let schema = self
            .schemas
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| ConveyorError::SchemaNotFound(id.to_string()))?;
        schema.fields = fields;
        schema.version += 1;
        schema.updated_at = Utc::now().to_rfc3339();
        let updated = schema.clone();
        self.save()?;
        Ok(updated)
    }

    pub fn delete(&mut self, id: &str) -> Result<()> {
        self.schemas.retain(|s| s.id != id);
        self.save()
    }

    pub fn get(&self, id: &str) -> Option<&ObjectSchema> {
        self.schemas.iter().find(|s| s.id == id)
    }

    pub fn list(&self) -> &[ObjectSchema] {
        &self.schemas
    }

    /// Insert a prebuilt schema (used by imports and tests).
    pub fn insert(&mut self, schema: ObjectSchema) -> Result<()> {
        self.schemas.retain(|s| s.id != schema.id);
        self.schemas.push(schema);
        self.save()
    }
}
