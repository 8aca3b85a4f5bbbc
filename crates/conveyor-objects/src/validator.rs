//! Draft-7 validation of data objects against their declared schemas.
//!
//! Compiled validators are cached per (schema id, version) so repeated
//! routing passes do not recompile.

use std::collections::HashMap;

use jsonschema::Validator;
use serde_json::Value;

use crate::schema::{build_json_schema, ObjectSchema};

/// Outcome of validating one data object.
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    fn failed(errors: Vec<String>) -> Self {
        Self {
            valid: false,
            errors,
        }
    }
}

/// Schema validator with a compiled-validator cache.
pub struct SchemaValidator {
    compiled: HashMap<String, (u32, Validator)>,
}

impl SchemaValidator {
    pub fn new() -> Self {
        Self {
            compiled: HashMap::new(),
        }
    }

    /// Validate `data` against `schema`, compiling on first use.
    pub fn validate(&mut self, schema: &ObjectSchema, data: &Value) -> ValidationReport {
        let needs_compile = match self.compiled.get(&schema.id) {
            Some((version, _)) => *version != schema.version,
            None => true,
        };
        if needs_compile {
            let document = build_json_schema(schema);
            match jsonschema::draft7::new(&document) {
                Ok(validator) => {
                    self.compiled
                        .insert(schema.id.clone(), (schema.version, validator));
                }
                Err(e) => {
                    // A schema that cannot compile rejects everything.
                    return ValidationReport::failed(vec![format!(
                        "schema '{}' failed to compile: {e}",
                        schema.name
                    )]);
                }
            }
        }

        let (_, validator) = &self.compiled[&schema.id];
        if validator.validate(data).is_ok() {
            return ValidationReport::ok();
        }

        let errors = validator
            .iter_errors(data)
            .map(|e| {
                if e.instance_path.to_string().is_empty() {
                    e.to_string()
                } else {
                    format!("{}: {e}", e.instance_path)
                }
            })
            .collect();
        ValidationReport::failed(errors)
    }
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::new()
    }
}
