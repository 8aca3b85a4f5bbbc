//! # Conveyor Objects
//!
//! The object system: named, typed schemas; draft-7 JSON-Schema validation
//! of data against them; and durable, timestamped object instances.
//! This is the Schema Validator collaborator of the pipeline, implemented.

pub mod instances;
pub mod schema;
pub mod validator;

pub use instances::{InstanceStore, ObjectInstance};
pub use schema::{FieldKind, FieldRules, ObjectField, ObjectSchema, SchemaRegistry};
pub use validator::{SchemaValidator, ValidationReport};
