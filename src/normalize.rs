//! Reconciling parsed model output with the expected schema.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::schema::{json_kind, Schema};

/// Field name used in warnings that concern the whole parsed value.
pub const ROOT_FIELD: &str = "<root>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// The field was present but could not be converted; its default was used.
    CoercionFailed,
    /// The parsed value was not a JSON object; every field took its default.
    NotAnObject,
}

/// A non-fatal problem recorded while normalizing one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldWarning {
    pub field: String,
    pub kind: WarningKind,
    pub detail: String,
}

impl fmt::Display for FieldWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            WarningKind::CoercionFailed => write!(f, "{}: coercion failed", self.field),
            WarningKind::NotAnObject => write!(f, "{}: expected object", self.field),
        }
    }
}

/// Normalized output for one document.
///
/// `values` holds exactly the schema's keys, in schema order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub extraction_id: Uuid,
    pub document_type: String,
    /// [`Schema::fingerprint`] of the schema the values were normalized against.
    pub schema_fingerprint: String,
    pub values: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<FieldWarning>,
}

impl ExtractionResult {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Warnings rendered as `"<field>: <problem>"` lines.
    pub fn warning_messages(&self) -> Vec<String> {
        self.warnings.iter().map(ToString::to_string).collect()
    }

    /// The values as a JSON object.
    pub fn to_value(&self) -> Value {
        Value::Object(self.values.clone())
    }
}

/// Applies a schema to a parsed value: rename aliased keys, coerce present
/// fields, default absent ones, drop unknown ones. Never fails.
pub struct Normalizer<'s> {
    schema: &'s Schema,
    extraction_id: Option<Uuid>,
}

impl<'s> Normalizer<'s> {
    pub fn new(schema: &'s Schema) -> Self {
        Self {
            schema,
            extraction_id: None,
        }
    }

    /// Stamp results with this id instead of a fresh one.
    pub fn with_extraction_id(mut self, id: Uuid) -> Self {
        self.extraction_id = Some(id);
        self
    }

    pub fn normalize(&self, parsed: Value) -> ExtractionResult {
        let mut warnings = Vec::new();

        let mut object = match parsed {
            Value::Object(object) => object,
            other => {
                warn!(found = json_kind(&other), "Parsed value is not an object; using defaults");
                warnings.push(FieldWarning {
                    field: ROOT_FIELD.to_string(),
                    kind: WarningKind::NotAnObject,
                    detail: format!("expected object, found {}", json_kind(&other)),
                });
                Map::new()
            }
        };

        let mut values = Map::with_capacity(self.schema.len());
        for field in self.schema.fields() {
            let raw = object
                .remove(&field.name)
                .filter(|value| !value.is_null())
                .or_else(|| {
                    field
                        .aliases
                        .iter()
                        .find_map(|alias| object.remove(alias).filter(|value| !value.is_null()))
                });
            let value = match raw {
                None | Some(Value::Null) => field.default.clone(),
                Some(raw) => match field.field_type.coerce(&raw) {
                    Ok(coerced) => coerced,
                    Err(failure) => {
                        warn!(field = %field.name, error = %failure, "Field coercion failed; using default");
                        warnings.push(FieldWarning {
                            field: field.name.clone(),
                            kind: WarningKind::CoercionFailed,
                            detail: failure.to_string(),
                        });
                        field.default.clone()
                    }
                },
            };
            values.insert(field.name.clone(), value);
        }

        if !object.is_empty() {
            let dropped: Vec<&String> = object.keys().collect();
            debug!(?dropped, "Dropping fields not in schema");
        }

        ExtractionResult {
            extraction_id: self.extraction_id.unwrap_or_else(Uuid::new_v4),
            document_type: self.schema.document_type().to_string(),
            schema_fingerprint: self.schema.fingerprint(),
            values,
            warnings,
        }
    }
}
