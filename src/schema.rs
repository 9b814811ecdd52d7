//! Field schemas for a document type and per-type value coercion.
//!
//! A [`Schema`] is the expected output shape for one document type (decree,
//! decision, ...). It is validated once on construction and immutable afterwards,
//! so every other stage can assume it is non-empty and free of duplicate keys.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use sha2::{Digest, Sha256};

use crate::error::{ExtractError, Result};

const DATE_OUTPUT_FORMAT: &str = "%Y-%m-%d";

const DATE_INPUT_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y"];

/// Largest integer magnitude an `f64` represents exactly.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Supported field types. Each variant carries its own coercion rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[serde(alias = "text")]
    String,
    #[serde(alias = "integer", alias = "float")]
    Number,
    #[serde(alias = "bool")]
    Boolean,
    Date,
    #[serde(alias = "array")]
    List,
    Object,
}

impl FieldType {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::List => "list",
            FieldType::Object => "object",
        }
    }

    /// Short description of the expected JSON encoding, used in prompts.
    pub fn prompt_hint(self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean (true/false)",
            FieldType::Date => "string, date formatted YYYY-MM-DD",
            FieldType::List => "array",
            FieldType::Object => "object",
        }
    }

    /// Convert a raw parsed value into this type.
    ///
    /// `null` is not handled here; callers treat it as an absent value.
    pub fn coerce(self, value: &Value) -> std::result::Result<Value, CoercionFailure> {
        let coerced = match self {
            FieldType::String => coerce_string(value),
            FieldType::Number => coerce_number(value),
            FieldType::Boolean => coerce_boolean(value),
            FieldType::Date => coerce_date(value),
            FieldType::List => Some(match value {
                Value::Array(_) => value.clone(),
                Value::Null => return Err(CoercionFailure::new(self, value)),
                other => Value::Array(vec![other.clone()]),
            }),
            FieldType::Object => value.is_object().then(|| value.clone()),
        };
        coerced.ok_or_else(|| CoercionFailure::new(self, value))
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value that could not be converted to its declared field type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoercionFailure {
    pub expected: FieldType,
    pub found: &'static str,
}

impl CoercionFailure {
    fn new(expected: FieldType, value: &Value) -> Self {
        Self {
            expected,
            found: json_kind(value),
        }
    }
}

impl fmt::Display for CoercionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot convert {} to {}", self.found, self.expected)
    }
}

impl std::error::Error for CoercionFailure {}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn coerce_string(value: &Value) -> Option<Value> {
    match value {
        Value::String(s) => Some(Value::String(s.trim().to_string())),
        Value::Number(n) => Some(Value::String(n.to_string())),
        Value::Bool(b) => Some(Value::String(b.to_string())),
        _ => None,
    }
}

fn coerce_number(value: &Value) -> Option<Value> {
    match value {
        Value::Number(_) => Some(value.clone()),
        Value::String(s) => {
            let normalized = normalize_digits(s.trim());
            let plain = strip_thousands(&normalized)?;
            let parsed = plain.parse::<f64>().ok()?;
            number_value(parsed)
        }
        _ => None,
    }
}

fn number_value(parsed: f64) -> Option<Value> {
    if !parsed.is_finite() {
        return None;
    }
    if parsed.fract() == 0.0 && parsed.abs() < MAX_EXACT_INTEGER {
        return Some(Value::from(parsed as i64));
    }
    Number::from_f64(parsed).map(Value::Number)
}

/// Remove `,` digit grouping, refusing anything that is not a clean thousands group.
fn strip_thousands(s: &str) -> Option<String> {
    let (int_part, frac) = match s.split_once('.') {
        Some((int_part, frac)) => (int_part, Some(frac)),
        None => (s, None),
    };
    let groups: Vec<&str> = int_part.split(',').collect();
    if groups.len() > 1 && groups[1..].iter().any(|g| g.len() != 3) {
        return None;
    }
    let mut out = groups.concat();
    if let Some(frac) = frac {
        out.push('.');
        out.push_str(frac);
    }
    Some(out)
}

fn coerce_boolean(value: &Value) -> Option<Value> {
    match value {
        Value::Bool(_) => Some(value.clone()),
        Value::Number(n) => match n.as_f64() {
            Some(v) if v == 1.0 => Some(Value::Bool(true)),
            Some(v) if v == 0.0 => Some(Value::Bool(false)),
            _ => None,
        },
        Value::String(s) => {
            let lowered = normalize_digits(s.trim()).to_lowercase();
            match lowered.as_str() {
                "true" | "yes" | "y" | "1" | "نعم" => Some(Value::Bool(true)),
                "false" | "no" | "n" | "0" | "لا" => Some(Value::Bool(false)),
                _ => None,
            }
        }
        _ => None,
    }
}

fn coerce_date(value: &Value) -> Option<Value> {
    let Value::String(s) = value else {
        return None;
    };
    parse_date(&normalize_digits(s.trim()))
        .map(|date| Value::String(date.format(DATE_OUTPUT_FORMAT).to_string()))
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    DATE_INPUT_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.date_naive())
        })
}

/// Convert Eastern Arabic and Persian digits (and the Arabic separators) to ASCII.
///
/// OCR of Arabic legal gazettes routinely yields `٢٠٢٣/٠١/٠١`-style values even
/// when the model is told to convert them.
pub fn normalize_digits(s: &str) -> String {
    s.chars()
        .filter(|c| *c != '\u{066C}')
        .map(|c| match c {
            '\u{0660}'..='\u{0669}' => char::from(b'0' + (c as u32 - 0x0660) as u8),
            '\u{06F0}'..='\u{06F9}' => char::from(b'0' + (c as u32 - 0x06F0) as u8),
            '\u{066B}' => '.',
            other => other,
        })
        .collect()
}

/// Length-prefixed so adjacent components cannot run together.
fn hash_part(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

/// One expected output field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Value used when the field is absent, `null`, or fails coercion.
    #[serde(default)]
    pub default: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Alternate keys the model may use; renamed to `name` during normalization.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            default: Value::Null,
            description: None,
            aliases: Vec::new(),
        }
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = default.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// The canonical name followed by every alias.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

#[derive(Deserialize)]
struct RawSchema {
    document_type: String,
    fields: Vec<FieldSpec>,
}

impl TryFrom<RawSchema> for Schema {
    type Error = ExtractError;

    fn try_from(raw: RawSchema) -> Result<Self> {
        Schema::new(raw.document_type, raw.fields)
    }
}

/// Validated, ordered set of expected fields for one document type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSchema")]
pub struct Schema {
    document_type: String,
    fields: Vec<FieldSpec>,
}

impl Schema {
    /// Build a schema, rejecting empty field lists, blank or duplicate names
    /// (aliases included), and declared defaults that do not fit their own field type.
    ///
    /// Declared defaults are stored in their coerced form, so a `"5"` number
    /// default is emitted as `5`.
    pub fn new(document_type: impl Into<String>, fields: Vec<FieldSpec>) -> Result<Self> {
        let mut schema = Self {
            document_type: document_type.into(),
            fields,
        };
        schema.validate()?;
        for field in &mut schema.fields {
            if !field.default.is_null() {
                if let Ok(coerced) = field.field_type.coerce(&field.default) {
                    field.default = coerced;
                }
            }
        }
        Ok(schema)
    }

    /// Parse a schema from its JSON representation.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ExtractError::Config(format!("invalid schema JSON: {e}")))
    }

    pub fn validate(&self) -> Result<()> {
        if self.fields.is_empty() {
            return Err(ExtractError::Config(format!(
                "schema for '{}' declares no fields",
                self.document_type
            )));
        }

        let mut seen = HashSet::with_capacity(self.fields.len());
        for field in &self.fields {
            if field.name.trim().is_empty() {
                return Err(ExtractError::Config(format!(
                    "schema for '{}' contains a field with a blank name",
                    self.document_type
                )));
            }
            for key in field.keys() {
                if !seen.insert(key) {
                    return Err(ExtractError::Config(format!(
                        "schema for '{}' declares field '{}' more than once",
                        self.document_type, key
                    )));
                }
            }
            if !field.default.is_null() {
                field.field_type.coerce(&field.default).map_err(|e| {
                    ExtractError::Config(format!(
                        "default for field '{}' does not match its type: {e}",
                        field.name
                    ))
                })?;
            }
        }
        Ok(())
    }

    pub fn document_type(&self) -> &str {
        &self.document_type
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Hex SHA-256 over the document type and canonical field list.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hash_part(&mut hasher, self.document_type.as_bytes());
        for field in &self.fields {
            hash_part(&mut hasher, field.name.as_bytes());
            hash_part(&mut hasher, field.field_type.as_str().as_bytes());
            hash_part(&mut hasher, field.default.to_string().as_bytes());
            hasher.update((field.aliases.len() as u64).to_le_bytes());
            for alias in &field.aliases {
                hash_part(&mut hasher, alias.as_bytes());
            }
        }
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<String>()
    }

    /// One line per field: name, expected encoding, description and default.
    pub fn describe(&self) -> String {
        self.fields
            .iter()
            .map(|field| {
                let mut line = format!("- \"{}\": {}", field.name, field.field_type.prompt_hint());
                if let Some(description) = &field.description {
                    line.push_str(" - ");
                    line.push_str(description);
                }
                line.push_str(&format!(" (if absent: {})", field.default));
                line
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// JSON object mapping every field to its default, in schema order.
    pub fn skeleton(&self) -> Value {
        let map: Map<String, Value> = self
            .fields
            .iter()
            .map(|f| (f.name.clone(), f.default.clone()))
            .collect();
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn invoice_schema() -> Schema {
        Schema::new(
            "decree",
            vec![
                FieldSpec::new("date", FieldType::Date),
                FieldSpec::new("amount", FieldType::Number).with_default(0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_empty_schema() {
        let err = Schema::new("decree", vec![]).unwrap_err();
        assert!(matches!(err, ExtractError::Config(_)));
    }

    #[test]
    fn test_rejects_duplicate_fields() {
        let err = Schema::new(
            "decree",
            vec![
                FieldSpec::new("date", FieldType::Date),
                FieldSpec::new("date", FieldType::String),
            ],
        )
        .unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_rejects_default_of_wrong_type() {
        let err = Schema::new(
            "decree",
            vec![FieldSpec::new("amount", FieldType::Number).with_default("lots")],
        )
        .unwrap_err();
        assert!(err.to_string().contains("amount"));
    }

    #[test]
    fn test_alias_may_not_shadow_another_field() {
        let err = Schema::new(
            "decree",
            vec![
                FieldSpec::new("date", FieldType::Date),
                FieldSpec::new("issue_date", FieldType::Date).with_alias("date"),
            ],
        )
        .unwrap_err();
        assert!(err.to_string().contains("'date' more than once"));
    }

    #[test]
    fn test_deserialize_validates() {
        let err = Schema::from_json_str(
            r#"{"document_type": "decree", "fields": [
                {"name": "a", "type": "string"},
                {"name": "a", "type": "number"}
            ]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ExtractError::Config(_)));

        let schema = Schema::from_json_str(
            r#"{"document_type": "decree", "fields": [
                {"name": "number", "type": "integer", "default": 0},
                {"name": "title", "type": "text", "description": "Decree title", "aliases": ["subject"]}
            ]}"#,
        )
        .unwrap();
        assert_eq!(schema.len(), 2);
        assert_eq!(schema.get("title").unwrap().aliases, vec!["subject"]);
        assert_eq!(schema.get("number").unwrap().field_type, FieldType::Number);
        assert_eq!(schema.get("title").unwrap().default, Value::Null);
    }

    #[test]
    fn test_number_coercion() {
        assert_eq!(FieldType::Number.coerce(&json!("42")).unwrap(), json!(42));
        assert_eq!(FieldType::Number.coerce(&json!("12.5")).unwrap(), json!(12.5));
        assert_eq!(
            FieldType::Number.coerce(&json!("1,250,000")).unwrap(),
            json!(1250000)
        );
        assert_eq!(FieldType::Number.coerce(&json!("١٢٣")).unwrap(), json!(123));
        assert_eq!(FieldType::Number.coerce(&json!("٣٫٥")).unwrap(), json!(3.5));
        assert!(FieldType::Number.coerce(&json!("not-a-number")).is_err());
        assert!(FieldType::Number.coerce(&json!("1,5")).is_err());
        assert!(FieldType::Number.coerce(&json!("NaN")).is_err());
        assert!(FieldType::Number.coerce(&json!(true)).is_err());
    }

    #[test]
    fn test_date_coercion() {
        assert_eq!(
            FieldType::Date.coerce(&json!("2023-01-01")).unwrap(),
            json!("2023-01-01")
        );
        assert_eq!(
            FieldType::Date.coerce(&json!("15/03/2021")).unwrap(),
            json!("2021-03-15")
        );
        assert_eq!(
            FieldType::Date.coerce(&json!("٢٠٢٣/٠١/٠٥")).unwrap(),
            json!("2023-01-05")
        );
        assert_eq!(
            FieldType::Date.coerce(&json!("2022-07-04T10:00:00Z")).unwrap(),
            json!("2022-07-04")
        );
        assert!(FieldType::Date.coerce(&json!("next tuesday")).is_err());
        assert!(FieldType::Date.coerce(&json!(20230101)).is_err());
    }

    #[test]
    fn test_boolean_and_string_coercion() {
        assert_eq!(FieldType::Boolean.coerce(&json!("Yes")).unwrap(), json!(true));
        assert_eq!(FieldType::Boolean.coerce(&json!("لا")).unwrap(), json!(false));
        assert_eq!(FieldType::Boolean.coerce(&json!(0)).unwrap(), json!(false));
        assert!(FieldType::Boolean.coerce(&json!("maybe")).is_err());

        assert_eq!(FieldType::String.coerce(&json!(17)).unwrap(), json!("17"));
        assert_eq!(FieldType::String.coerce(&json!("  x ")).unwrap(), json!("x"));
        assert!(FieldType::String.coerce(&json!({"a": 1})).is_err());
    }

    #[test]
    fn test_list_and_object_coercion() {
        assert_eq!(FieldType::List.coerce(&json!("one")).unwrap(), json!(["one"]));
        assert_eq!(FieldType::List.coerce(&json!([1, 2])).unwrap(), json!([1, 2]));
        assert!(FieldType::Object.coerce(&json!([1])).is_err());
    }

    #[test]
    fn test_fingerprint_changes_with_fields() {
        let a = invoice_schema();
        let b = Schema::new("decree", vec![FieldSpec::new("date", FieldType::Date)]).unwrap();
        assert_eq!(a.fingerprint(), invoice_schema().fingerprint());
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn test_defaults_stored_coerced() {
        let schema = Schema::new(
            "decree",
            vec![
                FieldSpec::new("amount", FieldType::Number).with_default("5"),
                FieldSpec::new("issued", FieldType::Date).with_default("15/03/2021"),
                FieldSpec::new("tags", FieldType::List).with_default("general"),
                FieldSpec::new("note", FieldType::String),
            ],
        )
        .unwrap();

        assert_eq!(schema.get("amount").unwrap().default, json!(5));
        assert_eq!(schema.get("issued").unwrap().default, json!("2021-03-15"));
        assert_eq!(schema.get("tags").unwrap().default, json!(["general"]));
        assert_eq!(schema.get("note").unwrap().default, Value::Null);
    }

    #[test]
    fn test_fingerprint_separates_aliases() {
        let with_aliases = |aliases: &[&str]| {
            let field = aliases
                .iter()
                .fold(FieldSpec::new("title", FieldType::String), |f, a| f.with_alias(*a));
            Schema::new("decree", vec![field]).unwrap().fingerprint()
        };
        assert_ne!(with_aliases(&["x", "y"]), with_aliases(&["xy"]));
        assert_ne!(with_aliases(&["x"]), with_aliases(&[]));
    }

    #[test]
    fn test_skeleton_preserves_order() {
        let skeleton = invoice_schema().skeleton();
        let keys: Vec<&String> = skeleton.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["date", "amount"]);
        assert_eq!(skeleton["amount"], json!(0));
    }
}
