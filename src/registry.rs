//! Schemas keyed by document type.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tokio::fs;
use tracing::{debug, info};

use crate::{
    error::{ExtractError, Result},
    prompt::PromptStyle,
    schema::{FieldSpec, Schema},
};

/// On-disk schema definition.
#[derive(Deserialize)]
struct SchemaFile {
    document_type: String,
    #[serde(default)]
    style: PromptStyle,
    fields: Vec<FieldSpec>,
}

/// A registered schema and the prompt layout used with it.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryEntry {
    pub schema: Schema,
    pub style: PromptStyle,
}

#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    entries: BTreeMap<String, RegistryEntry>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the schema for its document type.
    pub fn insert(&mut self, schema: Schema, style: PromptStyle) -> Option<RegistryEntry> {
        self.entries.insert(
            schema.document_type().to_string(),
            RegistryEntry { schema, style },
        )
    }

    /// Add a schema, refusing to shadow an existing document type.
    pub fn register(&mut self, schema: Schema, style: PromptStyle) -> Result<()> {
        if self.entries.contains_key(schema.document_type()) {
            return Err(ExtractError::Config(format!(
                "document type '{}' is already registered",
                schema.document_type()
            )));
        }
        self.insert(schema, style);
        Ok(())
    }

    pub fn get(&self, document_type: &str) -> Result<&RegistryEntry> {
        self.entries.get(document_type).ok_or_else(|| {
            ExtractError::Config(format!(
                "no schema registered for document type '{document_type}'"
            ))
        })
    }

    pub fn contains(&self, document_type: &str) -> bool {
        self.entries.contains_key(document_type)
    }

    pub fn document_types(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse one schema definition and register it.
    pub fn register_json(&mut self, json: &str) -> Result<()> {
        let file: SchemaFile = serde_json::from_str(json)
            .map_err(|e| ExtractError::Config(format!("invalid schema JSON: {e}")))?;
        self.register_file(file)
    }

    fn register_file(&mut self, file: SchemaFile) -> Result<()> {
        let schema = Schema::new(file.document_type, file.fields)?;
        self.register(schema, file.style)
    }

    /// Load a single schema file.
    pub async fn load_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).await?;
        let file: SchemaFile =
            serde_json::from_str(&raw).map_err(|source| ExtractError::SchemaFile {
                path: path.to_path_buf(),
                source,
            })?;
        debug!(path = %path.display(), document_type = %file.document_type, "Loaded schema file");
        self.register_file(file)
    }

    /// Load every `*.json` file in `dir`, in file-name order.
    pub async fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut paths = Vec::new();
        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut registry = Self::new();
        for path in &paths {
            registry.load_file(path).await?;
        }
        info!(dir = %dir.display(), schemas = registry.len(), "Loaded schema registry");
        Ok(registry)
    }
}
