//! Prompt rendering from a schema and an OCR document.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    document::Document,
    error::{ExtractError, Result},
    schema::Schema,
};

const STRICT_RULES: &[&str] = &[
    "Convert all Eastern Arabic numerals to Western digits (0-9), in every field including article contents.",
    "Format all dates as YYYY-MM-DD.",
    "Output no explanation or commentary outside the JSON.",
];

const GUARDED_RULES: &[&str] = &[
    "Do not hallucinate content.",
    "If a feature is missing from the text, return null for it (or an empty object/list if applicable).",
];

/// Prompt layout used for a document type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptStyle {
    /// Generic extractor: explicit output rules, schema, text, single-object demand.
    #[default]
    Strict,
    /// Schema description followed by the text as an example input.
    Template,
    /// Parser persona with explicit no-hallucination and null-for-missing rules.
    Guarded,
}

impl PromptStyle {
    /// Sampling temperature the style was tuned with.
    pub fn default_temperature(self) -> f32 {
        match self {
            PromptStyle::Strict => 0.2,
            PromptStyle::Template | PromptStyle::Guarded => 0.3,
        }
    }
}

/// Renders extraction prompts. Pure: no I/O, no state beyond configuration.
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    style: PromptStyle,
    extra_rules: Vec<String>,
}

impl PromptBuilder {
    pub fn new(style: PromptStyle) -> Self {
        Self {
            style,
            extra_rules: Vec::new(),
        }
    }

    /// Append a caller-supplied instruction to the rule list.
    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.extra_rules.push(rule.into());
        self
    }

    pub fn style(&self) -> PromptStyle {
        self.style
    }

    /// Render the prompt for `document` against `schema`.
    ///
    /// The OCR text is embedded verbatim.
    pub fn render(&self, schema: &Schema, document: &Document) -> Result<String> {
        schema.validate()?;
        if schema.document_type() != document.document_type {
            return Err(ExtractError::Config(format!(
                "schema is for '{}' but the document is tagged '{}'",
                schema.document_type(),
                document.document_type
            )));
        }

        let prompt = match self.style {
            PromptStyle::Strict => self.render_strict(schema, &document.text),
            PromptStyle::Template => self.render_template(schema, &document.text),
            PromptStyle::Guarded => self.render_guarded(schema, &document.text),
        };
        debug!(
            style = ?self.style,
            fields = schema.len(),
            prompt_chars = prompt.chars().count(),
            "Rendered extraction prompt"
        );
        Ok(prompt)
    }

    fn schema_block(schema: &Schema) -> String {
        let skeleton = serde_json::to_string_pretty(&schema.skeleton()).unwrap_or_default();
        format!(
            "Fields:\n{}\n\nShape:\n{}",
            schema.describe(),
            skeleton
        )
    }

    fn rules_block(&self, base: &[&str]) -> String {
        let mut out = String::new();
        for rule in base
            .iter()
            .copied()
            .chain(self.extra_rules.iter().map(String::as_str))
        {
            let _ = writeln!(out, "- {rule}");
        }
        out.trim_end().to_string()
    }

    fn render_strict(&self, schema: &Schema, text: &str) -> String {
        format!(
            "You are a legal document analyst. Extract JSON that matches the following schema exactly.\n\
             Apply these rules to every field:\n\n\
             {rules}\n\n\
             Schema:\n{schema}\n\n\
             ### Text:\n{text}\n\n\
             ### Return exactly one JSON object:",
            rules = self.rules_block(STRICT_RULES),
            schema = Self::schema_block(schema),
        )
    }

    fn render_template(&self, schema: &Schema, text: &str) -> String {
        let mut prompt = Self::schema_block(schema);
        if !self.extra_rules.is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(&self.rules_block(&[]));
        }
        format!(
            "{prompt}\n\n### Example Input:\n{text}\n\n### Output Format (in JSON):"
        )
    }

    fn render_guarded(&self, schema: &Schema, text: &str) -> String {
        format!(
            "You are a legal document parser. You will receive the OCR text of a {kind}. \
             Extract the following fields:\n\n\
             {schema}\n\n\
             {rules}\n\n\
             ### Example Input:\n{text}\n\n\
             ### Output Format (in JSON):",
            kind = schema.document_type(),
            schema = Self::schema_block(schema),
            rules = self.rules_block(GUARDED_RULES),
        )
    }
}
