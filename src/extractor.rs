use std::{future::Future, sync::Arc};

use gemini_rust::Model;
use tracing::{debug, field, info, instrument, trace, warn, Span};
use uuid::Uuid;

use crate::{
    backend::{CompletionBackend, CompletionRequest, GeminiBackend},
    classify::{Subtype, SubtypeClassifier},
    document::Document,
    error::{ExtractError, Result},
    extract::extract_json,
    normalize::{ExtractionResult, Normalizer},
    prompt::{PromptBuilder, PromptStyle},
    registry::SchemaRegistry,
    schema::Schema,
    stream::StreamCollector,
};

/// Document type whose schema [`Extractor::extract_decision`] uses.
pub const DECISION_DOCUMENT_TYPE: &str = "decision";

/// Global configuration options for the extractor.
#[derive(Clone, Debug)]
pub struct ExtractorConfig {
    /// Sampling temperature; `None` uses the prompt style's own default.
    pub temperature: Option<f32>,
    /// Output token cap for extraction calls (default: 50_000)
    pub max_output_tokens: u32,
    pub stop_sequences: Vec<String>,
    /// Temperature for subtype classification (default: 0.0)
    pub classify_temperature: f32,
    /// Output token cap for subtype classification (default: 50)
    pub classify_max_tokens: u32,
    /// Style for schemas added without one (default: Strict)
    pub default_style: PromptStyle,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            temperature: None,
            max_output_tokens: 50_000,
            stop_sequences: Vec::new(),
            classify_temperature: 0.0,
            classify_max_tokens: 50,
            default_style: PromptStyle::Strict,
        }
    }
}

/// Builder for [`Extractor`].
pub struct ExtractorBuilder {
    api_key: String,
    model: Model,
    backend: Option<Arc<dyn CompletionBackend>>,
    registry: SchemaRegistry,
    styled_schemas: Vec<(Schema, Option<PromptStyle>)>,
    extra_rules: Vec<String>,
    config: ExtractorConfig,
}

impl ExtractorBuilder {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: Model::Gemini25Flash,
            backend: None,
            registry: SchemaRegistry::new(),
            styled_schemas: Vec::new(),
            extra_rules: Vec::new(),
            config: ExtractorConfig::default(),
        }
    }

    /// Set the Gemini model used when no custom backend is supplied.
    pub fn with_model(mut self, model: Model) -> Self {
        self.model = model;
        self
    }

    /// Route completions through a custom backend instead of Gemini.
    ///
    /// Tests and offline runs pass a [`MockBackend`](crate::backend::MockBackend) here.
    pub fn with_backend(mut self, backend: Arc<dyn CompletionBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Register a schema with the configured default prompt style.
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.styled_schemas.push((schema, None));
        self
    }

    /// Register a schema with an explicit prompt style.
    pub fn with_styled_schema(mut self, schema: Schema, style: PromptStyle) -> Self {
        self.styled_schemas.push((schema, Some(style)));
        self
    }

    /// Use a pre-loaded registry. Schemas added with `with_schema` are layered on top.
    pub fn with_registry(mut self, registry: SchemaRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Append an instruction to every extraction prompt.
    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.extra_rules.push(rule.into());
        self
    }

    /// Override the sampling temperature for every prompt style.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = Some(temperature);
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.config.max_output_tokens = max_output_tokens;
        self
    }

    pub fn with_stop_sequences(mut self, stop_sequences: Vec<String>) -> Self {
        self.config.stop_sequences = stop_sequences;
        self
    }

    /// Apply a complete configuration.
    pub fn with_config(mut self, config: ExtractorConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the extractor.
    pub fn build(self) -> Result<Extractor> {
        let backend: Arc<dyn CompletionBackend> = match self.backend {
            Some(backend) => backend,
            None => Arc::new(GeminiBackend::new(&self.api_key, self.model)?),
        };

        let mut registry = self.registry;
        for (schema, style) in self.styled_schemas {
            registry.insert(schema, style.unwrap_or(self.config.default_style));
        }

        Ok(Extractor {
            backend,
            registry,
            extra_rules: self.extra_rules,
            config: self.config,
        })
    }
}

/// Runs the extraction chain: prompt, streamed completion, JSON location,
/// normalization.
///
/// Each call owns its prompt, accumulator and result; concurrent calls share
/// only the immutable registry and the backend handle.
#[derive(Clone)]
pub struct Extractor {
    backend: Arc<dyn CompletionBackend>,
    registry: SchemaRegistry,
    extra_rules: Vec<String>,
    config: ExtractorConfig,
}

impl Extractor {
    pub fn builder(api_key: impl Into<String>) -> ExtractorBuilder {
        ExtractorBuilder::new(api_key)
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Classifier sharing this extractor's backend and classification settings.
    pub fn classifier(&self) -> SubtypeClassifier {
        SubtypeClassifier::new(self.backend.clone())
            .with_temperature(self.config.classify_temperature)
            .with_max_output_tokens(self.config.classify_max_tokens)
    }

    /// Extract `document` using the schema registered for its document type.
    pub async fn extract(&self, document: &Document) -> Result<ExtractionResult> {
        self.extract_with_cancel(document, std::future::pending())
            .await
    }

    /// Like [`extract`](Self::extract), aborting with
    /// [`ExtractError::Cancelled`] if `cancel` resolves before the remote call
    /// completes, whether it is still connecting or already streaming.
    pub async fn extract_with_cancel<C>(
        &self,
        document: &Document,
        cancel: C,
    ) -> Result<ExtractionResult>
    where
        C: Future<Output = ()>,
    {
        let entry = self.registry.get(&document.document_type)?;
        self.run(document, &entry.schema, entry.style, cancel).await
    }

    /// Extract `document` against an explicit schema, bypassing the registry.
    pub async fn extract_with_schema(
        &self,
        document: &Document,
        schema: &Schema,
        style: PromptStyle,
    ) -> Result<ExtractionResult> {
        self.run(document, schema, style, std::future::pending())
            .await
    }

    /// Extract a decision article of a known subtype.
    ///
    /// Only [`Subtype::Decision`] has a schema; other subtypes are rejected
    /// before any remote call.
    pub async fn extract_decision(&self, subtype: Subtype, text: &str) -> Result<ExtractionResult> {
        if subtype != Subtype::Decision {
            return Err(ExtractError::Config(format!(
                "unsupported subtype '{}' ({subtype:?})",
                subtype.label()
            )));
        }
        self.extract(&Document::new(DECISION_DOCUMENT_TYPE, text))
            .await
    }

    /// Classify a decision article, then extract it if its subtype is supported.
    pub async fn classify_and_extract_decision(
        &self,
        text: &str,
    ) -> Result<(Subtype, ExtractionResult)> {
        let subtype = self.classifier().classify(text).await;
        let result = self.extract_decision(subtype, text).await?;
        Ok((subtype, result))
    }

    #[instrument(
        skip_all,
        fields(
            document_type = %document.document_type,
            style = ?style,
            extraction_id = field::Empty,
        )
    )]
    async fn run<C>(
        &self,
        document: &Document,
        schema: &Schema,
        style: PromptStyle,
        cancel: C,
    ) -> Result<ExtractionResult>
    where
        C: Future<Output = ()>,
    {
        let extraction_id = Uuid::new_v4();
        Span::current().record("extraction_id", field::display(extraction_id));

        let prompt = self
            .extra_rules
            .iter()
            .fold(PromptBuilder::new(style), |builder, rule| {
                builder.with_rule(rule.clone())
            })
            .render(schema, document)?;

        let request = CompletionRequest::new(prompt)
            .with_temperature(
                self.config
                    .temperature
                    .unwrap_or_else(|| style.default_temperature()),
            )
            .with_max_output_tokens(self.config.max_output_tokens)
            .with_stop_sequences(self.config.stop_sequences.clone());

        tokio::pin!(cancel);
        let chunks = tokio::select! {
            biased;
            _ = &mut cancel => {
                warn!("Cancelled before the response stream started");
                return Err(ExtractError::Cancelled { chunks_received: 0 });
            }
            started = self.backend.stream(request) => started?,
        };
        let text = StreamCollector::collect_until(chunks, cancel).await?;
        debug!(response_chars = text.chars().count(), "Received model response");
        trace!(raw_response = %text, "Raw model text");

        let parsed = extract_json(&text)?;
        let result = Normalizer::new(schema)
            .with_extraction_id(extraction_id)
            .normalize(parsed);

        info!(
            fields = result.values.len(),
            warnings = result.warnings.len(),
            "Extraction complete"
        );
        Ok(result)
    }
}
