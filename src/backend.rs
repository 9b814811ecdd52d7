//! Remote completion backends.
//!
//! The extraction chain depends on exactly one collaborator: something that takes
//! a prompt and yields a finite, forward-only stream of text fragments ending in
//! completion or failure. [`CompletionBackend`] is that seam. [`GeminiBackend`]
//! talks to the hosted model; [`MockBackend`] scripts responses for tests and
//! offline runs.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use futures::{
    stream::{self, BoxStream},
    StreamExt,
};
use gemini_rust::{Content, Gemini, GenerationConfig, Message, Model, Role};
use tracing::debug;

use crate::{
    error::{ExtractError, Result},
    stream::StreamCollector,
};

/// Lazy, non-restartable sequence of response fragments.
///
/// The stream ends (`None`) when the upstream signals completion; an `Err` item
/// means the upstream failed before completing.
pub type ChunkStream = BoxStream<'static, Result<String>>;

/// A single completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub stop_sequences: Vec<String>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            temperature: 0.2,
            max_output_tokens: 50_000,
            stop_sequences: Vec::new(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    pub fn with_stop_sequences(mut self, stop_sequences: Vec<String>) -> Self {
        self.stop_sequences = stop_sequences;
        self
    }
}

/// Abstract interface for a streaming text-completion service.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Start a streaming completion.
    ///
    /// Errors returned here mean the call could not be started at all; failures
    /// after the first fragment surface as `Err` items of the stream.
    async fn stream(&self, request: CompletionRequest) -> Result<ChunkStream>;

    /// Run a completion to the end and return the concatenated text.
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let chunks = self.stream(request).await?;
        StreamCollector::collect(chunks).await
    }
}

/// Streaming completions from the Gemini API.
#[derive(Clone)]
pub struct GeminiBackend {
    client: Arc<Gemini>,
}

impl GeminiBackend {
    pub fn new(api_key: &str, model: Model) -> Result<Self> {
        let client = Gemini::with_model(api_key, model)?;
        Ok(Self {
            client: Arc::new(client),
        })
    }

    /// Wrap an already configured client.
    pub fn from_client(client: Arc<Gemini>) -> Self {
        Self { client }
    }

    /// Access the underlying client when low-level controls are required.
    pub fn raw(&self) -> Arc<Gemini> {
        self.client.clone()
    }

    fn generation_config(request: &CompletionRequest) -> GenerationConfig {
        GenerationConfig {
            temperature: Some(request.temperature),
            max_output_tokens: request.max_output_tokens.try_into().ok(),
            stop_sequences: (!request.stop_sequences.is_empty())
                .then(|| request.stop_sequences.clone()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl CompletionBackend for GeminiBackend {
    async fn stream(&self, request: CompletionRequest) -> Result<ChunkStream> {
        let mut builder = self.client.generate_content();
        if let Some(system) = &request.system {
            builder = builder.with_system_instruction(system.clone());
        }
        builder = builder
            .with_generation_config(Self::generation_config(&request))
            .with_message(Message {
                role: Role::User,
                content: Content::text(request.prompt.clone()).with_role(Role::User),
            });

        debug!(
            prompt_chars = request.prompt.chars().count(),
            temperature = request.temperature,
            "Starting streaming completion"
        );
        let inner = builder.execute_stream().await?;

        Ok(inner
            .map(|item| item.map(|response| response.text()).map_err(ExtractError::from))
            .boxed())
    }
}

/// Produces the scripted stream items for one request.
pub type MockHandler =
    Arc<dyn Fn(&CompletionRequest) -> Result<Vec<Result<String>>> + Send + Sync>;

/// Offline backend returning scripted fragments and recording every request.
#[derive(Clone)]
pub struct MockBackend {
    handler: MockHandler,
    stall: bool,
    start_delay: Option<Duration>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl MockBackend {
    /// Build a backend from an arbitrary handler.
    pub fn new(
        handler: impl Fn(&CompletionRequest) -> Result<Vec<Result<String>>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Arc::new(handler),
            stall: false,
            start_delay: None,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every request yields these fragments, in order, then completes.
    pub fn from_chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let chunks: Vec<String> = chunks.into_iter().map(Into::into).collect();
        Self::new(move |_| Ok(chunks.iter().cloned().map(Ok).collect()))
    }

    /// Deliver the first `delivered` fragments, then fail as a dropped connection.
    pub fn failing_after<I, S>(chunks: I, delivered: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let chunks: Vec<String> = chunks.into_iter().map(Into::into).collect();
        Self::new(move |_| {
            let mut items: Vec<Result<String>> =
                chunks.iter().take(delivered).cloned().map(Ok).collect();
            items.push(Err(ExtractError::stream("connection reset by peer", delivered)));
            Ok(items)
        })
    }

    /// After the scripted fragments, never signal completion.
    pub fn stalling(mut self) -> Self {
        self.stall = true;
        self
    }

    /// Wait `delay` before the response starts, as a slow connection would.
    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = Some(delay);
        self
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CompletionBackend for MockBackend {
    async fn stream(&self, request: CompletionRequest) -> Result<ChunkStream> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        if let Some(delay) = self.start_delay {
            tokio::time::sleep(delay).await;
        }
        let items = (self.handler)(&request)?;
        let scripted = stream::iter(items);
        if self.stall {
            Ok(scripted.chain(stream::pending()).boxed())
        } else {
            Ok(scripted.boxed())
        }
    }
}
