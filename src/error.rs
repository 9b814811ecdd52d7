use std::{fmt, path::PathBuf};

use thiserror::Error;

/// Stage of the extraction chain an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Schema loading, validation or prompt rendering. Nothing was sent upstream.
    Configuration,
    /// The remote call, or consumption of its streamed response.
    Stream,
    /// Locating a JSON value in the completed response.
    Extraction,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Configuration => "configuration",
            Stage::Stream => "stream",
            Stage::Extraction => "extraction",
        };
        f.write_str(name)
    }
}

/// Fatal errors raised while extracting a document.
///
/// Field-level coercion problems are not represented here; they are reported as
/// [`FieldWarning`](crate::normalize::FieldWarning)s on the result instead.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid schema file {}: {source}", path.display())]
    SchemaFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Gemini client error: {0}")]
    Gemini(#[from] gemini_rust::ClientError),

    #[error("Stream failed after {chunks_received} chunks: {message}")]
    Stream {
        message: String,
        chunks_received: usize,
    },

    #[error("Stream cancelled after {chunks_received} chunks")]
    Cancelled { chunks_received: usize },

    #[error("No JSON value found: {message}\n\nRaw response:\n{raw_text}")]
    Extraction { message: String, raw_text: String },

    #[error("Context error: {0}")]
    Context(String),
}

impl ExtractError {
    /// Create an extraction error carrying a display-safe copy of the response.
    pub fn extraction(message: impl Into<String>, raw_text: &str) -> Self {
        Self::Extraction {
            message: message.into(),
            raw_text: truncate_for_display(raw_text, 500),
        }
    }

    /// Create a mid-stream failure.
    pub fn stream(message: impl Into<String>, chunks_received: usize) -> Self {
        Self::Stream {
            message: message.into(),
            chunks_received,
        }
    }

    /// The stage of the chain this error aborted.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Config(_) | Self::Io(_) | Self::SchemaFile { .. } | Self::Context(_) => {
                Stage::Configuration
            }
            Self::Gemini(_) | Self::Stream { .. } | Self::Cancelled { .. } => Stage::Stream,
            Self::Extraction { .. } => Stage::Extraction,
        }
    }

    /// Whether re-invoking the whole chain could plausibly succeed.
    ///
    /// Cancellation is deliberate and configuration errors are deterministic,
    /// so neither is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Stream { .. } => true,
            Self::Gemini(gemini_rust::ClientError::BadResponse { code, .. }) => {
                *code == 503 || *code == 429
            }
            _ => false,
        }
    }
}

pub(crate) fn truncate_for_display(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_string();
    }
    let mut end = max_len;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!(
        "{}... [truncated, {} total bytes]",
        &text[..end],
        text.len()
    )
}

pub type Result<T> = std::result::Result<T, ExtractError>;

/// Extension trait for adding context to errors.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn with_context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<ExtractError>> ResultExt<T> for std::result::Result<T, E> {
    fn with_context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let base_err = e.into();
            ExtractError::Context(format!("{}: {}", context.into(), base_err))
        })
    }
}
