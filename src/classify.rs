//! Subtype classification for decision articles.
//!
//! Decision gazette sections mix several publication kinds. A short, non-JSON
//! completion labels the text so callers can pick the right schema. A failed or
//! unrecognised classification degrades to [`Subtype::Unknown`] instead of failing.

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::backend::{CompletionBackend, CompletionRequest};

const CLASSIFY_SYSTEM_PROMPT: &str = "You are a legal document analyzer. Given the full OCR text of a Lebanese decision article (قرارات تعاميم علم وخبر), classify it into one of:
- قرار
- بيان
- إعلام
- علم وخبر
- بلاغ
- قرار وسيط
- قرار بلدي

Respond with only the subtype or \"unknown\".";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subtype {
    /// قرار
    Decision,
    /// بيان
    Statement,
    /// إعلام
    Notification,
    /// علم وخبر
    Registration,
    /// بلاغ
    Communique,
    /// قرار وسيط
    IntermediateDecision,
    /// قرار بلدي
    MunicipalDecision,
    Unknown,
}

impl Subtype {
    pub const ALL: [Subtype; 7] = [
        Subtype::Decision,
        Subtype::Statement,
        Subtype::Notification,
        Subtype::Registration,
        Subtype::Communique,
        Subtype::IntermediateDecision,
        Subtype::MunicipalDecision,
    ];

    /// The Arabic label the model answers with.
    pub fn label(self) -> &'static str {
        match self {
            Subtype::Decision => "قرار",
            Subtype::Statement => "بيان",
            Subtype::Notification => "إعلام",
            Subtype::Registration => "علم وخبر",
            Subtype::Communique => "بلاغ",
            Subtype::IntermediateDecision => "قرار وسيط",
            Subtype::MunicipalDecision => "قرار بلدي",
            Subtype::Unknown => "unknown",
        }
    }

    /// Map a model reply to a subtype, tolerating quotes and trailing punctuation.
    pub fn from_label(reply: &str) -> Subtype {
        let cleaned = reply
            .trim()
            .trim_matches(|c: char| c.is_ascii_punctuation() || c == '،' || c.is_whitespace());
        Self::ALL
            .into_iter()
            .find(|subtype| subtype.label() == cleaned)
            .unwrap_or(Subtype::Unknown)
    }
}

impl fmt::Display for Subtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Labels decision texts with a single short completion.
#[derive(Clone)]
pub struct SubtypeClassifier {
    backend: Arc<dyn CompletionBackend>,
    temperature: f32,
    max_output_tokens: u32,
}

impl SubtypeClassifier {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self {
            backend,
            temperature: 0.0,
            max_output_tokens: 50,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    #[instrument(skip_all, fields(text_chars = text.chars().count()))]
    pub async fn classify(&self, text: &str) -> Subtype {
        let request = CompletionRequest::new(text.trim())
            .with_system(CLASSIFY_SYSTEM_PROMPT)
            .with_temperature(self.temperature)
            .with_max_output_tokens(self.max_output_tokens);

        match self.backend.complete(request).await {
            Ok(reply) => {
                let subtype = Subtype::from_label(&reply);
                if subtype == Subtype::Unknown && !reply.trim().is_empty() {
                    debug!(reply = %reply.trim(), "Unrecognised subtype label");
                }
                subtype
            }
            Err(err) => {
                warn!(error = %err, "Subtype classification error");
                Subtype::Unknown
            }
        }
    }
}
