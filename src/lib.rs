//! Schema-driven JSON extraction from OCR'd legal text.
//!
//! A document's OCR text and its schema are rendered into a prompt, the prompt is
//! sent to a streaming completion backend, the streamed fragments are joined, the
//! first JSON value in the reply is located, and that value is normalized against
//! the schema.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use legal_extract::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//!     let schema = Schema::new(
//!         "decree",
//!         vec![
//!             FieldSpec::new("decree_number", FieldType::String),
//!             FieldSpec::new("issue_date", FieldType::Date),
//!         ],
//!     )?;
//!
//!     let extractor = ExtractorBuilder::new("your-api-key")
//!         .with_schema(schema)
//!         .build()?;
//!
//!     let result = extractor
//!         .extract(&Document::new("decree", "مرسوم رقم ١٢ ..."))
//!         .await?;
//!
//!     println!("{}", result.to_value());
//!     for warning in &result.warnings {
//!         eprintln!("warning: {warning}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod classify;
pub mod document;
pub mod error;
pub mod extract;
pub mod extractor;
pub mod normalize;
pub mod prompt;
pub mod registry;
pub mod schema;
pub mod stream;

pub use backend::{ChunkStream, CompletionBackend, CompletionRequest, GeminiBackend, MockBackend};
pub use classify::{Subtype, SubtypeClassifier};
pub use document::{clean_lines, combine_article_texts, detect_type_and_source, Document};
pub use error::{ExtractError, Result, ResultExt, Stage};
pub use extract::{extract_json, find_json};
pub use extractor::{Extractor, ExtractorBuilder, ExtractorConfig, DECISION_DOCUMENT_TYPE};
pub use normalize::{ExtractionResult, FieldWarning, Normalizer, WarningKind};
pub use prompt::{PromptBuilder, PromptStyle};
pub use registry::{RegistryEntry, SchemaRegistry};
pub use schema::{FieldSpec, FieldType, Schema};
pub use stream::StreamCollector;

/// Prelude module for convenient imports.
///
/// ```rust
/// use legal_extract::prelude::*;
/// ```
pub mod prelude {
    pub use crate::backend::{CompletionBackend, CompletionRequest, GeminiBackend, MockBackend};
    pub use crate::classify::{Subtype, SubtypeClassifier};
    pub use crate::document::Document;
    pub use crate::error::{ExtractError, Result, ResultExt, Stage};
    pub use crate::extractor::{Extractor, ExtractorBuilder, ExtractorConfig};
    pub use crate::normalize::{ExtractionResult, FieldWarning};
    pub use crate::prompt::{PromptBuilder, PromptStyle};
    pub use crate::registry::SchemaRegistry;
    pub use crate::schema::{FieldSpec, FieldType, Schema};

    // Re-export commonly used external types
    pub use gemini_rust::Model;
}
