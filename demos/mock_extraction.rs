//! Example: Offline extraction with a scripted backend.
//!
//! The mock backend streams a chatty model reply in fragments, so the full chain
//! (prompt, stream collection, JSON location, normalization) runs without
//! network calls or billing.

use std::sync::Arc;

use legal_extract::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let schema = Schema::new(
        "decree",
        vec![
            FieldSpec::new("decree_number", FieldType::String).with_default(""),
            FieldSpec::new("issue_date", FieldType::Date)
                .with_description("Date the decree was signed"),
            FieldSpec::new("budget", FieldType::Number).with_default(0),
            FieldSpec::new("articles", FieldType::List).with_default(Vec::<String>::new()),
        ],
    )?;

    let backend = MockBackend::from_chunks([
        "Sure, here is the extracted data:\n```json\n{\"decree_number\": \"١٢٣٤\", ",
        "\"issue_date\": \"١٥/٠٣/٢٠٢١\", \"budget\": \"about a million\", ",
        "\"articles\": [\"Article 1\", \"Article 2\"], \"notes\": \"n/a\"}\n```\nHope this helps!",
    ]);

    let extractor = ExtractorBuilder::new("mock-key")
        .with_backend(Arc::new(backend.clone()))
        .with_styled_schema(schema, PromptStyle::Template)
        .build()?;

    let document = Document::new("decree", "مرسوم رقم ١٢٣٤ صادر بتاريخ ١٥/٠٣/٢٠٢١ ...");
    let result = extractor.extract(&document).await?;

    println!("Prompt sent:\n{}\n", backend.requests()[0].prompt);
    println!(
        "Result {}:\n{}",
        result.extraction_id,
        serde_json::to_string_pretty(&result.to_value())?
    );
    for warning in &result.warnings {
        println!("warning: {warning} ({})", warning.detail);
    }

    Ok(())
}
