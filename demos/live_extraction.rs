//! Example: Extract every numbered article folder under a directory with Gemini.
//!
//! Usage: `cargo run --example live_extraction -- <schemas-dir> <article-dir> <document-type>`

use std::env;

use legal_extract::prelude::*;
use legal_extract::document::detect_type_and_source;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let api_key = env::var("GEMINI_API_KEY").expect("GEMINI_API_KEY must be set to run examples");
    let mut args = env::args().skip(1);
    let (Some(schemas_dir), Some(article_dir), Some(document_type)) =
        (args.next(), args.next(), args.next())
    else {
        eprintln!("usage: live_extraction <schemas-dir> <article-dir> <document-type>");
        std::process::exit(2);
    };

    let registry = SchemaRegistry::load_dir(&schemas_dir).await?;
    let extractor = ExtractorBuilder::new(api_key)
        .with_model(Model::Gemini25Flash)
        .with_registry(registry)
        .build()?;

    let document = Document::from_article_dir(document_type, &article_dir).await?;
    let (kind, source) = detect_type_and_source(
        &document.text,
        &["مرسوم", "قرار", "قانون"],
        &["الجريدة الرسمية", "رئاسة مجلس الوزراء"],
    );
    println!("Detected type: {kind:?}, source: {source:?}");

    match extractor.extract(&document).await {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Err(err) => {
            eprintln!("extraction failed at {} stage: {err}", err.stage());
            if err.is_retryable() {
                eprintln!("the failure looks transient; re-run to retry");
            }
        }
    }

    Ok(())
}
