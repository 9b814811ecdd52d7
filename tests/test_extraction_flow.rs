use std::sync::Arc;
use std::time::{Duration, Instant};

use legal_extract::prelude::*;
use legal_extract::{extract_json, StreamCollector};
use serde_json::json;

fn date_amount_schema() -> Schema {
    Schema::new(
        "decree",
        vec![
            FieldSpec::new("date", FieldType::Date),
            FieldSpec::new("amount", FieldType::Number).with_default(0),
        ],
    )
    .unwrap()
}

fn extractor_with(backend: &MockBackend) -> Extractor {
    ExtractorBuilder::new("mock-key")
        .with_backend(Arc::new(backend.clone()))
        .with_schema(date_amount_schema())
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_prose_wrapped_response_uses_default_for_absent_key() {
    let backend = MockBackend::from_chunks([r#"Here is the result: {"date": "2023-01-01"} Thanks."#]);

    let result = extractor_with(&backend)
        .extract(&Document::new("decree", "OCR text"))
        .await
        .unwrap();

    assert_eq!(result.to_value(), json!({"date": "2023-01-01", "amount": 0}));
    assert!(result.warnings.is_empty());
}

#[tokio::test]
async fn test_coercion_failure_reported_not_fatal() {
    let schema = Schema::new(
        "invoice",
        vec![FieldSpec::new("amount", FieldType::Number).with_default(0)],
    )
    .unwrap();
    let backend = MockBackend::from_chunks([r#"{"amount": "not-a-number"}"#]);
    let extractor = ExtractorBuilder::new("mock-key")
        .with_backend(Arc::new(backend))
        .with_schema(schema)
        .build()
        .unwrap();

    let result = extractor
        .extract(&Document::new("invoice", "text"))
        .await
        .unwrap();

    assert_eq!(result.to_value(), json!({"amount": 0}));
    assert_eq!(result.warning_messages(), vec!["amount: coercion failed"]);
}

#[tokio::test]
async fn test_split_chunks_are_joined_before_parsing() {
    let backend = MockBackend::from_chunks(["{\"a\"", ": 1}"]);
    let text = StreamCollector::collect(backend.stream(CompletionRequest::new("p")).await.unwrap())
        .await
        .unwrap();

    assert_eq!(text, "{\"a\": 1}");
    assert_eq!(extract_json(&text).unwrap(), json!({"a": 1}));
}

#[tokio::test]
async fn test_stream_failure_produces_no_result() {
    let backend = MockBackend::failing_after([r#"{"date": "2023"#, r#"-01-01"}"#], 1);

    let err = extractor_with(&backend)
        .extract(&Document::new("decree", "text"))
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Stage::Stream);
    assert!(err.is_retryable());
    assert!(matches!(
        err,
        ExtractError::Stream {
            chunks_received: 1,
            ..
        }
    ));
}

#[tokio::test]
async fn test_response_without_json_is_extraction_error() {
    let backend = MockBackend::from_chunks(["I could not find a decree in this text."]);

    let err = extractor_with(&backend)
        .extract(&Document::new("decree", "text"))
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Stage::Extraction);
}

#[tokio::test]
async fn test_empty_response_is_extraction_error() {
    let backend = MockBackend::from_chunks(Vec::<String>::new());

    let err = extractor_with(&backend)
        .extract(&Document::new("decree", "text"))
        .await
        .unwrap_err();

    assert!(matches!(err, ExtractError::Extraction { .. }));
}

#[tokio::test]
async fn test_cancellation_aborts_stalled_stream() {
    let backend = MockBackend::from_chunks([r#"{"date": "#]).stalling();
    let extractor = extractor_with(&backend);

    let err = extractor
        .extract_with_cancel(
            &Document::new("decree", "text"),
            tokio::time::sleep(Duration::from_millis(20)),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ExtractError::Cancelled { chunks_received: 1 }));
    assert_eq!(err.stage(), Stage::Stream);
}

#[tokio::test]
async fn test_cancellation_aborts_slow_connection() {
    let backend =
        MockBackend::from_chunks([r#"{"date": "2023-01-01"}"#]).with_start_delay(Duration::from_secs(5));
    let extractor = extractor_with(&backend);

    let started = Instant::now();
    let err = extractor
        .extract_with_cancel(
            &Document::new("decree", "text"),
            tokio::time::sleep(Duration::from_millis(20)),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ExtractError::Cancelled { chunks_received: 0 }));
    assert_eq!(err.stage(), Stage::Stream);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(backend.requests().len(), 1);
}

#[tokio::test]
async fn test_backend_rejection_is_stream_stage() {
    let backend = MockBackend::new(|_| Err(ExtractError::stream("quota exhausted", 0)));

    let err = extractor_with(&backend)
        .extract(&Document::new("decree", "text"))
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Stage::Stream);
}

#[tokio::test]
async fn test_explicit_schema_bypasses_registry() {
    let backend = MockBackend::from_chunks([r#"{"subject": "  Road works  ", "extra": 1}"#]);
    let extractor = ExtractorBuilder::new("mock-key")
        .with_backend(Arc::new(backend.clone()))
        .build()
        .unwrap();
    let schema = Schema::new(
        "circular",
        vec![FieldSpec::new("subject", FieldType::String).with_default("")],
    )
    .unwrap();

    let result = extractor
        .extract_with_schema(&Document::new("circular", "text"), &schema, PromptStyle::Guarded)
        .await
        .unwrap();

    assert_eq!(result.to_value(), json!({"subject": "Road works"}));
    assert!(backend.requests()[0]
        .prompt
        .contains("Do not hallucinate content."));
}

#[tokio::test]
async fn test_extra_rules_reach_prompt() {
    let backend = MockBackend::from_chunks(["{}"]);
    let extractor = ExtractorBuilder::new("mock-key")
        .with_backend(Arc::new(backend.clone()))
        .with_schema(date_amount_schema())
        .with_rule("Keep the original article order.")
        .with_max_output_tokens(4096)
        .build()
        .unwrap();

    extractor
        .extract(&Document::new("decree", "text"))
        .await
        .unwrap();

    let request = &backend.requests()[0];
    assert!(request.prompt.contains("- Keep the original article order."));
    assert_eq!(request.max_output_tokens, 4096);
}
