use legal_extract::{extract_json, find_json, ExtractError};
use serde_json::{json, Value};

fn karar() -> Value {
    json!({
        "karar_number": "٤٥/٢٠٢٣",
        "issuer": "وزير الداخلية والبلديات",
        "articles": [
            {"number": 1, "text": "يُعتمد {النص} المرفق [ملحق أ]"},
            {"number": 2, "text": "يُنشر هذا القرار في \"الجريدة الرسمية\""}
        ],
        "attachments": []
    })
}

#[test]
fn test_model_commentary_variants() {
    let body = serde_json::to_string_pretty(&karar()).unwrap();
    let wrappers = [
        format!("{body}"),
        format!("Here is the extracted JSON:\n\n{body}\n\nLet me know if anything is missing."),
        format!("```json\n{body}\n```"),
        format!("Sure! The {{placeholder}} fields were left empty.\n```\n{body}\n```\nDone."),
        format!("Note: fields in [brackets] are estimates.\n{body}"),
        format!("{}{body}", "Thinking... ".repeat(500)),
    ];

    for (idx, text) in wrappers.iter().enumerate() {
        let value = extract_json(text).unwrap_or_else(|e| panic!("wrapper {idx} failed: {e}"));
        assert_eq!(value, karar(), "wrapper {idx}");
    }
}

#[test]
fn test_many_false_candidates_before_answer() {
    let noise = "{not json} [also not] ".repeat(200);
    let text = format!("{noise}{{\"ok\": true}}");
    assert_eq!(extract_json(&text).unwrap(), json!({"ok": true}));
}

#[test]
fn test_unbalanced_noise_is_not_fatal() {
    let text = "{{{{ [[[[ model got confused }} here is the answer {\"a\": [1, {\"b\": 2}]}";
    assert_eq!(extract_json(text).unwrap(), json!({"a": [1, {"b": 2}]}));
}

#[test]
fn test_truncated_output_fails() {
    let truncated = r#"Result: {"karar_number": "45", "issuer": "وزير", "articles": [{"number": 1, "te"#;
    let err = extract_json(truncated).unwrap_err();
    assert!(matches!(err, ExtractError::Extraction { .. }));
}

#[test]
fn test_span_points_at_answer() {
    let text = "prefix {\"x\": 1} suffix";
    let (span, _) = find_json(text).unwrap();
    assert_eq!(&text[span], "{\"x\": 1}");
}
