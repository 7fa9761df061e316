//! Ollama provider wire format tests.

use std::time::Duration;

use serde_json::json;
use gastos::providers::ollama::{
    build_request, parse_response, OllamaProvider, DEFAULT_OLLAMA_URL,
};
use gastos::providers::{
    CompletionRequest, LlmProvider, Message, ResponseFormat, Role, StopReason,
};

fn simple_request() -> CompletionRequest {
    CompletionRequest {
        messages: vec![Message::user("Hola")],
        system: Some("Eres un asistente financiero.".to_owned()),
        max_tokens: Some(512),
        temperature: None,
        response_format: ResponseFormat::JsonObject,
    }
}

#[test]
fn build_request_injects_system_message() {
    let req = build_request("qwen3:8b", &simple_request());
    assert_eq!(req.model, "qwen3:8b");
    assert_eq!(req.messages.len(), 2);
    assert_eq!(req.messages[0].role, "system");
    assert_eq!(req.messages[0].content, "Eres un asistente financiero.");
    assert_eq!(req.messages[1].role, "user");
    assert!(!req.stream);
}

#[test]
fn build_request_no_system_when_absent() {
    let mut request = simple_request();
    request.system = None;
    let req = build_request("model", &request);
    assert_eq!(req.messages.len(), 1);
    assert_eq!(req.messages[0].role, "user");
}

#[test]
fn build_request_sets_options_and_json_format() {
    let req = build_request("model", &simple_request());
    assert_eq!(req.format.as_deref(), Some("json"));
    let opts = req.options.expect("options should exist");
    assert_eq!(opts.num_predict, Some(512));
    assert_eq!(opts.temperature, None);
}

#[test]
fn build_request_omits_options_when_unset() {
    let request = CompletionRequest {
        messages: vec![
            Message {
                role: Role::System,
                content: "sys".to_owned(),
            },
            Message {
                role: Role::Assistant,
                content: "ast".to_owned(),
            },
        ],
        ..CompletionRequest::default()
    };
    let req = build_request("model", &request);
    assert!(req.options.is_none());
    assert!(req.format.is_none());
    assert_eq!(req.messages[0].role, "system");
    assert_eq!(req.messages[1].role, "assistant");
}

#[test]
fn parse_response_text_only() {
    let body = json!({
        "message": {"role": "assistant", "content": "{\"amount\": 80}"},
        "model": "qwen3:8b",
        "done_reason": "stop",
        "prompt_eval_count": 10,
        "eval_count": 5
    });
    let resp = parse_response(&body.to_string()).expect("should parse");
    assert_eq!(resp.text, "{\"amount\": 80}");
    assert_eq!(resp.stop_reason, StopReason::EndTurn);
    assert_eq!(resp.usage.input_tokens, 10);
    assert_eq!(resp.usage.output_tokens, 5);
}

#[test]
fn parse_response_length_maps_to_max_tokens() {
    let body = json!({
        "message": {"role": "assistant", "content": "{\"amou"},
        "model": "qwen3:8b",
        "done_reason": "length"
    });
    let resp = parse_response(&body.to_string()).expect("should parse");
    assert_eq!(resp.stop_reason, StopReason::MaxTokens);
    assert_eq!(resp.usage.input_tokens, 0);
}

#[test]
fn parse_response_rejects_missing_message() {
    let body = json!({"model": "qwen3:8b"});
    assert!(parse_response(&body.to_string()).is_err());
}

#[test]
fn provider_defaults_to_local_url() {
    let provider = OllamaProvider::new(
        "ollama/qwen3:8b".to_owned(),
        "qwen3:8b".to_owned(),
        Duration::from_secs(30),
    );
    assert_eq!(provider.base_url, DEFAULT_OLLAMA_URL);
    assert_eq!(provider.model, "qwen3:8b");
    assert_eq!(provider.model_id(), "ollama/qwen3:8b");
}
