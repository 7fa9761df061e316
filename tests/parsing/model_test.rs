//! Model-assisted parser: forced JSON contract and degraded fallbacks.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal_macros::dec;
use serde_json::{json, Map, Value};

use gastos::parsing::model::{interpret_reply, ModelLimits, ModelParser};
use gastos::parsing::{
    coerce_amount, coerce_confidence, coerce_currency, coerce_date, reply_object,
};
use gastos::providers::ResponseFormat;

use crate::support::{taxonomy, ScriptedProvider, TZ};

fn parser(provider: &Arc<ScriptedProvider>) -> ModelParser {
    ModelParser::new(
        Arc::clone(provider) as Arc<dyn gastos::providers::LlmProvider>,
        taxonomy(),
        "MXN".to_owned(),
        ModelLimits {
            temperature: 0.1,
            max_tokens: 300,
        },
    )
}

fn noon() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 15)
        .and_then(|d| d.and_hms_opt(12, 30, 0))
        .expect("valid timestamp")
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

#[tokio::test]
async fn well_formed_reply_becomes_candidate() {
    let provider = ScriptedProvider::replying(
        r#"{"amount": 250.5, "currency": "mxn", "description": "Cena con amigos",
            "category": "Comida", "merchant": "La Casa", "date": "2024-03-10",
            "confidence": 0.9, "needs_clarification": false}"#,
    );
    let candidate = parser(&provider).parse("cena de 250.50 en la casa", TZ).await;

    assert!(candidate.is_actionable());
    assert_eq!(candidate.amount, dec!(250.5));
    assert_eq!(candidate.currency, "MXN");
    assert_eq!(candidate.description, "Cena con amigos");
    assert_eq!(candidate.category, "Alimentación");
    assert_eq!(candidate.merchant.as_deref(), Some("La Casa"));
    assert_eq!(
        candidate.occurred_at.date(),
        NaiveDate::from_ymd_opt(2024, 3, 10).expect("valid date")
    );
    assert!((candidate.confidence - 0.9).abs() < f64::EPSILON);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn request_forces_json_and_lists_categories() {
    let provider = ScriptedProvider::replying(r#"{"amount": 10}"#);
    let _ = parser(&provider).parse("10 de algo", TZ).await;

    let request = provider.last_request().expect("request should be recorded");
    assert_eq!(request.response_format, ResponseFormat::JsonObject);
    assert_eq!(request.max_tokens, Some(300));
    let system = request.system.expect("system prompt");
    assert!(system.contains("Fecha actual"));
    assert!(system.contains("Alimentación, Transporte"));
    assert!(system.contains("America/Mexico_City"));
    assert_eq!(request.messages.len(), 1);
    assert_eq!(request.messages[0].content, "10 de algo");
}

#[tokio::test]
async fn fenced_reply_is_accepted() {
    let provider = ScriptedProvider::replying(
        "```json\n{\"amount\": \"$80\", \"description\": \"Taxi\", \"category\": \"Transporte\"}\n```",
    );
    let candidate = parser(&provider).parse("taxi ochenta", TZ).await;
    assert_eq!(candidate.amount, dec!(80));
    assert_eq!(candidate.category, "Transporte");
}

#[tokio::test]
async fn provider_failure_degrades_to_clarification() {
    let provider = ScriptedProvider::failing(503);
    let candidate = parser(&provider).parse("gasté en algo", TZ).await;

    assert!(!candidate.is_actionable());
    assert!(candidate.needs_clarification);
    assert_eq!(candidate.amount, dec!(0));
    assert_eq!(candidate.category, "Otros");
    assert_eq!(candidate.currency, "MXN");
    let prompt = candidate.clarification_prompt.expect("prompt");
    assert!(prompt.starts_with("No pude procesar tu mensaje"));
    assert!(prompt.contains("503"));
}

#[tokio::test]
async fn non_json_reply_degrades_to_clarification() {
    let provider = ScriptedProvider::replying("Claro, fueron 100 pesos.");
    let candidate = parser(&provider).parse("100 pesos", TZ).await;
    assert!(candidate.needs_clarification);
    assert!(candidate.clarification_prompt.is_some());
}

#[test]
fn missing_confidence_defaults_to_half() {
    let reply = object(json!({"amount": 90, "description": "Pan", "category": "Alimentación"}));
    let candidate = interpret_reply(&reply, "pan 90", noon(), "MXN", &taxonomy());
    assert!(candidate.is_actionable());
    assert!((candidate.confidence - 0.5).abs() < f64::EPSILON);
}

#[test]
fn missing_amount_forces_clarification() {
    let reply = object(json!({"amount": 0, "description": "algo", "needs_clarification": false}));
    let candidate = interpret_reply(&reply, "algo", noon(), "MXN", &taxonomy());
    assert!(candidate.needs_clarification);
    assert!(candidate
        .clarification_prompt
        .as_deref()
        .is_some_and(|p| p.contains("monto")));
}

#[test]
fn model_question_is_kept() {
    let reply = object(json!({
        "amount": 0,
        "needs_clarification": true,
        "clarification_question": "¿Cuánto pagaste por el libro?"
    }));
    let candidate = interpret_reply(&reply, "compré un libro", noon(), "MXN", &taxonomy());
    assert_eq!(
        candidate.clarification_prompt.as_deref(),
        Some("¿Cuánto pagaste por el libro?")
    );
}

#[test]
fn missing_fields_take_defaults() {
    let reply = object(json!({"amount": "45", "category": "Viajes espaciales", "date": "ayer"}));
    let candidate = interpret_reply(&reply, "  cohete de juguete  ", noon(), "MXN", &taxonomy());
    assert!(candidate.is_actionable());
    assert_eq!(candidate.category, "Otros");
    assert_eq!(candidate.currency, "MXN");
    assert_eq!(candidate.description, "cohete de juguete");
    assert_eq!(candidate.occurred_at, noon());
    assert_eq!(candidate.merchant, None);
    assert!(candidate.clarification_prompt.is_none());
}

#[test]
fn coercion_helpers() {
    assert_eq!(coerce_amount(Some(&json!("$1 234,50"))), dec!(1234.50));
    assert_eq!(coerce_amount(Some(&json!(null))), dec!(0));
    assert_eq!(coerce_currency(Some(&json!("usd")), "MXN"), "USD");
    assert_eq!(coerce_currency(Some(&json!("pesos")), "MXN"), "MXN");
    assert!((coerce_confidence(Some(&json!(1.7)), 0.8) - 1.0).abs() < f64::EPSILON);
    assert!((coerce_confidence(None, 0.8) - 0.8).abs() < f64::EPSILON);

    let full = coerce_date(Some(&json!("2024-01-05T10:30:00")), noon());
    assert_eq!(full.format("%Y-%m-%d %H:%M").to_string(), "2024-01-05 10:30");
    let date_only = coerce_date(Some(&json!("2024-01-05")), noon());
    assert_eq!(date_only.format("%Y-%m-%d %H:%M").to_string(), "2024-01-05 12:30");
}

#[test]
fn reply_object_rejects_non_objects() {
    assert!(reply_object("[1, 2]").is_err());
    assert!(reply_object("not json").is_err());
    assert!(reply_object(" {\"a\": 1} ").is_ok());
}
