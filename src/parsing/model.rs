//! Model-assisted expense parser.
//!
//! Sends the message with a fixed Spanish instruction template and a forced
//! JSON response, then normalizes whatever comes back. Any failure, from
//! transport errors to malformed JSON, yields a clarification candidate
//! instead of an error.

use std::sync::Arc;

use chrono::NaiveDateTime;
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use tracing::warn;

use crate::providers::{CompletionRequest, LlmProvider, Message, ResponseFormat};

use super::category::Taxonomy;
use super::{
    coerce_amount, coerce_bool, coerce_confidence, coerce_currency, coerce_date, coerce_text,
    now_local, reply_object, truncate_chars, ParsedCandidate,
};

/// Characters of the error message shown in a degraded clarification prompt.
pub const ERROR_SNIPPET_CHARS: usize = 50;
const DEFAULT_CONFIDENCE: f64 = 0.5;
const DEFAULT_CLARIFICATION: &str = "¿Podrías indicar el monto y la descripción del gasto?";
const MISSING_AMOUNT_CLARIFICATION: &str =
    "No identifiqué el monto. ¿Cuánto fue y en qué lo gastaste?";

/// Sampling and output limits for extraction calls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelLimits {
    /// Sampling temperature.
    pub temperature: f32,
    /// Output token cap.
    pub max_tokens: u32,
}

impl Default for ModelLimits {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 300,
        }
    }
}

/// Parser that delegates extraction to a language model.
pub struct ModelParser {
    provider: Arc<dyn LlmProvider>,
    taxonomy: Arc<Taxonomy>,
    default_currency: String,
    limits: ModelLimits,
}

impl ModelParser {
    /// Create a model parser.
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        taxonomy: Arc<Taxonomy>,
        default_currency: String,
        limits: ModelLimits,
    ) -> Self {
        Self {
            provider,
            taxonomy,
            default_currency,
            limits,
        }
    }

    /// Extract a candidate from `text`. Always returns a candidate.
    pub async fn parse(&self, text: &str, timezone: Tz) -> ParsedCandidate {
        let now = now_local(timezone);
        let request = CompletionRequest {
            messages: vec![Message::user(text)],
            system: Some(system_prompt(&self.taxonomy, timezone, now, &self.default_currency)),
            max_tokens: Some(self.limits.max_tokens),
            temperature: Some(self.limits.temperature),
            response_format: ResponseFormat::JsonObject,
        };

        let reply = match self.provider.complete(request).await {
            Ok(response) => response.text,
            Err(e) => {
                warn!(error = %e, model = self.provider.model_id(), "expense extraction call failed");
                return self.degraded(&e.to_string(), timezone);
            }
        };

        match reply_object(&reply) {
            Ok(object) => {
                interpret_reply(&object, text, now, &self.default_currency, &self.taxonomy)
            }
            Err(e) => {
                warn!(error = %e, "expense extraction reply was not usable JSON");
                self.degraded(&e.to_string(), timezone)
            }
        }
    }

    fn degraded(&self, error: &str, timezone: Tz) -> ParsedCandidate {
        ParsedCandidate::clarification(
            degraded_prompt(error),
            &self.taxonomy.fallback().name,
            &self.default_currency,
            timezone,
        )
    }
}

/// User-facing question for a failed extraction, with a short error snippet.
pub fn degraded_prompt(error: &str) -> String {
    format!(
        "No pude procesar tu mensaje. ¿Podrías indicar el monto y descripción del gasto? (Error: {})",
        truncate_chars(error, ERROR_SNIPPET_CHARS)
    )
}

/// Instruction template for chat message extraction.
pub fn system_prompt(
    taxonomy: &Taxonomy,
    timezone: Tz,
    now: NaiveDateTime,
    default_currency: &str,
) -> String {
    format!(
        "Eres un asistente que extrae información de gastos e ingresos personales a partir de mensajes en español.\n\
         Fecha actual: {date} (zona horaria {tz}).\n\
         Categorías permitidas: {categories}.\n\
         Responde SOLO con un objeto JSON con estos campos:\n\
         {{\"amount\": número, \"currency\": código de 3 letras (por defecto {currency}), \
         \"description\": texto breve, \"category\": una de las categorías permitidas, \
         \"merchant\": comercio o null, \"date\": \"YYYY-MM-DD\", \"confidence\": 0 a 1, \
         \"needs_clarification\": true/false, \"clarification_question\": pregunta o null}}\n\
         Interpreta fechas relativas (\"ayer\", \"el lunes\") respecto a la fecha actual.\n\
         Si no hay un monto claro, usa amount 0 y needs_clarification true con una pregunta breve.",
        date = now.format("%Y-%m-%d"),
        tz = timezone.name(),
        categories = taxonomy.prompt_list(),
        currency = default_currency,
    )
}

/// Normalize a decoded model reply into a candidate.
///
/// Missing or invalid fields take defaults; the stated category is mapped onto
/// the closed taxonomy; a non-positive amount always asks for clarification.
pub fn interpret_reply(
    object: &Map<String, Value>,
    original_text: &str,
    now: NaiveDateTime,
    default_currency: &str,
    taxonomy: &Taxonomy,
) -> ParsedCandidate {
    let amount = coerce_amount(object.get("amount"));
    let category = coerce_text(object.get("category"))
        .map(|stated| taxonomy.resolve(&stated).name.clone())
        .unwrap_or_else(|| taxonomy.fallback().name.clone());

    let mut needs_clarification = coerce_bool(object.get("needs_clarification")).unwrap_or(false);
    let mut clarification_prompt = coerce_text(object.get("clarification_question"));

    if amount <= Decimal::ZERO {
        needs_clarification = true;
        if clarification_prompt.is_none() {
            clarification_prompt = Some(MISSING_AMOUNT_CLARIFICATION.to_owned());
        }
    }
    if needs_clarification && clarification_prompt.is_none() {
        clarification_prompt = Some(DEFAULT_CLARIFICATION.to_owned());
    }
    if !needs_clarification {
        clarification_prompt = None;
    }

    ParsedCandidate {
        amount: amount.max(Decimal::ZERO),
        currency: coerce_currency(object.get("currency"), default_currency),
        description: coerce_text(object.get("description"))
            .unwrap_or_else(|| truncate_chars(original_text.trim(), 100)),
        merchant: coerce_text(object.get("merchant")),
        category,
        occurred_at: coerce_date(object.get("date"), now),
        confidence: coerce_confidence(object.get("confidence"), DEFAULT_CONFIDENCE),
        needs_clarification,
        clarification_prompt,
    }
}
