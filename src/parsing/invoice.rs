//! Invoice email interpreter.
//!
//! Like the model parser, but fed with an email (and the text of its first
//! PDF attachment) and gated on `is_invoice`. Failures return `None`: the
//! background scan has nobody to ask.

use std::sync::Arc;

use chrono::NaiveDateTime;
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::mailbox::message::{pdf_text, MAX_BODY_CHARS};
use crate::mailbox::MailMessage;
use crate::providers::{CompletionRequest, LlmProvider, Message, ResponseFormat};

use super::category::Taxonomy;
use super::model::ModelLimits;
use super::{
    coerce_amount, coerce_bool, coerce_confidence, coerce_currency, coerce_date, coerce_text,
    now_local, reply_object, truncate_chars, ParsedCandidate,
};

/// Merchant recorded when the email does not name one.
pub const UNKNOWN_MERCHANT: &str = "Desconocido";
const DEFAULT_CONFIDENCE: f64 = 0.8;
const DESCRIPTION_CHARS: usize = 100;

/// Model-backed interpreter for invoice-like emails.
pub struct InvoiceInterpreter {
    provider: Arc<dyn LlmProvider>,
    taxonomy: Arc<Taxonomy>,
    default_currency: String,
    limits: ModelLimits,
}

impl InvoiceInterpreter {
    /// Create an interpreter.
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

    /// Extract an expense from `email`, or `None` when it is not a purchase
    /// or anything goes wrong.
    pub async fn parse_invoice(&self, email: &MailMessage, timezone: Tz) -> Option<ParsedCandidate> {
        let attachment_text = pdf_text(email).await;
        let now = now_local(timezone);
        let received = email
            .date
            .map(|d| d.with_timezone(&timezone).naive_local())
            .unwrap_or(now);

        let request = CompletionRequest {
            messages: vec![Message::user(email_context(email, attachment_text.as_deref()))],
            system: Some(system_prompt(
                &self.taxonomy,
                timezone,
                now,
                &self.default_currency,
            )),
            max_tokens: Some(self.limits.max_tokens),
            temperature: Some(self.limits.temperature),
            response_format: ResponseFormat::JsonObject,
        };

        let reply = match self.provider.complete(request).await {
            Ok(response) => response.text,
            Err(e) => {
                warn!(error = %e, email = %email.id, "invoice extraction call failed");
                return None;
            }
        };

        let object = match reply_object(&reply) {
            Ok(object) => object,
            Err(e) => {
                warn!(error = %e, email = %email.id, "invoice reply was not usable JSON");
                return None;
            }
        };

        let candidate = interpret_invoice_reply(
            &object,
            &email.subject,
            received,
            &self.default_currency,
            &self.taxonomy,
        );
        if candidate.is_none() {
            debug!(email = %email.id, "email is not an invoice");
        }
        candidate
    }
}

/// User message describing the email, body capped, PDF text appended.
pub fn email_context(email: &MailMessage, attachment_text: Option<&str>) -> String {
    let date = email
        .date
        .map(|d| d.to_rfc2822())
        .unwrap_or_else(|| "desconocida".to_owned());
    let mut context = format!(
        "Asunto: {}\nDe: {}\nFecha: {}\n\nContenido:\n{}",
        email.subject,
        email.sender,
        date,
        truncate_chars(&email.body, MAX_BODY_CHARS)
    );
    if let Some(pdf) = attachment_text {
        context.push_str("\n\nTexto del PDF adjunto:\n");
        context.push_str(pdf);
    }
    context
}

/// Instruction template for invoice extraction.
pub fn system_prompt(
    taxonomy: &Taxonomy,
    timezone: Tz,
    now: NaiveDateTime,
    default_currency: &str,
) -> String {
    format!(
        "Analizas correos electrónicos para detectar compras, cargos o pagos del usuario.\n\
         Fecha actual: {date} (zona horaria {tz}).\n\
         Reconoce estos formatos y extrae el monto total y el comercio de cada uno:\n\
         - facturas formales (CFDI, factura electrónica): total a pagar y emisor;\n\
         - notificaciones de cargo a tarjeta del banco: monto del cargo y comercio;\n\
         - notificaciones de transferencia o SPEI enviadas: monto y beneficiario;\n\
         - confirmaciones de compra, pedido o suscripción: total y tienda.\n\
         Boletines, promociones, estados de cuenta sin cargo concreto y correos personales NO son compras.\n\
         Categorías permitidas: {categories}.\n\
         Responde SOLO con un objeto JSON:\n\
         {{\"is_invoice\": true/false, \"amount\": número, \"currency\": código de 3 letras (por defecto {currency}), \
         \"merchant\": comercio, \"description\": texto breve, \"category\": una de las categorías permitidas, \
         \"date\": \"YYYY-MM-DD\", \"confidence\": 0 a 1}}",
        date = now.format("%Y-%m-%d"),
        tz = timezone.name(),
        categories = taxonomy.prompt_list(),
        currency = default_currency,
    )
}

/// Normalize a decoded invoice reply; `None` for an explicit non-invoice or a
/// non-positive amount. A missing `is_invoice` counts as an invoice.
pub fn interpret_invoice_reply(
    object: &Map<String, Value>,
    subject: &str,
    received: NaiveDateTime,
    default_currency: &str,
    taxonomy: &Taxonomy,
) -> Option<ParsedCandidate> {
    if !coerce_bool(object.get("is_invoice")).unwrap_or(true) {
        return None;
    }
    let amount = coerce_amount(object.get("amount"));
    if amount <= Decimal::ZERO {
        return None;
    }

    let category = coerce_text(object.get("category"))
        .map(|stated| taxonomy.resolve(&stated).name.clone())
        .unwrap_or_else(|| taxonomy.fallback().name.clone());

    Some(ParsedCandidate {
        amount,
        currency: coerce_currency(object.get("currency"), default_currency),
        description: coerce_text(object.get("description"))
            .unwrap_or_else(|| truncate_chars(subject, DESCRIPTION_CHARS)),
        merchant: Some(
            coerce_text(object.get("merchant")).unwrap_or_else(|| UNKNOWN_MERCHANT.to_owned()),
        ),
        category,
        occurred_at: coerce_date(object.get("date"), received),
        confidence: coerce_confidence(object.get("confidence"), DEFAULT_CONFIDENCE),
        needs_clarification: false,
        clarification_prompt: None,
    })
}
