//! Turning free text and emails into expense candidates.
//!
//! - [`category`] — closed taxonomy and keyword matcher
//! - [`fast_path`] — regex parser for common phrasings
//! - [`model`] — model-assisted parser with a forced-JSON contract
//! - [`invoice`] — invoice email interpreter
//!
//! [`ExpenseParser`] combines the fast path and the model: regex first, the
//! model only on [`FastPathOutcome::NoMatch`].

pub mod category;
pub mod fast_path;
pub mod invoice;
pub mod model;

use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use tracing::debug;

use self::fast_path::FastPathParser;
use self::model::ModelParser;

// ---------------------------------------------------------------------------
// Candidate
// ---------------------------------------------------------------------------

/// A tentative, not-yet-persisted expense extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCandidate {
    /// Amount; zero means "no amount detected".
    pub amount: Decimal,
    /// ISO currency code.
    pub currency: String,
    /// Short description.
    pub description: String,
    /// Vendor, when known.
    pub merchant: Option<String>,
    /// Canonical category name from the taxonomy.
    pub category: String,
    /// When the expense happened, as local wall-clock time.
    pub occurred_at: NaiveDateTime,
    /// Extraction confidence in `[0, 1]`.
    pub confidence: f64,
    /// The user must be asked before anything is stored.
    pub needs_clarification: bool,
    /// Question to send back when clarification is needed.
    pub clarification_prompt: Option<String>,
}

impl ParsedCandidate {
    /// Whether this candidate may be persisted as a record.
    pub fn is_actionable(&self) -> bool {
        !self.needs_clarification && self.amount > Decimal::ZERO
    }

    /// A candidate that only carries a question for the user.
    pub fn clarification(
        prompt: String,
        fallback_category: &str,
        currency: &str,
        timezone: Tz,
    ) -> Self {
        Self {
            amount: Decimal::ZERO,
            currency: currency.to_owned(),
            description: String::new(),
            merchant: None,
            category: fallback_category.to_owned(),
            occurred_at: now_local(timezone),
            confidence: 0.0,
            needs_clarification: true,
            clarification_prompt: Some(prompt),
        }
    }
}

/// Result of the regex fast path.
#[derive(Debug, Clone, PartialEq)]
pub enum FastPathOutcome {
    /// A pattern matched and produced a candidate.
    Matched(ParsedCandidate),
    /// No pattern matched; escalate to the model.
    NoMatch,
}

/// Which strategy produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseRoute {
    /// Regex fast path.
    FastPath,
    /// Model-assisted parser.
    Model,
}

/// A candidate tagged with the strategy that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutcome {
    /// The extraction.
    pub candidate: ParsedCandidate,
    /// Where it came from.
    pub route: ParseRoute,
}

// ---------------------------------------------------------------------------
// Hybrid dispatch
// ---------------------------------------------------------------------------

/// Regex-first, model-second expense parser.
pub struct ExpenseParser {
    fast_path: Option<FastPathParser>,
    model: ModelParser,
}

impl ExpenseParser {
    /// Combine a model parser with an optional fast path.
    pub fn new(fast_path: Option<FastPathParser>, model: ModelParser) -> Self {
        Self { fast_path, model }
    }

    /// Parse a chat message. Never fails; the model is called at most once,
    /// and only when no fast-path pattern matched.
    pub async fn parse(&self, text: &str, timezone: Tz) -> ParseOutcome {
        let fast = match &self.fast_path {
            Some(parser) => parser.try_parse(text),
            None => FastPathOutcome::NoMatch,
        };

        match fast {
            FastPathOutcome::Matched(candidate) => {
                debug!(amount = %candidate.amount, category = %candidate.category, "fast path matched");
                ParseOutcome {
                    candidate,
                    route: ParseRoute::FastPath,
                }
            }
            FastPathOutcome::NoMatch => ParseOutcome {
                candidate: self.model.parse(text, timezone).await,
                route: ParseRoute::Model,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Current wall-clock time in `timezone`.
pub fn now_local(timezone: Tz) -> NaiveDateTime {
    Utc::now().with_timezone(&timezone).naive_local()
}

/// Upper-case the first character, keep the rest.
pub fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// First `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Model reply could not be turned into a candidate.
#[derive(Debug, thiserror::Error)]
pub enum ReplyError {
    /// Not a JSON object.
    #[error("invalid JSON reply: {0}")]
    InvalidJson(String),
}

/// Parse a model reply into a JSON object, tolerating Markdown code fences.
///
/// # Errors
///
/// Returns [`ReplyError::InvalidJson`] when the reply is not a JSON object.
pub fn reply_object(reply: &str) -> Result<Map<String, Value>, ReplyError> {
    let trimmed = reply.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed);

    match serde_json::from_str::<Value>(unfenced.trim()) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ReplyError::InvalidJson(format!(
            "expected object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(ReplyError::InvalidJson(e.to_string())),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Coerce a JSON value to an amount; anything unusable becomes zero.
pub fn coerce_amount(value: Option<&Value>) -> Decimal {
    let parsed = match value {
        Some(Value::Number(n)) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        Some(Value::String(s)) => {
            let cleaned: String = s
                .trim()
                .trim_start_matches('$')
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect();
            Decimal::from_str(&cleaned.replace(',', ".")).ok()
        }
        _ => None,
    };
    parsed.unwrap_or(Decimal::ZERO)
}

/// Non-empty trimmed string, treating `"null"` as absent.
pub fn coerce_text(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
                None
            } else {
                Some(trimmed.to_owned())
            }
        }
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// Boolean from a JSON bool or a `"true"`/`"false"` string.
pub fn coerce_bool(value: Option<&Value>) -> Option<bool> {
    match value {
        Some(Value::Bool(b)) => Some(*b),
        Some(Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" | "sí" | "si" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Confidence clamped to `[0, 1]`.
pub fn coerce_confidence(value: Option<&Value>, default: f64) -> f64 {
    let raw = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    raw.filter(|c| c.is_finite())
        .map_or(default, |c| c.clamp(0.0, 1.0))
}

/// Three-letter currency code, upper-cased, or `default`.
pub fn coerce_currency(value: Option<&Value>, default: &str) -> String {
    coerce_text(value)
        .map(|c| c.to_uppercase())
        .filter(|c| c.len() == 3 && c.chars().all(|ch| ch.is_ascii_alphabetic()))
        .unwrap_or_else(|| default.to_owned())
}

/// `YYYY-MM-DD` (optionally with a time) combined with `now`'s time of day;
/// missing or unparsable dates become `now`.
pub fn coerce_date(value: Option<&Value>, now: NaiveDateTime) -> NaiveDateTime {
    let Some(raw) = coerce_text(value) else {
        return now;
    };
    if let Ok(full) = NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S") {
        return full;
    }
    if let Ok(full) = NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S") {
        return full;
    }
    let date_part = raw.get(..10).unwrap_or(&raw);
    match NaiveDate::parse_from_str(date_part, "%Y-%m-%d") {
        Ok(date) => date.and_time(now.time()),
        Err(_) => now,
    }
}
