//! Regex fast path for the common "amount + description" phrasings.
//!
//! Pure and synchronous. A [`FastPathOutcome::NoMatch`] tells the caller to
//! escalate to the model; it is never an error.

use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use chrono_tz::Tz;
use regex::{Captures, Regex};
use rust_decimal::Decimal;

use super::category::Taxonomy;
use super::{capitalize_first, now_local, FastPathOutcome, ParsedCandidate};

/// Confidence when the description hit a specific category.
pub const MATCHED_CONFIDENCE: f64 = 0.7;
/// Confidence when only the fallback category applied.
pub const FALLBACK_CONFIDENCE: f64 = 0.5;

const KNOWN_MERCHANTS: &[&str] = &[
    "uber",
    "didi",
    "rappi",
    "amazon",
    "mercado libre",
    "walmart",
    "costco",
    "oxxo",
    "netflix",
    "spotify",
    "steam",
    "apple",
    "google",
    "microsoft",
    "starbucks",
    "mcdonalds",
    "burger king",
];

struct FastPattern {
    regex: Regex,
    amount: usize,
    description: usize,
    currency: Option<usize>,
}

fn patterns() -> &'static [FastPattern] {
    static PATTERNS: OnceLock<Vec<FastPattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let specs: [(&str, usize, usize, Option<usize>); 5] = [
            // verb-led: "gasté 150 pesos en uber"
            (
                r"^(?:gast[eé]|pagu[eé]|compr[eé]|spent|paid|bought)\s+\$?\s*(\d+(?:[.,]\d{1,2})?)\s*(pesos|mxn|usd)?\s+(?:en|de|in|on|of)\s+(.+)$",
                1,
                3,
                Some(2),
            ),
            // amount-led with connector: "150 en uber"
            (
                r"^\$?\s*(\d+(?:[.,]\d{1,2})?)\s*(pesos|mxn|usd)?\s+(?:en|de|in|on|of)\s+(.+)$",
                1,
                3,
                Some(2),
            ),
            // currency-prefixed: "$150 uber"
            (r"^\$\s*(\d+(?:[.,]\d{1,2})?)\s+(.+)$", 1, 2, None),
            // bare amount then text: "150 uber"
            (r"^(\d+(?:[.,]\d{1,2})?)\s+([a-záéíóúñü].+)$", 1, 2, None),
            // bare text then amount: "uber 150"
            (
                r"^([a-záéíóúñü][a-záéíóúñü\s]+?)\s+(\d+(?:[.,]\d{1,2})?)$",
                2,
                1,
                None,
            ),
        ];
        specs
            .into_iter()
            .filter_map(|(source, amount, description, currency)| {
                Regex::new(source).ok().map(|regex| FastPattern {
                    regex,
                    amount,
                    description,
                    currency,
                })
            })
            .collect()
    })
}

/// Parse an amount with `.` or `,` as the decimal separator.
///
/// Returns `None` for anything that is not a strictly positive decimal.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let normalized = raw.trim().replace(',', ".");
    Decimal::from_str(&normalized)
        .ok()
        .filter(|amount| *amount > Decimal::ZERO)
}

/// Find a known vendor name in `text`, title-cased.
pub fn detect_merchant(text: &str) -> Option<String> {
    let lowered = text.to_lowercase();
    KNOWN_MERCHANTS
        .iter()
        .find(|merchant| lowered.contains(**merchant))
        .map(|merchant| {
            merchant
                .split(' ')
                .map(capitalize_first)
                .collect::<Vec<_>>()
                .join(" ")
        })
}

fn currency_from(captures: &Captures<'_>, group: Option<usize>, default: &str) -> String {
    match group
        .and_then(|g| captures.get(g))
        .map(|m| m.as_str())
    {
        Some("usd") => "USD".to_owned(),
        Some("pesos" | "mxn") => "MXN".to_owned(),
        _ => default.to_owned(),
    }
}

/// Regex-based parser for short expense messages.
#[derive(Debug, Clone)]
pub struct FastPathParser {
    taxonomy: Arc<Taxonomy>,
    default_currency: String,
    timezone: Tz,
}

impl FastPathParser {
    /// Create a parser over a taxonomy.
    pub fn new(taxonomy: Arc<Taxonomy>, default_currency: String, timezone: Tz) -> Self {
        Self {
            taxonomy,
            default_currency,
            timezone,
        }
    }

    /// Try each pattern in order; the first one with a parseable amount wins.
    pub fn try_parse(&self, text: &str) -> FastPathOutcome {
        let lowered = text.trim().to_lowercase();
        if lowered.is_empty() {
            return FastPathOutcome::NoMatch;
        }

        for pattern in patterns() {
            let Some(captures) = pattern.regex.captures(&lowered) else {
                continue;
            };
            let Some(amount) = captures
                .get(pattern.amount)
                .and_then(|m| parse_amount(m.as_str()))
            else {
                continue;
            };
            let description = captures
                .get(pattern.description)
                .map(|m| m.as_str().trim())
                .unwrap_or_default();
            if description.is_empty() {
                continue;
            }

            let category = self.taxonomy.match_text(description);
            let confidence = if self.taxonomy.is_fallback(&category.name) {
                FALLBACK_CONFIDENCE
            } else {
                MATCHED_CONFIDENCE
            };

            return FastPathOutcome::Matched(ParsedCandidate {
                amount,
                currency: currency_from(&captures, pattern.currency, &self.default_currency),
                description: capitalize_first(description),
                merchant: detect_merchant(description),
                category: category.name.clone(),
                occurred_at: now_local(self.timezone),
                confidence,
                needs_clarification: false,
                clarification_prompt: None,
            });
        }

        FastPathOutcome::NoMatch
    }
}
