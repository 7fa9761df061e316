//! Regex fast path coverage.

use rust_decimal_macros::dec;

use gastos::parsing::fast_path::{
    detect_merchant, parse_amount, FastPathParser, FALLBACK_CONFIDENCE, MATCHED_CONFIDENCE,
};
use gastos::parsing::{FastPathOutcome, ParsedCandidate};

use crate::support::{taxonomy, TZ};

fn parser() -> FastPathParser {
    FastPathParser::new(taxonomy(), "MXN".to_owned(), TZ)
}

fn matched(text: &str) -> ParsedCandidate {
    match parser().try_parse(text) {
        FastPathOutcome::Matched(candidate) => candidate,
        FastPathOutcome::NoMatch => panic!("expected a match for {text:?}"),
    }
}

#[test]
fn verb_led_phrase_with_currency_word() {
    let candidate = matched("Gasté 150 pesos en uber");
    assert_eq!(candidate.amount, dec!(150));
    assert_eq!(candidate.currency, "MXN");
    assert_eq!(candidate.description, "Uber");
    assert_eq!(candidate.merchant.as_deref(), Some("Uber"));
    assert_eq!(candidate.category, "Transporte");
    assert!((candidate.confidence - MATCHED_CONFIDENCE).abs() < f64::EPSILON);
    assert!(candidate.is_actionable());
}

#[test]
fn amount_led_phrase_with_decimal_comma() {
    let candidate = matched("12,5 de café");
    assert_eq!(candidate.amount, dec!(12.5));
    assert_eq!(candidate.description, "Café");
    assert_eq!(candidate.category, "Alimentación");
}

#[test]
fn dollar_prefixed_amount() {
    let candidate = matched("$99.50 netflix");
    assert_eq!(candidate.amount, dec!(99.50));
    assert_eq!(candidate.category, "Entretenimiento");
    assert_eq!(candidate.merchant.as_deref(), Some("Netflix"));
}

#[test]
fn trailing_amount() {
    let candidate = matched("uber 85");
    assert_eq!(candidate.amount, dec!(85));
    assert_eq!(candidate.description, "Uber");
}

#[test]
fn english_phrase_with_usd() {
    let candidate = matched("spent 20 usd on books");
    assert_eq!(candidate.amount, dec!(20));
    assert_eq!(candidate.currency, "USD");
}

#[test]
fn unknown_description_gets_fallback_confidence() {
    let candidate = matched("200 en varios");
    assert_eq!(candidate.category, "Otros");
    assert!((candidate.confidence - FALLBACK_CONFIDENCE).abs() < f64::EPSILON);
}

#[test]
fn free_text_and_zero_amounts_do_not_match() {
    let p = parser();
    for text in ["hola", "", "   ", "0 en uber", "ayer cené en un restaurante caro"] {
        assert_eq!(p.try_parse(text), FastPathOutcome::NoMatch, "text {text:?}");
    }
}

#[test]
fn parse_amount_accepts_both_separators() {
    assert_eq!(parse_amount("1,5"), Some(dec!(1.5)));
    assert_eq!(parse_amount(" 42.10 "), Some(dec!(42.10)));
    assert_eq!(parse_amount("-3"), None);
    assert_eq!(parse_amount("0"), None);
    assert_eq!(parse_amount("abc"), None);
}

#[test]
fn detect_merchant_title_cases_multiword_names() {
    assert_eq!(
        detect_merchant("pedido en mercado libre").as_deref(),
        Some("Mercado Libre")
    );
    assert_eq!(detect_merchant("tienda de la esquina"), None);
}
