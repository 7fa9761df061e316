//! Taxonomy matching and closed-set resolution.

use gastos::config::CategoryConfig;
use gastos::parsing::category::Taxonomy;

fn taxonomy() -> Taxonomy {
    Taxonomy::default()
}

#[test]
fn keyword_match_is_case_insensitive_substring() {
    let t = taxonomy();
    assert_eq!(t.match_text("UBER al aeropuerto").name, "Transporte");
    assert_eq!(t.match_text("Consulta con el dentista").name, "Salud");
    assert_eq!(t.match_text("Suscripción de Netflix").name, "Entretenimiento");
}

#[test]
fn first_declared_category_wins_on_shared_keyword() {
    // "gas" is listed under both Transporte and Hogar.
    assert_eq!(taxonomy().match_text("gas").name, "Transporte");
}

#[test]
fn unmatched_text_falls_back() {
    let t = taxonomy();
    let category = t.match_text("algo sin pistas");
    assert_eq!(category.name, "Otros");
    assert!(t.is_fallback(&category.name));
}

#[test]
fn income_keywords_are_matched_after_expenses() {
    let t = taxonomy();
    let salary = t.match_text("depósito de nómina");
    assert_eq!(salary.name, "Salario");
    assert!(salary.is_income);
}

#[test]
fn resolve_accepts_exact_names_with_emoji_and_case() {
    let t = taxonomy();
    assert_eq!(t.resolve("🍔 Alimentación").name, "Alimentación");
    assert_eq!(t.resolve("transporte").name, "Transporte");
    assert_eq!(t.resolve("Otros ingresos").name, "Otros ingresos");
}

#[test]
fn resolve_uses_containment_then_keywords() {
    let t = taxonomy();
    assert_eq!(t.resolve("Salud y bienestar").name, "Salud");
    assert_eq!(t.resolve("Comida").name, "Alimentación");
}

#[test]
fn resolve_never_leaves_the_closed_set() {
    let t = taxonomy();
    for stated in ["Viajes espaciales", "", "   ", "🚀"] {
        let resolved = t.resolve(stated);
        assert_eq!(resolved.name, "Otros", "stated {stated:?}");
        assert!(t.get(&resolved.name).is_some());
    }
}

#[test]
fn fallback_is_appended_when_not_declared() {
    let t = Taxonomy::new(
        vec![CategoryConfig {
            name: "Mascotas".to_owned(),
            emoji: "🐶".to_owned(),
            keywords: vec!["Veterinario".to_owned(), "  ".to_owned()],
        }],
        Vec::new(),
        "Varios",
    );
    let names: Vec<&str> = t.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Mascotas", "Varios"]);
    assert_eq!(t.fallback().name, "Varios");
    assert_eq!(t.match_text("cita con el veterinario").name, "Mascotas");
    assert_eq!(t.get("Mascotas").map(|c| c.keywords.len()), Some(1));
}

#[test]
fn prompt_list_names_every_category_in_order() {
    let list = taxonomy().prompt_list();
    assert!(list.starts_with("Alimentación, Transporte, Hogar"));
    assert!(list.contains("Otros, Salario"));
}

#[test]
fn label_prefixes_emoji() {
    let t = taxonomy();
    assert_eq!(t.get("Transporte").map(|c| c.label()), Some("🚗 Transporte".to_owned()));
}
