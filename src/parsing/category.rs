//! Closed category taxonomy and keyword matching.
//!
//! Matching is a lower-cased substring test of each keyword, walking the
//! categories in declaration order (expense taxonomy first, then income).
//! The first hit wins; no hit yields the fallback category.

use crate::config::{CategoryConfig, Config};

const FALLBACK_EMOJI: &str = "📦";
const MIN_PARTIAL_NAME_CHARS: usize = 4;

/// A category as the parser sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryDef {
    /// Canonical name.
    pub name: String,
    /// Display emoji.
    pub emoji: String,
    /// Lower-cased keywords.
    pub keywords: Vec<String>,
    /// Whether records in this category count as income.
    pub is_income: bool,
}

impl CategoryDef {
    fn from_config(config: CategoryConfig, is_income: bool) -> Self {
        Self {
            name: config.name.trim().to_owned(),
            emoji: config.emoji,
            keywords: config
                .keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
            is_income,
        }
    }

    /// `"{emoji} {name}"`, or just the name when no emoji is set.
    pub fn label(&self) -> String {
        if self.emoji.is_empty() {
            self.name.clone()
        } else {
            format!("{} {}", self.emoji, self.name)
        }
    }
}

/// The fixed set of categories a candidate may resolve to.
#[derive(Debug, Clone)]
pub struct Taxonomy {
    entries: Vec<CategoryDef>,
    fallback: usize,
}

impl Taxonomy {
    /// Build a taxonomy. The fallback category is appended to the expense
    /// list when it is not already declared there.
    pub fn new(
        expense: Vec<CategoryConfig>,
        income: Vec<CategoryConfig>,
        fallback_name: &str,
    ) -> Self {
        let mut entries: Vec<CategoryDef> = expense
            .into_iter()
            .map(|c| CategoryDef::from_config(c, false))
            .collect();

        let fallback = match entries
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(fallback_name))
        {
            Some(index) => index,
            None => {
                entries.push(CategoryDef {
                    name: fallback_name.to_owned(),
                    emoji: FALLBACK_EMOJI.to_owned(),
                    keywords: Vec::new(),
                    is_income: false,
                });
                entries.len().saturating_sub(1)
            }
        };

        for config in income {
            let def = CategoryDef::from_config(config, true);
            if !entries.iter().any(|c| c.name == def.name) {
                entries.push(def);
            }
        }

        Self { entries, fallback }
    }

    /// Build the taxonomy described by a configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.expense_categories(),
            config.income_categories(),
            &config.parser.fallback_category,
        )
    }

    /// All categories in matching order.
    pub fn iter(&self) -> impl Iterator<Item = &CategoryDef> {
        self.entries.iter()
    }

    /// The catch-all category.
    pub fn fallback(&self) -> &CategoryDef {
        // `fallback` is always a valid index: `new` inserts the entry when missing.
        &self.entries[self.fallback]
    }

    /// Whether `name` is the catch-all category.
    pub fn is_fallback(&self, name: &str) -> bool {
        self.fallback().name == name
    }

    /// Look up a category by exact canonical name.
    pub fn get(&self, name: &str) -> Option<&CategoryDef> {
        self.entries.iter().find(|c| c.name == name)
    }

    /// Keyword match over free text.
    pub fn match_text(&self, text: &str) -> &CategoryDef {
        let lowered = text.to_lowercase();
        self.entries
            .iter()
            .find(|c| c.keywords.iter().any(|k| lowered.contains(k.as_str())))
            .unwrap_or_else(|| self.fallback())
    }

    /// Map a model-stated category name onto the closed set.
    ///
    /// Tries, in order: exact name (case-insensitive, leading emoji ignored),
    /// name containment in either direction, the keyword matcher, and finally
    /// the fallback.
    pub fn resolve(&self, stated: &str) -> &CategoryDef {
        let cleaned = stated
            .trim()
            .trim_start_matches(|c: char| !c.is_alphanumeric())
            .trim()
            .to_lowercase();
        if cleaned.is_empty() {
            return self.fallback();
        }

        if let Some(exact) = self
            .entries
            .iter()
            .find(|c| c.name.to_lowercase() == cleaned)
        {
            return exact;
        }

        if let Some(contained) = self.entries.iter().find(|c| {
            let name = c.name.to_lowercase();
            cleaned.contains(&name)
                || (cleaned.chars().count() >= MIN_PARTIAL_NAME_CHARS && name.contains(&cleaned))
        }) {
            return contained;
        }

        self.match_text(&cleaned)
    }

    /// Comma-separated canonical names, for model prompts.
    pub fn prompt_list(&self) -> String {
        self.entries
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
