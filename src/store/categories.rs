//! Category seeding and lookup.

use tracing::debug;

use crate::parsing::category::Taxonomy;

use super::{Category, Store, StoreError};

type CategoryRow = (i64, String, String, String, bool);

fn category_from_row(row: CategoryRow) -> Result<Category, StoreError> {
    let (id, name, emoji, keywords, is_income) = row;
    let keywords: Vec<String> =
        serde_json::from_str(&keywords).map_err(|e| StoreError::InvalidKeywords {
            name: name.clone(),
            reason: e.to_string(),
        })?;
    Ok(Category {
        id,
        name,
        emoji,
        keywords,
        is_income,
    })
}

impl Store {
    /// Insert taxonomy entries that are not stored yet. Existing rows are
    /// left untouched, so seeding is safe on every start.
    ///
    /// Returns the number of categories inserted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    pub async fn seed_categories(&self, taxonomy: &Taxonomy) -> Result<u64, StoreError> {
        let mut inserted: u64 = 0;
        for (position, def) in (0_i64..).zip(taxonomy.iter()) {
            let keywords = serde_json::to_string(&def.keywords).map_err(|e| {
                StoreError::InvalidKeywords {
                    name: def.name.clone(),
                    reason: e.to_string(),
                }
            })?;
            let result = sqlx::query(
                "INSERT INTO categories (name, emoji, keywords, is_income, position) \
                 VALUES (?1, ?2, ?3, ?4, ?5) ON CONFLICT(name) DO NOTHING",
            )
            .bind(&def.name)
            .bind(&def.emoji)
            .bind(keywords)
            .bind(def.is_income)
            .bind(position)
            .execute(&self.pool)
            .await?;
            inserted = inserted.saturating_add(result.rows_affected());
        }
        debug!(inserted, "categories seeded");
        Ok(inserted)
    }

    /// Active categories in taxonomy order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on query failure or a corrupt keyword list.
    pub async fn list_categories(&self) -> Result<Vec<Category>, StoreError> {
        let rows: Vec<CategoryRow> = sqlx::query_as(
            "SELECT id, name, emoji, keywords, is_income FROM categories \
             WHERE is_active = 1 ORDER BY position, id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(category_from_row).collect()
    }

    /// Look up a category by canonical name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on query failure or a corrupt keyword list.
    pub async fn category_by_name(&self, name: &str) -> Result<Option<Category>, StoreError> {
        let row: Option<CategoryRow> = sqlx::query_as(
            "SELECT id, name, emoji, keywords, is_income FROM categories WHERE name = ?1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        row.map(category_from_row).transpose()
    }

    /// Look up a category by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on query failure or a corrupt keyword list.
    pub async fn category(&self, id: i64) -> Result<Option<Category>, StoreError> {
        let row: Option<CategoryRow> = sqlx::query_as(
            "SELECT id, name, emoji, keywords, is_income FROM categories WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(category_from_row).transpose()
    }
}
