//! Expense records and the pending-state transitions applied to them.

use chrono::{DateTime, NaiveDateTime, Utc};

use super::{
    now_utc, parse_amount, Expense, ExpenseFilter, NewExpense, PaymentMethod, SourceChannel,
    Store, StoreError,
};

#[derive(sqlx::FromRow)]
struct ExpenseRow {
    id: i64,
    user_id: i64,
    category_id: Option<i64>,
    category_name: Option<String>,
    category_emoji: Option<String>,
    amount: String,
    currency: String,
    description: String,
    merchant: Option<String>,
    source: String,
    source_ref: Option<String>,
    is_income: bool,
    is_confirmed: bool,
    is_pending: bool,
    payment_method: Option<String>,
    occurred_at: NaiveDateTime,
    original_input: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ExpenseRow> for Expense {
    type Error = StoreError;

    fn try_from(row: ExpenseRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            category_id: row.category_id,
            category_name: row.category_name,
            category_emoji: row.category_emoji,
            amount: parse_amount(&row.amount)?,
            currency: row.currency,
            description: row.description,
            merchant: row.merchant,
            source: SourceChannel::parse(&row.source)?,
            source_ref: row.source_ref,
            is_income: row.is_income,
            is_confirmed: row.is_confirmed,
            is_pending: row.is_pending,
            payment_method: row.payment_method.as_deref().map(PaymentMethod::parse_lenient),
            occurred_at: row.occurred_at,
            original_input: row.original_input,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const EXPENSE_SELECT: &str = "SELECT e.id, e.user_id, e.category_id, \
         c.name AS category_name, c.emoji AS category_emoji, \
         e.amount, e.currency, e.description, e.merchant, e.source, e.source_ref, \
         e.is_income, e.is_confirmed, e.is_pending, e.payment_method, e.occurred_at, \
         e.original_input, e.created_at, e.updated_at \
     FROM expenses e LEFT JOIN categories c ON c.id = e.category_id";

fn convert_all(rows: Vec<ExpenseRow>) -> Result<Vec<Expense>, StoreError> {
    rows.into_iter().map(Expense::try_from).collect()
}

impl Store {
    /// Create a pending, unconfirmed record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    pub async fn create_expense(&self, new: &NewExpense) -> Result<Expense, StoreError> {
        let now = now_utc();
        let id = sqlx::query(
            "INSERT INTO expenses (user_id, category_id, amount, currency, description, merchant, \
                 source, source_ref, is_income, is_confirmed, is_pending, occurred_at, \
                 original_input, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, 1, ?10, ?11, ?12, ?12)",
        )
        .bind(new.user_id)
        .bind(new.category_id)
        .bind(new.amount.to_string())
        .bind(&new.currency)
        .bind(&new.description)
        .bind(&new.merchant)
        .bind(new.source.as_str())
        .bind(&new.source_ref)
        .bind(new.is_income)
        .bind(new.occurred_at)
        .bind(&new.original_input)
        .bind(now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        self.expense(id).await?.ok_or(StoreError::NotFound {
            entity: "expense",
            id,
        })
    }

    /// Fetch a record by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on query failure or a corrupt row.
    pub async fn expense(&self, id: i64) -> Result<Option<Expense>, StoreError> {
        let row: Option<ExpenseRow> = sqlx::query_as(&format!("{EXPENSE_SELECT} WHERE e.id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Expense::try_from).transpose()
    }

    /// Fetch a record by id, only if `user_id` owns it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on query failure or a corrupt row.
    pub async fn user_expense(&self, user_id: i64, id: i64) -> Result<Option<Expense>, StoreError> {
        let row: Option<ExpenseRow> = sqlx::query_as(&format!(
            "{EXPENSE_SELECT} WHERE e.id = ?1 AND e.user_id = ?2"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Expense::try_from).transpose()
    }

    /// List a user's records, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on query failure or a corrupt row.
    pub async fn list_expenses(
        &self,
        user_id: i64,
        filter: &ExpenseFilter,
    ) -> Result<Vec<Expense>, StoreError> {
        let rows: Vec<ExpenseRow> = sqlx::query_as(&format!(
            "{EXPENSE_SELECT} WHERE e.user_id = ?1 \
               AND (?2 IS NULL OR e.occurred_at >= ?2) \
               AND (?3 IS NULL OR e.occurred_at < ?3) \
               AND (?4 IS NULL OR e.category_id = ?4) \
               AND (?5 = 0 OR e.is_confirmed = 1) \
             ORDER BY e.occurred_at DESC, e.id DESC \
             LIMIT ?6"
        ))
        .bind(user_id)
        .bind(filter.from)
        .bind(filter.until)
        .bind(filter.category_id)
        .bind(filter.confirmed_only)
        .bind(filter.limit.unwrap_or(-1))
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    /// The user's latest confirmed records.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on query failure or a corrupt row.
    pub async fn recent_confirmed(&self, user_id: i64, limit: i64) -> Result<Vec<Expense>, StoreError> {
        let filter = ExpenseFilter {
            confirmed_only: true,
            limit: Some(limit),
            ..ExpenseFilter::default()
        };
        self.list_expenses(user_id, &filter).await
    }

    /// Whether a record already exists for an external reference.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    pub async fn has_source_ref(&self, user_id: i64, source_ref: &str) -> Result<bool, StoreError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM expenses WHERE user_id = ?1 AND source_ref = ?2 LIMIT 1")
                .bind(user_id)
                .bind(source_ref)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    /// Delete one of the user's records regardless of state.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    pub async fn delete_expense(&self, user_id: i64, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM expenses WHERE id = ?1 AND user_id = ?2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete every record the user owns. Returns the count removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    pub async fn delete_all_expenses(&self, user_id: i64) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM expenses WHERE user_id = ?1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Confirm a pending record, optionally stamping the payment method, and
    /// drop its pending confirmation in the same transaction.
    ///
    /// Returns `false` when no pending record with that id belongs to the user.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    pub async fn confirm_pending(
        &self,
        user_id: i64,
        id: i64,
        payment_method: Option<&PaymentMethod>,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            "UPDATE expenses SET is_confirmed = 1, is_pending = 0, \
                 payment_method = COALESCE(?3, payment_method), updated_at = ?4 \
             WHERE id = ?1 AND user_id = ?2 AND is_pending = 1",
        )
        .bind(id)
        .bind(user_id)
        .bind(payment_method.map(PaymentMethod::as_str))
        .bind(now_utc())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("DELETE FROM pending_confirmations WHERE expense_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Hard-delete a pending record and its pending confirmation.
    ///
    /// Returns `false` when no pending record with that id belongs to the user.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    pub async fn discard_pending(&self, user_id: i64, id: i64) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "DELETE FROM pending_confirmations WHERE expense_id = ?1 AND user_id = ?2 \
               AND EXISTS (SELECT 1 FROM expenses WHERE id = ?1 AND is_pending = 1)",
        )
        .bind(id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
        let deleted =
            sqlx::query("DELETE FROM expenses WHERE id = ?1 AND user_id = ?2 AND is_pending = 1")
                .bind(id)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        tx.commit().await?;
        Ok(deleted.rows_affected() > 0)
    }

    /// Re-point a pending record at another category. The pending
    /// confirmation is kept.
    ///
    /// Returns `false` when no pending record with that id belongs to the user.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    pub async fn set_pending_category(
        &self,
        user_id: i64,
        id: i64,
        category_id: i64,
        is_income: bool,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE expenses SET category_id = ?3, is_income = ?4, updated_at = ?5 \
             WHERE id = ?1 AND user_id = ?2 AND is_pending = 1",
        )
        .bind(id)
        .bind(user_id)
        .bind(category_id)
        .bind(is_income)
        .bind(now_utc())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
