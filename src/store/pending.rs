//! Pending confirmations and the expiry sweep.

use chrono::{DateTime, Utc};
use tracing::info;

use super::{now_utc, PendingConfirmation, Store, StoreError};

type PendingRow = (i64, i64, i64, i64, i64, DateTime<Utc>, DateTime<Utc>);

fn pending_from_row(row: PendingRow) -> PendingConfirmation {
    let (id, user_id, expense_id, chat_id, message_id, created_at, expires_at) = row;
    PendingConfirmation {
        id,
        user_id,
        expense_id,
        chat_id,
        message_id,
        created_at,
        expires_at,
    }
}

impl Store {
    /// Attach the confirmation message to a pending record. A second call for
    /// the same record replaces the message reference and restarts the clock.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    pub async fn create_confirmation(
        &self,
        user_id: i64,
        expense_id: i64,
        chat_id: i64,
        message_id: i64,
        ttl: chrono::Duration,
    ) -> Result<PendingConfirmation, StoreError> {
        let now = now_utc();
        let expires_at = now.checked_add_signed(ttl).unwrap_or(now);
        sqlx::query(
            "INSERT INTO pending_confirmations \
                 (user_id, expense_id, chat_id, message_id, created_at, expires_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT(expense_id) DO UPDATE SET \
                 chat_id = excluded.chat_id, \
                 message_id = excluded.message_id, \
                 created_at = excluded.created_at, \
                 expires_at = excluded.expires_at",
        )
        .bind(user_id)
        .bind(expense_id)
        .bind(chat_id)
        .bind(message_id)
        .bind(now)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        self.confirmation_for_expense(expense_id)
            .await?
            .ok_or(StoreError::NotFound {
                entity: "pending confirmation",
                id: expense_id,
            })
    }

    /// The confirmation attached to a record, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    pub async fn confirmation_for_expense(
        &self,
        expense_id: i64,
    ) -> Result<Option<PendingConfirmation>, StoreError> {
        let row: Option<PendingRow> = sqlx::query_as(
            "SELECT id, user_id, expense_id, chat_id, message_id, created_at, expires_at \
             FROM pending_confirmations WHERE expense_id = ?1",
        )
        .bind(expense_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(pending_from_row))
    }

    /// Remove pending records whose confirmation expired before `now`, plus
    /// pending records older than `ttl` that never got a confirmation
    /// message. Confirmed records are never touched.
    ///
    /// Returns the number of records removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    pub async fn sweep_expired(
        &self,
        now: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> Result<u64, StoreError> {
        let orphan_cutoff = now.checked_sub_signed(ttl).unwrap_or(now);
        let mut tx = self.pool.begin().await?;

        let expired = sqlx::query(
            "DELETE FROM expenses WHERE is_pending = 1 AND id IN \
                 (SELECT expense_id FROM pending_confirmations WHERE expires_at <= ?1)",
        )
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let orphaned = sqlx::query(
            "DELETE FROM expenses WHERE is_pending = 1 AND created_at <= ?1 \
               AND id NOT IN (SELECT expense_id FROM pending_confirmations)",
        )
        .bind(orphan_cutoff)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM pending_confirmations WHERE expires_at <= ?1")
            .bind(now)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let removed = expired
            .rows_affected()
            .saturating_add(orphaned.rows_affected());
        if removed > 0 {
            info!(removed, "expired pending expenses swept");
        }
        Ok(removed)
    }
}
