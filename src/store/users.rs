//! User registration and per-user mailbox settings.

use chrono::{DateTime, Utc};

use super::{Store, StoreError, User, UserProfile};

type UserRow = (
    i64,
    i64,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
    bool,
    Option<String>,
    Option<String>,
    bool,
    i64,
    Option<DateTime<Utc>>,
);

const USER_COLUMNS: &str = "id, telegram_id, username, first_name, last_name, default_currency, \
     is_active, email_address, email_app_password, email_auto_check, email_check_interval, \
     email_last_checked";

fn user_from_row(row: UserRow) -> User {
    User {
        id: row.0,
        telegram_id: row.1,
        username: row.2,
        first_name: row.3,
        last_name: row.4,
        default_currency: row.5,
        is_active: row.6,
        email_address: row.7,
        email_app_password: row.8,
        email_auto_check: row.9,
        email_check_interval: row.10,
        email_last_checked: row.11,
    }
}

impl Store {
    /// Register a user on first contact, refreshing profile fields afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    pub async fn upsert_user(
        &self,
        profile: &UserProfile,
        default_currency: &str,
    ) -> Result<User, StoreError> {
        sqlx::query(
            "INSERT INTO users (telegram_id, username, first_name, last_name, default_currency) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(telegram_id) DO UPDATE SET \
                 username = excluded.username, \
                 first_name = excluded.first_name, \
                 last_name = excluded.last_name",
        )
        .bind(profile.telegram_id)
        .bind(&profile.username)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(default_currency)
        .execute(&self.pool)
        .await?;

        self.user_by_telegram_id(profile.telegram_id)
            .await?
            .ok_or(StoreError::NotFound {
                entity: "user",
                id: profile.telegram_id,
            })
    }

    /// Look up a user by Telegram id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    pub async fn user_by_telegram_id(&self, telegram_id: i64) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE telegram_id = ?1"
        ))
        .bind(telegram_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(user_from_row))
    }

    /// Look up a user by row id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    pub async fn user(&self, id: i64) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(user_from_row))
    }

    /// Active users with background mailbox scanning enabled and credentials set.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    pub async fn users_with_auto_check(&self) -> Result<Vec<User>, StoreError> {
        let rows: Vec<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE is_active = 1 AND email_auto_check = 1 \
               AND email_address IS NOT NULL AND email_app_password IS NOT NULL \
             ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(user_from_row).collect())
    }

    /// Connect a mailbox and enable background scanning.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    pub async fn set_email_account(
        &self,
        user_id: i64,
        address: &str,
        app_password: &str,
        interval_minutes: i64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE users SET email_address = ?2, email_app_password = ?3, \
                 email_auto_check = 1, email_check_interval = ?4, email_last_checked = NULL \
             WHERE id = ?1",
        )
        .bind(user_id)
        .bind(address)
        .bind(app_password)
        .bind(interval_minutes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Forget the mailbox and stop scanning.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    pub async fn clear_email_account(&self, user_id: i64) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE users SET email_address = NULL, email_app_password = NULL, \
                 email_auto_check = 0, email_last_checked = NULL \
             WHERE id = ?1",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Toggle background scanning.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    pub async fn set_email_auto_check(&self, user_id: i64, enabled: bool) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET email_auto_check = ?2 WHERE id = ?1")
            .bind(user_id)
            .bind(enabled)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Change the per-user check interval.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    pub async fn set_email_interval(&self, user_id: i64, minutes: i64) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET email_check_interval = ?2 WHERE id = ?1")
            .bind(user_id)
            .bind(minutes)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record a completed mailbox check.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    pub async fn touch_email_checked(
        &self,
        user_id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET email_last_checked = ?2 WHERE id = ?1")
            .bind(user_id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
