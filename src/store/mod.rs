//! SQLite persistence for users, categories, expense records and pending
//! confirmations.
//!
//! [`Store`] wraps a [`SqlitePool`]. Repository methods live in the
//! submodules as `impl Store` blocks and exchange plain data structs; nothing
//! here lazily loads relations.

mod categories;
mod expenses;
mod pending;
mod summary;
mod users;

use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::mailbox::MailAccount;

pub use self::summary::{
    month_bounds, year_bounds, CategoryTotal, MonthTotal, MonthlySummary, YearlySummary,
};

const SCHEMA: &str = include_str!("../../migrations/001_schema.sql");

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by the store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// A text column held an unknown enum value.
    #[error("invalid {field} value in database: {value}")]
    InvalidEnum {
        /// Column name.
        field: &'static str,
        /// Offending value.
        value: String,
    },
    /// An amount column was not a decimal.
    #[error("invalid amount in database: {0}")]
    InvalidAmount(String),
    /// A keyword list was not a JSON string array.
    #[error("invalid keyword list for category {name}: {reason}")]
    InvalidKeywords {
        /// Category name.
        name: String,
        /// Decoder message.
        reason: String,
    },
    /// A row that must exist was missing.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind.
        entity: &'static str,
        /// Row id.
        id: i64,
    },
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Channel an expense arrived through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceChannel {
    /// Typed chat message.
    Text,
    /// Transcribed voice note.
    Voice,
    /// Invoice email.
    Email,
}

impl SourceChannel {
    /// Returns the string representation stored in SQLite.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Voice => "voice",
            Self::Email => "email",
        }
    }

    /// Parse from a SQLite text value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a recognised channel.
    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "text" => Ok(Self::Text),
            "voice" => Ok(Self::Voice),
            "email" => Ok(Self::Email),
            other => Err(StoreError::InvalidEnum {
                field: "source",
                value: other.to_owned(),
            }),
        }
    }
}

/// How a confirmed expense was paid.
///
/// Unknown values are kept verbatim in [`PaymentMethod::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PaymentMethod {
    /// Cash.
    Cash,
    /// Debit or credit card.
    Card,
    /// Bank transfer.
    Transfer,
    /// Anything else, stored as given.
    Other(String),
}

impl PaymentMethod {
    /// The three methods offered on the keyboard.
    pub const OFFERED: [PaymentMethod; 3] = [Self::Cash, Self::Card, Self::Transfer];

    /// Lenient parse: Spanish and English names map to the known methods,
    /// anything else is accepted as [`PaymentMethod::Other`].
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "efectivo" | "cash" => Self::Cash,
            "tarjeta" | "card" | "credito" | "crédito" | "debito" | "débito" => Self::Card,
            "transferencia" | "transfer" | "spei" => Self::Transfer,
            _ => Self::Other(raw.trim().to_owned()),
        }
    }

    /// Returns the string representation stored in SQLite.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Cash => "efectivo",
            Self::Card => "tarjeta",
            Self::Transfer => "transferencia",
            Self::Other(raw) => raw,
        }
    }

    /// Display icon; unknown methods share a generic one.
    pub fn icon(&self) -> &'static str {
        match self {
            Self::Cash => "💵",
            Self::Card => "💳",
            Self::Transfer => "🏦",
            Self::Other(_) => "💰",
        }
    }

    /// Display label.
    pub fn label(&self) -> String {
        match self {
            Self::Cash => "Efectivo".to_owned(),
            Self::Card => "Tarjeta".to_owned(),
            Self::Transfer => "Transferencia".to_owned(),
            Self::Other(raw) => raw.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Data transfer structs
// ---------------------------------------------------------------------------

/// A bot user.
#[derive(Clone, PartialEq, Eq)]
pub struct User {
    /// Row id.
    pub id: i64,
    /// Telegram user id (also the private chat id).
    pub telegram_id: i64,
    /// Telegram username.
    pub username: Option<String>,
    /// First name.
    pub first_name: Option<String>,
    /// Last name.
    pub last_name: Option<String>,
    /// Currency applied when none is detected.
    pub default_currency: String,
    /// Inactive users are ignored by the scanner.
    pub is_active: bool,
    /// Connected mailbox address.
    pub email_address: Option<String>,
    /// Mailbox app password.
    pub email_app_password: Option<String>,
    /// Background scanning enabled.
    pub email_auto_check: bool,
    /// Minutes between background checks.
    pub email_check_interval: i64,
    /// Last completed check.
    pub email_last_checked: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("telegram_id", &self.telegram_id)
            .field("username", &self.username)
            .field("email_address", &self.email_address)
            .field("email_app_password", &"[REDACTED]")
            .field("email_auto_check", &self.email_auto_check)
            .field("email_check_interval", &self.email_check_interval)
            .field("email_last_checked", &self.email_last_checked)
            .finish()
    }
}

impl User {
    /// Mailbox login, when both address and password are set.
    pub fn mail_account(&self) -> Option<MailAccount> {
        match (&self.email_address, &self.email_app_password) {
            (Some(address), Some(password)) => Some(MailAccount {
                address: address.clone(),
                password: password.clone(),
            }),
            _ => None,
        }
    }

    /// Whether the per-user interval has elapsed since the last check.
    pub fn email_check_due(&self, now: DateTime<Utc>) -> bool {
        match self.email_last_checked {
            None => true,
            Some(last) => {
                let interval = chrono::Duration::minutes(self.email_check_interval.max(1));
                now.signed_duration_since(last) >= interval
            }
        }
    }

    /// Name used in greetings.
    pub fn display_name(&self) -> String {
        self.first_name
            .clone()
            .or_else(|| self.username.clone())
            .unwrap_or_else(|| "👋".to_owned())
    }
}

/// Profile fields refreshed on every contact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    /// Telegram user id.
    pub telegram_id: i64,
    /// Telegram username.
    pub username: Option<String>,
    /// First name.
    pub first_name: Option<String>,
    /// Last name.
    pub last_name: Option<String>,
}

/// A persisted category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    /// Row id.
    pub id: i64,
    /// Unique canonical name.
    pub name: String,
    /// Display emoji.
    pub emoji: String,
    /// Matching keywords.
    pub keywords: Vec<String>,
    /// Income rather than expense.
    pub is_income: bool,
}

impl Category {
    /// `"{emoji} {name}"`.
    pub fn label(&self) -> String {
        if self.emoji.is_empty() {
            self.name.clone()
        } else {
            format!("{} {}", self.emoji, self.name)
        }
    }
}

/// Fields of a record about to be created (always pending, unconfirmed).
#[derive(Debug, Clone, PartialEq)]
pub struct NewExpense {
    /// Owner.
    pub user_id: i64,
    /// Category reference.
    pub category_id: Option<i64>,
    /// Strictly positive amount.
    pub amount: Decimal,
    /// ISO currency code.
    pub currency: String,
    /// Description.
    pub description: String,
    /// Vendor.
    pub merchant: Option<String>,
    /// Arrival channel.
    pub source: SourceChannel,
    /// External reference (email Message-ID).
    pub source_ref: Option<String>,
    /// Income rather than expense.
    pub is_income: bool,
    /// Local wall-clock time of the expense.
    pub occurred_at: NaiveDateTime,
    /// Raw user input or email subject.
    pub original_input: Option<String>,
}

/// A persisted record.
#[derive(Debug, Clone, PartialEq)]
pub struct Expense {
    /// Row id.
    pub id: i64,
    /// Owner.
    pub user_id: i64,
    /// Category reference.
    pub category_id: Option<i64>,
    /// Category name at read time.
    pub category_name: Option<String>,
    /// Category emoji at read time.
    pub category_emoji: Option<String>,
    /// Amount.
    pub amount: Decimal,
    /// ISO currency code.
    pub currency: String,
    /// Description.
    pub description: String,
    /// Vendor.
    pub merchant: Option<String>,
    /// Arrival channel.
    pub source: SourceChannel,
    /// External reference.
    pub source_ref: Option<String>,
    /// Income rather than expense.
    pub is_income: bool,
    /// Confirmed by the user.
    pub is_confirmed: bool,
    /// Awaiting confirmation.
    pub is_pending: bool,
    /// Set at confirmation time only.
    pub payment_method: Option<PaymentMethod>,
    /// Local wall-clock time of the expense.
    pub occurred_at: NaiveDateTime,
    /// Raw input.
    pub original_input: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl Expense {
    /// `"{emoji} {name}"` of the category, or the uncategorized label.
    pub fn category_label(&self) -> String {
        match (&self.category_emoji, &self.category_name) {
            (Some(emoji), Some(name)) if !emoji.is_empty() => format!("{emoji} {name}"),
            (_, Some(name)) => name.clone(),
            _ => format!("{UNCATEGORIZED_EMOJI} {UNCATEGORIZED_NAME}"),
        }
    }
}

/// Label for records whose category was removed.
pub const UNCATEGORIZED_NAME: &str = "Sin categoría";
/// Emoji for records whose category was removed.
pub const UNCATEGORIZED_EMOJI: &str = "💰";

/// Link between a pending record and the message carrying its buttons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingConfirmation {
    /// Row id.
    pub id: i64,
    /// Owner.
    pub user_id: i64,
    /// Pending record.
    pub expense_id: i64,
    /// Chat holding the message.
    pub chat_id: i64,
    /// Message with the confirmation keyboard.
    pub message_id: i64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Past this instant the confirmation is stale.
    pub expires_at: DateTime<Utc>,
}

impl PendingConfirmation {
    /// Whether the confirmation is stale at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Filters for listing records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpenseFilter {
    /// Inclusive lower bound on `occurred_at`.
    pub from: Option<NaiveDateTime>,
    /// Exclusive upper bound on `occurred_at`.
    pub until: Option<NaiveDateTime>,
    /// Restrict to one category.
    pub category_id: Option<i64>,
    /// Only confirmed records.
    pub confirmed_only: bool,
    /// Maximum rows, newest first.
    pub limit: Option<i64>,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Repository over the SQLite database.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if needed) the database file and apply the schema.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the file cannot be opened or the
    /// schema fails to apply.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        info!(path = %path.display(), "database opened");
        Ok(store)
    }

    /// A private in-memory database with the schema applied.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the pool cannot be created.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        // In-memory databases are per-connection, so keep a single one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// The underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Apply the bootstrap schema. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if any statement fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }
}

/// Current UTC time at whole-second precision, the form stored in SQLite.
pub fn now_utc() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

pub(crate) fn parse_amount(raw: &str) -> Result<Decimal, StoreError> {
    Decimal::from_str(raw).map_err(|_| StoreError::InvalidAmount(raw.to_owned()))
}
