//! Mailbox access for invoice scanning.
//!
//! The [`Mailbox`] trait mirrors one check cycle: connect, list unread,
//! mark read, disconnect. [`imap::ImapMailbox`] implements it over IMAP with
//! TLS; [`message`] turns raw RFC 822 bytes into a [`MailMessage`].

pub mod imap;
pub mod message;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Subject or sender fragments that make an email worth interpreting.
pub const INVOICE_KEYWORDS: &[&str] = &[
    "factura",
    "invoice",
    "recibo",
    "receipt",
    "payment",
    "orden",
    "order",
    "compra",
    "purchase",
    "confirmación",
    "confirmation",
    "cargo",
    "charge",
    "pago",
    "paid",
    "suscripción",
    "subscription",
    "renovación",
    "renewal",
    "transferencia",
    "transfer",
    "notificaciones",
    "movimiento",
];

/// Errors raised by mailbox implementations.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    /// TLS setup or TCP connect failed.
    #[error("mailbox connection failed: {0}")]
    Connect(String),
    /// Server rejected the credentials.
    #[error("mailbox login failed: {0}")]
    Login(String),
    /// A command failed after login.
    #[error("mailbox command failed: {0}")]
    Command(String),
    /// A message could not be decoded.
    #[error("message parse error: {0}")]
    Parse(#[from] mailparse::MailParseError),
    /// Operation attempted without a live session.
    #[error("mailbox is not connected")]
    NotConnected,
}

/// A file attached to an email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Declared file name, if any.
    pub filename: Option<String>,
    /// MIME type, lower-cased.
    pub content_type: String,
    /// Decoded content.
    pub data: Vec<u8>,
}

impl Attachment {
    /// Whether this attachment is a PDF document.
    pub fn is_pdf(&self) -> bool {
        self.content_type == "application/pdf"
            || self
                .filename
                .as_deref()
                .is_some_and(|name| name.to_lowercase().ends_with(".pdf"))
    }
}

/// An unread email as seen by the invoice interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    /// Server-side identifier used for `mark_read` (IMAP UID).
    pub id: String,
    /// `Message-ID` header, used to avoid proposing the same email twice.
    pub message_id: Option<String>,
    /// Decoded subject.
    pub subject: String,
    /// Decoded `From` header.
    pub sender: String,
    /// `Date` header.
    pub date: Option<DateTime<Utc>>,
    /// Plain-text body, capped.
    pub body: String,
    /// Attachments in MIME order.
    pub attachments: Vec<Attachment>,
}

impl MailMessage {
    /// Stable reference stored on records created from this email.
    pub fn source_ref(&self) -> String {
        self.message_id
            .clone()
            .unwrap_or_else(|| format!("uid:{}", self.id))
    }

    /// Cheap prefilter on subject and sender before calling the model.
    pub fn looks_like_invoice(&self) -> bool {
        let haystack = format!("{} {}", self.subject, self.sender).to_lowercase();
        INVOICE_KEYWORDS.iter().any(|k| haystack.contains(k))
    }

    /// First PDF attachment, if any.
    pub fn first_pdf(&self) -> Option<&Attachment> {
        self.attachments.iter().find(|a| a.is_pdf())
    }
}

/// Login data for one user's mailbox.
#[derive(Clone, PartialEq, Eq)]
pub struct MailAccount {
    /// Email address, used as the IMAP login.
    pub address: String,
    /// App password.
    pub password: String,
}

impl std::fmt::Debug for MailAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailAccount")
            .field("address", &self.address)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// One check cycle against a mailbox. Never held across scan ticks.
#[async_trait]
pub trait Mailbox: Send {
    /// Open the connection and log in. Returns `false` on any failure.
    async fn connect(&mut self) -> bool;

    /// Up to `limit` unread messages, newest first. Empty on failure.
    async fn list_unread(&mut self, limit: usize) -> Vec<MailMessage>;

    /// Flag a message as read. Returns `false` on failure.
    async fn mark_read(&mut self, id: &str) -> bool;

    /// Log out and drop the connection.
    async fn disconnect(&mut self);
}

/// Creates unconnected mailboxes for accounts.
pub trait MailboxConnector: Send + Sync {
    /// A fresh mailbox for `account`; call [`Mailbox::connect`] next.
    fn open(&self, account: MailAccount) -> Box<dyn Mailbox>;
}
