//! Gastos: a personal expense tracker that lives in Telegram.
//!
//! Expenses arrive as text, voice notes, or invoice emails. Each one is
//! parsed into a candidate record, stored as pending, and proposed back to
//! the user with inline buttons. Nothing counts toward reports until it is
//! confirmed.
//!
//! See `DESIGN.md` for the architecture notes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod credentials;
pub mod logging;
pub mod providers;
pub mod transcription;

pub mod mailbox;
pub mod parsing;
pub mod store;

pub mod confirm;
pub mod intake;
pub mod reports;
pub mod scanner;

pub mod telegram;
