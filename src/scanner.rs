//! Background loops: invoice mailbox scanning and the pending-expiry sweep.
//!
//! Both run as Tokio tasks ticking on an interval and exit when the shutdown
//! watch channel flips. The scanner checks every user whose per-user
//! interval has elapsed, proposes each invoice it finds through a
//! [`ProposalSender`], and never holds a mailbox connection between ticks.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::confirm::ConfirmationMachine;
use crate::intake::Intake;
use crate::mailbox::{MailMessage, Mailbox, MailboxConnector};
use crate::parsing::invoice::InvoiceInterpreter;
use crate::store::{now_utc, Expense, Store, StoreError, User};

/// Outbound side of the chat transport, as seen by background tasks.
#[async_trait]
pub trait ProposalSender: Send + Sync {
    /// Send a proposal with its confirmation keyboard. Returns the message id.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be delivered.
    async fn send_proposal(&self, chat_id: i64, expense: &Expense) -> anyhow::Result<i64>;
}

/// Scan loop tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSettings {
    /// Time between ticks.
    pub tick: Duration,
    /// Unread messages fetched per check.
    pub max_messages: usize,
    /// Timezone for invoice dates.
    pub timezone: Tz,
}

/// Counters for one mailbox check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// The mailbox accepted the login.
    pub connected: bool,
    /// Unread messages fetched.
    pub fetched: usize,
    /// Messages that passed the keyword prefilter.
    pub candidates: usize,
    /// Messages already recorded under the same Message-ID.
    pub duplicates: usize,
    /// Proposals stored and sent.
    pub proposed: usize,
}

/// Periodic invoice scanner.
pub struct MailScanner {
    store: Store,
    intake: Arc<Intake>,
    interpreter: Arc<InvoiceInterpreter>,
    connector: Arc<dyn MailboxConnector>,
    sender: Arc<dyn ProposalSender>,
    settings: ScanSettings,
}

impl MailScanner {
    /// Assemble a scanner.
    pub fn new(
        store: Store,
        intake: Arc<Intake>,
        interpreter: Arc<InvoiceInterpreter>,
        connector: Arc<dyn MailboxConnector>,
        sender: Arc<dyn ProposalSender>,
        settings: ScanSettings,
    ) -> Self {
        Self {
            store,
            intake,
            interpreter,
            connector,
            sender,
            settings,
        }
    }

    /// Tick until shutdown, checking every due user on each tick.
    pub async fn run(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        info!(tick_secs = self.settings.tick.as_secs(), "mail scanner started");
        let mut interval = tokio::time::interval(self.settings.tick);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.scan_due_users(now_utc()).await {
                        Ok(0) => {}
                        Ok(proposed) => info!(proposed, "mail scan proposed expenses"),
                        Err(e) => error!(error = %e, "mail scan failed"),
                    }
                }
                result = shutdown_rx.changed() => {
                    if result.is_err() || *shutdown_rx.borrow() {
                        info!("mail scanner shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Check every user whose interval has elapsed at `now`. Returns the
    /// number of proposals sent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the user list cannot be read. Per-user
    /// failures are logged and skipped.
    pub async fn scan_due_users(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let users = self.store.users_with_auto_check().await?;
        let mut proposed: usize = 0;
        for user in users.iter().filter(|u| u.email_check_due(now)) {
            match self.check_user(user).await {
                Ok(report) => proposed = proposed.saturating_add(report.proposed),
                Err(e) => warn!(user_id = user.id, error = %e, "mailbox check failed"),
            }
        }
        Ok(proposed)
    }

    /// One full cycle against the user's mailbox: connect, list unread,
    /// interpret invoice-like messages, mark them read, disconnect. The
    /// session is closed even when storage fails mid-cycle.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on storage failure.
    pub async fn check_user(&self, user: &User) -> Result<ScanReport, StoreError> {
        let mut report = ScanReport::default();
        let Some(account) = user.mail_account() else {
            return Ok(report);
        };

        let mut mailbox = self.connector.open(account);
        if !mailbox.connect().await {
            warn!(user_id = user.id, "mailbox login failed");
            return Ok(report);
        }
        report.connected = true;

        let messages = mailbox.list_unread(self.settings.max_messages).await;
        report.fetched = messages.len();

        let processed = self
            .process_messages(user, mailbox.as_mut(), &messages, &mut report)
            .await;
        mailbox.disconnect().await;
        processed?;

        self.store.touch_email_checked(user.id, now_utc()).await?;
        info!(
            user_id = user.id,
            fetched = report.fetched,
            candidates = report.candidates,
            proposed = report.proposed,
            "mailbox checked"
        );
        Ok(report)
    }

    async fn process_messages(
        &self,
        user: &User,
        mailbox: &mut dyn Mailbox,
        messages: &[MailMessage],
        report: &mut ScanReport,
    ) -> Result<(), StoreError> {
        for message in messages.iter().filter(|m| m.looks_like_invoice()) {
            report.candidates = report.candidates.saturating_add(1);

            if self.store.has_source_ref(user.id, &message.source_ref()).await? {
                report.duplicates = report.duplicates.saturating_add(1);
                mailbox.mark_read(&message.id).await;
                continue;
            }

            let candidate = self
                .interpreter
                .parse_invoice(message, self.settings.timezone)
                .await;
            if !mailbox.mark_read(&message.id).await {
                debug!(user_id = user.id, email = %message.id, "could not mark email read");
            }
            let Some(candidate) = candidate else {
                continue;
            };

            let expense = self.intake.submit_invoice(user, message, &candidate).await?;
            match self.sender.send_proposal(user.telegram_id, &expense).await {
                Ok(message_id) => {
                    self.intake
                        .attach_confirmation(user.id, expense.id, user.telegram_id, message_id)
                        .await?;
                    report.proposed = report.proposed.saturating_add(1);
                }
                Err(e) => {
                    // Left pending without a confirmation; the sweep collects it.
                    warn!(user_id = user.id, expense_id = expense.id, error = %e, "could not send invoice proposal");
                }
            }
        }
        Ok(())
    }
}

/// Purge expired pending records every `every` until shutdown.
pub async fn run_sweeper(
    machine: ConfirmationMachine,
    every: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = machine.sweep(now_utc()).await {
                    error!(error = %e, "pending sweep failed");
                }
            }
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("pending sweeper shutting down");
                    break;
                }
            }
        }
    }
}
