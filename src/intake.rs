//! Turns inbound text, voice and invoice emails into pending records.
//!
//! Intake owns the glue between the parsers and the store: it runs the
//! hybrid parser (or the transcriber first), maps the candidate's category
//! onto a stored category, and persists the record as pending. Surfacing the
//! proposal and attaching its confirmation message is left to the transport.

use std::sync::Arc;

use chrono_tz::Tz;
use tracing::{debug, info, warn};

use crate::mailbox::MailMessage;
use crate::parsing::category::Taxonomy;
use crate::parsing::{ExpenseParser, ParseRoute, ParsedCandidate};
use crate::store::{
    Expense, NewExpense, PendingConfirmation, SourceChannel, Store, StoreError, User,
};
use crate::transcription::{AudioClip, Transcriber};

/// Reply when the candidate carries no usable amount and no prompt of its own.
pub const MISSING_AMOUNT_PROMPT: &str =
    "No pude detectar el monto del gasto. Por favor, incluye la cantidad.\nEjemplo: 'Gasté 150 en uber'";
/// Reply when a voice note cannot be transcribed.
pub const TRANSCRIPTION_FAILED_PROMPT: &str =
    "No pude transcribir el mensaje de voz. Intenta de nuevo.";
/// Appended to clarifications for voice notes.
pub const VOICE_HINT: &str = "Intenta decir algo como: 'Gasté cien pesos en uber'";

/// A pending record ready to be shown to the user.
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    /// The stored pending record.
    pub expense: Expense,
    /// Transcript of a voice note, echoed back to the user.
    pub heard: Option<String>,
}

/// What intake produced for one message.
#[derive(Debug, Clone, PartialEq)]
pub enum IntakeOutcome {
    /// A pending record was stored.
    Proposed(Proposal),
    /// Nothing was stored; ask the user to rephrase.
    Clarify {
        /// Question for the user.
        prompt: String,
        /// Transcript of a voice note, if any.
        heard: Option<String>,
    },
}

/// Entry point for every inbound expense.
pub struct Intake {
    store: Store,
    parser: ExpenseParser,
    transcriber: Option<Arc<dyn Transcriber>>,
    taxonomy: Arc<Taxonomy>,
    timezone: Tz,
    ttl: chrono::Duration,
}

impl Intake {
    /// Create an intake without voice support.
    pub fn new(
        store: Store,
        parser: ExpenseParser,
        taxonomy: Arc<Taxonomy>,
        timezone: Tz,
        ttl: chrono::Duration,
    ) -> Self {
        Self {
            store,
            parser,
            transcriber: None,
            taxonomy,
            timezone,
            ttl,
        }
    }

    /// Enable voice notes.
    #[must_use]
    pub fn with_transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    /// Parse a chat message and store it as pending when it is actionable.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the record cannot be stored.
    pub async fn submit_text(&self, user: &User, text: &str) -> Result<IntakeOutcome, StoreError> {
        self.submit(user, text, SourceChannel::Text, None).await
    }

    /// Transcribe a voice note, then handle it like text.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the record cannot be stored.
    pub async fn submit_voice(
        &self,
        user: &User,
        clip: AudioClip,
    ) -> Result<IntakeOutcome, StoreError> {
        let Some(transcriber) = &self.transcriber else {
            return Ok(IntakeOutcome::Clarify {
                prompt: TRANSCRIPTION_FAILED_PROMPT.to_owned(),
                heard: None,
            });
        };

        let transcript = match transcriber.transcribe(clip).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_owned(),
            Ok(_) => {
                debug!(user_id = user.id, "empty transcription");
                return Ok(IntakeOutcome::Clarify {
                    prompt: TRANSCRIPTION_FAILED_PROMPT.to_owned(),
                    heard: None,
                });
            }
            Err(e) => {
                warn!(user_id = user.id, error = %e, "voice transcription failed");
                return Ok(IntakeOutcome::Clarify {
                    prompt: TRANSCRIPTION_FAILED_PROMPT.to_owned(),
                    heard: None,
                });
            }
        };

        self.submit(user, &transcript, SourceChannel::Voice, Some(transcript.clone()))
            .await
    }

    async fn submit(
        &self,
        user: &User,
        text: &str,
        source: SourceChannel,
        heard: Option<String>,
    ) -> Result<IntakeOutcome, StoreError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(IntakeOutcome::Clarify {
                prompt: clarify_prompt(None, source),
                heard,
            });
        }

        let outcome = self.parser.parse(text, self.timezone).await;
        let candidate = outcome.candidate;
        if !candidate.is_actionable() {
            debug!(user_id = user.id, source = source.as_str(), "candidate needs clarification");
            return Ok(IntakeOutcome::Clarify {
                prompt: clarify_prompt(candidate.clarification_prompt.as_deref(), source),
                heard,
            });
        }

        let expense = self
            .record(user, &candidate, source, None, Some(text.to_owned()))
            .await?;
        info!(
            user_id = user.id,
            expense_id = expense.id,
            source = source.as_str(),
            fast_path = outcome.route == ParseRoute::FastPath,
            "pending expense stored"
        );
        Ok(IntakeOutcome::Proposed(Proposal { expense, heard }))
    }

    /// Store an interpreted invoice as a pending record tagged with the
    /// email's Message-ID.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the record cannot be stored.
    pub async fn submit_invoice(
        &self,
        user: &User,
        email: &MailMessage,
        candidate: &ParsedCandidate,
    ) -> Result<Expense, StoreError> {
        let expense = self
            .record(
                user,
                candidate,
                SourceChannel::Email,
                Some(email.source_ref()),
                Some(email.subject.clone()),
            )
            .await?;
        info!(user_id = user.id, expense_id = expense.id, "pending invoice expense stored");
        Ok(expense)
    }

    async fn record(
        &self,
        user: &User,
        candidate: &ParsedCandidate,
        source: SourceChannel,
        source_ref: Option<String>,
        original_input: Option<String>,
    ) -> Result<Expense, StoreError> {
        let def = self.taxonomy.resolve(&candidate.category);
        let stored = self.store.category_by_name(&def.name).await?;
        let is_income = stored.as_ref().map_or(def.is_income, |c| c.is_income);

        let new = NewExpense {
            user_id: user.id,
            category_id: stored.map(|c| c.id),
            amount: candidate.amount,
            currency: candidate.currency.clone(),
            description: candidate.description.clone(),
            merchant: candidate.merchant.clone(),
            source,
            source_ref,
            is_income,
            occurred_at: candidate.occurred_at,
            original_input,
        };
        self.store.create_expense(&new).await
    }

    /// Link a pending record to the message carrying its buttons.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on storage failure.
    pub async fn attach_confirmation(
        &self,
        user_id: i64,
        expense_id: i64,
        chat_id: i64,
        message_id: i64,
    ) -> Result<PendingConfirmation, StoreError> {
        self.store
            .create_confirmation(user_id, expense_id, chat_id, message_id, self.ttl)
            .await
    }
}

fn clarify_prompt(stated: Option<&str>, source: SourceChannel) -> String {
    let base = stated
        .filter(|prompt| !prompt.trim().is_empty())
        .unwrap_or(MISSING_AMOUNT_PROMPT);
    match source {
        SourceChannel::Voice => format!("{base}\n{VOICE_HINT}"),
        SourceChannel::Text | SourceChannel::Email => base.to_owned(),
    }
}
