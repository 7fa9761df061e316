//! Telegram adapter: dispatcher, message and callback handlers, UI formatting.
//!
//! Messages from allowed users are registered, then routed to slash commands
//! or to intake (text and voice). Proposals go out with an inline keyboard
//! whose payloads are decoded by [`callbacks`]. [`TelegramSender`] exposes
//! the outbound side to the background scanner.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use teloxide::dispatching::UpdateFilterExt;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, InputFile, MessageId, ParseMode};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::confirm::ConfirmationMachine;
use crate::intake::{Intake, IntakeOutcome};
use crate::scanner::{MailScanner, ProposalSender};
use crate::store::{Expense, Store, User, UserProfile};

pub mod callbacks;
pub mod commands;
pub mod media;
pub mod ui;

use self::callbacks::CallbackAction;
use self::commands::CommandReply;

// ---------------------------------------------------------------------------
// Shared state for handler injection
// ---------------------------------------------------------------------------

/// Shared dependencies injected into teloxide handlers via `dptree::deps!`.
#[derive(Clone)]
pub struct BotContext {
    /// Human-owned configuration.
    pub config: Arc<Config>,
    /// Repository.
    pub store: Store,
    /// Text and voice intake.
    pub intake: Arc<Intake>,
    /// Confirmation transitions.
    pub confirmations: ConfirmationMachine,
    /// Mailbox scanner for `/email_check`; `None` when email is disabled.
    pub scanner: Option<Arc<MailScanner>>,
}

impl BotContext {
    /// Register or refresh the sender.
    async fn register(&self, user: &teloxide::types::User) -> Option<User> {
        let profile = UserProfile {
            telegram_id: telegram_user_id(user),
            username: user.username.clone(),
            first_name: Some(user.first_name.clone()),
            last_name: user.last_name.clone(),
        };
        match self
            .store
            .upsert_user(&profile, &self.config.locale.default_currency)
            .await
        {
            Ok(user) => Some(user),
            Err(e) => {
                warn!(telegram_id = profile.telegram_id, error = %e, "failed to register user");
                None
            }
        }
    }
}

fn telegram_user_id(user: &teloxide::types::User) -> i64 {
    // teloxide uses u64 for user IDs; the store keeps i64.
    i64::try_from(user.id.0).unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Public entry point
// ---------------------------------------------------------------------------

/// Run the Telegram dispatcher until Ctrl+C.
///
/// # Errors
///
/// Returns an error if the bot token is rejected.
pub async fn run_telegram(bot: Bot, ctx: BotContext) -> anyhow::Result<()> {
    let me = bot.get_me().await.context("telegram rejected the bot token")?;
    info!(username = ?me.username, "telegram bot authenticated");

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handle_message))
        .branch(Update::filter_callback_query().endpoint(handle_callback));

    info!("telegram dispatcher starting");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![ctx])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

// ---------------------------------------------------------------------------
// Message handler
// ---------------------------------------------------------------------------

/// Handle an incoming Telegram message.
async fn handle_message(bot: Bot, msg: Message, ctx: BotContext) -> ResponseResult<()> {
    let Some(from) = msg.from.as_ref() else {
        return Ok(());
    };
    let telegram_id = telegram_user_id(from);

    if !ctx.config.is_user_allowed(telegram_id) {
        warn!(telegram_id, "message dropped: user not in allowed_users");
        if msg.text().is_some_and(|t| t.starts_with("/start")) {
            bot.send_message(msg.chat.id, "⛔ No tienes permiso para usar este bot.")
                .await?;
        }
        return Ok(());
    }

    let Some(user) = ctx.register(from).await else {
        bot.send_message(msg.chat.id, ui::FAILURE_TEXT).await?;
        return Ok(());
    };

    if let Some(text) = msg.text() {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        if text.starts_with('/') {
            return handle_command(&bot, &msg, &ctx, &user, text).await;
        }
        debug!(user_id = user.id, "text message received");
        bot.send_chat_action(msg.chat.id, ChatAction::Typing).await?;
        let outcome = ctx.intake.submit_text(&user, text).await;
        return deliver_outcome(&bot, msg.chat.id, &ctx, &user, outcome).await;
    }

    if let Some(voice) = msg.voice() {
        debug!(user_id = user.id, "voice message received");
        bot.send_message(msg.chat.id, "🎤 Procesando mensaje de voz...")
            .await?;
        let clip = match media::download_voice(&bot, voice).await {
            Ok(clip) => clip,
            Err(e) => {
                warn!(user_id = user.id, error = %e, "failed to download voice note");
                bot.send_message(
                    msg.chat.id,
                    "❌ Hubo un error procesando el mensaje de voz. Por favor, intenta de nuevo.",
                )
                .await?;
                return Ok(());
            }
        };
        let outcome = ctx.intake.submit_voice(&user, clip).await;
        return deliver_outcome(&bot, msg.chat.id, &ctx, &user, outcome).await;
    }

    debug!(user_id = user.id, "unsupported message type, ignoring");
    Ok(())
}

async fn handle_command(
    bot: &Bot,
    msg: &Message,
    ctx: &BotContext,
    user: &User,
    text: &str,
) -> ResponseResult<()> {
    if commands::carries_secret(text) {
        if let Err(e) = bot.delete_message(msg.chat.id, msg.id).await {
            debug!(error = %e, "could not delete message carrying a password");
        }
    }

    let reply = match commands::dispatch_command(ctx, user, text).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!(user_id = user.id, error = %e, "command failed");
            CommandReply::Html(ui::FAILURE_TEXT.to_owned())
        }
    };

    match reply {
        CommandReply::Html(body) => {
            bot.send_message(msg.chat.id, body)
                .parse_mode(ParseMode::Html)
                .await?;
        }
        CommandReply::Keyboard(body, keyboard) => {
            bot.send_message(msg.chat.id, body)
                .parse_mode(ParseMode::Html)
                .reply_markup(keyboard)
                .await?;
        }
        CommandReply::Document {
            file_name,
            bytes,
            caption,
        } => {
            bot.send_document(msg.chat.id, InputFile::memory(bytes).file_name(file_name))
                .caption(caption)
                .await?;
        }
    }
    Ok(())
}

async fn deliver_outcome(
    bot: &Bot,
    chat_id: ChatId,
    ctx: &BotContext,
    user: &User,
    outcome: Result<IntakeOutcome, crate::store::StoreError>,
) -> ResponseResult<()> {
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(user_id = user.id, error = %e, "intake failed");
            bot.send_message(chat_id, ui::FAILURE_TEXT).await?;
            return Ok(());
        }
    };

    match outcome {
        IntakeOutcome::Clarify { prompt, heard } => {
            if let Some(transcript) = heard {
                send_html(bot, chat_id, ui::heard_text(&transcript)).await?;
            }
            send_html(bot, chat_id, ui::clarification_text(&prompt)).await?;
        }
        IntakeOutcome::Proposed(proposal) => {
            if let Some(transcript) = &proposal.heard {
                send_html(bot, chat_id, ui::heard_text(transcript)).await?;
            }
            let sent = send_proposal_message(bot, chat_id, &proposal.expense).await?;
            if let Err(e) = ctx
                .intake
                .attach_confirmation(user.id, proposal.expense.id, chat_id.0, i64::from(sent.0))
                .await
            {
                warn!(user_id = user.id, expense_id = proposal.expense.id, error = %e, "failed to store pending confirmation");
            }
        }
    }
    Ok(())
}

async fn send_html(bot: &Bot, chat_id: ChatId, body: String) -> ResponseResult<()> {
    bot.send_message(chat_id, body)
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

async fn send_proposal_message(
    bot: &Bot,
    chat_id: ChatId,
    expense: &Expense,
) -> ResponseResult<MessageId> {
    let sent = bot
        .send_message(chat_id, ui::proposal_text(expense, false))
        .parse_mode(ParseMode::Html)
        .reply_markup(ui::proposal_keyboard(expense.id))
        .await?;
    Ok(sent.id)
}

// ---------------------------------------------------------------------------
// Callback query handler
// ---------------------------------------------------------------------------

/// Handle inline keyboard callback queries.
async fn handle_callback(bot: Bot, query: CallbackQuery, ctx: BotContext) -> ResponseResult<()> {
    bot.answer_callback_query(&query.id).await?;

    let telegram_id = telegram_user_id(&query.from);
    if !ctx.config.is_user_allowed(telegram_id) {
        return Ok(());
    }

    let Some(action) = query.data.as_deref().and_then(CallbackAction::parse) else {
        debug!(telegram_id, "unknown callback payload");
        return Ok(());
    };
    let Some((chat_id, message_id)) = query.message.as_ref().map(|m| (m.chat().id, m.id())) else {
        return Ok(());
    };
    let Some(user) = ctx.register(&query.from).await else {
        return Ok(());
    };

    let reply = match callbacks::apply(&ctx, &user, action).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!(user_id = user.id, error = %e, "callback action failed");
            bot.send_message(chat_id, ui::FAILURE_TEXT).await?;
            return Ok(());
        }
    };

    let mut edit = bot
        .edit_message_text(chat_id, message_id, reply.text)
        .parse_mode(ParseMode::Html);
    if let Some(keyboard) = reply.keyboard {
        edit = edit.reply_markup(keyboard);
    }
    edit.await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Outbound sender for background tasks
// ---------------------------------------------------------------------------

/// [`ProposalSender`] backed by the bot.
#[derive(Clone)]
pub struct TelegramSender {
    bot: Bot,
}

impl TelegramSender {
    /// Wrap a bot handle.
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl ProposalSender for TelegramSender {
    async fn send_proposal(&self, chat_id: i64, expense: &Expense) -> anyhow::Result<i64> {
        let sent = send_proposal_message(&self.bot, ChatId(chat_id), expense).await?;
        Ok(i64::from(sent.0))
    }
}
