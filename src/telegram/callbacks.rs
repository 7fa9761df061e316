//! Inline keyboard payloads and the actions they trigger.
//!
//! Every payload that touches a record carries its id, so any number of
//! proposals can sit in the chat and be resolved in any order. Payloads stay
//! well under Telegram's 64-byte callback limit.

use teloxide::types::InlineKeyboardMarkup;
use tracing::debug;

use crate::confirm::Transition;
use crate::store::{Expense, StoreError, User};

use super::{ui, BotContext};

/// Decoded callback payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    /// Accept the proposal and move on to payment selection.
    Confirm(i64),
    /// Confirm with a payment method.
    Pay {
        /// Record id.
        expense_id: i64,
        /// Method as sent by the button.
        method: String,
    },
    /// Confirm without a payment method.
    Skip(i64),
    /// Discard the proposal.
    Cancel(i64),
    /// Show the category picker.
    EditCategory(i64),
    /// Apply a category from the picker.
    SetCategory {
        /// Record id.
        expense_id: i64,
        /// Chosen category.
        category_id: i64,
    },
    /// Return from a sub-step to the proposal.
    Back(i64),
    /// Delete every record of the user.
    ClearAll,
    /// Abort the clear-all prompt.
    ClearAbort,
}

impl CallbackAction {
    /// Wire form of the payload.
    pub fn encode(&self) -> String {
        match self {
            Self::Confirm(id) => format!("confirm:{id}"),
            Self::Pay { expense_id, method } => format!("pay:{expense_id}:{method}"),
            Self::Skip(id) => format!("skip:{id}"),
            Self::Cancel(id) => format!("cancel:{id}"),
            Self::EditCategory(id) => format!("editcat:{id}"),
            Self::SetCategory {
                expense_id,
                category_id,
            } => format!("setcat:{expense_id}:{category_id}"),
            Self::Back(id) => format!("back:{id}"),
            Self::ClearAll => "clear:yes".to_owned(),
            Self::ClearAbort => "clear:no".to_owned(),
        }
    }

    /// Decode a payload; `None` for anything malformed or unknown.
    pub fn parse(data: &str) -> Option<Self> {
        let (kind, rest) = data.split_once(':')?;
        match kind {
            "confirm" => Some(Self::Confirm(rest.parse().ok()?)),
            "skip" => Some(Self::Skip(rest.parse().ok()?)),
            "cancel" => Some(Self::Cancel(rest.parse().ok()?)),
            "editcat" => Some(Self::EditCategory(rest.parse().ok()?)),
            "back" => Some(Self::Back(rest.parse().ok()?)),
            "pay" => {
                let (id, method) = rest.split_once(':')?;
                if method.trim().is_empty() {
                    return None;
                }
                Some(Self::Pay {
                    expense_id: id.parse().ok()?,
                    method: method.to_owned(),
                })
            }
            "setcat" => {
                let (id, category) = rest.split_once(':')?;
                Some(Self::SetCategory {
                    expense_id: id.parse().ok()?,
                    category_id: category.parse().ok()?,
                })
            }
            "clear" => match rest {
                "yes" => Some(Self::ClearAll),
                "no" => Some(Self::ClearAbort),
                _ => None,
            },
            _ => None,
        }
    }
}

/// New content for the message that carried the pressed button.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackReply {
    /// HTML body.
    pub text: String,
    /// Keyboard to show; `None` removes it.
    pub keyboard: Option<InlineKeyboardMarkup>,
}

impl CallbackReply {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: None,
        }
    }

    fn with_keyboard(text: impl Into<String>, keyboard: InlineKeyboardMarkup) -> Self {
        Self {
            text: text.into(),
            keyboard: Some(keyboard),
        }
    }
}

fn terminal(transition: Transition) -> CallbackReply {
    match transition {
        Transition::Confirmed(expense) => CallbackReply::text(ui::confirmed_text(&expense)),
        Transition::Discarded => CallbackReply::text(ui::DISCARDED_TEXT),
        Transition::Expired => CallbackReply::text(ui::EXPIRED_TEXT),
        Transition::NotFound => CallbackReply::text(ui::NOT_FOUND_TEXT),
        Transition::Proposed(expense) | Transition::CategoryChanged(expense) => {
            proposal(&expense, false)
        }
    }
}

fn proposal(expense: &Expense, updated: bool) -> CallbackReply {
    CallbackReply::with_keyboard(
        ui::proposal_text(expense, updated),
        ui::proposal_keyboard(expense.id),
    )
}

/// Apply `action` for `user` and describe how the message should change.
///
/// # Errors
///
/// Returns [`StoreError`] on storage failure.
pub async fn apply(
    ctx: &BotContext,
    user: &User,
    action: CallbackAction,
) -> Result<CallbackReply, StoreError> {
    debug!(user_id = user.id, action = %action.encode(), "callback action");
    let machine = &ctx.confirmations;
    let reply = match action {
        CallbackAction::Confirm(id) => match machine.pending(user.id, id).await? {
            Transition::Proposed(expense) => CallbackReply::with_keyboard(
                ui::payment_prompt(&expense),
                ui::payment_keyboard(expense.id),
            ),
            other => terminal(other),
        },
        CallbackAction::Pay { expense_id, method } => {
            terminal(machine.confirm_with_payment(user.id, expense_id, &method).await?)
        }
        CallbackAction::Skip(id) => terminal(machine.confirm(user.id, id).await?),
        CallbackAction::Cancel(id) => terminal(machine.discard(user.id, id).await?),
        CallbackAction::EditCategory(id) => match machine.pending(user.id, id).await? {
            Transition::Proposed(expense) => {
                let categories = ctx.store.list_categories().await?;
                CallbackReply::with_keyboard(
                    ui::CATEGORY_PROMPT,
                    ui::category_keyboard(expense.id, &categories),
                )
            }
            other => terminal(other),
        },
        CallbackAction::SetCategory {
            expense_id,
            category_id,
        } => match machine.set_category(user.id, expense_id, category_id).await? {
            Transition::CategoryChanged(expense) => proposal(&expense, true),
            other => terminal(other),
        },
        CallbackAction::Back(id) => terminal(machine.pending(user.id, id).await?),
        CallbackAction::ClearAll => {
            let removed = ctx.store.delete_all_expenses(user.id).await?;
            CallbackReply::text(format!("🗑️ Se eliminaron {removed} gastos."))
        }
        CallbackAction::ClearAbort => CallbackReply::text(ui::CLEAR_ABORTED_TEXT),
    };
    Ok(reply)
}
