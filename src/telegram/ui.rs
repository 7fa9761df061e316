//! HTML formatting and inline keyboard helpers for Telegram messages.
//!
//! All output uses HTML parse mode (never MarkdownV2) per project convention.

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::reports::format_money;
use crate::store::{Category, Expense, PaymentMethod, SourceChannel};

use super::callbacks::CallbackAction;

/// Shown after a discard.
pub const DISCARDED_TEXT: &str = "❌ Gasto cancelado.";
/// Shown when the record was already resolved or never existed.
pub const NOT_FOUND_TEXT: &str = "❌ Este gasto ya no es válido.";
/// Shown when the confirmation window closed.
pub const EXPIRED_TEXT: &str = "⌛ Esta confirmación expiró y el gasto fue descartado.";
/// Category picker heading.
pub const CATEGORY_PROMPT: &str = "📂 Selecciona la categoría correcta:";
/// Shown when the clear-all prompt is aborted.
pub const CLEAR_ABORTED_TEXT: &str = "✅ Operación cancelada. Tus gastos están seguros.";
/// Generic failure reply.
pub const FAILURE_TEXT: &str = "❌ Ocurrió un error. Por favor, intenta de nuevo.";

/// Escape special HTML characters in user-provided text.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn button(label: impl Into<String>, action: &CallbackAction) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(label.into(), action.encode())
}

/// Confirm / cancel / edit-category keyboard of a proposal.
pub fn proposal_keyboard(expense_id: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            button("✅ Confirmar", &CallbackAction::Confirm(expense_id)),
            button("❌ Cancelar", &CallbackAction::Cancel(expense_id)),
        ],
        vec![button(
            "✏️ Editar categoría",
            &CallbackAction::EditCategory(expense_id),
        )],
    ])
}

/// Payment method picker shown after confirming.
pub fn payment_keyboard(expense_id: i64) -> InlineKeyboardMarkup {
    let methods = PaymentMethod::OFFERED
        .iter()
        .map(|method| {
            button(
                format!("{} {}", method.icon(), method.label()),
                &CallbackAction::Pay {
                    expense_id,
                    method: method.as_str().to_owned(),
                },
            )
        })
        .collect();
    InlineKeyboardMarkup::new(vec![
        methods,
        vec![
            button("⏭️ Omitir", &CallbackAction::Skip(expense_id)),
            button("🔙 Volver", &CallbackAction::Back(expense_id)),
        ],
    ])
}

/// One button per category, then a back button.
pub fn category_keyboard(expense_id: i64, categories: &[Category]) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = categories
        .chunks(2)
        .map(|pair| {
            pair.iter()
                .map(|category| {
                    button(
                        category.label(),
                        &CallbackAction::SetCategory {
                            expense_id,
                            category_id: category.id,
                        },
                    )
                })
                .collect()
        })
        .collect();
    rows.push(vec![button("🔙 Volver", &CallbackAction::Back(expense_id))]);
    InlineKeyboardMarkup::new(rows)
}

/// Yes / no keyboard for `/clear`.
pub fn clear_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        button("✅ Sí, borrar todo", &CallbackAction::ClearAll),
        button("❌ Cancelar", &CallbackAction::ClearAbort),
    ]])
}

fn kind(expense: &Expense) -> &'static str {
    if expense.is_income {
        "ingreso"
    } else {
        "gasto"
    }
}

/// Proposal body. `updated` switches the heading after a category edit.
pub fn proposal_text(expense: &Expense, updated: bool) -> String {
    let heading = if updated {
        format!("📝 <b>{} actualizado:</b>", capitalized_kind(expense))
    } else {
        match expense.source {
            SourceChannel::Text => format!("📝 <b>Nuevo {} detectado:</b>", kind(expense)),
            SourceChannel::Voice => format!("🎤 <b>{} desde mensaje de voz:</b>", capitalized_kind(expense)),
            SourceChannel::Email => format!("📧 <b>{} detectado en tu correo:</b>", capitalized_kind(expense)),
        }
    };
    let merchant = expense
        .merchant
        .as_deref()
        .map_or_else(|| "No especificado".to_owned(), escape_html);

    format!(
        "{heading}\n\n\
         💵 Monto: <b>{amount} {currency}</b>\n\
         📂 Categoría: {category}\n\
         📋 Descripción: {description}\n\
         🏪 Comercio: {merchant}\n\
         📅 Fecha: {date}\n\n\
         ¿Es correcto?",
        amount = format_money(expense.amount),
        currency = escape_html(&expense.currency),
        category = escape_html(&expense.category_label()),
        description = escape_html(&expense.description),
        date = expense.occurred_at.format("%d/%m/%Y"),
    )
}

fn capitalized_kind(expense: &Expense) -> &'static str {
    if expense.is_income {
        "Ingreso"
    } else {
        "Gasto"
    }
}

/// Heading of the payment picker.
pub fn payment_prompt(expense: &Expense) -> String {
    format!(
        "💳 <b>¿Cómo pagaste?</b>\n\n💵 {} - {}",
        format_money(expense.amount),
        escape_html(&expense.description)
    )
}

/// Body after confirmation.
pub fn confirmed_text(expense: &Expense) -> String {
    let mut text = format!(
        "✅ <b>{} registrado correctamente</b>\n\n💵 {} - {}",
        capitalized_kind(expense),
        format_money(expense.amount),
        escape_html(&expense.description)
    );
    if let Some(method) = &expense.payment_method {
        text.push_str(&format!(
            "\n{} {}",
            method.icon(),
            escape_html(&method.label())
        ));
    }
    text
}

/// Echo of a transcribed voice note.
pub fn heard_text(transcript: &str) -> String {
    format!("🎤 Escuché: <i>{}</i>", escape_html(transcript))
}

/// Clarification question.
pub fn clarification_text(prompt: &str) -> String {
    format!("🤔 {}", escape_html(prompt))
}
