//! Summary rendering (HTML) and CSV export.

use anyhow::Context;
use csv::WriterBuilder;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::parsing::truncate_chars;
use crate::store::{Expense, MonthlySummary, YearlySummary};
use crate::telegram::ui::escape_html;

const MONTHS: [&str; 12] = [
    "Enero",
    "Febrero",
    "Marzo",
    "Abril",
    "Mayo",
    "Junio",
    "Julio",
    "Agosto",
    "Septiembre",
    "Octubre",
    "Noviembre",
    "Diciembre",
];

const MONTHS_SHORT: [&str; 12] = [
    "Ene", "Feb", "Mar", "Abr", "May", "Jun", "Jul", "Ago", "Sep", "Oct", "Nov", "Dic",
];

/// Rows listed by `/history`.
pub const HISTORY_LIMIT: i64 = 10;
const HISTORY_DESCRIPTION_CHARS: usize = 30;

/// CSV header row.
pub const CSV_HEADERS: [&str; 9] = [
    "fecha",
    "tipo",
    "categoria",
    "descripcion",
    "comercio",
    "monto",
    "moneda",
    "metodo_pago",
    "origen",
];

/// Spanish month name for 1-12.
pub fn month_name(month: u32) -> &'static str {
    month_index(month).map_or("?", |i| MONTHS[i])
}

/// Abbreviated Spanish month name for 1-12.
pub fn month_short_name(month: u32) -> &'static str {
    month_index(month).map_or("?", |i| MONTHS_SHORT[i])
}

fn month_index(month: u32) -> Option<usize> {
    let index = usize::try_from(month.checked_sub(1)?).ok()?;
    (index < 12).then_some(index)
}

/// `$1,234.50` style amount, two decimals, half-up rounding.
pub fn format_money(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let text = format!("{:.2}", rounded.abs());
    let (int_part, frac_part) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let digits: Vec<char> = int_part.chars().collect();
    let mut grouped = String::with_capacity(digits.len().saturating_add(digits.len() / 3));
    for (i, digit) in digits.iter().enumerate() {
        let remaining = digits.len().saturating_sub(i);
        if i > 0 && remaining % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(*digit);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    format!("{sign}${grouped}.{frac_part}")
}

/// `/stats` body.
pub fn render_monthly(summary: &MonthlySummary) -> String {
    let mut out = format!(
        "📊 <b>Estadísticas de {} {}</b>\n\n",
        month_name(summary.month),
        summary.year
    );
    if summary.is_empty() {
        out.push_str("<i>No hay gastos registrados este mes.</i>");
        return out;
    }

    for total in &summary.expense {
        out.push_str(&format!(
            "{}: {} ({} gastos)\n",
            escape_html(&total.label()),
            format_money(total.total),
            total.count
        ));
    }
    out.push_str(&format!(
        "\n💸 <b>Total gastos: {}</b>",
        format_money(summary.total_expense)
    ));

    if !summary.income.is_empty() {
        out.push_str("\n\n<b>Ingresos</b>\n");
        for total in &summary.income {
            out.push_str(&format!(
                "{}: {} ({})\n",
                escape_html(&total.label()),
                format_money(total.total),
                total.count
            ));
        }
        out.push_str(&format!(
            "\n💰 <b>Total ingresos: {}</b>\n⚖️ <b>Balance: {}</b>",
            format_money(summary.total_income),
            format_money(summary.net())
        ));
    }
    out
}

/// `/stats_year` body.
pub fn render_yearly(summary: &YearlySummary) -> String {
    let mut out = format!("📈 <b>Estadísticas de {}</b>\n\n", summary.year);
    let active: Vec<_> = summary
        .months
        .iter()
        .filter(|m| m.expense_count > 0 || m.income_count > 0)
        .collect();
    if active.is_empty() {
        out.push_str("<i>No hay gastos registrados este año.</i>");
        return out;
    }

    for month in active {
        out.push_str(&format!(
            "📅 {}: {} ({} gastos)",
            month_short_name(month.month),
            format_money(month.expense_total),
            month.expense_count
        ));
        if month.income_count > 0 {
            out.push_str(&format!(" · ingresos {}", format_money(month.income_total)));
        }
        out.push('\n');
    }

    out.push_str(&format!(
        "\n💸 <b>Total anual: {}</b>",
        format_money(summary.total_expense)
    ));
    if summary.total_income > Decimal::ZERO {
        out.push_str(&format!(
            "\n💰 <b>Ingresos: {}</b>\n⚖️ <b>Balance: {}</b>",
            format_money(summary.total_income),
            format_money(summary.net())
        ));
    }
    out
}

/// `/history` body, numbered from 1 for `/delete N`.
pub fn render_history(expenses: &[Expense]) -> String {
    if expenses.is_empty() {
        return "📋 No tienes gastos registrados aún.".to_owned();
    }
    let mut out = String::from("📋 <b>Últimos gastos:</b>\n\n");
    for (n, expense) in (1_usize..).zip(expenses) {
        let sign = if expense.is_income { "+" } else { "" };
        out.push_str(&format!(
            "{n}. {} - {sign}{} - {}\n",
            expense.occurred_at.format("%d/%m"),
            format_money(expense.amount),
            escape_html(&truncate_chars(&expense.description, HISTORY_DESCRIPTION_CHARS))
        ));
    }
    out.push_str("\n<i>Usa /delete [número] para eliminar un gasto</i>");
    out
}

/// CSV document of `expenses`, header row first.
///
/// # Errors
///
/// Returns an error if a row cannot be serialized.
pub fn export_csv(expenses: &[Expense]) -> anyhow::Result<Vec<u8>> {
    let mut writer = WriterBuilder::new().has_headers(true).from_writer(Vec::new());
    writer
        .write_record(CSV_HEADERS)
        .context("failed to write CSV header")?;
    for expense in expenses {
        writer
            .write_record([
                expense.occurred_at.format("%Y-%m-%d %H:%M").to_string(),
                if expense.is_income { "ingreso" } else { "gasto" }.to_owned(),
                expense
                    .category_name
                    .clone()
                    .unwrap_or_else(|| crate::store::UNCATEGORIZED_NAME.to_owned()),
                expense.description.clone(),
                expense.merchant.clone().unwrap_or_default(),
                expense.amount.to_string(),
                expense.currency.clone(),
                expense
                    .payment_method
                    .as_ref()
                    .map(|m| m.as_str().to_owned())
                    .unwrap_or_default(),
                expense.source.as_str().to_owned(),
            ])
            .with_context(|| format!("failed to write CSV row for expense {}", expense.id))?;
    }
    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("failed to flush CSV: {}", e.error()))
}
