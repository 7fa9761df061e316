//! Telegram slash command handlers.
//!
//! [`dispatch_command`] splits the command, runs the matching handler and
//! returns a [`CommandReply`]. All text output uses HTML parse mode.

use chrono::{Datelike, NaiveDate};
use teloxide::types::InlineKeyboardMarkup;
use tracing::{info, warn};

use crate::parsing::now_local;
use crate::reports::{self, HISTORY_LIMIT};
use crate::store::{year_bounds, ExpenseFilter, StoreError, User};

use super::ui::{clear_keyboard, escape_html};
use super::BotContext;

/// Shortest allowed mailbox check interval, in minutes.
pub const MIN_EMAIL_INTERVAL_MINUTES: i64 = 5;
/// Longest allowed mailbox check interval, in minutes.
pub const MAX_EMAIL_INTERVAL_MINUTES: i64 = 1440;

/// What a command wants sent back.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandReply {
    /// HTML message.
    Html(String),
    /// HTML message with an inline keyboard.
    Keyboard(String, InlineKeyboardMarkup),
    /// File upload.
    Document {
        /// Suggested file name.
        file_name: String,
        /// Contents.
        bytes: Vec<u8>,
        /// Caption.
        caption: String,
    },
}

/// Split `/cmd@bot args` into `("cmd", "args")`.
pub fn split_command(text: &str) -> (&str, &str) {
    let without_slash = text.strip_prefix('/').unwrap_or(text);
    let (full_command, args) = match without_slash.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (without_slash, ""),
    };
    let command = full_command.split('@').next().unwrap_or(full_command);
    (command, args)
}

/// Whether the command carries a secret and its message should be deleted.
pub fn carries_secret(text: &str) -> bool {
    split_command(text).0 == "email_setup"
}

/// `YYYY-MM`, or the current month when empty.
pub fn parse_month_arg(args: &str, today: NaiveDate) -> Option<(i32, u32)> {
    if args.is_empty() {
        return Some((today.year(), today.month()));
    }
    let (year, month) = args.split_once('-')?;
    let year: i32 = year.trim().parse().ok()?;
    let month: u32 = month.trim().parse().ok()?;
    (1..=12).contains(&month).then_some((year, month))
}

/// `YYYY`, or the current year when empty.
pub fn parse_year_arg(args: &str, today: NaiveDate) -> Option<i32> {
    if args.is_empty() {
        return Some(today.year());
    }
    let year: i32 = args.trim().parse().ok()?;
    (1970..=9999).contains(&year).then_some(year)
}

/// `on`/`off` (Spanish forms accepted).
pub fn parse_toggle(args: &str) -> Option<bool> {
    match args.trim().to_lowercase().as_str() {
        "on" | "si" | "sí" | "activar" => Some(true),
        "off" | "no" | "desactivar" => Some(false),
        _ => None,
    }
}

/// Parse and run a slash command for `user`.
///
/// # Errors
///
/// Returns [`StoreError`] on storage failure.
pub async fn dispatch_command(
    ctx: &BotContext,
    user: &User,
    text: &str,
) -> Result<CommandReply, StoreError> {
    let (command, args) = split_command(text);
    let today = now_local(ctx.config.locale.tz()).date();

    let reply = match command {
        "start" => CommandReply::Html(handle_start(user)),
        "help" => CommandReply::Html(handle_help()),
        "categories" => CommandReply::Html(handle_categories(ctx).await?),
        "stats" => match parse_month_arg(args, today) {
            Some((year, month)) => {
                let summary = ctx.store.monthly_summary(user.id, year, month).await?;
                CommandReply::Html(reports::render_monthly(&summary))
            }
            None => CommandReply::Html("❓ Usa: /stats o /stats AAAA-MM".to_owned()),
        },
        "stats_year" => match parse_year_arg(args, today) {
            Some(year) => {
                let summary = ctx.store.yearly_summary(user.id, year).await?;
                CommandReply::Html(reports::render_yearly(&summary))
            }
            None => CommandReply::Html("❓ Usa: /stats_year o /stats_year AAAA".to_owned()),
        },
        "history" => {
            let recent = ctx.store.recent_confirmed(user.id, HISTORY_LIMIT).await?;
            CommandReply::Html(reports::render_history(&recent))
        }
        "delete" => CommandReply::Html(handle_delete(ctx, user, args).await?),
        "clear" => CommandReply::Keyboard(
            "⚠️ <b>¿Estás seguro de borrar TODOS tus gastos?</b>\n\nEsta acción no se puede deshacer."
                .to_owned(),
            clear_keyboard(),
        ),
        "export" => handle_export(ctx, user, args, today).await?,
        "email_setup" => CommandReply::Html(handle_email_setup(ctx, user, args).await?),
        "email_off" => {
            ctx.store.clear_email_account(user.id).await?;
            info!(user_id = user.id, "mailbox disconnected");
            CommandReply::Html("📭 Correo desconectado. Ya no revisaré tu bandeja.".to_owned())
        }
        "email_auto" => CommandReply::Html(handle_email_auto(ctx, user, args).await?),
        "email_interval" => CommandReply::Html(handle_email_interval(ctx, user, args).await?),
        "email_check" => CommandReply::Html(handle_email_check(ctx, user).await?),
        _ => CommandReply::Html(format!(
            "Comando desconocido: /{}\nUsa /help para ver los comandos.",
            escape_html(command)
        )),
    };
    Ok(reply)
}

/// Welcome message.
pub fn handle_start(user: &User) -> String {
    format!(
        "👋 ¡Hola {}! Soy tu bot de gastos personales.\n\n\
         💡 <b>¿Cómo usarme?</b>\n\
         • Envíame un mensaje con tu gasto, por ejemplo:\n\
         \u{a0}\u{a0}- \"Gasté 150 en uber\"\n\
         \u{a0}\u{a0}- \"500 pesos en supermercado\"\n\
         \u{a0}\u{a0}- \"$200 café starbucks\"\n\
         • También puedes enviarme un <b>mensaje de voz</b> 🎤\n\
         • Conecta tu correo con /email_setup y te propondré tus facturas 📧\n\n\
         Usa /help para ver todos los comandos.\n\n\
         ¡Empecemos a registrar tus gastos! 💰",
        escape_html(&user.display_name())
    )
}

/// List all available commands.
pub fn handle_help() -> String {
    [
        "📖 <b>Ayuda - Bot de Gastos</b>",
        "",
        "<b>Registrar gastos:</b>",
        "Envía un mensaje describiendo tu gasto (\"Gasté 300 en gasolina\", \"uber 150\")",
        "o un <b>mensaje de voz</b> 🎤.",
        "",
        "<b>Comandos:</b>",
        "/start - Iniciar el bot",
        "/stats [AAAA-MM] - Estadísticas del mes",
        "/stats_year [AAAA] - Estadísticas del año",
        "/categories - Ver categorías",
        "/history - Últimos 10 gastos",
        "/delete N - Eliminar el gasto N del historial",
        "/clear - Borrar todos tus gastos",
        "/export [AAAA] - Descargar CSV",
        "/email_setup &lt;correo&gt; &lt;contraseña de aplicación&gt; - Conectar Gmail",
        "/email_off - Desconectar correo",
        "/email_auto on|off - Revisión automática",
        "/email_interval &lt;minutos&gt; - Frecuencia de revisión",
        "/email_check - Revisar correo ahora",
        "/help - Esta ayuda",
        "",
        "<b>Confirmación:</b>",
        "Después de cada gasto te preguntaré si es correcto.",
        "Presiona ✅ para confirmar o ❌ para cancelar.",
    ]
    .join("\n")
}

async fn handle_categories(ctx: &BotContext) -> Result<String, StoreError> {
    let categories = ctx.store.list_categories().await?;
    if categories.is_empty() {
        return Ok("No hay categorías configuradas.".to_owned());
    }
    let (income, expense): (Vec<_>, Vec<_>) = categories.iter().partition(|c| c.is_income);
    let mut out = String::from("📂 <b>Categorías de gastos:</b>\n\n");
    for category in expense {
        out.push_str(&escape_html(&category.label()));
        out.push('\n');
    }
    if !income.is_empty() {
        out.push_str("\n💰 <b>Categorías de ingresos:</b>\n\n");
        for category in income {
            out.push_str(&escape_html(&category.label()));
            out.push('\n');
        }
    }
    Ok(out)
}

async fn handle_delete(ctx: &BotContext, user: &User, args: &str) -> Result<String, StoreError> {
    if args.is_empty() {
        return Ok("❓ Usa: /delete [número]\n\nPrimero usa /history para ver los números de tus gastos."
            .to_owned());
    }
    let position = match args.trim().parse::<usize>() {
        Ok(n) if n >= 1 => n,
        _ => return Ok("❌ Por favor indica un número válido. Ejemplo: /delete 1".to_owned()),
    };

    let recent = ctx.store.recent_confirmed(user.id, HISTORY_LIMIT).await?;
    let Some(expense) = position.checked_sub(1).and_then(|i| recent.get(i)) else {
        return Ok(format!(
            "❌ Solo tienes {} gastos en el historial.",
            recent.len()
        ));
    };

    ctx.store.delete_expense(user.id, expense.id).await?;
    info!(user_id = user.id, expense_id = expense.id, "expense deleted from history");
    Ok(format!(
        "🗑️ Gasto eliminado:\n{} - {}",
        reports::format_money(expense.amount),
        escape_html(&crate::parsing::truncate_chars(&expense.description, 30))
    ))
}

async fn handle_export(
    ctx: &BotContext,
    user: &User,
    args: &str,
    today: NaiveDate,
) -> Result<CommandReply, StoreError> {
    let Some(year) = parse_year_arg(args, today) else {
        return Ok(CommandReply::Html("❓ Usa: /export o /export AAAA".to_owned()));
    };
    let Some((from, until)) = year_bounds(year) else {
        return Ok(CommandReply::Html("❓ Usa: /export o /export AAAA".to_owned()));
    };
    let filter = ExpenseFilter {
        from: Some(from),
        until: Some(until),
        confirmed_only: true,
        ..ExpenseFilter::default()
    };
    let expenses = ctx.store.list_expenses(user.id, &filter).await?;
    if expenses.is_empty() {
        return Ok(CommandReply::Html(format!(
            "📋 No tienes gastos confirmados en {year}."
        )));
    }
    match reports::export_csv(&expenses) {
        Ok(bytes) => Ok(CommandReply::Document {
            file_name: format!("gastos_{year}.csv"),
            bytes,
            caption: format!("📎 {} registros de {year}", expenses.len()),
        }),
        Err(e) => {
            warn!(user_id = user.id, error = %e, "csv export failed");
            Ok(CommandReply::Html(super::ui::FAILURE_TEXT.to_owned()))
        }
    }
}

async fn handle_email_setup(
    ctx: &BotContext,
    user: &User,
    args: &str,
) -> Result<String, StoreError> {
    let mut parts = args.split_whitespace();
    let address = parts.next().unwrap_or_default();
    // Gmail shows app passwords in groups of four; accept them with spaces.
    let password: String = parts.collect();
    if !address.contains('@') || password.is_empty() {
        return Ok("❓ Usa: /email_setup &lt;correo&gt; &lt;contraseña de aplicación&gt;\n\n\
                   Genera la contraseña de aplicación en tu cuenta de Google \
                   (Seguridad → Contraseñas de aplicaciones)."
            .to_owned());
    }

    let interval = i64::from(ctx.config.email.default_interval_minutes);
    ctx.store
        .set_email_account(user.id, address, &password, interval)
        .await?;
    info!(user_id = user.id, "mailbox connected");
    Ok(format!(
        "📬 Correo <b>{}</b> conectado. Revisaré tus facturas cada {interval} minutos.\n\
         Borré tu mensaje para no dejar la contraseña en el chat.",
        escape_html(address)
    ))
}

async fn handle_email_auto(ctx: &BotContext, user: &User, args: &str) -> Result<String, StoreError> {
    if user.mail_account().is_none() {
        return Ok(NO_MAILBOX_TEXT.to_owned());
    }
    match parse_toggle(args) {
        Some(enabled) => {
            ctx.store.set_email_auto_check(user.id, enabled).await?;
            Ok(if enabled {
                "✅ Revisión automática de correo activada.".to_owned()
            } else {
                "⏸️ Revisión automática de correo desactivada.".to_owned()
            })
        }
        None => Ok("❓ Usa: /email_auto on|off".to_owned()),
    }
}

async fn handle_email_interval(
    ctx: &BotContext,
    user: &User,
    args: &str,
) -> Result<String, StoreError> {
    match args.trim().parse::<i64>() {
        Ok(minutes)
            if (MIN_EMAIL_INTERVAL_MINUTES..=MAX_EMAIL_INTERVAL_MINUTES).contains(&minutes) =>
        {
            ctx.store.set_email_interval(user.id, minutes).await?;
            Ok(format!("⏱️ Revisaré tu correo cada {minutes} minutos."))
        }
        _ => Ok(format!(
            "❓ Usa: /email_interval &lt;minutos&gt; (entre {MIN_EMAIL_INTERVAL_MINUTES} y {MAX_EMAIL_INTERVAL_MINUTES})"
        )),
    }
}

const NO_MAILBOX_TEXT: &str = "📭 No tienes un correo conectado. Usa /email_setup primero.";

async fn handle_email_check(ctx: &BotContext, user: &User) -> Result<String, StoreError> {
    if user.mail_account().is_none() {
        return Ok(NO_MAILBOX_TEXT.to_owned());
    }
    let Some(scanner) = &ctx.scanner else {
        return Ok("📭 La revisión de correo está desactivada en este servidor.".to_owned());
    };
    let report = scanner.check_user(user).await?;
    if !report.connected {
        return Ok("❌ No pude conectarme a tu correo. Revisa la contraseña de aplicación.".to_owned());
    }
    Ok(format!(
        "📬 Revisé {} correos no leídos: {} parecían facturas, {} propuestas nuevas.",
        report.fetched, report.candidates, report.proposed
    ))
}
