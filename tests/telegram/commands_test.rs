//! Slash command parsing and handlers.

use chrono::NaiveDate;
use gastos::telegram::commands::{
    carries_secret, dispatch_command, handle_help, handle_start, parse_month_arg,
    parse_toggle, parse_year_arg, split_command, CommandReply,
};
use rust_decimal_macros::dec;

use crate::support::{
    bot_context, confirmed_expense, register, seeded_store, ScriptedProvider,
};

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 17).expect("valid date")
}

fn html(reply: CommandReply) -> String {
    match reply {
        CommandReply::Html(body) => body,
        other => panic!("expected an HTML reply, got {other:?}"),
    }
}

#[test]
fn split_command_strips_bot_suffix_and_trims_args() {
    assert_eq!(split_command("/stats"), ("stats", ""));
    assert_eq!(split_command("/stats@gastos_bot 2024-05"), ("stats", "2024-05"));
    assert_eq!(split_command("/delete   3  "), ("delete", "3"));
}

#[test]
fn only_email_setup_carries_a_secret() {
    assert!(carries_secret("/email_setup ana@gmail.com abcd efgh"));
    assert!(carries_secret("/email_setup@gastos_bot ana@gmail.com x"));
    assert!(!carries_secret("/email_check"));
    assert!(!carries_secret("/stats"));
}

#[test]
fn month_argument_defaults_to_today() {
    assert_eq!(parse_month_arg("", today()), Some((2024, 5)));
    assert_eq!(parse_month_arg("2023-12", today()), Some((2023, 12)));
    assert_eq!(parse_month_arg("2023-13", today()), None);
    assert_eq!(parse_month_arg("mayo", today()), None);
}

#[test]
fn year_argument_is_bounded() {
    assert_eq!(parse_year_arg("", today()), Some(2024));
    assert_eq!(parse_year_arg("2022", today()), Some(2022));
    assert_eq!(parse_year_arg("12", today()), None);
    assert_eq!(parse_year_arg("dos mil", today()), None);
}

#[test]
fn toggle_accepts_spanish() {
    assert_eq!(parse_toggle("on"), Some(true));
    assert_eq!(parse_toggle("Sí"), Some(true));
    assert_eq!(parse_toggle("desactivar"), Some(false));
    assert_eq!(parse_toggle("quizás"), None);
}

#[test]
fn help_lists_every_command() {
    let help = handle_help();
    for command in [
        "/start",
        "/stats",
        "/stats_year",
        "/categories",
        "/history",
        "/delete",
        "/clear",
        "/export",
        "/email_setup",
        "/email_off",
        "/email_auto",
        "/email_interval",
        "/email_check",
        "/help",
    ] {
        assert!(help.contains(command), "help is missing {command}");
    }
}

#[tokio::test]
async fn start_greets_by_name_escaped() {
    let (store, _) = seeded_store().await;
    let mut user = register(&store, 1).await;
    user.first_name = Some("<Ana>".to_owned());
    let greeting = handle_start(&user);
    assert!(greeting.contains("&lt;Ana&gt;"));
}

#[tokio::test]
async fn stats_summarizes_the_requested_month() {
    let (store, taxonomy) = seeded_store().await;
    let user = register(&store, 1).await;
    let ctx = bot_context(&store, ScriptedProvider::replying("{}"), &taxonomy);
    confirmed_expense(&store, user.id, "Alimentación", dec!(1250), "2024-03-04").await;

    let body = html(
        dispatch_command(&ctx, &user, "/stats 2024-03")
            .await
            .expect("stats"),
    );
    assert!(body.contains("Marzo 2024"));
    assert!(body.contains("$1,250.00"));

    let usage = html(
        dispatch_command(&ctx, &user, "/stats marzo")
            .await
            .expect("stats"),
    );
    assert!(usage.starts_with("❓"));
}

#[tokio::test]
async fn delete_uses_history_positions() {
    let (store, taxonomy) = seeded_store().await;
    let user = register(&store, 1).await;
    let ctx = bot_context(&store, ScriptedProvider::replying("{}"), &taxonomy);
    let older = confirmed_expense(&store, user.id, "Hogar", dec!(10), "2024-05-01").await;
    let newer = confirmed_expense(&store, user.id, "Hogar", dec!(20), "2024-05-02").await;

    let history = html(dispatch_command(&ctx, &user, "/history").await.expect("history"));
    assert!(history.contains("1. 02/05"));
    assert!(history.contains("2. 01/05"));

    let body = html(dispatch_command(&ctx, &user, "/delete 1").await.expect("delete"));
    assert!(body.contains("$20.00"));
    assert!(store.expense(newer.id).await.expect("lookup").is_none());
    assert!(store.expense(older.id).await.expect("lookup").is_some());

    let out_of_range = html(dispatch_command(&ctx, &user, "/delete 5").await.expect("delete"));
    assert!(out_of_range.contains("Solo tienes 1"));
    let invalid = html(dispatch_command(&ctx, &user, "/delete cero").await.expect("delete"));
    assert!(invalid.starts_with("❌"));
}

#[tokio::test]
async fn clear_asks_before_deleting() {
    let (store, taxonomy) = seeded_store().await;
    let user = register(&store, 1).await;
    let ctx = bot_context(&store, ScriptedProvider::replying("{}"), &taxonomy);

    let reply = dispatch_command(&ctx, &user, "/clear").await.expect("clear");
    let CommandReply::Keyboard(body, keyboard) = reply else {
        panic!("clear should show a confirmation keyboard");
    };
    assert!(body.contains("¿Estás seguro"));
    assert_eq!(keyboard.inline_keyboard[0].len(), 2);
}

#[tokio::test]
async fn export_sends_a_csv_document() {
    let (store, taxonomy) = seeded_store().await;
    let user = register(&store, 1).await;
    let ctx = bot_context(&store, ScriptedProvider::replying("{}"), &taxonomy);

    let empty = html(dispatch_command(&ctx, &user, "/export 2023").await.expect("export"));
    assert!(empty.contains("2023"));

    confirmed_expense(&store, user.id, "Educación", dec!(700), "2023-08-01").await;
    let reply = dispatch_command(&ctx, &user, "/export 2023")
        .await
        .expect("export");
    let CommandReply::Document {
        file_name, bytes, ..
    } = reply
    else {
        panic!("expected a document");
    };
    assert_eq!(file_name, "gastos_2023.csv");
    let csv = String::from_utf8(bytes).expect("utf-8 csv");
    assert!(csv.starts_with("fecha,tipo,categoria"));
    assert!(csv.contains("Educación"));
}

#[tokio::test]
async fn email_commands_manage_the_mailbox() {
    let (store, taxonomy) = seeded_store().await;
    let user = register(&store, 1).await;
    let ctx = bot_context(&store, ScriptedProvider::replying("{}"), &taxonomy);

    let missing = html(
        dispatch_command(&ctx, &user, "/email_auto on")
            .await
            .expect("email_auto"),
    );
    assert!(missing.contains("/email_setup"));

    let bad = html(
        dispatch_command(&ctx, &user, "/email_setup no-at-sign")
            .await
            .expect("email_setup"),
    );
    assert!(bad.starts_with("❓"));

    let connected = html(
        dispatch_command(&ctx, &user, "/email_setup ana@gmail.com abcd efgh ijkl mnop")
            .await
            .expect("email_setup"),
    );
    assert!(connected.contains("ana@gmail.com"));
    assert!(!connected.contains("abcd"));
    let user = store.user(user.id).await.expect("lookup").expect("exists");
    let account = user.mail_account().expect("mailbox stored");
    assert_eq!(account.password, "abcdefghijklmnop");
    assert_eq!(user.email_check_interval, 60);

    let interval = html(
        dispatch_command(&ctx, &user, "/email_interval 2")
            .await
            .expect("email_interval"),
    );
    assert!(interval.starts_with("❓"), "below the minimum");
    html(
        dispatch_command(&ctx, &user, "/email_interval 30")
            .await
            .expect("email_interval"),
    );

    let check = html(
        dispatch_command(&ctx, &user, "/email_check")
            .await
            .expect("email_check"),
    );
    assert!(check.contains("desactivada"), "no scanner in this context");

    html(dispatch_command(&ctx, &user, "/email_off").await.expect("email_off"));
    let user = store.user(user.id).await.expect("lookup").expect("exists");
    assert!(user.mail_account().is_none());
    assert_eq!(user.email_check_interval, 30);
}

#[tokio::test]
async fn unknown_command_is_escaped() {
    let (store, taxonomy) = seeded_store().await;
    let user = register(&store, 1).await;
    let ctx = bot_context(&store, ScriptedProvider::replying("{}"), &taxonomy);

    let body = html(dispatch_command(&ctx, &user, "/<b>").await.expect("dispatch"));
    assert!(body.contains("/&lt;b&gt;"));
}
