//! Gastos: Telegram expense tracker.
//!
//! Subcommands:
//! - `init`: create `~/.gastos/` with a default config and `.env` template
//! - `start`: run the Telegram bot, mailbox scanner and expiry sweeper
//! - `status`: print runtime paths and database state
//! - `export`: write one user's confirmed records for a year as CSV
//! - `sweep`: purge expired pending records once

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Datelike;
use clap::{Parser, Subcommand};
use teloxide::Bot;
use tokio::sync::watch;
use tracing::{info, warn};

use gastos::config::{load_config, runtime_paths, Config, RuntimePaths};
use gastos::confirm::ConfirmationMachine;
use gastos::credentials::{
    enforce_private_file_permissions, load_credentials, resolve_api_key, Credentials,
};
use gastos::intake::Intake;
use gastos::logging;
use gastos::mailbox::imap::{ImapConnector, ImapServer};
use gastos::parsing::category::Taxonomy;
use gastos::parsing::fast_path::FastPathParser;
use gastos::parsing::invoice::InvoiceInterpreter;
use gastos::parsing::model::{ModelLimits, ModelParser};
use gastos::parsing::ExpenseParser;
use gastos::providers::parse_provider_string;
use gastos::providers::router::build_provider;
use gastos::reports;
use gastos::scanner::{run_sweeper, MailScanner, ScanSettings};
use gastos::store::{now_utc, year_bounds, ExpenseFilter, Store};
use gastos::telegram::{run_telegram, BotContext, TelegramSender};
use gastos::transcription::WhisperTranscriber;

const DEFAULT_CONFIG: &str = r#"# Gastos configuration. Every section is optional.

[telegram]
bot_token_env = "TELEGRAM_BOT_TOKEN"
# Telegram user ids allowed to use the bot. Empty means everyone.
allowed_users = []

[models]
completion = "openai/gpt-4o-mini"
transcription = "openai/whisper-1"
api_key_env = "OPENAI_API_KEY"
request_timeout_secs = 30

[locale]
default_currency = "MXN"
timezone = "America/Mexico_City"
language = "es"

[parser]
fast_path = true
temperature = 0.1
max_tokens = 300
invoice_max_tokens = 500
fallback_category = "Otros"

[confirmation]
ttl_hours = 24
sweep_interval_secs = 3600

[email]
enabled = true
scan_tick_secs = 300
default_interval_minutes = 60
max_messages = 20
imap_host = "imap.gmail.com"
imap_port = 993
"#;

const DEFAULT_ENV: &str = "TELEGRAM_BOT_TOKEN=\nOPENAI_API_KEY=\n";

#[derive(Parser)]
#[command(name = "gastos", version, about = "Telegram expense tracker")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create ~/.gastos with a default config.toml and .env template.
    Init,
    /// Run the bot.
    Start,
    /// Show runtime paths and database state.
    Status,
    /// Export a user's confirmed records for a year as CSV.
    Export {
        /// Telegram user id.
        #[arg(long)]
        telegram_id: i64,
        /// Calendar year; defaults to the current one.
        #[arg(long)]
        year: Option<i32>,
        /// Output file; defaults to gastos_<year>.csv.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Purge expired pending records once.
    Sweep,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let paths = runtime_paths()?;

    match cli.command {
        Command::Init => {
            logging::init_cli();
            init(&paths)
        }
        Command::Start => start(&paths).await,
        Command::Status => {
            logging::init_cli();
            status(&paths).await
        }
        Command::Export {
            telegram_id,
            year,
            output,
        } => {
            logging::init_cli();
            export(&paths, telegram_id, year, output).await
        }
        Command::Sweep => {
            logging::init_cli();
            sweep(&paths).await
        }
    }
}

fn init(paths: &RuntimePaths) -> anyhow::Result<()> {
    std::fs::create_dir_all(&paths.root)
        .with_context(|| format!("failed to create {}", paths.root.display()))?;

    if paths.config_toml.exists() {
        println!("config exists: {}", paths.config_toml.display());
    } else {
        std::fs::write(&paths.config_toml, DEFAULT_CONFIG)
            .with_context(|| format!("failed to write {}", paths.config_toml.display()))?;
        println!("created {}", paths.config_toml.display());
    }

    if paths.env_file.exists() {
        println!("credentials exist: {}", paths.env_file.display());
    } else {
        std::fs::write(&paths.env_file, DEFAULT_ENV)
            .with_context(|| format!("failed to write {}", paths.env_file.display()))?;
        println!("created {}", paths.env_file.display());
    }
    enforce_private_file_permissions(&paths.env_file)?;

    println!("fill in {} and run `gastos start`", paths.env_file.display());
    Ok(())
}

fn load_settings(paths: &RuntimePaths) -> anyhow::Result<(Config, Credentials)> {
    let config = load_config(&paths.config_toml)
        .with_context(|| "run `gastos init` to create a default configuration")?;
    let credentials = load_credentials(&paths.env_file)?;
    Ok((config, credentials))
}

async fn open_store(paths: &RuntimePaths, config: &Config) -> anyhow::Result<(Store, Arc<Taxonomy>)> {
    let store = Store::open(&paths.database)
        .await
        .with_context(|| format!("failed to open database {}", paths.database.display()))?;
    let taxonomy = Arc::new(Taxonomy::from_config(config));
    let seeded = store.seed_categories(&taxonomy).await?;
    if seeded > 0 {
        info!(seeded, "categories seeded");
    }
    Ok((store, taxonomy))
}

fn confirmation_ttl(config: &Config) -> chrono::Duration {
    chrono::Duration::hours(i64::from(config.confirmation.ttl_hours))
}

async fn start(paths: &RuntimePaths) -> anyhow::Result<()> {
    let _guard = logging::init_production(&paths.logs_dir)?;
    let (config, credentials) = load_settings(paths)?;
    let config = Arc::new(config);
    info!(version = env!("CARGO_PKG_VERSION"), "gastos starting");

    let (store, taxonomy) = open_store(paths, &config).await?;
    let timezone = config.locale.tz();
    let ttl = confirmation_ttl(&config);
    let timeout = Duration::from_secs(config.models.request_timeout_secs);
    let currency = config.locale.default_currency.clone();

    let provider = build_provider(
        &config.models.completion,
        &credentials,
        &config.models.api_key_env,
        timeout,
    )?;
    info!(model = %config.models.completion, "completion provider ready");

    let fast_path = config
        .parser
        .fast_path
        .then(|| FastPathParser::new(Arc::clone(&taxonomy), currency.clone(), timezone));
    let model = ModelParser::new(
        Arc::clone(&provider),
        Arc::clone(&taxonomy),
        currency.clone(),
        ModelLimits {
            temperature: config.parser.temperature,
            max_tokens: config.parser.max_tokens,
        },
    );
    let interpreter = Arc::new(InvoiceInterpreter::new(
        Arc::clone(&provider),
        Arc::clone(&taxonomy),
        currency,
        ModelLimits {
            temperature: config.parser.temperature,
            max_tokens: config.parser.invoice_max_tokens,
        },
    ));

    let mut intake = Intake::new(
        store.clone(),
        ExpenseParser::new(fast_path, model),
        Arc::clone(&taxonomy),
        timezone,
        ttl,
    );
    match build_transcriber(&config, &credentials, timeout) {
        Some(transcriber) => intake = intake.with_transcriber(Arc::new(transcriber)),
        None => warn!("voice notes disabled: no transcription credential"),
    }
    let intake = Arc::new(intake);
    let confirmations = ConfirmationMachine::new(store.clone(), ttl);

    let token = credentials
        .get_or_env(&config.telegram.bot_token_env)
        .ok_or_else(|| anyhow::anyhow!("missing credential {}", config.telegram.bot_token_env))?;
    let bot = Bot::new(token);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scanner = if config.email.enabled {
        let scanner = Arc::new(MailScanner::new(
            store.clone(),
            Arc::clone(&intake),
            interpreter,
            Arc::new(ImapConnector::new(ImapServer {
                host: config.email.imap_host.clone(),
                port: config.email.imap_port,
            })),
            Arc::new(TelegramSender::new(bot.clone())),
            ScanSettings {
                tick: Duration::from_secs(config.email.scan_tick_secs),
                max_messages: config.email.max_messages,
                timezone,
            },
        ));
        tokio::spawn(Arc::clone(&scanner).run(shutdown_rx.clone()));
        Some(scanner)
    } else {
        info!("mailbox scanning disabled");
        None
    };

    tokio::spawn(run_sweeper(
        confirmations.clone(),
        Duration::from_secs(config.confirmation.sweep_interval_secs),
        shutdown_rx,
    ));

    let ctx = BotContext {
        config: Arc::clone(&config),
        store,
        intake,
        confirmations,
        scanner,
    };

    let result = run_telegram(bot, ctx).await;
    if shutdown_tx.send(true).is_err() {
        warn!("background tasks already stopped");
    }
    info!("gastos stopped");
    result
}

fn build_transcriber(
    config: &Config,
    credentials: &Credentials,
    timeout: Duration,
) -> Option<WhisperTranscriber> {
    let (provider, model) = match parse_provider_string(&config.models.transcription) {
        Ok(parts) => parts,
        Err(e) => {
            warn!(error = %e, "invalid transcription model");
            return None;
        }
    };
    if provider != "openai" {
        warn!(provider, "unsupported transcription provider");
        return None;
    }
    let key = resolve_api_key(credentials, &config.models.api_key_env)?;
    Some(WhisperTranscriber::new(
        model.to_owned(),
        config.locale.language.clone(),
        key,
        timeout,
    ))
}

async fn status(paths: &RuntimePaths) -> anyhow::Result<()> {
    println!("root:        {}", paths.root.display());
    println!("config:      {} ({})", paths.config_toml.display(), presence(&paths.config_toml));
    println!("credentials: {} ({})", paths.env_file.display(), presence(&paths.env_file));
    println!("database:    {} ({})", paths.database.display(), presence(&paths.database));
    println!("logs:        {}", paths.logs_dir.display());

    if !paths.database.exists() {
        return Ok(());
    }
    let store = Store::open(&paths.database).await?;
    let categories = store.list_categories().await?;
    let scanning = store.users_with_auto_check().await?;
    println!("categories:  {}", categories.len());
    println!("auto-check:  {} users", scanning.len());
    Ok(())
}

fn presence(path: &std::path::Path) -> &'static str {
    if path.exists() {
        "ok"
    } else {
        "missing"
    }
}

async fn export(
    paths: &RuntimePaths,
    telegram_id: i64,
    year: Option<i32>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let config = load_config(&paths.config_toml)?;
    let year = year.unwrap_or_else(|| now_utc().with_timezone(&config.locale.tz()).year());
    let (from, until) =
        year_bounds(year).ok_or_else(|| anyhow::anyhow!("invalid year {year}"))?;

    let store = Store::open(&paths.database).await?;
    let user = store
        .user_by_telegram_id(telegram_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("no user with telegram id {telegram_id}"))?;
    let expenses = store
        .list_expenses(
            user.id,
            &ExpenseFilter {
                from: Some(from),
                until: Some(until),
                confirmed_only: true,
                ..ExpenseFilter::default()
            },
        )
        .await?;

    let bytes = reports::export_csv(&expenses)?;
    let output = output.unwrap_or_else(|| PathBuf::from(format!("gastos_{year}.csv")));
    std::fs::write(&output, bytes)
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!("{} records written to {}", expenses.len(), output.display());
    Ok(())
}

async fn sweep(paths: &RuntimePaths) -> anyhow::Result<()> {
    let config = load_config(&paths.config_toml)?;
    let store = Store::open(&paths.database).await?;
    let machine = ConfirmationMachine::new(store, confirmation_ttl(&config));
    let removed = machine.sweep(now_utc()).await?;
    println!("{removed} expired pending records removed");
    Ok(())
}
