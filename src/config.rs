//! Configuration loading and validation.
//!
//! Gastos reads a single human-owned `config.toml`. Every section has
//! defaults, so an empty file is a valid configuration. Secrets never live
//! here; they come from the `.env` file (see [`crate::credentials`]).

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Telegram bot settings.
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Model identifiers and client limits.
    #[serde(default)]
    pub models: ModelsConfig,

    /// Currency, timezone and language of the deployment.
    #[serde(default)]
    pub locale: LocaleConfig,

    /// Expense parser tuning.
    #[serde(default)]
    pub parser: ParserConfig,

    /// Pending confirmation lifetime and sweeping.
    #[serde(default)]
    pub confirmation: ConfirmationConfig,

    /// Invoice mailbox scanning.
    #[serde(default)]
    pub email: EmailConfig,

    /// Expense taxonomy. Empty means the built-in table.
    #[serde(default)]
    pub categories: Vec<CategoryConfig>,

    /// Income taxonomy. Empty means the built-in table.
    #[serde(default)]
    pub income_categories: Vec<CategoryConfig>,
}

impl Config {
    /// Expense categories in declaration order, falling back to the built-in table.
    pub fn expense_categories(&self) -> Vec<CategoryConfig> {
        if self.categories.is_empty() {
            default_expense_categories()
        } else {
            self.categories.clone()
        }
    }

    /// Income categories in declaration order, falling back to the built-in table.
    pub fn income_categories(&self) -> Vec<CategoryConfig> {
        if self.income_categories.is_empty() {
            default_income_categories()
        } else {
            self.income_categories.clone()
        }
    }

    /// Whether a Telegram user may talk to the bot. An empty allow-list admits everyone.
    pub fn is_user_allowed(&self, telegram_id: i64) -> bool {
        self.telegram.allowed_users.is_empty() || self.telegram.allowed_users.contains(&telegram_id)
    }
}

/// Telegram-specific configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    /// Credential key holding the bot token.
    #[serde(default = "default_bot_token_env")]
    pub bot_token_env: String,

    /// Telegram user IDs allowed to use the bot. Empty = open to all.
    #[serde(default)]
    pub allowed_users: Vec<i64>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token_env: default_bot_token_env(),
            allowed_users: Vec::new(),
        }
    }
}

/// Model identifiers in `provider/model` form.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    /// Completion model used by the expense parser and invoice interpreter.
    #[serde(default = "default_completion_model")]
    pub completion: String,

    /// Speech-to-text model.
    #[serde(default = "default_transcription_model")]
    pub transcription: String,

    /// Credential key holding the OpenAI API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Upper bound for a single model or transcription call.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            completion: default_completion_model(),
            transcription: default_transcription_model(),
            api_key_env: default_api_key_env(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Locale settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LocaleConfig {
    /// ISO currency code applied when none is detected.
    #[serde(default = "default_currency")]
    pub default_currency: String,

    /// IANA timezone name used for "now" and for month boundaries.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Language hint passed to the transcription service.
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for LocaleConfig {
    fn default() -> Self {
        Self {
            default_currency: default_currency(),
            timezone: default_timezone(),
            language: default_language(),
        }
    }
}

impl LocaleConfig {
    /// Resolve the configured timezone, falling back to `America/Mexico_City`.
    pub fn tz(&self) -> chrono_tz::Tz {
        self.timezone
            .parse::<chrono_tz::Tz>()
            .unwrap_or(chrono_tz::America::Mexico_City)
    }
}

/// Expense parser settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ParserConfig {
    /// Try the regex fast path before calling the model.
    #[serde(default = "default_true")]
    pub fast_path: bool,

    /// Sampling temperature for extraction calls.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Output cap for chat message extraction.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Output cap for invoice extraction.
    #[serde(default = "default_invoice_max_tokens")]
    pub invoice_max_tokens: u32,

    /// Catch-all category name.
    #[serde(default = "default_fallback_category")]
    pub fallback_category: String,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            fast_path: true,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            invoice_max_tokens: default_invoice_max_tokens(),
            fallback_category: default_fallback_category(),
        }
    }
}

/// Pending confirmation settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmationConfig {
    /// Hours before an unanswered confirmation expires.
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u32,

    /// Seconds between expiry sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            ttl_hours: default_ttl_hours(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// Mailbox scanning settings.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    /// Run the background scanner.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Fixed wall-clock tick of the scan loop.
    #[serde(default = "default_scan_tick_secs")]
    pub scan_tick_secs: u64,

    /// Per-user check interval assigned on mailbox setup.
    #[serde(default = "default_interval_minutes")]
    pub default_interval_minutes: u32,

    /// Maximum unread messages fetched per check.
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,

    /// IMAP server host.
    #[serde(default = "default_imap_host")]
    pub imap_host: String,

    /// IMAP server TLS port.
    #[serde(default = "default_imap_port")]
    pub imap_port: u16,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scan_tick_secs: default_scan_tick_secs(),
            default_interval_minutes: default_interval_minutes(),
            max_messages: default_max_messages(),
            imap_host: default_imap_host(),
            imap_port: default_imap_port(),
        }
    }
}

/// One taxonomy entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CategoryConfig {
    /// Canonical category name shown to users and the model.
    pub name: String,

    /// Display emoji.
    #[serde(default)]
    pub emoji: String,

    /// Lower-case keywords matched by substring containment.
    #[serde(default)]
    pub keywords: Vec<String>,
}

fn category(name: &str, emoji: &str, keywords: &[&str]) -> CategoryConfig {
    CategoryConfig {
        name: name.to_owned(),
        emoji: emoji.to_owned(),
        keywords: keywords.iter().map(|k| (*k).to_owned()).collect(),
    }
}

/// Built-in expense taxonomy, in matching order.
pub fn default_expense_categories() -> Vec<CategoryConfig> {
    vec![
        category(
            "Alimentación",
            "🍔",
            &[
                "comida",
                "restaurante",
                "supermercado",
                "mercado",
                "lunch",
                "desayuno",
                "cena",
                "café",
                "cafetería",
            ],
        ),
        category(
            "Transporte",
            "🚗",
            &[
                "uber",
                "didi",
                "taxi",
                "gasolina",
                "gas",
                "estacionamiento",
                "peaje",
                "metro",
                "camión",
                "bus",
            ],
        ),
        category(
            "Hogar",
            "🏠",
            &[
                "renta",
                "alquiler",
                "luz",
                "agua",
                "gas",
                "internet",
                "teléfono",
                "mantenimiento",
            ],
        ),
        category(
            "Compras",
            "🛍️",
            &[
                "amazon",
                "mercado libre",
                "tienda",
                "ropa",
                "electrónica",
                "walmart",
                "costco",
            ],
        ),
        category(
            "Salud",
            "💊",
            &[
                "doctor",
                "médico",
                "farmacia",
                "medicinas",
                "hospital",
                "dentista",
                "consulta",
            ],
        ),
        category(
            "Entretenimiento",
            "🎬",
            &[
                "netflix",
                "spotify",
                "cine",
                "concierto",
                "videojuegos",
                "streaming",
            ],
        ),
        category(
            "Educación",
            "📚",
            &[
                "curso",
                "libro",
                "escuela",
                "universidad",
                "capacitación",
                "udemy",
            ],
        ),
        category(
            "Trabajo",
            "💼",
            &[
                "oficina",
                "equipo",
                "herramientas",
                "software",
                "dominio",
                "hosting",
            ],
        ),
        category("Otros", "📦", &[]),
    ]
}

/// Built-in income taxonomy, matched after the expense taxonomy.
pub fn default_income_categories() -> Vec<CategoryConfig> {
    vec![
        category(
            "Salario",
            "💵",
            &["sueldo", "salario", "nómina", "nomina", "quincena"],
        ),
        category("Freelance", "🧑‍💻", &["freelance", "honorarios", "cliente"]),
        category(
            "Inversiones",
            "📈",
            &["dividendos", "intereses", "rendimiento"],
        ),
        category("Otros ingresos", "💰", &["reembolso", "regalo", "ingreso"]),
    ]
}

// Default value functions for serde

fn default_true() -> bool {
    true
}
fn default_bot_token_env() -> String {
    "TELEGRAM_BOT_TOKEN".to_owned()
}
fn default_completion_model() -> String {
    "openai/gpt-4o-mini".to_owned()
}
fn default_transcription_model() -> String {
    "openai/whisper-1".to_owned()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_owned()
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_currency() -> String {
    "MXN".to_owned()
}
fn default_timezone() -> String {
    "America/Mexico_City".to_owned()
}
fn default_language() -> String {
    "es".to_owned()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_max_tokens() -> u32 {
    300
}
fn default_invoice_max_tokens() -> u32 {
    500
}
fn default_fallback_category() -> String {
    "Otros".to_owned()
}
fn default_ttl_hours() -> u32 {
    24
}
fn default_sweep_interval_secs() -> u64 {
    3600
}
fn default_scan_tick_secs() -> u64 {
    300
}
fn default_interval_minutes() -> u32 {
    60
}
fn default_max_messages() -> usize {
    20
}
fn default_imap_host() -> String {
    "imap.gmail.com".to_owned()
}
fn default_imap_port() -> u16 {
    993
}

/// Load the configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or if
/// [`Config::validate`] rejects it.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config at {}: {e}", path.display()))?;
    let config: Config = toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("failed to parse config at {}: {e}", path.display()))?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid config at {}: {e}", path.display()))?;
    Ok(config)
}

impl Config {
    /// Reject values the runtime cannot work with.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first offending key. Loop periods and
    /// the confirmation lifetime must be non-zero.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.confirmation.sweep_interval_secs == 0 {
            anyhow::bail!("confirmation.sweep_interval_secs must be at least 1");
        }
        if self.confirmation.ttl_hours == 0 {
            anyhow::bail!("confirmation.ttl_hours must be at least 1");
        }
        if self.email.scan_tick_secs == 0 {
            anyhow::bail!("email.scan_tick_secs must be at least 1");
        }
        if self.email.default_interval_minutes == 0 {
            anyhow::bail!("email.default_interval_minutes must be at least 1");
        }
        Ok(())
    }
}

/// Filesystem locations used at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimePaths {
    /// Root directory (`~/.gastos/`).
    pub root: PathBuf,
    /// `config.toml`.
    pub config_toml: PathBuf,
    /// `.env` credentials file.
    pub env_file: PathBuf,
    /// SQLite database.
    pub database: PathBuf,
    /// Rotated JSON logs.
    pub logs_dir: PathBuf,
}

impl RuntimePaths {
    /// Lay out runtime paths under a root directory.
    pub fn under(root: PathBuf) -> Self {
        Self {
            config_toml: root.join("config.toml"),
            env_file: root.join(".env"),
            database: root.join("gastos.db"),
            logs_dir: root.join("logs"),
            root,
        }
    }
}

/// Resolve the default config directory (`~/.gastos/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_dir() -> anyhow::Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".gastos"))
}

/// Resolve runtime paths under [`config_dir`].
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn runtime_paths() -> anyhow::Result<RuntimePaths> {
    Ok(RuntimePaths::under(config_dir()?))
}
