//! Coverage for config parsing and path resolution.

use std::path::PathBuf;

use gastos::config::{config_dir, load_config, Config, RuntimePaths};

#[test]
fn config_dir_resolves() {
    let path = match config_dir() {
        Ok(path) => path,
        Err(err) => panic!("config dir should resolve: {err}"),
    };
    assert!(path.ends_with(".gastos"));
}

#[test]
fn runtime_paths_live_under_root() {
    let paths = RuntimePaths::under(PathBuf::from("/srv/gastos"));
    assert_eq!(paths.config_toml, PathBuf::from("/srv/gastos/config.toml"));
    assert_eq!(paths.env_file, PathBuf::from("/srv/gastos/.env"));
    assert_eq!(paths.database, PathBuf::from("/srv/gastos/gastos.db"));
    assert_eq!(paths.logs_dir, PathBuf::from("/srv/gastos/logs"));
}

#[test]
fn parse_partial_config_keeps_other_defaults() {
    let toml_str = r#"
[telegram]
allowed_users = [123456789]

[locale]
default_currency = "USD"

[email]
enabled = false
"#;
    let config = match toml::from_str::<Config>(toml_str) {
        Ok(config) => config,
        Err(err) => panic!("partial config should parse: {err}"),
    };
    assert_eq!(config.telegram.allowed_users, vec![123456789]);
    assert_eq!(config.telegram.bot_token_env, "TELEGRAM_BOT_TOKEN");
    assert_eq!(config.locale.default_currency, "USD");
    assert_eq!(config.locale.timezone, "America/Mexico_City");
    assert!(!config.email.enabled);
    assert_eq!(config.email.imap_host, "imap.gmail.com");
    assert_eq!(config.confirmation.sweep_interval_secs, 3600);
}

#[test]
fn allowed_users_gate() {
    let open = Config::default();
    assert!(open.is_user_allowed(42));

    let closed: Config =
        toml::from_str("[telegram]\nallowed_users = [7]\n").expect("config should parse");
    assert!(closed.is_user_allowed(7));
    assert!(!closed.is_user_allowed(42));
}

#[test]
fn custom_categories_replace_builtin_table() {
    let toml_str = r#"
[[categories]]
name = "Mascotas"
emoji = "🐶"
keywords = ["veterinario", "croquetas"]

[[income_categories]]
name = "Rentas"
emoji = "🏠"
"#;
    let config: Config = toml::from_str(toml_str).expect("config should parse");
    let expense: Vec<String> = config
        .expense_categories()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(expense, vec!["Mascotas"]);
    let income = config.income_categories();
    assert_eq!(income.len(), 1);
    assert_eq!(income[0].name, "Rentas");
    assert!(income[0].keywords.is_empty());
}

#[test]
fn invalid_timezone_falls_back_to_mexico_city() {
    let config: Config =
        toml::from_str("[locale]\ntimezone = \"Mars/Olympus\"\n").expect("config should parse");
    assert_eq!(config.locale.tz(), chrono_tz::America::Mexico_City);
}

#[test]
fn load_config_reports_missing_file() {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let result = load_config(&dir.path().join("config.toml"));
    assert!(result.is_err());
}

#[test]
fn load_config_reads_file() {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[confirmation]\nttl_hours = 6\n").expect("should write config");
    let config = load_config(&path).expect("config should load");
    assert_eq!(config.confirmation.ttl_hours, 6);
}

#[test]
fn load_config_rejects_zero_loop_periods() {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let path = dir.path().join("config.toml");

    std::fs::write(&path, "[confirmation]\nsweep_interval_secs = 0\n")
        .expect("should write config");
    let err = load_config(&path).expect_err("zero sweep interval should be rejected");
    assert!(err.to_string().contains("sweep_interval_secs"));

    std::fs::write(&path, "[email]\nscan_tick_secs = 0\n").expect("should write config");
    let err = load_config(&path).expect_err("zero scan tick should be rejected");
    assert!(err.to_string().contains("scan_tick_secs"));
}

#[test]
fn defaults_pass_validation() {
    assert!(Config::default().validate().is_ok());
}
