//! Tests for configuration loading, env overrides and validation

use serial_test::serial;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

use dailyquill::config::{Config, DatabaseBackend, ProviderKind};

const ENV_VARS: [&str; 8] = [
    "DAILYQUILL_DAILY_TARGET",
    "DAILYQUILL_TARGET_LANGUAGES",
    "DAILYQUILL_WEB_SEARCH",
    "DAILYQUILL_DB_BACKEND",
    "DAILYQUILL_SQLITE_PATH",
    "DAILYQUILL_DEFAULT_CHUNK_COUNT",
    "DAILYQUILL_PORT",
    "DAILYQUILL_TEST_KEYS",
];

fn clear_env() {
    for var in ENV_VARS {
        std::env::remove_var(var);
    }
}

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

const FULL_CONFIG: &str = r#"
[generation]
daily_target_per_category = 3
source_language = "en"
target_languages = ["es", "fr", "de"]
web_search = true
max_run_minutes = 45

[window]
start_hour = 22
end_hour = 4
min_interval_minutes = 300

[translation]
default_chunk_count = 4

[[providers]]
name = "router"
kind = "openai"
endpoint = "https://openrouter.ai/api/v1"
model = "writer"
api_keys = ["k1", " ", "k2"]
api_keys_env = "DAILYQUILL_TEST_KEYS"

[database]
backend = "sqlite"
sqlite_path = "/var/lib/dailyquill/content.db"

[[categories]]
slug = "health"
display_name = "Health"

[[categories]]
slug = "personal-finance"
display_name = "Personal Finance"

[prompts.health]
system = "You write careful health articles."
"#;

#[test]
#[serial]
fn test_load_from_file() {
    clear_env();
    let file = write_config(FULL_CONFIG);

    let config = Config::load(Some(file.path())).unwrap();

    assert_eq!(config.generation.daily_target_per_category, 3);
    assert_eq!(config.generation.target_languages, vec!["es", "fr", "de"]);
    assert!(config.generation.web_search);
    assert_eq!(config.window.start_hour, 22);
    assert_eq!(config.window.end_hour, 4);
    assert_eq!(config.translation.default_chunk_count, 4);
    assert_eq!(config.providers.len(), 1);
    assert_eq!(config.providers[0].kind, ProviderKind::OpenAi);
    assert_eq!(config.database.backend, DatabaseBackend::Sqlite);
    assert_eq!(
        config.database.sqlite_path,
        PathBuf::from("/var/lib/dailyquill/content.db")
    );
    assert_eq!(config.categories.len(), 2);
    assert_eq!(config.categories[1].slug, "personal-finance");
    assert_eq!(
        config.prompts["health"].system.as_deref(),
        Some("You write careful health articles.")
    );
    assert!(config.run_budget().is_some());
}

#[test]
#[serial]
fn test_env_overrides_file_values() {
    clear_env();
    let file = write_config(FULL_CONFIG);
    std::env::set_var("DAILYQUILL_DAILY_TARGET", "5");
    std::env::set_var("DAILYQUILL_TARGET_LANGUAGES", "pt-br, it");
    std::env::set_var("DAILYQUILL_PORT", "9090");

    let result = Config::load(Some(file.path()));
    clear_env();
    let config = result.unwrap();

    assert_eq!(config.generation.daily_target_per_category, 5);
    assert_eq!(config.generation.target_languages, vec!["pt-br", "it"]);
    assert_eq!(config.server.port, 9090);
    // Untouched values keep the file's setting
    assert_eq!(config.window.start_hour, 22);
}

#[test]
#[serial]
fn test_from_env_on_defaults() {
    clear_env();
    std::env::set_var("DAILYQUILL_WEB_SEARCH", "true");
    std::env::set_var("DAILYQUILL_DB_BACKEND", "postgresql");

    let result = Config::from_env();
    clear_env();
    let config = result.unwrap();

    assert!(config.generation.web_search);
    assert_eq!(config.database.backend, DatabaseBackend::Postgres);
}

#[test]
#[serial]
fn test_bad_env_values_are_errors() {
    clear_env();
    std::env::set_var("DAILYQUILL_DB_BACKEND", "mysql");
    let backend = Config::from_env();
    clear_env();
    assert!(backend.is_err());

    std::env::set_var("DAILYQUILL_DAILY_TARGET", "lots");
    let target = Config::from_env();
    clear_env();
    assert!(target.is_err());
}

#[test]
#[serial]
fn test_env_chunk_count_is_validated() {
    clear_env();
    let file = write_config(FULL_CONFIG);
    std::env::set_var("DAILYQUILL_DEFAULT_CHUNK_COUNT", "11");

    let result = Config::load(Some(file.path()));
    clear_env();
    assert!(result.is_err());
}

#[test]
#[serial]
fn test_api_keys_from_env_list() {
    clear_env();
    let file = write_config(FULL_CONFIG);
    std::env::set_var("DAILYQUILL_TEST_KEYS", "k3,, k4 ");

    let result = Config::load(Some(file.path()));
    let keys = result.as_ref().map(|c| c.providers[0].resolved_keys());
    clear_env();

    assert_eq!(keys.unwrap(), vec!["k1", "k2", "k3", "k4"]);
}

#[test]
#[serial]
fn test_invalid_files_are_rejected() {
    clear_env();
    let cases = [
        // Target equals the source language
        r#"
        [generation]
        target_languages = ["en"]
        "#,
        // Window hour out of range
        r#"
        [window]
        start_hour = 24
        "#,
        // Chunk count above the maximum
        r#"
        [translation]
        default_chunk_count = 12
        "#,
        // Category slug with spaces
        r#"
        [[categories]]
        slug = "Home Garden"
        display_name = "Home & Garden"
        "#,
        // OpenAI provider without any key
        r#"
        [[providers]]
        name = "router"
        kind = "openai"
        endpoint = "https://openrouter.ai/api/v1"
        model = "writer"
        "#,
    ];

    for raw in cases {
        let file = write_config(raw);
        assert!(Config::load(Some(file.path())).is_err(), "accepted:\n{raw}");
    }
}

#[test]
#[serial]
fn test_unparseable_file_is_rejected() {
    clear_env();
    let file = write_config("[generation\ndaily_target_per_category = ");
    let err = Config::load(Some(file.path())).unwrap_err();
    assert!(format!("{err:#}").contains("Failed to parse TOML"));
}

#[test]
#[serial]
fn test_missing_file_is_rejected() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.toml");
    assert!(Config::load(Some(&missing)).is_err());
}
