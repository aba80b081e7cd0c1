//! Loading configuration files from disk.

use std::io::Write;
use std::time::Duration;

use huginn::{ConfigProvider, EnrichmentConfig, HuginnError, SharedConfig};
use tokio_test::{assert_err, assert_ok};

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn full_file_is_parsed() {
    let file = write_config(
        r#"
        api_key = "sk-file"
        base_url = "https://llm.internal.example/v1"
        model = "gpt-4o-mini"
        timeout_secs = 10
        max_tokens = 150
        cache_ttl_days = 3
        rate_limit_per_window = 20
        rate_window_secs = 30
        language = "de"
        instruction_template = "Beschreibe das Bild auf {LANGUAGE}."
        batch_chunk_size = 5
        batch_max_items = 25
        batch_pause_ms = 500
        inline_remote_images = false
        "#,
    );

    let config = assert_ok!(EnrichmentConfig::from_file(file.path()));
    assert_eq!(config.credential(), Some("sk-file"));
    assert_eq!(config.base_url, "https://llm.internal.example/v1");
    assert_eq!(config.model, "gpt-4o-mini");
    assert_eq!(config.timeout(), Duration::from_secs(10));
    assert_eq!(config.max_tokens, 150);
    assert_eq!(config.cache_ttl(), Duration::from_secs(3 * 24 * 60 * 60));
    assert_eq!(config.rate_limit_per_window, 20);
    assert_eq!(config.rate_window(), Duration::from_secs(30));
    assert_eq!(config.language, "de");
    assert_eq!(config.batch_chunk_size, 5);
    assert_eq!(config.batch_max_items, 25);
    assert_eq!(config.batch_pause_duration(), Duration::from_millis(500));
    assert!(!config.inline_remote_images);
}

#[test]
fn explicit_path_is_used_by_load() {
    let file = write_config("model = \"gpt-4.1\"\nlanguage = \"fi\"\n");
    let config = assert_ok!(EnrichmentConfig::load(Some(file.path())));
    assert_eq!(config.model, "gpt-4.1");
    assert_eq!(config.language, "fi");
}

#[test]
fn parse_error_names_the_file() {
    let file = write_config("max_tokens = \"lots\"\n");
    let err = assert_err!(EnrichmentConfig::from_file(file.path()));
    assert!(matches!(err, HuginnError::Configuration(_)));
    let file_name = file.path().file_name().unwrap().to_string_lossy().to_string();
    assert!(err.to_string().contains(&file_name));
}

#[test]
fn unknown_keys_are_ignored() {
    let file = write_config("language = \"sv\"\nlegacy_option = true\n");
    let config = assert_ok!(EnrichmentConfig::from_file(file.path()));
    assert_eq!(config.language, "sv");
}

#[test]
fn shared_config_replaces_whole_value() {
    let shared = SharedConfig::new(EnrichmentConfig::new().language("en"));
    shared.set(EnrichmentConfig::new().language("ja").max_tokens(80));

    let current = shared.current();
    assert_eq!(current.language, "ja");
    assert_eq!(current.max_tokens, 80);
}
