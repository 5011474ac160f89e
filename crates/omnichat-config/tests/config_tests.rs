// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the omnichat configuration system.

use omnichat_config::diagnostic::ConfigError;
use omnichat_config::model::OmnichatConfig;
use omnichat_config::{load_and_validate_str, load_config_from_path, load_config_from_str};
use serial_test::serial;

/// Valid TOML with every section deserializes successfully.
#[test]
fn valid_toml_deserializes_into_config() {
    let toml = r#"
[service]
log_level = "debug"
public_base_url = "https://chat.example.com"

[storage]
database_path = "/tmp/chat.db"
busy_timeout_ms = 1000

[vault]
passphrase = "correct horse"

[gateway]
host = "0.0.0.0"
port = 9000
max_ws_queue = 16

[[gateway.operators]]
token = "op-token"
user_id = 7
tenant_id = 3
is_owner = true

[avito]
client_id = "cid"
client_secret = "csecret"
webhook_secret = "whsec"

[avito.bootstrap]
tenant_id = 3

[telegram]
polling = true
poll_timeout_secs = 10

[bus]
enabled = true
broker_url = "http://rabbit:15672"
exchange = "chat"

[media]
root = "/var/lib/omnichat/media"
max_bytes = 1048576

[sync]
concurrency = 4
page_size = 50
offset_cap = 500

[http]
timeout_secs = 15
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.service.log_level, "debug");
    assert_eq!(config.storage.busy_timeout_ms, 1000);
    assert_eq!(config.vault.passphrase.as_deref(), Some("correct horse"));
    assert_eq!(config.gateway.port, 9000);
    assert_eq!(config.gateway.operators.len(), 1);
    assert!(config.gateway.operators[0].is_owner);
    assert_eq!(config.avito.webhook_secret.as_deref(), Some("whsec"));
    assert_eq!(config.avito.bootstrap.as_ref().map(|b| b.tenant_id), Some(3));
    assert!(config.avito.bootstrap.as_ref().is_some_and(|b| b.register_webhook));
    assert!(config.telegram.polling);
    assert_eq!(config.telegram.poll_timeout_secs, 10);
    assert!(config.bus.enabled);
    assert_eq!(config.bus.vhost, "/");
    assert_eq!(config.media.max_bytes, 1_048_576);
    assert_eq!(config.sync.concurrency, 4);
    assert_eq!(config.http.timeout_secs, 15);
}

/// Missing sections fall back to defaults.
#[test]
fn missing_sections_use_defaults() {
    let config = load_config_from_str("").expect("empty TOML should use defaults");

    assert_eq!(config.service.log_level, "info");
    assert_eq!(config.gateway.host, "127.0.0.1");
    assert_eq!(config.gateway.port, 8080);
    assert_eq!(config.gateway.max_ws_queue, 64);
    assert!(config.gateway.operators.is_empty());
    assert_eq!(config.avito.api_base_url, "https://api.avito.ru");
    assert_eq!(config.telegram.api_base_url, "https://api.telegram.org");
    assert!(!config.telegram.polling);
    assert_eq!(config.telegram.poll_timeout_secs, 25);
    assert!(!config.bus.enabled);
    assert_eq!(config.media.max_bytes, 24 * 1024 * 1024);
    assert_eq!(config.sync.concurrency, 10);
    assert_eq!(config.sync.page_size, 100);
    assert_eq!(config.sync.offset_cap, 1000);
    assert_eq!(config.http.timeout_secs, 30);
    assert!(config.vault.key.is_none());
}

#[test]
fn unknown_field_in_gateway_produces_error() {
    let toml = r#"
[gateway]
prot = 9000
"#;

    let err = load_config_from_str(toml).expect_err("should reject unknown field");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("prot"),
        "error should mention the bad key, got: {err_str}"
    );
}

#[test]
fn deny_unknown_fields_at_top_level() {
    let toml = r#"
[logging]
level = "debug"
"#;

    let err = load_config_from_str(toml).expect_err("unknown top-level section should be rejected");
    let err_str = format!("{err}");
    assert!(err_str.contains("unknown field") || err_str.contains("logging"));
}

/// Dotted overrides land on the intended underscore-bearing key.
#[test]
fn dotted_override_targets_underscore_key() {
    use figment::{Figment, providers::Serialized};

    let config: OmnichatConfig = Figment::new()
        .merge(Serialized::defaults(OmnichatConfig::default()))
        .merge(("telegram.webhook_secret_token", "tg-secret"))
        .extract()
        .expect("should set webhook_secret_token via dot notation");

    assert_eq!(
        config.telegram.webhook_secret_token.as_deref(),
        Some("tg-secret")
    );
}

#[test]
#[serial]
fn missing_config_file_is_skipped() {
    let config = load_config_from_path(std::path::Path::new("/nonexistent/omnichat.toml"))
        .expect("missing file should be silently skipped");
    assert_eq!(config.gateway.port, 8080);
}

#[test]
#[serial]
fn env_overrides_file_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("omnichat.toml");
    std::fs::write(&path, "[gateway]\nport = 9000\n\n[telegram]\npolling = false\n").unwrap();

    // SAFETY: serialized with every other test that reads the environment.
    unsafe {
        std::env::set_var("OMNICHAT_GATEWAY_PORT", "9100");
        std::env::set_var("OMNICHAT_TELEGRAM_POLL_TIMEOUT_SECS", "40");
    }
    let loaded = load_config_from_path(&path);
    unsafe {
        std::env::remove_var("OMNICHAT_GATEWAY_PORT");
        std::env::remove_var("OMNICHAT_TELEGRAM_POLL_TIMEOUT_SECS");
    }

    let config = loaded.expect("env values should merge over the file");
    assert_eq!(config.gateway.port, 9100);
    assert_eq!(config.telegram.poll_timeout_secs, 40);
    assert!(!config.telegram.polling);
}

#[test]
fn diagnostic_error_includes_suggestion_and_valid_keys() {
    let toml = r#"
[gateway]
prot = 9000
"#;

    let errors = load_and_validate_str(toml).expect_err("should produce errors");
    let found = errors.iter().any(|e| {
        matches!(e, ConfigError::UnknownKey { key, suggestion, valid_keys, .. } if {
            key == "prot"
                && suggestion.as_deref() == Some("port")
                && valid_keys.contains("max_ws_queue")
        })
    });
    assert!(found, "expected UnknownKey for `prot`, got: {errors:?}");
}

#[test]
fn diagnostic_invalid_type_names_key() {
    let toml = r#"
[sync]
concurrency = "lots"
"#;

    let errors = load_and_validate_str(toml).expect_err("should reject invalid type");
    assert!(errors.iter().any(|e| {
        matches!(e, ConfigError::InvalidType { key, .. } if key.contains("concurrency"))
    }));
}

#[test]
fn config_error_renders_with_miette() {
    use miette::{Diagnostic, GraphicalReportHandler};

    let error = ConfigError::UnknownKey {
        key: "prot".to_string(),
        suggestion: Some("port".to_string()),
        valid_keys: "host, port, max_ws_queue".to_string(),
        span: None,
        src: None,
    };
    assert!(error.code().is_some());
    let help = error.help().map(|h| h.to_string()).unwrap_or_default();
    assert!(help.contains("did you mean `port`"));

    let mut buf = String::new();
    GraphicalReportHandler::new()
        .render_report(&mut buf, &error)
        .expect("should render without error");
    assert!(buf.contains("prot"));
}

#[test]
fn validation_runs_after_parse() {
    let toml = r#"
[sync]
concurrency = 0
"#;

    let errors = load_and_validate_str(toml).expect_err("zero concurrency should fail");
    assert!(errors.iter().any(|e| {
        matches!(e, ConfigError::Validation { message } if message.contains("sync.concurrency"))
    }));
}

#[test]
fn secrets_are_redacted_in_debug() {
    let toml = r#"
[vault]
passphrase = "hunter2"

[avito]
client_secret = "very-secret"

[bus]
password = "brokerpass"
"#;
    let config = load_config_from_str(toml).expect("valid");
    let debug = format!("{config:?}");
    assert!(!debug.contains("hunter2"));
    assert!(!debug.contains("very-secret"));
    assert!(!debug.contains("brokerpass"));
}
