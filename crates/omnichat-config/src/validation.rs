// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks semantic constraints serde cannot express. Every violation is
//! collected before returning.

use std::collections::HashSet;

use base64::Engine;

use crate::diagnostic::ConfigError;
use crate::model::OmnichatConfig;

/// Validate a deserialized configuration for semantic correctness.
pub fn validate_config(config: &OmnichatConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if !matches!(
        config.service.log_level.as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    ) {
        fail(format!(
            "service.log_level `{}` must be one of trace, debug, info, warn, error",
            config.service.log_level
        ));
    }

    match url::Url::parse(&config.service.public_base_url) {
        Ok(u) if u.scheme() == "http" || u.scheme() == "https" => {}
        _ => fail(format!(
            "service.public_base_url `{}` must be an absolute http(s) URL",
            config.service.public_base_url
        )),
    }

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    let host = config.gateway.host.trim();
    if host.is_empty() {
        fail("gateway.host must not be empty".to_string());
    } else {
        let is_valid_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-');
        if !is_valid_ip && !is_valid_hostname {
            fail(format!(
                "gateway.host `{host}` is not a valid IP address or hostname"
            ));
        }
    }

    if config.gateway.max_ws_queue == 0 {
        fail("gateway.max_ws_queue must be at least 1".to_string());
    }

    let mut seen_tokens = HashSet::new();
    for (i, op) in config.gateway.operators.iter().enumerate() {
        if op.token.trim().is_empty() {
            fail(format!("gateway.operators[{i}].token must not be empty"));
        } else if !seen_tokens.insert(op.token.as_str()) {
            fail(format!("gateway.operators[{i}].token is used twice"));
        }
    }

    if let Some(url) = &config.gateway.identity_url
        && url::Url::parse(url).is_err()
    {
        fail(format!("gateway.identity_url `{url}` is not a valid URL"));
    }

    if let Some(key) = &config.vault.key {
        match base64::engine::general_purpose::STANDARD.decode(key.trim()) {
            Ok(bytes) if bytes.len() == 32 => {}
            Ok(bytes) => fail(format!(
                "vault.key must decode to 32 bytes, got {}",
                bytes.len()
            )),
            Err(_) => fail("vault.key is not valid base64".to_string()),
        }
    }

    if config.vault.key.is_some() && config.vault.passphrase.is_some() {
        fail("set only one of vault.key and vault.passphrase".to_string());
    }

    if config.vault.kdf_memory_cost < 32768 {
        fail(format!(
            "vault.kdf_memory_cost must be at least 32768 (32 MiB), got {}",
            config.vault.kdf_memory_cost
        ));
    }

    if config.vault.kdf_iterations < 2 {
        fail(format!(
            "vault.kdf_iterations must be at least 2, got {}",
            config.vault.kdf_iterations
        ));
    }

    if config.vault.kdf_parallelism < 1 {
        fail(format!(
            "vault.kdf_parallelism must be at least 1, got {}",
            config.vault.kdf_parallelism
        ));
    }

    for (name, value) in [
        ("avito.api_base_url", &config.avito.api_base_url),
        ("avito.authorize_url", &config.avito.authorize_url),
        ("telegram.api_base_url", &config.telegram.api_base_url),
    ] {
        if url::Url::parse(value).is_err() {
            fail(format!("{name} `{value}` is not a valid URL"));
        }
    }

    if let Some(bootstrap) = &config.avito.bootstrap
        && bootstrap.access_token.is_none()
        && bootstrap.client_id.is_none()
        && config.avito.client_id.is_none()
    {
        fail("avito.bootstrap needs an access_token or client credentials".to_string());
    }

    if config.bus.enabled && url::Url::parse(&config.bus.broker_url).is_err() {
        fail(format!(
            "bus.broker_url `{}` is not a valid URL",
            config.bus.broker_url
        ));
    }

    if config.media.root.trim().is_empty() {
        fail("media.root must not be empty".to_string());
    }

    if config.media.max_bytes == 0 {
        fail("media.max_bytes must be greater than 0".to_string());
    }

    if config.sync.concurrency == 0 {
        fail("sync.concurrency must be at least 1".to_string());
    }

    if config.sync.page_size == 0 {
        fail("sync.page_size must be at least 1".to_string());
    }

    if config.http.timeout_secs == 0 {
        fail("http.timeout_secs must be at least 1".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OperatorConfig;

    fn has(errors: &[ConfigError], needle: &str) -> bool {
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains(needle)))
    }

    #[test]
    fn default_config_validates() {
        let config = OmnichatConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn empty_database_path_fails_validation() {
        let mut config = OmnichatConfig::default();
        config.storage.database_path = "".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has(&errors, "database_path"));
    }

    #[test]
    fn relative_public_url_fails_validation() {
        let mut config = OmnichatConfig::default();
        config.service.public_base_url = "/api".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has(&errors, "public_base_url"));
    }

    #[test]
    fn short_vault_key_fails_validation() {
        let mut config = OmnichatConfig::default();
        config.vault.key = Some(base64::engine::general_purpose::STANDARD.encode([0u8; 16]));
        let errors = validate_config(&config).unwrap_err();
        assert!(has(&errors, "32 bytes"));
    }

    #[test]
    fn full_vault_key_passes() {
        let mut config = OmnichatConfig::default();
        config.vault.key = Some(base64::engine::general_purpose::STANDARD.encode([7u8; 32]));
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn zero_concurrency_fails_validation() {
        let mut config = OmnichatConfig::default();
        config.sync.concurrency = 0;
        config.gateway.max_ws_queue = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(has(&errors, "sync.concurrency"));
        assert!(has(&errors, "max_ws_queue"));
    }

    #[test]
    fn duplicate_operator_tokens_fail() {
        let mut config = OmnichatConfig::default();
        let op = OperatorConfig {
            token: "t".into(),
            user_id: 1,
            tenant_id: 1,
            is_owner: false,
            name: None,
        };
        config.gateway.operators = vec![op.clone(), op];
        let errors = validate_config(&config).unwrap_err();
        assert!(has(&errors, "used twice"));
    }

    #[test]
    fn all_violations_are_collected() {
        let mut config = OmnichatConfig::default();
        config.storage.database_path = " ".into();
        config.media.root = "".into();
        config.http.timeout_secs = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }
}
