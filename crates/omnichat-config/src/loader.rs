// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./omnichat.toml` > `~/.config/omnichat/omnichat.toml`
//! > `/etc/omnichat/omnichat.toml`, with environment overrides via the
//! `OMNICHAT_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::OmnichatConfig;

const LOCAL_CONFIG: &str = "omnichat.toml";
const SYSTEM_CONFIG: &str = "/etc/omnichat/omnichat.toml";

/// Top-level sections, used to turn `OMNICHAT_GATEWAY_MAX_WS_QUEUE` into
/// `gateway.max_ws_queue`.
const SECTIONS: &[&str] = &[
    "service", "storage", "vault", "gateway", "avito", "telegram", "bus", "media", "sync", "http",
];

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("omnichat").join(LOCAL_CONFIG))
}

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/omnichat/omnichat.toml`
/// 3. `~/.config/omnichat/omnichat.toml`
/// 4. `./omnichat.toml`
/// 5. `OMNICHAT_*` environment variables
pub fn load_config() -> Result<OmnichatConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<OmnichatConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(OmnichatConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<OmnichatConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(OmnichatConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Config files in merge order, lowest precedence first.
pub fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(SYSTEM_CONFIG)];
    paths.extend(user_config_path());
    paths.push(PathBuf::from(LOCAL_CONFIG));
    paths
}

/// Build the Figment used internally for config loading.
pub fn build_figment() -> Figment {
    search_paths()
        .into_iter()
        .fold(
            Figment::new().merge(Serialized::defaults(OmnichatConfig::default())),
            |figment, path| figment.merge(Toml::file(path)),
        )
        .merge(env_provider())
}

/// Environment provider mapping the first `section_` to `section.`.
///
/// Only the leading section is split so underscore-containing keys survive:
/// `OMNICHAT_TELEGRAM_POLL_TIMEOUT_SECS` maps to `telegram.poll_timeout_secs`.
fn env_provider() -> Env {
    Env::prefixed("OMNICHAT_").map(|key| map_env_key(key.as_str()).into())
}

pub(crate) fn map_env_key(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|r| r.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}
