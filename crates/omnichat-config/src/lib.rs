// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the omnichannel chat core.
//!
//! Every section rejects unknown keys. Files are merged from
//! [`search_paths`], `OMNICHAT_*` variables override them, and failures come
//! back as [`ConfigError`] diagnostics ready for [`render_errors`].
//!
//! # Usage
//!
//! ```no_run
//! use omnichat_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("listening on {}:{}", config.gateway.host, config.gateway.port);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

use std::path::Path;

pub use diagnostic::{ConfigError, render_errors};
pub use loader::{load_config, load_config_from_path, load_config_from_str, search_paths};
pub use model::OmnichatConfig;

type Loaded = Result<OmnichatConfig, Vec<ConfigError>>;

/// Load configuration from the XDG hierarchy and validate it.
///
/// Parse failures are resolved against whichever search-path files exist,
/// so diagnostics can point into the right file.
pub fn load_and_validate() -> Loaded {
    checked(loader::load_config(), || {
        loader::search_paths().iter().filter_map(|p| read_source(p)).collect()
    })
}

/// Load an explicit file (plus env overrides) and validate it.
pub fn load_and_validate_path(path: &Path) -> Loaded {
    checked(loader::load_config_from_path(path), || {
        read_source(path).into_iter().collect()
    })
}

/// Load configuration from a TOML string and validate it.
pub fn load_and_validate_str(toml_content: &str) -> Loaded {
    checked(loader::load_config_from_str(toml_content), || {
        vec![("<inline>".to_string(), toml_content.to_string())]
    })
}

/// Runs semantic validation on a parsed config, or converts the parse
/// failure using the sources produced by `sources`.
fn checked(
    parsed: Result<OmnichatConfig, figment::Error>,
    sources: impl FnOnce() -> Vec<(String, String)>,
) -> Loaded {
    let config = parsed.map_err(|err| diagnostic::figment_to_config_errors(err, &sources()))?;
    validation::validate_config(&config)?;
    Ok(config)
}

/// `(absolute path, contents)` if the file is readable.
fn read_source(path: &Path) -> Option<(String, String)> {
    let content = std::fs::read_to_string(path).ok()?;
    let shown = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    Some((shown.display().to_string(), content))
}
