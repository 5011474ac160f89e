// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Config diagnostics rendered through miette.
//!
//! Figment reports every problem it hits while extracting [`OmnichatConfig`];
//! each one becomes a [`ConfigError`] pointing at the offending line of the
//! TOML file it came from, with a "did you mean" hint for misspelled keys.
//!
//! [`OmnichatConfig`]: crate::model::OmnichatConfig

#![allow(unused_assignments)] // emitted by the miette derive

use figment::error::Kind;
use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Jaro-Winkler score a valid key must beat to be offered as a correction.
const SUGGESTION_THRESHOLD: f64 = 0.75;

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("unknown configuration key `{key}`")]
    #[diagnostic(
        code(omnichat::config::unknown_key),
        help("{}", unknown_key_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        key: String,
        suggestion: Option<String>,
        /// Comma separated keys accepted by the enclosing table.
        valid_keys: String,
        #[label("not a known key here")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("invalid type for key `{key}`: {detail}")]
    #[diagnostic(code(omnichat::config::invalid_type), help("expected {expected}"))]
    InvalidType {
        /// Dotted path, e.g. `sync.concurrency`.
        key: String,
        detail: String,
        expected: String,
        #[label("this value")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("missing required key `{key}`")]
    #[diagnostic(
        code(omnichat::config::missing_key),
        help("set `{key}` in omnichat.toml or through an OMNICHAT_ variable")
    )]
    MissingKey { key: String },

    /// A value parsed but is not usable, e.g. a zero worker count.
    #[error("validation error: {message}")]
    #[diagnostic(code(omnichat::config::validation))]
    Validation { message: String },

    #[error("configuration error: {0}")]
    #[diagnostic(code(omnichat::config::other))]
    Other(String),
}

fn unknown_key_help(suggestion: Option<&str>, valid_keys: &str) -> String {
    let accepted = format!("accepted keys: {valid_keys}");
    match suggestion {
        Some(key) => format!("did you mean `{key}`? {accepted}"),
        None => accepted,
    }
}

/// Turns one figment failure into a diagnostic per underlying problem.
///
/// `toml_sources` holds `(path, contents)` for every file that fed the
/// figment, so spans can be resolved against the right text.
pub fn figment_to_config_errors(
    err: figment::Error,
    toml_sources: &[(String, String)],
) -> Vec<ConfigError> {
    err.into_iter()
        .map(|error| convert(&error, toml_sources))
        .collect()
}

fn convert(error: &figment::Error, toml_sources: &[(String, String)]) -> ConfigError {
    match &error.kind {
        Kind::UnknownField(field, expected) => {
            let (span, src) = locate(error, field, toml_sources).unzip();
            ConfigError::UnknownKey {
                key: field.clone(),
                suggestion: suggest_key(field, expected),
                valid_keys: expected.join(", "),
                span,
                src,
            }
        }
        Kind::MissingField(field) => {
            let mut path = error.path.clone();
            path.push(field.to_string());
            ConfigError::MissingKey {
                key: path.join("."),
            }
        }
        Kind::InvalidType(actual, expected) => {
            let (span, src) = error
                .path
                .last()
                .and_then(|field| locate(error, field, toml_sources))
                .unzip();
            ConfigError::InvalidType {
                key: error.path.join("."),
                detail: format!("found {actual}, expected {expected}"),
                expected: expected.to_string(),
                span,
                src,
            }
        }
        _ => ConfigError::Other(error.to_string()),
    }
}

/// Resolves the file an error came from and the span of `field` inside it.
fn locate(
    error: &figment::Error,
    field: &str,
    toml_sources: &[(String, String)],
) -> Option<(SourceSpan, NamedSource<String>)> {
    let origin = error
        .metadata
        .as_ref()
        .and_then(|meta| meta.source.as_ref())
        .and_then(|source| match source {
            figment::Source::File(path) => Some(path.display().to_string()),
            _ => None,
        });

    let (path, content) = match origin {
        Some(origin) => toml_sources.iter().find(|(path, _)| *path == origin)?,
        // Inline strings carry no file metadata; a lone source is the one.
        None => match toml_sources {
            [only] => only,
            _ => return None,
        },
    };

    let table = table_path(&error.path, field);
    let offset = find_key_offset(content, &table, field)?;
    Some((
        SourceSpan::new(offset.into(), field.len()),
        NamedSource::new(path, content.clone()),
    ))
}

/// The enclosing table for `field`; figment sometimes includes the field
/// itself as the last path segment.
fn table_path(path: &[String], field: &str) -> Vec<String> {
    match path.split_last() {
        Some((last, table)) if last == field => table.to_vec(),
        _ => path.to_vec(),
    }
}

/// Byte offset of `field` as a key inside the table at `path`.
///
/// An empty path searches the top level up to the first header. Nested
/// tables match their dotted header, e.g. `["avito", "bootstrap"]` matches
/// `[avito.bootstrap]`. The search stops at the next table header.
pub fn find_key_offset(content: &str, path: &[String], field: &str) -> Option<usize> {
    let wanted = path.join(".");
    let mut in_table = path.is_empty();
    let mut offset = 0;

    for line in content.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if let Some(header) = trimmed.strip_prefix('[') {
            let name = header.split(']').next().unwrap_or_default().trim();
            in_table = !path.is_empty() && name == wanted;
        } else if in_table && is_key_line(trimmed, field) {
            return Some(offset + (line.len() - trimmed.len()));
        }
        offset += line.len();
    }

    None
}

fn is_key_line(line: &str, field: &str) -> bool {
    line.strip_prefix(field)
        .is_some_and(|rest| rest.trim_start().starts_with('='))
}

/// Closest valid key to `unknown`, if any is similar enough.
pub fn suggest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    valid_keys
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key), *key))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, key)| key.to_string())
}

/// Prints every error to stderr, falling back to plain text if the
/// graphical renderer fails.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = miette::GraphicalReportHandler::new();
    for error in errors {
        let mut out = String::new();
        match handler.render_report(&mut out, error as &dyn Diagnostic) {
            Ok(()) => eprint!("{out}"),
            Err(_) => eprintln!("Error: {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(segments: &[&str]) -> Vec<String> {
        segments.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn suggest_prot_for_port() {
        let valid = &["host", "port", "max_ws_queue", "operators", "identity_url"];
        assert_eq!(suggest_key("prot", valid), Some("port".to_string()));
    }

    #[test]
    fn suggest_webhook_secret() {
        let valid = &["client_id", "client_secret", "webhook_secret", "redirect_uri"];
        assert_eq!(
            suggest_key("webhok_secret", valid),
            Some("webhook_secret".to_string())
        );
    }

    #[test]
    fn no_suggestion_for_distant_typo() {
        let valid = &["host", "port", "max_ws_queue"];
        assert_eq!(suggest_key("zzzzzz", valid), None);
    }

    #[test]
    fn find_key_offset_in_section() {
        let content = "[service]\nlog_level = \"info\"\n\n[gateway]\nprot = 1\n";
        let o = find_key_offset(content, &path(&["gateway"]), "prot").unwrap();
        assert_eq!(&content[o..o + 4], "prot");
    }

    #[test]
    fn find_key_offset_missing_section() {
        let content = "[service]\nlog_level = \"info\"\n";
        assert!(find_key_offset(content, &path(&["gateway"]), "log_level").is_none());
    }

    #[test]
    fn find_key_offset_stays_inside_the_table() {
        let content = "[gateway]\nhost = \"::\"\n\n[bus]\nport = 1\n";
        assert!(find_key_offset(content, &path(&["gateway"]), "port").is_none());
    }

    #[test]
    fn find_key_offset_matches_dotted_headers() {
        let content = "[avito]\ntenant_id = 1\n[avito.bootstrap]\n  tenant_id = 2\n";
        let o = find_key_offset(content, &path(&["avito", "bootstrap"]), "tenant_id").unwrap();
        assert_eq!(&content[o..o + 13], "tenant_id = 2");
    }

    #[test]
    fn prefix_of_a_longer_key_is_not_a_match() {
        let content = "[sync]\nconcurrency_limit = 3\nconcurrency = 2\n";
        let o = find_key_offset(content, &path(&["sync"]), "concurrency").unwrap();
        assert_eq!(&content[o..o + 15], "concurrency = 2");
    }

    #[test]
    fn table_path_drops_trailing_field() {
        assert_eq!(table_path(&path(&["sync", "concurrency"]), "concurrency"), path(&["sync"]));
        assert_eq!(table_path(&path(&["gateway"]), "prot"), path(&["gateway"]));
    }
}
