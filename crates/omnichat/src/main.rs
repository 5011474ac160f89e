// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Omnichat - omnichannel chat integration service.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod app;
mod serve;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use omnichat_config::OmnichatConfig;
use omnichat_core::{OmnichatError, TenantId};
use tokio_util::sync::CancellationToken;

use crate::app::App;

/// Omnichat - omnichannel chat integration service.
#[derive(Parser, Debug)]
#[command(name = "omnichat", version, about, long_about = None)]
struct Cli {
    /// Read this file instead of the standard config locations.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the REST/WebSocket gateway and background workers.
    Serve,
    /// Validate the configuration and print it with secrets masked.
    CheckConfig,
    /// Pull a tenant's Avito history once and print the summary.
    Sync {
        #[arg(long)]
        tenant: TenantId,
        /// Unix timestamp; older chats are skipped.
        #[arg(long)]
        since: Option<i64>,
    },
}

fn load_config(path: Option<&PathBuf>) -> OmnichatConfig {
    let loaded = match path {
        Some(path) => omnichat_config::load_and_validate_path(path),
        None => omnichat_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            omnichat_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

fn render_config(config: &OmnichatConfig) -> String {
    format!("{config:#?}")
}

async fn run_sync(
    config: OmnichatConfig,
    tenant: TenantId,
    since: Option<i64>,
) -> Result<String, OmnichatError> {
    let app = App::build(config).await?;
    let summary = app.history.run(tenant, since, CancellationToken::new()).await?;
    serde_json::to_string_pretty(&summary)
        .map_err(|e| OmnichatError::Internal(format!("failed to encode summary: {e}")))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("omnichat: use --help for available commands");
        return;
    };

    let config = load_config(cli.config.as_ref());
    serve::init_tracing(&config.service.log_level);

    let result = match command {
        Commands::Serve => serve::run_serve(config).await,
        Commands::CheckConfig => {
            println!("{}", render_config(&config));
            println!("omnichat: config OK");
            Ok(())
        }
        Commands::Sync { tenant, since } => run_sync(config, tenant, since)
            .await
            .map(|summary| println!("{summary}")),
    };

    if let Err(e) = result {
        eprintln!("omnichat: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        // Only jemalloc can advance the stats epoch.
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report allocated bytes");
    }

    #[test]
    fn sync_takes_tenant_and_since() {
        let cli = Cli::try_parse_from(["omnichat", "sync", "--tenant", "3", "--since", "1700000000"])
            .unwrap();
        match cli.command {
            Some(Commands::Sync { tenant, since }) => {
                assert_eq!(tenant, 3);
                assert_eq!(since, Some(1_700_000_000));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn sync_requires_a_tenant() {
        assert!(Cli::try_parse_from(["omnichat", "sync"]).is_err());
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::try_parse_from(["omnichat", "check-config", "--config", "/tmp/o.toml"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::CheckConfig)));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/o.toml")));
    }

    #[test]
    fn printed_config_masks_secrets() {
        let mut config = OmnichatConfig::default();
        config.vault.key = Some("c2VjcmV0LWtleS1tYXRlcmlhbA==".into());
        config.avito.client_secret = Some("app-secret".into());
        config.telegram.webhook_secret_token = Some("tg-secret".into());
        config.bus.password = Some("broker-pass".into());

        let rendered = render_config(&config);
        assert!(!rendered.contains("c2VjcmV0LWtleS1tYXRlcmlhbA=="));
        assert!(!rendered.contains("app-secret"));
        assert!(!rendered.contains("tg-secret"));
        assert!(!rendered.contains("broker-pass"));
        assert!(rendered.contains("[redacted]"));
    }
}
