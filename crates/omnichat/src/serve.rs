// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `omnichat serve`: the gateway plus background workers.

use omnichat_config::model::OmnichatConfig;
use omnichat_core::OmnichatError;
use omnichat_gateway::start_server;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::app::App;
use crate::shutdown;

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// configured level.
pub fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("omnichat={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

/// Run until SIGINT or SIGTERM.
pub async fn run_serve(config: OmnichatConfig) -> Result<(), OmnichatError> {
    let cancel = shutdown::install_signal_handler();
    let app = App::build(config).await?;

    if let Some(bootstrap) = &app.config.avito.bootstrap {
        match app.avito_connect.bootstrap(bootstrap).await {
            Ok(connection) => info!(
                tenant_id = connection.tenant_id,
                credential_id = connection.credential_id,
                webhook_registered = connection.webhook_registered,
                "avito bootstrap credential stored"
            ),
            // Startup continues without the seed credential.
            Err(e) => warn!(tenant_id = bootstrap.tenant_id, error = %e, "avito bootstrap failed"),
        }
    }

    let poller = app.polling_supervisor().map(|supervisor| {
        info!("telegram polling enabled");
        tokio::spawn(supervisor.run(cancel.child_token()))
    });

    let state = app.gateway_state(cancel.clone())?;
    let result = start_server(&app.server_config(), state, cancel.clone()).await;

    cancel.cancel();
    if let Some(poller) = poller {
        let _ = poller.await;
    }
    info!("omnichat stopped");
    result
}
