// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! nuclio-controller - keeps declared nuclio functions deployed.
//!
//! Reads the function manifest, runs one reconcile loop per function against
//! the nuclio dashboard API and serves the admin HTTP API.

use tracing::{info, warn};

use nuclio_controller::config::Config;
use nuclio_controller::manifest::Manifest;
use nuclio_controller::runtime::ControllerRuntime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nuclio_controller=info,nuclio_api=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    let config = Config::from_env()?;

    info!(
        address = %config.address,
        project = %config.project,
        admin_addr = %config.admin_addr,
        functions_file = %config.functions_file.display(),
        "Starting nuclio-controller"
    );

    let manifest = Manifest::load(&config.functions_file)?;

    let runtime = ControllerRuntime::builder()
        .config(config)
        .functions(manifest.functions)
        .build()?
        .start()
        .await?;

    if let Some(addr) = runtime.admin_addr() {
        info!(addr = %addr, "Admin API ready");
    }

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    runtime.shutdown().await?;

    info!("nuclio-controller shut down");

    Ok(())
}
