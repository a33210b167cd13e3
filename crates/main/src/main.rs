/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;
use trashed_resources::{LogFormat, OperatorConfig, TrashController};

/// Captures deleted Kubernetes resources as TrashedResources
#[derive(Parser)]
#[command(name = "trashed-resources-controller")]
#[command(version, about)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "TRASHED_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Validate the configuration and exit
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = OperatorConfig::load(cli.config.as_deref())
        .context("Failed to load controller configuration")?;

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    match config.log_format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }

    if cli.dry_run {
        info!(?config, "Configuration validation successful");
        return Ok(());
    }

    info!(
        config_map = %format!("{}/{}", config.config_map_namespace, config.config_map_name),
        naming = ?config.naming,
        "Starting TrashedResources controller"
    );
    let controller = TrashController::connect(config)
        .await
        .context("Failed to connect to the Kubernetes API")?;

    controller
        .run(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!(error = %err, "Unable to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("Shutdown requested");
        })
        .await?;

    debug!(metrics = %controller.metrics().encode(), "Final counters");
    info!("TrashedResources controller stopped");
    Ok(())
}
