/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use clap::Parser;
use kubectl_trashedresources::modules::{
    cli::{Cli, Commands},
    list::ListCommand,
    prune::PruneCommand,
    report_error,
    restore::RestoreCommand,
    Session,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let args = Cli::parse();

    let default_level = if args.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(args).await {
        report_error(&err);
        std::process::exit(1);
    }
}

async fn run(args: Cli) -> anyhow::Result<()> {
    let session = Session::connect(&args).await?;

    match args.command {
        Commands::Restore {
            name,
            drop_owner_references,
        } => {
            RestoreCommand {
                name,
                drop_owner_references,
            }
            .exec(session)
            .await
        }
        Commands::Prune {
            older_than,
            name,
            expired,
            all_namespaces,
            dry_run,
        } => {
            PruneCommand {
                older_than,
                name,
                expired,
                all_namespaces,
                dry_run,
            }
            .exec(session)
            .await
        }
        Commands::List { all_namespaces } => ListCommand { all_namespaces }.exec(session).await,
    }
}
