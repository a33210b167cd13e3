/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use anyhow::Context;
use kube::{
    config::{KubeConfigOptions, Kubeconfig},
    Client, Config,
};

use self::cli::Cli;

pub mod cli;
pub mod duration;
pub mod list;
pub mod prune;
pub mod restore;

/// Connection to the cluster plus the namespace commands default to
pub struct Session {
    pub client: Client,
    pub namespace: String,
}

impl Session {
    /// Resolve the kubeconfig the way kubectl does: explicit file, then the
    /// default kubeconfig, then the in-cluster service account.
    pub async fn connect(cli: &Cli) -> anyhow::Result<Self> {
        let options = KubeConfigOptions {
            context: cli.context.clone(),
            ..Default::default()
        };
        let config = match &cli.kubeconfig {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path)
                    .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;
                Config::from_custom_kubeconfig(kubeconfig, &options).await?
            }
            None => match Config::from_kubeconfig(&options).await {
                Ok(config) => config,
                Err(err) => Config::incluster().map_err(|incluster| {
                    anyhow::anyhow!(
                        "Unable to load kubeconfig ({err}) or in-cluster configuration ({incluster})"
                    )
                })?,
            },
        };

        let namespace = cli
            .namespace
            .clone()
            .unwrap_or_else(|| config.default_namespace.clone());
        let client = Client::try_from(config).context("Failed to create Kubernetes client")?;
        Ok(Self { client, namespace })
    }
}

/// Print an error the way every command reports failures
pub fn report_error(err: &anyhow::Error) {
    eprintln!("{} {:#}", console::style("❌ Error:").red().bold(), err);
}
