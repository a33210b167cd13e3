/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::{path::PathBuf, time::Duration};

use clap::{Parser, Subcommand};

use super::duration::parse_duration;

#[derive(Parser, Debug)]
#[command(name = "kubectl-trashedresources")]
#[command(version, about = "Plugin to manage TrashedResources")]
#[command(long_about = "CLI tool to list, restore and prune TrashedResources in the cluster.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Namespace scope for this request
    #[arg(short, long, global = true)]
    pub namespace: Option<String>,

    /// Name of the kubeconfig context to use
    #[arg(long, global = true)]
    pub context: Option<String>,

    /// Path to the kubeconfig file to use
    #[arg(long, global = true, value_name = "FILE")]
    pub kubeconfig: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Restores a deleted resource from a TrashedResource
    Restore {
        /// Name of the TrashedResource
        name: String,

        /// Remove ownerReferences so the restored object is not garbage
        /// collected when its owner no longer exists
        #[arg(long)]
        drop_owner_references: bool,
    },

    /// Deletes TrashedResources by age, name or expired deadline
    #[command(after_help = "Examples:\n  kubectl trashedresources prune --older-than 1d\n  \
                         kubectl trashedresources prune --name trashed-deployment-myapp-12345")]
    Prune {
        /// Duration to consider old (e.g. 14m, 11h, 1d)
        #[arg(long, value_parser = parse_duration)]
        older_than: Option<Duration>,

        /// Name of the TrashedResource to delete
        #[arg(long)]
        name: Option<String>,

        /// Only TrashedResources whose keepUntil has passed
        #[arg(long)]
        expired: bool,

        /// Prune in every namespace
        #[arg(short = 'A', long)]
        all_namespaces: bool,

        /// Show what would be deleted without deleting
        #[arg(long)]
        dry_run: bool,
    },

    /// Lists TrashedResources with their retention deadline
    List {
        /// List in every namespace
        #[arg(short = 'A', long)]
        all_namespaces: bool,
    },
}
