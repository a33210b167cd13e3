/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! # Trashed Resources
//!
//! Recycle bin for Kubernetes objects. Deletions of watched kinds are
//! captured as `TrashedResource` records holding a replayable manifest and a
//! retention deadline. Records can be listed, restored into live objects or
//! pruned.
//!
//! ## Features
//!
//! - **Capture**: one watcher per configured kind, deletions stored as records
//! - **Live settings**: watched kinds and retention read from a ConfigMap
//! - **Restore**: replay a stored manifest and drop its record
//! - **Prune**: bulk deletion by age, name or expired deadline
//! - **Metrics**: Prometheus counters for every operation
//!
//! ## Example
//!
//! ```rust,no_run
//! use trashed_resources::{OperatorConfig, TrashController};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let controller = TrashController::connect(OperatorConfig::default()).await?;
//!     controller
//!         .run(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod capture;
pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod metrics;
pub mod prune;
pub mod registry;
pub mod restore;
pub mod retention;
pub mod sanitizer;
pub mod settings;
pub mod store;

pub use capture::{CaptureOutcome, CapturePipeline, NamingStrategy};
pub use config::{LogFormat, OperatorConfig};
pub use controller::TrashController;
pub use crd::{TrashedResource, TrashedResourceSpec};
pub use error::{Result, TrashError};
pub use metrics::TrashMetrics;
pub use prune::{PruneEngine, PruneReport, PruneRequest};
pub use registry::{KindRegistry, WatchedKind};
pub use restore::{RestoreEngine, RestoreFieldPolicy, RestoreReport};
pub use retention::RetentionConfig;
pub use settings::LiveSettings;

/// Operator status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorStatus {
    /// Operator is starting up
    Starting,
    /// Operator is running
    Running,
    /// Operator is stopping
    Stopping,
    /// Operator has stopped
    Stopped,
}
