/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! kubectl plugin for TrashedResources
//!
//! Lists captured deletions, restores them into live objects and prunes
//! records by age, name or expired deadline.

pub mod modules;

pub use modules::{
    cli::{Cli, Commands},
    duration::{format_duration, parse_duration, DurationError},
    Session,
};
