/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Prometheus counters for captures, prunes and restores

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Counters shared by the capture, prune and restore engines
#[derive(Clone)]
pub struct TrashMetrics {
    registry: Registry,
    captured: IntCounterVec,
    capture_skipped: IntCounter,
    capture_failed: IntCounterVec,
    pruned: IntCounter,
    prune_failures: IntCounter,
    restores: IntCounterVec,
}

impl TrashMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        let captured = IntCounterVec::new(
            Opts::new("trashed_records_captured_total", "Deleted objects captured as records"),
            &["kind"],
        )?;
        let capture_skipped = IntCounter::new(
            "trashed_capture_skipped_total",
            "Deletion events ignored without creating a record",
        )?;
        let capture_failed = IntCounterVec::new(
            Opts::new("trashed_capture_failed_total", "Captures that failed to create a record"),
            &["kind"],
        )?;
        let pruned = IntCounter::new("trashed_records_pruned_total", "Records deleted by prune")?;
        let prune_failures = IntCounter::new(
            "trashed_prune_failures_total",
            "Records selected by prune that could not be deleted",
        )?;
        let restores = IntCounterVec::new(
            Opts::new("trashed_restores_total", "Restore attempts by outcome"),
            &["outcome"],
        )?;

        registry.register(Box::new(captured.clone()))?;
        registry.register(Box::new(capture_skipped.clone()))?;
        registry.register(Box::new(capture_failed.clone()))?;
        registry.register(Box::new(pruned.clone()))?;
        registry.register(Box::new(prune_failures.clone()))?;
        registry.register(Box::new(restores.clone()))?;

        Ok(Self {
            registry,
            captured,
            capture_skipped,
            capture_failed,
            pruned,
            prune_failures,
            restores,
        })
    }

    pub fn record_capture(&self, kind: &str) {
        self.captured.with_label_values(&[kind]).inc();
    }

    pub fn record_skip(&self) {
        self.capture_skipped.inc();
    }

    pub fn record_capture_failure(&self, kind: &str) {
        self.capture_failed.with_label_values(&[kind]).inc();
    }

    pub fn record_prune(&self, deleted: usize, failed: usize) {
        self.pruned.inc_by(deleted as u64);
        self.prune_failures.inc_by(failed as u64);
    }

    pub fn record_restore(&self, outcome: &str) {
        self.restores.with_label_values(&[outcome]).inc();
    }

    pub fn captured(&self, kind: &str) -> u64 {
        self.captured.with_label_values(&[kind]).get()
    }

    pub fn capture_failures(&self, kind: &str) -> u64 {
        self.capture_failed.with_label_values(&[kind]).get()
    }

    pub fn pruned(&self) -> u64 {
        self.pruned.get()
    }

    pub fn restores(&self, outcome: &str) -> u64 {
        self.restores.with_label_values(&[outcome]).get()
    }

    /// Text exposition of every registered counter
    pub fn encode(&self) -> String {
        let mut buffer = Vec::new();
        if TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .is_err()
        {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl std::fmt::Debug for TrashMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrashMetrics").finish_non_exhaustive()
    }
}
