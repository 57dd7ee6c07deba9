// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Source collectors and the fallback-chain orchestrator.
//!
//! Sources are attempted in priority order PUSH → REST → SHELL. Earlier
//! results are merged with later ones (push and REST supplement each other),
//! deduplicated, and sorted; a source is sufficient once the merged set
//! reaches the configured minimum entry count.

pub mod push;
pub mod rest;
pub mod shell;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::model::{LogEntry, Source};

/// Half-open time window one run processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl CollectWindow {
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }
}

/// A finite producer of normalized entries for a window.
#[async_trait::async_trait]
pub trait Collector: Send + Sync {
    fn source(&self) -> Source;

    async fn collect(&self, window: CollectWindow) -> anyhow::Result<Vec<LogEntry>>;
}

/// Merged collection result with per-source accounting.
#[derive(Debug, Default)]
pub struct CollectOutcome {
    pub entries: Vec<LogEntry>,
    /// Sources that produced entries this run.
    pub succeeded: Vec<Source>,
    /// Sources that failed, with their error text.
    pub failed: Vec<(Source, String)>,
    pub duplicates_dropped: usize,
}

/// Fallback-chain orchestrator over the configured collectors.
pub struct Orchestrator {
    collectors: Vec<Arc<dyn Collector>>,
    min_entries: usize,
}

impl Orchestrator {
    pub fn new(collectors: Vec<Arc<dyn Collector>>, min_entries: usize) -> Self {
        Self { collectors, min_entries }
    }

    /// Collect entries for the window.
    ///
    /// Falls through to the next source while the merged count is below the
    /// sufficiency threshold. Partial success is a normal outcome; the run
    /// fails only when every configured source fails.
    pub async fn collect(&self, window: CollectWindow) -> anyhow::Result<CollectOutcome> {
        let mut outcome = CollectOutcome::default();
        let mut merged: Vec<LogEntry> = Vec::new();

        for collector in &self.collectors {
            let source = collector.source();
            if !merged.is_empty() && merged.len() >= self.min_entries {
                break;
            }
            match collector.collect(window).await {
                Ok(mut entries) => {
                    entries.retain(|e| window.contains(e.timestamp));
                    tracing::info!(
                        source = source.as_str(),
                        count = entries.len(),
                        "source collected"
                    );
                    outcome.succeeded.push(source);
                    merged.append(&mut entries);
                }
                Err(e) => {
                    tracing::warn!(source = source.as_str(), err = %e, "source failed, falling through");
                    outcome.failed.push((source, format!("{e:#}")));
                }
            }
        }

        if outcome.succeeded.is_empty() {
            let detail = outcome
                .failed
                .iter()
                .map(|(s, e)| format!("{s}: {e}"))
                .collect::<Vec<_>>()
                .join("; ");
            anyhow::bail!("all configured sources failed: {detail}");
        }

        let before = merged.len();
        let mut entries = dedup_entries(merged);
        outcome.duplicates_dropped = before - entries.len();

        // Timestamp ascending; ties break by source priority, then by the
        // arrival order the stable sort preserves.
        entries.sort_by_key(|e| (e.timestamp, e.source.priority()));
        outcome.entries = entries;
        Ok(outcome)
    }
}

/// Cross-source identity is `(timestamp, message, device_mac)` — the source
/// systems do not share event ids.
fn dedup_entries(entries: Vec<LogEntry>) -> Vec<LogEntry> {
    let mut seen: HashSet<(i64, String, Option<String>)> = HashSet::with_capacity(entries.len());
    entries
        .into_iter()
        .filter(|e| {
            seen.insert((e.timestamp.timestamp_millis(), e.message.clone(), e.device_mac.clone()))
        })
        .collect()
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
