// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-run driver: window computation, concurrent collection and integration
//! fan-out, rule evaluation, aggregation, report assembly, delivery, and the
//! checkpoint advance that only follows a delivery acknowledgement.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::aggregate::{Aggregator, DeviceHealthAggregator};
use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::collect::{CollectWindow, Orchestrator};
use crate::deliver::Delivery;
use crate::error::RunError;
use crate::health::{HealthFile, HealthStatus};
use crate::integrations::IntegrationRunner;
use crate::model::{DeviceStats, Report};
use crate::render::render;
use crate::rules::RuleRegistry;

/// Device-state provider for the health rollup (the REST collector in
/// production; fakes in tests).
#[async_trait::async_trait]
pub trait StatsSource: Send + Sync {
    async fn device_stats(&self) -> anyhow::Result<Vec<DeviceStats>>;
}

#[async_trait::async_trait]
impl StatsSource for crate::collect::rest::RestCollector {
    async fn device_stats(&self) -> anyhow::Result<Vec<DeviceStats>> {
        crate::collect::rest::RestCollector::device_stats(self).await
    }
}

/// Result of one successful run.
#[derive(Debug)]
pub struct RunOutcome {
    pub report: Report,
    pub new_entries: usize,
    pub new_checkpoint: DateTime<Utc>,
}

pub struct Pipeline {
    pub site_name: String,
    pub controller_type: String,
    orchestrator: Arc<Orchestrator>,
    integrations: Arc<IntegrationRunner>,
    registry: Arc<RuleRegistry>,
    aggregators: Vec<Arc<dyn Aggregator>>,
    stats_source: Option<Arc<dyn StatsSource>>,
    delivery: Arc<dyn Delivery>,
    checkpoint: CheckpointStore,
    health: HealthFile,
    initial_lookback: chrono::Duration,
    run_deadline: Duration,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        site_name: String,
        controller_type: String,
        orchestrator: Arc<Orchestrator>,
        integrations: Arc<IntegrationRunner>,
        registry: Arc<RuleRegistry>,
        aggregators: Vec<Arc<dyn Aggregator>>,
        stats_source: Option<Arc<dyn StatsSource>>,
        delivery: Arc<dyn Delivery>,
        checkpoint: CheckpointStore,
        health: HealthFile,
        initial_lookback: chrono::Duration,
        run_deadline: Duration,
    ) -> Self {
        Self {
            site_name,
            controller_type,
            orchestrator,
            integrations,
            registry,
            aggregators,
            stats_source,
            delivery,
            checkpoint,
            health,
            initial_lookback,
            run_deadline,
        }
    }

    /// Execute one scheduled run and update the health surface either way.
    pub async fn run_once(&self) -> Result<RunOutcome, RunError> {
        let started = Utc::now();
        let result = self.run_inner(started).await;
        match &result {
            Ok(outcome) => {
                self.health.update(&HealthStatus::healthy(started));
                tracing::info!(
                    entries = outcome.new_entries,
                    findings = outcome.report.findings.len(),
                    severe = outcome.report.severe_count(),
                    checkpoint = %outcome.new_checkpoint,
                    "run complete"
                );
            }
            Err(e) => {
                self.health.update(&HealthStatus::unhealthy(started, e.to_string()));
                tracing::error!(category = %e.category, err = %e.error, "run failed");
            }
        }
        result
    }

    async fn run_inner(&self, now: DateTime<Utc>) -> Result<RunOutcome, RunError> {
        // Window: resume from the checkpoint minus skew, bounded below by the
        // initial lookback so a stale checkpoint cannot replay history.
        let checkpoint = self.checkpoint.read();
        let lookback_floor = now - self.initial_lookback;
        let start = checkpoint
            .as_ref()
            .and_then(Checkpoint::window_floor)
            .map_or(lookback_floor, |floor| floor.max(lookback_floor));
        let window = CollectWindow { start, end: now };
        tracing::info!(start = %window.start, end = %window.end, "run window");

        let cancel = CancellationToken::new();
        let deadline_cancel = cancel.clone();
        let deadline = self.run_deadline;
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            deadline_cancel.cancel();
        });

        // Integrations fan out concurrently with collection.
        let integration_task = {
            let runner = Arc::clone(&self.integrations);
            let cancel = cancel.clone();
            tokio::spawn(async move { runner.run(window, &cancel).await })
        };

        let collected = tokio::select! {
            result = self.orchestrator.collect(window) => result.map_err(RunError::collection)?,
            _ = cancel.cancelled() => {
                return Err(RunError::collection(anyhow::anyhow!(
                    "run deadline ({deadline:?}) exceeded during collection"
                )));
            }
        };

        let stats = match &self.stats_source {
            Some(source) => tokio::select! {
                result = source.device_stats() => result.unwrap_or_else(|e| {
                    tracing::warn!(err = %e, "device stats unavailable this run");
                    Vec::new()
                }),
                _ = cancel.cancelled() => Vec::new(),
            },
            None => Vec::new(),
        };

        let mut findings = self.registry.evaluate(&collected.entries);
        let per_event = findings.clone();
        for aggregator in &self.aggregators {
            findings.extend(aggregator.aggregate(&collected.entries, &per_event));
        }
        findings.extend(
            DeviceHealthAggregator::new(stats, window.end)
                .aggregate(&collected.entries, &per_event),
        );

        // Collect whatever integrations returned within the deadline.
        let integration_outcome = match integration_task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(err = %e, "integration fan-out task failed");
                Default::default()
            }
        };

        let report = Report {
            site_name: self.site_name.clone(),
            controller_type: self.controller_type.clone(),
            period_start: window.start,
            period_end: window.end,
            generated_at: Utc::now(),
            findings,
            integration_sections: integration_outcome.sections,
        };

        let rendered = render(&report);
        self.delivery
            .deliver(&report, &rendered)
            .await
            .map_err(RunError::delivery)?;

        // Only now is the high-water mark advanced; a crash or delivery
        // failure above leaves the previous checkpoint for reprocessing.
        let last_event = collected.entries.last().map(|e| e.timestamp);
        let new_checkpoint = last_event.map_or(window.end, |t| t.max(window.end));
        if let Err(e) = self.checkpoint.write(&Checkpoint::new(new_checkpoint)) {
            tracing::warn!(err = %e, "checkpoint write failed; next run will reprocess");
        }

        Ok(RunOutcome { report, new_entries: collected.entries.len(), new_checkpoint })
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
