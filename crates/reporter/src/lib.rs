// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduled UniFi controller report service: collect events from push, REST,
//! and shell sources, classify them into findings, enrich with optional
//! integrations, and deliver a deduplicated report by email or file.

pub mod aggregate;
pub mod checkpoint;
pub mod collect;
pub mod config;
pub mod deliver;
pub mod error;
pub mod health;
pub mod integrations;
pub mod model;
pub mod pipeline;
pub mod render;
pub mod rules;
pub mod schedule;
pub mod session;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::aggregate::{Aggregator, RoamFlappingDetector, ThreatSummaryAggregator};
use crate::checkpoint::CheckpointStore;
use crate::collect::push::{spawn_push_feed, PushBuffer, PushCollector};
use crate::collect::rest::RestCollector;
use crate::collect::shell::ShellCollector;
use crate::collect::{Collector, Orchestrator};
use crate::config::Config;
use crate::deliver::DeliveryStack;
use crate::error::{ErrorCategory, RunError};
use crate::health::HealthFile;
use crate::integrations::cloudflare::CloudflareIntegration;
use crate::integrations::{Integration, IntegrationRunner};
use crate::pipeline::{Pipeline, StatsSource};
use crate::schedule::{SchedulePlan, Scheduler};
use crate::session::ControllerSession;

/// File name of the health surface inside the reports directory.
pub const HEALTH_FILE: &str = "health.json";

/// Install the process-wide TLS provider. Safe to call more than once.
pub fn init_crypto() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Run the service: once when no schedule is configured, otherwise under the
/// scheduler until shutdown.
pub async fn run(config: Config) -> Result<(), RunError> {
    init_crypto();
    let warnings = config.validate().map_err(RunError::config)?;
    for warning in warnings {
        tracing::warn!(warning = %warning, "configuration warning");
    }
    let plan = SchedulePlan::from_config(&config).map_err(RunError::config)?;

    let session = Arc::new(ControllerSession::new(&config).map_err(RunError::config)?);
    session
        .connect()
        .await
        .map_err(|e| RunError::new(ErrorCategory::Auth, e))?;

    let site_name = session.site().await.unwrap_or_else(|| "default".to_owned());
    let controller_type = session
        .kind()
        .await
        .map(|k| k.as_str().to_owned())
        .unwrap_or_else(|| "unknown".to_owned());

    // The push feed outlives individual runs; it is stopped first on shutdown.
    let push_cancel = CancellationToken::new();
    let shutdown = CancellationToken::new();

    let mut collectors: Vec<Arc<dyn Collector>> = Vec::new();
    if config.push_enabled {
        let buffer = Arc::new(PushBuffer::new(config.push_buffer));
        spawn_push_feed(
            Arc::clone(&session),
            Arc::clone(&buffer),
            config.verify_tls,
            push_cancel.clone(),
        );
        collectors.push(Arc::new(PushCollector::new(buffer)));
    }
    let rest = Arc::new(RestCollector::new(Arc::clone(&session)));
    collectors.push(Arc::clone(&rest) as Arc<dyn Collector>);
    if config.shell_enabled {
        match config.shell_password() {
            Some(password) => collectors.push(Arc::new(ShellCollector::new(
                config.host.clone(),
                config.shell_username().to_owned(),
                password,
                config.shell_command_timeout(),
            ))),
            None => tracing::warn!("shell source enabled but no credentials resolve; skipping"),
        }
    }

    let orchestrator = Arc::new(Orchestrator::new(collectors, config.min_entries));
    let integrations: Vec<Arc<dyn Integration>> = vec![Arc::new(CloudflareIntegration::new(
        config.cloudflare_token(),
        config.cloudflare_zone.clone(),
    ))];
    let runner = Arc::new(IntegrationRunner::new(integrations, config.integration_timeout()));
    let registry = Arc::new(rules::builtin::default_registry().map_err(RunError::config)?);
    let aggregators: Vec<Arc<dyn Aggregator>> = vec![
        Arc::new(RoamFlappingDetector::default()),
        Arc::new(ThreatSummaryAggregator::default()),
    ];
    let delivery = Arc::new(DeliveryStack::from_config(&config).map_err(RunError::config)?);
    if !delivery.is_configured() {
        tracing::warn!("no delivery channel enabled; runs will fail at the delivery step");
    }

    let pipeline = Arc::new(Pipeline::new(
        site_name,
        controller_type,
        orchestrator,
        runner,
        registry,
        aggregators,
        Some(Arc::clone(&rest) as Arc<dyn StatsSource>),
        delivery,
        CheckpointStore::new(&config.output_dir),
        HealthFile::new(config.output_dir.join(HEALTH_FILE)),
        config.initial_lookback(),
        config.run_deadline(),
    ));

    // Stop the push feed before the scheduler on shutdown.
    {
        let push_cancel = push_cancel.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown signal received");
            }
            push_cancel.cancel();
            shutdown.cancel();
        });
    }

    let result = match &plan {
        SchedulePlan::Once => pipeline.run_once().await.map(|_| ()),
        SchedulePlan::Cron(_) => {
            let scheduler = Scheduler::new(plan.clone(), config.schedule_timezone());
            let pipeline = Arc::clone(&pipeline);
            scheduler
                .run(&shutdown, move || {
                    let pipeline = Arc::clone(&pipeline);
                    async move {
                        // Failures are already logged and reflected in the
                        // health file; the scheduler keeps going.
                        let _ = pipeline.run_once().await;
                    }
                })
                .await;
            Ok(())
        }
    };

    push_cancel.cancel();
    result
}

/// `--test` mode: validate configuration, authenticate, probe the controller
/// and each configured integration. Exit status reflects the worst failure.
pub async fn probe(config: &Config) -> Result<(), RunError> {
    init_crypto();
    let warnings = config.validate().map_err(RunError::config)?;
    for warning in warnings {
        tracing::warn!(warning = %warning, "configuration warning");
    }

    let session = Arc::new(ControllerSession::new(config).map_err(RunError::config)?);
    session
        .connect()
        .await
        .map_err(|e| RunError::new(ErrorCategory::Auth, e))?;
    let site = session.site().await.unwrap_or_else(|| "default".to_owned());
    let kind = session.kind().await.map(|k| k.as_str()).unwrap_or("unknown");
    tracing::info!(site = %site, kind, "controller probe ok");

    let events = session
        .post_site("stat/event", &serde_json::json!({"_limit": 1}))
        .await
        .map_err(|e| RunError::new(ErrorCategory::Collection, e))?;
    let reachable = events.get("meta").is_some() || events.get("data").is_some();
    if !reachable {
        return Err(RunError::collection(anyhow::anyhow!(
            "event endpoint returned an unrecognised envelope"
        )));
    }
    tracing::info!("event endpoint probe ok");

    let cloudflare =
        CloudflareIntegration::new(config.cloudflare_token(), config.cloudflare_zone.clone());
    if let Some(warning) = cloudflare.validate_config() {
        tracing::warn!(integration = cloudflare.name(), warning = %warning, "integration config warning");
    }
    if cloudflare.is_configured() {
        tracing::info!(integration = cloudflare.name(), "integration configured");
    }
    Ok(())
}
