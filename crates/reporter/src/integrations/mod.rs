// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Optional external-data providers, run concurrently with collection.
//!
//! Each configured integration gets its own task, wall-clock timeout, and
//! circuit breaker. A failure — error, timeout, or panic — is isolated to its
//! own report section and never affects other integrations or the findings
//! derived from controller data.

pub mod breaker;
pub mod cloudflare;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::collect::CollectWindow;
use crate::integrations::breaker::CircuitBreaker;
use crate::model::IntegrationSection;

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// An optional external data provider.
#[async_trait::async_trait]
pub trait Integration: Send + Sync {
    /// Stable identifier.
    fn name(&self) -> &'static str;

    /// Section heading in the report.
    fn title(&self) -> &'static str;

    /// Whether the integration participates at all.
    fn is_configured(&self) -> bool;

    /// Non-fatal configuration warning, if any.
    fn validate_config(&self) -> Option<String>;

    /// The only I/O entry point; cancelled by the runner's deadline.
    async fn fetch(&self, window: CollectWindow) -> anyhow::Result<IntegrationSection>;
}

/// Composed result of one fan-out.
#[derive(Debug, Default)]
pub struct IntegrationOutcome {
    pub sections: Vec<IntegrationSection>,
    pub errors: Vec<String>,
}

/// Executes all configured integrations concurrently. Lives for the whole
/// service so breaker state carries across runs.
pub struct IntegrationRunner {
    integrations: Vec<Arc<dyn Integration>>,
    breakers: parking_lot::Mutex<HashMap<&'static str, CircuitBreaker>>,
    fetch_timeout: Duration,
}

impl IntegrationRunner {
    pub fn new(integrations: Vec<Arc<dyn Integration>>, fetch_timeout: Duration) -> Self {
        Self {
            integrations,
            breakers: parking_lot::Mutex::new(HashMap::new()),
            fetch_timeout,
        }
    }

    /// Consecutive failure count for one integration's breaker.
    pub fn breaker_failures(&self, name: &str) -> u32 {
        self.breakers.lock().get(name).map(CircuitBreaker::consecutive_failures).unwrap_or(0)
    }

    fn breaker_allows(&self, name: &'static str) -> bool {
        self.breakers.lock().entry(name).or_default().allow()
    }

    fn record(&self, name: &'static str, success: bool) {
        let mut breakers = self.breakers.lock();
        let breaker = breakers.entry(name).or_default();
        if success {
            breaker.record_success();
        } else {
            breaker.record_failure();
        }
    }

    /// Run every configured integration, bounded by the per-integration
    /// timeout and the caller's cancellation token.
    pub async fn run(&self, window: CollectWindow, cancel: &CancellationToken) -> IntegrationOutcome {
        let mut outcome = IntegrationOutcome::default();
        let mut handles = Vec::new();

        for integration in &self.integrations {
            if !integration.is_configured() {
                tracing::debug!(integration = integration.name(), "not configured, skipping");
                continue;
            }
            if let Some(warning) = integration.validate_config() {
                tracing::warn!(integration = integration.name(), warning = %warning, "integration config warning");
            }
            let name = integration.name();
            let title = integration.title();
            if !self.breaker_allows(name) {
                tracing::warn!(integration = name, "circuit open, failing fast");
                outcome.sections.push(IntegrationSection::failed(name, title, "circuit_open"));
                outcome.errors.push(format!("{name}: circuit_open"));
                continue;
            }

            let integration = Arc::clone(integration);
            let timeout = self.fetch_timeout;
            handles.push((
                name,
                title,
                tokio::spawn(async move {
                    tokio::time::timeout(timeout, integration.fetch(window)).await
                }),
            ));
        }

        for (name, title, mut handle) in handles {
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    handle.abort();
                    Err("cancelled".to_owned())
                }
                joined = &mut handle => match joined {
                    Ok(Ok(Ok(section))) => Ok(section),
                    Ok(Ok(Err(e))) => Err(format!("{e:#}")),
                    Ok(Err(_elapsed)) => Err("timeout".to_owned()),
                    Err(join_err) if join_err.is_panic() => Err("panicked".to_owned()),
                    Err(_) => Err("cancelled".to_owned()),
                },
            };

            match result {
                Ok(section) => {
                    self.record(name, true);
                    tracing::info!(integration = name, items = section.items.len(), "integration ok");
                    outcome.sections.push(section);
                }
                Err(error) => {
                    self.record(name, false);
                    tracing::warn!(integration = name, error = %error, "integration failed");
                    outcome.sections.push(IntegrationSection::failed(name, title, error.clone()));
                    outcome.errors.push(format!("{name}: {error}"));
                }
            }
        }
        outcome
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
