// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Historical event and alarm collection over the controller REST API.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde_json::{json, Value};

use crate::collect::{CollectWindow, Collector};
use crate::model::{DeviceStats, LogEntry, Source};
use crate::session::ControllerSession;

/// Provider-side cap on records per request.
pub const PAGE_LIMIT: usize = 3000;

const MAX_ATTEMPTS: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_millis(500);

pub struct RestCollector {
    session: Arc<ControllerSession>,
}

impl RestCollector {
    pub fn new(session: Arc<ControllerSession>) -> Self {
        Self { session }
    }

    async fn fetch_events(&self, window: CollectWindow) -> anyhow::Result<Vec<LogEntry>> {
        let within = window.duration().num_hours().max(1) + 1;
        let body = json!({"_limit": PAGE_LIMIT, "within": within});
        let envelope = self
            .with_retries("stat/event", || self.session.post_site("stat/event", &body))
            .await?;
        Ok(parse_envelope(&envelope, "events"))
    }

    async fn fetch_alarms(&self, window: CollectWindow) -> anyhow::Result<Vec<LogEntry>> {
        let within = window.duration().num_hours().max(1) + 1;
        let body = json!({"_limit": PAGE_LIMIT, "within": within, "archived": false});
        let envelope = self
            .with_retries("stat/alarm", || self.session.post_site("stat/alarm", &body))
            .await?;
        Ok(parse_envelope(&envelope, "alarms"))
    }

    /// Device state snapshots for the health rollup.
    pub async fn device_stats(&self) -> anyhow::Result<Vec<DeviceStats>> {
        let envelope = self
            .with_retries("stat/device", || self.session.get_site("stat/device"))
            .await?;
        Ok(envelope
            .get("data")
            .and_then(Value::as_array)
            .map(|records| records.iter().filter_map(DeviceStats::from_value).collect())
            .unwrap_or_default())
    }

    /// Run a request with bounded attempts and jittered exponential backoff.
    async fn with_retries<F, Fut>(&self, what: &str, op: F) -> anyhow::Result<Value>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = anyhow::Result<Value>>,
    {
        let mut last_err = anyhow::anyhow!("no attempts made");
        for attempt in 1..=MAX_ATTEMPTS {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    tracing::warn!(endpoint = what, attempt, err = %e, "request failed");
                    last_err = e;
                }
            }
            if attempt < MAX_ATTEMPTS {
                let jitter = Duration::from_millis(rand::rng().random_range(0..=250));
                tokio::time::sleep(BASE_BACKOFF * 2u32.saturating_pow(attempt - 1) + jitter).await;
            }
        }
        Err(last_err.context(format!("{what} failed after {MAX_ATTEMPTS} attempts")))
    }
}

#[async_trait::async_trait]
impl Collector for RestCollector {
    fn source(&self) -> Source {
        Source::Rest
    }

    async fn collect(&self, window: CollectWindow) -> anyhow::Result<Vec<LogEntry>> {
        self.session.connect().await?;
        let mut entries = self.fetch_events(window).await?;

        // Alarm failures degrade to events-only rather than failing the source.
        match self.fetch_alarms(window).await {
            Ok(mut alarms) => entries.append(&mut alarms),
            Err(e) => tracing::warn!(err = %e, "alarm fetch failed, continuing with events only"),
        }
        Ok(entries)
    }
}

/// Parse a `{ meta, data }` envelope into entries, skipping records that fail
/// the defensive parser. A `meta.count` above the returned length means the
/// provider truncated the page; absence means "not truncated".
fn parse_envelope(envelope: &Value, what: &str) -> Vec<LogEntry> {
    let records = envelope.get("data").and_then(Value::as_array).cloned().unwrap_or_default();

    if let Some(total) = envelope.get("meta").and_then(|m| m.get("count")).and_then(Value::as_u64) {
        if total as usize > records.len() {
            tracing::warn!(
                endpoint = what,
                returned = records.len(),
                reported = total,
                truncated = total as usize - records.len(),
                "provider truncated the response"
            );
        }
    }

    let mut entries = Vec::with_capacity(records.len());
    for record in &records {
        match LogEntry::from_controller(record, Source::Rest) {
            Ok(entry) => entries.push(entry),
            Err(e) => tracing::debug!(endpoint = what, err = %e, raw = %record, "skipping unparseable record"),
        }
    }
    entries
}

#[cfg(test)]
#[path = "rest_tests.rs"]
mod tests;
