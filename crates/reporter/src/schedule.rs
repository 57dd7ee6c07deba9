// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run scheduling: preset or cron expression in the configured timezone, or a
//! single run when neither is set. At most one run executes at a time; missed
//! ticks coalesce, and a tick missed by less than the grace window fires
//! immediately on wake.

use std::future::Future;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio_util::sync::CancellationToken;

use crate::config::Config;

/// Missed ticks older than this are skipped rather than fired late.
pub const COALESCE_GRACE: chrono::Duration = chrono::Duration::hours(1);

/// What drives runs for this service instance.
#[derive(Debug, Clone)]
pub enum SchedulePlan {
    /// No schedule configured: run once and exit.
    Once,
    Cron(cron::Schedule),
}

impl SchedulePlan {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        match (&config.preset, &config.cron) {
            (Some(_), Some(_)) => anyhow::bail!("--preset and --cron are mutually exclusive"),
            (Some(preset), None) => Ok(Self::Cron(preset_schedule(preset)?)),
            (None, Some(expr)) => Ok(Self::Cron(parse_cron(expr)?)),
            (None, None) => Ok(Self::Once),
        }
    }
}

/// Parse a 5-field cron expression (the cron crate wants a seconds field).
pub fn parse_cron(expr: &str) -> anyhow::Result<cron::Schedule> {
    let trimmed = expr.trim();
    if trimmed.split_whitespace().count() != 5 {
        anyhow::bail!("cron expression must have 5 fields: {expr:?}");
    }
    cron::Schedule::from_str(&format!("0 {trimmed}"))
        .map_err(|e| anyhow::anyhow!("invalid cron expression {expr:?}: {e}"))
}

fn preset_schedule(preset: &str) -> anyhow::Result<cron::Schedule> {
    let expr = match preset {
        "hourly" => "0 0 * * * *",
        "daily" => "0 0 6 * * *",
        "weekly" => "0 0 6 * * MON",
        other => anyhow::bail!("unknown schedule preset {other:?}"),
    };
    cron::Schedule::from_str(expr).map_err(|e| anyhow::anyhow!("preset {preset:?} invalid: {e}"))
}

/// The most recent tick at or before `now` that is still inside the grace
/// window and newer than the last fired tick, if any.
pub fn missed_tick_within_grace(
    schedule: &cron::Schedule,
    last_fired: Option<DateTime<Tz>>,
    now: DateTime<Tz>,
    grace: chrono::Duration,
) -> Option<DateTime<Tz>> {
    let floor = now - grace;
    let mut candidate = None;
    for tick in schedule.after(&floor) {
        if tick > now {
            break;
        }
        candidate = Some(tick);
    }
    candidate.filter(|tick| last_fired.map_or(true, |fired| *tick > fired))
}

pub struct Scheduler {
    plan: SchedulePlan,
    timezone: Tz,
}

impl Scheduler {
    pub fn new(plan: SchedulePlan, timezone: Tz) -> Self {
        Self { plan, timezone }
    }

    /// Drive runs until the plan is exhausted or `cancel` fires. Runs are
    /// awaited in place, so at most one executes at a time.
    pub async fn run<F, Fut>(&self, cancel: &CancellationToken, mut fire: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        let schedule = match &self.plan {
            SchedulePlan::Once => {
                fire().await;
                return;
            }
            SchedulePlan::Cron(schedule) => schedule.clone(),
        };

        let mut last_fired: Option<DateTime<Tz>> = None;
        loop {
            let now = Utc::now().with_timezone(&self.timezone);

            // Fire a recently missed tick (service restart, long previous run).
            if let Some(missed) =
                missed_tick_within_grace(&schedule, last_fired, now, COALESCE_GRACE)
            {
                tracing::info!(tick = %missed, "firing missed schedule tick");
                last_fired = Some(missed);
                fire().await;
                continue;
            }

            let Some(next) = schedule.after(&now).next() else {
                tracing::info!("schedule exhausted");
                return;
            };
            let wait = (next - now).to_std().unwrap_or_default();
            tracing::debug!(next = %next, wait_s = wait.as_secs(), "sleeping until next tick");

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(wait) => {}
            }
            last_fired = Some(next);
            fire().await;
        }
    }
}

#[cfg(test)]
#[path = "schedule_tests.rs"]
mod tests;
