// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeZone;

#[test]
fn healthy_then_unhealthy_overwrites() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let health = HealthFile::new(dir.path().join("health.json"));
    let at = Utc.with_ymd_and_hms(2026, 1, 24, 10, 0, 0).single().unwrap_or_default();

    health.update(&HealthStatus::healthy(at));
    assert_eq!(health.read().map(|h| h.status), Some("healthy".to_owned()));

    health.update(&HealthStatus::unhealthy(at, "delivery failed: smtp timeout"));
    let Some(status) = health.read() else {
        return Err(anyhow::anyhow!("health file missing after update"));
    };
    assert_eq!(status.status, "unhealthy");
    assert_eq!(status.last_error.as_deref(), Some("delivery failed: smtp timeout"));
    assert_eq!(status.last_run_at, Some(at));
    Ok(())
}

#[test]
fn update_creates_parent_directories() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let health = HealthFile::new(dir.path().join("state/deep/health.json"));
    health.update(&HealthStatus::healthy(Utc::now()));
    assert!(health.read().is_some());
    Ok(())
}
