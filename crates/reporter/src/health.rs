// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Health surface: a well-known JSON file an external orchestrator can poll.
//! Updated after every run attempt.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body of the health file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl HealthStatus {
    pub fn healthy(last_run_at: DateTime<Utc>) -> Self {
        Self { status: "healthy".into(), last_run_at: Some(last_run_at), last_error: None }
    }

    pub fn unhealthy(last_run_at: DateTime<Utc>, error: impl Into<String>) -> Self {
        Self {
            status: "unhealthy".into(),
            last_run_at: Some(last_run_at),
            last_error: Some(error.into()),
        }
    }
}

/// Writer for the health file. Failures are logged, never fatal — health
/// reporting must not take down the service it reports on.
#[derive(Debug, Clone)]
pub struct HealthFile {
    path: PathBuf,
}

impl HealthFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn update(&self, status: &HealthStatus) {
        if let Err(e) = self.write(status) {
            tracing::warn!(path = %self.path.display(), err = %e, "health file update failed");
        }
    }

    fn write(&self, status: &HealthStatus) -> anyhow::Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(status)?;
        let tmp_path = self.path.with_extension("json.tmp");
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        drop(file);
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    pub fn read(&self) -> Option<HealthStatus> {
        let contents = std::fs::read_to_string(&self.path).ok()?;
        serde_json::from_str(&contents).ok()
    }
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
