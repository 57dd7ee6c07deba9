// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! High-water-mark persistence between runs: load/save `.last_run.json`
//! with atomic writes.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// File name inside the reports directory.
pub const CHECKPOINT_FILE: &str = ".last_run.json";

/// Tolerated clock drift when filtering events against the checkpoint.
pub const CLOCK_SKEW: Duration = Duration::from_secs(5 * 60);

/// Persisted state between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_delivered_event_time: Option<DateTime<Utc>>,
}

impl Checkpoint {
    pub fn new(last_delivered_event_time: DateTime<Utc>) -> Self {
        Self { schema_version: 1, last_delivered_event_time: Some(last_delivered_event_time) }
    }

    /// Earliest event timestamp still included for this checkpoint,
    /// i.e. the checkpoint minus the skew tolerance.
    pub fn window_floor(&self) -> Option<DateTime<Utc>> {
        self.last_delivered_event_time.map(|t| t - CLOCK_SKEW)
    }
}

/// Store for the run checkpoint. Only the pipeline driver writes it, and only
/// after delivery is acknowledged.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(reports_dir: &Path) -> Self {
        Self { path: reports_dir.join(CHECKPOINT_FILE) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the checkpoint. A missing file is a normal first run; a corrupted
    /// file is logged and treated as absent so the initial lookback applies.
    pub fn read(&self) -> Option<Checkpoint> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), err = %e, "checkpoint unreadable, treating as absent");
                return None;
            }
        };
        match serde_json::from_str(&contents) {
            Ok(checkpoint) => Some(checkpoint),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), err = %e, "checkpoint corrupted, treating as absent");
                None
            }
        }
    }

    /// Persist the checkpoint: write a sibling temp file, flush it to disk,
    /// then rename over the target. A crash at any point leaves the previous
    /// state or no file — never a partial one.
    pub fn write(&self, checkpoint: &Checkpoint) -> anyhow::Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(checkpoint)?;
        let tmp_path = self.path.with_extension("json.tmp");
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        drop(file);
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "checkpoint_tests.rs"]
mod tests;
