// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote-shell fallback source: read device log files over SSH and run them
//! through a lenient syslog parser.

use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Duration;

use async_ssh2_tokio::client::{AuthMethod, Client, ServerCheckMethod};
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use regex::Regex;
use serde_json::json;

use crate::collect::{CollectWindow, Collector};
use crate::model::{LogEntry, Source};

/// Log files probed on the device, most specific first.
const LOG_PATHS: [&str; 3] =
    ["/var/log/messages", "/var/log/syslog", "/var/log/unifi/server.log"];

/// Byte cap per log file read.
const MAX_OUTPUT_BYTES: usize = 512 * 1024;

/// `MMM dd HH:mm:ss host program[pid]: msg`, leniently.
#[allow(clippy::unwrap_used)] // pattern is a compile-time constant
fn syslog_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^([A-Z][a-z]{2})\s+(\d{1,2})\s+(\d{2}):(\d{2}):(\d{2})\s+(\S+)\s+([^:\[\s]+)(?:\[(\d+)\])?:\s*(.*)$",
        )
        .unwrap()
    })
}

pub struct ShellCollector {
    host: String,
    port: u16,
    username: String,
    password: String,
    command_timeout: Duration,
}

impl ShellCollector {
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        command_timeout: Duration,
    ) -> Self {
        Self {
            host: host.into(),
            port: 22,
            username: username.into(),
            password: password.into(),
            command_timeout,
        }
    }

    async fn connect(&self) -> anyhow::Result<Client> {
        let auth = AuthMethod::with_password(&self.password);
        let connect = Client::connect(
            (self.host.as_str(), self.port),
            self.username.as_str(),
            auth,
            ServerCheckMethod::NoCheck,
        );
        tokio::time::timeout(self.command_timeout, connect)
            .await
            .map_err(|_| anyhow::anyhow!("ssh connect to {} timed out", self.host))?
            .map_err(|e| anyhow::anyhow!("ssh connect to {} failed: {e}", self.host))
    }

    /// Read one log file, bounded in both bytes and wall-clock time.
    async fn read_log(&self, client: &Client, path: &str) -> anyhow::Result<Option<String>> {
        let command = format!("tail -c {MAX_OUTPUT_BYTES} {path} 2>/dev/null");
        let result = tokio::time::timeout(self.command_timeout, client.execute(&command))
            .await
            .map_err(|_| anyhow::anyhow!("ssh command timed out reading {path}"))?
            .map_err(|e| anyhow::anyhow!("ssh command failed reading {path}: {e}"))?;
        if result.exit_status != 0 || result.stdout.is_empty() {
            return Ok(None);
        }
        Ok(Some(result.stdout))
    }
}

#[async_trait::async_trait]
impl Collector for ShellCollector {
    fn source(&self) -> Source {
        Source::Shell
    }

    async fn collect(&self, window: CollectWindow) -> anyhow::Result<Vec<LogEntry>> {
        let client = self.connect().await?;
        let mut entries = Vec::new();
        for path in LOG_PATHS {
            match self.read_log(&client, path).await {
                Ok(Some(output)) => {
                    let parsed = parse_syslog(&output, window.end);
                    tracing::debug!(path, lines = parsed.len(), "log file parsed");
                    entries.extend(parsed);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(path, err = %e, "log read failed"),
            }
        }
        let _ = client.disconnect().await;
        entries.retain(|e| window.contains(e.timestamp));
        Ok(entries)
    }
}

/// Parse syslog text into entries.
///
/// Syslog lines carry no year; it is inferred against `reference` (a parsed
/// instant more than a day in the future belongs to the previous year).
/// Lines that miss the grammar are preserved as `UNKNOWN` entries carrying
/// the raw text, timestamped by the preceding line they continue; leading
/// unparseable lines have no anchor and are dropped.
pub fn parse_syslog(text: &str, reference: DateTime<Utc>) -> Vec<LogEntry> {
    let mut entries = Vec::new();
    let mut last_ts: Option<DateTime<Utc>> = None;

    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        match parse_syslog_line(line, reference) {
            Some(entry) => {
                last_ts = Some(entry.timestamp);
                entries.push(entry);
            }
            None => {
                let Some(ts) = last_ts else {
                    continue;
                };
                entries.push(LogEntry {
                    id: uuid::Uuid::new_v4().to_string(),
                    timestamp: ts,
                    source: Source::Shell,
                    event_type: "UNKNOWN".to_owned(),
                    device_mac: None,
                    device_name: None,
                    message: line.to_owned(),
                    raw: json!({"text": line}),
                    metadata: BTreeMap::new(),
                });
            }
        }
    }
    entries
}

fn parse_syslog_line(line: &str, reference: DateTime<Utc>) -> Option<LogEntry> {
    let caps = syslog_re().captures(line)?;
    let month = month_number(caps.get(1)?.as_str())?;
    let day: u32 = caps.get(2)?.as_str().parse().ok()?;
    let hour: u32 = caps.get(3)?.as_str().parse().ok()?;
    let minute: u32 = caps.get(4)?.as_str().parse().ok()?;
    let second: u32 = caps.get(5)?.as_str().parse().ok()?;
    let host = caps.get(6)?.as_str();
    let program = caps.get(7)?.as_str();
    let pid = caps.get(8).map(|m| m.as_str().to_owned());
    let message = caps.get(9).map(|m| m.as_str()).unwrap_or_default();

    let mut year = reference.year();
    let mut naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)?;
    if Utc.from_utc_datetime(&naive) > reference + chrono::Duration::days(1) {
        year -= 1;
        naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)?;
    }
    let timestamp = Utc.from_utc_datetime(&naive);

    let mut metadata = BTreeMap::new();
    metadata.insert("host".to_owned(), host.to_owned());
    metadata.insert("program".to_owned(), program.to_owned());
    if let Some(ref pid) = pid {
        metadata.insert("pid".to_owned(), pid.clone());
    }

    Some(LogEntry {
        id: uuid::Uuid::new_v4().to_string(),
        timestamp,
        source: Source::Shell,
        event_type: program.to_owned(),
        device_mac: None,
        device_name: Some(host.to_owned()),
        message: message.to_owned(),
        raw: json!({"text": line, "host": host, "program": program, "pid": pid}),
        metadata,
    })
}

fn month_number(mmm: &str) -> Option<u32> {
    match mmm {
        "Jan" => Some(1),
        "Feb" => Some(2),
        "Mar" => Some(3),
        "Apr" => Some(4),
        "May" => Some(5),
        "Jun" => Some(6),
        "Jul" => Some(7),
        "Aug" => Some(8),
        "Sep" => Some(9),
        "Oct" => Some(10),
        "Nov" => Some(11),
        "Dec" => Some(12),
        _ => None,
    }
}

#[cfg(test)]
#[path = "shell_tests.rs"]
mod tests;
