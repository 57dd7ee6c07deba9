// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Normalized event and report model shared by collectors, rules, and delivery.
//!
//! Every parser here is total over malformed provider payloads: it returns a
//! valid value with best-effort fields or a [`ParseError`] — it never panics
//! and never aborts a run.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Epoch values greater than this are interpreted as milliseconds.
pub const EPOCH_MS_THRESHOLD: i64 = 1_000_000_000_000;

/// Suricata signature IDs reserved for the Cybersecure threat feed.
pub const CYBERSECURE_SIGNATURES: std::ops::RangeInclusive<u64> = 2_850_000..=2_899_999;

/// Which collector produced an entry. Order is fallback priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Source {
    Push,
    Rest,
    Shell,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Push => "PUSH",
            Self::Rest => "REST",
            Self::Shell => "SHELL",
        }
    }

    /// Tie-break priority when entries from different sources share a timestamp.
    pub fn priority(&self) -> u8 {
        match self {
            Self::Push => 0,
            Self::Rest => 1,
            Self::Shell => 2,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Finding severity. Ordering is ascending so `max()` picks the worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    Severe,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::Severe => "SEVERE",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Finding category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Connectivity,
    Performance,
    Security,
    System,
    Wireless,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connectivity => "connectivity",
            Self::Performance => "performance",
            Self::Security => "security",
            Self::System => "system",
            Self::Wireless => "wireless",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured parse failure for a provider record.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub reason: String,
    pub raw: Value,
}

impl ParseError {
    pub fn new(reason: impl Into<String>, raw: &Value) -> Self {
        Self { reason: reason.into(), raw: raw.clone() }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unparseable record: {}", self.reason)
    }
}

impl std::error::Error for ParseError {}

/// One normalized event from any source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub source: Source,
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_mac: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    pub message: String,
    /// Full source record, preserved verbatim for rule evaluation.
    pub raw: Value,
    /// Open map for downstream annotations.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl LogEntry {
    /// Parse a controller event or alarm record (REST and push share the shape).
    ///
    /// A record without a usable timestamp fails the parse — the current time
    /// is never silently substituted.
    pub fn from_controller(value: &Value, source: Source) -> Result<Self, ParseError> {
        let timestamp = ["time", "timestamp", "datetime"]
            .iter()
            .filter_map(|k| value.get(*k))
            .find_map(normalize_timestamp)
            .ok_or_else(|| ParseError::new("missing or invalid timestamp", value))?;

        let event_type = value
            .get("key")
            .or_else(|| value.get("event_type"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or("UNKNOWN")
            .to_owned();

        let message = value
            .get("msg")
            .or_else(|| value.get("message"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();

        let device_mac = ["ap_mac", "sw_mac", "gw_mac", "mac"]
            .iter()
            .filter_map(|k| value.get(*k))
            .filter_map(Value::as_str)
            .find_map(normalize_mac);

        let device_name = ["ap_name", "sw_name", "gw_name", "hostname"]
            .iter()
            .filter_map(|k| value.get(*k))
            .filter_map(Value::as_str)
            .find(|s| !s.is_empty())
            .map(str::to_owned);

        let id = value
            .get("_id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Ok(Self {
            id,
            timestamp,
            source,
            event_type,
            device_mac,
            device_name,
            message,
            raw: value.clone(),
            metadata: BTreeMap::new(),
        })
    }
}

/// One classified issue surfaced in the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub category: Category,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
    pub occurrence_count: u32,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub affected_entities: BTreeSet<String>,
    pub source_event_ids: BTreeSet<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Finding {
    /// A finding rolled up from five or more occurrences is recurring.
    pub fn is_recurring(&self) -> bool {
        self.occurrence_count >= 5
    }

    pub fn is_actionable(&self) -> bool {
        self.severity == Severity::Severe && self.remediation.is_some()
    }

    /// Fold another source event into this finding.
    ///
    /// `occurrence_count` tracks distinct source event ids, so folding the
    /// same event twice is a no-op.
    pub fn merge_event(&mut self, event_id: &str, timestamp: DateTime<Utc>) {
        if self.source_event_ids.insert(event_id.to_owned()) {
            self.occurrence_count += 1;
        }
        if timestamp < self.first_seen {
            self.first_seen = timestamp;
        }
        if timestamp > self.last_seen {
            self.last_seen = timestamp;
        }
    }
}

/// An additive report section produced by one integration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationSection {
    pub name: String,
    pub title: String,
    /// Ordered label/value rows.
    pub items: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IntegrationSection {
    pub fn failed(name: impl Into<String>, title: impl Into<String>, error: impl Into<String>) -> Self {
        Self { name: name.into(), title: title.into(), items: Vec::new(), error: Some(error.into()) }
    }
}

/// The output of one scheduled run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub site_name: String,
    pub controller_type: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
    pub findings: Vec<Finding>,
    pub integration_sections: Vec<IntegrationSection>,
}

impl Report {
    pub fn severe_count(&self) -> usize {
        self.findings.iter().filter(|f| f.severity == Severity::Severe).count()
    }

    pub fn medium_count(&self) -> usize {
        self.findings.iter().filter(|f| f.severity == Severity::Medium).count()
    }

    pub fn low_count(&self) -> usize {
        self.findings.iter().filter(|f| f.severity == Severity::Low).count()
    }
}

/// Intrusion-prevention view of an entry, derived from the raw payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpsEvent {
    pub entry_id: String,
    pub timestamp: DateTime<Utc>,
    pub signature_id: u64,
    pub signature: String,
    pub category: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

impl IpsEvent {
    /// Derive the IPS view from an entry, if it carries alert fields.
    pub fn from_entry(entry: &LogEntry) -> Option<Self> {
        let raw = &entry.raw;
        let signature_id = raw
            .get("inner_alert_signature_id")
            .or_else(|| raw.get("signature_id"))
            .and_then(as_u64_lenient)?;

        let field = |keys: &[&str]| -> Option<String> {
            keys.iter()
                .filter_map(|k| raw.get(*k))
                .filter_map(Value::as_str)
                .find(|s| !s.is_empty())
                .map(str::to_owned)
        };

        Some(Self {
            entry_id: entry.id.clone(),
            timestamp: entry.timestamp,
            signature_id,
            signature: field(&["inner_alert_signature", "signature"]).unwrap_or_default(),
            category: field(&["inner_alert_category", "category"]).unwrap_or_default(),
            action: field(&["inner_alert_action", "action"]).unwrap_or_default(),
            src_ip: field(&["src_ip", "srcip"]),
            dest_ip: field(&["dst_ip", "dstip", "dest_ip"]),
            protocol: field(&["proto", "protocol"]),
        })
    }

    /// Whether the signature falls in the Cybersecure reserved range.
    pub fn is_cybersecure(&self) -> bool {
        CYBERSECURE_SIGNATURES.contains(&self.signature_id)
    }

    /// Whether the engine dropped the traffic (vs. detect-only).
    pub fn is_blocked(&self) -> bool {
        matches!(self.action.to_ascii_lowercase().as_str(), "drop" | "block" | "blocked" | "reject")
    }
}

/// Device state snapshot from the controller's device endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStats {
    pub mac: String,
    pub name: String,
    pub device_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime_s: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mem_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature_c: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poe_draw_w: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poe_budget_w: Option<f64>,
}

impl DeviceStats {
    /// Parse one record from the device endpoint. Returns `None` without a MAC.
    pub fn from_value(value: &Value) -> Option<Self> {
        let mac = value.get("mac").and_then(Value::as_str).and_then(|s| normalize_mac(s))?;
        let name = value
            .get("name")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(&mac)
            .to_owned();

        let system_stats = value.get("system-stats");
        let pct = |key: &str| system_stats.and_then(|s| s.get(key)).and_then(as_f64_lenient);

        // PoE draw is summed over powered ports; the budget is chassis-wide.
        let mut poe_draw = None;
        if let Some(ports) = value.get("port_table").and_then(Value::as_array) {
            let watts: f64 = ports
                .iter()
                .filter(|p| p.get("port_poe").and_then(Value::as_bool).unwrap_or(false))
                .filter_map(|p| p.get("poe_power").and_then(as_f64_lenient))
                .sum();
            if watts > 0.0 {
                poe_draw = Some(watts);
            }
        }

        Some(Self {
            mac,
            name,
            device_type: value
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_owned(),
            model: value.get("model").and_then(Value::as_str).map(str::to_owned),
            uptime_s: value.get("uptime").and_then(Value::as_i64),
            cpu_pct: pct("cpu"),
            mem_pct: pct("mem"),
            temperature_c: value
                .get("general_temperature")
                .and_then(as_f64_lenient)
                .or_else(|| {
                    value
                        .get("temperatures")
                        .and_then(Value::as_array)
                        .and_then(|ts| {
                            ts.iter()
                                .filter_map(|t| t.get("value").and_then(as_f64_lenient))
                                .fold(None, |acc: Option<f64>, v| {
                                    Some(acc.map_or(v, |a| a.max(v)))
                                })
                        })
                }),
            poe_draw_w: poe_draw,
            poe_budget_w: value.get("total_max_power").and_then(as_f64_lenient),
        })
    }
}

/// Normalize a raw timestamp value into a UTC instant.
///
/// Epoch numbers above [`EPOCH_MS_THRESHOLD`] are milliseconds, otherwise
/// seconds. Strings go through RFC 3339 first, then a small set of naive
/// formats interpreted as UTC. Idempotent over its own RFC 3339 output.
pub fn normalize_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                normalize_epoch(i)
            } else {
                let f = n.as_f64()?;
                if f > EPOCH_MS_THRESHOLD as f64 {
                    Utc.timestamp_millis_opt(f as i64).single()
                } else {
                    Utc.timestamp_millis_opt((f * 1000.0).round() as i64).single()
                }
            }
        }
        Value::String(s) => parse_timestamp_str(s),
        _ => None,
    }
}

/// Epoch disambiguation: values strictly above 10^12 are milliseconds.
pub fn normalize_epoch(epoch: i64) -> Option<DateTime<Utc>> {
    if epoch <= 0 {
        return None;
    }
    if epoch > EPOCH_MS_THRESHOLD {
        Utc.timestamp_millis_opt(epoch).single()
    } else {
        Utc.timestamp_opt(epoch, 0).single()
    }
}

fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(i) = s.parse::<i64>() {
        return normalize_epoch(i);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Naive instants are treated as UTC.
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}

/// Normalize a MAC address to lowercase colon form. Returns `None` unless the
/// input has exactly twelve hex digits after separators are stripped.
pub fn normalize_mac(raw: &str) -> Option<String> {
    let digits: String = raw
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | '.'))
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if digits.len() != 12 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let mut out = String::with_capacity(17);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && i % 2 == 0 {
            out.push(':');
        }
        out.push(c);
    }
    Some(out)
}

/// Accept numbers or numeric strings — the controller mixes both.
pub fn as_f64_lenient(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Accept numbers or numeric strings for unsigned integer fields.
pub fn as_u64_lenient(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;
