// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Post-pass detectors over the collected entries: flapping clients, threat
//! summaries, device health rollups. Aggregators are pure and independent of
//! one another — each only appends findings.

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;
use serde_json::Value;

use crate::model::{
    Category, DeviceStats, Finding, IpsEvent, LogEntry, Severity,
};

/// A detector over the whole run, fed the entries and the per-event findings.
pub trait Aggregator: Send + Sync {
    fn name(&self) -> &'static str;

    fn aggregate(&self, entries: &[LogEntry], findings: &[Finding]) -> Vec<Finding>;
}

/// Flags clients that roamed at least `threshold` times in the window.
pub struct RoamFlappingDetector {
    threshold: u32,
}

impl RoamFlappingDetector {
    pub const DEFAULT_THRESHOLD: u32 = 5;

    pub fn new(threshold: u32) -> Self {
        Self { threshold: threshold.max(1) }
    }
}

impl Default for RoamFlappingDetector {
    fn default() -> Self {
        Self::new(Self::DEFAULT_THRESHOLD)
    }
}

impl Aggregator for RoamFlappingDetector {
    fn name(&self) -> &'static str {
        "roam-flapping"
    }

    fn aggregate(&self, entries: &[LogEntry], _findings: &[Finding]) -> Vec<Finding> {
        // Group roaming events by client MAC, preserving first-seen order.
        let mut by_client: IndexMap<String, Vec<&LogEntry>> = IndexMap::new();
        for entry in entries {
            if entry.event_type != "EVT_WU_Roam" {
                continue;
            }
            let Some(client) = entry
                .raw
                .get("user")
                .and_then(Value::as_str)
                .and_then(crate::model::normalize_mac)
            else {
                continue;
            };
            by_client.entry(client).or_default().push(entry);
        }

        let mut findings = Vec::new();
        for (client, events) in by_client {
            if (events.len() as u32) < self.threshold {
                continue;
            }
            let mut aps = BTreeSet::new();
            for event in &events {
                for key in ["ap_from", "ap_to"] {
                    if let Some(ap) = event.raw.get(key).and_then(Value::as_str) {
                        if !ap.is_empty() {
                            aps.insert(ap.to_owned());
                        }
                    }
                }
            }
            let ap_list: Vec<String> = aps.iter().cloned().collect();
            let ids: BTreeSet<String> = events.iter().map(|e| e.id.clone()).collect();
            let Some(first) = events.iter().map(|e| e.timestamp).min() else { continue };
            let Some(last) = events.iter().map(|e| e.timestamp).max() else { continue };

            let mut metadata = BTreeMap::new();
            metadata.insert("rule".to_owned(), self.name().to_owned());
            metadata.insert("roam_count".to_owned(), events.len().to_string());

            findings.push(Finding {
                id: uuid::Uuid::new_v4().to_string(),
                category: Category::Wireless,
                severity: Severity::Medium,
                title: format!("Client {client} is flapping between access points"),
                description: format!(
                    "Client {client} roamed {} times across {} ({})",
                    events.len(),
                    if ap_list.len() == 1 { "one access point" } else { "multiple access points" },
                    ap_list.join(", "),
                ),
                remediation: Some(
                    "Check AP placement and minimum RSSI settings along the client's path.".to_owned(),
                ),
                occurrence_count: ids.len() as u32,
                first_seen: first,
                last_seen: last,
                affected_entities: BTreeSet::from([client]),
                source_event_ids: ids,
                metadata,
            });
        }
        findings
    }
}

/// Summarises IPS activity by source IP, separating blocked traffic from
/// detect-only hits and flagging Cybersecure signatures.
pub struct ThreatSummaryAggregator {
    top_n: usize,
}

impl ThreatSummaryAggregator {
    pub const DEFAULT_TOP_N: usize = 5;

    pub fn new(top_n: usize) -> Self {
        Self { top_n: top_n.max(1) }
    }
}

impl Default for ThreatSummaryAggregator {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TOP_N)
    }
}

impl Aggregator for ThreatSummaryAggregator {
    fn name(&self) -> &'static str {
        "threat-summary"
    }

    fn aggregate(&self, entries: &[LogEntry], _findings: &[Finding]) -> Vec<Finding> {
        let events: Vec<IpsEvent> = entries.iter().filter_map(IpsEvent::from_entry).collect();
        if events.is_empty() {
            return Vec::new();
        }

        struct SourceGroup {
            total: usize,
            blocked: usize,
            cybersecure: bool,
        }

        let mut by_source: IndexMap<String, SourceGroup> = IndexMap::new();
        let mut by_category: BTreeMap<String, usize> = BTreeMap::new();
        for event in &events {
            let source = event.src_ip.clone().unwrap_or_else(|| "unknown".to_owned());
            let group = by_source
                .entry(source)
                .or_insert(SourceGroup { total: 0, blocked: 0, cybersecure: false });
            group.total += 1;
            if event.is_blocked() {
                group.blocked += 1;
            }
            group.cybersecure |= event.is_cybersecure();

            let category =
                if event.category.is_empty() { "uncategorised".to_owned() } else { event.category.clone() };
            *by_category.entry(category).or_default() += 1;
        }

        let mut ranked: Vec<(String, SourceGroup)> = by_source.into_iter().collect();
        ranked.sort_by(|a, b| b.1.total.cmp(&a.1.total));

        let any_cybersecure = ranked.iter().any(|(_, g)| g.cybersecure);
        let mut lines = Vec::new();
        for (ip, group) in ranked.iter().take(self.top_n) {
            let tag = if group.cybersecure { " [cybersecure]" } else { "" };
            lines.push(format!(
                "{ip}: {} hits ({} blocked, {} detected){tag}",
                group.total,
                group.blocked,
                group.total - group.blocked,
            ));
        }
        let categories = by_category
            .iter()
            .map(|(c, n)| format!("{c}: {n}"))
            .collect::<Vec<_>>()
            .join(", ");

        let ids: BTreeSet<String> = events.iter().map(|e| e.entry_id.clone()).collect();
        let Some(first) = events.iter().map(|e| e.timestamp).min() else { return Vec::new() };
        let Some(last) = events.iter().map(|e| e.timestamp).max() else { return Vec::new() };

        let severity = if any_cybersecure { Severity::Severe } else { Severity::Medium };
        let mut metadata = BTreeMap::new();
        metadata.insert("rule".to_owned(), self.name().to_owned());
        metadata.insert("is_cybersecure".to_owned(), any_cybersecure.to_string());

        let affected: BTreeSet<String> =
            ranked.iter().take(self.top_n).map(|(ip, _)| ip.clone()).collect();

        vec![Finding {
            id: uuid::Uuid::new_v4().to_string(),
            category: Category::Security,
            severity,
            title: format!("Intrusion activity from {} source(s)", ranked.len()),
            description: format!(
                "Top sources:\n{}\nBy category: {categories}",
                lines.join("\n"),
            ),
            remediation: Some(
                "Review the listed sources; block recurring offenders at the gateway and \
                 confirm detect-only categories that should be blocking."
                    .to_owned(),
            ),
            occurrence_count: ids.len() as u32,
            first_seen: first,
            last_seen: last,
            affected_entities: affected,
            source_event_ids: ids,
            metadata,
        }]
    }
}

/// Rolls device state snapshots into health findings: overheating, pegged
/// CPU/memory, PoE budget pressure.
pub struct DeviceHealthAggregator {
    stats: Vec<DeviceStats>,
    /// Instant the snapshots were observed, normally the window end. Findings
    /// are stamped with it so they stay inside the report period even on a
    /// run with no new entries.
    observed_at: chrono::DateTime<chrono::Utc>,
}

impl DeviceHealthAggregator {
    const TEMP_SEVERE_C: f64 = 90.0;
    const TEMP_MEDIUM_C: f64 = 80.0;
    const UTILISATION_PCT: f64 = 95.0;
    const POE_BUDGET_RATIO: f64 = 0.9;

    pub fn new(stats: Vec<DeviceStats>, observed_at: chrono::DateTime<chrono::Utc>) -> Self {
        Self { stats, observed_at }
    }

    fn finding(
        device: &DeviceStats,
        severity: Severity,
        category: Category,
        title: String,
        description: String,
        remediation: Option<String>,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Finding {
        let mut metadata = BTreeMap::new();
        metadata.insert("rule".to_owned(), "device-health".to_owned());
        metadata.insert("device_type".to_owned(), device.device_type.clone());
        Finding {
            id: uuid::Uuid::new_v4().to_string(),
            category,
            severity,
            title,
            description,
            remediation,
            occurrence_count: 1,
            first_seen: now,
            last_seen: now,
            affected_entities: BTreeSet::from([device.mac.clone()]),
            source_event_ids: BTreeSet::new(),
            metadata,
        }
    }
}

impl Aggregator for DeviceHealthAggregator {
    fn name(&self) -> &'static str {
        "device-health"
    }

    fn aggregate(&self, _entries: &[LogEntry], _findings: &[Finding]) -> Vec<Finding> {
        let now = self.observed_at;
        let mut findings = Vec::new();
        for device in &self.stats {
            if let Some(temp) = device.temperature_c {
                if temp >= Self::TEMP_SEVERE_C {
                    findings.push(Self::finding(
                        device,
                        Severity::Severe,
                        Category::System,
                        format!("{} is critically hot ({temp:.0}°C)", device.name),
                        format!("Device {} reported {temp:.1}°C.", device.name),
                        Some(format!(
                            "Improve airflow around {} immediately; sustained heat at this level \
                             damages hardware.",
                            device.name
                        )),
                        now,
                    ));
                } else if temp >= Self::TEMP_MEDIUM_C {
                    findings.push(Self::finding(
                        device,
                        Severity::Medium,
                        Category::System,
                        format!("{} is running hot ({temp:.0}°C)", device.name),
                        format!("Device {} reported {temp:.1}°C.", device.name),
                        Some(format!("Check ventilation around {}.", device.name)),
                        now,
                    ));
                }
            }

            for (label, value) in [("CPU", device.cpu_pct), ("memory", device.mem_pct)] {
                if let Some(pct) = value {
                    if pct >= Self::UTILISATION_PCT {
                        findings.push(Self::finding(
                            device,
                            Severity::Medium,
                            Category::Performance,
                            format!("{} {label} at {pct:.0}%", device.name),
                            format!("Device {} reported {label} utilisation of {pct:.1}%.", device.name),
                            Some(format!(
                                "Identify what is loading {} on {}; consider a reboot window.",
                                label, device.name
                            )),
                            now,
                        ));
                    }
                }
            }

            if let (Some(draw), Some(budget)) = (device.poe_draw_w, device.poe_budget_w) {
                if budget > 0.0 && draw >= budget * Self::POE_BUDGET_RATIO {
                    findings.push(Self::finding(
                        device,
                        Severity::Medium,
                        Category::System,
                        format!("{} PoE budget nearly exhausted", device.name),
                        format!(
                            "Switch {} is delivering {draw:.1}W of its {budget:.0}W PoE budget.",
                            device.name
                        ),
                        Some(format!(
                            "Move powered devices off {} or add PoE capacity before the budget trips.",
                            device.name
                        )),
                        now,
                    ));
                }
            }
        }
        findings
    }
}

#[cfg(test)]
#[path = "aggregate_tests.rs"]
mod tests;
