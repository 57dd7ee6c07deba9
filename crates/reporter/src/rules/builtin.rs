// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Built-in rule set for the stock controller event keys.

use regex::Regex;

use crate::model::{Category, Severity};
use crate::rules::{Rule, RuleRegistry};

struct RuleSpec {
    name: &'static str,
    event_types: &'static [&'static str],
    pattern: Option<&'static str>,
    category: Category,
    severity: Severity,
    title: &'static str,
    description: &'static str,
    remediation: Option<&'static str>,
}

const RULES: &[RuleSpec] = &[
    RuleSpec {
        name: "client-roam",
        event_types: &["EVT_WU_Roam"],
        pattern: None,
        category: Category::Wireless,
        severity: Severity::Low,
        title: "Client roamed from {ap_from} to {ap_to}",
        description: "Client {user} roamed between access points ({ap_from} → {ap_to}).",
        remediation: None,
    },
    RuleSpec {
        name: "client-roam-radio",
        event_types: &["EVT_WU_RoamRadio"],
        pattern: None,
        category: Category::Wireless,
        severity: Severity::Low,
        title: "Client switched to the {band} band",
        description: "Client {user} moved radios on {device_name} ({band}, signal {signal_quality}).",
        remediation: None,
    },
    RuleSpec {
        name: "client-connected",
        event_types: &["EVT_WU_Connected", "EVT_WG_Connected"],
        pattern: None,
        category: Category::Connectivity,
        severity: Severity::Low,
        title: "Client {user} connected",
        description: "Client {user} associated with {device_name}.",
        remediation: None,
    },
    RuleSpec {
        name: "client-disconnected",
        event_types: &["EVT_WU_Disconnected", "EVT_WG_Disconnected"],
        pattern: None,
        category: Category::Connectivity,
        severity: Severity::Low,
        title: "Client {user} disconnected",
        description: "Client {user} left {device_name}.",
        remediation: None,
    },
    RuleSpec {
        name: "channel-change",
        event_types: &["EVT_AP_ChannelChanged"],
        pattern: None,
        category: Category::Wireless,
        severity: Severity::Low,
        title: "{device_name} changed channel",
        description: "Access point {device_name} moved to channel {channel_to} ({band}).",
        remediation: None,
    },
    // Specialised sibling of channel-change: same event key, refined by the
    // message pattern, so both findings are emitted for a radar hit.
    RuleSpec {
        name: "radar-channel-change",
        event_types: &["EVT_AP_ChannelChanged"],
        pattern: Some(r"(?i)radar.*(detected|hit)"),
        category: Category::Wireless,
        severity: Severity::Medium,
        title: "Radar event forced {device_name} off its channel",
        description: "DFS radar detection on {device_name}; the radio vacated channel {channel_from}.",
        remediation: Some("Prefer non-DFS channels on {device_name} if radar hits recur."),
    },
    RuleSpec {
        name: "ap-lost-contact",
        event_types: &["EVT_AP_Lost_Contact"],
        pattern: None,
        category: Category::Connectivity,
        severity: Severity::Medium,
        title: "Access point {device_name} went offline",
        description: "The controller lost contact with {device_name}.",
        remediation: Some("Check PoE power and uplink cabling to {device_name}."),
    },
    RuleSpec {
        name: "wan-transition",
        event_types: &["EVT_GW_WANTransition"],
        pattern: None,
        category: Category::Connectivity,
        severity: Severity::Severe,
        title: "WAN state changed on {device_name}",
        description: "Gateway {device_name} reported a WAN transition: {message}",
        remediation: Some("Verify the WAN uplink, modem, and ISP status; confirm failover behaved as expected."),
    },
    RuleSpec {
        name: "ips-alert",
        event_types: &["EVT_IPS_IpsAlert"],
        pattern: None,
        category: Category::Security,
        severity: Severity::Severe,
        title: "Intrusion alert: {inner_alert_signature}",
        description: "IPS signature {inner_alert_signature_id} ({inner_alert_category}) matched traffic from {src_ip}; action: {inner_alert_action}.",
        remediation: Some("Review traffic from {src_ip}; if the action was detect-only, consider enabling blocking for this category."),
    },
    RuleSpec {
        name: "poe-disconnect",
        event_types: &["EVT_SW_PoeDisconnect"],
        pattern: None,
        category: Category::System,
        severity: Severity::Medium,
        title: "PoE device disconnected from {device_name}",
        description: "A powered device dropped off {device_name}: {message}",
        remediation: Some("Inspect the cable and the powered device on the affected port."),
    },
    RuleSpec {
        name: "stp-port-blocking",
        event_types: &["EVT_SW_StpPortBlocking"],
        pattern: None,
        category: Category::System,
        severity: Severity::Medium,
        title: "STP blocked a port on {device_name}",
        description: "Spanning tree put a port on {device_name} into blocking: {message}",
        remediation: Some("Look for a loop or redundant uplink behind the blocked port."),
    },
    RuleSpec {
        name: "device-restart",
        event_types: &["EVT_AP_RestartedUnknown", "EVT_SW_RestartedUnknown", "EVT_GW_RestartedUnknown"],
        pattern: None,
        category: Category::System,
        severity: Severity::Medium,
        title: "{device_name} restarted unexpectedly",
        description: "Device {device_name} rebooted without an operator request.",
        remediation: Some("Check power delivery and recent logs on {device_name}; a repeat suggests failing hardware."),
    },
    RuleSpec {
        name: "admin-login-failure",
        event_types: &["EVT_AD_LoginFailed"],
        pattern: None,
        category: Category::Security,
        severity: Severity::Medium,
        title: "Failed admin login",
        description: "A controller admin login failed: {message}",
        remediation: Some("Confirm the attempt was expected; rotate credentials if not."),
    },
    RuleSpec {
        name: "firmware-upgrade",
        event_types: &["EVT_AP_Upgraded", "EVT_SW_Upgraded", "EVT_GW_Upgraded"],
        pattern: None,
        category: Category::System,
        severity: Severity::Low,
        title: "{device_name} finished a firmware upgrade",
        description: "Device {device_name} upgraded: {message}",
        remediation: None,
    },
];

/// Build the default registry.
pub fn default_registry() -> anyhow::Result<RuleRegistry> {
    let mut registry = RuleRegistry::new();
    for spec in RULES {
        let pattern = match spec.pattern {
            Some(raw) => Some(Regex::new(raw)?),
            None => None,
        };
        registry.register(Rule {
            name: spec.name.to_owned(),
            event_types: spec.event_types.iter().map(|s| (*s).to_owned()).collect(),
            pattern,
            category: spec.category,
            severity: spec.severity,
            title_template: spec.title.to_owned(),
            description_template: spec.description.to_owned(),
            remediation_template: spec.remediation.map(str::to_owned),
        })?;
    }
    Ok(registry)
}

#[cfg(test)]
#[path = "builtin_tests.rs"]
mod tests;
