// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Template context for rule rendering: flattened raw fields plus derived
//! human-readable values. Rendering is pure so rules are testable without I/O.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::model::LogEntry;

pub type Context = BTreeMap<String, String>;

/// Radio band code → human label.
pub fn band_label(code: &str) -> Option<&'static str> {
    match code {
        "ng" => Some("2.4GHz"),
        "na" => Some("5GHz"),
        "6e" => Some("6GHz"),
        _ => None,
    }
}

/// RSSI (dBm) → quality bucket.
pub fn rssi_quality(dbm: i64) -> &'static str {
    if dbm >= -50 {
        "Excellent"
    } else if dbm >= -60 {
        "Good"
    } else if dbm >= -70 {
        "Fair"
    } else if dbm >= -80 {
        "Poor"
    } else {
        "Very Poor"
    }
}

/// Build the rendering context for one entry.
///
/// Every scalar field of the raw record is available under its own name;
/// derived keys (`band`, `signal_quality`, `device_name`) are layered on top.
pub fn build_context(entry: &LogEntry) -> Context {
    let mut ctx = Context::new();

    if let Some(object) = entry.raw.as_object() {
        for (key, value) in object {
            match value {
                Value::String(s) => {
                    ctx.insert(key.clone(), s.clone());
                }
                Value::Number(n) => {
                    ctx.insert(key.clone(), n.to_string());
                }
                Value::Bool(b) => {
                    ctx.insert(key.clone(), b.to_string());
                }
                _ => {}
            }
        }
    }

    ctx.insert("event_type".to_owned(), entry.event_type.clone());
    ctx.insert("message".to_owned(), entry.message.clone());
    ctx.insert("source".to_owned(), entry.source.as_str().to_owned());
    ctx.insert("timestamp".to_owned(), entry.timestamp.to_rfc3339());
    if let Some(ref mac) = entry.device_mac {
        ctx.insert("device_mac".to_owned(), mac.clone());
    }

    if let Some(label) = ["radio_to", "radio"]
        .iter()
        .filter_map(|k| entry.raw.get(*k))
        .filter_map(Value::as_str)
        .find_map(band_label)
    {
        ctx.insert("band".to_owned(), label.to_owned());
    }

    if let Some(rssi) = entry.raw.get("rssi").and_then(Value::as_i64) {
        // The controller reports RSSI as a positive offset as often as a
        // signed dBm value; fold to dBm first.
        let dbm = if rssi > 0 { rssi - 100 } else { rssi };
        ctx.insert("signal_quality".to_owned(), rssi_quality(dbm).to_owned());
    }

    let device_name = ["ap_name", "sw_name", "gw_name", "hostname"]
        .iter()
        .filter_map(|k| entry.raw.get(*k))
        .filter_map(Value::as_str)
        .find(|s| !s.is_empty())
        .map(str::to_owned)
        .or_else(|| entry.device_name.clone())
        .or_else(|| entry.device_mac.clone());
    if let Some(name) = device_name {
        ctx.insert("device_name".to_owned(), name);
    }

    ctx
}

/// Render a `{placeholder}` template against a context.
///
/// Missing keys render as the empty string. An unterminated placeholder is a
/// template error, reported rather than rendered.
pub fn render_template(template: &str, ctx: &Context) -> anyhow::Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            anyhow::bail!("unterminated placeholder in template {template:?}");
        };
        if let Some(value) = ctx.get(&after[..end]) {
            out.push_str(value);
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
