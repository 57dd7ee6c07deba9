// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::{TimeZone, Utc};
use serde_json::json;
use std::collections::BTreeMap;

fn entry(offset_s: i64) -> LogEntry {
    let base = Utc.with_ymd_and_hms(2026, 1, 24, 10, 0, 0).single().unwrap_or_default();
    LogEntry {
        id: format!("e{offset_s}"),
        timestamp: base + chrono::Duration::seconds(offset_s),
        source: Source::Push,
        event_type: "EVT_WU_Roam".into(),
        device_mac: None,
        device_name: None,
        message: format!("m{offset_s}"),
        raw: json!({}),
        metadata: BTreeMap::new(),
    }
}

#[test]
fn buffer_drains_in_arrival_order() {
    let buffer = PushBuffer::new(100);
    for i in 0..5 {
        buffer.push(entry(i));
    }
    assert_eq!(buffer.len(), 5);

    let drained = buffer.drain();
    assert_eq!(drained.len(), 5);
    assert!(drained.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    assert!(buffer.is_empty());
}

#[test]
fn full_buffer_overwrites_oldest_and_counts_drops() {
    let buffer = PushBuffer::new(3);
    for i in 0..5 {
        buffer.push(entry(i));
    }
    assert_eq!(buffer.len(), 3);
    assert_eq!(buffer.dropped_total(), 2);

    let drained = buffer.drain();
    assert_eq!(
        drained.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(),
        vec!["e2", "e3", "e4"]
    );
}

#[tokio::test]
async fn collector_drains_and_filters_by_window() -> anyhow::Result<()> {
    let buffer = Arc::new(PushBuffer::new(100));
    buffer.push(entry(10));
    buffer.push(entry(-7200)); // outside the window
    let collector = PushCollector::new(Arc::clone(&buffer));

    let start = Utc.with_ymd_and_hms(2026, 1, 24, 10, 0, 0).single().unwrap_or_default();
    let window = CollectWindow { start, end: start + chrono::Duration::hours(1) };
    let entries = collector.collect(window).await?;
    assert_eq!(entries.len(), 1);
    assert!(buffer.is_empty(), "drain must consume the buffer");
    Ok(())
}

#[test]
fn relevant_push_frames_produce_entries() {
    let frame = json!({
        "meta": {"message": "wu.roam"},
        "data": [{
            "time": 1_737_715_800_000_i64,
            "user": "aa:bb:cc:dd:ee:01",
            "ap_from": "AP-A",
            "ap_to": "AP-B",
            "msg": "roamed"
        }]
    });
    let entries = parse_push_message(&frame.to_string());
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].event_type, "EVT_WU_Roam");
    assert_eq!(entries[0].source, Source::Push);
}

#[test]
fn irrelevant_and_malformed_frames_are_ignored() {
    let wrong_type = json!({
        "meta": {"message": "device:update"},
        "data": [{"time": 1_737_715_800_000_i64, "msg": "x"}]
    });
    assert!(parse_push_message(&wrong_type.to_string()).is_empty());
    assert!(parse_push_message("not json at all").is_empty());
    assert!(parse_push_message("{}").is_empty());
}

#[test]
fn record_key_survives_when_present() {
    let frame = json!({
        "meta": {"message": "wu.connected"},
        "data": [{"key": "EVT_WU_Connected", "time": 1_737_715_800_000_i64, "msg": "joined"}]
    });
    let entries = parse_push_message(&frame.to_string());
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].event_type, "EVT_WU_Connected");
}

#[test]
fn records_without_timestamps_are_skipped() {
    let frame = json!({
        "meta": {"message": "sta:sync"},
        "data": [{"mac": "aa:bb:cc:dd:ee:01"}]
    });
    assert!(parse_push_message(&frame.to_string()).is_empty());
}
