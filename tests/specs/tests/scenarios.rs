// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenario suite: drives the real pipeline against a mock
//! controller and asserts the documented run-level behaviors.

use std::collections::BTreeMap;
use std::sync::Arc;

use unireport::collect::push::PushBuffer;
use unireport::model::{Category, LogEntry, Severity, Source};
use unireport_specs::{
    ips_record, minutes_ago_ms, overheating_device, parse_ms, roam_record, SpecHarnessBuilder,
    SpecIntegration, TestController,
};

// -- scenario 1: first run, single roam event ---------------------------------

#[tokio::test]
async fn first_run_reports_roam_and_writes_checkpoint() -> anyhow::Result<()> {
    let controller = TestController::start().await;
    let ts = minutes_ago_ms(10);
    controller
        .mount_events(vec![roam_record("e1", ts, "aa:bb:cc:dd:ee:01", "AP-A", "AP-B")])
        .await;
    controller.mount_empty_alarms_and_devices().await;

    let harness = SpecHarnessBuilder::default().with_rest(controller.session()?).build()?;
    assert_eq!(harness.checkpoint.read(), None, "fresh harness has no checkpoint");

    let outcome = harness.pipeline.run_once().await.map_err(|e| anyhow::anyhow!("{e}"))?;

    assert_eq!(outcome.report.findings.len(), 1);
    let finding = &outcome.report.findings[0];
    assert_eq!(finding.title, "Client roamed from AP-A to AP-B");
    assert_eq!(finding.severity, Severity::Low);
    assert_eq!(finding.category, Category::Wireless);

    let event_time = parse_ms(ts).ok_or_else(|| anyhow::anyhow!("bad fixture ts"))?;
    let written = harness
        .checkpoint
        .read()
        .and_then(|c| c.last_delivered_event_time)
        .ok_or_else(|| anyhow::anyhow!("checkpoint missing after delivery"))?;
    assert!(written >= event_time, "checkpoint covers the delivered event");
    assert_eq!(written, outcome.new_checkpoint);
    Ok(())
}

// -- scenario 2: flapping client ----------------------------------------------

#[tokio::test]
async fn five_roams_emit_per_event_and_flapping_findings() -> anyhow::Result<()> {
    let controller = TestController::start().await;
    let records = (0..5)
        .map(|i| {
            let (from, to) = if i % 2 == 0 { ("AP-A", "AP-B") } else { ("AP-B", "AP-A") };
            roam_record(&format!("e{i}"), minutes_ago_ms(10 - i), "aa:bb:cc:dd:ee:01", from, to)
        })
        .collect();
    controller.mount_events(records).await;
    controller.mount_empty_alarms_and_devices().await;

    let harness = SpecHarnessBuilder::default().with_rest(controller.session()?).build()?;
    let outcome = harness.pipeline.run_once().await.map_err(|e| anyhow::anyhow!("{e}"))?;

    let per_event = outcome
        .report
        .findings
        .iter()
        .find(|f| f.metadata.get("rule").map(String::as_str) == Some("client-roam"))
        .ok_or_else(|| anyhow::anyhow!("missing rolled-up roam finding"))?;
    assert_eq!(per_event.occurrence_count, 5);
    assert!(per_event.is_recurring());
    assert_eq!(per_event.occurrence_count as usize, per_event.source_event_ids.len());

    let flapping = outcome
        .report
        .findings
        .iter()
        .find(|f| f.metadata.get("rule").map(String::as_str) == Some("roam-flapping"))
        .ok_or_else(|| anyhow::anyhow!("missing flapping finding"))?;
    assert_eq!(flapping.severity, Severity::Medium);
    assert!(flapping.title.contains("aa:bb:cc:dd:ee:01"));
    assert!(flapping.description.contains("AP-A") && flapping.description.contains("AP-B"));
    Ok(())
}

// -- scenario 3: push + REST merge and dedup ----------------------------------

#[tokio::test]
async fn overlapping_push_and_rest_entries_dedup_to_twelve() -> anyhow::Result<()> {
    let controller = TestController::start().await;

    // REST returns 12 events; 3 of them share (ts, msg, mac) with pushed ones.
    let mut records = Vec::new();
    for i in 0..12 {
        records.push(roam_record(
            &format!("r{i}"),
            minutes_ago_ms(30 - i),
            "aa:bb:cc:dd:ee:01",
            "AP-A",
            "AP-B",
        ));
    }
    controller.mount_events(records.clone()).await;
    controller.mount_empty_alarms_and_devices().await;

    let buffer = Arc::new(PushBuffer::new(1000));
    for record in records.iter().take(3) {
        let mut entry = LogEntry::from_controller(record, Source::Push)
            .map_err(|e| anyhow::anyhow!("{e}"))?;
        entry.id = format!("push-{}", entry.id);
        buffer.push(entry);
    }

    let harness = SpecHarnessBuilder::default()
        .with_push_buffer(buffer)
        .with_rest(controller.session()?)
        .build()?;
    let outcome = harness.pipeline.run_once().await.map_err(|e| anyhow::anyhow!("{e}"))?;

    assert_eq!(outcome.new_entries, 12, "duplicates collapse to the distinct set");
    Ok(())
}

// -- scenario 4: integration timeout isolation --------------------------------

#[tokio::test]
async fn integration_timeout_is_isolated_from_findings() -> anyhow::Result<()> {
    let controller = TestController::start().await;
    controller
        .mount_events(vec![roam_record("e1", minutes_ago_ms(5), "aa:bb:cc:dd:ee:01", "AP-A", "AP-B")])
        .await;
    controller.mount_empty_alarms_and_devices().await;

    let mut builder = SpecHarnessBuilder::default().with_rest(controller.session()?);
    builder.integrations =
        vec![SpecIntegration::hanging("integration-a"), SpecIntegration::ok("integration-b")];
    let harness = builder.build()?;

    let outcome = harness.pipeline.run_once().await.map_err(|e| anyhow::anyhow!("{e}"))?;

    // Findings from controller data are untouched by the timeout.
    assert_eq!(outcome.report.findings.len(), 1);

    let a = outcome
        .report
        .integration_sections
        .iter()
        .find(|s| s.name == "integration-a")
        .ok_or_else(|| anyhow::anyhow!("missing section for the timed-out integration"))?;
    assert_eq!(a.error.as_deref(), Some("timeout"));

    let b = outcome
        .report
        .integration_sections
        .iter()
        .find(|s| s.name == "integration-b")
        .ok_or_else(|| anyhow::anyhow!("missing section for the healthy integration"))?;
    assert!(b.error.is_none());
    assert_eq!(b.items, vec![("status".to_owned(), "ok".to_owned())]);

    assert_eq!(harness.runner.breaker_failures("integration-a"), 1);
    assert_eq!(harness.runner.breaker_failures("integration-b"), 0);
    Ok(())
}

// -- scenario 5: delivery failure ---------------------------------------------

#[tokio::test]
async fn failed_delivery_reprocesses_the_same_window() -> anyhow::Result<()> {
    let controller = TestController::start().await;
    controller
        .mount_events(vec![roam_record("e1", minutes_ago_ms(5), "aa:bb:cc:dd:ee:01", "AP-A", "AP-B")])
        .await;
    controller.mount_empty_alarms_and_devices().await;

    let mut builder = SpecHarnessBuilder::default().with_rest(controller.session()?);
    builder.delivery_fails = true;
    let harness = builder.build()?;

    let err = match harness.pipeline.run_once().await {
        Err(e) => e,
        Ok(_) => return Err(anyhow::anyhow!("run must fail when delivery fails")),
    };
    assert_eq!(err.exit_code(), 3);

    assert_eq!(harness.checkpoint.read(), None, "checkpoint must not advance");
    let health = harness.health.read().ok_or_else(|| anyhow::anyhow!("health file missing"))?;
    assert_eq!(health.status, "unhealthy");
    assert!(health.last_error.is_some_and(|e| e.contains("smtp relay unreachable")));
    Ok(())
}

// -- scenario 6: cybersecure IPS event ----------------------------------------

#[tokio::test]
async fn cybersecure_ips_event_yields_severe_and_summary_findings() -> anyhow::Result<()> {
    let controller = TestController::start().await;
    controller
        .mount_events(vec![ips_record("ips1", minutes_ago_ms(5), "45.33.32.156", 2_850_001, "blocked")])
        .await;
    controller.mount_empty_alarms_and_devices().await;

    let harness = SpecHarnessBuilder::default().with_rest(controller.session()?).build()?;
    let outcome = harness.pipeline.run_once().await.map_err(|e| anyhow::anyhow!("{e}"))?;

    let severe: Vec<_> = outcome
        .report
        .findings
        .iter()
        .filter(|f| f.severity == Severity::Severe && f.category == Category::Security)
        .collect();
    assert_eq!(severe.len(), 2, "per-event IPS finding plus the threat summary");
    for finding in &severe {
        assert_eq!(finding.metadata.get("is_cybersecure").map(String::as_str), Some("true"));
        assert!(finding.remediation.is_some(), "severe findings must be actionable");
    }
    let summary = severe
        .iter()
        .find(|f| f.metadata.get("rule").map(String::as_str) == Some("threat-summary"))
        .ok_or_else(|| anyhow::anyhow!("missing threat summary"))?;
    assert!(summary.description.contains("45.33.32.156"));
    assert!(summary.description.contains("1 blocked"));
    Ok(())
}

// -- device health through the full pipeline ----------------------------------

#[tokio::test]
async fn device_health_findings_stay_inside_the_report_window() -> anyhow::Result<()> {
    let controller = TestController::start().await;
    // A quiet window: zero new entries, only a hot device snapshot.
    controller.mount_events(vec![]).await;
    controller.mount_empty_alarms_and_devices().await;

    let mut builder = SpecHarnessBuilder::default().with_rest(controller.session()?);
    builder.device_stats = vec![overheating_device("core-switch", 93.0)];
    let harness = builder.build()?;

    let outcome = harness.pipeline.run_once().await.map_err(|e| anyhow::anyhow!("{e}"))?;
    assert_eq!(outcome.new_entries, 0);

    let finding = outcome
        .report
        .findings
        .iter()
        .find(|f| f.metadata.get("rule").map(String::as_str) == Some("device-health"))
        .ok_or_else(|| anyhow::anyhow!("missing device health finding"))?;
    assert_eq!(finding.severity, Severity::Severe);
    assert!(finding.remediation.is_some());
    assert!(finding.title.contains("core-switch"));
    // Even with no entries to anchor to, the finding stays in the period.
    assert!(finding.first_seen >= outcome.report.period_start);
    assert!(finding.last_seen <= outcome.report.period_end);
    Ok(())
}

// -- cross-cutting invariants -------------------------------------------------

#[tokio::test]
async fn collector_outputs_satisfy_entry_invariants() -> anyhow::Result<()> {
    let controller = TestController::start().await;
    controller
        .mount_events(vec![
            roam_record("e1", minutes_ago_ms(10), "aa:bb:cc:dd:ee:01", "AP-A", "AP-B"),
            ips_record("e2", minutes_ago_ms(8), "203.0.113.9", 2_000_001, "alert"),
        ])
        .await;
    controller.mount_empty_alarms_and_devices().await;

    let harness = SpecHarnessBuilder::default().with_rest(controller.session()?).build()?;
    let outcome = harness.pipeline.run_once().await.map_err(|e| anyhow::anyhow!("{e}"))?;

    // Severe findings carry remediation; counts match the finding set.
    let report = &outcome.report;
    assert!(report
        .findings
        .iter()
        .filter(|f| f.severity == Severity::Severe)
        .all(|f| f.remediation.as_deref().is_some_and(|r| !r.is_empty())));
    assert_eq!(
        report.severe_count() + report.medium_count() + report.low_count(),
        report.findings.len()
    );
    // Report window invariant.
    assert!(report.period_start <= report.period_end);
    assert!(report.period_end <= report.generated_at);
    for finding in &report.findings {
        assert!(finding.last_seen <= report.period_end);
        assert!(finding.first_seen >= report.period_start);
    }
    Ok(())
}

#[tokio::test]
async fn quiet_second_run_delivers_confirmation_only() -> anyhow::Result<()> {
    let controller = TestController::start().await;
    controller
        .mount_events(vec![roam_record("e1", minutes_ago_ms(10), "aa:bb:cc:dd:ee:01", "AP-A", "AP-B")])
        .await;
    controller.mount_empty_alarms_and_devices().await;

    let harness = SpecHarnessBuilder::default().with_rest(controller.session()?).build()?;
    let first = harness.pipeline.run_once().await.map_err(|e| anyhow::anyhow!("{e}"))?;
    assert_eq!(first.report.findings.len(), 1);

    // Same controller state: the event now sits before the new window.
    let second = harness.pipeline.run_once().await.map_err(|e| anyhow::anyhow!("{e}"))?;
    assert_eq!(second.new_entries, 0);
    assert!(second.report.findings.is_empty());

    let delivered = harness.delivery.delivered.lock();
    assert_eq!(delivered.len(), 2);
    assert!(delivered[1].1.subject.contains("no new events"));
    Ok(())
}

// -- properties ---------------------------------------------------------------

#[test]
fn timestamp_normalization_is_idempotent_for_any_epoch() {
    use proptest::prelude::*;
    // Seconds up to year 9999, and anything past the 10^12 threshold as ms.
    let strategy = proptest::prop_oneof![
        1i64..253_402_300_799,
        1_000_000_000_001i64..4_102_444_800_000,
    ];
    let mut runner = proptest::test_runner::TestRunner::default();
    let result = runner.run(&strategy, |epoch| {
        let first = unireport::model::normalize_epoch(epoch)
            .ok_or_else(|| proptest::test_runner::TestCaseError::fail("epoch rejected"))?;
        let again = unireport::model::normalize_timestamp(&serde_json::json!(first.to_rfc3339()))
            .ok_or_else(|| proptest::test_runner::TestCaseError::fail("rfc3339 rejected"))?;
        prop_assert_eq!(first, again);
        Ok(())
    });
    assert!(result.is_ok(), "{result:?}");
}

#[test]
fn push_buffer_never_exceeds_capacity() {
    use proptest::prelude::*;
    let mut runner = proptest::test_runner::TestRunner::default();
    let result = runner
        .run(&proptest::collection::vec(0i64..10_000, 0..200), |offsets| {
            let buffer = PushBuffer::new(50);
            let base = chrono::Utc::now();
            for (i, offset) in offsets.iter().enumerate() {
                buffer.push(LogEntry {
                    id: format!("e{i}"),
                    timestamp: base + chrono::Duration::seconds(*offset),
                    source: Source::Push,
                    event_type: "EVT_WU_Roam".to_owned(),
                    device_mac: None,
                    device_name: None,
                    message: String::new(),
                    raw: serde_json::json!({}),
                    metadata: BTreeMap::new(),
                });
            }
            prop_assert!(buffer.len() <= 50);
            let expected_drops = offsets.len().saturating_sub(50) as u64;
            prop_assert_eq!(buffer.dropped_total(), expected_drops);
            Ok(())
        });
    assert!(result.is_ok(), "{result:?}");
}
