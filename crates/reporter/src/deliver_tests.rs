// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::render::RenderedReport;
use chrono::{TimeZone, Utc};

fn report() -> Report {
    let start = Utc.with_ymd_and_hms(2026, 1, 24, 9, 0, 0).single().unwrap_or_default();
    Report {
        site_name: "default".into(),
        controller_type: "unifi-os".into(),
        period_start: start,
        period_end: start + chrono::Duration::hours(1),
        generated_at: start + chrono::Duration::hours(1),
        findings: vec![],
        integration_sections: vec![],
    }
}

fn rendered() -> RenderedReport {
    RenderedReport {
        subject: "UniFi report for default: no new events".into(),
        text: "text body".into(),
        html: "<html>body</html>".into(),
    }
}

#[tokio::test]
async fn file_delivery_writes_selected_formats() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;

    let both = FileDelivery::new(dir.path().to_path_buf(), ReportFormat::Both, 0);
    both.deliver(&report(), &rendered()).await?;
    assert!(dir.path().join("unifi-report-20260124-100000.html").exists());
    assert!(dir.path().join("unifi-report-20260124-100000.txt").exists());

    let html_only = tempfile::tempdir()?;
    FileDelivery::new(html_only.path().to_path_buf(), ReportFormat::Html, 0)
        .deliver(&report(), &rendered())
        .await?;
    assert!(html_only.path().join("unifi-report-20260124-100000.html").exists());
    assert!(!html_only.path().join("unifi-report-20260124-100000.txt").exists());
    Ok(())
}

#[tokio::test]
async fn retention_prunes_by_embedded_timestamp() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("unifi-report-20250101-000000.html"), "old")?;
    std::fs::write(dir.path().join("unifi-report-20260123-000000.txt"), "fresh")?;
    std::fs::write(dir.path().join("unrelated.txt"), "keep")?;

    let delivery = FileDelivery::new(dir.path().to_path_buf(), ReportFormat::Both, 30);
    delivery.deliver(&report(), &rendered()).await?;

    assert!(!dir.path().join("unifi-report-20250101-000000.html").exists());
    assert!(dir.path().join("unifi-report-20260123-000000.txt").exists());
    assert!(dir.path().join("unrelated.txt").exists());
    Ok(())
}

#[test]
fn email_message_uses_bcc_for_recipients() -> anyhow::Result<()> {
    let email = EmailDelivery {
        smtp_host: "mail.lan".into(),
        smtp_port: 587,
        credentials: Some(("noc".into(), "pw".into())),
        from: "UniFi Reports <noc@example.com>".into(),
        recipients: vec!["a@example.com".into(), "b@example.com".into()],
        implicit_tls: false,
    };
    let message = email.build_message(&rendered())?;

    let envelope_to: Vec<String> =
        message.envelope().to().iter().map(ToString::to_string).collect();
    assert_eq!(envelope_to, vec!["a@example.com".to_owned(), "b@example.com".to_owned()]);

    // BCC means recipient addresses never appear in the visible headers.
    let headers = String::from_utf8_lossy(&message.formatted()).to_string();
    assert!(headers.contains("Subject: UniFi report"));
    assert!(!headers.contains("To: a@example.com"));
    Ok(())
}

#[test]
fn invalid_addresses_are_build_errors() {
    let email = EmailDelivery {
        smtp_host: "mail.lan".into(),
        smtp_port: 587,
        credentials: None,
        from: "not an address".into(),
        recipients: vec![],
        implicit_tls: true,
    };
    assert!(email.build_message(&rendered()).is_err());
}

#[tokio::test]
async fn email_failure_triggers_fallback_save_and_still_fails() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    // Port 1 is never an SMTP relay; the send fails fast.
    let email = EmailDelivery {
        smtp_host: "127.0.0.1".into(),
        smtp_port: 1,
        credentials: None,
        from: "noc@example.com".into(),
        recipients: vec!["a@example.com".into()],
        implicit_tls: false,
    };
    let fallback = FileDelivery::new(dir.path().to_path_buf(), ReportFormat::Both, 0);
    let stack = DeliveryStack::for_tests(Some(email), None, Some(fallback));

    let result = stack.deliver(&report(), &rendered()).await;
    assert!(result.is_err(), "delivery must fail so the checkpoint is not advanced");
    assert!(
        dir.path().join("unifi-report-20260124-100000.html").exists(),
        "fallback save should have preserved the report"
    );
    Ok(())
}

#[tokio::test]
async fn zero_channel_stack_fails_instead_of_silently_succeeding() {
    let stack = DeliveryStack::for_tests(None, None, None);
    assert!(!stack.is_configured());
    let result = stack.deliver(&report(), &rendered()).await;
    assert!(result.is_err(), "a checkpoint must never advance past an undelivered window");
}

#[tokio::test]
async fn stack_with_file_only_succeeds() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let stack = DeliveryStack::for_tests(
        None,
        Some(FileDelivery::new(dir.path().to_path_buf(), ReportFormat::Text, 0)),
        None,
    );
    stack.deliver(&report(), &rendered()).await?;
    assert!(dir.path().join("unifi-report-20260124-100000.txt").exists());
    Ok(())
}
