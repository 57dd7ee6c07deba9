// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Report rendering: a pure function from a report to subject/text/HTML bytes.
//! Delivery adapters consume the result; nothing here performs I/O.

use crate::model::{Report, Severity};

/// Rendered bodies handed to the delivery adapters.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedReport {
    pub subject: String,
    pub text: String,
    pub html: String,
}

pub fn render(report: &Report) -> RenderedReport {
    RenderedReport {
        subject: subject_line(report),
        text: render_text(report),
        html: render_html(report),
    }
}

fn subject_line(report: &Report) -> String {
    if report.findings.is_empty() {
        format!("UniFi report for {}: no new events", report.site_name)
    } else {
        format!(
            "UniFi report for {}: {} finding(s), {} severe",
            report.site_name,
            report.findings.len(),
            report.severe_count(),
        )
    }
}

fn render_text(report: &Report) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "UniFi report — site {} ({} controller)\n",
        report.site_name, report.controller_type
    ));
    out.push_str(&format!(
        "Period {} to {} (generated {})\n\n",
        report.period_start.to_rfc3339(),
        report.period_end.to_rfc3339(),
        report.generated_at.to_rfc3339(),
    ));

    if report.findings.is_empty() {
        out.push_str("No new events in this period. All monitored sources were quiet.\n");
    } else {
        out.push_str(&format!(
            "Findings: {} severe, {} medium, {} low\n\n",
            report.severe_count(),
            report.medium_count(),
            report.low_count(),
        ));
        for severity in [Severity::Severe, Severity::Medium, Severity::Low] {
            for finding in report.findings.iter().filter(|f| f.severity == severity) {
                out.push_str(&format!("[{}] {}\n", finding.severity, finding.title));
                out.push_str(&format!("    {}\n", finding.description.replace('\n', "\n    ")));
                if finding.occurrence_count > 1 {
                    out.push_str(&format!(
                        "    Occurrences: {}{}\n",
                        finding.occurrence_count,
                        if finding.is_recurring() { " (recurring)" } else { "" },
                    ));
                }
                if let Some(ref remediation) = finding.remediation {
                    out.push_str(&format!("    Remediation: {remediation}\n"));
                }
                out.push('\n');
            }
        }
    }

    for section in &report.integration_sections {
        out.push_str(&format!("== {} ==\n", section.title));
        match &section.error {
            Some(error) => out.push_str(&format!("(unavailable: {error})\n")),
            None => {
                for (label, value) in &section.items {
                    out.push_str(&format!("{label}: {value}\n"));
                }
            }
        }
        out.push('\n');
    }
    out
}

fn render_html(report: &Report) -> String {
    let mut body = String::new();
    body.push_str(&format!(
        "<h1>UniFi report — {}</h1><p>{} controller, period {} to {}</p>",
        esc(&report.site_name),
        esc(&report.controller_type),
        report.period_start.to_rfc3339(),
        report.period_end.to_rfc3339(),
    ));

    if report.findings.is_empty() {
        body.push_str("<p>No new events in this period.</p>");
    } else {
        body.push_str(&format!(
            "<p><strong>{} severe</strong>, {} medium, {} low</p><ul>",
            report.severe_count(),
            report.medium_count(),
            report.low_count(),
        ));
        for severity in [Severity::Severe, Severity::Medium, Severity::Low] {
            for finding in report.findings.iter().filter(|f| f.severity == severity) {
                body.push_str(&format!(
                    "<li><strong>[{}]</strong> {} — {}",
                    finding.severity,
                    esc(&finding.title),
                    esc(&finding.description),
                ));
                if let Some(ref remediation) = finding.remediation {
                    body.push_str(&format!("<br/><em>Remediation: {}</em>", esc(remediation)));
                }
                body.push_str("</li>");
            }
        }
        body.push_str("</ul>");
    }

    for section in &report.integration_sections {
        body.push_str(&format!("<h2>{}</h2>", esc(&section.title)));
        match &section.error {
            Some(error) => body.push_str(&format!("<p>(unavailable: {})</p>", esc(error))),
            None => {
                body.push_str("<table>");
                for (label, value) in &section.items {
                    body.push_str(&format!(
                        "<tr><td>{}</td><td>{}</td></tr>",
                        esc(label),
                        esc(value)
                    ));
                }
                body.push_str("</table>");
            }
        }
    }

    format!("<!DOCTYPE html><html><body>{body}</body></html>")
}

fn esc(raw: &str) -> String {
    raw.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[cfg(test)]
#[path = "render_tests.rs"]
mod tests;
