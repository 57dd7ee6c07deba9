// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rule-driven classification: a registry of declarative rules dispatched by
//! event key, with per-`(rule, entity)` rollup of repeated findings.

pub mod builtin;
pub mod context;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use indexmap::IndexMap;
use regex::Regex;

use crate::model::{Category, Finding, IpsEvent, LogEntry, Severity};
use crate::rules::context::{build_context, render_template, Context};

/// One declarative mapping from event shape to finding template.
#[derive(Debug, Clone)]
pub struct Rule {
    pub name: String,
    pub event_types: Vec<String>,
    /// Optional refinement over the message text.
    pub pattern: Option<Regex>,
    pub category: Category,
    pub severity: Severity,
    pub title_template: String,
    pub description_template: String,
    pub remediation_template: Option<String>,
}

impl Rule {
    /// Whether this rule applies to the entry (the event key is assumed to
    /// have matched already via the registry index).
    pub fn matches(&self, entry: &LogEntry) -> bool {
        match &self.pattern {
            Some(pattern) => pattern.is_match(&entry.message),
            None => true,
        }
    }
}

/// Registry indexing rules by event type for O(1) dispatch. Rules sharing an
/// event type keep their registration order.
#[derive(Debug, Default)]
pub struct RuleRegistry {
    rules: Vec<Rule>,
    by_event: HashMap<String, Vec<usize>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule. Severe rules must carry a remediation template so
    /// every severe finding is actionable.
    pub fn register(&mut self, rule: Rule) -> anyhow::Result<()> {
        if rule.severity == Severity::Severe && rule.remediation_template.is_none() {
            anyhow::bail!("severe rule {:?} must define a remediation template", rule.name);
        }
        if rule.event_types.is_empty() {
            anyhow::bail!("rule {:?} matches no event types", rule.name);
        }
        let index = self.rules.len();
        for event_type in &rule.event_types {
            self.by_event.entry(event_type.clone()).or_default().push(index);
        }
        self.rules.push(rule);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn rules_for(&self, event_type: &str) -> impl Iterator<Item = &Rule> {
        self.by_event
            .get(event_type)
            .into_iter()
            .flatten()
            .filter_map(|&i| self.rules.get(i))
    }

    /// Evaluate all entries, rolling up findings by `(rule, entity)`.
    ///
    /// A rule that fails to render is logged with the offending event and
    /// skipped; it never aborts the engine.
    pub fn evaluate(&self, entries: &[LogEntry]) -> Vec<Finding> {
        let mut rollup: IndexMap<(String, String), Finding> = IndexMap::new();

        for entry in entries {
            let ctx = build_context(entry);
            for rule in self.rules_for(&entry.event_type) {
                if !rule.matches(entry) {
                    continue;
                }
                let entity = affected_entity(entry);
                let key = (rule.name.clone(), entity.clone());

                if let Some(existing) = rollup.get_mut(&key) {
                    existing.merge_event(&entry.id, entry.timestamp);
                    continue;
                }
                match build_finding(rule, entry, &entity, &ctx) {
                    Ok(finding) => {
                        rollup.insert(key, finding);
                    }
                    Err(e) => {
                        tracing::warn!(
                            rule = %rule.name,
                            event_id = %entry.id,
                            err = %e,
                            "rule rendering failed, skipping"
                        );
                    }
                }
            }
        }
        rollup.into_values().collect()
    }
}

/// Entity a finding is attributed to: the client when one is named, else the
/// reporting device, else the site as a whole.
pub fn affected_entity(entry: &LogEntry) -> String {
    entry
        .raw
        .get("user")
        .or_else(|| entry.raw.get("guest"))
        .or_else(|| entry.raw.get("client"))
        .and_then(serde_json::Value::as_str)
        .and_then(crate::model::normalize_mac)
        .or_else(|| entry.device_mac.clone())
        .or_else(|| entry.device_name.clone())
        .unwrap_or_else(|| "site".to_owned())
}

fn build_finding(
    rule: &Rule,
    entry: &LogEntry,
    entity: &str,
    ctx: &Context,
) -> anyhow::Result<Finding> {
    let title = render_template(&rule.title_template, ctx)?;
    let description = render_template(&rule.description_template, ctx)?;
    let remediation = match &rule.remediation_template {
        Some(template) => Some(render_template(template, ctx)?),
        None => None,
    };

    let mut metadata = BTreeMap::new();
    metadata.insert("rule".to_owned(), rule.name.clone());
    if let Some(ips) = IpsEvent::from_entry(entry) {
        metadata.insert("is_cybersecure".to_owned(), ips.is_cybersecure().to_string());
        metadata.insert("signature_id".to_owned(), ips.signature_id.to_string());
        if let Some(src) = ips.src_ip {
            metadata.insert("src_ip".to_owned(), src);
        }
    }

    Ok(Finding {
        id: uuid::Uuid::new_v4().to_string(),
        category: rule.category,
        severity: rule.severity,
        title,
        description,
        remediation,
        occurrence_count: 1,
        first_seen: entry.timestamp,
        last_seen: entry.timestamp,
        affected_entities: BTreeSet::from([entity.to_owned()]),
        source_event_ids: BTreeSet::from([entry.id.clone()]),
        metadata,
    })
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
