// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cloudflare integration: zone status and security posture as an additive
//! report section.

use serde_json::Value;

use crate::collect::CollectWindow;
use crate::integrations::Integration;
use crate::model::IntegrationSection;

const DEFAULT_API_BASE: &str = "https://api.cloudflare.com";

pub struct CloudflareIntegration {
    token: Option<String>,
    zone: Option<String>,
    api_base: String,
    client: reqwest::Client,
}

impl CloudflareIntegration {
    pub fn new(token: Option<String>, zone: Option<String>) -> Self {
        Self::with_api_base(token, zone, DEFAULT_API_BASE)
    }

    pub fn with_api_base(
        token: Option<String>,
        zone: Option<String>,
        api_base: impl Into<String>,
    ) -> Self {
        Self {
            token: token.filter(|t| !t.is_empty()),
            zone: zone.filter(|z| !z.is_empty()),
            api_base: api_base.into(),
            client: reqwest::Client::new(),
        }
    }

    async fn get(&self, path: &str) -> anyhow::Result<Value> {
        let token = self.token.as_deref().unwrap_or_default();
        let resp = self
            .client
            .get(format!("{}{path}", self.api_base))
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?;
        let body: Value = resp.json().await?;
        if !body.get("success").and_then(Value::as_bool).unwrap_or(false) {
            let errors = body.get("errors").cloned().unwrap_or(Value::Null);
            anyhow::bail!("cloudflare api error: {errors}");
        }
        Ok(body.get("result").cloned().unwrap_or(Value::Null))
    }
}

#[async_trait::async_trait]
impl Integration for CloudflareIntegration {
    fn name(&self) -> &'static str {
        "cloudflare"
    }

    fn title(&self) -> &'static str {
        "Cloudflare zone"
    }

    fn is_configured(&self) -> bool {
        self.token.is_some() && self.zone.is_some()
    }

    fn validate_config(&self) -> Option<String> {
        match (&self.token, &self.zone) {
            (Some(_), None) => Some("cloudflare token set without a zone id".to_owned()),
            (None, Some(_)) => Some("cloudflare zone id set without a token".to_owned()),
            _ => None,
        }
    }

    async fn fetch(&self, _window: CollectWindow) -> anyhow::Result<IntegrationSection> {
        let zone_id = self
            .zone
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("cloudflare zone not configured"))?;

        let zone = self.get(&format!("/client/v4/zones/{zone_id}")).await?;
        let mut items = Vec::new();
        if let Some(name) = zone.get("name").and_then(Value::as_str) {
            items.push(("Zone".to_owned(), name.to_owned()));
        }
        if let Some(status) = zone.get("status").and_then(Value::as_str) {
            items.push(("Status".to_owned(), status.to_owned()));
        }
        if let Some(plan) = zone.get("plan").and_then(|p| p.get("name")).and_then(Value::as_str) {
            items.push(("Plan".to_owned(), plan.to_owned()));
        }

        // Security level is a separate settings endpoint; degrade quietly if
        // the token lacks the settings scope.
        match self.get(&format!("/client/v4/zones/{zone_id}/settings/security_level")).await {
            Ok(setting) => {
                if let Some(level) = setting.get("value").and_then(Value::as_str) {
                    items.push(("Security level".to_owned(), level.to_owned()));
                }
            }
            Err(e) => tracing::debug!(err = %e, "cloudflare security_level unavailable"),
        }

        Ok(IntegrationSection {
            name: self.name().to_owned(),
            title: self.title().to_owned(),
            items,
            error: None,
        })
    }
}

#[cfg(test)]
#[path = "cloudflare_tests.rs"]
mod tests;
