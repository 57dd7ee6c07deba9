// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authenticated HTTP session against one UniFi controller.
//!
//! Knows the two endpoint families (UniFi OS consoles proxy the network
//! application under `/proxy/network`; self-hosted controllers serve it
//! directly, conventionally on 8443) and selects one by probing the login
//! endpoint. Re-authentication on 401 is serialized through a lock so
//! concurrent requests do not stampede the login endpoint.

use std::sync::Arc;

use reqwest::cookie::CookieStore;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};

use crate::config::Config;

/// Which endpoint family the controller speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerKind {
    UnifiOs,
    SelfHosted,
}

impl ControllerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnifiOs => "unifi-os",
            Self::SelfHosted => "self-hosted",
        }
    }

    /// Path prefix in front of `/api/...` routes.
    fn api_prefix(&self) -> &'static str {
        match self {
            Self::UnifiOs => "/proxy/network",
            Self::SelfHosted => "",
        }
    }

    fn login_path(&self) -> &'static str {
        match self {
            Self::UnifiOs => "/api/auth/login",
            Self::SelfHosted => "/api/login",
        }
    }
}

/// Authenticated controller session shared by the REST and push collectors.
pub struct ControllerSession {
    client: reqwest::Client,
    jar: Arc<reqwest::cookie::Jar>,
    username: String,
    password: String,
    configured_site: Option<String>,
    candidates: Vec<String>,
    base: RwLock<Option<(String, ControllerKind)>>,
    site: RwLock<Option<String>>,
    csrf: RwLock<Option<String>>,
    reauth: Mutex<()>,
}

impl ControllerSession {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let password = config
            .controller_password()
            .ok_or_else(|| anyhow::anyhow!("no controller password available"))?;
        let jar = Arc::new(reqwest::cookie::Jar::default());
        let client = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .danger_accept_invalid_certs(!config.verify_tls)
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            jar,
            username: config.username.clone(),
            password,
            configured_site: config.site.clone(),
            candidates: candidate_bases(&config.host, config.port),
            base: RwLock::new(None),
            site: RwLock::new(None),
            csrf: RwLock::new(None),
            reauth: Mutex::new(()),
        })
    }

    /// Probe, authenticate, and resolve the site. Idempotent.
    pub async fn connect(&self) -> anyhow::Result<()> {
        if self.base.read().await.is_some() {
            return Ok(());
        }
        self.login().await?;
        self.resolve_site().await?;
        self.log_controller_info().await;
        Ok(())
    }

    /// Login, probing each candidate base with each endpoint family.
    async fn login(&self) -> anyhow::Result<()> {
        let mut last_err = anyhow::anyhow!("no controller base candidates");
        for base in &self.candidates {
            for kind in [ControllerKind::UnifiOs, ControllerKind::SelfHosted] {
                match self.try_login(base, kind).await {
                    Ok(()) => {
                        tracing::info!(base = %base, kind = kind.as_str(), "controller login ok");
                        *self.base.write().await = Some((base.clone(), kind));
                        return Ok(());
                    }
                    Err(e) => {
                        tracing::debug!(base = %base, kind = kind.as_str(), err = %e, "login probe failed");
                        last_err = e;
                    }
                }
            }
        }
        Err(last_err.context("controller authentication failed on every candidate endpoint"))
    }

    async fn try_login(&self, base: &str, kind: ControllerKind) -> anyhow::Result<()> {
        let url = format!("{base}{}", kind.login_path());
        let body = json!({"username": self.username, "password": self.password, "remember": true});
        let resp = self.client.post(&url).json(&body).send().await?;

        if resp.status() == StatusCode::UNAUTHORIZED || resp.status() == StatusCode::FORBIDDEN {
            anyhow::bail!("credentials rejected ({})", resp.status());
        }
        if !resp.status().is_success() {
            anyhow::bail!("login endpoint returned {}", resp.status());
        }

        if let Some(token) = resp
            .headers()
            .get("x-csrf-token")
            .and_then(|v| v.to_str().ok())
        {
            *self.csrf.write().await = Some(token.to_owned());
        }
        Ok(())
    }

    /// Re-authenticate after a 401, serialized so only one task logs in.
    async fn reauthenticate(&self) -> anyhow::Result<()> {
        let _guard = self.reauth.lock().await;
        let current = self.base.read().await.clone();
        let Some((base, kind)) = current else {
            anyhow::bail!("re-auth requested before initial login");
        };
        self.try_login(&base, kind).await
    }

    async fn resolve_site(&self) -> anyhow::Result<()> {
        if let Some(ref site) = self.configured_site {
            *self.site.write().await = Some(site.clone());
            return Ok(());
        }
        let envelope = self.get_raw("/api/self/sites").await?;
        let sites = envelope
            .get("data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let names: Vec<String> = sites
            .iter()
            .filter_map(|s| s.get("name").and_then(Value::as_str))
            .map(str::to_owned)
            .collect();
        match names.as_slice() {
            [only] => {
                tracing::info!(site = %only, "auto-detected site");
                *self.site.write().await = Some(only.clone());
                Ok(())
            }
            [] => anyhow::bail!("controller reported no sites"),
            many => anyhow::bail!(
                "controller has {} sites ({}); set --site explicitly",
                many.len(),
                many.join(", ")
            ),
        }
    }

    /// Best-effort sysinfo fetch. The controller clock is assumed UTC; its
    /// reported timezone is logged so drift is diagnosable from the logs.
    async fn log_controller_info(&self) {
        match self.get_site("stat/sysinfo").await {
            Ok(envelope) => {
                let info = envelope
                    .get("data")
                    .and_then(Value::as_array)
                    .and_then(|a| a.first())
                    .cloned()
                    .unwrap_or(Value::Null);
                tracing::info!(
                    version = info.get("version").and_then(|v| v.as_str()).unwrap_or("unknown"),
                    timezone = info.get("timezone").and_then(|v| v.as_str()).unwrap_or("unknown"),
                    "controller sysinfo (event times are treated as UTC)"
                );
            }
            Err(e) => tracing::debug!(err = %e, "sysinfo probe failed"),
        }
    }

    pub async fn kind(&self) -> Option<ControllerKind> {
        self.base.read().await.as_ref().map(|(_, k)| *k)
    }

    pub async fn site(&self) -> Option<String> {
        self.site.read().await.clone()
    }

    async fn api_url(&self, path: &str) -> anyhow::Result<String> {
        let base = self.base.read().await.clone();
        let Some((base, kind)) = base else {
            anyhow::bail!("session not connected");
        };
        Ok(format!("{base}{}{path}", kind.api_prefix()))
    }

    /// Site-scoped URL: `{base}{prefix}/api/s/{site}/{path}`.
    async fn site_url(&self, path: &str) -> anyhow::Result<String> {
        let site = self
            .site
            .read()
            .await
            .clone()
            .ok_or_else(|| anyhow::anyhow!("site not resolved"))?;
        self.api_url(&format!("/api/s/{site}/{path}")).await
    }

    /// GET a non-site API path, retrying once through re-auth on 401.
    pub async fn get_raw(&self, path: &str) -> anyhow::Result<Value> {
        let url = self.api_url(path).await?;
        self.request_json(reqwest::Method::GET, &url, None).await
    }

    /// GET a site-scoped endpoint.
    pub async fn get_site(&self, path: &str) -> anyhow::Result<Value> {
        let url = self.site_url(path).await?;
        self.request_json(reqwest::Method::GET, &url, None).await
    }

    /// POST to a site-scoped endpoint with a JSON body.
    pub async fn post_site(&self, path: &str, body: &Value) -> anyhow::Result<Value> {
        let url = self.site_url(path).await?;
        self.request_json(reqwest::Method::POST, &url, Some(body)).await
    }

    async fn request_json(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Option<&Value>,
    ) -> anyhow::Result<Value> {
        let resp = self.send(method.clone(), url, body).await?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            tracing::debug!(url = %url, "session expired, re-authenticating");
            self.reauthenticate().await?;
            let retry = self.send(method, url, body).await?;
            return Ok(retry.error_for_status()?.json().await?);
        }
        Ok(resp.error_for_status()?.json().await?)
    }

    async fn send(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Option<&Value>,
    ) -> anyhow::Result<reqwest::Response> {
        let mut req = self.client.request(method, url);
        if let Some(token) = self.csrf.read().await.as_deref() {
            req = req.header("x-csrf-token", token);
        }
        if let Some(body) = body {
            req = req.json(body);
        }
        Ok(req.send().await?)
    }

    /// WebSocket endpoint for the push event stream.
    pub async fn ws_url(&self) -> anyhow::Result<String> {
        let site = self
            .site
            .read()
            .await
            .clone()
            .ok_or_else(|| anyhow::anyhow!("site not resolved"))?;
        let base = self.base.read().await.clone();
        let Some((base, kind)) = base else {
            anyhow::bail!("session not connected");
        };
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base
        };
        Ok(format!("{ws_base}{}/wss/s/{site}/events", kind.api_prefix()))
    }

    /// Cookie header for hand-built requests (the websocket upgrade).
    pub async fn cookie_header(&self) -> anyhow::Result<Option<String>> {
        let (base, _) = self
            .base
            .read()
            .await
            .clone()
            .ok_or_else(|| anyhow::anyhow!("session not connected"))?;
        let url: reqwest::Url = base.parse()?;
        Ok(self
            .jar
            .cookies(&url)
            .and_then(|v| v.to_str().map(str::to_owned).ok()))
    }
}

/// Bases to probe, most likely first. A host carrying its own scheme is used
/// verbatim, which also keeps tests off TLS.
fn candidate_bases(host: &str, port: Option<u16>) -> Vec<String> {
    if host.contains("://") {
        return vec![host.trim_end_matches('/').to_owned()];
    }
    match port {
        Some(port) => vec![format!("https://{host}:{port}")],
        None => vec![format!("https://{host}"), format!("https://{host}:8443")],
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
