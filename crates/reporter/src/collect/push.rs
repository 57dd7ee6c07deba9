// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Realtime push source: a long-lived websocket feed into a bounded buffer.
//!
//! The feed task's lifecycle is tied to the service, not to a single run; a
//! run merely drains the buffer. Events arriving while the feed is
//! disconnected are lost by design — the REST collector is the historical
//! backstop. Reconnects use exponential backoff.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::COOKIE;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::Connector;
use tokio_util::sync::CancellationToken;

use crate::collect::{CollectWindow, Collector};
use crate::model::{LogEntry, Source};
use crate::session::ControllerSession;

/// Push message types the pipeline cares about.
const RELEVANT_MESSAGES: [&str; 5] =
    ["sta:sync", "wu.connected", "wu.disconnected", "wu.roam", "wu.roam_radio"];

/// Fixed-capacity event buffer. When full, the oldest event is overwritten
/// and the dropped counter increments.
pub struct PushBuffer {
    inner: parking_lot::Mutex<BufferInner>,
}

struct BufferInner {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    dropped: u64,
}

impl PushBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: parking_lot::Mutex::new(BufferInner {
                entries: VecDeque::with_capacity(capacity.min(4096)),
                capacity: capacity.max(1),
                dropped: 0,
            }),
        }
    }

    pub fn push(&self, entry: LogEntry) {
        let mut inner = self.inner.lock();
        if inner.entries.len() >= inner.capacity {
            inner.entries.pop_front();
            inner.dropped += 1;
        }
        inner.entries.push_back(entry);
    }

    /// Take everything currently buffered, oldest first.
    pub fn drain(&self) -> Vec<LogEntry> {
        let mut inner = self.inner.lock();
        inner.entries.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Events overwritten since the buffer was created.
    pub fn dropped_total(&self) -> u64 {
        self.inner.lock().dropped
    }
}

/// Collector view over the push buffer: a run drains what the feed gathered.
pub struct PushCollector {
    buffer: Arc<PushBuffer>,
}

impl PushCollector {
    pub fn new(buffer: Arc<PushBuffer>) -> Self {
        Self { buffer }
    }
}

#[async_trait::async_trait]
impl Collector for PushCollector {
    fn source(&self) -> Source {
        Source::Push
    }

    async fn collect(&self, window: CollectWindow) -> anyhow::Result<Vec<LogEntry>> {
        let dropped = self.buffer.dropped_total();
        if dropped > 0 {
            tracing::warn!(dropped, "push buffer overwrote events since startup");
        }
        let mut entries = self.buffer.drain();
        entries.retain(|e| window.contains(e.timestamp));
        Ok(entries)
    }
}

/// Spawn the long-lived push feed.
///
/// Reuses the REST session's cookies for the websocket upgrade, reconnects
/// with exponential backoff, and stops when `cancel` fires (at service
/// shutdown, before the scheduler stops).
pub fn spawn_push_feed(
    session: Arc<ControllerSession>,
    buffer: Arc<PushBuffer>,
    verify_tls: bool,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        let mut backoff = Duration::from_secs(1);
        let max_backoff = Duration::from_secs(60);

        loop {
            if cancel.is_cancelled() {
                break;
            }

            match run_feed_once(&session, &buffer, verify_tls, &cancel).await {
                Ok(()) => {
                    backoff = Duration::from_secs(1);
                }
                Err(e) => {
                    tracing::debug!(err = %e, "push feed disconnected");
                }
            }

            if cancel.is_cancelled() {
                break;
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(max_backoff);
        }
        tracing::debug!("push feed stopped");
    });
}

async fn run_feed_once(
    session: &Arc<ControllerSession>,
    buffer: &Arc<PushBuffer>,
    verify_tls: bool,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    session.connect().await?;
    let ws_url = session.ws_url().await?;

    let mut request = ws_url.as_str().into_client_request()?;
    if let Some(cookie) = session.cookie_header().await? {
        request.headers_mut().insert(COOKIE, HeaderValue::from_str(&cookie)?);
    }

    let connector = if verify_tls { None } else { Some(insecure_connector()?) };
    let (ws_stream, _) =
        tokio_tungstenite::connect_async_tls_with_config(request, None, false, connector).await?;
    tracing::info!(url = %ws_url, "push feed connected");

    let (_, mut read) = ws_stream.split();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        for entry in parse_push_message(&text) {
                            buffer.push(entry);
                        }
                    }
                    Some(Ok(_)) => {} // Ignore binary, ping, pong.
                    Some(Err(e)) => return Err(e.into()),
                    None => return Ok(()), // Stream ended.
                }
            }
        }
    }
}

/// Parse one push frame: `{ meta: { message }, data: [...] }`. Only the
/// relevant message types produce entries; records without a `key` get one
/// derived from the message type.
pub fn parse_push_message(text: &str) -> Vec<LogEntry> {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(text) else {
        return Vec::new();
    };
    let message = value
        .get("meta")
        .and_then(|m| m.get("message"))
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default();
    if !RELEVANT_MESSAGES.contains(&message) {
        return Vec::new();
    }

    let records = value.get("data").and_then(serde_json::Value::as_array).cloned().unwrap_or_default();
    let mut entries = Vec::with_capacity(records.len());
    for mut record in records {
        if record.get("key").is_none() {
            if let (Some(key), Some(obj)) = (derived_key(message), record.as_object_mut()) {
                obj.insert("key".to_owned(), serde_json::Value::String(key.to_owned()));
            }
        }
        match LogEntry::from_controller(&record, Source::Push) {
            Ok(entry) => entries.push(entry),
            Err(e) => tracing::debug!(message, err = %e, "skipping unparseable push record"),
        }
    }
    entries
}

fn derived_key(message: &str) -> Option<&'static str> {
    match message {
        "wu.connected" => Some("EVT_WU_Connected"),
        "wu.disconnected" => Some("EVT_WU_Disconnected"),
        "wu.roam" => Some("EVT_WU_Roam"),
        "wu.roam_radio" => Some("EVT_WU_RoamRadio"),
        "sta:sync" => Some("EVT_STA_Sync"),
        _ => None,
    }
}

/// TLS connector that accepts the controller's self-signed certificate.
fn insecure_connector() -> anyhow::Result<Connector> {
    let config = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert::new()))
        .with_no_client_auth();
    Ok(Connector::Rustls(Arc::new(config)))
}

/// Certificate verifier used when `verify_tls` is off. Signatures are still
/// checked so the stream is at least self-consistent.
#[derive(Debug)]
struct AcceptAnyServerCert {
    provider: rustls::crypto::CryptoProvider,
}

impl AcceptAnyServerCert {
    fn new() -> Self {
        Self { provider: rustls::crypto::ring::default_provider() }
    }
}

impl rustls::client::danger::ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &rustls::pki_types::CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &rustls::pki_types::CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}

#[cfg(test)]
#[path = "push_tests.rs"]
mod tests;
