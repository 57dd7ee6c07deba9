// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Delivery adapters: SMTP email (recipients as BCC) and report files on disk
//! with retention pruning. Email failure falls back to a best-effort file
//! save; the run still counts as undelivered so the checkpoint holds.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::{Config, ReportFormat};
use crate::model::Report;
use crate::render::RenderedReport;

const FILE_STEM: &str = "unifi-report";
const FILE_TIME_FORMAT: &str = "%Y%m%d-%H%M%S";

/// A consumer of rendered report bytes.
#[async_trait::async_trait]
pub trait Delivery: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, report: &Report, rendered: &RenderedReport) -> anyhow::Result<()>;
}

// -- email --------------------------------------------------------------------

pub struct EmailDelivery {
    smtp_host: String,
    smtp_port: u16,
    credentials: Option<(String, String)>,
    from: String,
    recipients: Vec<String>,
    implicit_tls: bool,
}

impl EmailDelivery {
    pub fn from_config(config: &Config) -> anyhow::Result<Option<Self>> {
        if !config.email_enabled {
            return Ok(None);
        }
        let smtp_host = config
            .smtp_host
            .clone()
            .ok_or_else(|| anyhow::anyhow!("email enabled without --smtp-host"))?;
        let from = config
            .email_from
            .clone()
            .ok_or_else(|| anyhow::anyhow!("email enabled without --email-from"))?;
        Ok(Some(Self {
            smtp_host,
            smtp_port: config.smtp_port,
            credentials: config
                .smtp_user
                .clone()
                .map(|user| (user, config.smtp_password().unwrap_or_default())),
            from,
            recipients: config.email_recipients.clone(),
            implicit_tls: config.smtp_tls,
        }))
    }

    /// Build the outgoing message. Recipients go on BCC only.
    pub fn build_message(&self, rendered: &RenderedReport) -> anyhow::Result<Message> {
        let from: Mailbox = self
            .from
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid from address {:?}: {e}", self.from))?;
        let mut builder = Message::builder().from(from).subject(&rendered.subject);
        for recipient in &self.recipients {
            let mailbox: Mailbox = recipient
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid recipient {recipient:?}: {e}"))?;
            builder = builder.bcc(mailbox);
        }
        Ok(builder.multipart(MultiPart::alternative_plain_html(
            rendered.text.clone(),
            rendered.html.clone(),
        ))?)
    }

    fn transport(&self) -> anyhow::Result<AsyncSmtpTransport<Tokio1Executor>> {
        let mut builder = if self.implicit_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.smtp_host)?
        };
        builder = builder.port(self.smtp_port);
        if let Some((user, password)) = &self.credentials {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }
        Ok(builder.build())
    }
}

#[async_trait::async_trait]
impl Delivery for EmailDelivery {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn deliver(&self, _report: &Report, rendered: &RenderedReport) -> anyhow::Result<()> {
        let message = self.build_message(rendered)?;
        let transport = self.transport()?;
        transport
            .send(message)
            .await
            .map_err(|e| anyhow::anyhow!("smtp send via {} failed: {e}", self.smtp_host))?;
        tracing::info!(recipients = self.recipients.len(), "report emailed");
        Ok(())
    }
}

// -- files --------------------------------------------------------------------

pub struct FileDelivery {
    dir: PathBuf,
    format: ReportFormat,
    retention_days: u32,
}

impl FileDelivery {
    pub fn new(dir: PathBuf, format: ReportFormat, retention_days: u32) -> Self {
        Self { dir, format, retention_days }
    }

    pub fn from_config(config: &Config) -> Option<Self> {
        config.file_enabled.then(|| {
            Self::new(config.output_dir.clone(), config.report_format(), config.retention_days)
        })
    }

    fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Remove report files older than the retention window, judged by the
    /// timestamp embedded in the file name.
    fn prune(&self, now: chrono::DateTime<chrono::Utc>) {
        if self.retention_days == 0 {
            return;
        }
        let cutoff = now - chrono::Duration::days(i64::from(self.retention_days));
        let Ok(dir) = std::fs::read_dir(&self.dir) else {
            return;
        };
        for entry in dir.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(stamp) = name
                .strip_prefix(&format!("{FILE_STEM}-"))
                .and_then(|rest| rest.split('.').next())
            else {
                continue;
            };
            let Ok(written) = NaiveDateTime::parse_from_str(stamp, FILE_TIME_FORMAT) else {
                continue;
            };
            if written.and_utc() < cutoff {
                if let Err(e) = std::fs::remove_file(entry.path()) {
                    tracing::warn!(file = name, err = %e, "retention prune failed");
                } else {
                    tracing::debug!(file = name, "pruned expired report");
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl Delivery for FileDelivery {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn deliver(&self, report: &Report, rendered: &RenderedReport) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let stamp = report.generated_at.format(FILE_TIME_FORMAT);

        if matches!(self.format, ReportFormat::Html | ReportFormat::Both) {
            let path = self.dir.join(format!("{FILE_STEM}-{stamp}.html"));
            Self::write_atomic(&path, rendered.html.as_bytes())?;
            tracing::info!(path = %path.display(), "report written");
        }
        if matches!(self.format, ReportFormat::Text | ReportFormat::Both) {
            let path = self.dir.join(format!("{FILE_STEM}-{stamp}.txt"));
            Self::write_atomic(&path, rendered.text.as_bytes())?;
            tracing::info!(path = %path.display(), "report written");
        }

        self.prune(report.generated_at);
        Ok(())
    }
}

// -- composition --------------------------------------------------------------

/// The configured delivery channels for one service instance.
pub struct DeliveryStack {
    email: Option<EmailDelivery>,
    file: Option<FileDelivery>,
    /// Fallback sink used when email fails and no file channel is enabled.
    fallback: Option<FileDelivery>,
}

impl DeliveryStack {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let email = EmailDelivery::from_config(config)?;
        let file = FileDelivery::from_config(config);
        let fallback = (email.is_some() && file.is_none()).then(|| {
            FileDelivery::new(config.output_dir.clone(), ReportFormat::Both, config.retention_days)
        });
        Ok(Self { email, file, fallback })
    }

    #[cfg(test)]
    pub fn for_tests(
        email: Option<EmailDelivery>,
        file: Option<FileDelivery>,
        fallback: Option<FileDelivery>,
    ) -> Self {
        Self { email, file, fallback }
    }

    pub fn is_configured(&self) -> bool {
        self.email.is_some() || self.file.is_some()
    }
}

#[async_trait::async_trait]
impl Delivery for DeliveryStack {
    fn name(&self) -> &'static str {
        "delivery"
    }

    async fn deliver(&self, report: &Report, rendered: &RenderedReport) -> anyhow::Result<()> {
        // The checkpoint advances on Ok; succeeding with no channel would
        // drop the window's events forever.
        if !self.is_configured() {
            anyhow::bail!("no delivery channel configured");
        }

        let mut file_saved = false;
        if let Some(ref file) = self.file {
            file.deliver(report, rendered).await?;
            file_saved = true;
        }

        if let Some(ref email) = self.email {
            if let Err(e) = email.deliver(report, rendered).await {
                // Keep the report on disk before surfacing the failure.
                if !file_saved {
                    if let Some(ref fallback) = self.fallback {
                        match fallback.deliver(report, rendered).await {
                            Ok(()) => tracing::warn!("email failed; report saved to disk as fallback"),
                            Err(fe) => tracing::warn!(err = %fe, "email fallback save also failed"),
                        }
                    }
                }
                return Err(e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "deliver_tests.rs"]
mod tests;
