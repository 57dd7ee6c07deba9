// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Scheduled UniFi controller report service.
#[derive(Debug, Clone, Parser)]
#[command(name = "unireport", version, about)]
pub struct Config {
    /// Controller host name or IP.
    #[arg(long, env = "UNIREPORT_HOST")]
    pub host: String,

    /// Controller API username.
    #[arg(long, env = "UNIREPORT_USERNAME")]
    pub username: String,

    /// Controller API password. Also resolvable via UNIREPORT_PASSWORD_FILE
    /// or the secrets directory.
    #[arg(long, env = "UNIREPORT_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Controller HTTPS port. Defaults to 443 (UniFi OS) with a fallback
    /// probe for self-hosted controllers on 8443.
    #[arg(long, env = "UNIREPORT_PORT")]
    pub port: Option<u16>,

    /// Site name. Auto-detected when the controller has exactly one site.
    #[arg(long, env = "UNIREPORT_SITE")]
    pub site: Option<String>,

    /// Verify the controller's TLS certificate.
    #[arg(long, env = "UNIREPORT_VERIFY_TLS", default_value_t = false, action = clap::ArgAction::Set)]
    pub verify_tls: bool,

    /// Schedule preset (hourly, daily, weekly). Mutually exclusive with --cron.
    #[arg(long, env = "UNIREPORT_PRESET")]
    pub preset: Option<String>,

    /// 5-field cron expression. Mutually exclusive with --preset.
    #[arg(long, env = "UNIREPORT_CRON")]
    pub cron: Option<String>,

    /// IANA timezone for the schedule.
    #[arg(long, env = "UNIREPORT_TIMEZONE", default_value = "UTC")]
    pub timezone: String,

    /// Enable the realtime push source.
    #[arg(long, env = "UNIREPORT_PUSH_ENABLED", default_value_t = true, action = clap::ArgAction::Set)]
    pub push_enabled: bool,

    /// Push buffer capacity in events (100-100000).
    #[arg(long, env = "UNIREPORT_PUSH_BUFFER", default_value_t = 10_000)]
    pub push_buffer: usize,

    /// Enable the SSH fallback source.
    #[arg(long, env = "UNIREPORT_SHELL_ENABLED", default_value_t = true, action = clap::ArgAction::Set)]
    pub shell_enabled: bool,

    /// SSH username. Defaults to the controller username.
    #[arg(long, env = "UNIREPORT_SHELL_USERNAME")]
    pub shell_username: Option<String>,

    /// SSH password. Defaults to the controller password.
    #[arg(long, env = "UNIREPORT_SHELL_PASSWORD", hide_env_values = true)]
    pub shell_password: Option<String>,

    /// SSH command timeout in seconds (5-300).
    #[arg(long, env = "UNIREPORT_SHELL_TIMEOUT", default_value_t = 30)]
    pub shell_timeout: u64,

    /// Lookback window in hours when no checkpoint exists.
    #[arg(long, env = "UNIREPORT_LOOKBACK_HOURS", default_value_t = 24)]
    pub initial_lookback_hours: u32,

    /// Minimum entry count for a source to be considered sufficient.
    #[arg(long, env = "UNIREPORT_MIN_ENTRIES", default_value_t = 10)]
    pub min_entries: usize,

    /// Enable email delivery.
    #[arg(long, env = "UNIREPORT_EMAIL_ENABLED", default_value_t = false, action = clap::ArgAction::Set)]
    pub email_enabled: bool,

    /// SMTP relay host.
    #[arg(long, env = "UNIREPORT_SMTP_HOST")]
    pub smtp_host: Option<String>,

    /// SMTP port.
    #[arg(long, env = "UNIREPORT_SMTP_PORT", default_value_t = 587)]
    pub smtp_port: u16,

    /// SMTP username.
    #[arg(long, env = "UNIREPORT_SMTP_USER")]
    pub smtp_user: Option<String>,

    /// SMTP password. Also resolvable via UNIREPORT_SMTP_PASSWORD_FILE or the
    /// secrets directory.
    #[arg(long, env = "UNIREPORT_SMTP_PASSWORD", hide_env_values = true)]
    pub smtp_password: Option<String>,

    /// Sender address.
    #[arg(long, env = "UNIREPORT_EMAIL_FROM")]
    pub email_from: Option<String>,

    /// Recipient addresses, delivered as BCC.
    #[arg(long, env = "UNIREPORT_EMAIL_RECIPIENTS", value_delimiter = ',')]
    pub email_recipients: Vec<String>,

    /// Use implicit TLS for SMTP (false = STARTTLS).
    #[arg(long, env = "UNIREPORT_SMTP_TLS", default_value_t = true, action = clap::ArgAction::Set)]
    pub smtp_tls: bool,

    /// Enable report files on disk.
    #[arg(long, env = "UNIREPORT_FILE_ENABLED", default_value_t = true, action = clap::ArgAction::Set)]
    pub file_enabled: bool,

    /// Reports directory. Also holds run state and the health file.
    #[arg(long, env = "UNIREPORT_OUTPUT_DIR", default_value = "./reports")]
    pub output_dir: PathBuf,

    /// Report file format (html, text, both).
    #[arg(long, env = "UNIREPORT_FILE_FORMAT", default_value = "both")]
    pub file_format: String,

    /// Days to keep report files (0 = keep forever).
    #[arg(long, env = "UNIREPORT_RETENTION_DAYS", default_value_t = 30)]
    pub retention_days: u32,

    /// Cloudflare API token for the optional integration.
    #[arg(long, env = "UNIREPORT_CLOUDFLARE_TOKEN", hide_env_values = true)]
    pub cloudflare_token: Option<String>,

    /// Cloudflare zone ID for the optional integration.
    #[arg(long, env = "UNIREPORT_CLOUDFLARE_ZONE")]
    pub cloudflare_zone: Option<String>,

    /// Per-integration fetch timeout in seconds.
    #[arg(long, env = "UNIREPORT_INTEGRATION_TIMEOUT", default_value_t = 30)]
    pub integration_timeout: u64,

    /// Whole-run deadline in seconds.
    #[arg(long, env = "UNIREPORT_RUN_TIMEOUT", default_value_t = 600)]
    pub run_timeout: u64,

    /// Directory of mounted secret files.
    #[arg(long, env = "UNIREPORT_SECRETS_DIR", default_value = "/run/secrets")]
    pub secrets_dir: PathBuf,

    /// Log format (json or text).
    #[arg(long, env = "UNIREPORT_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "UNIREPORT_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// Rendered-output selection for file delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Html,
    Text,
    Both,
}

impl Config {
    /// Validate the configuration after parsing. Returns non-fatal warnings;
    /// errors are fatal and halt before any I/O.
    pub fn validate(&self) -> anyhow::Result<Vec<String>> {
        let mut warnings = Vec::new();

        if self.host.trim().is_empty() {
            anyhow::bail!("--host must not be empty");
        }
        if self.preset.is_some() && self.cron.is_some() {
            anyhow::bail!("--preset and --cron are mutually exclusive");
        }
        if let Some(ref preset) = self.preset {
            if !matches!(preset.as_str(), "hourly" | "daily" | "weekly") {
                anyhow::bail!("unknown schedule preset {preset:?} (expected hourly, daily, or weekly)");
            }
        }
        self.timezone.parse::<chrono_tz::Tz>().map_err(|_| {
            anyhow::anyhow!("invalid IANA timezone {:?}", self.timezone)
        })?;
        if !(100..=100_000).contains(&self.push_buffer) {
            anyhow::bail!("--push-buffer must be between 100 and 100000");
        }
        if !(5..=300).contains(&self.shell_timeout) {
            anyhow::bail!("--shell-timeout must be between 5 and 300 seconds");
        }
        if !matches!(self.file_format.as_str(), "html" | "text" | "both") {
            anyhow::bail!("--file-format must be html, text, or both");
        }
        if !matches!(self.log_format.as_str(), "json" | "text") {
            anyhow::bail!("--log-format must be json or text");
        }

        if self.email_enabled {
            if self.smtp_host.as_deref().unwrap_or("").is_empty() {
                anyhow::bail!("email delivery requires --smtp-host");
            }
            if self.email_from.as_deref().unwrap_or("").is_empty() {
                anyhow::bail!("email delivery requires --email-from");
            }
            if self.email_recipients.is_empty() {
                anyhow::bail!("email delivery requires at least one recipient");
            }
            if self.smtp_user.is_some() && self.smtp_password().is_none() {
                warnings.push("SMTP user set without a password; relay may reject".to_owned());
            }
        }
        if !self.email_enabled && !self.file_enabled {
            warnings.push("both delivery channels disabled; reports will not leave the pipeline".to_owned());
        }

        if self.controller_password().is_none() {
            anyhow::bail!(
                "no controller password (set --password, UNIREPORT_PASSWORD, \
                 UNIREPORT_PASSWORD_FILE, or a mounted secret)"
            );
        }

        // Partial integration config participates as "unconfigured" but is
        // worth a warning since it usually means a typo.
        if self.cloudflare_token().is_some() != self.cloudflare_zone.is_some() {
            warnings.push("cloudflare integration needs both a token and a zone; skipping".to_owned());
        }

        Ok(warnings)
    }

    pub fn controller_password(&self) -> Option<String> {
        self.resolve_secret(self.password.as_deref(), "UNIREPORT_PASSWORD", "unireport_password")
    }

    pub fn shell_username(&self) -> &str {
        self.shell_username.as_deref().unwrap_or(&self.username)
    }

    /// Shell credentials fall back to the controller credentials.
    pub fn shell_password(&self) -> Option<String> {
        self.resolve_secret(
            self.shell_password.as_deref(),
            "UNIREPORT_SHELL_PASSWORD",
            "unireport_shell_password",
        )
        .or_else(|| self.controller_password())
    }

    pub fn smtp_password(&self) -> Option<String> {
        self.resolve_secret(
            self.smtp_password.as_deref(),
            "UNIREPORT_SMTP_PASSWORD",
            "unireport_smtp_password",
        )
    }

    pub fn cloudflare_token(&self) -> Option<String> {
        self.resolve_secret(
            self.cloudflare_token.as_deref(),
            "UNIREPORT_CLOUDFLARE_TOKEN",
            "unireport_cloudflare_token",
        )
    }

    /// Resolve a secret: explicit value first, then `<ENV>_FILE` indirection,
    /// then a file in the mounted secrets directory.
    fn resolve_secret(
        &self,
        explicit: Option<&str>,
        env_name: &str,
        secret_file: &str,
    ) -> Option<String> {
        if let Some(value) = explicit.filter(|v| !v.is_empty()) {
            return Some(value.to_owned());
        }
        if let Ok(path) = std::env::var(format!("{env_name}_FILE")) {
            if let Ok(contents) = std::fs::read_to_string(&path) {
                let trimmed = contents.trim_end_matches(['\n', '\r']).to_owned();
                if !trimmed.is_empty() {
                    return Some(trimmed);
                }
            }
        }
        let mounted = self.secrets_dir.join(secret_file);
        if let Ok(contents) = std::fs::read_to_string(mounted) {
            let trimmed = contents.trim_end_matches(['\n', '\r']).to_owned();
            if !trimmed.is_empty() {
                return Some(trimmed);
            }
        }
        None
    }

    pub fn report_format(&self) -> ReportFormat {
        match self.file_format.as_str() {
            "html" => ReportFormat::Html,
            "text" => ReportFormat::Text,
            _ => ReportFormat::Both,
        }
    }

    pub fn schedule_timezone(&self) -> chrono_tz::Tz {
        self.timezone.parse().unwrap_or(chrono_tz::UTC)
    }

    pub fn shell_command_timeout(&self) -> Duration {
        Duration::from_secs(self.shell_timeout)
    }

    pub fn integration_timeout(&self) -> Duration {
        Duration::from_secs(self.integration_timeout)
    }

    pub fn run_deadline(&self) -> Duration {
        Duration::from_secs(self.run_timeout)
    }

    pub fn initial_lookback(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.initial_lookback_hours))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
