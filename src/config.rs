//! Configuration types.
//!
//! Everything ambient (control header names, the reserved-header
//! allowlist, throttle bounds, the no-reply sender, marking policy) lives
//! in one immutable [`MergeConfig`] value injected into every component at
//! construction. Nothing reads global state after startup.

use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::source::headers;

/// Inclusive inter-send pacing bounds, in whole seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThrottleBounds {
    pub seconds_min: u64,
    pub seconds_max: u64,
}

impl Default for ThrottleBounds {
    fn default() -> Self {
        Self {
            seconds_min: 10,
            seconds_max: 15,
        }
    }
}

/// Row-marking policy applied immediately after each successful send.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MarkPolicy {
    /// Clear the to-send flag so a re-run cannot resend the row.
    pub clear_to_send: bool,
    /// Write a send timestamp when the table has a sent-at column.
    pub write_timestamp: bool,
    /// Fixed, locale-independent timestamp format.
    pub timestamp_format: String,
}

impl Default for MarkPolicy {
    fn default() -> Self {
        Self {
            clear_to_send: true,
            write_timestamp: true,
            timestamp_format: "%Y-%m-%d %H:%M:%S".to_string(),
        }
    }
}

/// Immutable merge-engine configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Control column holding the to-send flag.
    pub to_send_header: String,
    /// Control column holding the sent flag.
    pub sent_header: String,
    /// Optional control column receiving the send timestamp.
    pub sent_at_header: String,
    /// Normalized header names excluded from the template variable map,
    /// beyond the control columns.
    pub reserved_headers: Vec<String>,
    /// Sender address forced when a row sets the no-reply flag.
    pub no_reply_address: String,
    /// Display-name fallback for no-reply sends with no row-level name.
    pub no_reply_name: String,
    pub throttle: ThrottleBounds,
    pub marking: MarkPolicy,
    /// Cap on offending rows listed in blocked/summary messages.
    pub max_listed_rows: usize,
    /// Placeholder marker character wrapping template variable names.
    pub marker: char,
}

impl Default for MergeConfig {
    fn default() -> Self {
        let mut reserved: Vec<String> = ["email", "cc", "bcc", "subject"]
            .into_iter()
            .map(str::to_string)
            .collect();
        reserved.extend(headers::all_synonym_spellings().map(str::to_string));
        Self {
            to_send_header: "to send".to_string(),
            sent_header: "sent".to_string(),
            sent_at_header: "sent at".to_string(),
            reserved_headers: reserved,
            no_reply_address: String::new(),
            no_reply_name: "No reply".to_string(),
            throttle: ThrottleBounds::default(),
            marking: MarkPolicy::default(),
            max_listed_rows: 10,
            marker: '$',
        }
    }
}

impl MergeConfig {
    /// True when a normalized header is one of the control columns.
    pub fn is_control_header(&self, normalized: &str) -> bool {
        normalized == headers::normalize(&self.to_send_header)
            || normalized == headers::normalize(&self.sent_header)
            || normalized == headers::normalize(&self.sent_at_header)
    }

    /// True when a normalized header is in the reserved allowlist.
    pub fn is_reserved(&self, normalized: &str) -> bool {
        self.reserved_headers
            .iter()
            .any(|r| headers::normalize(r) == normalized)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.throttle.seconds_min > self.throttle.seconds_max {
            return Err(ConfigError::InvalidValue {
                key: "merge.throttle".to_string(),
                message: format!(
                    "seconds_min ({}) exceeds seconds_max ({})",
                    self.throttle.seconds_min, self.throttle.seconds_max
                ),
            });
        }
        if self.marker.is_whitespace() {
            return Err(ConfigError::InvalidValue {
                key: "merge.marker".to_string(),
                message: "marker must not be whitespace".to_string(),
            });
        }
        if self.max_listed_rows == 0 {
            return Err(ConfigError::InvalidValue {
                key: "merge.max_listed_rows".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Sheet-level campaign settings: which template to render and the
/// default subject. Both are validated non-empty before any row is touched.
#[derive(Debug, Clone)]
pub struct CampaignSettings {
    pub template_id: String,
    pub default_subject: String,
}

// ── File configuration ──────────────────────────────────────────────

/// Where the campaign table lives.
#[derive(Debug, Clone, Deserialize)]
pub struct SheetConfig {
    pub path: PathBuf,
    /// 1-based position of the header row. Rows above it are out of band.
    #[serde(default = "default_header_row")]
    pub header_row: u32,
}

fn default_header_row() -> u32 {
    1
}

/// Template selection and default subject.
#[derive(Debug, Clone, Deserialize)]
pub struct CampaignConfig {
    #[serde(default)]
    pub template: String,
    #[serde(default = "default_templates_dir")]
    pub templates_dir: PathBuf,
    #[serde(default)]
    pub subject: String,
}

fn default_templates_dir() -> PathBuf {
    PathBuf::from("templates")
}

/// SMTP gateway settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub username: String,
    /// Omit to read from `SHEETMAIL_SMTP_PASSWORD` instead.
    #[serde(default)]
    pub password: Option<SecretString>,
    pub from_address: String,
    #[serde(default)]
    pub from_name: Option<String>,
}

fn default_smtp_port() -> u16 {
    587
}

impl SmtpConfig {
    /// Password from the config file, falling back to the environment.
    pub fn resolved_password(&self) -> Result<SecretString, ConfigError> {
        if let Some(p) = &self.password {
            return Ok(p.clone());
        }
        std::env::var("SHEETMAIL_SMTP_PASSWORD")
            .map(SecretString::from)
            .map_err(|_| ConfigError::MissingRequired {
                key: "smtp.password".to_string(),
                hint: "Set it in the config file or export SHEETMAIL_SMTP_PASSWORD".to_string(),
            })
    }
}

/// Full application configuration, loaded from a TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub sheet: SheetConfig,
    pub campaign: CampaignConfig,
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,
    #[serde(default)]
    pub merge: MergeConfig,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&raw).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sheet.header_row == 0 {
            return Err(ConfigError::InvalidValue {
                key: "sheet.header_row".to_string(),
                message: "rows are 1-based; header_row must be at least 1".to_string(),
            });
        }
        self.merge.validate()
    }

    pub fn campaign_settings(&self) -> CampaignSettings {
        CampaignSettings {
            template_id: self.campaign.template.clone(),
            default_subject: self.campaign.subject.clone(),
        }
    }
}
