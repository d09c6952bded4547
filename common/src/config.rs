// Configuration management with layered configuration (file, env)

use crate::errors::ConfigError;
use crate::models::Severity;
use crate::schedule::{normalize_cron_expression, parse_cron_expression, parse_timezone};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Environment variable carrying the Slack incoming-webhook URL
pub const SLACK_WEBHOOK_ENV: &str = "SLACK_WEBHOOK";

/// Environment variable carrying the PagerDuty Events v2 routing key
pub const PAGERDUTY_ROUTING_KEY_ENV: &str = "PAGERDUTY_ROUTING_KEY";

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub target: TargetConfig,
    pub detection: DetectionConfig,
    pub alerts: AlertConfig,
    pub retry: RetryConfig,
    pub artifacts: ArtifactConfig,
    pub monitor: MonitorConfig,
    pub scheduler: SchedulerConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub url: String,
    pub user_agent: String,
    pub timeout_seconds: u64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            url: "https://shop.royalchallengers.com/ticket".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36"
                .to_string(),
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub buy_phrases: Vec<String>,
    pub coming_soon_phrases: Vec<String>,
    /// When set, fewer "coming soon" elements than this counts as availability.
    /// The live page showed 7 while nothing was on sale.
    pub expected_coming_soon_count: Option<usize>,
    pub max_buttons_inspected: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            buy_phrases: vec![
                "BUY TICKETS".to_string(),
                "Buy Tickets".to_string(),
                "Get Tickets".to_string(),
            ],
            coming_soon_phrases: vec!["COMING SOON".to_string(), "Coming Soon".to_string()],
            expected_coming_soon_count: None,
            max_buttons_inspected: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub message: String,
    pub pagerduty_events_url: String,
    pub pagerduty_summary: String,
    pub pagerduty_source: String,
    pub pagerduty_severity: Severity,
    pub timeout_seconds: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            message: "🎉 RCB TICKETS ARE NOW AVAILABLE! 🎉 Go to: https://shop.royalchallengers.com/ticket"
                .to_string(),
            pagerduty_events_url: "https://events.pagerduty.com/v2/enqueue".to_string(),
            pagerduty_summary: "RCB Tickets now available: shop.royalchallengers.com/ticket"
                .to_string(),
            pagerduty_source: "rcb-ticket-monitor".to_string(),
            pagerduty_severity: Severity::Error,
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per page fetch; 1 disables retries
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 2000,
            max_delay_ms: 30_000,
            jitter_factor: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    pub dir: PathBuf,
    pub save_page: bool,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            save_page: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MonitorConfig {
    /// Report a failed run when the page could not be checked
    pub fail_on_check_error: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub cron: String,
    pub timezone: String,
    pub dispatch_addr: Option<String>,
    pub dispatch_secret: Option<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cron: "*/15 * * * *".to_string(),
            timezone: "UTC".to_string(),
            dispatch_addr: None,
            dispatch_secret: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: LogFormat,
    pub log_file: Option<PathBuf>,
    pub metrics_port: Option<u16>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            log_file: Some(PathBuf::from("rcb_ticket_monitor.log")),
            metrics_port: None,
        }
    }
}

impl Settings {
    /// Load configuration from `config_dir` with layered precedence:
    /// defaults → default.toml → local.toml → env
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Not committed to git
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.target.url.is_empty() {
            return Err("Target URL cannot be empty".to_string());
        }
        if self.target.timeout_seconds == 0 {
            return Err("Target timeout_seconds must be greater than 0".to_string());
        }

        if self.detection.buy_phrases.iter().all(|p| p.trim().is_empty()) {
            return Err("Detection needs at least one non-empty buy phrase".to_string());
        }

        if self.alerts.pagerduty_events_url.is_empty() {
            return Err("PagerDuty events URL cannot be empty".to_string());
        }
        if self.alerts.timeout_seconds == 0 {
            return Err("Alert timeout_seconds must be greater than 0".to_string());
        }
        if self.alerts.message.is_empty() {
            return Err("Alert message cannot be empty".to_string());
        }

        if self.retry.max_attempts == 0 {
            return Err("Retry max_attempts must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_factor) {
            return Err("Retry jitter_factor must be between 0.0 and 1.0".to_string());
        }

        let cron = normalize_cron_expression(&self.scheduler.cron);
        parse_cron_expression(&cron).map_err(|e| e.to_string())?;
        parse_timezone(&self.scheduler.timezone).map_err(|e| e.to_string())?;
        if matches!(&self.scheduler.dispatch_secret, Some(s) if s.is_empty()) {
            return Err("Scheduler dispatch_secret cannot be empty when set".to_string());
        }

        if matches!(&self.observability.log_file, Some(p) if p.as_os_str().is_empty()) {
            return Err("Observability log_file cannot be empty when set".to_string());
        }

        Ok(())
    }
}

/// Credentials injected by the CI runner as environment variables
#[derive(Clone)]
pub struct Secrets {
    pub slack_webhook: String,
    pub pagerduty_routing_key: String,
}

impl Secrets {
    /// Read both secrets from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read both secrets through an arbitrary lookup; empty values count as missing
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingSecret(name.to_string()))
        };

        Ok(Self {
            slack_webhook: read(SLACK_WEBHOOK_ENV)?,
            pagerduty_routing_key: read(PAGERDUTY_ROUTING_KEY_ENV)?,
        })
    }
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("slack_webhook", &"<redacted>")
            .field("pagerduty_routing_key", &"<redacted>")
            .finish()
    }
}
