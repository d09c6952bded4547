// Bootstrap utilities shared by the monitor and scheduler binaries

use crate::config::{Secrets, Settings};
use crate::errors::ConfigError;
use crate::monitor::TicketMonitor;
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Load layered settings from `config_dir` and validate them
///
/// # Errors
/// Returns error if a config source cannot be read or a value is invalid
pub fn load_settings(config_dir: &Path) -> Result<Settings> {
    let settings = Settings::load_from_path(config_dir)
        .with_context(|| format!("Failed to load configuration from {}", config_dir.display()))?;

    settings.validate().map_err(ConfigError::Invalid)?;

    Ok(settings)
}

/// Read the alert credentials injected by the CI runner
pub fn load_secrets() -> Result<Secrets> {
    Secrets::from_env().context("Missing alert credentials")
}

/// Build the production monitor (HTTP fetcher, PagerDuty, Slack)
#[tracing::instrument(skip(settings, secrets), fields(url = %settings.target.url))]
pub fn init_ticket_monitor(settings: &Settings, secrets: &Secrets) -> Result<Arc<TicketMonitor>> {
    let monitor = TicketMonitor::from_settings(settings, secrets)
        .context("Failed to initialize ticket monitor")?;
    info!("Ticket monitor initialized");
    Ok(Arc::new(monitor))
}
