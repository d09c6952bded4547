// Telemetry module for structured logging and metrics

use crate::config::{LogFormat, ObservabilityConfig};
use crate::models::{Channel, TicketStatus};
use anyhow::Result;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::path::Path;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Keeps the background log writer alive; drop it only at process exit so
/// buffered lines reach the log file.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// Initialize logging to stdout and, when configured, to a log file
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(config: &ObservabilityConfig) -> Result<LoggingGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let stdout_layer = match config.log_format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().with_target(false).boxed(),
    };

    let (file_layer, guard) = match &config.log_file {
        Some(path) => {
            let (writer, guard) = file_writer(path)?;
            let layer = fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;

    tracing::debug!(
        log_level = %config.log_level,
        log_file = ?config.log_file,
        "Logging initialized"
    );

    Ok(LoggingGuard { _file: guard })
}

/// Non-blocking appender writing to exactly `path` (no rotation)
fn file_writer(path: &Path) -> Result<(NonBlocking, WorkerGuard)> {
    let directory = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid log file path: {}", path.display()))?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(directory)
        .map_err(|e| anyhow::anyhow!("Failed to open log file {}: {}", path.display(), e))?;

    Ok(tracing_appender::non_blocking(appender))
}

/// Initialize Prometheus metrics exporter
///
/// Only meaningful for the long-running scheduler; one-shot runs record into
/// the no-op global recorder.
pub fn init_metrics(metrics_port: u16) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", metrics_port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid metrics port: {}", e))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    describe_counter!("ticket_checks_total", "Ticket page checks by outcome");
    describe_counter!("ticket_alerts_total", "Runs that delivered a ticket alert");
    describe_counter!(
        "notification_failures_total",
        "Notifications that could not be delivered"
    );
    describe_counter!("notifications_sent_total", "Notifications delivered");
    describe_histogram!(
        "ticket_check_duration_seconds",
        "Duration of ticket page checks in seconds"
    );

    tracing::info!(
        metrics_port = metrics_port,
        metrics_endpoint = format!("http://0.0.0.0:{}/metrics", metrics_port),
        "Prometheus metrics exporter initialized"
    );

    Ok(())
}

#[inline]
pub fn record_check(status: &TicketStatus, duration_seconds: f64) {
    let outcome = if status.is_available() {
        "available"
    } else {
        "not_available"
    };
    counter!("ticket_checks_total", "outcome" => outcome).increment(1);
    histogram!("ticket_check_duration_seconds").record(duration_seconds);
}

/// A run delivered its ticket alert to at least one channel
#[inline]
pub fn record_alert_sent() {
    counter!("ticket_alerts_total").increment(1);
}

#[inline]
pub fn record_check_error() {
    counter!("ticket_checks_total", "outcome" => "error").increment(1);
}

#[inline]
pub fn record_notification(channel: Channel, delivered: bool) {
    let name = if delivered {
        "notifications_sent_total"
    } else {
        "notification_failures_total"
    };
    counter!(name, "channel" => channel.to_string()).increment(1);
}
