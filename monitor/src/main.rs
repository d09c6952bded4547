// Ticket monitor binary entry point
//
// One check of the ticket page per invocation. The process exit code is
// consumed by the CI scheduler: 0 = success, 1 = failure.

use anyhow::Result;
use clap::Parser;
use common::bootstrap;
use common::models::TriggerSource;
use common::monitor::MonitorRunner;
use common::telemetry;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "ticket-monitor", version, about = "Check RCB ticket availability and alert on sale")]
struct Cli {
    /// Check the page and log the analysis without sending notifications
    #[arg(long)]
    debug: bool,

    /// Configuration directory (default.toml, local.toml)
    #[arg(long, value_name = "DIR", default_value = "config", env = "TICKET_MONITOR_CONFIG")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            // Logging may not be initialized yet
            eprintln!("ticket-monitor: {:#}", e);
            error!(error = %format!("{:#}", e), "Ticket monitor failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let settings = bootstrap::load_settings(&cli.config)?;
    let _log_guard = telemetry::init_logging(&settings.observability)?;

    info!(debug = cli.debug, url = %settings.target.url, "Starting RCB ticket monitor");

    let secrets = bootstrap::load_secrets().map_err(|e| {
        error!(error = %format!("{:#}", e), "Credentials are not configured");
        e
    })?;
    let monitor = bootstrap::init_ticket_monitor(&settings, &secrets)?;

    if cli.debug {
        info!("Debug mode: checking ticket availability without sending alerts");
        match monitor.check().await {
            Ok(report) => info!(
                buy_ticket_matches = report.buy_ticket_matches,
                coming_soon_matches = report.coming_soon_matches,
                buttons_found = report.buttons_found,
                inspected_buttons = ?report.inspected_buttons,
                available = report.status.is_available(),
                "Debug analysis complete"
            ),
            Err(e) => error!(error = %e, "Debug check failed"),
        }
        return Ok(ExitCode::SUCCESS);
    }

    let report = monitor.run(TriggerSource::Scheduled).await;
    info!(
        run_id = %report.run_id,
        available = report.status.is_available(),
        alert_sent = report.alert_sent(),
        exit_code = report.exit_code(),
        "Monitor run finished"
    );

    Ok(if report.exit_code() == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
