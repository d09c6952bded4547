// Scheduler binary entry point
//
// Local stand-in for the CI scheduler: runs the ticket monitor on the
// configured cron cadence and on manual dispatch until Ctrl-C.

mod dispatch;

use anyhow::{Context, Result};
use clap::Parser;
use common::bootstrap;
use common::schedule::Cadence;
use common::scheduler::{Scheduler, SchedulerEngine};
use common::telemetry;
use dispatch::{create_router, DispatchState};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "ticket-scheduler", version, about = "Run the RCB ticket monitor on a schedule")]
struct Cli {
    /// Configuration directory (default.toml, local.toml)
    #[arg(long, value_name = "DIR", default_value = "config", env = "TICKET_MONITOR_CONFIG")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = bootstrap::load_settings(&cli.config)?;
    let _log_guard = telemetry::init_logging(&settings.observability)?;

    info!(
        cron = %settings.scheduler.cron,
        timezone = %settings.scheduler.timezone,
        "Starting RCB ticket scheduler"
    );

    if let Some(port) = settings.observability.metrics_port {
        telemetry::init_metrics(port)?;
    }

    let secrets = bootstrap::load_secrets().map_err(|e| {
        error!(error = %format!("{:#}", e), "Credentials are not configured");
        e
    })?;
    let monitor = bootstrap::init_ticket_monitor(&settings, &secrets)?;

    let cadence = Cadence::new(&settings.scheduler.cron, &settings.scheduler.timezone)
        .context("Invalid scheduler cadence")?;
    let scheduler = Arc::new(SchedulerEngine::new(cadence, monitor));
    info!("Scheduler engine created");

    if let Some(addr) = &settings.scheduler.dispatch_addr {
        if settings.scheduler.dispatch_secret.is_none() {
            warn!("Dispatch endpoint has no secret configured; requests are not authenticated");
        }

        let state = DispatchState {
            dispatch: scheduler.dispatch_handle(),
            secret: settings.scheduler.dispatch_secret.clone(),
            last_report: scheduler.last_report_handle(),
        };
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind dispatch endpoint on {}", addr))?;
        info!(addr = %addr, "Dispatch endpoint listening");

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, create_router(state)).await {
                error!(error = %e, "Dispatch endpoint stopped");
            }
        });
    }

    let scheduler_for_shutdown = scheduler.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            return;
        }
        info!("Received Ctrl+C signal, initiating graceful shutdown");
        if let Err(e) = scheduler_for_shutdown.stop().await {
            error!(error = %e, "Error during scheduler shutdown");
        }
    });

    scheduler
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("Scheduler error: {}", e))?;

    info!("Scheduler stopped");
    Ok(())
}
