// Scheduler engine: runs the monitor on a cron cadence and on manual dispatch
//
// At most one run is in flight. A trigger that arrives while a run is in
// progress is skipped, never queued.

use crate::errors::DispatchError;
use crate::models::{RunReport, TriggerSource};
use crate::monitor::MonitorRunner;
use crate::schedule::{Cadence, ScheduleTrigger};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Scheduler trait for run scheduling operations
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Start the scheduling loop; returns after `stop` once the in-flight run finishes
    async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Ask the scheduling loop to stop
    async fn stop(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Cloneable handle used to request manual runs
#[derive(Clone)]
pub struct DispatchHandle {
    tx: mpsc::Sender<TriggerSource>,
    busy: Arc<AtomicBool>,
}

impl DispatchHandle {
    /// Request a manual run. Fails with `Busy` while a run is in progress.
    pub fn request(&self) -> Result<(), DispatchError> {
        if self.busy.load(Ordering::SeqCst) {
            return Err(DispatchError::Busy);
        }
        self.tx
            .try_send(TriggerSource::Manual)
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => DispatchError::Busy,
                mpsc::error::TrySendError::Closed(_) => DispatchError::Closed,
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }
}

/// Main scheduler engine implementation
pub struct SchedulerEngine {
    cadence: Cadence,
    runner: Arc<dyn MonitorRunner>,
    busy: Arc<AtomicBool>,
    last_report: Arc<RwLock<Option<RunReport>>>,
    dispatch_tx: mpsc::Sender<TriggerSource>,
    dispatch_rx: Mutex<mpsc::Receiver<TriggerSource>>,
    shutdown_tx: watch::Sender<bool>,
}

impl SchedulerEngine {
    pub fn new(cadence: Cadence, runner: Arc<dyn MonitorRunner>) -> Self {
        // Latched flag, so a stop issued before start is not lost
        let (shutdown_tx, _shutdown_rx) = watch::channel(false);
        let (dispatch_tx, dispatch_rx) = mpsc::channel(1);

        Self {
            cadence,
            runner,
            busy: Arc::new(AtomicBool::new(false)),
            last_report: Arc::new(RwLock::new(None)),
            dispatch_tx,
            dispatch_rx: Mutex::new(dispatch_rx),
            shutdown_tx,
        }
    }

    pub fn dispatch_handle(&self) -> DispatchHandle {
        DispatchHandle {
            tx: self.dispatch_tx.clone(),
            busy: self.busy.clone(),
        }
    }

    /// The report of the most recently completed run
    pub async fn last_report(&self) -> Option<RunReport> {
        self.last_report.read().await.clone()
    }

    pub fn last_report_handle(&self) -> Arc<RwLock<Option<RunReport>>> {
        self.last_report.clone()
    }

    /// Start a run in the background unless one is already in flight
    #[instrument(skip(self))]
    fn fire(&self, trigger: TriggerSource) -> Option<JoinHandle<()>> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            if trigger == TriggerSource::Manual {
                // The dispatch was accepted but lost the race against a tick
                error!("Monitor run already in progress, dropping accepted manual dispatch");
            } else {
                warn!(trigger = %trigger, "Monitor run already in progress, skipping trigger");
            }
            return None;
        }

        let runner = self.runner.clone();
        let busy = self.busy.clone();
        let last_report = self.last_report.clone();

        Some(tokio::spawn(async move {
            let report = runner.run(trigger).await;
            let exit_code = report.exit_code();
            if exit_code == 0 {
                info!(run_id = %report.run_id, trigger = %trigger, "Monitor run succeeded");
            } else {
                error!(
                    run_id = %report.run_id,
                    trigger = %trigger,
                    exit_code,
                    "Monitor run failed"
                );
            }
            *last_report.write().await = Some(report);
            busy.store(false, Ordering::SeqCst);
        }))
    }

    fn delay_until_next_fire(&self) -> Result<Duration, Box<dyn std::error::Error + Send + Sync>> {
        let now = Utc::now();
        let next = self.cadence.next_execution_time(Some(now))?;
        debug!(next_fire = %next, "Next scheduled run");
        Ok((next - now).to_std().unwrap_or(Duration::ZERO))
    }
}

#[async_trait]
impl Scheduler for SchedulerEngine {
    #[instrument(skip(self), fields(cron = %self.cadence.expression()))]
    async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!(timezone = %self.cadence.timezone(), "Starting scheduler engine");

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut dispatch_rx = self.dispatch_rx.lock().await;
        let mut in_flight: Option<JoinHandle<()>> = None;

        loop {
            if *shutdown_rx.borrow_and_update() {
                info!("Shutdown signal received, stopping scheduler");
                break;
            }
            let delay = self.delay_until_next_fire()?;

            // Shutdown first, then a queued dispatch, then the tick
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {}
                Some(trigger) = dispatch_rx.recv() => {
                    info!("Manual dispatch received");
                    if let Some(handle) = self.fire(trigger) {
                        in_flight = Some(handle);
                    }
                }
                _ = tokio::time::sleep(delay) => {
                    if let Some(handle) = self.fire(TriggerSource::Scheduled) {
                        in_flight = Some(handle);
                    }
                }
            }
        }

        if let Some(handle) = in_flight {
            info!("Waiting for in-flight monitor run to complete");
            if let Err(e) = handle.await {
                error!(error = %e, "In-flight monitor run panicked");
            }
        }

        info!("Scheduler engine stopped");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn stop(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!("Stopping scheduler engine");
        self.shutdown_tx.send_replace(true);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TicketStatus;
    use std::sync::atomic::AtomicUsize;
    use uuid::Uuid;

    struct SlowRunner {
        runs: AtomicUsize,
        manual_runs: AtomicUsize,
        duration: Duration,
    }

    impl SlowRunner {
        fn new(duration: Duration) -> Arc<Self> {
            Arc::new(Self {
                runs: AtomicUsize::new(0),
                manual_runs: AtomicUsize::new(0),
                duration,
            })
        }
    }

    #[async_trait]
    impl MonitorRunner for SlowRunner {
        async fn run(&self, trigger: TriggerSource) -> RunReport {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if trigger == TriggerSource::Manual {
                self.manual_runs.fetch_add(1, Ordering::SeqCst);
            }
            tokio::time::sleep(self.duration).await;
            RunReport {
                run_id: Uuid::new_v4(),
                trigger,
                started_at: Utc::now(),
                completed_at: Utc::now(),
                status: TicketStatus::NotAvailable,
                deliveries: vec![],
                check_error: None,
                fail_on_check_error: false,
            }
        }
    }

    fn yearly() -> Cadence {
        Cadence::new("0 0 1 1 *", "UTC").unwrap()
    }

    #[tokio::test]
    async fn test_manual_dispatch_runs_monitor() {
        let runner = SlowRunner::new(Duration::from_millis(10));
        let engine = Arc::new(SchedulerEngine::new(yearly(), runner.clone()));
        let handle = engine.dispatch_handle();

        let loop_engine = engine.clone();
        let task = tokio::spawn(async move { loop_engine.start().await.is_ok() });

        handle.request().unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(runner.manual_runs.load(Ordering::SeqCst), 1);
        let report = engine.last_report().await.unwrap();
        assert_eq!(report.trigger, TriggerSource::Manual);

        engine.stop().await.unwrap();
        assert!(task.await.unwrap());
    }

    #[tokio::test]
    async fn test_dispatch_while_busy_is_rejected() {
        let runner = SlowRunner::new(Duration::from_millis(500));
        let engine = Arc::new(SchedulerEngine::new(yearly(), runner.clone()));
        let handle = engine.dispatch_handle();

        let loop_engine = engine.clone();
        let task = tokio::spawn(async move { loop_engine.start().await.is_ok() });

        handle.request().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_busy());
        assert!(matches!(handle.request(), Err(DispatchError::Busy)));

        engine.stop().await.unwrap();
        assert!(task.await.unwrap());
        // stop waits for the in-flight run
        assert_eq!(runner.runs.load(Ordering::SeqCst), 1);
        assert!(engine.last_report().await.is_some());
    }

    #[tokio::test]
    async fn test_overlapping_ticks_are_skipped() {
        // Fires every second; each run takes longer than the interval
        let cadence = Cadence::new("* * * * * *", "UTC").unwrap();
        let runner = SlowRunner::new(Duration::from_millis(2500));
        let engine = Arc::new(SchedulerEngine::new(cadence, runner.clone()));

        let loop_engine = engine.clone();
        let task = tokio::spawn(async move { loop_engine.start().await.is_ok() });

        tokio::time::sleep(Duration::from_millis(3300)).await;
        engine.stop().await.unwrap();
        assert!(task.await.unwrap());

        // Three or four ticks elapsed but at most two runs could start
        let runs = runner.runs.load(Ordering::SeqCst);
        assert!((1..=2).contains(&runs), "unexpected run count {}", runs);
    }

    #[tokio::test]
    async fn test_dispatch_after_engine_dropped_is_closed() {
        let runner = SlowRunner::new(Duration::from_millis(1));
        let engine = SchedulerEngine::new(yearly(), runner);
        let handle = engine.dispatch_handle();
        drop(engine);

        assert!(matches!(handle.request(), Err(DispatchError::Closed)));
    }

    #[tokio::test]
    async fn test_stop_before_start_is_not_lost() {
        let runner = SlowRunner::new(Duration::from_millis(1));
        let engine = SchedulerEngine::new(yearly(), runner);

        engine.stop().await.unwrap();
        let result = tokio::time::timeout(Duration::from_secs(2), engine.start()).await;
        assert!(matches!(result, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn test_shutdown_wins_over_queued_dispatch() {
        let runner = SlowRunner::new(Duration::from_millis(1));
        let engine = SchedulerEngine::new(yearly(), runner.clone());

        engine.dispatch_handle().request().unwrap();
        engine.stop().await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), engine.start())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(runner.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_queued_dispatch_runs_before_due_tick() {
        // Fires every second, so a tick may be due as soon as the loop starts
        let cadence = Cadence::new("* * * * * *", "UTC").unwrap();
        let runner = SlowRunner::new(Duration::from_millis(1500));
        let engine = Arc::new(SchedulerEngine::new(cadence, runner.clone()));
        engine.dispatch_handle().request().unwrap();

        let loop_engine = engine.clone();
        let task = tokio::spawn(async move { loop_engine.start().await.is_ok() });

        tokio::time::sleep(Duration::from_millis(200)).await;
        engine.stop().await.unwrap();
        assert!(task.await.unwrap());

        assert_eq!(runner.manual_runs.load(Ordering::SeqCst), 1);
        assert_eq!(runner.runs.load(Ordering::SeqCst), 1);
    }
}
