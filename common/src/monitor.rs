// Ticket monitor: one check of the ticket page, alerting when tickets go on sale

use crate::config::{AlertConfig, ArtifactConfig, Secrets, Settings};
use crate::detector::AvailabilityDetector;
use crate::errors::{DetectionError, FetchError};
use crate::fetch::{HttpPageFetcher, PageFetcher};
use crate::models::{
    DetectionReport, Notification, PageSnapshot, RunReport, TicketStatus, TriggerSource,
};
use crate::notifier::{deliver_all, Notifier, PagerDutyNotifier, SlackNotifier};
use crate::telemetry;
use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// File name of the saved copy of the last fetched page
pub const PAGE_ARTIFACT_NAME: &str = "latest_dynamic_page.html";

/// Anything that can perform a complete monitor run
#[async_trait]
pub trait MonitorRunner: Send + Sync {
    async fn run(&self, trigger: TriggerSource) -> RunReport;
}

pub struct TicketMonitor {
    target_url: String,
    fetcher: Arc<dyn PageFetcher>,
    detector: AvailabilityDetector,
    notifiers: Vec<Arc<dyn Notifier>>,
    alerts: AlertConfig,
    artifacts: ArtifactConfig,
    fail_on_check_error: bool,
}

impl TicketMonitor {
    /// Assemble a monitor from explicit collaborators
    pub fn new(
        settings: &Settings,
        fetcher: Arc<dyn PageFetcher>,
        notifiers: Vec<Arc<dyn Notifier>>,
    ) -> Result<Self, DetectionError> {
        Ok(Self {
            target_url: settings.target.url.clone(),
            fetcher,
            detector: AvailabilityDetector::new(settings.detection.clone())?,
            notifiers,
            alerts: settings.alerts.clone(),
            artifacts: settings.artifacts.clone(),
            fail_on_check_error: settings.monitor.fail_on_check_error,
        })
    }

    /// Assemble the production monitor: HTTP fetcher, PagerDuty and Slack
    pub fn from_settings(settings: &Settings, secrets: &Secrets) -> anyhow::Result<Self> {
        let fetcher: Arc<dyn PageFetcher> =
            Arc::new(HttpPageFetcher::from_settings(&settings.target, &settings.retry)?);

        let notifiers: Vec<Arc<dyn Notifier>> = vec![
            Arc::new(PagerDutyNotifier::from_config(
                &settings.alerts,
                &secrets.pagerduty_routing_key,
            )?),
            Arc::new(SlackNotifier::new(
                secrets.slack_webhook.clone(),
                settings.alerts.timeout_seconds,
            )?),
        ];

        Ok(Self::new(settings, fetcher, notifiers)?)
    }

    /// Fetch the ticket page and evaluate it; never sends notifications
    #[instrument(skip(self), fields(url = %self.target_url))]
    pub async fn check(&self) -> Result<DetectionReport, FetchError> {
        info!("Checking ticket availability");
        let started = Instant::now();

        let snapshot = self.fetcher.fetch(&self.target_url).await.map_err(|e| {
            telemetry::record_check_error();
            e
        })?;

        if self.artifacts.save_page {
            match self.save_page(&snapshot) {
                Ok(path) => info!(path = %path.display(), "Saved page HTML for inspection"),
                Err(e) => warn!(error = %e, "Could not save page HTML"),
            }
        }

        let report = self.detector.evaluate(&snapshot.body);
        telemetry::record_check(&report.status, started.elapsed().as_secs_f64());
        Ok(report)
    }

    fn save_page(&self, snapshot: &PageSnapshot) -> Result<PathBuf, DetectionError> {
        let path = self.artifacts.dir.join(PAGE_ARTIFACT_NAME);
        std::fs::create_dir_all(&self.artifacts.dir)
            .and_then(|_| std::fs::write(&path, &snapshot.body))
            .map_err(|e| DetectionError::ArtifactWrite {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        Ok(path)
    }

    fn alerts(&self) -> Vec<Notification> {
        Notification::ticket_alert(
            &self.alerts.pagerduty_summary,
            self.alerts.pagerduty_severity,
            &self.alerts.message,
        )
    }
}

#[async_trait]
impl MonitorRunner for TicketMonitor {
    #[instrument(skip(self), fields(run_id = tracing::field::Empty))]
    async fn run(&self, trigger: TriggerSource) -> RunReport {
        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));
        let started_at = Utc::now();
        info!(trigger = %trigger, "Starting ticket availability monitor");

        let (status, check_error) = match self.check().await {
            Ok(report) => (report.status, None),
            Err(e) => {
                error!(error = %e, "Error during ticket check");
                (TicketStatus::NotAvailable, Some(e.to_string()))
            }
        };

        let deliveries = if status.is_available() {
            info!("Tickets are now available! Sending alerts...");
            let outcomes = deliver_all(&self.notifiers, &self.alerts()).await;
            if outcomes.iter().any(|o| o.delivered) {
                telemetry::record_alert_sent();
                info!("At least one alert sent successfully");
            } else {
                error!("Failed to send any alerts");
            }
            outcomes
        } else {
            info!("Tickets not available yet");
            Vec::new()
        };

        RunReport {
            run_id,
            trigger,
            started_at,
            completed_at: Utc::now(),
            status,
            deliveries,
            check_error,
            fail_on_check_error: self.fail_on_check_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::NotificationError;
    use crate::models::Channel;
    use metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};
    use std::future::Future;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    struct StaticFetcher(Result<String, u16>);

    #[async_trait]
    impl PageFetcher for StaticFetcher {
        async fn fetch(&self, url: &str) -> Result<PageSnapshot, FetchError> {
            match &self.0 {
                Ok(body) => Ok(PageSnapshot {
                    url: url.to_string(),
                    status_code: 200,
                    body: body.clone(),
                    fetched_at: Utc::now(),
                }),
                Err(status) => Err(FetchError::Status {
                    url: url.to_string(),
                    status: *status,
                }),
            }
        }
    }

    struct CountingNotifier {
        channel: Channel,
        ok: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Notifier for CountingNotifier {
        fn channel(&self) -> Channel {
            self.channel
        }

        async fn send(&self, _notification: &Notification) -> Result<(), NotificationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.ok {
                Ok(())
            } else {
                Err(NotificationError::Rejected {
                    channel: self.channel.to_string(),
                    status: 500,
                    body: String::new(),
                })
            }
        }
    }

    fn counting(channel: Channel, ok: bool) -> Arc<CountingNotifier> {
        Arc::new(CountingNotifier {
            channel,
            ok,
            calls: AtomicUsize::new(0),
        })
    }

    fn settings(dir: &std::path::Path) -> Settings {
        let mut settings = Settings::default();
        settings.artifacts.dir = dir.to_path_buf();
        settings
    }

    fn monitor(
        settings: &Settings,
        page: Result<&str, u16>,
        notifiers: Vec<Arc<dyn Notifier>>,
    ) -> TicketMonitor {
        let fetcher = Arc::new(StaticFetcher(page.map(str::to_string)));
        TicketMonitor::new(settings, fetcher, notifiers).unwrap()
    }

    #[tokio::test]
    async fn test_no_tickets_sends_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let slack = counting(Channel::Slack, true);
        let m = monitor(
            &settings(dir.path()),
            Ok("<span>COMING SOON</span>"),
            vec![slack.clone()],
        );

        let report = m.run(TriggerSource::Scheduled).await;
        assert_eq!(report.status, TicketStatus::NotAvailable);
        assert!(report.deliveries.is_empty());
        assert_eq!(report.exit_code(), 0);
        assert_eq!(slack.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_tickets_alert_both_channels() {
        let dir = tempfile::tempdir().unwrap();
        let slack = counting(Channel::Slack, true);
        let pagerduty = counting(Channel::PagerDuty, true);
        let m = monitor(
            &settings(dir.path()),
            Ok("<a>BUY TICKETS</a>"),
            vec![pagerduty.clone(), slack.clone()],
        );

        let report = m.run(TriggerSource::Manual).await;
        assert!(report.status.is_available());
        assert_eq!(report.trigger, TriggerSource::Manual);
        assert_eq!(report.deliveries.len(), 2);
        assert_eq!(report.exit_code(), 0);
        assert_eq!(slack.calls.load(Ordering::SeqCst), 1);
        assert_eq!(pagerduty.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_all_channels_failing_exits_one() {
        let dir = tempfile::tempdir().unwrap();
        let m = monitor(
            &settings(dir.path()),
            Ok("<a>Get Tickets</a>"),
            vec![counting(Channel::PagerDuty, false), counting(Channel::Slack, false)],
        );

        let report = m.run(TriggerSource::Scheduled).await;
        assert!(!report.alert_sent());
        assert_eq!(report.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_not_available_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let slack = counting(Channel::Slack, true);
        let m = monitor(&settings(dir.path()), Err(503), vec![slack.clone()]);

        let report = m.run(TriggerSource::Scheduled).await;
        assert_eq!(report.status, TicketStatus::NotAvailable);
        assert!(report.check_error.as_deref().unwrap().contains("503"));
        assert_eq!(report.exit_code(), 0);
        assert_eq!(slack.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_can_fail_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = settings(dir.path());
        s.monitor.fail_on_check_error = true;
        let m = monitor(&s, Err(500), vec![]);

        assert_eq!(m.run(TriggerSource::Scheduled).await.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_check_saves_page_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let m = monitor(&settings(dir.path()), Ok("<p>COMING SOON</p>"), vec![]);

        m.check().await.unwrap();
        let saved = std::fs::read_to_string(dir.path().join(PAGE_ARTIFACT_NAME)).unwrap();
        assert_eq!(saved, "<p>COMING SOON</p>");
    }

    #[tokio::test]
    async fn test_check_skips_artifact_when_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = settings(dir.path());
        s.artifacts.save_page = false;
        let m = monitor(&s, Ok("<p>COMING SOON</p>"), vec![]);

        m.check().await.unwrap();
        assert!(!dir.path().join(PAGE_ARTIFACT_NAME).exists());
    }

    /// Recorder that only tracks the `ticket_alerts_total` counter
    #[derive(Default)]
    struct AlertCounter {
        alerts: Arc<AtomicU64>,
    }

    impl Recorder for AlertCounter {
        fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

        fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
            if key.name() == "ticket_alerts_total" {
                Counter::from_arc(self.alerts.clone())
            } else {
                Counter::noop()
            }
        }

        fn register_gauge(&self, _: &Key, _: &Metadata<'_>) -> Gauge {
            Gauge::noop()
        }

        fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
            Histogram::noop()
        }
    }

    /// Run `fut` on this thread with a local recorder; returns the alert count
    fn count_alerts<F: Future>(fut: F) -> u64 {
        let recorder = AlertCounter::default();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        metrics::with_local_recorder(&recorder, || runtime.block_on(fut));
        recorder.alerts.load(Ordering::SeqCst)
    }

    #[test]
    fn test_debug_check_does_not_count_alerts() {
        let dir = tempfile::tempdir().unwrap();
        let m = monitor(&settings(dir.path()), Ok("<a>BUY TICKETS</a>"), vec![]);

        let alerts = count_alerts(async {
            assert!(m.check().await.unwrap().status.is_available());
        });
        assert_eq!(alerts, 0);
    }

    #[test]
    fn test_delivered_alert_is_counted_once() {
        let dir = tempfile::tempdir().unwrap();
        let m = monitor(
            &settings(dir.path()),
            Ok("<a>BUY TICKETS</a>"),
            vec![counting(Channel::PagerDuty, true), counting(Channel::Slack, true)],
        );

        let alerts = count_alerts(async {
            m.run(TriggerSource::Scheduled).await;
        });
        assert_eq!(alerts, 1);
    }

    #[test]
    fn test_undelivered_alert_is_not_counted() {
        let dir = tempfile::tempdir().unwrap();
        let m = monitor(
            &settings(dir.path()),
            Ok("<a>BUY TICKETS</a>"),
            vec![counting(Channel::PagerDuty, false), counting(Channel::Slack, false)],
        );

        let alerts = count_alerts(async {
            m.run(TriggerSource::Scheduled).await;
        });
        assert_eq!(alerts, 0);
    }
}
