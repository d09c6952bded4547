use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Page & Detection Models
// ============================================================================

/// A fetched copy of the ticket page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub url: String,
    pub status_code: u16,
    pub body: String,
    pub fetched_at: DateTime<Utc>,
}

/// Why the detector decided tickets are on sale
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AvailabilityReason {
    BuyTicketText { count: usize },
    PurchaseButton { text: String },
    ComingSoonBelowThreshold { found: usize, expected: usize },
}

impl fmt::Display for AvailabilityReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AvailabilityReason::BuyTicketText { count } => {
                write!(f, "found {} 'BUY TICKETS' elements", count)
            }
            AvailabilityReason::PurchaseButton { text } => {
                write!(f, "found button with ticket purchase text '{}'", text)
            }
            AvailabilityReason::ComingSoonBelowThreshold { found, expected } => write!(
                f,
                "found only {} 'COMING SOON' elements (expected {})",
                found, expected
            ),
        }
    }
}

/// Ticket status as evaluated by the alerting rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TicketStatus {
    Available { reason: AvailabilityReason },
    NotAvailable,
}

impl TicketStatus {
    pub fn is_available(&self) -> bool {
        matches!(self, TicketStatus::Available { .. })
    }
}

/// Full result of evaluating one page snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub buy_ticket_matches: usize,
    pub coming_soon_matches: usize,
    pub buttons_found: usize,
    /// Upper-cased text of the buttons that were inspected, in page order
    pub inspected_buttons: Vec<String>,
    pub status: TicketStatus,
}

// ============================================================================
// Notification Models
// ============================================================================

/// Severity levels understood by the incident-paging endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Critical => "critical",
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        };
        f.write_str(s)
    }
}

/// Notification sinks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Slack,
    PagerDuty,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Slack => f.write_str("slack"),
            Channel::PagerDuty => f.write_str("pagerduty"),
        }
    }
}

/// A message bound for one notification sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub destination: Channel,
    pub severity: Severity,
    pub text: String,
}

impl Notification {
    pub fn new(destination: Channel, severity: Severity, text: impl Into<String>) -> Self {
        Self {
            destination,
            severity,
            text: text.into(),
        }
    }

    /// Build the pair of alerts sent when tickets go on sale.
    /// PagerDuty is paged first, then Slack.
    pub fn ticket_alert(
        pagerduty_summary: &str,
        pagerduty_severity: Severity,
        slack_message: &str,
    ) -> Vec<Notification> {
        vec![
            Notification::new(Channel::PagerDuty, pagerduty_severity, pagerduty_summary),
            Notification::new(Channel::Slack, pagerduty_severity, slack_message),
        ]
    }
}

/// Result of delivering a single notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    pub channel: Channel,
    pub delivered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

// ============================================================================
// Run Models
// ============================================================================

/// What caused a monitor run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TriggerSource {
    #[default]
    Scheduled,
    Manual,
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerSource::Scheduled => f.write_str("scheduled"),
            TriggerSource::Manual => f.write_str("manual"),
        }
    }
}

/// Summary of a single monitor run, consumed by the caller for its exit status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub trigger: TriggerSource,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub status: TicketStatus,
    pub deliveries: Vec<DeliveryOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_error: Option<String>,
    /// Whether a failed check counts as a failed run
    #[serde(default)]
    pub fail_on_check_error: bool,
}

impl RunReport {
    pub fn alert_sent(&self) -> bool {
        self.deliveries.iter().any(|d| d.delivered)
    }

    /// Process exit code: 0 for success, 1 for failure
    pub fn exit_code(&self) -> i32 {
        if self.check_error.is_some() && self.fail_on_check_error {
            return 1;
        }
        match self.status {
            TicketStatus::NotAvailable => 0,
            TicketStatus::Available { .. } if self.alert_sent() => 0,
            TicketStatus::Available { .. } => 1,
        }
    }
}
