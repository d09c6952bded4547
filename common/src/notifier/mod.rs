// Notification sinks for ticket alerts

pub mod pagerduty;
pub mod slack;

pub use pagerduty::PagerDutyNotifier;
pub use slack::SlackNotifier;

use crate::errors::NotificationError;
use crate::models::{Channel, DeliveryOutcome, Notification};
use crate::telemetry;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info};

/// Notifier delivers a notification to one external endpoint
#[async_trait]
pub trait Notifier: Send + Sync {
    /// The channel this notifier serves
    fn channel(&self) -> Channel;

    /// Deliver a single notification
    async fn send(&self, notification: &Notification) -> Result<(), NotificationError>;
}

/// Deliver every notification to the notifier serving its destination.
///
/// Deliveries run one after another in the given order. A failure is recorded
/// in its outcome and never stops the remaining deliveries.
#[tracing::instrument(skip_all, fields(notifications = notifications.len()))]
pub async fn deliver_all(
    notifiers: &[Arc<dyn Notifier>],
    notifications: &[Notification],
) -> Vec<DeliveryOutcome> {
    let mut outcomes = Vec::with_capacity(notifications.len());

    for notification in notifications {
        let channel = notification.destination;
        let result = match notifiers.iter().find(|n| n.channel() == channel) {
            Some(notifier) => notifier.send(notification).await,
            None => Err(NotificationError::NoNotifier(channel.to_string())),
        };

        let outcome = match result {
            Ok(()) => {
                info!(channel = %channel, "Alert delivered");
                telemetry::record_notification(channel, true);
                DeliveryOutcome {
                    channel,
                    delivered: true,
                    detail: None,
                }
            }
            Err(e) => {
                error!(channel = %channel, error = %e, "Failed to deliver alert");
                telemetry::record_notification(channel, false);
                DeliveryOutcome {
                    channel,
                    delivered: false,
                    detail: Some(e.to_string()),
                }
            }
        };
        outcomes.push(outcome);
    }

    outcomes
}
