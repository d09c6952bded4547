// PagerDuty Events API v2 notifier

use super::Notifier;
use crate::config::AlertConfig;
use crate::errors::NotificationError;
use crate::models::{Channel, Notification, Severity};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

/// Events API v2 request body
#[derive(Debug, Serialize)]
pub struct PagerDutyEvent<'a> {
    pub routing_key: &'a str,
    pub event_action: &'static str,
    pub payload: PagerDutyPayload<'a>,
}

#[derive(Debug, Serialize)]
pub struct PagerDutyPayload<'a> {
    pub summary: &'a str,
    pub source: &'a str,
    pub severity: Severity,
}

/// Triggers incidents through the PagerDuty Events API
pub struct PagerDutyNotifier {
    events_url: String,
    routing_key: String,
    source: String,
    client: Client,
}

impl PagerDutyNotifier {
    pub fn new(
        events_url: impl Into<String>,
        routing_key: impl Into<String>,
        source: impl Into<String>,
        timeout_seconds: u64,
    ) -> Result<Self, NotificationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| NotificationError::ClientBuild(e.to_string()))?;

        Ok(Self {
            events_url: events_url.into(),
            routing_key: routing_key.into(),
            source: source.into(),
            client,
        })
    }

    pub fn from_config(config: &AlertConfig, routing_key: &str) -> Result<Self, NotificationError> {
        Self::new(
            config.pagerduty_events_url.clone(),
            routing_key,
            config.pagerduty_source.clone(),
            config.timeout_seconds,
        )
    }

    fn event<'a>(&'a self, notification: &'a Notification) -> PagerDutyEvent<'a> {
        PagerDutyEvent {
            routing_key: &self.routing_key,
            event_action: "trigger",
            payload: PagerDutyPayload {
                summary: &notification.text,
                source: &self.source,
                severity: notification.severity,
            },
        }
    }
}

#[async_trait]
impl Notifier for PagerDutyNotifier {
    fn channel(&self) -> Channel {
        Channel::PagerDuty
    }

    #[tracing::instrument(skip_all, fields(channel = "pagerduty", severity = %notification.severity))]
    async fn send(&self, notification: &Notification) -> Result<(), NotificationError> {
        let response = self
            .client
            .post(&self.events_url)
            .json(&self.event(notification))
            .send()
            .await
            .map_err(|e| NotificationError::Request {
                channel: Channel::PagerDuty.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            tracing::error!(status = status.as_u16(), response = %body, "Error sending alert to PagerDuty");
            return Err(NotificationError::Rejected {
                channel: Channel::PagerDuty.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let parsed = serde_json::from_str::<serde_json::Value>(&body)
            .unwrap_or_else(|_| serde_json::Value::String(body));
        tracing::info!(
            status = status.as_u16(),
            response = %parsed,
            "Alert sent to PagerDuty"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn notifier(server: &MockServer) -> PagerDutyNotifier {
        PagerDutyNotifier::new(
            format!("{}/v2/enqueue", server.uri()),
            "R0UT1NGK3Y",
            "rcb-ticket-monitor",
            5,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_sends_trigger_event() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/enqueue"))
            .and(body_json(serde_json::json!({
                "routing_key": "R0UT1NGK3Y",
                "event_action": "trigger",
                "payload": {
                    "summary": "RCB Tickets now available",
                    "source": "rcb-ticket-monitor",
                    "severity": "error"
                }
            })))
            .respond_with(ResponseTemplate::new(202).set_body_json(serde_json::json!({
                "status": "success",
                "message": "Event processed",
                "dedup_key": "abc"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let alert = Notification::new(Channel::PagerDuty, Severity::Error, "RCB Tickets now available");
        assert!(notifier(&server).send(&alert).await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_routing_key_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "status": "invalid event",
                "errors": ["Event object is invalid"]
            })))
            .mount(&server)
            .await;

        let alert = Notification::new(Channel::PagerDuty, Severity::Critical, "x");
        let err = notifier(&server).send(&alert).await.unwrap_err();
        assert!(matches!(err, NotificationError::Rejected { status: 400, .. }));
    }

    #[test]
    fn test_event_serialization() {
        let notifier = PagerDutyNotifier::new("http://localhost", "key", "src", 5).unwrap();
        let alert = Notification::new(Channel::PagerDuty, Severity::Warning, "summary");
        let value = serde_json::to_value(notifier.event(&alert)).unwrap();
        assert_eq!(value["event_action"], "trigger");
        assert_eq!(value["payload"]["severity"], "warning");
        assert_eq!(value["payload"]["summary"], "summary");
    }
}
