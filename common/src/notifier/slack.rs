// Slack incoming-webhook notifier

use super::Notifier;
use crate::errors::NotificationError;
use crate::models::{Channel, Notification};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct SlackMessage<'a> {
    text: &'a str,
}

/// Posts plain-text messages to a Slack incoming webhook.
///
/// Slack answers a successful post with status 200 and the literal body `ok`;
/// anything else is treated as a rejection.
pub struct SlackNotifier {
    webhook_url: String,
    client: Client,
}

impl SlackNotifier {
    pub fn new(webhook_url: impl Into<String>, timeout_seconds: u64) -> Result<Self, NotificationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| NotificationError::ClientBuild(e.to_string()))?;

        Ok(Self {
            webhook_url: webhook_url.into(),
            client,
        })
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    fn channel(&self) -> Channel {
        Channel::Slack
    }

    #[tracing::instrument(skip_all, fields(channel = "slack"))]
    async fn send(&self, notification: &Notification) -> Result<(), NotificationError> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&SlackMessage {
                text: &notification.text,
            })
            .send()
            .await
            .map_err(|e| NotificationError::Request {
                channel: Channel::Slack.to_string(),
                reason: e.without_url().to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status == StatusCode::OK && body == "ok" {
            tracing::info!("Slack message sent successfully");
            Ok(())
        } else {
            tracing::error!(status = status.as_u16(), response = %body, "Failed to send Slack message");
            Err(NotificationError::Rejected {
                channel: Channel::Slack.to_string(),
                status: status.as_u16(),
                body,
            })
        }
    }
}
