//! Webhook sinks.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::notify::Notification;

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("webhook returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("webhook rejected message: {0}")]
    Rejected(String),
}

/// Somewhere notifications go.
#[async_trait]
pub trait WebhookSink: Send + Sync {
    async fn send(
        &self,
        mention: Option<&str>,
        notification: &Notification,
    ) -> Result<(), DeliveryError>;
}

#[derive(Debug, Serialize)]
struct WebhookMessage<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    embeds: Vec<Embed<'a>>,
}

#[derive(Debug, Serialize)]
struct Embed<'a> {
    title: &'a str,
    description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    footer: Option<EmbedFooter<'a>>,
}

#[derive(Debug, Serialize)]
struct EmbedFooter<'a> {
    text: &'a str,
}

/// Discord channel webhook: the mention goes in `content`, the notification
/// in a single embed.
pub struct DiscordWebhook {
    url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl DiscordWebhook {
    pub fn new(url: String, timeout: Duration) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

fn message<'a>(mention: Option<&'a str>, n: &'a Notification) -> WebhookMessage<'a> {
    WebhookMessage {
        content: mention,
        embeds: vec![Embed {
            title: &n.title,
            description: &n.body,
            footer: n.footer.as_deref().map(|text| EmbedFooter { text }),
        }],
    }
}

#[async_trait]
impl WebhookSink for DiscordWebhook {
    async fn send(
        &self,
        mention: Option<&str>,
        notification: &Notification,
    ) -> Result<(), DeliveryError> {
        let resp = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&message(mention, notification))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(DeliveryError::Status { status, body });
        }
        Ok(())
    }
}

/// Dry-run sink: logs instead of posting.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl WebhookSink for LogSink {
    async fn send(
        &self,
        mention: Option<&str>,
        notification: &Notification,
    ) -> Result<(), DeliveryError> {
        info!(
            mention = mention.unwrap_or(""),
            title = %notification.title,
            body = %notification.body,
            footer = notification.footer.as_deref().unwrap_or(""),
            "[dry-run] would send notification"
        );
        Ok(())
    }
}
