// ABOUTME: Email collaborator used as the fallback reminder channel
// ABOUTME: Webhook relay sender with transient/permanent classification and a log-only sender
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use async_trait::async_trait;
use fitpro_core::errors::DeliveryError;
use fitpro_core::models::{DeliveryChannel, ReminderTier, Session, UserId};
use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

/// Outbound email delivery
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Send one email to a user
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Transient` for retryable failures and
    /// `DeliveryError::Permanent` when the recipient or message is rejected
    async fn send(&self, to: &UserId, subject: &str, body: &str) -> Result<(), DeliveryError>;
}

/// Subject and body for a reminder email
#[must_use]
pub fn reminder_email(session: &Session, tier: &ReminderTier) -> (String, String) {
    let subject = format!("Reminder: {} starts in {}", session.title, tier.label());
    let mut body = format!(
        "Your live session \"{}\" starts at {} ({} minutes).",
        session.title,
        session.scheduled_at.format("%Y-%m-%d %H:%M UTC"),
        session.duration_minutes,
    );
    if !session.meeting_link.is_empty() {
        body.push_str("\nJoin here: ");
        body.push_str(&session.meeting_link);
    }
    (subject, body)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookEmail<'a> {
    to_user_id: &'a str,
    subject: &'a str,
    body: &'a str,
}

/// Posts emails to an HTTP relay that owns address lookup and SMTP
pub struct WebhookEmailSender {
    client: reqwest::Client,
    endpoint: String,
}

impl WebhookEmailSender {
    /// Create a sender for the relay endpoint
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built
    pub fn new(endpoint: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

/// Map a relay response status onto the delivery error taxonomy
fn classify_status(status: StatusCode) -> Result<(), DeliveryError> {
    if status.is_success() {
        Ok(())
    } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Err(DeliveryError::transient(
            DeliveryChannel::Email,
            format!("relay responded {status}"),
        ))
    } else {
        Err(DeliveryError::permanent(
            DeliveryChannel::Email,
            format!("relay rejected message with {status}"),
        ))
    }
}

#[async_trait]
impl EmailSender for WebhookEmailSender {
    async fn send(&self, to: &UserId, subject: &str, body: &str) -> Result<(), DeliveryError> {
        let payload = WebhookEmail {
            to_user_id: to.as_str(),
            subject,
            body,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| DeliveryError::transient(DeliveryChannel::Email, e.to_string()))?;

        classify_status(response.status())?;
        debug!(user_id = %to, "Email accepted by relay");
        Ok(())
    }
}

/// Writes emails to the log instead of sending them
#[derive(Debug, Default)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, to: &UserId, subject: &str, body: &str) -> Result<(), DeliveryError> {
        info!(user_id = %to, subject = %subject, body = %body, "Email (log only)");
        Ok(())
    }
}
