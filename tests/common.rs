// ABOUTME: Shared test utilities and setup functions for integration tests
// ABOUTME: Provides logging setup, session builders, and a scriptable recording email sender
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence
#![allow(
    dead_code,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::unwrap_used
)]
//! Shared test utilities for `fitpro_live`

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use fitpro_core::errors::DeliveryError;
use fitpro_core::models::{
    DeliveryChannel, ReminderTier, Session, SessionId, SessionStatus, UserId,
};
use fitpro_live::config::{LiveConfig, RetryPolicy};
use fitpro_live::email::EmailSender;
use std::collections::VecDeque;
use std::sync::{Mutex, Once};

static INIT_LOGGER: Once = Once::new();

/// Trainer used across tests
pub const TRAINER: &str = "65a0000000000000000000aa";
/// Client used across tests
pub const CLIENT: &str = "65a0000000000000000000bb";

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let log_level = match std::env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => tracing::Level::TRACE,
            Ok("DEBUG") => tracing::Level::DEBUG,
            Ok("INFO") => tracing::Level::INFO,
            _ => tracing::Level::WARN,
        };

        tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .init();
    });
}

/// Fixed reference instant so window arithmetic is readable
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

pub fn trainer() -> UserId {
    UserId::new(TRAINER)
}

pub fn client() -> UserId {
    UserId::new(CLIENT)
}

pub fn tier(raw: &str) -> ReminderTier {
    ReminderTier::parse(raw).unwrap()
}

/// Upcoming session with the standard trainer and client
pub fn session(id: &str, scheduled_at: DateTime<Utc>) -> Session {
    Session {
        id: SessionId::new(id),
        title: format!("Session {id}"),
        trainer_id: trainer(),
        scheduled_at,
        duration_minutes: 45,
        status: SessionStatus::Upcoming,
        meeting_link: format!("https://meet.example.com/{id}"),
        participants: vec![client()],
    }
}

/// Fast retry policy for tests; combine with paused time
pub const fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: std::time::Duration::from_millis(10),
        max_delay: std::time::Duration::from_millis(40),
    }
}

/// Default configuration with fast retries
pub fn test_config() -> LiveConfig {
    LiveConfig {
        retry: fast_retry(3),
        jwt_secret: "integration-test-secret".into(),
        seed_demo_data: false,
        ..LiveConfig::default()
    }
}

/// One email accepted by [`RecordingEmailSender`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    pub to: UserId,
    pub subject: String,
    pub body: String,
}

/// Email sender that records messages and fails on demand
#[derive(Default)]
pub struct RecordingEmailSender {
    sent: Mutex<Vec<SentEmail>>,
    calls: Mutex<usize>,
    scripted: Mutex<VecDeque<DeliveryError>>,
    always: Mutex<Option<DeliveryError>>,
}

impl RecordingEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next call with `error`; queued failures are used in order
    pub fn fail_next(&self, error: DeliveryError) {
        self.scripted.lock().unwrap().push_back(error);
    }

    /// Fail every call with `error`
    pub fn fail_always(&self, error: DeliveryError) {
        *self.always.lock().unwrap() = Some(error);
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, user: &UserId) -> Vec<SentEmail> {
        self.sent().into_iter().filter(|e| e.to == *user).collect()
    }

    /// Calls made, including failed ones
    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send(&self, to: &UserId, subject: &str, body: &str) -> Result<(), DeliveryError> {
        *self.calls.lock().unwrap() += 1;
        if let Some(error) = self.scripted.lock().unwrap().pop_front() {
            return Err(error);
        }
        if let Some(error) = self.always.lock().unwrap().clone() {
            return Err(error);
        }
        self.sent.lock().unwrap().push(SentEmail {
            to: to.clone(),
            subject: subject.to_owned(),
            body: body.to_owned(),
        });
        Ok(())
    }
}

pub fn transient(reason: &str) -> DeliveryError {
    DeliveryError::transient(DeliveryChannel::Email, reason)
}

pub fn permanent(reason: &str) -> DeliveryError {
    DeliveryError::permanent(DeliveryChannel::Email, reason)
}

/// `minutes` before `at`
pub fn before(at: DateTime<Utc>, minutes: i64) -> DateTime<Utc> {
    at - Duration::minutes(minutes)
}
