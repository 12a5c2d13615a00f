// ABOUTME: Environment configuration management for the live-session server
// ABOUTME: Parses reminder tiers, tick interval, heartbeat timeout, and retry policy with documented defaults
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Environment-based configuration
//!
//! | Variable                  | Default        |
//! |---------------------------|----------------|
//! | `HTTP_PORT`               | `5000`         |
//! | `REMINDER_TIERS`          | `24h,1h,15m`   |
//! | `SCHEDULER_TICK_SECS`     | `60`           |
//! | `HEARTBEAT_TIMEOUT_SECS`  | `90`           |
//! | `MAX_DISPATCH_ATTEMPTS`   | `3`            |
//! | `RETRY_BASE_MS`           | `500`          |
//! | `RETRY_MAX_MS`            | `30000`        |
//! | `OUTBOUND_QUEUE_CAPACITY` | `64`           |
//! | `SHUTDOWN_GRACE_SECS`     | `10`           |
//! | `DISPATCH_CONCURRENCY`    | `8`            |
//! | `JWT_SECRET`              | development-only value |
//! | `EMAIL_WEBHOOK_URL`       | unset (emails are logged) |
//! | `SEED_DEMO_DATA`          | `true`         |

use anyhow::{anyhow, Context, Result};
use fitpro_core::constants::defaults;
use fitpro_core::models::ReminderTier;
use std::collections::HashSet;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

const DEV_JWT_SECRET: &str = "fitpro-development-secret-change-me";

/// Exponential backoff bounded by a maximum attempt count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per (session, tier) before the tier is marked failed-permanent
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub base_delay: Duration,
    /// Cap on any single delay
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based)
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1_u32 << exponent)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::MAX_DISPATCH_ATTEMPTS,
            base_delay: Duration::from_millis(defaults::RETRY_BASE_MS),
            max_delay: Duration::from_millis(defaults::RETRY_MAX_MS),
        }
    }
}

/// Live-session server configuration
#[derive(Debug, Clone)]
pub struct LiveConfig {
    /// HTTP and WebSocket listen port
    pub http_port: u16,
    /// Reminder tiers, coarsest first
    pub reminder_tiers: Vec<ReminderTier>,
    /// Scheduler tick interval
    pub tick_interval: Duration,
    /// Silence after which a connection is evicted
    pub heartbeat_timeout: Duration,
    /// Dispatch retry policy
    pub retry: RetryPolicy,
    /// Per-connection outbound queue length
    pub outbound_queue_capacity: usize,
    /// Drain window for in-flight dispatch on shutdown
    pub shutdown_grace: Duration,
    /// Sessions dispatched concurrently within one tick
    pub dispatch_concurrency: usize,
    /// HS256 secret used to verify client tokens
    pub jwt_secret: String,
    /// Email relay endpoint; emails are only logged when unset
    pub email_webhook_url: Option<String>,
    /// Seed demo accounts and sessions at startup
    pub seed_demo_data: bool,
}

impl Default for LiveConfig {
    fn default() -> Self {
        let mut reminder_tiers: Vec<ReminderTier> = defaults::REMINDER_TIERS
            .iter()
            .filter_map(|raw| ReminderTier::parse(raw).ok())
            .collect();
        ReminderTier::sort_coarsest_first(&mut reminder_tiers);

        Self {
            http_port: defaults::HTTP_PORT,
            reminder_tiers,
            tick_interval: Duration::from_secs(defaults::SCHEDULER_TICK_SECS),
            heartbeat_timeout: Duration::from_secs(defaults::HEARTBEAT_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
            outbound_queue_capacity: defaults::OUTBOUND_QUEUE_CAPACITY,
            shutdown_grace: Duration::from_secs(defaults::SHUTDOWN_GRACE_SECS),
            dispatch_concurrency: defaults::DISPATCH_CONCURRENCY,
            jwt_secret: DEV_JWT_SECRET.to_owned(),
            email_webhook_url: None,
            seed_demo_data: true,
        }
    }
}

impl LiveConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if any variable is present but unparseable, or if the
    /// resulting configuration fails validation
    pub fn from_env() -> Result<Self> {
        info!("Loading configuration from environment variables");

        if let Err(e) = dotenvy::dotenv() {
            info!("No .env file loaded: {}", e);
        }

        let fallback = Self::default();
        let reminder_tiers = match env::var("REMINDER_TIERS") {
            Ok(raw) => parse_tiers(&raw)?,
            Err(_) => fallback.reminder_tiers,
        };

        let jwt_secret = env::var("JWT_SECRET").unwrap_or_else(|_| {
            warn!("JWT_SECRET not set; using the development secret");
            DEV_JWT_SECRET.to_owned()
        });

        let config = Self {
            http_port: env_parse("HTTP_PORT", defaults::HTTP_PORT)?,
            reminder_tiers,
            tick_interval: Duration::from_secs(env_parse(
                "SCHEDULER_TICK_SECS",
                defaults::SCHEDULER_TICK_SECS,
            )?),
            heartbeat_timeout: Duration::from_secs(env_parse(
                "HEARTBEAT_TIMEOUT_SECS",
                defaults::HEARTBEAT_TIMEOUT_SECS,
            )?),
            retry: RetryPolicy {
                max_attempts: env_parse("MAX_DISPATCH_ATTEMPTS", defaults::MAX_DISPATCH_ATTEMPTS)?,
                base_delay: Duration::from_millis(env_parse(
                    "RETRY_BASE_MS",
                    defaults::RETRY_BASE_MS,
                )?),
                max_delay: Duration::from_millis(env_parse("RETRY_MAX_MS", defaults::RETRY_MAX_MS)?),
            },
            outbound_queue_capacity: env_parse(
                "OUTBOUND_QUEUE_CAPACITY",
                defaults::OUTBOUND_QUEUE_CAPACITY,
            )?,
            shutdown_grace: Duration::from_secs(env_parse(
                "SHUTDOWN_GRACE_SECS",
                defaults::SHUTDOWN_GRACE_SECS,
            )?),
            dispatch_concurrency: env_parse(
                "DISPATCH_CONCURRENCY",
                defaults::DISPATCH_CONCURRENCY,
            )?,
            jwt_secret,
            email_webhook_url: env::var("EMAIL_WEBHOOK_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            seed_demo_data: env_parse("SEED_DEMO_DATA", true)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns an error for zero intervals, zero attempts, zero capacities, or
    /// an empty tier list, or two tiers with the same lead time
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval.is_zero() {
            return Err(anyhow!("SCHEDULER_TICK_SECS must be greater than zero"));
        }
        if self.heartbeat_timeout.is_zero() {
            return Err(anyhow!("HEARTBEAT_TIMEOUT_SECS must be greater than zero"));
        }
        if self.retry.max_attempts == 0 {
            return Err(anyhow!("MAX_DISPATCH_ATTEMPTS must be at least 1"));
        }
        if self.outbound_queue_capacity == 0 {
            return Err(anyhow!("OUTBOUND_QUEUE_CAPACITY must be at least 1"));
        }
        if self.dispatch_concurrency == 0 {
            return Err(anyhow!("DISPATCH_CONCURRENCY must be at least 1"));
        }
        if self.reminder_tiers.is_empty() {
            return Err(anyhow!("REMINDER_TIERS must name at least one tier"));
        }

        let mut seen = HashSet::new();
        for tier in &self.reminder_tiers {
            if !seen.insert(tier.lead()) {
                return Err(anyhow!(
                    "REMINDER_TIERS lists the lead time of '{}' twice",
                    tier.name()
                ));
            }
        }
        Ok(())
    }

    /// Longest tier lead time; the scheduler's lookahead horizon
    #[must_use]
    pub fn max_lead(&self) -> Duration {
        self.reminder_tiers
            .iter()
            .map(ReminderTier::lead)
            .max()
            .unwrap_or_default()
    }

    /// One-paragraph summary for the startup log
    #[must_use]
    pub fn summary(&self) -> String {
        let tiers: Vec<&str> = self.reminder_tiers.iter().map(ReminderTier::name).collect();
        format!(
            "FitPro Live Server Configuration:\n\
             - HTTP Port: {}\n\
             - Reminder Tiers: {}\n\
             - Scheduler Tick: {}s\n\
             - Heartbeat Timeout: {}s\n\
             - Max Dispatch Attempts: {}\n\
             - Outbound Queue Capacity: {}\n\
             - Email Delivery: {}",
            self.http_port,
            tiers.join(", "),
            self.tick_interval.as_secs(),
            self.heartbeat_timeout.as_secs(),
            self.retry.max_attempts,
            self.outbound_queue_capacity,
            if self.email_webhook_url.is_some() {
                "Webhook"
            } else {
                "Log only"
            },
        )
    }
}

/// Parse a comma-separated tier list into tiers ordered coarsest first
///
/// # Errors
///
/// Returns an error naming the first tier that fails to parse
pub fn parse_tiers(raw: &str) -> Result<Vec<ReminderTier>> {
    let mut tiers = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ReminderTier::parse)
        .collect::<Result<Vec<_>, _>>()
        .context("Invalid REMINDER_TIERS value")?;
    ReminderTier::sort_coarsest_first(&mut tiers);
    Ok(tiers)
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {key} value: '{raw}'")),
        Err(_) => Ok(default),
    }
}
