// ABOUTME: Tests for environment-driven configuration loading and validation
// ABOUTME: Runs serially because every case mutates process environment variables
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

use fitpro_live::config::{parse_tiers, LiveConfig};
use serial_test::serial;
use std::env;
use std::time::Duration;

const VARS: &[&str] = &[
    "HTTP_PORT",
    "REMINDER_TIERS",
    "SCHEDULER_TICK_SECS",
    "HEARTBEAT_TIMEOUT_SECS",
    "MAX_DISPATCH_ATTEMPTS",
    "RETRY_BASE_MS",
    "RETRY_MAX_MS",
    "OUTBOUND_QUEUE_CAPACITY",
    "SHUTDOWN_GRACE_SECS",
    "DISPATCH_CONCURRENCY",
    "JWT_SECRET",
    "EMAIL_WEBHOOK_URL",
    "SEED_DEMO_DATA",
];

fn clear_env() {
    for var in VARS {
        env::remove_var(var);
    }
}

fn tier_names(config: &LiveConfig) -> Vec<&str> {
    config.reminder_tiers.iter().map(|t| t.name()).collect()
}

#[test]
#[serial]
fn test_defaults_when_unset() {
    clear_env();
    let config = LiveConfig::from_env().unwrap();

    assert_eq!(config.http_port, 5000);
    assert_eq!(tier_names(&config), ["24h", "1h", "15m"]);
    assert_eq!(config.tick_interval, Duration::from_secs(60));
    assert_eq!(config.heartbeat_timeout, Duration::from_secs(90));
    assert_eq!(config.retry.max_attempts, 3);
    assert!(config.email_webhook_url.is_none());
    assert_eq!(config.max_lead(), Duration::from_secs(24 * 3600));
}

#[test]
#[serial]
fn test_overrides_are_applied_and_tiers_sorted() {
    clear_env();
    env::set_var("REMINDER_TIERS", "5m, 2h,30m");
    env::set_var("SCHEDULER_TICK_SECS", "15");
    env::set_var("HEARTBEAT_TIMEOUT_SECS", "30");
    env::set_var("MAX_DISPATCH_ATTEMPTS", "5");
    env::set_var("EMAIL_WEBHOOK_URL", "http://localhost:9999/send");

    let config = LiveConfig::from_env().unwrap();
    assert_eq!(tier_names(&config), ["2h", "30m", "5m"]);
    assert_eq!(config.tick_interval, Duration::from_secs(15));
    assert_eq!(config.heartbeat_timeout, Duration::from_secs(30));
    assert_eq!(config.retry.max_attempts, 5);
    assert_eq!(
        config.email_webhook_url.as_deref(),
        Some("http://localhost:9999/send")
    );
    assert!(config.summary().contains("2h, 30m, 5m"));

    clear_env();
}

#[test]
#[serial]
fn test_invalid_values_are_rejected() {
    clear_env();
    env::set_var("SCHEDULER_TICK_SECS", "soon");
    assert!(LiveConfig::from_env().is_err());

    clear_env();
    env::set_var("SCHEDULER_TICK_SECS", "0");
    assert!(LiveConfig::from_env().is_err());

    clear_env();
    env::set_var("REMINDER_TIERS", "1h,60m");
    assert!(LiveConfig::from_env().is_err());

    clear_env();
    env::set_var("REMINDER_TIERS", "tomorrow");
    assert!(LiveConfig::from_env().is_err());

    clear_env();
    env::set_var("MAX_DISPATCH_ATTEMPTS", "0");
    assert!(LiveConfig::from_env().is_err());

    clear_env();
}

#[test]
fn test_parse_tiers_ignores_blank_entries() {
    let tiers = parse_tiers("15m,,1h,").unwrap();
    let names: Vec<&str> = tiers.iter().map(|t| t.name()).collect();
    assert_eq!(names, ["1h", "15m"]);
}
