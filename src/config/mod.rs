// ABOUTME: Configuration management module for the live-session server
// ABOUTME: Loads reminder tiers, scheduler cadence, heartbeat and retry settings from the environment
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

/// Environment-driven server configuration
pub mod environment;

pub use environment::{parse_tiers, LiveConfig, RetryPolicy};
