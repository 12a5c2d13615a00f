// ABOUTME: Main library entry point for the FitPro live-session server
// ABOUTME: Realtime session rooms, reminder scheduling with email fallback, and legacy reference migration
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![deny(unsafe_code)]

//! # FitPro Live
//!
//! The live-session notification and realtime-connection layer of the FitPro
//! coaching platform.
//!
//! ## Architecture
//!
//! - **Registry**: live WebSocket connections indexed by user and session room
//! - **Ledger**: per (session, tier) dedup of reminder sends
//! - **Scheduler**: periodic scan of upcoming sessions for due reminder tiers
//! - **Dispatcher**: realtime delivery with email fallback and bounded retries
//! - **Migration**: startup rewrite of legacy untyped session references
//! - **Service**: owns all of the above with an explicit start/stop lifecycle
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use fitpro_live::auth::JwtAuthenticator;
//! use fitpro_live::config::LiveConfig;
//! use fitpro_live::email::LogEmailSender;
//! use fitpro_live::service::LiveService;
//! use fitpro_live::store::InMemorySessionStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = LiveConfig::from_env()?;
//!     let authenticator = Arc::new(JwtAuthenticator::new(config.jwt_secret.as_bytes()));
//!     let service = Arc::new(LiveService::new(
//!         config,
//!         Arc::new(InMemorySessionStore::new()),
//!         authenticator,
//!         Arc::new(LogEmailSender),
//!     ));
//!     service.start().await?;
//!     let _router = service.router();
//!     service.stop().await;
//!     Ok(())
//! }
//! ```

/// Credential verification
pub mod auth;

/// Environment configuration
pub mod config;

/// Reminder delivery with realtime-first policy
pub mod dispatcher;

/// Email fallback channel
pub mod email;

/// Reminder dedup ledger
pub mod ledger;

/// Structured logging setup
pub mod logging;

/// Legacy reference migration pass
pub mod migration;

/// Live connection registry
pub mod registry;

/// HTTP routes
pub mod routes;

/// Reminder scheduler
pub mod scheduler;

/// Service lifecycle
pub mod service;

/// Session store contract and backends
pub mod store;

/// WebSocket protocol and connection handling
pub mod websocket;
