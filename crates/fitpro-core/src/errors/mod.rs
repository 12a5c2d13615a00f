// ABOUTME: Error taxonomy for the live-session core
// ABOUTME: Typed errors per concern plus the HTTP-facing AppError with error codes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

/// HTTP-facing application error with standard codes
pub mod app;
/// Auth collaborator errors
pub mod auth;
/// WebSocket protocol and registry errors
pub mod connection;
/// Reminder delivery errors
pub mod delivery;
/// Reference migration errors
pub mod migration;
/// Session store errors
pub mod store;

pub use app::{AppError, AppResult, ErrorCode, ErrorResponse};
pub use auth::AuthError;
pub use connection::{ConnectionProtocolError, RegistryError};
pub use delivery::DeliveryError;
pub use migration::{MigrationFatalError, MigrationRecordError, ReferenceParseError, TierParseError};
pub use store::StoreError;
