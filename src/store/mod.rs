// ABOUTME: Session store abstraction consumed by the scheduler, migration pass, and socket handlers
// ABOUTME: Narrow contract over persisted session documents plus an in-memory backend
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Session store contract
//!
//! The live-session core never touches persistence directly. Everything it
//! needs from stored sessions goes through [`SessionStore`].

/// In-memory store backend
pub mod memory;
/// Demo accounts and sessions for development startup
pub mod seed;

pub use memory::InMemorySessionStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fitpro_core::errors::StoreError;
use fitpro_core::models::{
    ReferencePatch, Session, SessionDocument, SessionId, SessionStatus, UserId,
};

/// Persisted session records, read and written through a narrow contract
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Upcoming sessions starting in `[now, horizon]`, fully typed only
    async fn list_upcoming_sessions_in_window(
        &self,
        now: DateTime<Utc>,
        horizon: DateTime<Utc>,
    ) -> Result<Vec<Session>, StoreError>;

    /// A single session; `None` if absent or still holding legacy references
    async fn get_session(&self, id: &SessionId) -> Result<Option<Session>, StoreError>;

    /// Every stored document in its raw form, for the migration pass
    async fn list_session_documents(&self) -> Result<Vec<SessionDocument>, StoreError>;

    /// Replace all foreign keys of one document with typed references
    async fn update_session_references(
        &self,
        id: &SessionId,
        patch: &ReferencePatch,
    ) -> Result<(), StoreError>;

    /// Move a session along its lifecycle; returns the previous status
    async fn update_session_status(
        &self,
        id: &SessionId,
        status: SessionStatus,
    ) -> Result<SessionStatus, StoreError>;

    /// Remove a session document
    async fn delete_session(&self, id: &SessionId) -> Result<(), StoreError>;

    /// Whether a user account exists for this typed reference
    async fn user_exists(&self, user_id: &UserId) -> Result<bool, StoreError>;
}
