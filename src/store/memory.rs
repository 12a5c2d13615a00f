// ABOUTME: In-memory session store backend
// ABOUTME: Enforces lifecycle and schedule invariants and supports outage injection for tests
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::SessionStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fitpro_core::errors::StoreError;
use fitpro_core::models::{
    ReferencePatch, Session, SessionDocument, SessionId, SessionStatus, UserId,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

/// Session store kept entirely in process memory
#[derive(Default)]
pub struct InMemorySessionStore {
    documents: RwLock<HashMap<SessionId, SessionDocument>>,
    users: RwLock<HashSet<UserId>>,
    unavailable: AtomicBool,
}

impl InMemorySessionStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a raw document
    pub async fn insert_document(&self, document: SessionDocument) {
        self.documents
            .write()
            .await
            .insert(document.id.clone(), document);
    }

    /// Insert or replace a typed session
    pub async fn insert_session(&self, session: &Session) {
        self.insert_document(SessionDocument::from_session(session))
            .await;
    }

    /// Register a user account
    pub async fn insert_user(&self, user_id: UserId) {
        self.users.write().await.insert(user_id);
    }

    /// Raw document by id, for inspection
    pub async fn document(&self, id: &SessionId) -> Option<SessionDocument> {
        self.documents.read().await.get(id).cloned()
    }

    /// Number of stored documents
    pub async fn document_count(&self) -> usize {
        self.documents.read().await.len()
    }

    /// Simulate the backend becoming unreachable (or reachable again)
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Move an upcoming session's start time
    ///
    /// # Errors
    ///
    /// Returns `ScheduleLocked` once the session is live or later, and
    /// `NotFound` for unknown ids
    pub async fn reschedule_session(
        &self,
        id: &SessionId,
        scheduled_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.ensure_available()?;
        let mut documents = self.documents.write().await;
        let document = documents.get_mut(id).ok_or_else(|| not_found(id))?;
        if document.status != SessionStatus::Upcoming {
            return Err(StoreError::ScheduleLocked {
                session_id: id.to_string(),
                status: document.status,
            });
        }
        document.scheduled_at = scheduled_at;
        Ok(())
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                reason: "in-memory store marked unavailable".into(),
            });
        }
        Ok(())
    }
}

fn not_found(id: &SessionId) -> StoreError {
    StoreError::NotFound {
        session_id: id.to_string(),
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn list_upcoming_sessions_in_window(
        &self,
        now: DateTime<Utc>,
        horizon: DateTime<Utc>,
    ) -> Result<Vec<Session>, StoreError> {
        self.ensure_available()?;
        let documents = self.documents.read().await;
        let mut sessions: Vec<Session> = documents
            .values()
            .filter(|doc| {
                doc.status == SessionStatus::Upcoming
                    && doc.scheduled_at >= now
                    && doc.scheduled_at <= horizon
            })
            .filter_map(|doc| {
                let session = doc.to_session();
                if session.is_none() {
                    debug!(session_id = %doc.id, "Skipping session with legacy references");
                }
                session
            })
            .collect();
        sessions.sort_by(|a, b| {
            a.scheduled_at
                .cmp(&b.scheduled_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(sessions)
    }

    async fn get_session(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        self.ensure_available()?;
        Ok(self
            .documents
            .read()
            .await
            .get(id)
            .and_then(SessionDocument::to_session))
    }

    async fn list_session_documents(&self) -> Result<Vec<SessionDocument>, StoreError> {
        self.ensure_available()?;
        let mut documents: Vec<SessionDocument> =
            self.documents.read().await.values().cloned().collect();
        documents.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(documents)
    }

    async fn update_session_references(
        &self,
        id: &SessionId,
        patch: &ReferencePatch,
    ) -> Result<(), StoreError> {
        self.ensure_available()?;
        let mut documents = self.documents.write().await;
        let document = documents.get_mut(id).ok_or_else(|| not_found(id))?;
        document.apply_patch(patch);
        Ok(())
    }

    async fn update_session_status(
        &self,
        id: &SessionId,
        status: SessionStatus,
    ) -> Result<SessionStatus, StoreError> {
        self.ensure_available()?;
        let mut documents = self.documents.write().await;
        let document = documents.get_mut(id).ok_or_else(|| not_found(id))?;
        let previous = document.status;
        if !previous.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                session_id: id.to_string(),
                from: previous,
                to: status,
            });
        }
        document.status = status;
        Ok(previous)
    }

    async fn delete_session(&self, id: &SessionId) -> Result<(), StoreError> {
        self.ensure_available()?;
        self.documents
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| not_found(id))
    }

    async fn user_exists(&self, user_id: &UserId) -> Result<bool, StoreError> {
        self.ensure_available()?;
        Ok(self.users.read().await.contains(user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use fitpro_core::models::ForeignKey;

    fn session(id: &str, starts_in: Duration, status: SessionStatus) -> Session {
        Session {
            id: SessionId::new(id),
            title: format!("Session {id}"),
            trainer_id: UserId::new("t1"),
            scheduled_at: Utc::now() + starts_in,
            duration_minutes: 45,
            status,
            meeting_link: String::new(),
            participants: vec![UserId::new("c1")],
        }
    }

    #[tokio::test]
    async fn test_window_listing_filters_status_time_and_legacy() {
        let store = InMemorySessionStore::new();
        let now = Utc::now();
        store
            .insert_session(&session("in", Duration::hours(2), SessionStatus::Upcoming))
            .await;
        store
            .insert_session(&session("far", Duration::days(3), SessionStatus::Upcoming))
            .await;
        store
            .insert_session(&session("started", -Duration::minutes(5), SessionStatus::Upcoming))
            .await;
        store
            .insert_session(&session("live", Duration::hours(1), SessionStatus::Live))
            .await;
        let mut legacy = SessionDocument::from_session(&session(
            "legacy",
            Duration::hours(1),
            SessionStatus::Upcoming,
        ));
        legacy.trainer = ForeignKey::Legacy("t1".into());
        store.insert_document(legacy).await;

        let listed = store
            .list_upcoming_sessions_in_window(now, now + Duration::hours(24))
            .await
            .unwrap();
        let ids: Vec<_> = listed.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["in"]);
    }

    #[tokio::test]
    async fn test_status_updates_are_monotonic() {
        let store = InMemorySessionStore::new();
        store
            .insert_session(&session("s", Duration::hours(1), SessionStatus::Upcoming))
            .await;
        let id = SessionId::new("s");

        assert_eq!(
            store
                .update_session_status(&id, SessionStatus::Live)
                .await
                .unwrap(),
            SessionStatus::Upcoming
        );
        let err = store
            .update_session_status(&id, SessionStatus::Upcoming)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_schedule_locked_once_live() {
        let store = InMemorySessionStore::new();
        store
            .insert_session(&session("s", Duration::hours(1), SessionStatus::Live))
            .await;
        let err = store
            .reschedule_session(&SessionId::new("s"), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ScheduleLocked { .. }));
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_every_call() {
        let store = InMemorySessionStore::new();
        store.set_unavailable(true);
        assert!(store.list_session_documents().await.unwrap_err().is_unavailable());
        store.set_unavailable(false);
        assert!(store.list_session_documents().await.unwrap().is_empty());
    }
}
