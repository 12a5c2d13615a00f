// ABOUTME: Live session records, status lifecycle, and foreign-key representations
// ABOUTME: Models legacy untyped references alongside typed ones for the migration pass
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::ids::{SessionId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a live session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Scheduled, not yet started
    Upcoming,
    /// Currently running
    Live,
    /// Finished normally
    Completed,
    /// Called off before or during the session
    Cancelled,
}

impl SessionStatus {
    /// Whether moving from `self` to `next` respects the monotonic lifecycle
    ///
    /// Allowed: upcoming → live → completed, and upcoming/live → cancelled.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Upcoming, Self::Live | Self::Cancelled)
                | (Self::Live, Self::Completed | Self::Cancelled)
        )
    }

    /// Completed and cancelled sessions never change again
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Wire name of the status
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upcoming => "upcoming",
            Self::Live => "live",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scheduled live training session with fully typed references
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Session identifier
    pub id: SessionId,
    /// Display title
    pub title: String,
    /// Trainer running the session
    pub trainer_id: UserId,
    /// Start instant
    pub scheduled_at: DateTime<Utc>,
    /// Planned length in minutes
    pub duration_minutes: u32,
    /// Lifecycle status
    pub status: SessionStatus,
    /// Link clients use to join the call
    pub meeting_link: String,
    /// Enrolled clients
    pub participants: Vec<UserId>,
}

impl Session {
    /// Everyone who should hear about this session: trainer first, then clients
    #[must_use]
    pub fn recipients(&self) -> Vec<UserId> {
        let mut recipients = Vec::with_capacity(self.participants.len() + 1);
        for user in std::iter::once(&self.trainer_id).chain(self.participants.iter()) {
            if !recipients.contains(user) {
                recipients.push(user.clone());
            }
        }
        recipients
    }

    /// Whether the user is the trainer or an enrolled client
    #[must_use]
    pub fn involves(&self, user_id: &UserId) -> bool {
        self.trainer_id == *user_id || self.participants.contains(user_id)
    }
}

/// Stored form of a foreign key on a session document
///
/// Older documents kept user references as free-form strings. The migration
/// pass rewrites those into `Typed` references; after it runs only orphans
/// remain `Legacy`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ForeignKey {
    /// Untyped string reference
    Legacy(String),
    /// Normalized user reference
    Typed(UserId),
}

impl ForeignKey {
    /// The typed reference, if this key has been migrated
    #[must_use]
    pub const fn typed(&self) -> Option<&UserId> {
        match self {
            Self::Typed(id) => Some(id),
            Self::Legacy(_) => None,
        }
    }

    /// Whether the key still needs migration
    #[must_use]
    pub const fn is_legacy(&self) -> bool {
        matches!(self, Self::Legacy(_))
    }
}

/// Persisted session document as the store keeps it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDocument {
    /// Session identifier
    pub id: SessionId,
    /// Display title
    pub title: String,
    /// Trainer reference
    pub trainer: ForeignKey,
    /// Start instant
    pub scheduled_at: DateTime<Utc>,
    /// Planned length in minutes
    pub duration_minutes: u32,
    /// Lifecycle status
    pub status: SessionStatus,
    /// Link clients use to join the call
    pub meeting_link: String,
    /// Enrolled client references
    pub participants: Vec<ForeignKey>,
}

impl SessionDocument {
    /// Build a document with typed references from a session
    #[must_use]
    pub fn from_session(session: &Session) -> Self {
        Self {
            id: session.id.clone(),
            title: session.title.clone(),
            trainer: ForeignKey::Typed(session.trainer_id.clone()),
            scheduled_at: session.scheduled_at,
            duration_minutes: session.duration_minutes,
            status: session.status,
            meeting_link: session.meeting_link.clone(),
            participants: session
                .participants
                .iter()
                .cloned()
                .map(ForeignKey::Typed)
                .collect(),
        }
    }

    /// Whether any reference is still in the legacy form
    #[must_use]
    pub fn has_legacy_references(&self) -> bool {
        self.trainer.is_legacy() || self.participants.iter().any(ForeignKey::is_legacy)
    }

    /// Collapse into a typed session; `None` while legacy references remain
    #[must_use]
    pub fn to_session(&self) -> Option<Session> {
        let trainer_id = self.trainer.typed()?.clone();
        let participants = self
            .participants
            .iter()
            .map(|key| key.typed().cloned())
            .collect::<Option<Vec<_>>>()?;

        Some(Session {
            id: self.id.clone(),
            title: self.title.clone(),
            trainer_id,
            scheduled_at: self.scheduled_at,
            duration_minutes: self.duration_minutes,
            status: self.status,
            meeting_link: self.meeting_link.clone(),
            participants,
        })
    }

    /// Overwrite every reference with the typed values in `patch`
    pub fn apply_patch(&mut self, patch: &ReferencePatch) {
        self.trainer = ForeignKey::Typed(patch.trainer.clone());
        self.participants = patch
            .participants
            .iter()
            .cloned()
            .map(ForeignKey::Typed)
            .collect();
    }
}

/// Typed replacement for all foreign keys of one session document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferencePatch {
    /// Typed trainer reference
    pub trainer: UserId,
    /// Typed participant references, in original order
    pub participants: Vec<UserId>,
}
