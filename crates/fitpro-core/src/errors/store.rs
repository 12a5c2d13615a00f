// ABOUTME: Session store error types
// ABOUTME: Distinguishes an unreachable store from per-record failures
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use crate::models::SessionStatus;

/// Session store failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Backend cannot be reached
    #[error("session store unavailable: {reason}")]
    Unavailable {
        /// Failure detail
        reason: String,
    },

    /// No session with this id
    #[error("session {session_id} not found")]
    NotFound {
        /// Session id
        session_id: String,
    },

    /// Status change would break the monotonic lifecycle
    #[error("session {session_id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// Session id
        session_id: String,
        /// Current status
        from: SessionStatus,
        /// Requested status
        to: SessionStatus,
    },

    /// Start time is frozen once a session is live or later
    #[error("session {session_id} is {status}; its start time can no longer change")]
    ScheduleLocked {
        /// Session id
        session_id: String,
        /// Current status
        status: SessionStatus,
    },
}

impl StoreError {
    /// Whether the failure concerns the whole store rather than one record
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}
