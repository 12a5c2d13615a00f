// ABOUTME: Migration and parsing error types
// ABOUTME: Record errors are logged and skipped; fatal errors abort startup
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::store::StoreError;

/// Value is not a valid typed object reference
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{raw}' is not a 24-digit hex object reference")]
pub struct ReferenceParseError {
    /// Offending raw value
    pub raw: String,
}

/// Reminder tier string could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid reminder tier '{raw}': {reason}")]
pub struct TierParseError {
    /// Offending raw value
    pub raw: String,
    /// Failure detail
    pub reason: &'static str,
}

impl TierParseError {
    /// Build a parse error
    #[must_use]
    pub fn new(raw: &str, reason: &'static str) -> Self {
        Self {
            raw: raw.to_owned(),
            reason,
        }
    }
}

/// One session document could not be migrated; the pass continues
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MigrationRecordError {
    /// Legacy value is not an object reference
    #[error("session {session_id}: {field} reference unresolvable")]
    UnresolvableReference {
        /// Session id
        session_id: String,
        /// Field holding the reference
        field: &'static str,
        /// Parse failure
        #[source]
        source: ReferenceParseError,
    },

    /// Reference parses but no such user exists
    #[error("session {session_id}: {field} references unknown user {user_id}")]
    UnknownUser {
        /// Session id
        session_id: String,
        /// Field holding the reference
        field: &'static str,
        /// Normalized user id
        user_id: String,
    },

    /// Store rejected the update for this record
    #[error("session {session_id}: reference update rejected")]
    UpdateRejected {
        /// Session id
        session_id: String,
        /// Store failure
        #[source]
        source: StoreError,
    },
}

/// Migration cannot continue; the process must not start serving
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MigrationFatalError {
    /// Store unreachable while scanning or writing
    #[error("session store unreachable during reference migration")]
    StoreUnreachable(#[source] StoreError),
}
