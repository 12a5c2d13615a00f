// ABOUTME: Auth collaborator error types
// ABOUTME: Returned when a socket or request credential cannot be resolved to a user
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

/// Credential resolution failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No credential was presented
    #[error("missing credential")]
    MissingCredential,

    /// Credential is malformed or its signature does not verify
    #[error("invalid token: {reason}")]
    InvalidToken {
        /// Failure detail
        reason: String,
    },

    /// Credential has expired
    #[error("token expired")]
    Expired,
}
