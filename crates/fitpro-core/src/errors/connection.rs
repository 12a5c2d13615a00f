// ABOUTME: Connection registry and WebSocket protocol error types
// ABOUTME: Protocol errors map to close codes; registry errors stay local to one connection
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use crate::constants::close_codes;

/// Connection registry failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The same socket handle was registered twice
    #[error("socket {socket_id} is already registered")]
    DuplicateConnection {
        /// Socket handle id
        socket_id: String,
    },

    /// No live connection with this id
    #[error("connection {connection_id} is not registered")]
    UnknownConnection {
        /// Connection id
        connection_id: String,
    },

    /// Registry has been closed for shutdown
    #[error("connection registry is shutting down")]
    ShuttingDown,
}

/// Client frame that violates the live-session protocol
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionProtocolError {
    /// Frame could not be decoded
    #[error("malformed frame: {reason}")]
    Malformed {
        /// Decode failure detail
        reason: String,
    },

    /// Frame requires an authenticated user
    #[error("authentication required")]
    Unauthenticated,

    /// User is neither trainer nor participant of the session
    #[error("not a participant of session {session_id}")]
    NotAParticipant {
        /// Session id
        session_id: String,
    },

    /// Session does not exist or is no longer joinable
    #[error("session {session_id} is not available")]
    SessionUnavailable {
        /// Session id
        session_id: String,
    },

    /// Chat sent to a room the connection has not joined
    #[error("not joined to session {session_id}")]
    NotInRoom {
        /// Session id
        session_id: String,
    },
}

impl ConnectionProtocolError {
    /// Close code to end the connection with, or `None` to keep it open
    #[must_use]
    pub const fn close_code(&self) -> Option<u16> {
        match self {
            Self::Malformed { .. } => Some(close_codes::INVALID_PAYLOAD),
            Self::Unauthenticated => Some(close_codes::POLICY_VIOLATION),
            Self::NotAParticipant { .. }
            | Self::SessionUnavailable { .. }
            | Self::NotInRoom { .. } => None,
        }
    }
}
