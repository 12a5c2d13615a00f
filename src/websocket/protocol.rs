// ABOUTME: WebSocket wire frames exchanged with live-session clients
// ABOUTME: JSON messages tagged on "type" with camelCase fields
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use chrono::{DateTime, Utc};
use fitpro_core::constants::limits;
use fitpro_core::errors::ConnectionProtocolError;
use fitpro_core::models::{ReminderTier, Session, SessionId, SessionStatus, UserId};
use serde::{Deserialize, Serialize};

/// Frames sent by clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Present a credential; must precede `join`
    Auth {
        /// JWT bearer token
        token: String,
    },
    /// Subscribe to a session room
    #[serde(rename_all = "camelCase")]
    Join {
        /// Session to join
        session_id: SessionId,
    },
    /// Unsubscribe from a session room
    #[serde(rename_all = "camelCase")]
    Leave {
        /// Session to leave
        session_id: SessionId,
    },
    /// Liveness signal
    Heartbeat,
    /// Chat line for everyone in the room
    #[serde(rename_all = "camelCase")]
    Chat {
        /// Room the line is addressed to
        session_id: SessionId,
        /// Message text
        text: String,
    },
}

impl ClientMessage {
    /// Decode a text frame
    ///
    /// # Errors
    ///
    /// Returns `ConnectionProtocolError::Malformed` for invalid JSON, unknown
    /// frame types, and chat lines that are empty or too long
    pub fn parse(text: &str) -> Result<Self, ConnectionProtocolError> {
        let message: Self =
            serde_json::from_str(text).map_err(|e| ConnectionProtocolError::Malformed {
                reason: e.to_string(),
            })?;
        if let Self::Chat { text, .. } = &message {
            if text.trim().is_empty() {
                return Err(ConnectionProtocolError::Malformed {
                    reason: "chat text is empty".into(),
                });
            }
            if text.chars().count() > limits::MAX_CHAT_TEXT_LEN {
                return Err(ConnectionProtocolError::Malformed {
                    reason: format!(
                        "chat text exceeds {} characters",
                        limits::MAX_CHAT_TEXT_LEN
                    ),
                });
            }
        }
        Ok(message)
    }
}

/// Frames sent by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Acknowledgement of an auth, join, or leave
    Success {
        /// Human-readable confirmation
        message: String,
    },
    /// Request rejected; the connection stays open unless a close frame follows
    Error {
        /// Human-readable reason
        message: String,
    },
    /// Upcoming-session reminder
    #[serde(rename_all = "camelCase")]
    Reminder {
        /// Session the reminder is for
        session_id: SessionId,
        /// Tier name, e.g. `24h`
        tier: String,
        /// Session start
        scheduled_at: DateTime<Utc>,
        /// Session title
        title: String,
        /// Link to join
        meeting_link: String,
    },
    /// Session lifecycle change
    #[serde(rename_all = "camelCase")]
    SessionStatus {
        /// Session that changed
        session_id: SessionId,
        /// New status
        status: SessionStatus,
    },
    /// Chat line relayed to a room
    #[serde(rename_all = "camelCase")]
    Chat {
        /// Room the line was sent to
        session_id: SessionId,
        /// Sender
        from: UserId,
        /// Message text
        text: String,
        /// Server receive time
        sent_at: DateTime<Utc>,
    },
}

impl ServerMessage {
    /// Reminder frame for a session and tier
    #[must_use]
    pub fn reminder(session: &Session, tier: &ReminderTier) -> Self {
        Self::Reminder {
            session_id: session.id.clone(),
            tier: tier.name().to_owned(),
            scheduled_at: session.scheduled_at,
            title: session.title.clone(),
            meeting_link: session.meeting_link.clone(),
        }
    }

    /// Success frame
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self::Success {
            message: message.into(),
        }
    }

    /// Error frame
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_frames_use_type_tag_and_camel_case() {
        assert_eq!(
            ClientMessage::parse(r#"{"type":"join","sessionId":"s1"}"#).unwrap(),
            ClientMessage::Join {
                session_id: SessionId::new("s1")
            }
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"heartbeat"}"#).unwrap(),
            ClientMessage::Heartbeat
        );
        assert!(matches!(
            ClientMessage::parse(r#"{"type":"join","session_id":"s1"}"#),
            Err(ConnectionProtocolError::Malformed { .. })
        ));
        assert!(ClientMessage::parse("not json").is_err());
    }

    #[test]
    fn test_chat_text_limits() {
        let long = "x".repeat(limits::MAX_CHAT_TEXT_LEN + 1);
        let frame = json!({"type": "chat", "sessionId": "s1", "text": long}).to_string();
        assert!(ClientMessage::parse(&frame).is_err());
        assert!(ClientMessage::parse(r#"{"type":"chat","sessionId":"s1","text":"  "}"#).is_err());
    }

    #[test]
    fn test_server_frame_shape() {
        let frame = ServerMessage::SessionStatus {
            session_id: SessionId::new("s1"),
            status: SessionStatus::Live,
        };
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({"type": "session-status", "sessionId": "s1", "status": "live"})
        );
    }
}
