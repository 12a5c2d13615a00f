// ABOUTME: WebSocket connection handling for live-session rooms and reminders
// ABOUTME: One reader loop and one writer task per socket, bridged to the registry by channels
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Live socket handling
//!
//! A socket starts unauthenticated and must send `auth` within the heartbeat
//! timeout or it is closed with 1008. The `auth` frame resolves a user and
//! registers the socket's [`SocketHandle`] with the registry; from then on
//! the registry, the dispatcher, and room broadcasts all reach the client
//! through the same bounded outbound queue the writer task drains.

/// Wire frames
pub mod protocol;

use crate::auth::Authenticator;
use crate::registry::{CloseReason, ConnectionId, ConnectionRegistry, SocketHandle};
use crate::store::SessionStore;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use chrono::Utc;
use fitpro_core::constants::close_codes;
use fitpro_core::errors::{AuthError, ConnectionProtocolError, RegistryError, StoreError};
use fitpro_core::models::{SessionId, SessionStatus, UserId};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use protocol::{ClientMessage, ServerMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Why a client frame was refused
#[derive(Debug, thiserror::Error)]
enum FrameError {
    #[error(transparent)]
    Protocol(#[from] ConnectionProtocolError),
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("session lookup failed: {0}")]
    Store(#[from] StoreError),
}

impl FrameError {
    fn close_reason(&self) -> Option<CloseReason> {
        match self {
            Self::Protocol(e) => e
                .close_code()
                .map(|code| CloseReason::new(code, e.to_string())),
            Self::Registry(RegistryError::ShuttingDown) => Some(CloseReason::new(
                close_codes::NORMAL,
                "server shutting down",
            )),
            Self::Auth(_) | Self::Registry(_) | Self::Store(_) => None,
        }
    }
}

struct SocketState {
    handle: SocketHandle,
    connection: Option<(ConnectionId, UserId)>,
}

impl SocketState {
    fn require_auth(&self) -> Result<(ConnectionId, &UserId), ConnectionProtocolError> {
        self.connection
            .as_ref()
            .map(|(id, user)| (*id, user))
            .ok_or(ConnectionProtocolError::Unauthenticated)
    }

    fn reply(&self, message: ServerMessage) {
        match self.handle.try_send(message) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(_)) => self.handle.close(CloseReason::new(
                close_codes::TRY_AGAIN_LATER,
                "outbound queue full",
            )),
        }
    }
}

/// Serves live-session sockets
#[derive(Clone)]
pub struct LiveSocketManager {
    registry: Arc<ConnectionRegistry>,
    store: Arc<dyn SessionStore>,
    authenticator: Arc<dyn Authenticator>,
    outbound_capacity: usize,
    auth_timeout: Duration,
}

impl LiveSocketManager {
    /// Create a manager over the shared registry and collaborators
    #[must_use]
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        store: Arc<dyn SessionStore>,
        authenticator: Arc<dyn Authenticator>,
        outbound_capacity: usize,
        auth_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            store,
            authenticator,
            outbound_capacity,
            auth_timeout,
        }
    }

    /// Run a socket until the client leaves or the server closes it
    pub async fn handle_connection(&self, socket: WebSocket) {
        let (handle, endpoint) = SocketHandle::channel(self.outbound_capacity);
        let (sink, mut stream) = socket.split();
        let mut close_rx = endpoint.close.clone();
        let mut writer = tokio::spawn(write_loop(sink, endpoint.outbound, endpoint.close));
        let mut state = SocketState {
            handle,
            connection: None,
        };
        let auth_deadline = tokio::time::Instant::now() + self.auth_timeout;

        loop {
            let frame = tokio::select! {
                biased;
                _ = close_rx.changed() => break,
                () = tokio::time::sleep_until(auth_deadline), if state.connection.is_none() => {
                    debug!(timeout_secs = self.auth_timeout.as_secs(), "Closing socket that never authenticated");
                    state.reply(ServerMessage::error("authentication timed out"));
                    state.handle.close(CloseReason::new(
                        close_codes::POLICY_VIOLATION,
                        "authentication timed out",
                    ));
                    break;
                }
                frame = stream.next() => frame,
            };

            match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Err(e) = self.handle_text(&mut state, &text).await {
                        debug!(error = %e, "Rejected client frame");
                        state.reply(ServerMessage::error(e.to_string()));
                        if let Some(reason) = e.close_reason() {
                            state.handle.close(reason);
                        }
                    }
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                    if let Some((connection_id, _)) = &state.connection {
                        let _ = self.registry.heartbeat(*connection_id);
                    }
                }
                Some(Ok(Message::Binary(_))) => {
                    state.reply(ServerMessage::error("binary frames are not supported"));
                    state.handle.close(CloseReason::new(
                        close_codes::UNSUPPORTED_DATA,
                        "binary frames are not supported",
                    ));
                }
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
            }
        }

        if let Some((connection_id, user_id)) = state.connection.take() {
            // Already gone if the registry evicted it
            let _ = self.registry.unregister(connection_id);
            info!(connection_id = %connection_id, user_id = %user_id, "WebSocket connection closed");
        }
        drop(state);

        if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer)
            .await
            .is_err()
        {
            writer.abort();
        }
    }

    async fn handle_text(&self, state: &mut SocketState, text: &str) -> Result<(), FrameError> {
        match ClientMessage::parse(text)? {
            ClientMessage::Auth { token } => self.handle_auth(state, &token),
            ClientMessage::Join { session_id } => self.handle_join(state, &session_id).await,
            ClientMessage::Leave { session_id } => {
                let (connection_id, _) = state.require_auth()?;
                self.registry.leave_room(connection_id, &session_id)?;
                state.reply(ServerMessage::success(format!("Left session {session_id}")));
                Ok(())
            }
            ClientMessage::Heartbeat => {
                if let Some((connection_id, _)) = &state.connection {
                    self.registry.heartbeat(*connection_id)?;
                }
                Ok(())
            }
            ClientMessage::Chat { session_id, text } => {
                let (connection_id, user_id) = state.require_auth()?;
                if !self.registry.is_in_room(connection_id, &session_id) {
                    return Err(ConnectionProtocolError::NotInRoom {
                        session_id: session_id.to_string(),
                    }
                    .into());
                }
                let message = ServerMessage::Chat {
                    session_id: session_id.clone(),
                    from: user_id.clone(),
                    text,
                    sent_at: Utc::now(),
                };
                let delivered = self.registry.broadcast(&session_id, &message);
                debug!(session_id = %session_id, user_id = %user_id, delivered, "Chat relayed");
                Ok(())
            }
        }
    }

    fn handle_auth(&self, state: &mut SocketState, token: &str) -> Result<(), FrameError> {
        let user_id = self.authenticator.authenticate(token)?;
        let connection_id = self
            .registry
            .register(user_id.clone(), state.handle.clone())?;
        info!(connection_id = %connection_id, user_id = %user_id, "WebSocket client authenticated");
        state.connection = Some((connection_id, user_id));
        state.reply(ServerMessage::success("Authentication successful"));
        Ok(())
    }

    async fn handle_join(
        &self,
        state: &mut SocketState,
        session_id: &SessionId,
    ) -> Result<(), FrameError> {
        let (connection_id, user_id) = state.require_auth()?;
        let unavailable = || ConnectionProtocolError::SessionUnavailable {
            session_id: session_id.to_string(),
        };

        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or_else(unavailable)?;
        if !matches!(session.status, SessionStatus::Upcoming | SessionStatus::Live) {
            return Err(unavailable().into());
        }
        if !session.involves(user_id) {
            return Err(ConnectionProtocolError::NotAParticipant {
                session_id: session_id.to_string(),
            }
            .into());
        }

        self.registry.join_room(connection_id, session_id)?;
        state.reply(ServerMessage::success(format!("Joined session {session_id}")));
        Ok(())
    }
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<ServerMessage>,
    mut close: watch::Receiver<Option<CloseReason>>,
) {
    loop {
        tokio::select! {
            biased;
            changed = close.changed() => {
                let reason = if changed.is_ok() { close.borrow().clone() } else { None };
                while let Ok(message) = outbound.try_recv() {
                    if send_frame(&mut sink, &message).await.is_err() {
                        return;
                    }
                }
                if let Some(reason) = reason {
                    let frame = CloseFrame {
                        code: reason.code,
                        reason: reason.reason.into(),
                    };
                    if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                        debug!(error = %e, "Could not send close frame");
                    }
                }
                break;
            }
            message = outbound.recv() => match message {
                Some(message) => {
                    if send_frame(&mut sink, &message).await.is_err() {
                        break;
                    }
                }
                None => break,
            }
        }
    }
}

async fn send_frame(
    sink: &mut SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> Result<(), axum::Error> {
    match serde_json::to_string(message) {
        Ok(json) => sink.send(Message::Text(json)).await,
        Err(e) => {
            warn!(error = %e, "Failed to serialize outbound frame");
            Ok(())
        }
    }
}
