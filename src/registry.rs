// ABOUTME: Connection registry tracking live sockets by user and by session room
// ABOUTME: Sharded maps, bounded outbound queues, heartbeat eviction, and broadcast
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Connection Registry
//!
//! Each socket task owns a [`SocketEndpoint`] and hands the matching
//! [`SocketHandle`] to the registry on registration. The registry only ever
//! `try_send`s into the bounded outbound queue, so a slow client never blocks
//! a broadcast; a full queue evicts the connection with close code 1013.
//!
//! Locking: the four indexes are independent `DashMap`s. No operation holds
//! guards on two maps at once and no guard lives across an `.await`.

use crate::websocket::protocol::ServerMessage;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use fitpro_core::constants::close_codes;
use fitpro_core::errors::RegistryError;
use fitpro_core::models::{SessionId, UserId};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Registry-assigned connection identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Why the server is ending a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    /// WebSocket close code
    pub code: u16,
    /// Close frame reason text
    pub reason: String,
}

impl CloseReason {
    /// Build a close reason
    #[must_use]
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    fn slow_consumer() -> Self {
        Self::new(close_codes::TRY_AGAIN_LATER, "outbound queue full")
    }

    fn heartbeat_timeout() -> Self {
        Self::new(close_codes::GOING_AWAY, "heartbeat timeout")
    }
}

/// Registry side of a socket: the outbound queue sender and the close signal
#[derive(Debug, Clone)]
pub struct SocketHandle {
    socket_id: Uuid,
    outbound: mpsc::Sender<ServerMessage>,
    close: Arc<watch::Sender<Option<CloseReason>>>,
}

/// Socket-task side: frames to write and the close signal to watch
#[derive(Debug)]
pub struct SocketEndpoint {
    /// Frames queued for this socket
    pub outbound: mpsc::Receiver<ServerMessage>,
    /// Set once the connection must be closed
    pub close: watch::Receiver<Option<CloseReason>>,
}

impl SocketHandle {
    /// Create a handle and its endpoint with an outbound queue of `capacity`
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, SocketEndpoint) {
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity.max(1));
        let (close_tx, close_rx) = watch::channel(None);
        (
            Self {
                socket_id: Uuid::new_v4(),
                outbound: outbound_tx,
                close: Arc::new(close_tx),
            },
            SocketEndpoint {
                outbound: outbound_rx,
                close: close_rx,
            },
        )
    }

    /// Identity of the underlying socket
    #[must_use]
    pub const fn socket_id(&self) -> Uuid {
        self.socket_id
    }

    /// Queue a frame without waiting
    ///
    /// # Errors
    ///
    /// Returns the frame back if the queue is full or the socket is gone
    pub fn try_send(&self, message: ServerMessage) -> Result<(), TrySendError<ServerMessage>> {
        self.outbound.try_send(message)
    }

    /// Signal the socket task to close; the first reason wins
    pub fn close(&self, reason: CloseReason) {
        self.close.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        });
    }
}

#[derive(Debug)]
struct Connection {
    user_id: UserId,
    room: Option<SessionId>,
    last_heartbeat: Instant,
    handle: SocketHandle,
}

enum Delivery {
    Delivered,
    Dropped,
    Missing,
}

/// Live connections indexed by id, user, room, and socket
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Connection>,
    users: DashMap<UserId, HashSet<ConnectionId>>,
    rooms: DashMap<SessionId, HashSet<ConnectionId>>,
    sockets: DashMap<Uuid, ConnectionId>,
    heartbeat_timeout: Duration,
    shutting_down: AtomicBool,
}

impl ConnectionRegistry {
    /// Create an empty registry that evicts connections silent for `heartbeat_timeout`
    #[must_use]
    pub fn new(heartbeat_timeout: Duration) -> Self {
        Self {
            connections: DashMap::new(),
            users: DashMap::new(),
            rooms: DashMap::new(),
            sockets: DashMap::new(),
            heartbeat_timeout,
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Add a live connection for `user_id`
    ///
    /// A user may hold any number of connections; only registering the same
    /// socket twice is an error.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateConnection` if the socket is already registered and
    /// `ShuttingDown` once [`Self::close_all`] has run
    pub fn register(
        &self,
        user_id: UserId,
        handle: SocketHandle,
    ) -> Result<ConnectionId, RegistryError> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(RegistryError::ShuttingDown);
        }

        let connection_id = ConnectionId::generate();
        match self.sockets.entry(handle.socket_id) {
            Entry::Occupied(_) => {
                return Err(RegistryError::DuplicateConnection {
                    socket_id: handle.socket_id.to_string(),
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(connection_id);
            }
        }

        self.connections.insert(
            connection_id,
            Connection {
                user_id: user_id.clone(),
                room: None,
                last_heartbeat: Instant::now(),
                handle,
            },
        );
        self.users
            .entry(user_id.clone())
            .or_default()
            .insert(connection_id);

        debug!(connection_id = %connection_id, user_id = %user_id, "Connection registered");
        Ok(connection_id)
    }

    /// Remove a connection from every index
    ///
    /// # Errors
    ///
    /// Returns `UnknownConnection` if the id is not registered
    pub fn unregister(&self, connection_id: ConnectionId) -> Result<(), RegistryError> {
        self.remove_if(connection_id, |_| true)
            .map(|_| ())
            .ok_or_else(|| unknown(connection_id))
    }

    /// Move a connection into `session_id`'s room, leaving any previous room
    ///
    /// # Errors
    ///
    /// Returns `UnknownConnection` if the id is not registered
    pub fn join_room(
        &self,
        connection_id: ConnectionId,
        session_id: &SessionId,
    ) -> Result<(), RegistryError> {
        let previous = {
            let mut connection = self
                .connections
                .get_mut(&connection_id)
                .ok_or_else(|| unknown(connection_id))?;
            connection.room.replace(session_id.clone())
        };

        if previous.as_ref() == Some(session_id) {
            return Ok(());
        }
        if let Some(previous) = previous {
            self.remove_from_room(&previous, connection_id);
        }
        self.rooms
            .entry(session_id.clone())
            .or_default()
            .insert(connection_id);

        // A concurrent unregister may have run between the two updates
        if !self.connections.contains_key(&connection_id) {
            self.remove_from_room(session_id, connection_id);
            return Err(unknown(connection_id));
        }

        debug!(connection_id = %connection_id, session_id = %session_id, "Joined room");
        Ok(())
    }

    /// Leave `session_id`'s room; returns false if the connection was not in it
    ///
    /// # Errors
    ///
    /// Returns `UnknownConnection` if the id is not registered
    pub fn leave_room(
        &self,
        connection_id: ConnectionId,
        session_id: &SessionId,
    ) -> Result<bool, RegistryError> {
        {
            let mut connection = self
                .connections
                .get_mut(&connection_id)
                .ok_or_else(|| unknown(connection_id))?;
            if connection.room.as_ref() != Some(session_id) {
                return Ok(false);
            }
            connection.room = None;
        }
        self.remove_from_room(session_id, connection_id);
        debug!(connection_id = %connection_id, session_id = %session_id, "Left room");
        Ok(true)
    }

    /// Whether a connection is currently in `session_id`'s room
    #[must_use]
    pub fn is_in_room(&self, connection_id: ConnectionId, session_id: &SessionId) -> bool {
        self.connections
            .get(&connection_id)
            .is_some_and(|connection| connection.room.as_ref() == Some(session_id))
    }

    /// Queue `message` for every connection in the room; returns how many accepted it
    pub fn broadcast(&self, session_id: &SessionId, message: &ServerMessage) -> usize {
        let members = self.room_members(session_id);
        members
            .into_iter()
            .filter(|id| matches!(self.deliver(*id, message.clone()), Delivery::Delivered))
            .count()
    }

    /// Queue `message` for one connection
    ///
    /// Returns false if the connection's queue was full and it was evicted.
    ///
    /// # Errors
    ///
    /// Returns `UnknownConnection` if the id is not registered
    pub fn send_to_connection(
        &self,
        connection_id: ConnectionId,
        message: ServerMessage,
    ) -> Result<bool, RegistryError> {
        match self.deliver(connection_id, message) {
            Delivery::Delivered => Ok(true),
            Delivery::Dropped => Ok(false),
            Delivery::Missing => Err(unknown(connection_id)),
        }
    }

    /// Queue `message` on every live connection of `user_id`
    ///
    /// Returns true iff at least one connection accepted it; false tells the
    /// caller to use a fallback channel.
    ///
    /// # Errors
    ///
    /// Returns `ShuttingDown` once [`Self::close_all`] has run
    pub fn send_to_user(
        &self,
        user_id: &UserId,
        message: &ServerMessage,
    ) -> Result<bool, RegistryError> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(RegistryError::ShuttingDown);
        }
        let targets: Vec<ConnectionId> = self
            .users
            .get(user_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();

        let delivered = targets
            .into_iter()
            .filter(|id| matches!(self.deliver(*id, message.clone()), Delivery::Delivered))
            .count();
        Ok(delivered > 0)
    }

    /// Record a heartbeat for a connection
    ///
    /// # Errors
    ///
    /// Returns `UnknownConnection` if the id is not registered
    pub fn heartbeat(&self, connection_id: ConnectionId) -> Result<(), RegistryError> {
        let mut connection = self
            .connections
            .get_mut(&connection_id)
            .ok_or_else(|| unknown(connection_id))?;
        connection.last_heartbeat = Instant::now();
        drop(connection);
        Ok(())
    }

    /// Evict every connection whose last heartbeat is older than the timeout
    pub fn evict_stale(&self, now: Instant) -> Vec<ConnectionId> {
        let timeout = self.heartbeat_timeout;
        let is_stale =
            |connection: &Connection| now.saturating_duration_since(connection.last_heartbeat) > timeout;

        let candidates: Vec<ConnectionId> = self
            .connections
            .iter()
            .filter(|entry| is_stale(entry.value()))
            .map(|entry| *entry.key())
            .collect();

        let mut evicted = Vec::with_capacity(candidates.len());
        for connection_id in candidates {
            // Re-checked under the entry lock; a heartbeat may have landed since
            if let Some(connection) = self.remove_if(connection_id, is_stale) {
                info!(
                    connection_id = %connection_id,
                    user_id = %connection.user_id,
                    "Evicting connection after heartbeat timeout"
                );
                connection.handle.close(CloseReason::heartbeat_timeout());
                evicted.push(connection_id);
            }
        }
        evicted
    }

    /// Sweep for stale connections at a third of the timeout until `shutdown` fires
    pub fn spawn_reaper(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        let period = (self.heartbeat_timeout / 3).max(Duration::from_millis(10));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let evicted = registry.evict_stale(Instant::now());
                        if !evicted.is_empty() {
                            debug!(count = evicted.len(), "Heartbeat sweep evicted connections");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("Heartbeat reaper stopped");
        })
    }

    /// Refuse new registrations and close every connection with `code`
    pub fn close_all(&self, code: u16) -> usize {
        self.shutting_down.store(true, Ordering::SeqCst);
        let ids: Vec<ConnectionId> = self.connections.iter().map(|entry| *entry.key()).collect();
        let mut closed = 0;
        for connection_id in ids {
            if let Some(connection) = self.remove_if(connection_id, |_| true) {
                connection
                    .handle
                    .close(CloseReason::new(code, "server shutting down"));
                closed += 1;
            }
        }
        info!(closed, code, "Closed all live connections");
        closed
    }

    /// Connections currently in `session_id`'s room, sorted
    #[must_use]
    pub fn room_members(&self, session_id: &SessionId) -> Vec<ConnectionId> {
        let mut members: Vec<ConnectionId> = self
            .rooms
            .get(session_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        members.sort_unstable();
        members
    }

    /// User owning a connection
    #[must_use]
    pub fn connection_user(&self, connection_id: ConnectionId) -> Option<UserId> {
        self.connections
            .get(&connection_id)
            .map(|connection| connection.user_id.clone())
    }

    /// Number of live connections
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of non-empty rooms
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Number of live connections held by `user_id`
    #[must_use]
    pub fn user_connection_count(&self, user_id: &UserId) -> usize {
        self.users.get(user_id).map_or(0, |set| set.len())
    }

    fn deliver(&self, connection_id: ConnectionId, message: ServerMessage) -> Delivery {
        let result = {
            let Some(connection) = self.connections.get(&connection_id) else {
                return Delivery::Missing;
            };
            connection.handle.try_send(message)
        };

        match result {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Full(_)) => {
                if let Some(connection) = self.remove_if(connection_id, |_| true) {
                    warn!(
                        connection_id = %connection_id,
                        user_id = %connection.user_id,
                        "Outbound queue full; evicting slow consumer"
                    );
                    connection.handle.close(CloseReason::slow_consumer());
                }
                Delivery::Dropped
            }
            Err(TrySendError::Closed(_)) => {
                // Socket task already ended and will unregister itself
                let _ = self.remove_if(connection_id, |_| true);
                Delivery::Dropped
            }
        }
    }

    fn remove_if(
        &self,
        connection_id: ConnectionId,
        predicate: impl FnOnce(&Connection) -> bool,
    ) -> Option<Connection> {
        let (_, connection) = self
            .connections
            .remove_if(&connection_id, |_, connection| predicate(connection))?;

        self.sockets.remove(&connection.handle.socket_id);
        if let Some(mut set) = self.users.get_mut(&connection.user_id) {
            set.remove(&connection_id);
        }
        self.users
            .remove_if(&connection.user_id, |_, set| set.is_empty());
        if let Some(room) = &connection.room {
            self.remove_from_room(room, connection_id);
        }

        debug!(connection_id = %connection_id, user_id = %connection.user_id, "Connection removed");
        Some(connection)
    }

    fn remove_from_room(&self, session_id: &SessionId, connection_id: ConnectionId) {
        if let Some(mut set) = self.rooms.get_mut(session_id) {
            set.remove(&connection_id);
        }
        self.rooms.remove_if(session_id, |_, set| set.is_empty());
    }
}

fn unknown(connection_id: ConnectionId) -> RegistryError {
    RegistryError::UnknownConnection {
        connection_id: connection_id.to_string(),
    }
}
