// ABOUTME: Owned live-session service wiring registry, ledger, dispatcher, and scheduler
// ABOUTME: Explicit start/stop lifecycle with startup migration and graceful drain on shutdown
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Live Service
//!
//! All realtime and reminder state lives in one [`LiveService`] built from
//! injected collaborators. `start()` runs the reference migration to
//! completion before the scheduler's first tick; a fatal migration error
//! aborts startup. `stop()` halts ticking, lets in-flight dispatch drain for
//! the configured grace period, then closes every socket with 1000.

use crate::auth::Authenticator;
use crate::config::LiveConfig;
use crate::dispatcher::NotificationDispatcher;
use crate::email::EmailSender;
use crate::ledger::ReminderLedger;
use crate::migration::{MigrationReport, ReferenceMigration};
use crate::registry::ConnectionRegistry;
use crate::routes;
use crate::scheduler::ReminderScheduler;
use crate::store::SessionStore;
use crate::websocket::protocol::ServerMessage;
use crate::websocket::LiveSocketManager;
use axum::Router;
use fitpro_core::constants::close_codes;
use fitpro_core::errors::{AppError, AppResult, MigrationFatalError};
use fitpro_core::models::{Session, SessionId, SessionStatus, UserId};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Point-in-time service counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    /// `healthy` while running, `stopped` after `stop()`
    pub status: &'static str,
    /// Live connections
    pub connections: usize,
    /// Non-empty rooms
    pub rooms: usize,
    /// Ledger records in a terminal state
    pub reminders_terminal: usize,
}

/// Result of a status change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    /// Status before the change
    pub previous_status: SessionStatus,
    /// Status after the change
    pub status: SessionStatus,
    /// Connections that received the `session-status` frame
    pub notified: usize,
}

/// The live-session notification and connection service
pub struct LiveService {
    config: LiveConfig,
    store: Arc<dyn SessionStore>,
    registry: Arc<ConnectionRegistry>,
    ledger: Arc<ReminderLedger>,
    scheduler: Arc<ReminderScheduler>,
    sockets: LiveSocketManager,
    authenticator: Arc<dyn Authenticator>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl LiveService {
    /// Wire the service from configuration and collaborators
    #[must_use]
    pub fn new(
        config: LiveConfig,
        store: Arc<dyn SessionStore>,
        authenticator: Arc<dyn Authenticator>,
        email: Arc<dyn EmailSender>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(config.heartbeat_timeout));
        let ledger = Arc::new(ReminderLedger::new());
        let dispatcher = Arc::new(NotificationDispatcher::new(
            Arc::clone(&registry),
            email,
            Arc::clone(&ledger),
            config.retry,
        ));
        let scheduler = Arc::new(ReminderScheduler::new(
            Arc::clone(&store),
            dispatcher,
            Arc::clone(&ledger),
            config.reminder_tiers.clone(),
            config.tick_interval,
            config.dispatch_concurrency,
        ));
        let sockets = LiveSocketManager::new(
            Arc::clone(&registry),
            Arc::clone(&store),
            Arc::clone(&authenticator),
            config.outbound_queue_capacity,
            config.heartbeat_timeout,
        );
        let (shutdown, _) = watch::channel(false);

        Self {
            config,
            store,
            registry,
            ledger,
            scheduler,
            sockets,
            authenticator,
            shutdown,
            tasks: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    /// Migrate legacy references, then start the scheduler and heartbeat reaper
    ///
    /// Calling `start` a second time does nothing and returns an empty report.
    ///
    /// # Errors
    ///
    /// Returns `MigrationFatalError` if the store is unreachable during
    /// migration; nothing is spawned in that case
    pub async fn start(&self) -> Result<MigrationReport, MigrationFatalError> {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("Live service already started");
            return Ok(MigrationReport::default());
        }

        let report = match ReferenceMigration::new(Arc::clone(&self.store)).run().await {
            Ok(report) => report,
            Err(e) => {
                self.started.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        let scheduler = Arc::clone(&self.scheduler);
        let scheduler_task = tokio::spawn(scheduler.run(self.shutdown.subscribe()));
        let reaper_task = self.registry.spawn_reaper(self.shutdown.subscribe());
        self.tasks.lock().await.extend([scheduler_task, reaper_task]);

        info!(
            tiers = self.config.reminder_tiers.len(),
            tick_secs = self.config.tick_interval.as_secs(),
            "Live service started"
        );
        Ok(report)
    }

    /// Stop ticking, drain in-flight dispatch, and close every connection
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown.send_replace(true);

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        let grace = self.config.shutdown_grace;
        for mut task in tasks {
            if tokio::time::timeout(grace, &mut task).await.is_err() {
                warn!(
                    grace_secs = grace.as_secs(),
                    "Background task did not drain within the grace period; aborting"
                );
                task.abort();
            }
        }

        let closed = self.registry.close_all(close_codes::NORMAL);
        info!(closed, "Live service stopped");
    }

    /// Apply a trainer-initiated status change and notify the session room
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` for unknown sessions, `PermissionDenied` if
    /// `actor` is not the session's trainer, and `ResourceConflict` for
    /// non-monotonic transitions
    pub async fn transition_session(
        &self,
        actor: &UserId,
        session_id: &SessionId,
        status: SessionStatus,
    ) -> AppResult<StatusChange> {
        self.require_trainer(actor, session_id).await?;
        let previous_status = self.store.update_session_status(session_id, status).await?;

        let notified = self.registry.broadcast(
            session_id,
            &ServerMessage::SessionStatus {
                session_id: session_id.clone(),
                status,
            },
        );
        if status.is_terminal() {
            self.ledger.clear_session(session_id);
        }

        info!(
            session_id = %session_id,
            user_id = %actor,
            from = previous_status.as_str(),
            to = status.as_str(),
            notified,
            "Session status changed"
        );
        Ok(StatusChange {
            previous_status,
            status,
            notified,
        })
    }

    /// Delete a session and every ledger record it owns
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` for unknown sessions and `PermissionDenied`
    /// if `actor` is not the session's trainer
    pub async fn delete_session(&self, actor: &UserId, session_id: &SessionId) -> AppResult<()> {
        self.require_trainer(actor, session_id).await?;
        self.store.delete_session(session_id).await?;
        let cleared = self.ledger.clear_session(session_id);
        info!(session_id = %session_id, user_id = %actor, cleared, "Session deleted");
        Ok(())
    }

    /// Current counters
    #[must_use]
    pub fn health(&self) -> HealthSnapshot {
        HealthSnapshot {
            status: if self.stopped.load(Ordering::SeqCst) {
                "stopped"
            } else {
                "healthy"
            },
            connections: self.registry.connection_count(),
            rooms: self.registry.room_count(),
            reminders_terminal: self.ledger.terminal_count(),
        }
    }

    /// Axum router serving the WebSocket, health, and session endpoints
    pub fn router(self: &Arc<Self>) -> Router {
        routes::router(Arc::clone(self))
    }

    /// Socket handling entry point
    #[must_use]
    pub const fn sockets(&self) -> &LiveSocketManager {
        &self.sockets
    }

    /// Credential verifier shared with the HTTP surface
    #[must_use]
    pub fn authenticator(&self) -> &dyn Authenticator {
        self.authenticator.as_ref()
    }

    /// Connection registry
    #[must_use]
    pub const fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Reminder ledger
    #[must_use]
    pub const fn ledger(&self) -> &Arc<ReminderLedger> {
        &self.ledger
    }

    /// Reminder scheduler, for driving ticks directly
    #[must_use]
    pub const fn scheduler(&self) -> &Arc<ReminderScheduler> {
        &self.scheduler
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &LiveConfig {
        &self.config
    }

    async fn require_trainer(&self, actor: &UserId, session_id: &SessionId) -> AppResult<Session> {
        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Session {session_id}")))?;
        if session.trainer_id != *actor {
            return Err(AppError::permission_denied(
                "Only the session's trainer can change it",
            ));
        }
        Ok(session)
    }
}
