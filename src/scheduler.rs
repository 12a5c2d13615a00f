// ABOUTME: Periodic reminder scheduler scanning upcoming sessions for due tiers
// ABOUTME: Non-overlapping ticks, coarsest-first tier order, and stale-reminder suppression
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Reminder Scheduler
//!
//! Each tick lists upcoming sessions starting within the longest tier lead
//! time and hands every due (session, tier) pair to the dispatcher. A tier is
//! due once its window has opened and the session has not started yet, so
//! the first tick after an outage catches up on every open window while
//! sessions that already began get nothing. Each tick also sweeps ledger
//! records of sessions that started more than the longest lead time ago.

use crate::dispatcher::{DeliveryOutcome, NotificationDispatcher};
use crate::ledger::{ReminderKey, ReminderLedger};
use crate::store::SessionStore;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use fitpro_core::models::{ReminderTier, Session};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Counters from one scheduler tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Sessions returned by the window query
    pub sessions_scanned: usize,
    /// (session, tier) pairs handed to the dispatcher
    pub tiers_due: usize,
    /// Pairs that reached recipients
    pub sent: usize,
    /// Pairs marked failed-permanent
    pub failed_permanent: usize,
    /// Pairs skipped because they were terminal, in flight, or closed
    pub skipped: usize,
    /// Ledger records collected for sessions long past
    pub swept: usize,
    /// Store failure that aborted the tick
    pub store_error: Option<String>,
}

impl TickReport {
    fn record(&mut self, outcome: DeliveryOutcome) {
        match outcome {
            DeliveryOutcome::Sent(_) => self.sent += 1,
            DeliveryOutcome::FailedPermanent => self.failed_permanent += 1,
            DeliveryOutcome::AlreadyTerminal
            | DeliveryOutcome::InFlight
            | DeliveryOutcome::SessionClosed => self.skipped += 1,
        }
    }
}

struct TickGuard<'a>(&'a AtomicBool);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Drives reminder delivery on a fixed interval
pub struct ReminderScheduler {
    store: Arc<dyn SessionStore>,
    dispatcher: Arc<NotificationDispatcher>,
    ledger: Arc<ReminderLedger>,
    tiers: Vec<ReminderTier>,
    tick_interval: Duration,
    concurrency: usize,
    ticking: AtomicBool,
}

impl ReminderScheduler {
    /// Create a scheduler; `tiers` are re-sorted coarsest first
    #[must_use]
    pub fn new(
        store: Arc<dyn SessionStore>,
        dispatcher: Arc<NotificationDispatcher>,
        ledger: Arc<ReminderLedger>,
        mut tiers: Vec<ReminderTier>,
        tick_interval: Duration,
        concurrency: usize,
    ) -> Self {
        ReminderTier::sort_coarsest_first(&mut tiers);
        Self {
            store,
            dispatcher,
            ledger,
            tiers,
            tick_interval,
            concurrency: concurrency.max(1),
            ticking: AtomicBool::new(false),
        }
    }

    /// Run one tick unless another is still in progress
    pub async fn try_tick(&self, now: DateTime<Utc>) -> Option<TickReport> {
        if self
            .ticking
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Previous scheduler tick still running; skipping this one");
            return None;
        }
        let _guard = TickGuard(&self.ticking);
        Some(self.tick(now).await)
    }

    /// Evaluate every upcoming session against every tier at `now`
    pub async fn tick(&self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();
        let Some(max_lead) = self.max_lead() else {
            return report;
        };
        if let Some(cutoff) = now.checked_sub_signed(max_lead) {
            report.swept = self.ledger.sweep_expired(cutoff);
        }
        let Some(horizon) = now.checked_add_signed(max_lead) else {
            return report;
        };

        let sessions = match self
            .store
            .list_upcoming_sessions_in_window(now, horizon)
            .await
        {
            Ok(sessions) => sessions,
            Err(e) => {
                error!(error = %e, "Scheduler tick could not list sessions");
                report.store_error = Some(e.to_string());
                return report;
            }
        };
        report.sessions_scanned = sessions.len();

        let per_session: Vec<Vec<DeliveryOutcome>> = stream::iter(sessions)
            .map(|session| async move { self.process_session(&session, now).await })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for outcome in per_session.into_iter().flatten() {
            report.tiers_due += 1;
            report.record(outcome);
        }

        if report.tiers_due > 0 {
            info!(
                sessions = report.sessions_scanned,
                due = report.tiers_due,
                sent = report.sent,
                failed = report.failed_permanent,
                skipped = report.skipped,
                "Scheduler tick complete"
            );
        } else {
            debug!(sessions = report.sessions_scanned, "Scheduler tick found nothing due");
        }
        report
    }

    /// Tick on the configured interval until `shutdown` flips to true
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            interval_secs = self.tick_interval.as_secs(),
            tiers = self.tiers.len(),
            "Reminder scheduler started"
        );

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    let _ = self.try_tick(Utc::now()).await;
                }
            }
        }
        info!("Reminder scheduler stopped");
    }

    /// Tiers whose window is open for `session` at `now`, coarsest first
    #[must_use]
    pub fn due_tiers(&self, session: &Session, now: DateTime<Utc>) -> Vec<&ReminderTier> {
        if now >= session.scheduled_at {
            return Vec::new();
        }
        self.tiers
            .iter()
            .filter(|tier| now >= tier.window_opens_at(session.scheduled_at))
            .collect()
    }

    async fn process_session(&self, session: &Session, now: DateTime<Utc>) -> Vec<DeliveryOutcome> {
        let recipients = session.recipients();
        let mut outcomes = Vec::new();
        for tier in self.due_tiers(session, now) {
            let key = ReminderKey::new(&session.id, tier);
            if self
                .ledger
                .get_record(&key)
                .is_some_and(|record| record.state.is_terminal())
            {
                continue;
            }
            debug!(session_id = %session.id, tier = %tier, "Reminder tier due");
            let outcome = self.dispatcher.deliver(session, tier, &recipients).await;
            outcomes.push(outcome);
            if outcome == DeliveryOutcome::SessionClosed {
                break;
            }
        }
        outcomes
    }

    fn max_lead(&self) -> Option<chrono::Duration> {
        let max_lead = self.tiers.iter().map(ReminderTier::lead).max()?;
        chrono::Duration::from_std(max_lead).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::email::LogEmailSender;
    use crate::registry::ConnectionRegistry;
    use crate::store::InMemorySessionStore;
    use chrono::TimeZone;
    use fitpro_core::models::{SessionId, SessionStatus, UserId};

    fn scheduler() -> ReminderScheduler {
        let ledger = Arc::new(ReminderLedger::new());
        let dispatcher = Arc::new(NotificationDispatcher::new(
            Arc::new(ConnectionRegistry::new(Duration::from_secs(90))),
            Arc::new(LogEmailSender),
            Arc::clone(&ledger),
            RetryPolicy::default(),
        ));
        let tiers = ["15m", "24h", "1h"]
            .iter()
            .map(|raw| ReminderTier::parse(raw).unwrap())
            .collect();
        ReminderScheduler::new(
            Arc::new(InMemorySessionStore::new()),
            dispatcher,
            ledger,
            tiers,
            Duration::from_secs(60),
            4,
        )
    }

    fn session_at(scheduled_at: DateTime<Utc>) -> Session {
        Session {
            id: SessionId::new("s1"),
            title: "HIIT".into(),
            trainer_id: UserId::new("t"),
            scheduled_at,
            duration_minutes: 45,
            status: SessionStatus::Upcoming,
            meeting_link: String::new(),
            participants: vec![],
        }
    }

    #[test]
    fn test_due_tiers_coarsest_first_and_stale_suppressed() {
        let scheduler = scheduler();
        let start = Utc.with_ymd_and_hms(2025, 3, 2, 18, 0, 0).unwrap();
        let session = session_at(start);
        let names = |now| -> Vec<String> {
            scheduler
                .due_tiers(&session, now)
                .iter()
                .map(|t| t.name().to_owned())
                .collect()
        };

        assert!(names(start - chrono::Duration::hours(25)).is_empty());
        assert_eq!(names(start - chrono::Duration::hours(23)), ["24h"]);
        assert_eq!(
            names(start - chrono::Duration::minutes(10)),
            ["24h", "1h", "15m"]
        );
        assert!(names(start).is_empty());
        assert!(names(start + chrono::Duration::minutes(1)).is_empty());
    }

    #[tokio::test]
    async fn test_try_tick_skips_while_running() {
        let scheduler = scheduler();
        scheduler.ticking.store(true, Ordering::SeqCst);
        assert!(scheduler.try_tick(Utc::now()).await.is_none());
        scheduler.ticking.store(false, Ordering::SeqCst);
        assert!(scheduler.try_tick(Utc::now()).await.is_some());
    }
}
