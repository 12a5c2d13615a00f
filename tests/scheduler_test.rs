// ABOUTME: Integration tests for the reminder scheduler, dispatcher, and ledger working together
// ABOUTME: Covers window entry, catch-up, stale suppression, dedup across ticks, and retry exhaustion
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use chrono::Duration;
use common::{
    before, client, fast_retry, init_test_logging, permanent, session, t0, tier, trainer,
    transient, RecordingEmailSender,
};
use fitpro_core::models::{DeliveryChannel, ReminderState, SessionId};
use fitpro_live::config::{LiveConfig, RetryPolicy};
use fitpro_live::dispatcher::NotificationDispatcher;
use fitpro_live::email::EmailSender;
use fitpro_live::ledger::{ReminderKey, ReminderLedger};
use fitpro_live::registry::{ConnectionRegistry, SocketHandle};
use fitpro_live::scheduler::ReminderScheduler;
use fitpro_live::store::{InMemorySessionStore, SessionStore};
use fitpro_live::websocket::protocol::ServerMessage;
use std::sync::Arc;

struct Harness {
    store: Arc<InMemorySessionStore>,
    registry: Arc<ConnectionRegistry>,
    ledger: Arc<ReminderLedger>,
    email: Arc<RecordingEmailSender>,
    retry: RetryPolicy,
}

impl Harness {
    fn new(retry: RetryPolicy) -> Self {
        init_test_logging();
        Self {
            store: Arc::new(InMemorySessionStore::new()),
            registry: Arc::new(ConnectionRegistry::new(std::time::Duration::from_secs(90))),
            ledger: Arc::new(ReminderLedger::new()),
            email: Arc::new(RecordingEmailSender::new()),
            retry,
        }
    }

    /// A fresh scheduler over the shared store, registry, and ledger
    fn scheduler(&self) -> ReminderScheduler {
        let dispatcher = Arc::new(NotificationDispatcher::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.email) as Arc<dyn EmailSender>,
            Arc::clone(&self.ledger),
            self.retry,
        ));
        let config = LiveConfig::default();
        ReminderScheduler::new(
            Arc::clone(&self.store) as Arc<dyn SessionStore>,
            dispatcher,
            Arc::clone(&self.ledger),
            config.reminder_tiers,
            config.tick_interval,
            config.dispatch_concurrency,
        )
    }

    fn record(&self, session_id: &str, tier_name: &str) -> Option<fitpro_core::models::ReminderRecord> {
        self.ledger
            .get_record(&ReminderKey::new(&SessionId::new(session_id), &tier(tier_name)))
    }
}

#[tokio::test]
async fn test_entering_24h_window_sends_by_email_once() {
    let h = Harness::new(fast_retry(3));
    let start = t0() + Duration::hours(24);
    h.store.insert_session(&session("s", start)).await;
    let scheduler = h.scheduler();

    // 23h59m before start: only the 24h window is open
    let report = scheduler.tick(t0() + Duration::minutes(1)).await;
    assert_eq!(report.sessions_scanned, 1);
    assert_eq!(report.tiers_due, 1);
    assert_eq!(report.sent, 1);

    let record = h.record("s", "24h").unwrap();
    assert_eq!(record.state, ReminderState::Sent);
    assert_eq!(record.delivery_channel, DeliveryChannel::Email);
    assert_eq!(record.attempts, 1);
    assert_eq!(h.email.sent_to(&trainer()).len(), 1);
    assert_eq!(h.email.sent_to(&client()).len(), 1);

    // One minute later the 24h tier must not go out again
    let report = scheduler.tick(t0() + Duration::minutes(2)).await;
    assert_eq!(report.tiers_due, 0);
    assert_eq!(h.email.sent().len(), 2);
    assert!(h.record("s", "1h").is_none());
}

#[tokio::test]
async fn test_catch_up_sends_every_open_tier_coarsest_first() {
    let h = Harness::new(fast_retry(3));
    let start = t0() + Duration::minutes(10);
    h.store.insert_session(&session("s", start)).await;

    let report = h.scheduler().tick(t0()).await;
    assert_eq!(report.tiers_due, 3);
    assert_eq!(report.sent, 3);

    let subjects: Vec<String> = h
        .email
        .sent_to(&trainer())
        .into_iter()
        .map(|e| e.subject)
        .collect();
    assert_eq!(subjects.len(), 3);
    assert!(subjects[0].ends_with("starts in 1 day"));
    assert!(subjects[1].ends_with("starts in 1 hour"));
    assert!(subjects[2].ends_with("starts in 15 minutes"));
}

#[tokio::test]
async fn test_sessions_that_already_started_get_nothing() {
    let h = Harness::new(fast_retry(3));
    h.store
        .insert_session(&session("started", before(t0(), 5)))
        .await;

    let report = h.scheduler().tick(t0()).await;
    assert_eq!(report.sessions_scanned, 0);
    assert_eq!(report.tiers_due, 0);
    assert!(h.email.sent().is_empty());
    assert!(h.record("started", "15m").is_none());
}

#[tokio::test]
async fn test_restarted_scheduler_never_resends_sent_tiers() {
    let h = Harness::new(fast_retry(3));
    let start = t0() + Duration::hours(2);
    h.store.insert_session(&session("s", start)).await;

    // 30 minutes before start: 24h and 1h are open
    let report = h.scheduler().tick(before(start, 30)).await;
    assert_eq!(report.sent, 2);

    // Simulated outage, then a new scheduler instance over the same ledger
    let restarted = h.scheduler();
    let report = restarted.tick(before(start, 10)).await;
    assert_eq!(report.tiers_due, 1);
    assert_eq!(report.sent, 1);

    assert_eq!(h.email.sent_to(&trainer()).len(), 3);
    assert_eq!(h.email.sent_to(&client()).len(), 3);
    for name in ["24h", "1h", "15m"] {
        assert_eq!(h.record("s", name).unwrap().state, ReminderState::Sent);
    }
}

#[tokio::test]
async fn test_connected_users_get_realtime_reminders() {
    let h = Harness::new(fast_retry(3));
    let start = t0() + Duration::minutes(50);
    h.store.insert_session(&session("s", start)).await;

    let (trainer_handle, mut trainer_socket) = SocketHandle::channel(8);
    let (client_handle, mut client_socket) = SocketHandle::channel(8);
    h.registry.register(trainer(), trainer_handle).unwrap();
    h.registry.register(client(), client_handle).unwrap();

    let report = h.scheduler().tick(t0()).await;
    assert_eq!(report.sent, 2);
    assert!(h.email.sent().is_empty());
    assert_eq!(
        h.record("s", "1h").unwrap().delivery_channel,
        DeliveryChannel::Realtime
    );

    for socket in [&mut trainer_socket, &mut client_socket] {
        let mut tiers = Vec::new();
        while let Ok(ServerMessage::Reminder { tier, session_id, .. }) =
            socket.outbound.try_recv()
        {
            assert_eq!(session_id.as_str(), "s");
            tiers.push(tier);
        }
        assert_eq!(tiers, ["24h", "1h"]);
    }
}

#[tokio::test]
async fn test_offline_recipient_falls_back_to_email() {
    let h = Harness::new(fast_retry(3));
    let start = t0() + Duration::hours(12);
    h.store.insert_session(&session("s", start)).await;
    let (client_handle, mut client_socket) = SocketHandle::channel(8);
    h.registry.register(client(), client_handle).unwrap();

    h.scheduler().tick(t0()).await;

    assert!(matches!(
        client_socket.outbound.try_recv(),
        Ok(ServerMessage::Reminder { .. })
    ));
    assert!(h.email.sent_to(&client()).is_empty());
    assert_eq!(h.email.sent_to(&trainer()).len(), 1);
    assert_eq!(
        h.record("s", "24h").unwrap().delivery_channel,
        DeliveryChannel::Email
    );
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_exhaust_to_failed_permanent() {
    let h = Harness::new(fast_retry(3));
    let start = t0() + Duration::hours(20);
    h.store.insert_session(&session("s", start)).await;
    h.email.fail_always(transient("relay timeout"));
    let scheduler = h.scheduler();

    let report = scheduler.tick(t0()).await;
    assert_eq!(report.failed_permanent, 1);

    let record = h.record("s", "24h").unwrap();
    assert_eq!(record.state, ReminderState::FailedPermanent);
    assert_eq!(record.delivery_channel, DeliveryChannel::None);
    assert_eq!(record.attempts, 3);
    assert_eq!(h.email.calls(), 6);

    // Never retried again
    let report = scheduler.tick(t0() + Duration::minutes(1)).await;
    assert_eq!(report.tiers_due, 0);
    assert_eq!(h.email.calls(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_retry_only_resends_to_unreached_recipients() {
    let h = Harness::new(fast_retry(3));
    let start = t0() + Duration::hours(20);
    h.store.insert_session(&session("s", start)).await;
    h.email.fail_next(transient("relay busy"));

    let report = h.scheduler().tick(t0()).await;
    assert_eq!(report.sent, 1);

    let record = h.record("s", "24h").unwrap();
    assert_eq!(record.state, ReminderState::Sent);
    assert_eq!(record.attempts, 2);
    assert_eq!(h.email.sent_to(&trainer()).len(), 1);
    assert_eq!(h.email.sent_to(&client()).len(), 1);
}

#[tokio::test]
async fn test_permanent_rejection_is_not_retried() {
    let h = Harness::new(fast_retry(3));
    let start = t0() + Duration::hours(20);
    h.store.insert_session(&session("s", start)).await;
    h.email.fail_always(permanent("mailbox does not exist"));

    let report = h.scheduler().tick(t0()).await;
    assert_eq!(report.failed_permanent, 1);
    let record = h.record("s", "24h").unwrap();
    assert_eq!(record.state, ReminderState::FailedPermanent);
    assert_eq!(record.attempts, 1);
    assert_eq!(h.email.calls(), 2);
}

#[tokio::test]
async fn test_store_outage_is_reported_and_recovers() {
    let h = Harness::new(fast_retry(3));
    h.store
        .insert_session(&session("s", t0() + Duration::hours(1)))
        .await;
    let scheduler = h.scheduler();

    h.store.set_unavailable(true);
    let report = scheduler.tick(t0()).await;
    assert!(report.store_error.is_some());
    assert!(h.email.sent().is_empty());

    h.store.set_unavailable(false);
    let report = scheduler.tick(t0()).await;
    assert!(report.store_error.is_none());
    assert_eq!(report.sent, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_ticks_send_each_tier_once() {
    let h = Harness::new(fast_retry(3));
    for i in 0..10 {
        h.store
            .insert_session(&session(&format!("s{i}"), t0() + Duration::minutes(30 + i)))
            .await;
    }
    let a = h.scheduler();
    let b = h.scheduler();

    let (first, second) = tokio::join!(a.tick(t0()), b.tick(t0()));
    assert_eq!(first.sent + second.sent, 20);

    // 10 sessions x 2 open tiers x 2 recipients
    assert_eq!(h.email.sent().len(), 40);
    assert_eq!(h.ledger.terminal_count(), 20);
}

#[tokio::test]
async fn test_records_of_long_past_sessions_are_swept() {
    let h = Harness::new(fast_retry(3));
    let start = t0() + Duration::minutes(10);
    h.store.insert_session(&session("s", start)).await;
    let scheduler = h.scheduler();

    let report = scheduler.tick(t0()).await;
    assert_eq!(report.sent, 3);
    assert_eq!(report.swept, 0);
    assert_eq!(h.ledger.len(), 3);

    // Still within one lead time of the start: kept
    let report = scheduler.tick(start + Duration::hours(23)).await;
    assert_eq!(report.swept, 0);
    assert_eq!(h.ledger.len(), 3);

    let report = scheduler.tick(start + Duration::hours(25)).await;
    assert_eq!(report.swept, 3);
    assert!(h.ledger.is_empty());
    assert_eq!(h.email.sent().len(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_second_dispatch_during_backoff_is_skipped() {
    let h = Harness::new(fast_retry(3));
    let start = t0() + Duration::hours(20);
    h.store.insert_session(&session("s", start)).await;
    h.email.fail_next(transient("relay busy"));

    let first = Arc::new(h.scheduler());
    let ticking = Arc::clone(&first);
    let tick = tokio::spawn(async move { ticking.tick(t0()).await });

    // First dispatch is in its retry backoff and still owns the tier
    tokio::time::sleep(std::time::Duration::from_millis(3)).await;
    let report = h.scheduler().tick(t0()).await;
    assert_eq!(report.tiers_due, 1);
    assert_eq!(report.skipped, 1);

    let report = tick.await.unwrap();
    assert_eq!(report.sent, 1);
    assert_eq!(h.record("s", "24h").unwrap().attempts, 2);
    assert_eq!(h.email.sent_to(&trainer()).len(), 1);
    assert_eq!(h.email.sent_to(&client()).len(), 1);
}
