// ABOUTME: Demo data seeding for development startups
// ABOUTME: Creates the default trainer and client accounts and a handful of live sessions
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::InMemorySessionStore;
use chrono::{DateTime, Days, Duration, NaiveTime, Utc};
use fitpro_core::models::{ForeignKey, SessionDocument, SessionId, SessionStatus, UserId};
use tracing::info;

/// Demo trainer account
pub const DEMO_TRAINER_ID: &str = "65a000000000000000000001";
/// Demo client account
pub const DEMO_CLIENT_ID: &str = "65a000000000000000000002";

/// Seed demo accounts and sessions into an empty store
///
/// Four demo sessions: two tomorrow, one the day after,
/// one completed yesterday. The yoga session keeps its trainer reference in
/// the legacy string form so the startup migration pass has work to do.
pub async fn seed_demo_data(store: &InMemorySessionStore, now: DateTime<Utc>) {
    if store.document_count().await > 0 {
        info!("Store already holds sessions; skipping demo seed");
        return;
    }

    let trainer = UserId::new(DEMO_TRAINER_ID);
    let client = UserId::new(DEMO_CLIENT_ID);
    store.insert_user(trainer.clone()).await;
    store.insert_user(client.clone()).await;

    let tomorrow_evening = day_at(now, 1, 18, 0);
    let documents = [
        demo_document(
            "power-yoga",
            "Power Yoga Session",
            ForeignKey::Legacy(format!("ObjectId(\"{DEMO_TRAINER_ID}\")")),
            tomorrow_evening,
            60,
            SessionStatus::Upcoming,
            "https://meet.example.com/yoga1",
            &client,
        ),
        demo_document(
            "hiit-training",
            "HIIT Training",
            ForeignKey::Typed(trainer.clone()),
            day_at(now, 2, 19, 0),
            45,
            SessionStatus::Upcoming,
            "https://meet.example.com/hiit1",
            &client,
        ),
        demo_document(
            "strength-building",
            "Strength Building",
            ForeignKey::Typed(trainer.clone()),
            now.checked_sub_signed(Duration::days(1)).unwrap_or(now),
            50,
            SessionStatus::Completed,
            "https://meet.example.com/strength1",
            &client,
        ),
        demo_document(
            "cardio-bootcamp",
            "Cardio Bootcamp",
            ForeignKey::Typed(trainer),
            tomorrow_evening,
            40,
            SessionStatus::Upcoming,
            "https://meet.example.com/cardio1",
            &client,
        ),
    ];

    let count = documents.len();
    for document in documents {
        store.insert_document(document).await;
    }
    info!("Created {} demo live sessions", count);
}

fn day_at(now: DateTime<Utc>, days_ahead: u64, hour: u32, minute: u32) -> DateTime<Utc> {
    NaiveTime::from_hms_opt(hour, minute, 0)
        .and_then(|time| {
            now.date_naive()
                .checked_add_days(Days::new(days_ahead))
                .map(|date| date.and_time(time).and_utc())
        })
        .unwrap_or(now)
}

#[allow(clippy::too_many_arguments)]
fn demo_document(
    id: &str,
    title: &str,
    trainer: ForeignKey,
    scheduled_at: DateTime<Utc>,
    duration_minutes: u32,
    status: SessionStatus,
    meeting_link: &str,
    client: &UserId,
) -> SessionDocument {
    SessionDocument {
        id: SessionId::new(id),
        title: title.to_owned(),
        trainer,
        scheduled_at,
        duration_minutes,
        status,
        meeting_link: meeting_link.to_owned(),
        participants: vec![ForeignKey::Typed(client.clone())],
    }
}
