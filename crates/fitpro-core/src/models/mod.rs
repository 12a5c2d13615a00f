// ABOUTME: Domain model module for sessions, identifiers, and reminders
// ABOUTME: Groups typed ids, session documents, and reminder ledger records
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

/// Opaque identifier newtypes
pub mod ids;
/// Reminder tiers and ledger records
pub mod reminder;
/// Session records, statuses, and legacy reference forms
pub mod session;

pub use ids::{SessionId, UserId};
pub use reminder::{DeliveryChannel, ReminderRecord, ReminderState, ReminderTier};
pub use session::{ForeignKey, ReferencePatch, Session, SessionDocument, SessionStatus};
