// ABOUTME: Reminder ledger deduplicating sends per (session, tier)
// ABOUTME: Per-key claims under the map entry lock with RAII in-flight guards
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Reminder Ledger
//!
//! Every state change for a key happens while holding that key's `DashMap`
//! entry lock, which gives single-writer semantics per (session, tier).
//! [`ReminderLedger::upsert_attempt`] additionally marks the key in flight
//! until the returned [`AttemptGuard`] drops, so two overlapping dispatches
//! for the same key cannot both proceed. Retries advance the held claim with
//! [`ReminderLedger::advance_attempt`] instead of releasing it.
//!
//! [`ReminderLedger::clear_session`] leaves a closed marker behind. A dispatch
//! that was already running for that session cannot recreate its records.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use fitpro_core::models::{
    DeliveryChannel, ReminderRecord, ReminderState, ReminderTier, SessionId,
};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Composite ledger key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReminderKey {
    /// Session the reminder belongs to
    pub session_id: SessionId,
    /// Tier name
    pub tier: String,
}

impl ReminderKey {
    /// Key for a session and tier
    #[must_use]
    pub fn new(session_id: &SessionId, tier: &ReminderTier) -> Self {
        Self {
            session_id: session_id.clone(),
            tier: tier.name().to_owned(),
        }
    }
}

impl fmt::Display for ReminderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.session_id, self.tier)
    }
}

/// Ledger write rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// No record exists for the key
    #[error("no ledger record for {key}")]
    NotFound {
        /// Key that was looked up
        key: String,
    },
    /// The key already reached a terminal state
    #[error("ledger record {key} is already {state:?}")]
    AlreadyTerminal {
        /// Key that was written
        key: String,
        /// Existing terminal state
        state: ReminderState,
    },
}

/// Result of trying to claim a delivery attempt
#[derive(Debug)]
pub enum AttemptClaim {
    /// Caller owns attempt number `attempt` until `guard` drops
    Claimed {
        /// 1-based attempt number
        attempt: u32,
        /// Releases the in-flight mark on drop
        guard: AttemptGuard,
    },
    /// Key is terminal; nothing to do
    Terminal(ReminderState),
    /// Another dispatch holds the key
    InFlight,
    /// Attempt budget used up without a terminal write
    Exhausted,
    /// Session was deleted or closed; no records may be written for it
    SessionClosed,
}

/// Why a held claim cannot move to its next attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptDenied {
    /// Key reached a terminal state
    Terminal(ReminderState),
    /// Attempt budget used up
    Exhausted,
    /// Session was deleted or closed while the claim was held
    SessionClosed,
}

#[derive(Debug)]
struct Slot {
    record: ReminderRecord,
    session_starts_at: DateTime<Utc>,
    in_flight: bool,
}

type Slots = DashMap<ReminderKey, Slot>;

/// Releases a key's in-flight mark when dropped
#[derive(Debug)]
pub struct AttemptGuard {
    slots: Arc<Slots>,
    key: ReminderKey,
}

impl Drop for AttemptGuard {
    fn drop(&mut self) {
        if let Some(mut slot) = self.slots.get_mut(&self.key) {
            slot.in_flight = false;
        }
    }
}

/// In-memory dedup table of reminder deliveries
#[derive(Debug, Default)]
pub struct ReminderLedger {
    slots: Arc<Slots>,
    closed: DashMap<SessionId, DateTime<Utc>>,
}

impl ReminderLedger {
    /// Create an empty ledger
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current record for a key
    #[must_use]
    pub fn get_record(&self, key: &ReminderKey) -> Option<ReminderRecord> {
        self.slots.get(key).map(|slot| slot.record.clone())
    }

    /// Claim the next attempt for `key`, creating the record on first use
    ///
    /// `session_starts_at` is kept with the record so [`Self::sweep_expired`]
    /// can collect it once the session is long past.
    pub fn upsert_attempt(
        &self,
        key: &ReminderKey,
        session_starts_at: DateTime<Utc>,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> AttemptClaim {
        let entry = self.slots.entry(key.clone());
        // Checked under the entry lock, which orders it against the marker
        // write and retain pass in clear_session
        if self.closed.contains_key(&key.session_id) {
            return AttemptClaim::SessionClosed;
        }
        let mut slot = entry.or_insert_with(|| Slot {
            record: ReminderRecord {
                session_id: key.session_id.clone(),
                tier: key.tier.clone(),
                state: ReminderState::Attempted,
                delivery_channel: DeliveryChannel::None,
                attempts: 0,
                sent_at: None,
                last_attempt_at: None,
                last_error: None,
            },
            session_starts_at,
            in_flight: false,
        });

        if slot.record.state.is_terminal() {
            return AttemptClaim::Terminal(slot.record.state);
        }
        if slot.in_flight {
            return AttemptClaim::InFlight;
        }
        if slot.record.attempts >= max_attempts {
            return AttemptClaim::Exhausted;
        }

        slot.record.attempts += 1;
        slot.record.last_attempt_at = Some(now);
        slot.in_flight = true;
        let attempt = slot.record.attempts;
        drop(slot);

        AttemptClaim::Claimed {
            attempt,
            guard: AttemptGuard {
                slots: Arc::clone(&self.slots),
                key: key.clone(),
            },
        }
    }

    /// Move a held claim to its next attempt without releasing it
    ///
    /// # Errors
    ///
    /// Returns why the key cannot be retried; a record removed by
    /// [`Self::clear_session`] reports `SessionClosed`
    pub fn advance_attempt(
        &self,
        guard: &AttemptGuard,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<u32, AttemptDenied> {
        if self.closed.contains_key(&guard.key.session_id) {
            return Err(AttemptDenied::SessionClosed);
        }
        let mut slot = self
            .slots
            .get_mut(&guard.key)
            .ok_or(AttemptDenied::SessionClosed)?;
        if slot.record.state.is_terminal() {
            return Err(AttemptDenied::Terminal(slot.record.state));
        }
        if slot.record.attempts >= max_attempts {
            return Err(AttemptDenied::Exhausted);
        }
        slot.record.attempts += 1;
        slot.record.last_attempt_at = Some(now);
        Ok(slot.record.attempts)
    }

    /// Record a successful delivery
    ///
    /// # Errors
    ///
    /// Returns `NotFound` without a prior attempt and `AlreadyTerminal` if the
    /// key already reached a terminal state
    pub fn mark_sent(
        &self,
        key: &ReminderKey,
        channel: DeliveryChannel,
        now: DateTime<Utc>,
    ) -> Result<ReminderRecord, LedgerError> {
        self.finish(key, |record| {
            record.state = ReminderState::Sent;
            record.delivery_channel = channel;
            record.sent_at = Some(now);
            record.last_error = None;
        })
    }

    /// Note a failed attempt; the key stays `Attempted`
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `AlreadyTerminal`
    pub fn record_failure(&self, key: &ReminderKey, error: &str) -> Result<u32, LedgerError> {
        let mut slot = self.slots.get_mut(key).ok_or_else(|| LedgerError::NotFound {
            key: key.to_string(),
        })?;
        if slot.record.state.is_terminal() {
            return Err(LedgerError::AlreadyTerminal {
                key: key.to_string(),
                state: slot.record.state,
            });
        }
        slot.record.last_error = Some(error.to_owned());
        Ok(slot.record.attempts)
    }

    /// Give up on a key for good
    ///
    /// # Errors
    ///
    /// Returns `AlreadyTerminal` if the key already reached a terminal state
    pub fn mark_failed_permanent(
        &self,
        key: &ReminderKey,
        reason: &str,
    ) -> Result<ReminderRecord, LedgerError> {
        self.finish(key, |record| {
            record.state = ReminderState::FailedPermanent;
            record.delivery_channel = DeliveryChannel::None;
            record.last_error = Some(reason.to_owned());
        })
    }

    /// Close a session and drop every record it owns; returns how many went
    ///
    /// Later claims for the session get `SessionClosed` until the marker
    /// ages out in [`Self::sweep_expired`].
    pub fn clear_session(&self, session_id: &SessionId) -> usize {
        self.closed.insert(session_id.clone(), Utc::now());
        let mut removed = 0;
        self.slots.retain(|key, _| {
            let keep = key.session_id != *session_id;
            if !keep {
                removed += 1;
            }
            keep
        });
        if removed > 0 {
            debug!(session_id = %session_id, removed, "Cleared ledger records");
        }
        removed
    }

    /// Whether [`Self::clear_session`] closed this session
    #[must_use]
    pub fn is_session_closed(&self, session_id: &SessionId) -> bool {
        self.closed.contains_key(session_id)
    }

    /// Collect records for sessions that started before `cutoff`
    ///
    /// Closed markers older than `cutoff` go too. In-flight keys are kept.
    /// Returns how many records were removed.
    pub fn sweep_expired(&self, cutoff: DateTime<Utc>) -> usize {
        let mut removed = 0;
        self.slots.retain(|_, slot| {
            let keep = slot.in_flight || slot.session_starts_at >= cutoff;
            if !keep {
                removed += 1;
            }
            keep
        });
        self.closed.retain(|_, closed_at| *closed_at >= cutoff);
        if removed > 0 {
            debug!(removed, cutoff = %cutoff, "Swept expired ledger records");
        }
        removed
    }

    /// Records currently held
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the ledger holds no records
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Records in a terminal state
    #[must_use]
    pub fn terminal_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.record.state.is_terminal())
            .count()
    }

    /// All records for a session, ordered by tier name
    #[must_use]
    pub fn records_for(&self, session_id: &SessionId) -> Vec<ReminderRecord> {
        let mut records: Vec<ReminderRecord> = self
            .slots
            .iter()
            .filter(|slot| slot.key().session_id == *session_id)
            .map(|slot| slot.record.clone())
            .collect();
        records.sort_by(|a, b| a.tier.cmp(&b.tier));
        records
    }

    fn finish(
        &self,
        key: &ReminderKey,
        apply: impl FnOnce(&mut ReminderRecord),
    ) -> Result<ReminderRecord, LedgerError> {
        let mut slot = self.slots.get_mut(key).ok_or_else(|| LedgerError::NotFound {
            key: key.to_string(),
        })?;
        if slot.record.state.is_terminal() {
            return Err(LedgerError::AlreadyTerminal {
                key: key.to_string(),
                state: slot.record.state,
            });
        }
        apply(&mut slot.record);
        Ok(slot.record.clone())
    }
}
