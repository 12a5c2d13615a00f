// ABOUTME: Reminder tiers, delivery channels, and ledger records
// ABOUTME: Parses lead-time tiers like "24h" and models per-(session, tier) delivery state
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::ids::SessionId;
use crate::errors::TierParseError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

const SECS_PER_MINUTE: u64 = 60;
const SECS_PER_HOUR: u64 = 3_600;
const SECS_PER_DAY: u64 = 86_400;

/// A named lead-time bucket; at most one reminder per session is sent for it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReminderTier {
    name: String,
    lead: Duration,
}

impl ReminderTier {
    /// Create a tier from a name and lead time
    #[must_use]
    pub fn new(name: impl Into<String>, lead: Duration) -> Self {
        Self {
            name: name.into(),
            lead,
        }
    }

    /// Parse a tier from its compact form: `30s`, `15m`, `1h`, `2d`
    ///
    /// # Errors
    ///
    /// Returns `TierParseError` for a missing or unknown unit, a non-numeric
    /// amount, or a zero lead time
    pub fn parse(raw: &str) -> Result<Self, TierParseError> {
        let compact = raw.trim().to_ascii_lowercase();
        let Some(unit) = compact.chars().last() else {
            return Err(TierParseError::new(raw, "empty tier"));
        };
        let multiplier = match unit {
            's' => 1,
            'm' => SECS_PER_MINUTE,
            'h' => SECS_PER_HOUR,
            'd' => SECS_PER_DAY,
            _ => return Err(TierParseError::new(raw, "unit must be one of s, m, h, d")),
        };
        let amount: u64 = compact[..compact.len() - 1]
            .parse()
            .map_err(|_| TierParseError::new(raw, "amount must be a positive integer"))?;
        if amount == 0 {
            return Err(TierParseError::new(raw, "lead time must be positive"));
        }

        Ok(Self {
            lead: Duration::from_secs(amount.saturating_mul(multiplier)),
            name: compact,
        })
    }

    /// Tier name as sent on the wire and stored in the ledger
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// How long before the session start this tier's window opens
    #[must_use]
    pub const fn lead(&self) -> Duration {
        self.lead
    }

    /// Instant at which this tier becomes due for a session starting at `scheduled_at`
    #[must_use]
    pub fn window_opens_at(&self, scheduled_at: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.lead)
            .ok()
            .and_then(|lead| scheduled_at.checked_sub_signed(lead))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Human readable lead time for notification copy, e.g. "15 minutes"
    #[must_use]
    pub fn label(&self) -> String {
        let secs = self.lead.as_secs();
        let (amount, unit) = if secs % SECS_PER_DAY == 0 {
            (secs / SECS_PER_DAY, "day")
        } else if secs % SECS_PER_HOUR == 0 {
            (secs / SECS_PER_HOUR, "hour")
        } else if secs % SECS_PER_MINUTE == 0 {
            (secs / SECS_PER_MINUTE, "minute")
        } else {
            (secs, "second")
        };
        if amount == 1 {
            format!("1 {unit}")
        } else {
            format!("{amount} {unit}s")
        }
    }

    /// Sort tiers coarsest first (longest lead time first)
    pub fn sort_coarsest_first(tiers: &mut [Self]) {
        tiers.sort_by(|a, b| b.lead.cmp(&a.lead).then_with(|| a.name.cmp(&b.name)));
    }
}

impl fmt::Display for ReminderTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Channel a reminder reached (or failed to reach) its recipients through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryChannel {
    /// Live WebSocket connection
    Realtime,
    /// Email fallback
    Email,
    /// No channel reached anyone
    None,
}

impl fmt::Display for DeliveryChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Realtime => "realtime",
            Self::Email => "email",
            Self::None => "none",
        })
    }
}

/// Ledger state of one (session, tier) key
///
/// A key with no record is pending. `Sent` and `FailedPermanent` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReminderState {
    /// At least one attempt made, none succeeded yet
    Attempted,
    /// Delivered through some channel
    Sent,
    /// Given up; never retried
    FailedPermanent,
}

impl ReminderState {
    /// Terminal states end all delivery attempts for the key
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Sent | Self::FailedPermanent)
    }
}

/// Dedup record for one (session, tier) reminder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderRecord {
    /// Owning session
    pub session_id: SessionId,
    /// Tier name
    pub tier: String,
    /// Current state
    pub state: ReminderState,
    /// Channel used by the terminal outcome, `None` until then
    pub delivery_channel: DeliveryChannel,
    /// Attempts made so far
    pub attempts: u32,
    /// When the reminder was delivered
    pub sent_at: Option<DateTime<Utc>>,
    /// When the latest attempt started
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Reason for the latest failure
    pub last_error: Option<String>,
}
