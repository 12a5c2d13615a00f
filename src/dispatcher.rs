// ABOUTME: Notification dispatcher delivering reminders realtime-first with email fallback
// ABOUTME: Retries transient failures with exponential backoff bounded by the ledger attempt count
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use crate::config::RetryPolicy;
use crate::email::{reminder_email, EmailSender};
use crate::ledger::{AttemptClaim, AttemptDenied, ReminderKey, ReminderLedger};
use crate::registry::ConnectionRegistry;
use crate::websocket::protocol::ServerMessage;
use chrono::Utc;
use fitpro_core::errors::DeliveryError;
use fitpro_core::models::{DeliveryChannel, ReminderTier, Session, UserId};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// How one `deliver` call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Reminder reached recipients; email if any recipient needed the fallback
    Sent(DeliveryChannel),
    /// Tier marked failed-permanent
    FailedPermanent,
    /// Tier was already terminal; nothing sent
    AlreadyTerminal,
    /// Another dispatch owns the tier right now
    InFlight,
    /// Session was deleted or closed before or during delivery
    SessionClosed,
}

/// Delivers reminders through the registry or the email collaborator
///
/// Holds no retry state of its own; attempt numbers come from the ledger.
pub struct NotificationDispatcher {
    registry: Arc<ConnectionRegistry>,
    email: Arc<dyn EmailSender>,
    ledger: Arc<ReminderLedger>,
    retry: RetryPolicy,
}

impl NotificationDispatcher {
    /// Create a dispatcher over its collaborators
    #[must_use]
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        email: Arc<dyn EmailSender>,
        ledger: Arc<ReminderLedger>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            registry,
            email,
            ledger,
            retry,
        }
    }

    /// Deliver `tier`'s reminder for `session` to `targets`
    ///
    /// Writes exactly one terminal ledger update unless the tier was already
    /// terminal, in flight elsewhere, or its session was closed. The claim is
    /// held across retries and delivery stops as soon as the session closes.
    #[allow(clippy::too_many_lines)]
    pub async fn deliver(
        &self,
        session: &Session,
        tier: &ReminderTier,
        targets: &[UserId],
    ) -> DeliveryOutcome {
        let key = ReminderKey::new(&session.id, tier);
        let mut pending: Vec<UserId> = Vec::with_capacity(targets.len());
        for user in targets {
            if !pending.contains(user) {
                pending.push(user.clone());
            }
        }
        let mut reached = 0_usize;
        let mut used_email = false;

        let (mut attempt, guard) = match self.ledger.upsert_attempt(
            &key,
            session.scheduled_at,
            self.retry.max_attempts,
            Utc::now(),
        ) {
            AttemptClaim::Claimed { attempt, guard } => (attempt, guard),
            AttemptClaim::Terminal(state) => {
                debug!(session_id = %session.id, tier = %tier, state = ?state, "Tier already terminal");
                return DeliveryOutcome::AlreadyTerminal;
            }
            AttemptClaim::InFlight => return DeliveryOutcome::InFlight,
            AttemptClaim::Exhausted => return self.give_up(&key, "attempt budget exhausted"),
            AttemptClaim::SessionClosed => return Self::closed(&key, reached),
        };

        if pending.is_empty() {
            return self.give_up(&key, "session has no recipients");
        }

        loop {
            let mut retry_later = Vec::new();
            let mut last_transient = None;
            for user in pending.drain(..) {
                if self.ledger.is_session_closed(&session.id) {
                    return Self::closed(&key, reached);
                }
                match self.deliver_to_user(session, tier, &user).await {
                    Ok(channel) => {
                        reached += 1;
                        used_email |= channel == DeliveryChannel::Email;
                        debug!(
                            session_id = %session.id,
                            tier = %tier,
                            user_id = %user,
                            attempt,
                            channel = %channel,
                            "Reminder delivered"
                        );
                    }
                    Err(e) if e.is_transient() => {
                        warn!(
                            session_id = %session.id,
                            tier = %tier,
                            user_id = %user,
                            attempt,
                            error = %e,
                            "Transient delivery failure"
                        );
                        last_transient = Some(e.to_string());
                        retry_later.push(user);
                    }
                    Err(e) => {
                        error!(
                            session_id = %session.id,
                            tier = %tier,
                            user_id = %user,
                            attempt,
                            error = %e,
                            "Recipient unreachable; not retrying"
                        );
                    }
                }
            }
            pending = retry_later;

            if pending.is_empty() {
                return if reached > 0 {
                    self.complete(&key, used_email)
                } else {
                    self.give_up(&key, "every recipient rejected the reminder")
                };
            }

            let reason = last_transient.unwrap_or_else(|| "transient failure".to_owned());
            if let Err(e) = self.ledger.record_failure(&key, &reason) {
                warn!(session_id = %session.id, tier = %tier, error = %e, "Could not record failure");
                return if self.ledger.is_session_closed(&session.id) {
                    Self::closed(&key, reached)
                } else {
                    DeliveryOutcome::AlreadyTerminal
                };
            }

            if attempt >= self.retry.max_attempts {
                return self.exhausted(&key, attempt, pending.len(), reached, used_email, &reason);
            }

            let delay = self.retry.delay_for(attempt);
            debug!(session_id = %session.id, tier = %tier, attempt, delay_ms = delay.as_millis(), "Backing off before retry");
            tokio::time::sleep(delay).await;

            attempt = match self
                .ledger
                .advance_attempt(&guard, self.retry.max_attempts, Utc::now())
            {
                Ok(next) => next,
                Err(AttemptDenied::SessionClosed) => return Self::closed(&key, reached),
                Err(AttemptDenied::Terminal(state)) => {
                    debug!(session_id = %session.id, tier = %tier, state = ?state, "Tier became terminal during backoff");
                    return DeliveryOutcome::AlreadyTerminal;
                }
                Err(AttemptDenied::Exhausted) => {
                    return self.exhausted(&key, attempt, pending.len(), reached, used_email, &reason);
                }
            };
        }
    }

    async fn deliver_to_user(
        &self,
        session: &Session,
        tier: &ReminderTier,
        user: &UserId,
    ) -> Result<DeliveryChannel, DeliveryError> {
        match self
            .registry
            .send_to_user(user, &ServerMessage::reminder(session, tier))
        {
            Ok(true) => return Ok(DeliveryChannel::Realtime),
            Ok(false) => debug!(user_id = %user, "No live connection; using email"),
            Err(e) => warn!(user_id = %user, error = %e, "Realtime send failed; using email"),
        }

        let (subject, body) = reminder_email(session, tier);
        self.email.send(user, &subject, &body).await?;
        Ok(DeliveryChannel::Email)
    }

    fn complete(&self, key: &ReminderKey, used_email: bool) -> DeliveryOutcome {
        let channel = if used_email {
            DeliveryChannel::Email
        } else {
            DeliveryChannel::Realtime
        };
        match self.ledger.mark_sent(key, channel, Utc::now()) {
            Ok(_) => info!(session_id = %key.session_id, tier = %key.tier, channel = %channel, "Reminder sent"),
            Err(e) => warn!(session_id = %key.session_id, tier = %key.tier, error = %e, "Reminder sent but ledger write failed"),
        }
        DeliveryOutcome::Sent(channel)
    }

    fn exhausted(
        &self,
        key: &ReminderKey,
        attempt: u32,
        unreached: usize,
        reached: usize,
        used_email: bool,
        reason: &str,
    ) -> DeliveryOutcome {
        warn!(
            session_id = %key.session_id,
            tier = %key.tier,
            attempt,
            unreached,
            "Attempt budget exhausted"
        );
        if reached > 0 {
            self.complete(key, used_email)
        } else {
            self.give_up(key, reason)
        }
    }

    fn closed(key: &ReminderKey, reached: usize) -> DeliveryOutcome {
        info!(
            session_id = %key.session_id,
            tier = %key.tier,
            reached,
            "Session closed; reminder delivery stopped"
        );
        DeliveryOutcome::SessionClosed
    }

    fn give_up(&self, key: &ReminderKey, reason: &str) -> DeliveryOutcome {
        match self.ledger.mark_failed_permanent(key, reason) {
            Ok(_) => error!(
                session_id = %key.session_id,
                tier = %key.tier,
                reason = %reason,
                "Reminder failed permanently"
            ),
            Err(e) => warn!(session_id = %key.session_id, tier = %key.tier, error = %e, "Could not mark reminder failed"),
        }
        DeliveryOutcome::FailedPermanent
    }
}
