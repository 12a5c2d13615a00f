// ABOUTME: Delivery error types for realtime and email reminder channels
// ABOUTME: Separates retryable transient failures from permanent ones
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use crate::models::DeliveryChannel;

/// Failure to hand a reminder to a delivery channel
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// Network hiccup or overloaded collaborator; retried with backoff
    #[error("transient {channel} delivery failure: {reason}")]
    Transient {
        /// Channel that failed
        channel: DeliveryChannel,
        /// Failure detail
        reason: String,
    },

    /// Invalid recipient or rejected message; never retried
    #[error("permanent {channel} delivery failure: {reason}")]
    Permanent {
        /// Channel that failed
        channel: DeliveryChannel,
        /// Failure detail
        reason: String,
    },
}

impl DeliveryError {
    /// Build a transient failure
    #[must_use]
    pub fn transient(channel: DeliveryChannel, reason: impl Into<String>) -> Self {
        Self::Transient {
            channel,
            reason: reason.into(),
        }
    }

    /// Build a permanent failure
    #[must_use]
    pub fn permanent(channel: DeliveryChannel, reason: impl Into<String>) -> Self {
        Self::Permanent {
            channel,
            reason: reason.into(),
        }
    }

    /// Whether another attempt may succeed
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}
