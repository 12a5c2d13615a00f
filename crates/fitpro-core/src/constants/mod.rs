// ABOUTME: Constants module with domain-separated organization
// ABOUTME: Scheduler, registry, and retry defaults plus WebSocket close codes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Constants grouped by domain

/// Documented defaults for the live-session configuration set
pub mod defaults {
    /// Reminder tiers, as lead times before the session start
    pub const REMINDER_TIERS: &[&str] = &["24h", "1h", "15m"];

    /// Scheduler tick interval in seconds
    pub const SCHEDULER_TICK_SECS: u64 = 60;

    /// Connections silent for longer than this are evicted
    pub const HEARTBEAT_TIMEOUT_SECS: u64 = 90;

    /// Delivery attempts per (session, tier) before giving up
    pub const MAX_DISPATCH_ATTEMPTS: u32 = 3;

    /// First retry delay in milliseconds; doubles per attempt
    pub const RETRY_BASE_MS: u64 = 500;

    /// Upper bound on a single retry delay in milliseconds
    pub const RETRY_MAX_MS: u64 = 30_000;

    /// Per-connection outbound queue length
    pub const OUTBOUND_QUEUE_CAPACITY: usize = 64;

    /// How long in-flight dispatch may drain on shutdown
    pub const SHUTDOWN_GRACE_SECS: u64 = 10;

    /// Sessions dispatched concurrently within one tick
    pub const DISPATCH_CONCURRENCY: usize = 8;

    /// HTTP listen port
    pub const HTTP_PORT: u16 = 5000;
}

/// WebSocket close codes (RFC 6455)
pub mod close_codes {
    /// Normal closure
    pub const NORMAL: u16 = 1000;
    /// Peer went away; used for heartbeat timeouts
    pub const GOING_AWAY: u16 = 1001;
    /// Frame type the protocol does not accept (binary frames)
    pub const UNSUPPORTED_DATA: u16 = 1003;
    /// Payload is not valid for the protocol
    pub const INVALID_PAYLOAD: u16 = 1007;
    /// Policy violation, used for unauthenticated frames
    pub const POLICY_VIOLATION: u16 = 1008;
    /// Server overloaded; used for slow consumers
    pub const TRY_AGAIN_LATER: u16 = 1013;
}

/// Size limits
pub mod limits {
    /// Hex digits in an object reference
    pub const OBJECT_REF_LEN: usize = 24;

    /// Longest chat text accepted from a client
    pub const MAX_CHAT_TEXT_LEN: usize = 2_000;
}

/// Service identification for logs
pub mod service_names {
    /// Live-session server
    pub const FITPRO_LIVE_SERVER: &str = "fitpro-live-server";
}
