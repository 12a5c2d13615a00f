// ABOUTME: Core crate entry point for FitPro live-session domain types
// ABOUTME: Re-exports models, error taxonomy, and constants shared by the server crate
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![deny(unsafe_code)]

//! # `FitPro` Core
//!
//! Domain types shared by the live-session server: session records and their
//! foreign-key representations, reminder tiers and ledger records, the error
//! taxonomy, and configuration defaults.

/// Application constants and defaults
pub mod constants;

/// Error taxonomy for delivery, connections, storage, and migration
pub mod errors;

/// Session, identifier, and reminder models
pub mod models;
