// ABOUTME: Health check route exposing live connection and ledger counters
// ABOUTME: Used by load balancers and operators to confirm the service is running
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use crate::service::LiveService;
use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;

/// Health routes implementation
pub struct HealthRoutes;

impl HealthRoutes {
    /// Create the `/health` route
    pub fn routes(service: Arc<LiveService>) -> Router {
        Router::new()
            .route("/health", get(Self::health_handler))
            .with_state(service)
    }

    async fn health_handler(State(service): State<Arc<LiveService>>) -> Json<Value> {
        let snapshot = service.health();
        Json(json!({
            "status": snapshot.status,
            "connections": snapshot.connections,
            "rooms": snapshot.rooms,
            "remindersTerminal": snapshot.reminders_terminal,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }))
    }
}
