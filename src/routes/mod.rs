// ABOUTME: Route module organization for the live-session HTTP surface
// ABOUTME: Merges WebSocket, health, and session lifecycle routes behind a trace layer
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

/// Health and status counters
pub mod health;
/// Trainer-facing session status and deletion routes
pub mod sessions;
/// WebSocket upgrade route
pub mod websocket;

pub use health::HealthRoutes;
pub use sessions::SessionRoutes;
pub use websocket::WebSocketRoutes;

use crate::service::LiveService;
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Full application router
pub fn router(service: Arc<LiveService>) -> Router {
    Router::new()
        .merge(WebSocketRoutes::routes(Arc::clone(&service)))
        .merge(HealthRoutes::routes(Arc::clone(&service)))
        .merge(SessionRoutes::routes(service))
        .layer(TraceLayer::new_for_http())
}
