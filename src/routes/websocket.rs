// ABOUTME: WebSocket route handler for live-session clients
// ABOUTME: Upgrades the HTTP connection and hands the socket to the live socket manager
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use crate::service::LiveService;
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use std::sync::Arc;
use tracing::{debug, info};

/// WebSocket routes implementation
pub struct WebSocketRoutes;

impl WebSocketRoutes {
    /// Create the `/ws` route
    pub fn routes(service: Arc<LiveService>) -> Router {
        Router::new()
            .route("/ws", get(Self::handle_websocket))
            .with_state(service)
    }

    async fn handle_websocket(
        ws: WebSocketUpgrade,
        State(service): State<Arc<LiveService>>,
    ) -> impl IntoResponse {
        info!("New WebSocket connection request");

        ws.on_upgrade(move |socket: WebSocket| async move {
            debug!("WebSocket upgraded, delegating to socket manager");
            service.sockets().handle_connection(socket).await;
        })
    }
}
