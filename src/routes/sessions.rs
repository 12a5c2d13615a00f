// ABOUTME: Trainer-facing session lifecycle routes
// ABOUTME: Status transitions broadcast to the session room; deletion cascades to the reminder ledger
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use crate::service::{LiveService, StatusChange};
use axum::{
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    routing::{delete, put},
    Json, Router,
};
use fitpro_core::errors::{AppResult, AuthError};
use fitpro_core::models::{SessionId, SessionStatus, UserId};
use serde::Deserialize;
use std::sync::Arc;

/// Body of a status change request
#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    /// Requested status
    pub status: SessionStatus,
}

/// Session routes implementation
pub struct SessionRoutes;

impl SessionRoutes {
    /// Create the session lifecycle routes
    pub fn routes(service: Arc<LiveService>) -> Router {
        Router::new()
            .route("/api/sessions/:id/status", put(Self::update_status))
            .route("/api/sessions/:id", delete(Self::delete_session))
            .with_state(service)
    }

    async fn update_status(
        State(service): State<Arc<LiveService>>,
        Path(id): Path<String>,
        headers: HeaderMap,
        Json(request): Json<StatusUpdateRequest>,
    ) -> AppResult<Json<StatusChange>> {
        let actor = authenticate(&service, &headers)?;
        let change = service
            .transition_session(&actor, &SessionId::new(id), request.status)
            .await?;
        Ok(Json(change))
    }

    async fn delete_session(
        State(service): State<Arc<LiveService>>,
        Path(id): Path<String>,
        headers: HeaderMap,
    ) -> AppResult<StatusCode> {
        let actor = authenticate(&service, &headers)?;
        service.delete_session(&actor, &SessionId::new(id)).await?;
        Ok(StatusCode::NO_CONTENT)
    }
}

fn authenticate(service: &LiveService, headers: &HeaderMap) -> AppResult<UserId> {
    let credential = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(AuthError::MissingCredential)?;
    Ok(service.authenticator().authenticate(credential)?)
}
