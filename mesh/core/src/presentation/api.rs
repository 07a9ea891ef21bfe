// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;

use crate::application::dispatcher::Dispatcher;
use crate::application::federation_manager::FederationManager;

pub struct AppState {
    pub dispatcher: Dispatcher,
    pub federation: Arc<FederationManager>,
}

pub fn app(dispatcher: Dispatcher, federation: Arc<FederationManager>) -> Router {
    let state = Arc::new(AppState {
        dispatcher,
        federation,
    });

    Router::new()
        .route("/envelope", post(handle_envelope))
        .route("/health", get(health))
        .route("/agents", get(list_agents))
        .route("/federation/stats", get(federation_stats))
        .route("/federation/health", get(federation_health))
        .with_state(state)
}

/// The single control-plane ingress: one signed envelope per request.
async fn handle_envelope(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> impl IntoResponse {
    match state.dispatcher.dispatch(&body).await {
        Ok(ack) => (StatusCode::OK, Json(ack)),
        Err(e) => {
            let status =
                StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(json!({ "error": e.to_string() })))
        }
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn list_agents(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let agents = state.federation.registry().list_agents().await;
    Json(json!({ "agents": agents }))
}

async fn federation_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.federation.federation_stats().await)
}

async fn federation_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.federation.overall_federation_health().await)
}
