// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! The `/api/wake` endpoint.
//!
//! Conditionally mounted. Authenticates via the shared secret, then runs
//! the single-flight check through the session manager: at most one live
//! invocation per node, concurrent wake POSTs get `already_active`.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::session::{BeginOutcome, SessionManager};
use crate::infrastructure::db::Database;
use crate::infrastructure::invoker::{Invoker, WakePayload};
use crate::infrastructure::repositories::SdkSessionRepository;
use crate::infrastructure::transport::HEADER_WAKE_SECRET;

pub struct WakeState {
    pub secret: Option<String>,
    pub sessions: Arc<SessionManager>,
    pub invoker: Arc<dyn Invoker>,
    pub db: Database,
    pub session_timeout_minutes: u32,
}

pub fn wake_router(state: Arc<WakeState>) -> Router {
    Router::new()
        .route("/api/wake", post(wake))
        .with_state(state)
}

async fn wake(State(state): State<Arc<WakeState>>, headers: HeaderMap, body: Bytes) -> Response {
    if let Some(secret) = &state.secret {
        let presented = headers.get(HEADER_WAKE_SECRET).and_then(|v| v.to_str().ok());
        if presented != Some(secret.as_str()) {
            return (
                StatusCode::FORBIDDEN,
                Json(json!({
                    "status": "error",
                    "detail": "invalid or missing X-Wake-Secret header",
                })),
            )
                .into_response();
        }
    }

    let payload: WakePayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({
                    "status": "error",
                    "detail": format!("invalid wake payload: {e}"),
                })),
            )
                .into_response()
        }
    };

    match state.sessions.try_begin(Some(payload.swarm_id.clone())).await {
        Ok(BeginOutcome::AlreadyActive(session_id)) => {
            info!(session = %session_id, message_id = %payload.message_id,
                  "agent already active, skipping invocation");
            (
                StatusCode::OK,
                Json(json!({ "status": "already_active" })),
            )
                .into_response()
        }
        Ok(BeginOutcome::Started(session_id)) => {
            // Conversation continuity for the sdk method: resume the last
            // runtime session with this peer when it is recent enough.
            let resume = match Uuid::parse_str(&payload.swarm_id) {
                Ok(swarm_id) => SdkSessionRepository::new(state.db.clone())
                    .lookup(
                        swarm_id,
                        &payload.sender_id,
                        state.session_timeout_minutes as i64,
                    )
                    .await
                    .unwrap_or(None),
                Err(_) => None,
            };
            // Fire-and-forget: the response never waits on the invoker.
            // A failed invocation is logged and releases the session so
            // the next wake can start fresh.
            info!(session = %session_id, method = state.invoker.method(),
                  message_id = %payload.message_id, "agent invocation dispatched");
            let background = state.clone();
            tokio::spawn(async move {
                if let Err(e) = background
                    .invoker
                    .invoke(&payload, resume.as_deref())
                    .await
                {
                    warn!(error = %e, message_id = %payload.message_id,
                          "invoker failed, releasing session");
                    if let Err(end_err) = background.sessions.end().await {
                        warn!(error = %end_err, "failed to release session");
                    }
                }
            });
            (StatusCode::OK, Json(json!({ "status": "invoked" }))).into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "status": "error", "detail": e.to_string() })),
        )
            .into_response(),
    }
}
