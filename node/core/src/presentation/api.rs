// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! The `/swarm/*` HTTP surface.
//!
//! Every handler runs the same prologue: header gate, rate limit, body
//! parse. Protocol failures are translated into the error envelope
//! `{"error": {"code", "message", "details"}}` with the taxonomy's status.

use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

use crate::application::membership::{JoinOutcome, MembershipOpError, MembershipService};
use crate::application::receive::{ReceiveError, ReceiveService};
use crate::domain::envelope::{wire_timestamp, Envelope};
use crate::domain::error::ErrorCode;
use crate::domain::invite::{JoinAccepted, JoinRequest};
use crate::infrastructure::crypto::verify_join_request;
use crate::infrastructure::db::Database;
use crate::infrastructure::rate_limit::{RateDecision, RateLimiter};
use crate::infrastructure::repositories::InboxRepository;
use crate::infrastructure::transport::{HEADER_AGENT_ID, HEADER_PROTOCOL};

/// Hard ceiling on one inbound request's processing time.
const REQUEST_DEADLINE: Duration = Duration::from_secs(30);

/// Everything the `/swarm/*` handlers need, constructed once at startup.
pub struct AppState {
    pub agent_id: String,
    pub endpoint: String,
    pub public_key_b64: String,
    pub db: Database,
    pub receive: ReceiveService,
    pub membership: Arc<MembershipService>,
    pub message_limiter: RateLimiter,
    pub join_limiter: RateLimiter,
}

pub fn swarm_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/swarm/message", post(receive_message))
        .route("/swarm/join", post(join_swarm))
        .route("/swarm/health", get(health))
        .route("/swarm/info", get(info))
        .with_state(state)
}

/// Wire error envelope with its HTTP status.
#[derive(Debug)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = json!({
            "error": {
                "code": self.code.as_str(),
                "message": self.message,
                "details": self.details,
            }
        });
        (status, Json(body)).into_response()
    }
}

impl From<ReceiveError> for ApiError {
    fn from(err: ReceiveError) -> Self {
        match &err {
            ReceiveError::Envelope(e) => Self::new(ErrorCode::InvalidFormat, e.to_string()),
            ReceiveError::SignatureInvalid | ReceiveError::KeyUnresolvable(_) => {
                Self::new(ErrorCode::InvalidSignature, err.to_string())
            }
            ReceiveError::NotAuthorized(_) => Self::new(ErrorCode::NotAuthorized, err.to_string()),
            ReceiveError::SwarmNotFound(_) => Self::new(ErrorCode::SwarmNotFound, err.to_string()),
            ReceiveError::Store(e) => {
                error!(error = %e, "store failure in receive pipeline");
                Self::internal("store failure")
            }
        }
    }
}

impl From<MembershipOpError> for ApiError {
    fn from(err: MembershipOpError) -> Self {
        match &err {
            MembershipOpError::Authority(e) => Self::new(e.error_code(), e.to_string()),
            MembershipOpError::Token(e) => Self::new(e.error_code(), e.to_string()),
            MembershipOpError::Store(e) => {
                error!(error = %e, "store failure in membership operation");
                Self::internal("store failure")
            }
            MembershipOpError::Transport(e) => Self::internal(e.to_string()),
            MembershipOpError::Remote(e) => Self::internal(e.clone()),
        }
    }
}

fn require_headers(headers: &HeaderMap) -> Result<String, ApiError> {
    let agent_id = headers
        .get(HEADER_AGENT_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::new(ErrorCode::InvalidFormat, "missing X-Agent-ID header"))?;
    headers
        .get(HEADER_PROTOCOL)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::new(ErrorCode::InvalidFormat, "missing X-Swarm-Protocol header"))?;
    Ok(agent_id.to_string())
}

fn rate_limit_headers(decision: &RateDecision) -> [(&'static str, String); 3] {
    [
        ("X-RateLimit-Limit", decision.limit.to_string()),
        ("X-RateLimit-Remaining", decision.remaining.to_string()),
        ("X-RateLimit-Reset", decision.reset_unix.to_string()),
    ]
}

fn rate_limited(decision: &RateDecision) -> Response {
    let error = ApiError::new(ErrorCode::RateLimited, "rate limit exceeded");
    let mut response = error.into_response();
    for (name, value) in rate_limit_headers(decision) {
        if let Ok(value) = value.parse() {
            response.headers_mut().insert(name, value);
        }
    }
    response
}

async fn receive_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let sender = match require_headers(&headers) {
        Ok(sender) => sender,
        Err(e) => return e.into_response(),
    };
    let decision = state.message_limiter.check(&sender);
    if !decision.allowed {
        return rate_limited(&decision);
    }
    let envelope: Envelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            return ApiError::new(ErrorCode::InvalidFormat, format!("malformed envelope: {e}"))
                .into_response()
        }
    };
    let handled = tokio::time::timeout(
        REQUEST_DEADLINE,
        state.receive.handle_message(envelope),
    )
    .await;
    let handled = match handled {
        Ok(result) => result,
        Err(_) => {
            error!("receive pipeline exceeded the request deadline");
            return ApiError::internal("request deadline exceeded").into_response();
        }
    };
    match handled {
        Ok(outcome) => {
            let body = json!({
                "status": "queued",
                "message_id": outcome.message_id.to_string(),
            });
            let mut response = (StatusCode::OK, Json(body)).into_response();
            for (name, value) in rate_limit_headers(&decision) {
                if let Ok(value) = value.parse() {
                    response.headers_mut().insert(name, value);
                }
            }
            response
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}

async fn join_swarm(
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(e) = require_headers(&headers) {
        return e.into_response();
    }
    let client_ip = connect_info
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let decision = state.join_limiter.check(&client_ip);
    if !decision.allowed {
        return rate_limited(&decision);
    }
    let request: JoinRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return ApiError::new(
                ErrorCode::InvalidFormat,
                format!("malformed join request: {e}"),
            )
            .into_response()
        }
    };
    if verify_join_request(&request).is_err() {
        return ApiError::new(
            ErrorCode::InvalidSignature,
            "join request signature verification failed",
        )
        .into_response();
    }
    let handled = tokio::time::timeout(
        REQUEST_DEADLINE,
        state.membership.handle_join(&request),
    )
    .await;
    let handled = match handled {
        Ok(result) => result,
        Err(_) => {
            error!("join handling exceeded the request deadline");
            return ApiError::internal("request deadline exceeded").into_response();
        }
    };
    match handled {
        Ok(JoinOutcome::Accepted(swarm)) | Ok(JoinOutcome::AlreadyMember(swarm)) => {
            let body = JoinAccepted {
                status: "accepted".to_string(),
                swarm_id: swarm.swarm_id,
                swarm_name: Some(swarm.name.clone()),
                members: swarm.members,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Ok(JoinOutcome::Pending { swarm_id }) => {
            let body = json!({
                "status": "pending",
                "swarm_id": swarm_id.to_string(),
                "message": "join request requires master approval",
            });
            (StatusCode::ACCEPTED, Json(body)).into_response()
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}

async fn health(State(state): State<Arc<AppState>>) -> Response {
    let status = match InboxRepository::new(state.db.clone()).count_unread().await {
        Ok(_) => "healthy",
        Err(_) => "degraded",
    };
    let body = json!({
        "status": status,
        "agent_id": state.agent_id,
        "protocol_version": crate::PROTOCOL_VERSION,
        "timestamp": wire_timestamp(&Utc::now()),
    });
    (StatusCode::OK, Json(body)).into_response()
}

async fn info(State(state): State<Arc<AppState>>) -> Response {
    let body = json!({
        "agent_id": state.agent_id,
        "endpoint": state.endpoint,
        "public_key": state.public_key_b64,
        "protocol_version": crate::PROTOCOL_VERSION,
        "capabilities": ["message", "system", "notification"],
    });
    (StatusCode::OK, Json(body)).into_response()
}
