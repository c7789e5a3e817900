// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! `/api/wake`: shared-secret auth, body validation, single-flight.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::ServiceExt;

use mesh_core::application::session::SessionManager;
use mesh_core::domain::node_config::InvokerConfig;
use mesh_core::infrastructure::invoker::{AgentInvoker, Invoker, InvokerError, WakePayload};
use mesh_core::presentation::wake_api::{wake_router, WakeState};

mod common;

/// Mock invoker that takes its time and can fail, for asserting the
/// endpoint never waits on the invocation.
struct MockInvoker {
    delay: Duration,
    fail: bool,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Invoker for MockInvoker {
    async fn invoke(
        &self,
        _payload: &WakePayload,
        _resume: Option<&str>,
    ) -> Result<(), InvokerError> {
        tokio::time::sleep(self.delay).await;
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(InvokerError::Spawn("mock invoker failure".into()))
        } else {
            Ok(())
        }
    }

    fn method(&self) -> &'static str {
        "mock"
    }
}

async fn wake_app_with(
    secret: Option<&str>,
    invoker: Arc<dyn Invoker>,
) -> (tempfile::TempDir, Router) {
    let (dir, db) = common::test_db().await;
    let state = Arc::new(WakeState {
        secret: secret.map(str::to_string),
        sessions: Arc::new(SessionManager::new(dir.path().join("session.json"), 30)),
        invoker,
        db,
        session_timeout_minutes: 30,
    });
    (dir, wake_router(state))
}

async fn wake_app(secret: Option<&str>) -> (tempfile::TempDir, Router) {
    wake_app_with(
        secret,
        Arc::new(AgentInvoker::new(InvokerConfig::Noop).unwrap()),
    )
    .await
}

fn wake_request(secret: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/wake")
        .header("content-type", "application/json");
    if let Some(secret) = secret {
        builder = builder.header("X-Wake-Secret", secret);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn valid_body() -> String {
    serde_json::json!({
        "message_id": uuid::Uuid::new_v4().to_string(),
        "swarm_id": uuid::Uuid::new_v4().to_string(),
        "sender_id": "alice",
        "notification_level": "normal",
    })
    .to_string()
}

async fn status_of(response: axum::response::Response) -> (StatusCode, serde_json::Value) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn secret_is_enforced_when_configured() {
    let (_dir, app) = wake_app(Some("hunter2")).await;

    let response = app
        .clone()
        .oneshot(wake_request(None, &valid_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .clone()
        .oneshot(wake_request(Some("wrong"), &valid_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .clone()
        .oneshot(wake_request(Some("hunter2"), &valid_body()))
        .await
        .unwrap();
    let (status, body) = status_of(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "invoked");
}

#[tokio::test]
async fn malformed_body_is_unprocessable() {
    let (_dir, app) = wake_app(None).await;
    let response = app
        .clone()
        .oneshot(wake_request(None, r#"{"message_id": 7}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn second_wake_within_timeout_is_already_active() {
    let (_dir, app) = wake_app(None).await;

    let (status, body) = status_of(
        app.clone()
            .oneshot(wake_request(None, &valid_body()))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "invoked");

    let (status, body) = status_of(
        app.clone()
            .oneshot(wake_request(None, &valid_body()))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "already_active");
}

#[tokio::test]
async fn slow_invoker_never_delays_the_response() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (_dir, app) = wake_app_with(
        None,
        Arc::new(MockInvoker {
            delay: Duration::from_millis(1500),
            fail: false,
            calls: calls.clone(),
        }),
    )
    .await;

    let started = Instant::now();
    let (status, body) = status_of(
        app.clone()
            .oneshot(wake_request(None, &valid_body()))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "invoked");
    // The invocation runs in the background; the response must not wait
    // out the invoker's 1.5s.
    assert!(
        started.elapsed() < Duration::from_millis(500),
        "wake response took {:?}",
        started.elapsed()
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // The invocation still happens, exactly once.
    tokio::time::sleep(Duration::from_millis(2000)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_background_invocation_releases_the_session() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (_dir, app) = wake_app_with(
        None,
        Arc::new(MockInvoker {
            delay: Duration::from_millis(50),
            fail: true,
            calls: calls.clone(),
        }),
    )
    .await;

    let (status, body) = status_of(
        app.clone()
            .oneshot(wake_request(None, &valid_body()))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "invoked");

    // Once the background failure releases the session, the next wake
    // starts a fresh invocation instead of reporting already_active.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let (status, body) = status_of(
        app.clone()
            .oneshot(wake_request(None, &valid_body()))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "invoked");
}

#[tokio::test]
async fn concurrent_wakes_dispatch_exactly_one_invocation() {
    let (_dir, app) = wake_app(None).await;

    let mut handles = Vec::new();
    for _ in 0..3 {
        let app = app.clone();
        handles.push(tokio::spawn(async move {
            let response = app.oneshot(wake_request(None, &valid_body())).await.unwrap();
            status_of(response).await
        }));
    }

    let mut invoked = 0;
    let mut already_active = 0;
    for handle in handles {
        let (status, body) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        match body["status"].as_str().unwrap() {
            "invoked" => invoked += 1,
            "already_active" => already_active += 1,
            other => panic!("unexpected status {other}"),
        }
    }
    assert_eq!(invoked, 1);
    assert_eq!(already_active, 2);
}
