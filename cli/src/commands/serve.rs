// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! `mesh serve` - run the node.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;

use mesh_core::application::receive::ReceiveService;
use mesh_core::application::session::SessionManager;
use mesh_core::application::wake_trigger::WakeTrigger;
use mesh_core::infrastructure::invoker::AgentInvoker;
use mesh_core::infrastructure::rate_limit::RateLimiter;
use mesh_core::presentation::api::{swarm_router, AppState};
use mesh_core::presentation::wake_api::{wake_router, WakeState};

use crate::context;

pub async fn run(config_path: &Path) -> Result<()> {
    let services = context::load(config_path).await?;
    let config = &services.config;

    let wake = Arc::new(WakeTrigger::new(
        config.wake_trigger.clone(),
        &config.identity.agent_id,
    ));
    let receive = ReceiveService::new(services.db.clone(), services.transport.clone(), wake);

    let state = Arc::new(AppState {
        agent_id: config.identity.agent_id.clone(),
        endpoint: config.identity.endpoint.clone(),
        public_key_b64: services.keypair.public_key_b64(),
        db: services.db.clone(),
        receive,
        membership: services.membership.clone(),
        message_limiter: RateLimiter::per_minute(config.rate_limit.messages_per_minute),
        join_limiter: RateLimiter::per_hour(config.rate_limit.join_requests_per_hour),
    });

    let mut app = swarm_router(state);

    if config.wake_endpoint.enabled {
        // Fatal when the selected method lacks its configuration.
        let invoker = Arc::new(
            AgentInvoker::new(config.invoker.clone()).context("invalid invoker configuration")?,
        );
        let sessions = Arc::new(SessionManager::new(
            config.wake_endpoint.session_file.clone(),
            config.wake_endpoint.session_timeout_minutes,
        ));
        let wake_state = Arc::new(WakeState {
            secret: config.wake_endpoint.secret.clone(),
            sessions,
            invoker,
            db: services.db.clone(),
            session_timeout_minutes: config.wake_endpoint.session_timeout_minutes,
        });
        app = app.merge(wake_router(wake_state));
        info!(method = config.invoker.method_name(), "wake endpoint mounted");
    }

    let addr = format!("{}:{}", config.network.bind_address, config.network.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    info!(agent_id = %config.identity.agent_id, %addr, "node listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("HTTP server failed")?;

    info!("node shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received Ctrl+C signal");
        },
        _ = terminate => {
            info!("received SIGTERM signal");
        },
    }
}
