// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Pluggable agent invocation.
//!
//! The wake endpoint hands a [`WakePayload`] to whichever method the node
//! was configured with. Spawned processes are fire-and-forget; the caller
//! never waits for the agent to finish its work.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::info;

use crate::domain::node_config::{ConfigError, InvokerConfig};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Payload POSTed by the wake trigger and forwarded to the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WakePayload {
    pub message_id: String,
    pub swarm_id: String,
    pub sender_id: String,
    pub notification_level: String,
}

#[derive(Debug, Error)]
pub enum InvokerError {
    #[error("failed to spawn agent process: {0}")]
    Spawn(String),
    #[error("webhook returned HTTP {0}")]
    Webhook(u16),
    #[error("webhook call failed: {0}")]
    WebhookTransport(String),
}

/// Seam between the wake endpoint and whatever actually activates the
/// agent. Tests substitute their own implementations.
#[async_trait]
pub trait Invoker: Send + Sync {
    /// Invoke the agent. `resume` carries a prior runtime session id for
    /// the sdk method; other methods ignore it.
    async fn invoke(&self, payload: &WakePayload, resume: Option<&str>)
        -> Result<(), InvokerError>;

    /// The configured method name, for logs.
    fn method(&self) -> &'static str;
}

pub struct AgentInvoker {
    config: InvokerConfig,
    client: reqwest::Client,
}

impl AgentInvoker {
    /// Build the invoker, failing fast when the selected method is missing
    /// required configuration.
    pub fn new(config: InvokerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("cannot build webhook client: {e}")))?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl Invoker for AgentInvoker {
    fn method(&self) -> &'static str {
        self.config.method_name()
    }

    async fn invoke(
        &self,
        payload: &WakePayload,
        resume: Option<&str>,
    ) -> Result<(), InvokerError> {
        match &self.config {
            InvokerConfig::Noop => {
                info!(message_id = %payload.message_id, "noop invoker: recording invocation");
                Ok(())
            }
            InvokerConfig::Tmux { target } => self.invoke_tmux(target, payload).await,
            InvokerConfig::Subprocess { command } => self.invoke_subprocess(command, payload),
            InvokerConfig::Webhook { url } => self.invoke_webhook(url, payload).await,
            InvokerConfig::Sdk {
                command,
                cwd,
                permission_mode,
                max_turns,
                model,
            } => self.invoke_sdk(
                command,
                cwd,
                permission_mode,
                *max_turns,
                model.as_deref(),
                payload,
                resume,
            ),
        }
    }
}

impl AgentInvoker {
    /// Inject a one-line notification into a tmux target. The command is
    /// quick, so this one is awaited to surface a bad target.
    async fn invoke_tmux(&self, target: &str, payload: &WakePayload) -> Result<(), InvokerError> {
        let line = format!(
            "Wake: new message from {}. Read and process.",
            payload.sender_id
        );
        info!(tmux_target = target, "sending tmux notification");
        let output = Command::new("tmux")
            .args(["send-keys", "-t", target, &line, "C-m"])
            .output()
            .await
            .map_err(|e| InvokerError::Spawn(e.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(InvokerError::Spawn(format!(
                "tmux send-keys exited {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }

    fn invoke_subprocess(&self, template: &str, payload: &WakePayload) -> Result<(), InvokerError> {
        let command = template
            .replace("{message_id}", &payload.message_id)
            .replace("{swarm_id}", &payload.swarm_id)
            .replace("{sender_id}", &payload.sender_id)
            .replace("{notification_level}", &payload.notification_level);
        info!(%command, "spawning agent subprocess");
        let child = Command::new("sh")
            .arg("-c")
            .arg(&command)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| InvokerError::Spawn(e.to_string()))?;
        info!(pid = child.id(), "agent subprocess started");
        Ok(())
    }

    async fn invoke_webhook(&self, url: &str, payload: &WakePayload) -> Result<(), InvokerError> {
        info!(url, "invoking agent via webhook");
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| InvokerError::WebhookTransport(e.to_string()))?;
        if response.status().as_u16() >= 400 {
            return Err(InvokerError::Webhook(response.status().as_u16()));
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn invoke_sdk(
        &self,
        command: &str,
        cwd: &std::path::Path,
        permission_mode: &str,
        max_turns: Option<u32>,
        model: Option<&str>,
        payload: &WakePayload,
        resume: Option<&str>,
    ) -> Result<(), InvokerError> {
        let prompt = format!(
            "Incoming swarm message from {} (message_id={}, swarm_id={}). \
             Check for new messages and process them.",
            payload.sender_id, payload.message_id, payload.swarm_id
        );
        let mut cmd = Command::new(command);
        cmd.current_dir(cwd)
            .arg("-p")
            .arg(&prompt)
            .args(["--permission-mode", permission_mode]);
        if let Some(turns) = max_turns {
            cmd.args(["--max-turns", &turns.to_string()]);
        }
        if let Some(model) = model {
            cmd.args(["--model", model]);
        }
        if let Some(session) = resume {
            cmd.args(["--resume", session]);
        }
        info!(?cwd, resume = ?resume, "starting agent runtime session");
        let child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| InvokerError::Spawn(e.to_string()))?;
        info!(pid = child.id(), "agent runtime started");
        Ok(())
    }
}
