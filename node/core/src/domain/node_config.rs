// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Node configuration schema.
//!
//! Loaded once at startup from a YAML file; validation failures are fatal.
//! Every component receives the slice of configuration it needs by value,
//! there are no global singletons.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::domain::envelope::is_valid_agent_id;
use crate::domain::wake::NotificationPreferences;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Stable agent identifier, unique within every swarm this node joins.
    pub agent_id: String,
    /// Public HTTPS endpoint other agents reach this node at.
    pub endpoint: String,
    /// Directory holding the Ed25519 keypair, owner-only permissions.
    #[serde(default = "default_keys_dir")]
    pub keys_dir: PathBuf,
}

fn default_keys_dir() -> PathBuf {
    PathBuf::from("data/identity")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_bind")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8420
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_messages_per_minute")]
    pub messages_per_minute: u32,
    #[serde(default = "default_join_per_hour")]
    pub join_requests_per_hour: u32,
}

fn default_messages_per_minute() -> u32 {
    60
}

fn default_join_per_hour() -> u32 {
    10
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            messages_per_minute: default_messages_per_minute(),
            join_requests_per_hour: default_join_per_hour(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WakeTriggerConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Where WAKE decisions are POSTed, normally this node's own /api/wake.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_wake_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub preferences: NotificationPreferences,
}

fn default_wake_timeout() -> u64 {
    5
}

impl Default for WakeTriggerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            timeout_secs: default_wake_timeout(),
            preferences: NotificationPreferences::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WakeEndpointConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Shared secret required in X-Wake-Secret; None disables the check.
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default = "default_session_file")]
    pub session_file: PathBuf,
    #[serde(default = "default_session_timeout")]
    pub session_timeout_minutes: u32,
}

fn default_session_file() -> PathBuf {
    PathBuf::from("data/session.json")
}

fn default_session_timeout() -> u32 {
    30
}

impl Default for WakeEndpointConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            secret: None,
            session_file: default_session_file(),
            session_timeout_minutes: default_session_timeout(),
        }
    }
}

/// Invocation strategy; each variant bundles the configuration it needs.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum InvokerConfig {
    /// Inject a notification line into a tmux target (session:window.pane).
    Tmux { target: String },
    /// Spawn a detached command built from a placeholder template.
    Subprocess { command: String },
    /// POST the wake payload to a URL.
    Webhook { url: String },
    /// Start or resume an external agent-runtime session.
    Sdk {
        #[serde(default = "default_sdk_command")]
        command: String,
        cwd: PathBuf,
        #[serde(default = "default_permission_mode")]
        permission_mode: String,
        #[serde(default)]
        max_turns: Option<u32>,
        #[serde(default)]
        model: Option<String>,
    },
    /// Record the invocation and succeed.
    #[default]
    Noop,
}

fn default_sdk_command() -> String {
    "claude".to_string()
}

fn default_permission_mode() -> String {
    "acceptEdits".to_string()
}

impl InvokerConfig {
    pub fn method_name(&self) -> &'static str {
        match self {
            Self::Tmux { .. } => "tmux",
            Self::Subprocess { .. } => "subprocess",
            Self::Webhook { .. } => "webhook",
            Self::Sdk { .. } => "sdk",
            Self::Noop => "noop",
        }
    }

    /// A selected method with missing required configuration is fatal at
    /// startup, never a runtime fallback.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let missing = |what: &str| {
            Err(ConfigError::Invalid(format!(
                "invoker method '{}' requires {what}",
                self.method_name()
            )))
        };
        match self {
            Self::Tmux { target } if target.is_empty() => missing("a tmux target"),
            Self::Subprocess { command } if command.is_empty() => missing("a command template"),
            Self::Webhook { url } if !url.starts_with("http") => missing("an absolute URL"),
            Self::Sdk { cwd, .. } if cwd.as_os_str().is_empty() => missing("a working directory"),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub identity: IdentityConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default)]
    pub wake_trigger: WakeTriggerConfig,
    #[serde(default)]
    pub wake_endpoint: WakeEndpointConfig,
    #[serde(default)]
    pub invoker: InvokerConfig,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/mesh.db")
}

impl NodeConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: NodeConfig = serde_yaml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_agent_id(&self.identity.agent_id) {
            return Err(ConfigError::Invalid(format!(
                "agent_id '{}' must be non-empty printable ASCII, at most 128 chars",
                self.identity.agent_id
            )));
        }
        if !self.identity.endpoint.starts_with("https://") {
            return Err(ConfigError::Invalid(format!(
                "endpoint '{}' must be an absolute https URL",
                self.identity.endpoint
            )));
        }
        if self.wake_trigger.enabled && self.wake_trigger.endpoint.is_none() {
            return Err(ConfigError::Invalid(
                "wake_trigger.endpoint is required when the trigger is enabled".into(),
            ));
        }
        if self.wake_endpoint.enabled {
            self.invoker.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_yaml() -> &'static str {
        r#"
identity:
  agent_id: node-a
  endpoint: https://a.example.com/agent
"#
    }

    #[test]
    fn minimal_config_parses_with_defaults() {
        let cfg: NodeConfig = serde_yaml::from_str(minimal_yaml()).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.network.port, 8420);
        assert_eq!(cfg.rate_limit.messages_per_minute, 60);
        assert_eq!(cfg.db_path, PathBuf::from("data/mesh.db"));
        assert!(matches!(cfg.invoker, InvokerConfig::Noop));
        assert!(!cfg.wake_trigger.enabled);
    }

    #[test]
    fn http_endpoint_is_fatal() {
        let cfg: NodeConfig = serde_yaml::from_str(
            r#"
identity:
  agent_id: node-a
  endpoint: http://a.example.com
"#,
        )
        .unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn enabled_trigger_requires_endpoint() {
        let cfg: NodeConfig = serde_yaml::from_str(
            r#"
identity:
  agent_id: node-a
  endpoint: https://a.example.com
wake_trigger:
  enabled: true
"#,
        )
        .unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn invoker_variants_parse_and_validate() {
        let cfg: NodeConfig = serde_yaml::from_str(
            r#"
identity:
  agent_id: node-a
  endpoint: https://a.example.com
wake_endpoint:
  enabled: true
invoker:
  method: tmux
  target: "main:0"
"#,
        )
        .unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.invoker.method_name(), "tmux");

        let bad: NodeConfig = serde_yaml::from_str(
            r#"
identity:
  agent_id: node-a
  endpoint: https://a.example.com
wake_endpoint:
  enabled: true
invoker:
  method: tmux
  target: ""
"#,
        )
        .unwrap();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn sdk_invoker_defaults() {
        let cfg: InvokerConfig = serde_yaml::from_str(
            r#"
method: sdk
cwd: /srv/agent
"#,
        )
        .unwrap();
        match &cfg {
            InvokerConfig::Sdk {
                command,
                permission_mode,
                max_turns,
                ..
            } => {
                assert_eq!(command, "claude");
                assert_eq!(permission_mode, "acceptEdits");
                assert!(max_turns.is_none());
            }
            other => panic!("expected sdk, got {other:?}"),
        }
        cfg.validate().unwrap();
    }
}
