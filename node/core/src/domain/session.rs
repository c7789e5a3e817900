// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Invocation session states.
//!
//! At most one non-idle session exists per node; the wake endpoint uses it
//! for single-flight deduplication.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Active,
    Suspended,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    pub session_id: String,
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    #[serde(default)]
    pub messages_processed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_swarm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_summary: Option<String>,
}

impl SessionData {
    pub fn start(session_id: String, swarm_id: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            session_id,
            state: SessionState::Active,
            started_at: now,
            last_activity_at: now,
            messages_processed: 0,
            current_swarm: swarm_id,
            context_summary: None,
        }
    }

    /// True while the session still blocks new invocations.
    pub fn is_live(&self, now: DateTime<Utc>, timeout_secs: i64) -> bool {
        self.state != SessionState::Idle
            && (now - self.last_activity_at).num_seconds() < timeout_secs
    }
}
