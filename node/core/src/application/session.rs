// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Session manager: single-flight deduplication for agent invocations.
//!
//! All check-and-set paths run under one async mutex, so two wake POSTs
//! racing each other see exactly one `Started`. State survives restarts
//! through a JSON session file.

use chrono::Utc;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::domain::session::{SessionData, SessionState};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no session to update")]
    NoSession,
}

/// Outcome of a single-flight admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeginOutcome {
    /// A new session was recorded; the caller should invoke the agent.
    Started(String),
    /// A live session already exists; the caller must not invoke.
    AlreadyActive(String),
}

pub struct SessionManager {
    session_file: PathBuf,
    timeout_secs: i64,
    current: Mutex<Option<SessionData>>,
}

impl SessionManager {
    /// Load state from the session file; a corrupt file is discarded.
    pub fn new(session_file: PathBuf, timeout_minutes: u32) -> Self {
        let current = match std::fs::read_to_string(&session_file) {
            Ok(raw) => match serde_json::from_str::<SessionData>(&raw) {
                Ok(data) => Some(data),
                Err(e) => {
                    warn!(file = %session_file.display(), error = %e, "discarding corrupt session file");
                    let _ = std::fs::remove_file(&session_file);
                    None
                }
            },
            Err(_) => None,
        };
        Self {
            session_file,
            timeout_secs: timeout_minutes as i64 * 60,
            current: Mutex::new(current),
        }
    }

    /// Atomically check for a live session and start one if there is none.
    pub async fn try_begin(&self, swarm_id: Option<String>) -> Result<BeginOutcome, SessionError> {
        let now = Utc::now();
        let mut guard = self.current.lock().await;
        if let Some(session) = guard.as_ref() {
            if session.is_live(now, self.timeout_secs) {
                return Ok(BeginOutcome::AlreadyActive(session.session_id.clone()));
            }
        }
        let session = SessionData::start(Uuid::new_v4().to_string(), swarm_id, now);
        let id = session.session_id.clone();
        self.persist(&session)?;
        *guard = Some(session);
        Ok(BeginOutcome::Started(id))
    }

    pub async fn current(&self) -> Option<SessionData> {
        self.current.lock().await.clone()
    }

    /// Refresh `last_activity_at`, bumping the processed-message count.
    pub async fn update_activity(
        &self,
        messages_processed: u64,
        context_summary: Option<String>,
    ) -> Result<(), SessionError> {
        let mut guard = self.current.lock().await;
        let session = guard.as_mut().ok_or(SessionError::NoSession)?;
        session.last_activity_at = Utc::now();
        session.messages_processed += messages_processed;
        if context_summary.is_some() {
            session.context_summary = context_summary;
        }
        session.state = SessionState::Active;
        self.persist(session)?;
        Ok(())
    }

    pub async fn suspend(&self, context_summary: String) -> Result<(), SessionError> {
        let mut guard = self.current.lock().await;
        let session = guard.as_mut().ok_or(SessionError::NoSession)?;
        session.state = SessionState::Suspended;
        session.last_activity_at = Utc::now();
        session.context_summary = Some(context_summary);
        self.persist(session)?;
        Ok(())
    }

    pub async fn resume(&self) -> Result<(), SessionError> {
        let mut guard = self.current.lock().await;
        let session = guard.as_mut().ok_or(SessionError::NoSession)?;
        session.state = SessionState::Active;
        session.last_activity_at = Utc::now();
        self.persist(session)?;
        Ok(())
    }

    /// Drop back to idle: completion, or rollback after an invoker error.
    pub async fn end(&self) -> Result<(), SessionError> {
        let mut guard = self.current.lock().await;
        *guard = None;
        if self.session_file.exists() {
            std::fs::remove_file(&self.session_file)?;
        }
        Ok(())
    }

    fn persist(&self, session: &SessionData) -> Result<(), SessionError> {
        if let Some(parent) = self.session_file.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let raw = serde_json::to_string_pretty(session)
            .expect("session data is always serializable");
        std::fs::write(&self.session_file, raw)?;
        Ok(())
    }
}
