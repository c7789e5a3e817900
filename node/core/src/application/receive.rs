// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! The receive pipeline.
//!
//! Single choke-point for every inbound envelope: validate, resolve the
//! sender's key, verify the signature, authorize, apply the mute filter,
//! persist, evaluate the wake trigger. Signature verification precedes any
//! state mutation; the inbox insert precedes wake evaluation.

use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::wake_trigger::WakeTrigger;
use crate::domain::envelope::{Envelope, EnvelopeError};
use crate::domain::inbox::{InboxEntry, InboxStatus, PublicKeyEntry};
use crate::domain::wake::WakeDecision;
use crate::infrastructure::crypto::verify_envelope;
use crate::infrastructure::db::Database;
use crate::infrastructure::repositories::{
    InboxRepository, MembershipRepository, MuteRepository, PublicKeyRepository, StoreError,
};
use crate::infrastructure::transport::Transport;

/// Public-key cache TTL.
const KEY_TTL_SECS: i64 = 24 * 3600;

#[derive(Debug, Error)]
pub enum ReceiveError {
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
    #[error("signature verification failed")]
    SignatureInvalid,
    #[error("cannot resolve sender key: {0}")]
    KeyUnresolvable(String),
    #[error("sender is not a member of swarm {0}")]
    NotAuthorized(Uuid),
    #[error("swarm '{0}' not found")]
    SwarmNotFound(Uuid),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What happened to an accepted message. The wire response is `200 queued`
/// in every variant; mute suppression is invisible to the sender.
#[derive(Debug, Clone)]
pub struct ReceiveOutcome {
    pub message_id: Uuid,
    pub inserted: bool,
    pub suppressed: bool,
    pub decision: Option<WakeDecision>,
}

pub struct ReceiveService {
    db: Database,
    transport: Transport,
    wake: Arc<WakeTrigger>,
}

impl ReceiveService {
    pub fn new(db: Database, transport: Transport, wake: Arc<WakeTrigger>) -> Self {
        Self { db, transport, wake }
    }

    pub async fn handle_message(&self, envelope: Envelope) -> Result<ReceiveOutcome, ReceiveError> {
        envelope.validate(Utc::now())?;

        let membership = MembershipRepository::new(self.db.clone());
        let swarm = membership
            .get_swarm(envelope.swarm_id)
            .await?
            .ok_or(ReceiveError::SwarmNotFound(envelope.swarm_id))?;

        let sender_id = envelope.sender.agent_id.clone();
        let member = swarm.member(&sender_id).cloned();

        // Key resolution: registered member key, fresh cache entry, or a
        // fetch from the sender's /swarm/info.
        let key = match &member {
            Some(member) => member.public_key.clone(),
            None => self.resolve_cached_key(&envelope).await?,
        };
        if verify_envelope(&envelope, &key).is_err() {
            // For a non-member sender the cache may be stale, so refetch
            // once before rejecting. A member's registered key is
            // authoritative: no refetch can override it.
            let refreshed = match &member {
                Some(_) => None,
                None => self.refetch_key(&envelope).await,
            };
            match refreshed {
                Some(fresh) if verify_envelope(&envelope, &fresh).is_ok() => {}
                _ => {
                    warn!(message_id = %envelope.message_id, sender = %sender_id,
                          "rejecting envelope with invalid signature");
                    return Err(ReceiveError::SignatureInvalid);
                }
            }
        }

        if member.is_none() {
            return Err(ReceiveError::NotAuthorized(envelope.swarm_id));
        }

        let mutes = MuteRepository::new(self.db.clone());
        if mutes.is_agent_muted(&sender_id).await? || mutes.is_swarm_muted(envelope.swarm_id).await?
        {
            debug!(message_id = %envelope.message_id, sender = %sender_id,
                   "muted; acknowledging without side effects");
            return Ok(ReceiveOutcome {
                message_id: envelope.message_id,
                inserted: false,
                suppressed: true,
                decision: None,
            });
        }

        let entry = InboxEntry {
            message_id: envelope.message_id,
            swarm_id: envelope.swarm_id,
            sender_id: sender_id.clone(),
            message_type: envelope.message_type.as_str().to_string(),
            content: serde_json::to_string(&envelope)
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            received_at: Utc::now(),
            status: InboxStatus::Unread,
            read_at: None,
            archived_at: None,
            deleted_at: None,
        };
        let inserted = InboxRepository::new(self.db.clone()).insert(&entry).await?;

        // Wake evaluation happens only for the first arrival; duplicates
        // must stay side-effect free.
        let decision = if inserted {
            Some(self.wake.process(&envelope).await)
        } else {
            debug!(message_id = %envelope.message_id, "duplicate delivery, inbox unchanged");
            None
        };

        info!(message_id = %envelope.message_id, sender = %sender_id,
              inserted, "message queued");
        Ok(ReceiveOutcome {
            message_id: envelope.message_id,
            inserted,
            suppressed: false,
            decision,
        })
    }

    async fn resolve_cached_key(&self, envelope: &Envelope) -> Result<String, ReceiveError> {
        let keys = PublicKeyRepository::new(self.db.clone());
        if let Some(entry) = keys.get(&envelope.sender.agent_id).await? {
            if entry.is_fresh(Utc::now(), KEY_TTL_SECS) {
                return Ok(entry.public_key);
            }
        }
        self.refetch_key(envelope)
            .await
            .ok_or_else(|| ReceiveError::KeyUnresolvable(envelope.sender.agent_id.clone()))
    }

    async fn refetch_key(&self, envelope: &Envelope) -> Option<String> {
        match self.transport.fetch_info(&envelope.sender.endpoint).await {
            Ok(info) if info.agent_id == envelope.sender.agent_id => {
                let entry = PublicKeyEntry {
                    agent_id: info.agent_id,
                    public_key: info.public_key.clone(),
                    endpoint: info.endpoint,
                    fetched_at: Utc::now(),
                };
                if let Err(e) = PublicKeyRepository::new(self.db.clone()).upsert(&entry).await {
                    warn!(error = %e, "failed to cache fetched key");
                }
                Some(info.public_key)
            }
            Ok(info) => {
                warn!(claimed = %envelope.sender.agent_id, served = %info.agent_id,
                      "peer info does not match claimed sender");
                None
            }
            Err(e) => {
                debug!(endpoint = %envelope.sender.endpoint, error = %e, "key fetch failed");
                None
            }
        }
    }
}
