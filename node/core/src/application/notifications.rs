// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Lifecycle notifications.
//!
//! Membership changes are announced as `system` envelopes: inserted into
//! this node's inbox for visibility, and fanned out to the other current
//! members. Emission is fire-and-forget; a delivery failure to one member
//! never affects the others or the originating operation.

use chrono::Utc;
use futures::future::join_all;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::domain::envelope::{Envelope, MessageType, Priority, Sender, SystemContent, BROADCAST};
use crate::domain::inbox::{InboxEntry, InboxStatus};
use crate::domain::swarm::SwarmMembership;
use crate::infrastructure::crypto::{sign_envelope, NodeKeypair};
use crate::infrastructure::db::Database;
use crate::infrastructure::repositories::{InboxRepository, OutboxRepository, StoreError};
use crate::infrastructure::transport::Transport;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("cannot serialize notification: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub struct NotificationService {
    db: Database,
    keypair: NodeKeypair,
    agent_id: String,
    endpoint: String,
    transport: Transport,
}

impl NotificationService {
    pub fn new(
        db: Database,
        keypair: NodeKeypair,
        agent_id: &str,
        endpoint: &str,
        transport: Transport,
    ) -> Self {
        Self {
            db,
            keypair,
            agent_id: agent_id.to_string(),
            endpoint: endpoint.to_string(),
            transport,
        }
    }

    fn build_envelope(
        &self,
        swarm_id: Uuid,
        recipient: &str,
        content: &SystemContent,
    ) -> Result<Envelope, NotifyError> {
        let mut envelope = Envelope {
            protocol_version: crate::PROTOCOL_VERSION.to_string(),
            message_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            sender: Sender {
                agent_id: self.agent_id.clone(),
                endpoint: self.endpoint.clone(),
            },
            recipient: recipient.to_string(),
            swarm_id,
            message_type: MessageType::System,
            content: serde_json::to_string(content)?,
            signature: String::new(),
            in_reply_to: None,
            thread_id: None,
            priority: Priority::Normal,
            expires_at: None,
            references: None,
            attachments: None,
            metadata: None,
        };
        envelope.signature = sign_envelope(&envelope, self.keypair.signing_key());
        Ok(envelope)
    }

    fn system_content(
        swarm_id: Uuid,
        action: &str,
        agent_id: &str,
        initiated_by: Option<&str>,
        reason: Option<&str>,
    ) -> SystemContent {
        SystemContent {
            action: action.to_string(),
            swarm_id: Some(swarm_id.to_string()),
            agent_id: Some(agent_id.to_string()),
            initiated_by: initiated_by.map(str::to_string),
            reason: reason.map(str::to_string),
        }
    }

    async fn insert_local(&self, envelope: &Envelope) -> Result<(), NotifyError> {
        let entry = InboxEntry {
            message_id: envelope.message_id,
            swarm_id: envelope.swarm_id,
            sender_id: envelope.sender.agent_id.clone(),
            message_type: envelope.message_type.as_str().to_string(),
            content: serde_json::to_string(envelope)?,
            received_at: Utc::now(),
            status: InboxStatus::Unread,
            read_at: None,
            archived_at: None,
            deleted_at: None,
        };
        InboxRepository::new(self.db.clone()).insert(&entry).await?;
        Ok(())
    }

    /// Announce `action` to every current member except this node, the
    /// subject of the event (when excluded by the caller), and record each
    /// delivery in the outbox.
    pub async fn emit_broadcast(
        &self,
        swarm: &SwarmMembership,
        action: &str,
        agent_id: &str,
        initiated_by: Option<&str>,
        reason: Option<&str>,
        exclude: &[&str],
    ) -> Result<Envelope, NotifyError> {
        let content =
            Self::system_content(swarm.swarm_id, action, agent_id, initiated_by, reason);
        let envelope = self.build_envelope(swarm.swarm_id, BROADCAST, &content)?;
        self.insert_local(&envelope).await?;

        let outbox = OutboxRepository::new(self.db.clone());
        let recipients: Vec<_> = swarm
            .peers_of(&self.agent_id)
            .filter(|m| !exclude.contains(&m.agent_id.as_str()))
            .cloned()
            .collect();
        for member in &recipients {
            outbox
                .record_queued(envelope.message_id, swarm.swarm_id, &member.agent_id)
                .await?;
        }
        let deliveries = recipients.iter().map(|member| {
            let envelope = envelope.clone();
            let transport = self.transport.clone();
            let outbox = OutboxRepository::new(self.db.clone());
            async move {
                match transport.post_envelope_once(&member.endpoint, &envelope).await {
                    Ok(delivery) => {
                        let _ = outbox
                            .mark_delivered(envelope.message_id, &member.agent_id, delivery.attempts)
                            .await;
                    }
                    Err(e) => {
                        warn!(
                            recipient = %member.agent_id,
                            action,
                            error = %e,
                            "lifecycle notification delivery failed"
                        );
                        let _ = outbox
                            .mark_failed(envelope.message_id, &member.agent_id, 0, &e.to_string())
                            .await;
                    }
                }
            }
        });
        join_all(deliveries).await;
        Ok(envelope)
    }

    /// Deliver `action` to a single member.
    pub async fn emit_direct(
        &self,
        swarm: &SwarmMembership,
        target: &str,
        action: &str,
        agent_id: &str,
        initiated_by: Option<&str>,
        reason: Option<&str>,
    ) -> Result<Envelope, NotifyError> {
        let content =
            Self::system_content(swarm.swarm_id, action, agent_id, initiated_by, reason);
        let envelope = self.build_envelope(swarm.swarm_id, target, &content)?;
        self.insert_local(&envelope).await?;

        let outbox = OutboxRepository::new(self.db.clone());
        outbox
            .record_queued(envelope.message_id, swarm.swarm_id, target)
            .await?;
        if let Some(member) = swarm.member(target) {
            match self
                .transport
                .post_envelope_once(&member.endpoint, &envelope)
                .await
            {
                Ok(delivery) => {
                    let _ = outbox
                        .mark_delivered(envelope.message_id, target, delivery.attempts)
                        .await;
                }
                Err(e) => {
                    warn!(recipient = target, action, error = %e, "direct notification failed");
                    let _ = outbox
                        .mark_failed(envelope.message_id, target, 0, &e.to_string())
                        .await;
                }
            }
        }
        Ok(envelope)
    }

    /// Record `action` in the local inbox only, no delivery. Used for
    /// node-local events such as mutes.
    pub async fn emit_local(
        &self,
        swarm_id: Uuid,
        action: &str,
        agent_id: &str,
        initiated_by: Option<&str>,
        reason: Option<&str>,
    ) -> Result<Envelope, NotifyError> {
        let content = Self::system_content(swarm_id, action, agent_id, initiated_by, reason);
        let envelope = self.build_envelope(swarm_id, &self.agent_id, &content)?;
        self.insert_local(&envelope).await?;
        Ok(envelope)
    }
}
