// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Outbound messaging: construct, sign, deliver, record.

use chrono::Utc;
use futures::future::join_all;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::domain::envelope::{Envelope, MessageType, Priority, Sender, BROADCAST};
use crate::domain::swarm::MembershipError;
use crate::infrastructure::crypto::{sign_envelope, NodeKeypair};
use crate::infrastructure::db::Database;
use crate::infrastructure::repositories::{MembershipRepository, OutboxRepository, StoreError};
use crate::infrastructure::transport::Transport;

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error(transparent)]
    Membership(#[from] MembershipError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Per-recipient outcome of one send.
#[derive(Debug, Clone)]
pub struct SendReport {
    pub message_id: Uuid,
    pub delivered: Vec<String>,
    pub failed: Vec<(String, String)>,
}

pub struct MessagingService {
    db: Database,
    keypair: NodeKeypair,
    agent_id: String,
    endpoint: String,
    transport: Transport,
}

impl MessagingService {
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

    /// Send a message into a swarm, to one member or to `broadcast`.
    /// Terminal delivery failures are recorded in the outbox and reported
    /// back; they do not fail the whole send.
    pub async fn send(
        &self,
        swarm_id: Uuid,
        recipient: &str,
        content: String,
        priority: Priority,
        in_reply_to: Option<Uuid>,
    ) -> Result<SendReport, MessagingError> {
        let membership = MembershipRepository::new(self.db.clone());
        let swarm = membership
            .get_swarm(swarm_id)
            .await?
            .ok_or(MembershipError::SwarmNotFound(swarm_id))?;
        if !swarm.is_member(&self.agent_id) {
            return Err(MembershipError::NotMember(self.agent_id.clone()).into());
        }

        let targets: Vec<_> = if recipient == BROADCAST {
            swarm.peers_of(&self.agent_id).cloned().collect()
        } else {
            let member = swarm
                .member(recipient)
                .ok_or_else(|| MembershipError::MemberNotFound(recipient.to_string()))?;
            vec![member.clone()]
        };

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
            message_type: MessageType::Message,
            content,
            signature: String::new(),
            in_reply_to,
            thread_id: None,
            priority,
            expires_at: None,
            references: None,
            attachments: None,
            metadata: None,
        };
        envelope.signature = sign_envelope(&envelope, self.keypair.signing_key());

        let outbox = OutboxRepository::new(self.db.clone());
        for target in &targets {
            outbox
                .record_queued(envelope.message_id, swarm_id, &target.agent_id)
                .await?;
        }

        let sends = targets.iter().map(|target| {
            let envelope = envelope.clone();
            let transport = self.transport.clone();
            let outbox = OutboxRepository::new(self.db.clone());
            async move {
                match transport.post_envelope(&target.endpoint, &envelope).await {
                    Ok(delivery) => {
                        let _ = outbox
                            .mark_delivered(envelope.message_id, &target.agent_id, delivery.attempts)
                            .await;
                        (target.agent_id.clone(), Ok(()))
                    }
                    Err(e) => {
                        warn!(recipient = %target.agent_id, error = %e, "message delivery failed");
                        let _ = outbox
                            .mark_failed(envelope.message_id, &target.agent_id, 0, &e.to_string())
                            .await;
                        (target.agent_id.clone(), Err(e.to_string()))
                    }
                }
            }
        });

        let mut report = SendReport {
            message_id: envelope.message_id,
            delivered: Vec::new(),
            failed: Vec::new(),
        };
        for (agent_id, outcome) in join_all(sends).await {
            match outcome {
                Ok(()) => report.delivered.push(agent_id),
                Err(reason) => report.failed.push((agent_id, reason)),
            }
        }
        Ok(report)
    }
}
