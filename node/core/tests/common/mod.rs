// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use chrono::Utc;
use uuid::Uuid;

use mesh_core::domain::envelope::{Envelope, MessageType, Priority, Sender};
use mesh_core::domain::swarm::{Member, SwarmMembership, SwarmSettings};
use mesh_core::infrastructure::crypto::{sign_envelope, NodeKeypair};
use mesh_core::infrastructure::db::Database;

/// An endpoint that refuses connections immediately.
pub const DEAD_ENDPOINT: &str = "https://127.0.0.1:1/agent";

pub async fn test_db() -> (tempfile::TempDir, Database) {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = Database::connect(&dir.path().join("mesh.db"))
        .await
        .expect("database");
    (dir, db)
}

pub fn member_of(keypair: &NodeKeypair, agent_id: &str) -> Member {
    Member {
        agent_id: agent_id.to_string(),
        endpoint: DEAD_ENDPOINT.to_string(),
        public_key: keypair.public_key_b64(),
        joined_at: Utc::now(),
    }
}

pub fn swarm_with(master: Member, others: Vec<Member>) -> SwarmMembership {
    let mut swarm =
        SwarmMembership::create("dev".to_string(), master, SwarmSettings::default()).unwrap();
    swarm.members.extend(others);
    swarm
}

pub fn signed_envelope(
    keypair: &NodeKeypair,
    sender_id: &str,
    swarm_id: Uuid,
    recipient: &str,
    content: &str,
) -> Envelope {
    let mut envelope = Envelope {
        protocol_version: mesh_core::PROTOCOL_VERSION.to_string(),
        message_id: Uuid::new_v4(),
        timestamp: Utc::now(),
        sender: Sender {
            agent_id: sender_id.to_string(),
            endpoint: DEAD_ENDPOINT.to_string(),
        },
        recipient: recipient.to_string(),
        swarm_id,
        message_type: MessageType::Message,
        content: content.to_string(),
        signature: String::new(),
        in_reply_to: None,
        thread_id: None,
        priority: Priority::Normal,
        expires_at: None,
        references: None,
        attachments: None,
        metadata: None,
    };
    envelope.signature = sign_envelope(&envelope, keypair.signing_key());
    envelope
}
