// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! State export and import.
//!
//! The export document carries every table at schema version 2.0.0. Import
//! validates the version and either replaces the store or merges into it.
//! Legacy 1.0.0 documents (pre-inbox `message_queue`) are still accepted,
//! with their queue statuses mapped onto inbox statuses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::inbox::{InboxEntry, InboxStatus, Mute, MuteScope, OutboxEntry, PublicKeyEntry};
use crate::domain::swarm::{Member, SwarmMembership, SwarmSettings};
use crate::infrastructure::db::{Database, SCHEMA_VERSION};
use crate::infrastructure::repositories::{
    InboxRepository, MembershipRepository, MuteRepository, OutboxRepository, PublicKeyRepository,
    StoreError,
};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("unsupported schema version '{0}'")]
    UnsupportedVersion(String),
    #[error("malformed document: {0}")]
    Malformed(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The complete exportable state of a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateExport {
    pub schema_version: String,
    pub agent_id: String,
    pub exported_at: DateTime<Utc>,
    pub swarms: Vec<SwarmMembership>,
    pub mutes: Vec<Mute>,
    pub public_keys: Vec<PublicKeyEntry>,
    pub inbox: Vec<InboxEntry>,
    pub outbox: Vec<OutboxEntry>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportStats {
    pub swarms: usize,
    pub mutes: usize,
    pub public_keys: usize,
    pub inbox: usize,
    pub outbox: usize,
}

pub async fn export_state(db: &Database, agent_id: &str) -> Result<StateExport, StoreError> {
    let swarms = MembershipRepository::new(db.clone()).list_swarms().await?;
    let mutes = MuteRepository::new(db.clone()).list().await?;
    let public_keys = PublicKeyRepository::new(db.clone()).all().await?;
    let inbox = InboxRepository::new(db.clone())
        .list(None, None, u32::MAX)
        .await?;
    let outbox = OutboxRepository::new(db.clone()).list(None, u32::MAX).await?;
    Ok(StateExport {
        schema_version: SCHEMA_VERSION.to_string(),
        agent_id: agent_id.to_string(),
        exported_at: Utc::now(),
        swarms,
        mutes,
        public_keys,
        inbox,
        outbox,
    })
}

/// Import a previously exported document. With `merge = false` the imported
/// tables are cleared first; with `merge = true` existing rows survive and
/// colliding rows are overwritten by the document.
pub async fn import_state(
    db: &Database,
    document: &serde_json::Value,
    merge: bool,
) -> Result<ImportStats, ExportError> {
    let version = document
        .get("schema_version")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ExportError::Malformed("missing schema_version".into()))?;
    let state = match version {
        SCHEMA_VERSION => serde_json::from_value::<StateExport>(document.clone())
            .map_err(|e| ExportError::Malformed(e.to_string()))?,
        "1.0.0" => legacy_v1_to_current(document)?,
        other => return Err(ExportError::UnsupportedVersion(other.to_string())),
    };

    if !merge {
        clear_imported_tables(db).await?;
    }

    let membership = MembershipRepository::new(db.clone());
    let mute_repo = MuteRepository::new(db.clone());
    let key_repo = PublicKeyRepository::new(db.clone());
    let inbox_repo = InboxRepository::new(db.clone());
    let outbox_repo = OutboxRepository::new(db.clone());

    let mut stats = ImportStats::default();
    for swarm in &state.swarms {
        membership.upsert_swarm(swarm).await?;
        stats.swarms += 1;
    }
    for mute in &state.mutes {
        match mute.scope {
            MuteScope::Agent => {
                mute_repo
                    .mute_agent(&mute.target_id, mute.reason.as_deref())
                    .await?
            }
            MuteScope::Swarm => {
                let swarm_id = Uuid::parse_str(&mute.target_id)
                    .map_err(|e| ExportError::Malformed(format!("bad muted swarm id: {e}")))?;
                mute_repo.mute_swarm(swarm_id, mute.reason.as_deref()).await?
            }
        }
        stats.mutes += 1;
    }
    for key in &state.public_keys {
        key_repo.upsert(key).await?;
        stats.public_keys += 1;
    }
    for entry in &state.inbox {
        inbox_repo.restore(entry).await?;
        stats.inbox += 1;
    }
    for entry in &state.outbox {
        outbox_repo.restore(entry).await?;
        stats.outbox += 1;
    }
    Ok(stats)
}

async fn clear_imported_tables(db: &Database) -> Result<(), StoreError> {
    for table in [
        "swarm_members",
        "swarms",
        "muted_agents",
        "muted_swarms",
        "public_keys",
        "inbox",
        "outbox",
    ] {
        sqlx::query(&format!("DELETE FROM {table}"))
            .execute(db.pool())
            .await?;
    }
    Ok(())
}

/// Lift a legacy 1.0.0 document into the current shape. Queue statuses map
/// `pending|processing -> unread`, `completed|failed -> read`.
fn legacy_v1_to_current(document: &serde_json::Value) -> Result<StateExport, ExportError> {
    let bad = |what: &str| ExportError::Malformed(format!("legacy document: {what}"));
    let now = Utc::now();

    let mut swarms = Vec::new();
    if let Some(map) = document.get("swarms").and_then(|v| v.as_object()) {
        for (swarm_id, raw) in map {
            let swarm_id =
                Uuid::parse_str(swarm_id).map_err(|_| bad("swarm key is not a UUID"))?;
            let name = raw
                .get("name")
                .and_then(|v| v.as_str())
                .ok_or_else(|| bad("swarm missing name"))?;
            let master = raw
                .get("master")
                .and_then(|v| v.as_str())
                .ok_or_else(|| bad("swarm missing master"))?;
            let created_at = raw
                .get("joined_at")
                .and_then(|v| v.as_str())
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or(now);
            let settings = raw
                .get("settings")
                .map(|s| SwarmSettings {
                    allow_member_invite: s
                        .get("allow_member_invite")
                        .and_then(|v| v.as_bool())
                        .unwrap_or(false),
                    require_approval: s
                        .get("require_approval")
                        .and_then(|v| v.as_bool())
                        .unwrap_or(false),
                })
                .unwrap_or_default();
            let mut members = Vec::new();
            for m in raw
                .get("members")
                .and_then(|v| v.as_array())
                .unwrap_or(&Vec::new())
            {
                members.push(Member {
                    agent_id: m
                        .get("agent_id")
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| bad("member missing agent_id"))?
                        .to_string(),
                    endpoint: m
                        .get("endpoint")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    public_key: m
                        .get("public_key")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    joined_at: m
                        .get("joined_at")
                        .and_then(|v| v.as_str())
                        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or(now),
                });
            }
            swarms.push(SwarmMembership {
                swarm_id,
                name: name.to_string(),
                created_at,
                master: master.to_string(),
                members,
                settings,
            });
        }
    }

    let mut mutes = Vec::new();
    for agent in document
        .get("muted_agents")
        .and_then(|v| v.as_array())
        .unwrap_or(&Vec::new())
    {
        if let Some(id) = agent.as_str() {
            mutes.push(Mute {
                scope: MuteScope::Agent,
                target_id: id.to_string(),
                reason: None,
                created_at: now,
            });
        }
    }
    for swarm in document
        .get("muted_swarms")
        .and_then(|v| v.as_array())
        .unwrap_or(&Vec::new())
    {
        if let Some(id) = swarm.as_str() {
            mutes.push(Mute {
                scope: MuteScope::Swarm,
                target_id: id.to_string(),
                reason: None,
                created_at: now,
            });
        }
    }

    let mut public_keys = Vec::new();
    if let Some(map) = document.get("public_keys").and_then(|v| v.as_object()) {
        for (agent_id, raw) in map {
            public_keys.push(PublicKeyEntry {
                agent_id: agent_id.clone(),
                public_key: raw
                    .get("public_key")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| bad("public key entry missing key"))?
                    .to_string(),
                endpoint: raw
                    .get("endpoint")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                fetched_at: raw
                    .get("fetched_at")
                    .and_then(|v| v.as_str())
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or(now),
            });
        }
    }

    let mut inbox = Vec::new();
    for raw in document
        .get("message_queue")
        .and_then(|v| v.as_array())
        .unwrap_or(&Vec::new())
    {
        let status = match raw.get("status").and_then(|v| v.as_str()).unwrap_or("pending") {
            "pending" | "processing" => InboxStatus::Unread,
            "completed" | "failed" => InboxStatus::Read,
            _ => InboxStatus::Unread,
        };
        let read_at = match status {
            InboxStatus::Read => raw
                .get("processed_at")
                .and_then(|v| v.as_str())
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
            _ => None,
        };
        inbox.push(InboxEntry {
            message_id: raw
                .get("message_id")
                .and_then(|v| v.as_str())
                .and_then(|s| Uuid::parse_str(s).ok())
                .ok_or_else(|| bad("queue row missing message_id"))?,
            swarm_id: raw
                .get("swarm_id")
                .and_then(|v| v.as_str())
                .and_then(|s| Uuid::parse_str(s).ok())
                .ok_or_else(|| bad("queue row missing swarm_id"))?,
            sender_id: raw
                .get("sender_id")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            message_type: raw
                .get("message_type")
                .and_then(|v| v.as_str())
                .unwrap_or("message")
                .to_string(),
            content: raw
                .get("content")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            received_at: raw
                .get("received_at")
                .and_then(|v| v.as_str())
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or(now),
            status,
            read_at,
            archived_at: None,
            deleted_at: None,
        });
    }

    Ok(StateExport {
        schema_version: SCHEMA_VERSION.to_string(),
        agent_id: document
            .get("agent_id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        exported_at: now,
        swarms,
        mutes,
        public_keys,
        inbox,
        outbox: Vec::new(),
    })
}
