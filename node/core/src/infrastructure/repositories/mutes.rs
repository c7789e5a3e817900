// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Local mute sets. Muting is a node-local decision and never leaves it.

use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use crate::domain::inbox::{Mute, MuteScope};
use crate::infrastructure::db::Database;
use crate::infrastructure::repositories::{parse_ts, StoreError};

pub struct MuteRepository {
    db: Database,
}

impl MuteRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn mute_agent(&self, agent_id: &str, reason: Option<&str>) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR IGNORE INTO muted_agents (agent_id, reason, created_at) VALUES (?, ?, ?)",
        )
        .bind(agent_id)
        .bind(reason)
        .bind(Utc::now().to_rfc3339())
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    pub async fn unmute_agent(&self, agent_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM muted_agents WHERE agent_id = ?")
            .bind(agent_id)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn is_agent_muted(&self, agent_id: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM muted_agents WHERE agent_id = ?")
            .bind(agent_id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(row.is_some())
    }

    pub async fn mute_swarm(&self, swarm_id: Uuid, reason: Option<&str>) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR IGNORE INTO muted_swarms (swarm_id, reason, created_at) VALUES (?, ?, ?)",
        )
        .bind(swarm_id.to_string())
        .bind(reason)
        .bind(Utc::now().to_rfc3339())
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    pub async fn unmute_swarm(&self, swarm_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM muted_swarms WHERE swarm_id = ?")
            .bind(swarm_id.to_string())
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn is_swarm_muted(&self, swarm_id: Uuid) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM muted_swarms WHERE swarm_id = ?")
            .bind(swarm_id.to_string())
            .fetch_optional(self.db.pool())
            .await?;
        Ok(row.is_some())
    }

    pub async fn list(&self) -> Result<Vec<Mute>, StoreError> {
        let mut mutes = Vec::new();
        let rows = sqlx::query("SELECT agent_id, reason, created_at FROM muted_agents")
            .fetch_all(self.db.pool())
            .await?;
        for row in rows {
            mutes.push(Mute {
                scope: MuteScope::Agent,
                target_id: row.get("agent_id"),
                reason: row.get("reason"),
                created_at: parse_ts(&row.get::<String, _>("created_at"))?,
            });
        }
        let rows = sqlx::query("SELECT swarm_id, reason, created_at FROM muted_swarms")
            .fetch_all(self.db.pool())
            .await?;
        for row in rows {
            mutes.push(Mute {
                scope: MuteScope::Swarm,
                target_id: row.get("swarm_id"),
                reason: row.get("reason"),
                created_at: parse_ts(&row.get::<String, _>("created_at"))?,
            });
        }
        Ok(mutes)
    }
}
