// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Swarm membership persistence.
//!
//! Per-swarm mutations run in transactions so any observer that sees a
//! lifecycle notification also sees the corresponding membership state.

use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use crate::domain::swarm::{Member, SwarmMembership, SwarmSettings};
use crate::infrastructure::db::Database;
use crate::infrastructure::repositories::{parse_ts, parse_uuid, StoreError};

/// Outcome of the atomic join commit (member insert + token-use increment).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinCommit {
    Committed,
    TokenUnknown,
    TokenExhausted,
    TokenRevoked,
}

/// A join request parked for master approval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingJoin {
    pub swarm_id: Uuid,
    pub agent_id: String,
    pub endpoint: String,
    pub public_key: String,
    pub requested_at: chrono::DateTime<Utc>,
}

pub struct MembershipRepository {
    db: Database,
}

impl MembershipRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Persist a swarm and its full member list atomically.
    pub async fn upsert_swarm(&self, swarm: &SwarmMembership) -> Result<(), StoreError> {
        let mut tx = self.db.pool().begin().await?;
        sqlx::query(
            "INSERT OR REPLACE INTO swarms
             (swarm_id, name, master, created_at, allow_member_invite, require_approval)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(swarm.swarm_id.to_string())
        .bind(&swarm.name)
        .bind(&swarm.master)
        .bind(swarm.created_at.to_rfc3339())
        .bind(swarm.settings.allow_member_invite as i64)
        .bind(swarm.settings.require_approval as i64)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM swarm_members WHERE swarm_id = ?")
            .bind(swarm.swarm_id.to_string())
            .execute(&mut *tx)
            .await?;
        for member in &swarm.members {
            sqlx::query(
                "INSERT INTO swarm_members (agent_id, swarm_id, endpoint, public_key, joined_at)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&member.agent_id)
            .bind(swarm.swarm_id.to_string())
            .bind(&member.endpoint)
            .bind(&member.public_key)
            .bind(member.joined_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_swarm(&self, swarm_id: Uuid) -> Result<Option<SwarmMembership>, StoreError> {
        let row = sqlx::query(
            "SELECT swarm_id, name, master, created_at, allow_member_invite, require_approval
             FROM swarms WHERE swarm_id = ?",
        )
        .bind(swarm_id.to_string())
        .fetch_optional(self.db.pool())
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let members = self.members_of(swarm_id).await?;
        Ok(Some(SwarmMembership {
            swarm_id,
            name: row.get("name"),
            master: row.get("master"),
            created_at: parse_ts(&row.get::<String, _>("created_at"))?,
            settings: SwarmSettings {
                allow_member_invite: row.get::<i64, _>("allow_member_invite") != 0,
                require_approval: row.get::<i64, _>("require_approval") != 0,
            },
            members,
        }))
    }

    async fn members_of(&self, swarm_id: Uuid) -> Result<Vec<Member>, StoreError> {
        let rows = sqlx::query(
            "SELECT agent_id, endpoint, public_key, joined_at
             FROM swarm_members WHERE swarm_id = ?
             ORDER BY joined_at ASC, agent_id ASC",
        )
        .bind(swarm_id.to_string())
        .fetch_all(self.db.pool())
        .await?;
        rows.into_iter()
            .map(|row| {
                Ok(Member {
                    agent_id: row.get("agent_id"),
                    endpoint: row.get("endpoint"),
                    public_key: row.get("public_key"),
                    joined_at: parse_ts(&row.get::<String, _>("joined_at"))?,
                })
            })
            .collect()
    }

    pub async fn list_swarms(&self) -> Result<Vec<SwarmMembership>, StoreError> {
        let rows = sqlx::query("SELECT swarm_id FROM swarms ORDER BY created_at ASC")
            .fetch_all(self.db.pool())
            .await?;
        let mut swarms = Vec::with_capacity(rows.len());
        for row in rows {
            let id = parse_uuid(&row.get::<String, _>("swarm_id"))?;
            if let Some(swarm) = self.get_swarm(id).await? {
                swarms.push(swarm);
            }
        }
        Ok(swarms)
    }

    pub async fn member_exists(&self, swarm_id: Uuid, agent_id: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM swarm_members WHERE swarm_id = ? AND agent_id = ?")
            .bind(swarm_id.to_string())
            .bind(agent_id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(row.is_some())
    }

    /// The atomic join commit: check and meter the invite token, then insert
    /// the member, all in one transaction. An exhausted or revoked token
    /// leaves membership untouched.
    pub async fn commit_join(
        &self,
        swarm_id: Uuid,
        member: &Member,
        token_hash: &str,
    ) -> Result<JoinCommit, StoreError> {
        let mut tx = self.db.pool().begin().await?;
        let token = sqlx::query(
            "SELECT max_uses, uses, revoked FROM invite_tokens
             WHERE token_hash = ? AND swarm_id = ?",
        )
        .bind(token_hash)
        .bind(swarm_id.to_string())
        .fetch_optional(&mut *tx)
        .await?;
        let Some(token) = token else {
            return Ok(JoinCommit::TokenUnknown);
        };
        if token.get::<i64, _>("revoked") != 0 {
            return Ok(JoinCommit::TokenRevoked);
        }
        if let Some(max_uses) = token.get::<Option<i64>, _>("max_uses") {
            if token.get::<i64, _>("uses") >= max_uses {
                return Ok(JoinCommit::TokenExhausted);
            }
        }
        sqlx::query("UPDATE invite_tokens SET uses = uses + 1 WHERE token_hash = ?")
            .bind(token_hash)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT OR REPLACE INTO swarm_members
             (agent_id, swarm_id, endpoint, public_key, joined_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&member.agent_id)
        .bind(swarm_id.to_string())
        .bind(&member.endpoint)
        .bind(&member.public_key)
        .bind(member.joined_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(JoinCommit::Committed)
    }

    pub async fn add_member(&self, swarm_id: Uuid, member: &Member) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR REPLACE INTO swarm_members
             (agent_id, swarm_id, endpoint, public_key, joined_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&member.agent_id)
        .bind(swarm_id.to_string())
        .bind(&member.endpoint)
        .bind(&member.public_key)
        .bind(member.joined_at.to_rfc3339())
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    pub async fn remove_member(&self, swarm_id: Uuid, agent_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM swarm_members WHERE swarm_id = ? AND agent_id = ?")
            .bind(swarm_id.to_string())
            .bind(agent_id)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_master(&self, swarm_id: Uuid, new_master: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE swarms SET master = ? WHERE swarm_id = ?")
            .bind(new_master)
            .bind(swarm_id.to_string())
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    /// Drop the swarm and, via cascade, its members, tokens and pending joins.
    pub async fn remove_swarm(&self, swarm_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM swarms WHERE swarm_id = ?")
            .bind(swarm_id.to_string())
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    pub async fn park_pending_join(&self, pending: &PendingJoin) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR REPLACE INTO pending_joins
             (swarm_id, agent_id, endpoint, public_key, requested_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(pending.swarm_id.to_string())
        .bind(&pending.agent_id)
        .bind(&pending.endpoint)
        .bind(&pending.public_key)
        .bind(pending.requested_at.to_rfc3339())
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    pub async fn take_pending_join(
        &self,
        swarm_id: Uuid,
        agent_id: &str,
    ) -> Result<Option<PendingJoin>, StoreError> {
        let row = sqlx::query(
            "SELECT swarm_id, agent_id, endpoint, public_key, requested_at
             FROM pending_joins WHERE swarm_id = ? AND agent_id = ?",
        )
        .bind(swarm_id.to_string())
        .bind(agent_id)
        .fetch_optional(self.db.pool())
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        sqlx::query("DELETE FROM pending_joins WHERE swarm_id = ? AND agent_id = ?")
            .bind(swarm_id.to_string())
            .bind(agent_id)
            .execute(self.db.pool())
            .await?;
        Ok(Some(PendingJoin {
            swarm_id,
            agent_id: row.get("agent_id"),
            endpoint: row.get("endpoint"),
            public_key: row.get("public_key"),
            requested_at: parse_ts(&row.get::<String, _>("requested_at"))?,
        }))
    }

    pub async fn list_pending_joins(&self, swarm_id: Uuid) -> Result<Vec<PendingJoin>, StoreError> {
        let rows = sqlx::query(
            "SELECT agent_id, endpoint, public_key, requested_at
             FROM pending_joins WHERE swarm_id = ? ORDER BY requested_at ASC",
        )
        .bind(swarm_id.to_string())
        .fetch_all(self.db.pool())
        .await?;
        rows.into_iter()
            .map(|row| {
                Ok(PendingJoin {
                    swarm_id,
                    agent_id: row.get("agent_id"),
                    endpoint: row.get("endpoint"),
                    public_key: row.get("public_key"),
                    requested_at: parse_ts(&row.get::<String, _>("requested_at"))?,
                })
            })
            .collect()
    }
}
