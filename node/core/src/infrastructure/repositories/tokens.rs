// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Issued invite-token metering rows.
//!
//! The consume path lives in `MembershipRepository::commit_join` so the
//! uses increment is atomic with the member insert.

use sqlx::Row;
use uuid::Uuid;

use crate::domain::invite::IssuedToken;
use crate::infrastructure::db::Database;
use crate::infrastructure::repositories::{parse_opt_ts, parse_ts, parse_uuid, StoreError};

pub struct InviteTokenRepository {
    db: Database,
}

impl InviteTokenRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn record(&self, token: &IssuedToken) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR REPLACE INTO invite_tokens
             (token_hash, swarm_id, max_uses, uses, created_at, expires_at, revoked)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&token.token_hash)
        .bind(token.swarm_id.to_string())
        .bind(token.max_uses.map(|n| n as i64))
        .bind(token.uses as i64)
        .bind(token.created_at.to_rfc3339())
        .bind(token.expires_at.map(|ts| ts.to_rfc3339()))
        .bind(token.revoked as i64)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    pub async fn get(&self, token_hash: &str) -> Result<Option<IssuedToken>, StoreError> {
        let row = sqlx::query(
            "SELECT token_hash, swarm_id, max_uses, uses, created_at, expires_at, revoked
             FROM invite_tokens WHERE token_hash = ?",
        )
        .bind(token_hash)
        .fetch_optional(self.db.pool())
        .await?;
        row.map(Self::token_from_row).transpose()
    }

    pub async fn revoke(&self, token_hash: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE invite_tokens SET revoked = 1 WHERE token_hash = ?")
            .bind(token_hash)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_for_swarm(&self, swarm_id: Uuid) -> Result<Vec<IssuedToken>, StoreError> {
        let rows = sqlx::query(
            "SELECT token_hash, swarm_id, max_uses, uses, created_at, expires_at, revoked
             FROM invite_tokens WHERE swarm_id = ? ORDER BY created_at DESC",
        )
        .bind(swarm_id.to_string())
        .fetch_all(self.db.pool())
        .await?;
        rows.into_iter().map(Self::token_from_row).collect()
    }

    fn token_from_row(row: sqlx::sqlite::SqliteRow) -> Result<IssuedToken, StoreError> {
        Ok(IssuedToken {
            token_hash: row.get("token_hash"),
            swarm_id: parse_uuid(&row.get::<String, _>("swarm_id"))?,
            max_uses: row.get::<Option<i64>, _>("max_uses").map(|n| n as u32),
            uses: row.get::<i64, _>("uses") as u32,
            created_at: parse_ts(&row.get::<String, _>("created_at"))?,
            expires_at: parse_opt_ts(row.get("expires_at"))?,
            revoked: row.get::<i64, _>("revoked") != 0,
        })
    }
}
