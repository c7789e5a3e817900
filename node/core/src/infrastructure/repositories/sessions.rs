// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Agent-runtime session continuity rows for the sdk invoker.

use chrono::{Duration, Utc};
use sqlx::Row;
use uuid::Uuid;

use crate::infrastructure::db::Database;
use crate::infrastructure::repositories::StoreError;

pub struct SdkSessionRepository {
    db: Database,
}

impl SdkSessionRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// A resume id for (swarm, peer), provided it was active recently enough.
    pub async fn lookup(
        &self,
        swarm_id: Uuid,
        peer_id: &str,
        staleness_minutes: i64,
    ) -> Result<Option<String>, StoreError> {
        let cutoff = (Utc::now() - Duration::minutes(staleness_minutes)).to_rfc3339();
        let row = sqlx::query(
            "SELECT session_id FROM sdk_sessions
             WHERE swarm_id = ? AND peer_id = ? AND last_active >= ?",
        )
        .bind(swarm_id.to_string())
        .bind(peer_id)
        .bind(cutoff)
        .fetch_optional(self.db.pool())
        .await?;
        Ok(row.map(|r| r.get("session_id")))
    }

    pub async fn persist(
        &self,
        swarm_id: Uuid,
        peer_id: &str,
        session_id: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR REPLACE INTO sdk_sessions (swarm_id, peer_id, session_id, last_active)
             VALUES (?, ?, ?, ?)",
        )
        .bind(swarm_id.to_string())
        .bind(peer_id)
        .bind(session_id)
        .bind(Utc::now().to_rfc3339())
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    /// Remove rows idle past the threshold. Default threshold is 60 minutes.
    pub async fn expire(&self, idle_minutes: i64) -> Result<u64, StoreError> {
        let cutoff = (Utc::now() - Duration::minutes(idle_minutes)).to_rfc3339();
        let result = sqlx::query("DELETE FROM sdk_sessions WHERE last_active < ?")
            .bind(cutoff)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected())
    }
}
