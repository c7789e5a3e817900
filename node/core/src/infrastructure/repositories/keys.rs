// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Public-key cache. Updates are last-write-wins on `fetched_at`.

use sqlx::Row;

use crate::domain::inbox::PublicKeyEntry;
use crate::infrastructure::db::Database;
use crate::infrastructure::repositories::{parse_ts, StoreError};

pub struct PublicKeyRepository {
    db: Database,
}

impl PublicKeyRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Upsert a cache entry. A concurrent writer with an older `fetched_at`
    /// loses: the newest fetch wins.
    pub async fn upsert(&self, entry: &PublicKeyEntry) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO public_keys (agent_id, public_key, endpoint, fetched_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(agent_id) DO UPDATE SET
                public_key = excluded.public_key,
                endpoint = excluded.endpoint,
                fetched_at = excluded.fetched_at
             WHERE excluded.fetched_at >= public_keys.fetched_at",
        )
        .bind(&entry.agent_id)
        .bind(&entry.public_key)
        .bind(&entry.endpoint)
        .bind(entry.fetched_at.to_rfc3339())
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    pub async fn get(&self, agent_id: &str) -> Result<Option<PublicKeyEntry>, StoreError> {
        let row = sqlx::query(
            "SELECT agent_id, public_key, endpoint, fetched_at FROM public_keys WHERE agent_id = ?",
        )
        .bind(agent_id)
        .fetch_optional(self.db.pool())
        .await?;
        row.map(|row| {
            Ok(PublicKeyEntry {
                agent_id: row.get("agent_id"),
                public_key: row.get("public_key"),
                endpoint: row.get("endpoint"),
                fetched_at: parse_ts(&row.get::<String, _>("fetched_at"))?,
            })
        })
        .transpose()
    }

    pub async fn remove(&self, agent_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM public_keys WHERE agent_id = ?")
            .bind(agent_id)
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    pub async fn all(&self) -> Result<Vec<PublicKeyEntry>, StoreError> {
        let rows = sqlx::query(
            "SELECT agent_id, public_key, endpoint, fetched_at FROM public_keys ORDER BY agent_id",
        )
        .fetch_all(self.db.pool())
        .await?;
        rows.into_iter()
            .map(|row| {
                Ok(PublicKeyEntry {
                    agent_id: row.get("agent_id"),
                    public_key: row.get("public_key"),
                    endpoint: row.get("endpoint"),
                    fetched_at: parse_ts(&row.get::<String, _>("fetched_at"))?,
                })
            })
            .collect()
    }
}
