// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Outbox delivery records, one row per (message, recipient).

use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use crate::domain::inbox::{OutboxEntry, OutboxStatus};
use crate::infrastructure::db::Database;
use crate::infrastructure::repositories::{parse_opt_ts, parse_ts, parse_uuid, StoreError};

pub struct OutboxRepository {
    db: Database,
}

impl OutboxRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn record_queued(
        &self,
        message_id: Uuid,
        swarm_id: Uuid,
        recipient: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR IGNORE INTO outbox (message_id, swarm_id, recipient, status, created_at)
             VALUES (?, ?, ?, 'queued', ?)",
        )
        .bind(message_id.to_string())
        .bind(swarm_id.to_string())
        .bind(recipient)
        .bind(Utc::now().to_rfc3339())
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    /// Write back a full delivery record. Used by state import.
    pub async fn restore(&self, entry: &OutboxEntry) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR REPLACE INTO outbox
             (message_id, swarm_id, recipient, status, attempts, last_error,
              created_at, delivered_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.message_id.to_string())
        .bind(entry.swarm_id.to_string())
        .bind(&entry.recipient)
        .bind(entry.status.as_str())
        .bind(entry.attempts as i64)
        .bind(entry.last_error.as_deref())
        .bind(entry.created_at.to_rfc3339())
        .bind(entry.delivered_at.map(|ts| ts.to_rfc3339()))
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    pub async fn mark_delivered(
        &self,
        message_id: Uuid,
        recipient: &str,
        attempts: u32,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE outbox SET status = 'delivered', attempts = ?, delivered_at = ?, last_error = NULL
             WHERE message_id = ? AND recipient = ?",
        )
        .bind(attempts as i64)
        .bind(Utc::now().to_rfc3339())
        .bind(message_id.to_string())
        .bind(recipient)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    pub async fn mark_failed(
        &self,
        message_id: Uuid,
        recipient: &str,
        attempts: u32,
        error: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE outbox SET status = 'failed', attempts = ?, last_error = ?
             WHERE message_id = ? AND recipient = ?",
        )
        .bind(attempts as i64)
        .bind(error)
        .bind(message_id.to_string())
        .bind(recipient)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    pub async fn list(
        &self,
        swarm_id: Option<Uuid>,
        limit: u32,
    ) -> Result<Vec<OutboxEntry>, StoreError> {
        let mut sql = String::from(
            "SELECT message_id, swarm_id, recipient, status, attempts, last_error,
                    created_at, delivered_at
             FROM outbox WHERE 1 = 1",
        );
        if swarm_id.is_some() {
            sql.push_str(" AND swarm_id = ?");
        }
        sql.push_str(" ORDER BY created_at DESC LIMIT ?");

        let mut query = sqlx::query(&sql);
        if let Some(id) = swarm_id {
            query = query.bind(id.to_string());
        }
        let rows = query.bind(limit as i64).fetch_all(self.db.pool()).await?;
        rows.into_iter()
            .map(|row| {
                let status_raw: String = row.get("status");
                Ok(OutboxEntry {
                    message_id: parse_uuid(&row.get::<String, _>("message_id"))?,
                    swarm_id: parse_uuid(&row.get::<String, _>("swarm_id"))?,
                    recipient: row.get("recipient"),
                    status: OutboxStatus::parse(&status_raw).ok_or_else(|| {
                        StoreError::Corrupt(format!("bad outbox status '{status_raw}'"))
                    })?,
                    attempts: row.get::<i64, _>("attempts") as u32,
                    last_error: row.get("last_error"),
                    created_at: parse_ts(&row.get::<String, _>("created_at"))?,
                    delivered_at: parse_opt_ts(row.get("delivered_at"))?,
                })
            })
            .collect()
    }
}
