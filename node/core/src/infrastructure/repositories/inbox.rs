// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Inbox persistence. Insertion is idempotent on `message_id`.

use chrono::{Duration, Utc};
use sqlx::Row;
use uuid::Uuid;

use crate::domain::inbox::{InboxEntry, InboxStatus};
use crate::infrastructure::db::Database;
use crate::infrastructure::repositories::{parse_opt_ts, parse_ts, parse_uuid, StoreError};

pub struct InboxRepository {
    db: Database,
}

impl InboxRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert an entry; a repeat insert of the same `message_id` succeeds
    /// silently with no state change. Returns whether the row was new.
    pub async fn insert(&self, entry: &InboxEntry) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO inbox
             (message_id, swarm_id, sender_id, message_type, content, received_at, status)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.message_id.to_string())
        .bind(entry.swarm_id.to_string())
        .bind(&entry.sender_id)
        .bind(&entry.message_type)
        .bind(&entry.content)
        .bind(entry.received_at.to_rfc3339())
        .bind(entry.status.as_str())
        .execute(self.db.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Write back a full entry, timestamps and status included. Used by
    /// state import, where the document is the source of truth.
    pub async fn restore(&self, entry: &InboxEntry) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR REPLACE INTO inbox
             (message_id, swarm_id, sender_id, message_type, content, received_at,
              status, read_at, archived_at, deleted_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.message_id.to_string())
        .bind(entry.swarm_id.to_string())
        .bind(&entry.sender_id)
        .bind(&entry.message_type)
        .bind(&entry.content)
        .bind(entry.received_at.to_rfc3339())
        .bind(entry.status.as_str())
        .bind(entry.read_at.map(|ts| ts.to_rfc3339()))
        .bind(entry.archived_at.map(|ts| ts.to_rfc3339()))
        .bind(entry.deleted_at.map(|ts| ts.to_rfc3339()))
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    pub async fn get(&self, message_id: Uuid) -> Result<Option<InboxEntry>, StoreError> {
        let row = sqlx::query(
            "SELECT message_id, swarm_id, sender_id, message_type, content,
                    received_at, status, read_at, archived_at, deleted_at
             FROM inbox WHERE message_id = ?",
        )
        .bind(message_id.to_string())
        .fetch_optional(self.db.pool())
        .await?;
        row.map(Self::entry_from_row).transpose()
    }

    pub async fn list(
        &self,
        swarm_id: Option<Uuid>,
        status: Option<InboxStatus>,
        limit: u32,
    ) -> Result<Vec<InboxEntry>, StoreError> {
        let mut sql = String::from(
            "SELECT message_id, swarm_id, sender_id, message_type, content,
                    received_at, status, read_at, archived_at, deleted_at
             FROM inbox WHERE 1 = 1",
        );
        if swarm_id.is_some() {
            sql.push_str(" AND swarm_id = ?");
        }
        if status.is_some() {
            sql.push_str(" AND status = ?");
        }
        sql.push_str(" ORDER BY received_at DESC LIMIT ?");

        let mut query = sqlx::query(&sql);
        if let Some(id) = swarm_id {
            query = query.bind(id.to_string());
        }
        if let Some(status) = status {
            query = query.bind(status.as_str());
        }
        let rows = query.bind(limit as i64).fetch_all(self.db.pool()).await?;
        rows.into_iter().map(Self::entry_from_row).collect()
    }

    pub async fn mark_read(&self, message_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE inbox SET status = 'read', read_at = ?
             WHERE message_id = ? AND status = 'unread'",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(message_id.to_string())
        .execute(self.db.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn archive(&self, message_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE inbox SET status = 'archived', archived_at = ?
             WHERE message_id = ? AND status IN ('unread', 'read')",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(message_id.to_string())
        .execute(self.db.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_deleted(&self, message_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE inbox SET status = 'deleted', deleted_at = ?
             WHERE message_id = ? AND status != 'deleted'",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(message_id.to_string())
        .execute(self.db.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Drop rows marked deleted longer ago than the retention window.
    pub async fn purge_deleted(&self, retention_hours: i64) -> Result<u64, StoreError> {
        let cutoff = (Utc::now() - Duration::hours(retention_hours)).to_rfc3339();
        let result = sqlx::query(
            "DELETE FROM inbox WHERE status = 'deleted' AND deleted_at IS NOT NULL AND deleted_at < ?",
        )
        .bind(cutoff)
        .execute(self.db.pool())
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn count_unread(&self) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM inbox WHERE status = 'unread'")
            .fetch_one(self.db.pool())
            .await?;
        Ok(row.get::<i64, _>("n"))
    }

    fn entry_from_row(row: sqlx::sqlite::SqliteRow) -> Result<InboxEntry, StoreError> {
        let status_raw: String = row.get("status");
        Ok(InboxEntry {
            message_id: parse_uuid(&row.get::<String, _>("message_id"))?,
            swarm_id: parse_uuid(&row.get::<String, _>("swarm_id"))?,
            sender_id: row.get("sender_id"),
            message_type: row.get("message_type"),
            content: row.get("content"),
            received_at: parse_ts(&row.get::<String, _>("received_at"))?,
            status: InboxStatus::parse(&status_raw)
                .ok_or_else(|| StoreError::Corrupt(format!("bad inbox status '{status_raw}'")))?,
            read_at: parse_opt_ts(row.get("read_at"))?,
            archived_at: parse_opt_ts(row.get("archived_at"))?,
            deleted_at: parse_opt_ts(row.get("deleted_at"))?,
        })
    }
}
