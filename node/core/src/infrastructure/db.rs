// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! SQLite connection pool and schema lifecycle.
//!
//! Wraps `sqlx::SqlitePool` in a thin `Database` newtype injected into the
//! repositories. The store is node-local: one WAL-mode database file per
//! node, created on first startup. Writes serialize per swarm through the
//! repositories' transactions; reads are unrestricted.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;

use crate::infrastructure::repositories::StoreError;

/// Store schema version recorded in `schema_versions`.
pub const SCHEMA_VERSION: &str = "2.0.0";

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if missing) the node database and initialize the
    /// schema. Returns only after the schema is durable.
    pub async fn connect(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Unavailable(format!("cannot create {parent:?}: {e}")))?;
            }
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        sqlx::query(
            "INSERT OR IGNORE INTO schema_versions (version, applied_at) VALUES (?, datetime('now'))",
        )
        .bind(SCHEMA_VERSION)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS schema_versions (
        version    TEXT PRIMARY KEY,
        applied_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS swarms (
        swarm_id            TEXT PRIMARY KEY,
        name                TEXT NOT NULL CHECK(length(name) BETWEEN 1 AND 256),
        master              TEXT NOT NULL,
        created_at          TEXT NOT NULL,
        allow_member_invite INTEGER NOT NULL DEFAULT 0,
        require_approval    INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS swarm_members (
        agent_id   TEXT NOT NULL,
        swarm_id   TEXT NOT NULL,
        endpoint   TEXT NOT NULL,
        public_key TEXT NOT NULL,
        joined_at  TEXT NOT NULL,
        PRIMARY KEY (agent_id, swarm_id),
        FOREIGN KEY (swarm_id) REFERENCES swarms(swarm_id) ON DELETE CASCADE
    )",
    "CREATE INDEX IF NOT EXISTS idx_members_swarm ON swarm_members(swarm_id)",
    "CREATE TABLE IF NOT EXISTS inbox (
        message_id   TEXT PRIMARY KEY,
        swarm_id     TEXT NOT NULL,
        sender_id    TEXT NOT NULL,
        message_type TEXT NOT NULL,
        content      TEXT NOT NULL,
        received_at  TEXT NOT NULL,
        status       TEXT NOT NULL DEFAULT 'unread'
                     CHECK(status IN ('unread', 'read', 'archived', 'deleted')),
        read_at      TEXT,
        archived_at  TEXT,
        deleted_at   TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_inbox_status ON inbox(status, received_at)",
    "CREATE INDEX IF NOT EXISTS idx_inbox_swarm ON inbox(swarm_id)",
    "CREATE INDEX IF NOT EXISTS idx_inbox_sender ON inbox(sender_id)",
    "CREATE TABLE IF NOT EXISTS outbox (
        message_id   TEXT NOT NULL,
        swarm_id     TEXT NOT NULL,
        recipient    TEXT NOT NULL,
        status       TEXT NOT NULL DEFAULT 'queued'
                     CHECK(status IN ('queued', 'delivered', 'failed')),
        attempts     INTEGER NOT NULL DEFAULT 0,
        last_error   TEXT,
        created_at   TEXT NOT NULL,
        delivered_at TEXT,
        PRIMARY KEY (message_id, recipient)
    )",
    "CREATE INDEX IF NOT EXISTS idx_outbox_swarm ON outbox(swarm_id)",
    "CREATE INDEX IF NOT EXISTS idx_outbox_status ON outbox(status, created_at)",
    "CREATE TABLE IF NOT EXISTS muted_agents (
        agent_id   TEXT PRIMARY KEY,
        reason     TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS muted_swarms (
        swarm_id   TEXT PRIMARY KEY,
        reason     TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS public_keys (
        agent_id   TEXT PRIMARY KEY,
        public_key TEXT NOT NULL,
        endpoint   TEXT NOT NULL,
        fetched_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS invite_tokens (
        token_hash TEXT PRIMARY KEY,
        swarm_id   TEXT NOT NULL,
        max_uses   INTEGER,
        uses       INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        expires_at TEXT,
        revoked    INTEGER NOT NULL DEFAULT 0,
        FOREIGN KEY (swarm_id) REFERENCES swarms(swarm_id) ON DELETE CASCADE
    )",
    "CREATE TABLE IF NOT EXISTS pending_joins (
        swarm_id     TEXT NOT NULL,
        agent_id     TEXT NOT NULL,
        endpoint     TEXT NOT NULL,
        public_key   TEXT NOT NULL,
        requested_at TEXT NOT NULL,
        PRIMARY KEY (swarm_id, agent_id),
        FOREIGN KEY (swarm_id) REFERENCES swarms(swarm_id) ON DELETE CASCADE
    )",
    "CREATE TABLE IF NOT EXISTS sdk_sessions (
        swarm_id    TEXT NOT NULL,
        peer_id     TEXT NOT NULL,
        session_id  TEXT NOT NULL,
        last_active TEXT NOT NULL,
        PRIMARY KEY (swarm_id, peer_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_sessions_last_active ON sdk_sessions(last_active)",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn schema_initializes_idempotently() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mesh.db");
        let db = Database::connect(&path).await.unwrap();
        // Reconnect against the same file: all DDL must be re-runnable.
        drop(db);
        let db = Database::connect(&path).await.unwrap();
        let row: (String,) =
            sqlx::query_as("SELECT version FROM schema_versions ORDER BY version DESC LIMIT 1")
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert_eq!(row.0, SCHEMA_VERSION);
    }
}
