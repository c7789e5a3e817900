// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Repository pattern over the node store.
//!
//! One repository per aggregate. All of them borrow the shared
//! [`Database`](crate::infrastructure::db::Database) pool; mutations that
//! must be atomic (the join commit, swarm upserts) run in transactions.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

mod inbox;
mod keys;
mod membership;
mod mutes;
mod outbox;
mod sessions;
mod tokens;

pub use inbox::InboxRepository;
pub use keys::PublicKeyRepository;
pub use membership::{JoinCommit, MembershipRepository, PendingJoin};
pub use mutes::MuteRepository;
pub use outbox::OutboxRepository;
pub use sessions::SdkSessionRepository;
pub use tokens::InviteTokenRepository;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub(crate) fn parse_ts(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp '{raw}': {e}")))
}

pub(crate) fn parse_opt_ts(raw: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    raw.as_deref().map(parse_ts).transpose()
}

pub(crate) fn parse_uuid(raw: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(raw).map_err(|e| StoreError::Corrupt(format!("bad uuid '{raw}': {e}")))
}
