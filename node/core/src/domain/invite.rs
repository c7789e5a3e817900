// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Invite token claims and the `swarm://` URL form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::error::ErrorCode;

/// Claims carried by an invite JWT (alg=EdDSA, signed by the issuing
/// node; `master` names that authority).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteClaims {
    pub swarm_id: Uuid,
    pub master: String,
    pub endpoint: String,
    /// Issued-at, seconds since the Unix epoch.
    pub iat: i64,
    /// Wire-format expiry; absent means the token never expires.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_uses: Option<u32>,
}

/// An issued-token metering row, keyed by the SHA-256 of the JWT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token_hash: String,
    pub swarm_id: Uuid,
    pub max_uses: Option<u32>,
    pub uses: u32,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("invalid invite token: {0}")]
    Invalid(String),
    #[error("invite token expired at {0}")]
    Expired(String),
    #[error("invite token has no remaining uses")]
    Exhausted,
    #[error("invite token was revoked")]
    Revoked,
}

impl TokenError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Invalid(_) => ErrorCode::InvalidToken,
            Self::Expired(_) => ErrorCode::TokenExpired,
            Self::Exhausted => ErrorCode::TokenExhausted,
            Self::Revoked => ErrorCode::TokenRevoked,
        }
    }
}

/// A parsed `swarm://<swarm_id>@<host>?token=<jwt>` invite URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteUrl {
    pub swarm_id: Uuid,
    pub host: String,
    pub jwt: String,
}

impl InviteUrl {
    pub fn format(swarm_id: Uuid, host: &str, jwt: &str) -> String {
        format!("swarm://{swarm_id}@{host}?token={jwt}")
    }

    pub fn parse(url: &str) -> Result<Self, TokenError> {
        let rest = url
            .strip_prefix("swarm://")
            .ok_or_else(|| TokenError::Invalid("URL scheme must be swarm://".into()))?;
        let (swarm_part, rest) = rest
            .split_once('@')
            .ok_or_else(|| TokenError::Invalid("missing '@' separator".into()))?;
        let swarm_id = Uuid::parse_str(swarm_part)
            .map_err(|e| TokenError::Invalid(format!("bad swarm id: {e}")))?;
        let (host, query) = rest
            .split_once('?')
            .ok_or_else(|| TokenError::Invalid("missing token query".into()))?;
        let jwt = query
            .split('&')
            .find_map(|kv| kv.strip_prefix("token="))
            .filter(|t| !t.is_empty())
            .ok_or_else(|| TokenError::Invalid("missing token parameter".into()))?;
        if host.is_empty() {
            return Err(TokenError::Invalid("missing host".into()));
        }
        Ok(Self {
            swarm_id,
            host: host.to_string(),
            jwt: jwt.to_string(),
        })
    }
}

/// Identity a joining agent presents about itself. Self-certifying: the
/// request signature is checked against this very key, proving possession.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinSender {
    pub agent_id: String,
    pub endpoint: String,
    /// Base64-encoded 32-byte Ed25519 public key.
    pub public_key: String,
}

/// Body of a `POST /swarm/join`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    pub swarm_id: Uuid,
    /// The raw invite JWT from the `swarm://` URL.
    pub invite_token: String,
    pub sender: JoinSender,
    #[serde(with = "crate::domain::envelope::wire_time")]
    pub timestamp: DateTime<Utc>,
    pub signature: String,
}

/// Body of a `200` join acceptance, as served by the master.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinAccepted {
    pub status: String,
    pub swarm_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swarm_name: Option<String>,
    pub members: Vec<crate::domain::swarm::Member>,
}

/// Extract `host[:port]` from an absolute URL.
pub fn endpoint_host(endpoint: &str) -> Option<&str> {
    let rest = endpoint.split_once("://")?.1;
    let authority = rest.split(['/', '?', '#']).next()?;
    if authority.is_empty() {
        None
    } else {
        Some(authority)
    }
}
