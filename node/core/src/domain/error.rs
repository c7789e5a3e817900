// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Wire error codes shared by every endpoint.
//!
//! Each protocol-level failure is translated into the error envelope
//! `{"error": {"code", "message", "details"}}` with one of these codes.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidFormat,
    InvalidSignature,
    NotAuthorized,
    NotMaster,
    NotMember,
    InvitesDisabled,
    ApprovalRequired,
    TransferDeclined,
    SwarmNotFound,
    MemberNotFound,
    InvalidToken,
    TokenExpired,
    TokenExhausted,
    TokenRevoked,
    RateLimited,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidFormat => "INVALID_FORMAT",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::NotAuthorized => "NOT_AUTHORIZED",
            Self::NotMaster => "NOT_MASTER",
            Self::NotMember => "NOT_MEMBER",
            Self::InvitesDisabled => "INVITES_DISABLED",
            Self::ApprovalRequired => "APPROVAL_REQUIRED",
            Self::TransferDeclined => "TRANSFER_DECLINED",
            Self::SwarmNotFound => "SWARM_NOT_FOUND",
            Self::MemberNotFound => "MEMBER_NOT_FOUND",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::TokenExhausted => "TOKEN_EXHAUSTED",
            Self::TokenRevoked => "TOKEN_REVOKED",
            Self::RateLimited => "RATE_LIMITED",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// HTTP status the code maps to on the wire.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidFormat | Self::InvalidToken => 400,
            Self::InvalidSignature => 401,
            Self::NotAuthorized
            | Self::NotMaster
            | Self::NotMember
            | Self::InvitesDisabled
            | Self::ApprovalRequired
            | Self::TransferDeclined
            | Self::TokenExpired
            | Self::TokenExhausted
            | Self::TokenRevoked => 403,
            Self::SwarmNotFound | Self::MemberNotFound => 404,
            Self::RateLimited => 429,
            Self::InternalError => 500,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_serde() {
        let json = serde_json::to_string(&ErrorCode::TokenExhausted).unwrap();
        assert_eq!(json, "\"TOKEN_EXHAUSTED\"");
        let back: ErrorCode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ErrorCode::TokenExhausted);
    }

    #[test]
    fn statuses_match_taxonomy() {
        assert_eq!(ErrorCode::InvalidFormat.http_status(), 400);
        assert_eq!(ErrorCode::InvalidSignature.http_status(), 401);
        assert_eq!(ErrorCode::TokenExhausted.http_status(), 403);
        assert_eq!(ErrorCode::SwarmNotFound.http_status(), 404);
        assert_eq!(ErrorCode::RateLimited.http_status(), 429);
    }
}
