// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Swarm membership records and authority rules.
//!
//! A swarm is a value record: members live in their own table keyed
//! `(swarm_id, agent_id)` and the master is referenced by plain `agent_id`,
//! never by a pointer into the member list.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::error::ErrorCode;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub agent_id: String,
    pub endpoint: String,
    /// Base64-encoded 32-byte Ed25519 public key.
    pub public_key: String,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SwarmSettings {
    #[serde(default)]
    pub allow_member_invite: bool,
    #[serde(default)]
    pub require_approval: bool,
}

/// A swarm as this node knows it. Invariant: `master` is one of `members`,
/// and `members` is ordered by `joined_at` ascending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmMembership {
    pub swarm_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub master: String,
    pub members: Vec<Member>,
    pub settings: SwarmSettings,
}

impl SwarmMembership {
    /// Create a new swarm with the caller as master and sole member.
    pub fn create(
        name: String,
        master: Member,
        settings: SwarmSettings,
    ) -> Result<Self, MembershipError> {
        if name.is_empty() || name.len() > 256 {
            return Err(MembershipError::InvalidName(name));
        }
        Ok(Self {
            swarm_id: Uuid::new_v4(),
            name,
            created_at: master.joined_at,
            master: master.agent_id.clone(),
            members: vec![master],
            settings,
        })
    }

    pub fn member(&self, agent_id: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.agent_id == agent_id)
    }

    pub fn is_member(&self, agent_id: &str) -> bool {
        self.member(agent_id).is_some()
    }

    pub fn is_master(&self, agent_id: &str) -> bool {
        self.master == agent_id
    }

    /// Members other than `agent_id`, for broadcast fan-out.
    pub fn peers_of<'a>(&'a self, agent_id: &'a str) -> impl Iterator<Item = &'a Member> + 'a {
        self.members.iter().filter(move |m| m.agent_id != agent_id)
    }

    /// May `agent_id` issue invites for this swarm?
    pub fn can_invite(&self, agent_id: &str) -> Result<(), MembershipError> {
        if self.is_master(agent_id) {
            return Ok(());
        }
        if !self.is_member(agent_id) {
            return Err(MembershipError::NotMember(agent_id.to_string()));
        }
        if self.settings.allow_member_invite {
            Ok(())
        } else {
            Err(MembershipError::InvitesDisabled)
        }
    }

    /// Master-only operations (kick, transfer, approval decisions).
    pub fn require_master(&self, agent_id: &str) -> Result<(), MembershipError> {
        if self.is_master(agent_id) {
            Ok(())
        } else {
            Err(MembershipError::NotMaster(agent_id.to_string()))
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MembershipError {
    #[error("swarm '{0}' not found")]
    SwarmNotFound(Uuid),
    #[error("agent '{0}' is not a member")]
    NotMember(String),
    #[error("member '{0}' not found in swarm")]
    MemberNotFound(String),
    #[error("agent '{0}' is not the swarm master")]
    NotMaster(String),
    #[error("member invites are disabled for this swarm")]
    InvitesDisabled,
    #[error("operation not authorized")]
    NotAuthorized,
    #[error("join requires master approval")]
    ApprovalRequired,
    #[error("master transfer was declined")]
    TransferDeclined,
    #[error("invalid swarm name '{0}'")]
    InvalidName(String),
}

impl MembershipError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::SwarmNotFound(_) => ErrorCode::SwarmNotFound,
            Self::NotMember(_) => ErrorCode::NotMember,
            Self::MemberNotFound(_) => ErrorCode::MemberNotFound,
            Self::NotMaster(_) => ErrorCode::NotMaster,
            Self::InvitesDisabled => ErrorCode::InvitesDisabled,
            Self::NotAuthorized => ErrorCode::NotAuthorized,
            Self::ApprovalRequired => ErrorCode::ApprovalRequired,
            Self::TransferDeclined => ErrorCode::TransferDeclined,
            Self::InvalidName(_) => ErrorCode::InvalidFormat,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(id: &str) -> Member {
        Member {
            agent_id: id.to_string(),
            endpoint: format!("https://{id}.example.com/agent"),
            public_key: "cGs=".into(),
            joined_at: Utc::now(),
        }
    }

    #[test]
    fn create_puts_master_in_members() {
        let s = SwarmMembership::create("dev".into(), member("m"), SwarmSettings::default())
            .unwrap();
        assert_eq!(s.master, "m");
        assert!(s.is_member("m"));
        assert_eq!(s.members.len(), 1);
    }

    #[test]
    fn name_length_enforced() {
        let long = "x".repeat(257);
        assert!(matches!(
            SwarmMembership::create(long, member("m"), SwarmSettings::default()),
            Err(MembershipError::InvalidName(_))
        ));
        assert!(matches!(
            SwarmMembership::create(String::new(), member("m"), SwarmSettings::default()),
            Err(MembershipError::InvalidName(_))
        ));
    }

    #[test]
    fn invite_authority() {
        let mut s = SwarmMembership::create("dev".into(), member("m"), SwarmSettings::default())
            .unwrap();
        s.members.push(member("n"));

        assert!(s.can_invite("m").is_ok());
        assert_eq!(s.can_invite("n"), Err(MembershipError::InvitesDisabled));
        assert!(matches!(
            s.can_invite("stranger"),
            Err(MembershipError::NotMember(_))
        ));

        s.settings.allow_member_invite = true;
        assert!(s.can_invite("n").is_ok());
    }

    #[test]
    fn master_authority() {
        let s = SwarmMembership::create("dev".into(), member("m"), SwarmSettings::default())
            .unwrap();
        assert!(s.require_master("m").is_ok());
        assert!(matches!(
            s.require_master("n"),
            Err(MembershipError::NotMaster(_))
        ));
    }
}
