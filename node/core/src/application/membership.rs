// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Swarm lifecycle operations.
//!
//! The inviting node is the join authority: it issued the token, holds the
//! metering row, and commits the member insert atomically with the token
//! use. Lifecycle notifications are emitted fire-and-forget; their failure
//! never rolls back the operation that triggered them.

use chrono::{Duration, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::notifications::NotificationService;
use crate::domain::invite::{
    InviteUrl, IssuedToken, JoinAccepted, JoinRequest, JoinSender, TokenError,
};
use crate::domain::swarm::{Member, MembershipError, SwarmMembership, SwarmSettings};
use crate::infrastructure::crypto::{sign_join_request, NodeKeypair};
use crate::infrastructure::db::Database;
use crate::infrastructure::repositories::{
    InviteTokenRepository, JoinCommit, MembershipRepository, MuteRepository, PendingJoin,
    StoreError,
};
use crate::infrastructure::tokens::{
    generate_invite, peek_claims, token_hash, verify_invite, GeneratedInvite,
};
use crate::infrastructure::transport::{Transport, TransportError};

#[derive(Debug, Error)]
pub enum MembershipOpError {
    #[error(transparent)]
    Authority(#[from] MembershipError),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("join rejected by remote: {0}")]
    Remote(String),
}

/// Result of processing a join request on the inviting node.
#[derive(Debug, Clone)]
pub enum JoinOutcome {
    Accepted(SwarmMembership),
    /// Idempotent re-join: membership unchanged, nothing emitted.
    AlreadyMember(SwarmMembership),
    Pending {
        swarm_id: Uuid,
    },
}

pub struct MembershipService {
    db: Database,
    keypair: NodeKeypair,
    agent_id: String,
    endpoint: String,
    notifications: Arc<NotificationService>,
    transport: Transport,
}

impl MembershipService {
    pub fn new(
        db: Database,
        keypair: NodeKeypair,
        agent_id: &str,
        endpoint: &str,
        notifications: Arc<NotificationService>,
        transport: Transport,
    ) -> Self {
        Self {
            db,
            keypair,
            agent_id: agent_id.to_string(),
            endpoint: endpoint.to_string(),
            notifications,
            transport,
        }
    }

    fn repo(&self) -> MembershipRepository {
        MembershipRepository::new(self.db.clone())
    }

    async fn load_swarm(&self, swarm_id: Uuid) -> Result<SwarmMembership, MembershipOpError> {
        self.repo()
            .get_swarm(swarm_id)
            .await?
            .ok_or_else(|| MembershipError::SwarmNotFound(swarm_id).into())
    }

    fn self_member(&self) -> Member {
        Member {
            agent_id: self.agent_id.clone(),
            endpoint: self.endpoint.clone(),
            public_key: self.keypair.public_key_b64(),
            joined_at: Utc::now(),
        }
    }

    /// Create a new swarm with this node as master and sole member.
    pub async fn create_swarm(
        &self,
        name: &str,
        settings: SwarmSettings,
    ) -> Result<SwarmMembership, MembershipOpError> {
        let swarm = SwarmMembership::create(name.to_string(), self.self_member(), settings)
            .map_err(MembershipOpError::Authority)?;
        self.repo().upsert_swarm(&swarm).await?;
        info!(swarm_id = %swarm.swarm_id, name, "created swarm");
        Ok(swarm)
    }

    /// Issue an invite token for a swarm this node may invite into, and
    /// record its metering row.
    pub async fn generate_invite(
        &self,
        swarm_id: Uuid,
        expires_in: Option<Duration>,
        max_uses: Option<u32>,
    ) -> Result<GeneratedInvite, MembershipOpError> {
        let swarm = self.load_swarm(swarm_id).await?;
        swarm
            .can_invite(&self.agent_id)
            .map_err(MembershipOpError::Authority)?;
        let invite = generate_invite(
            self.keypair.signing_key(),
            swarm_id,
            &self.agent_id,
            &self.endpoint,
            expires_in,
            max_uses,
        )?;
        let now = Utc::now();
        InviteTokenRepository::new(self.db.clone())
            .record(&IssuedToken {
                token_hash: invite.token_hash.clone(),
                swarm_id,
                max_uses,
                uses: 0,
                created_at: now,
                expires_at: expires_in.map(|d| now + d),
                revoked: false,
            })
            .await?;
        info!(swarm_id = %swarm_id, max_uses = ?max_uses, "issued invite token");
        Ok(invite)
    }

    pub async fn revoke_invite(&self, token_hash: &str) -> Result<bool, MembershipOpError> {
        Ok(InviteTokenRepository::new(self.db.clone())
            .revoke(token_hash)
            .await?)
    }

    /// Process an inbound join request. The request signature has already
    /// been verified by the receiver; this enforces the token and the
    /// membership state machine.
    pub async fn handle_join(
        &self,
        request: &JoinRequest,
    ) -> Result<JoinOutcome, MembershipOpError> {
        let swarm = self.load_swarm(request.swarm_id).await?;

        // Idempotent re-join: current membership, no token use, no
        // member_joined emission.
        if swarm.is_member(&request.sender.agent_id) {
            info!(swarm_id = %swarm.swarm_id, agent = %request.sender.agent_id,
                  "re-join short-circuited");
            return Ok(JoinOutcome::AlreadyMember(swarm));
        }

        // This node issued the token; it must still hold invite authority.
        swarm
            .can_invite(&self.agent_id)
            .map_err(MembershipOpError::Authority)?;

        let claims = verify_invite(&request.invite_token, &self.keypair.verifying_key())?;
        if claims.swarm_id != request.swarm_id {
            return Err(TokenError::Invalid(format!(
                "token swarm '{}' does not match request swarm '{}'",
                claims.swarm_id, request.swarm_id
            ))
            .into());
        }

        if swarm.settings.require_approval {
            self.repo()
                .park_pending_join(&PendingJoin {
                    swarm_id: swarm.swarm_id,
                    agent_id: request.sender.agent_id.clone(),
                    endpoint: request.sender.endpoint.clone(),
                    public_key: request.sender.public_key.clone(),
                    requested_at: Utc::now(),
                })
                .await?;
            info!(swarm_id = %swarm.swarm_id, agent = %request.sender.agent_id,
                  "join parked for master approval");
            return Ok(JoinOutcome::Pending {
                swarm_id: swarm.swarm_id,
            });
        }

        let member = Member {
            agent_id: request.sender.agent_id.clone(),
            endpoint: request.sender.endpoint.clone(),
            public_key: request.sender.public_key.clone(),
            joined_at: Utc::now(),
        };
        match self
            .repo()
            .commit_join(swarm.swarm_id, &member, &token_hash(&request.invite_token))
            .await?
        {
            JoinCommit::Committed => {}
            JoinCommit::TokenUnknown => {
                return Err(TokenError::Invalid("token was not issued by this node".into()).into())
            }
            JoinCommit::TokenExhausted => return Err(TokenError::Exhausted.into()),
            JoinCommit::TokenRevoked => return Err(TokenError::Revoked.into()),
        }

        let updated = self.load_swarm(swarm.swarm_id).await?;
        if let Err(e) = self
            .notifications
            .emit_broadcast(
                &updated,
                "member_joined",
                &member.agent_id,
                None,
                None,
                &[member.agent_id.as_str()],
            )
            .await
        {
            warn!(error = %e, "member_joined notification failed");
        }
        info!(swarm_id = %swarm.swarm_id, agent = %member.agent_id, "member joined");
        Ok(JoinOutcome::Accepted(updated))
    }

    /// Master decision completing a parked join.
    pub async fn approve_join(
        &self,
        swarm_id: Uuid,
        agent_id: &str,
    ) -> Result<SwarmMembership, MembershipOpError> {
        let swarm = self.load_swarm(swarm_id).await?;
        swarm
            .require_master(&self.agent_id)
            .map_err(MembershipOpError::Authority)?;
        let pending = self
            .repo()
            .take_pending_join(swarm_id, agent_id)
            .await?
            .ok_or_else(|| MembershipError::MemberNotFound(agent_id.to_string()))?;
        let member = Member {
            agent_id: pending.agent_id,
            endpoint: pending.endpoint,
            public_key: pending.public_key,
            joined_at: Utc::now(),
        };
        self.repo().add_member(swarm_id, &member).await?;
        let updated = self.load_swarm(swarm_id).await?;
        if let Err(e) = self
            .notifications
            .emit_broadcast(
                &updated,
                "member_joined",
                &member.agent_id,
                Some(&self.agent_id),
                None,
                &[],
            )
            .await
        {
            warn!(error = %e, "member_joined notification failed");
        }
        Ok(updated)
    }

    pub async fn reject_join(
        &self,
        swarm_id: Uuid,
        agent_id: &str,
    ) -> Result<bool, MembershipOpError> {
        let swarm = self.load_swarm(swarm_id).await?;
        swarm
            .require_master(&self.agent_id)
            .map_err(MembershipOpError::Authority)?;
        Ok(self
            .repo()
            .take_pending_join(swarm_id, agent_id)
            .await?
            .is_some())
    }

    /// Leave a swarm. A leaving master dissolves the swarm.
    pub async fn leave(&self, swarm_id: Uuid) -> Result<(), MembershipOpError> {
        let swarm = self.load_swarm(swarm_id).await?;
        if !swarm.is_member(&self.agent_id) {
            return Err(MembershipError::NotMember(self.agent_id.clone()).into());
        }
        let action = if swarm.is_master(&self.agent_id) {
            "swarm_dissolved"
        } else {
            "member_left"
        };
        if let Err(e) = self
            .notifications
            .emit_broadcast(&swarm, action, &self.agent_id, None, None, &[])
            .await
        {
            warn!(error = %e, action, "leave notification failed");
        }
        self.repo().remove_swarm(swarm_id).await?;
        info!(swarm_id = %swarm_id, action, "left swarm");
        Ok(())
    }

    /// Remove a member. Master only. The target gets a direct `kicked`
    /// before the remaining members hear `member_kicked`.
    pub async fn kick(
        &self,
        swarm_id: Uuid,
        target: &str,
        reason: Option<&str>,
    ) -> Result<SwarmMembership, MembershipOpError> {
        let swarm = self.load_swarm(swarm_id).await?;
        swarm
            .require_master(&self.agent_id)
            .map_err(MembershipOpError::Authority)?;
        if !swarm.is_member(target) {
            return Err(MembershipError::MemberNotFound(target.to_string()).into());
        }
        if target == self.agent_id {
            return Err(MembershipError::NotAuthorized.into());
        }
        if let Err(e) = self
            .notifications
            .emit_direct(&swarm, target, "kicked", target, Some(&self.agent_id), reason)
            .await
        {
            warn!(error = %e, "kicked notification failed");
        }
        if let Err(e) = self
            .notifications
            .emit_broadcast(
                &swarm,
                "member_kicked",
                target,
                Some(&self.agent_id),
                reason,
                &[target],
            )
            .await
        {
            warn!(error = %e, "member_kicked notification failed");
        }
        self.repo().remove_member(swarm_id, target).await?;
        info!(swarm_id = %swarm_id, kicked = target, "member kicked");
        self.load_swarm(swarm_id).await
    }

    /// Offer the master role to another member. The swap happens in
    /// `complete_transfer` once the target's acceptance arrives.
    pub async fn initiate_transfer(
        &self,
        swarm_id: Uuid,
        target: &str,
    ) -> Result<(), MembershipOpError> {
        let swarm = self.load_swarm(swarm_id).await?;
        swarm
            .require_master(&self.agent_id)
            .map_err(MembershipOpError::Authority)?;
        if !swarm.is_member(target) {
            return Err(MembershipError::MemberNotFound(target.to_string()).into());
        }
        if let Err(e) = self
            .notifications
            .emit_direct(
                &swarm,
                target,
                "master_transfer",
                target,
                Some(&self.agent_id),
                None,
            )
            .await
        {
            warn!(error = %e, "master_transfer notification failed");
        }
        Ok(())
    }

    /// Swap the master after the target accepted, and broadcast
    /// `master_changed` to everyone.
    pub async fn complete_transfer(
        &self,
        swarm_id: Uuid,
        new_master: &str,
    ) -> Result<SwarmMembership, MembershipOpError> {
        let swarm = self.load_swarm(swarm_id).await?;
        swarm
            .require_master(&self.agent_id)
            .map_err(MembershipOpError::Authority)?;
        if !swarm.is_member(new_master) {
            return Err(MembershipError::MemberNotFound(new_master.to_string()).into());
        }
        self.repo().set_master(swarm_id, new_master).await?;
        let updated = self.load_swarm(swarm_id).await?;
        if let Err(e) = self
            .notifications
            .emit_broadcast(
                &updated,
                "master_changed",
                new_master,
                Some(&self.agent_id),
                None,
                &[],
            )
            .await
        {
            warn!(error = %e, "master_changed notification failed");
        }
        info!(swarm_id = %swarm_id, old = %self.agent_id, new = %new_master, "master changed");
        Ok(updated)
    }

    /// Target side of a transfer offer: notify the master of the decision.
    pub async fn respond_transfer(
        &self,
        swarm_id: Uuid,
        accept: bool,
    ) -> Result<(), MembershipOpError> {
        let swarm = self.load_swarm(swarm_id).await?;
        if !swarm.is_member(&self.agent_id) {
            return Err(MembershipError::NotMember(self.agent_id.clone()).into());
        }
        let action = if accept {
            "transfer_accepted"
        } else {
            "transfer_declined"
        };
        let master = swarm.master.clone();
        if let Err(e) = self
            .notifications
            .emit_direct(&swarm, &master, action, &self.agent_id, None, None)
            .await
        {
            warn!(error = %e, action, "transfer response failed");
        }
        Ok(())
    }

    /// Mute an agent or a swarm locally. Muting never leaves this node.
    pub async fn mute_agent(
        &self,
        agent_id: &str,
        reason: Option<&str>,
    ) -> Result<(), MembershipOpError> {
        MuteRepository::new(self.db.clone())
            .mute_agent(agent_id, reason)
            .await?;
        Ok(())
    }

    pub async fn unmute_agent(&self, agent_id: &str) -> Result<bool, MembershipOpError> {
        Ok(MuteRepository::new(self.db.clone())
            .unmute_agent(agent_id)
            .await?)
    }

    pub async fn mute_swarm(
        &self,
        swarm_id: Uuid,
        reason: Option<&str>,
    ) -> Result<(), MembershipOpError> {
        MuteRepository::new(self.db.clone())
            .mute_swarm(swarm_id, reason)
            .await?;
        Ok(())
    }

    pub async fn unmute_swarm(&self, swarm_id: Uuid) -> Result<bool, MembershipOpError> {
        Ok(MuteRepository::new(self.db.clone())
            .unmute_swarm(swarm_id)
            .await?)
    }

    /// Client side of the join flow: present an invite URL to the issuing
    /// node and persist the returned membership locally.
    pub async fn join_remote(&self, invite_url: &str) -> Result<JoinOutcome, MembershipOpError> {
        let url = InviteUrl::parse(invite_url)?;
        let claims = peek_claims(&url.jwt)?;
        if claims.swarm_id != url.swarm_id {
            return Err(TokenError::Invalid("URL swarm does not match token".into()).into());
        }
        let mut request = JoinRequest {
            swarm_id: url.swarm_id,
            invite_token: url.jwt.clone(),
            sender: JoinSender {
                agent_id: self.agent_id.clone(),
                endpoint: self.endpoint.clone(),
                public_key: self.keypair.public_key_b64(),
            },
            timestamp: Utc::now(),
            signature: String::new(),
        };
        request.signature = sign_join_request(&request, self.keypair.signing_key());

        let delivery = self.transport.post_join(&claims.endpoint, &request).await?;
        if delivery.status == 202 {
            return Ok(JoinOutcome::Pending {
                swarm_id: url.swarm_id,
            });
        }
        let body = delivery
            .body
            .ok_or_else(|| MembershipOpError::Remote("empty join response".into()))?;
        let accepted: JoinAccepted = serde_json::from_value(body)
            .map_err(|e| MembershipOpError::Remote(format!("malformed join response: {e}")))?;

        let swarm = SwarmMembership {
            swarm_id: accepted.swarm_id,
            name: accepted.swarm_name.unwrap_or_default(),
            created_at: Utc::now(),
            master: claims.master.clone(),
            members: accepted.members,
            settings: SwarmSettings::default(),
        };
        self.repo().upsert_swarm(&swarm).await?;
        info!(swarm_id = %swarm.swarm_id, "joined swarm");
        Ok(JoinOutcome::Accepted(swarm))
    }
}
