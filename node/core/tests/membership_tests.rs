// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Membership lifecycle through the service layer: create, invite, join,
//! idempotent re-join, approval, kick, transfer, dissolve.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use mesh_core::application::membership::{JoinOutcome, MembershipOpError, MembershipService};
use mesh_core::application::notifications::NotificationService;
use mesh_core::domain::invite::{JoinRequest, JoinSender, TokenError};
use mesh_core::domain::swarm::{MembershipError, SwarmSettings};
use mesh_core::infrastructure::crypto::{sign_join_request, NodeKeypair};
use mesh_core::infrastructure::db::Database;
use mesh_core::infrastructure::repositories::{InboxRepository, MembershipRepository};
use mesh_core::infrastructure::transport::Transport;

mod common;

const SELF_ENDPOINT: &str = "https://master.example.com/agent";

struct Node {
    _dir: tempfile::TempDir,
    db: Database,
    keypair: NodeKeypair,
    service: MembershipService,
}

async fn node(agent_id: &str) -> Node {
    let (dir, db) = common::test_db().await;
    let keypair = NodeKeypair::generate();
    let transport = Transport::new(agent_id).unwrap();
    let notifications = Arc::new(NotificationService::new(
        db.clone(),
        keypair.clone(),
        agent_id,
        SELF_ENDPOINT,
        transport.clone(),
    ));
    let service = MembershipService::new(
        db.clone(),
        keypair.clone(),
        agent_id,
        SELF_ENDPOINT,
        notifications,
        transport,
    );
    Node {
        _dir: dir,
        db,
        keypair,
        service,
    }
}

fn join_request(swarm_id: Uuid, jwt: &str, keypair: &NodeKeypair, agent_id: &str) -> JoinRequest {
    let mut request = JoinRequest {
        swarm_id,
        invite_token: jwt.to_string(),
        sender: JoinSender {
            agent_id: agent_id.to_string(),
            endpoint: common::DEAD_ENDPOINT.to_string(),
            public_key: keypair.public_key_b64(),
        },
        timestamp: Utc::now(),
        signature: String::new(),
    };
    request.signature = sign_join_request(&request, keypair.signing_key());
    request
}

async fn count_member_joined(db: &Database, swarm_id: Uuid) -> usize {
    InboxRepository::new(db.clone())
        .list(Some(swarm_id), None, 1000)
        .await
        .unwrap()
        .into_iter()
        .filter(|entry| entry.message_type == "system" && entry.content.contains("member_joined"))
        .count()
}

#[tokio::test]
async fn create_invite_join_flow() {
    let master = node("m").await;
    let swarm = master
        .service
        .create_swarm("dev", SwarmSettings::default())
        .await
        .unwrap();
    assert_eq!(swarm.master, "m");
    assert_eq!(swarm.members.len(), 1);

    let invite = master
        .service
        .generate_invite(swarm.swarm_id, Some(chrono::Duration::hours(1)), Some(1))
        .await
        .unwrap();
    assert!(invite
        .url
        .starts_with(&format!("swarm://{}@master.example.com", swarm.swarm_id)));

    let joiner = NodeKeypair::generate();
    let request = join_request(swarm.swarm_id, &invite.jwt, &joiner, "n");
    match master.service.handle_join(&request).await.unwrap() {
        JoinOutcome::Accepted(updated) => {
            let ids: Vec<_> = updated.members.iter().map(|m| m.agent_id.as_str()).collect();
            assert_eq!(ids, ["m", "n"]);
        }
        other => panic!("expected Accepted, got {other:?}"),
    }
    assert_eq!(count_member_joined(&master.db, swarm.swarm_id).await, 1);

    // Same (now exhausted) token presented by a third node.
    let third = NodeKeypair::generate();
    let request = join_request(swarm.swarm_id, &invite.jwt, &third, "p");
    match master.service.handle_join(&request).await {
        Err(MembershipOpError::Token(TokenError::Exhausted)) => {}
        other => panic!("expected TokenExhausted, got {other:?}"),
    }
}

#[tokio::test]
async fn rejoin_is_idempotent_and_emits_nothing() {
    let master = node("m").await;
    let swarm = master
        .service
        .create_swarm("dev", SwarmSettings::default())
        .await
        .unwrap();
    let joiner = NodeKeypair::generate();

    let first = master
        .service
        .generate_invite(swarm.swarm_id, None, Some(1))
        .await
        .unwrap();
    let request = join_request(swarm.swarm_id, &first.jwt, &joiner, "n");
    master.service.handle_join(&request).await.unwrap();
    assert_eq!(count_member_joined(&master.db, swarm.swarm_id).await, 1);

    // A second invite; the already-member rejoins.
    let second = master
        .service
        .generate_invite(swarm.swarm_id, None, Some(1))
        .await
        .unwrap();
    let request = join_request(swarm.swarm_id, &second.jwt, &joiner, "n");
    match master.service.handle_join(&request).await.unwrap() {
        JoinOutcome::AlreadyMember(current) => assert_eq!(current.members.len(), 2),
        other => panic!("expected AlreadyMember, got {other:?}"),
    }
    // Membership unchanged, no second member_joined, token unconsumed.
    assert_eq!(count_member_joined(&master.db, swarm.swarm_id).await, 1);
    let stored = MembershipRepository::new(master.db.clone())
        .get_swarm(swarm.swarm_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.members.len(), 2);
}

#[tokio::test]
async fn join_with_foreign_token_rejected() {
    let master = node("m").await;
    let swarm = master
        .service
        .create_swarm("dev", SwarmSettings::default())
        .await
        .unwrap();
    // Signed by some other key, never issued by this node.
    let outsider = NodeKeypair::generate();
    let forged = mesh_core::infrastructure::tokens::generate_invite(
        outsider.signing_key(),
        swarm.swarm_id,
        "m",
        SELF_ENDPOINT,
        None,
        None,
    )
    .unwrap();
    let joiner = NodeKeypair::generate();
    let request = join_request(swarm.swarm_id, &forged.jwt, &joiner, "n");
    match master.service.handle_join(&request).await {
        Err(MembershipOpError::Token(TokenError::Invalid(_))) => {}
        other => panic!("expected invalid token, got {other:?}"),
    }
}

#[tokio::test]
async fn approval_flow_parks_and_completes() {
    let master = node("m").await;
    let swarm = master
        .service
        .create_swarm(
            "dev",
            SwarmSettings {
                allow_member_invite: false,
                require_approval: true,
            },
        )
        .await
        .unwrap();
    let invite = master
        .service
        .generate_invite(swarm.swarm_id, None, None)
        .await
        .unwrap();
    let joiner = NodeKeypair::generate();
    let request = join_request(swarm.swarm_id, &invite.jwt, &joiner, "n");

    match master.service.handle_join(&request).await.unwrap() {
        JoinOutcome::Pending { swarm_id } => assert_eq!(swarm_id, swarm.swarm_id),
        other => panic!("expected Pending, got {other:?}"),
    }
    // Not a member until the master decides.
    let stored = MembershipRepository::new(master.db.clone())
        .get_swarm(swarm.swarm_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.members.len(), 1);

    let updated = master
        .service
        .approve_join(swarm.swarm_id, "n")
        .await
        .unwrap();
    assert!(updated.is_member("n"));
    // Approving again: the pending row is gone.
    assert!(master.service.approve_join(swarm.swarm_id, "n").await.is_err());
}

#[tokio::test]
async fn kick_requires_master_and_removes_member() {
    let master = node("m").await;
    let swarm = master
        .service
        .create_swarm("dev", SwarmSettings::default())
        .await
        .unwrap();
    let repo = MembershipRepository::new(master.db.clone());
    let peer = common::member_of(&NodeKeypair::generate(), "n");
    repo.add_member(swarm.swarm_id, &peer).await.unwrap();
    let target = common::member_of(&NodeKeypair::generate(), "p");
    repo.add_member(swarm.swarm_id, &target).await.unwrap();

    let updated = master
        .service
        .kick(swarm.swarm_id, "p", Some("inactive"))
        .await
        .unwrap();
    assert!(!updated.is_member("p"));
    assert!(updated.is_member("n"));

    // Kicking a non-member fails cleanly.
    match master.service.kick(swarm.swarm_id, "p", None).await {
        Err(MembershipOpError::Authority(MembershipError::MemberNotFound(_))) => {}
        other => panic!("expected MemberNotFound, got {other:?}"),
    }
    // The master cannot kick itself.
    match master.service.kick(swarm.swarm_id, "m", None).await {
        Err(MembershipOpError::Authority(MembershipError::NotAuthorized)) => {}
        other => panic!("expected NotAuthorized, got {other:?}"),
    }
}

#[tokio::test]
async fn transfer_swaps_master_and_strips_old_authority() {
    let master = node("m").await;
    let swarm = master
        .service
        .create_swarm("dev", SwarmSettings::default())
        .await
        .unwrap();
    let repo = MembershipRepository::new(master.db.clone());
    repo.add_member(
        swarm.swarm_id,
        &common::member_of(&NodeKeypair::generate(), "n"),
    )
    .await
    .unwrap();

    master
        .service
        .initiate_transfer(swarm.swarm_id, "n")
        .await
        .unwrap();
    let updated = master
        .service
        .complete_transfer(swarm.swarm_id, "n")
        .await
        .unwrap();
    assert_eq!(updated.master, "n");

    // This node is no longer master: its kick must fail NOT_MASTER.
    match master.service.kick(swarm.swarm_id, "n", None).await {
        Err(MembershipOpError::Authority(MembershipError::NotMaster(_))) => {}
        other => panic!("expected NotMaster, got {other:?}"),
    }
}

#[tokio::test]
async fn master_leave_dissolves_swarm() {
    let master = node("m").await;
    let swarm = master
        .service
        .create_swarm("dev", SwarmSettings::default())
        .await
        .unwrap();
    master.service.leave(swarm.swarm_id).await.unwrap();
    assert!(MembershipRepository::new(master.db.clone())
        .get_swarm(swarm.swarm_id)
        .await
        .unwrap()
        .is_none());
    // The dissolution notice landed in the local inbox.
    let entries = InboxRepository::new(master.db.clone())
        .list(Some(swarm.swarm_id), None, 10)
        .await
        .unwrap();
    assert!(entries
        .iter()
        .any(|e| e.content.contains("swarm_dissolved")));
}

#[tokio::test]
async fn member_invites_gated_by_settings() {
    let member_node = node("n").await;
    // A swarm this node belongs to but does not master.
    let other_master = common::member_of(&NodeKeypair::generate(), "m");
    let mut swarm = common::swarm_with(other_master, vec![]);
    swarm
        .members
        .push(common::member_of(&member_node.keypair, "n"));
    MembershipRepository::new(member_node.db.clone())
        .upsert_swarm(&swarm)
        .await
        .unwrap();

    match member_node
        .service
        .generate_invite(swarm.swarm_id, None, None)
        .await
    {
        Err(MembershipOpError::Authority(MembershipError::InvitesDisabled)) => {}
        other => panic!("expected InvitesDisabled, got {other:?}"),
    }

    swarm.settings.allow_member_invite = true;
    MembershipRepository::new(member_node.db.clone())
        .upsert_swarm(&swarm)
        .await
        .unwrap();
    assert!(member_node
        .service
        .generate_invite(swarm.swarm_id, None, None)
        .await
        .is_ok());
}
