// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! State export/import: 2.0.0 round trip, legacy 1.0.0 status mapping,
//! replace-vs-merge semantics.

use chrono::Utc;
use uuid::Uuid;

use mesh_core::domain::inbox::{InboxEntry, InboxStatus, PublicKeyEntry};
use mesh_core::infrastructure::crypto::NodeKeypair;
use mesh_core::infrastructure::db::Database;
use mesh_core::infrastructure::export::{export_state, import_state, ExportError};
use mesh_core::infrastructure::repositories::{
    InboxRepository, MembershipRepository, MuteRepository, OutboxRepository, PublicKeyRepository,
};

mod common;

async fn populate(db: &Database) -> Uuid {
    let master = NodeKeypair::generate();
    let peer = NodeKeypair::generate();
    let swarm = common::swarm_with(
        common::member_of(&master, "m"),
        vec![common::member_of(&peer, "n")],
    );
    MembershipRepository::new(db.clone())
        .upsert_swarm(&swarm)
        .await
        .unwrap();

    let mutes = MuteRepository::new(db.clone());
    mutes.mute_agent("spammer", Some("noise")).await.unwrap();
    mutes.mute_swarm(Uuid::new_v4(), None).await.unwrap();

    PublicKeyRepository::new(db.clone())
        .upsert(&PublicKeyEntry {
            agent_id: "n".into(),
            public_key: peer.public_key_b64(),
            endpoint: common::DEAD_ENDPOINT.into(),
            fetched_at: Utc::now(),
        })
        .await
        .unwrap();

    let inbox = InboxRepository::new(db.clone());
    let mut entry = InboxEntry {
        message_id: Uuid::new_v4(),
        swarm_id: swarm.swarm_id,
        sender_id: "n".into(),
        message_type: "message".into(),
        content: "{\"content\":\"hello\"}".into(),
        received_at: Utc::now(),
        status: InboxStatus::Unread,
        read_at: None,
        archived_at: None,
        deleted_at: None,
    };
    inbox.insert(&entry).await.unwrap();
    entry.message_id = Uuid::new_v4();
    inbox.insert(&entry).await.unwrap();
    inbox.mark_read(entry.message_id).await.unwrap();

    OutboxRepository::new(db.clone())
        .record_queued(Uuid::new_v4(), swarm.swarm_id, "n")
        .await
        .unwrap();

    swarm.swarm_id
}

#[tokio::test]
async fn export_import_round_trip() {
    let (_dir, source) = common::test_db().await;
    let swarm_id = populate(&source).await;
    let exported = export_state(&source, "m").await.unwrap();
    assert_eq!(exported.schema_version, "2.0.0");
    assert_eq!(exported.swarms.len(), 1);
    assert_eq!(exported.inbox.len(), 2);
    assert_eq!(exported.mutes.len(), 2);

    let (_dir2, target) = common::test_db().await;
    let document = serde_json::to_value(&exported).unwrap();
    let stats = import_state(&target, &document, false).await.unwrap();
    assert_eq!(stats.swarms, 1);
    assert_eq!(stats.inbox, 2);
    assert_eq!(stats.outbox, 1);

    // import(export(S)) preserves the state.
    let again = export_state(&target, "m").await.unwrap();
    assert_eq!(again.swarms.len(), 1);
    assert_eq!(again.swarms[0].swarm_id, swarm_id);
    assert_eq!(again.swarms[0].members.len(), 2);
    assert_eq!(again.swarms[0].master, "m");
    assert_eq!(again.inbox.len(), 2);
    assert_eq!(again.mutes.len(), 2);
    assert_eq!(again.public_keys.len(), 1);
    assert_eq!(again.outbox.len(), 1);

    let statuses: Vec<_> = again.inbox.iter().map(|e| e.status).collect();
    assert!(statuses.contains(&InboxStatus::Unread));
    assert!(statuses.contains(&InboxStatus::Read));
}

#[tokio::test]
async fn replace_clears_merge_keeps() {
    let (_dir, db) = common::test_db().await;
    populate(&db).await;

    // An empty 2.0.0 document.
    let empty = serde_json::json!({
        "schema_version": "2.0.0",
        "agent_id": "m",
        "exported_at": Utc::now().to_rfc3339(),
        "swarms": [],
        "mutes": [],
        "public_keys": [],
        "inbox": [],
        "outbox": [],
    });

    // Merge of an empty document changes nothing.
    import_state(&db, &empty, true).await.unwrap();
    assert_eq!(export_state(&db, "m").await.unwrap().inbox.len(), 2);

    // Replace wipes the imported tables.
    import_state(&db, &empty, false).await.unwrap();
    let after = export_state(&db, "m").await.unwrap();
    assert!(after.swarms.is_empty());
    assert!(after.inbox.is_empty());
    assert!(after.mutes.is_empty());
}

#[tokio::test]
async fn unsupported_version_rejected() {
    let (_dir, db) = common::test_db().await;
    let document = serde_json::json!({"schema_version": "3.1.4"});
    assert!(matches!(
        import_state(&db, &document, false).await,
        Err(ExportError::UnsupportedVersion(_))
    ));
    let document = serde_json::json!({"agent_id": "m"});
    assert!(matches!(
        import_state(&db, &document, false).await,
        Err(ExportError::Malformed(_))
    ));
}

#[tokio::test]
async fn legacy_v1_queue_statuses_map_onto_inbox() {
    let (_dir, db) = common::test_db().await;
    let swarm_id = Uuid::new_v4();
    let ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
    let now = Utc::now().to_rfc3339();

    let legacy = serde_json::json!({
        "schema_version": "1.0.0",
        "agent_id": "m",
        "swarms": {
            swarm_id.to_string(): {
                "swarm_id": swarm_id.to_string(),
                "name": "dev",
                "master": "m",
                "joined_at": now,
                "members": [
                    {"agent_id": "m", "endpoint": "https://m.example.com", "public_key": "cGs=", "joined_at": now}
                ],
                "settings": {"allow_member_invite": true, "require_approval": false}
            }
        },
        "muted_agents": ["spammer"],
        "muted_swarms": [],
        "public_keys": {
            "n": {"public_key": "cGs=", "fetched_at": now, "endpoint": "https://n.example.com"}
        },
        "message_queue": [
            {"message_id": ids[0].to_string(), "swarm_id": swarm_id.to_string(), "sender_id": "n",
             "message_type": "message", "content": "a", "received_at": now, "status": "pending"},
            {"message_id": ids[1].to_string(), "swarm_id": swarm_id.to_string(), "sender_id": "n",
             "message_type": "message", "content": "b", "received_at": now, "status": "processing"},
            {"message_id": ids[2].to_string(), "swarm_id": swarm_id.to_string(), "sender_id": "n",
             "message_type": "message", "content": "c", "received_at": now, "status": "completed",
             "processed_at": now},
            {"message_id": ids[3].to_string(), "swarm_id": swarm_id.to_string(), "sender_id": "n",
             "message_type": "message", "content": "d", "received_at": now, "status": "failed"}
        ]
    });

    let stats = import_state(&db, &legacy, false).await.unwrap();
    assert_eq!(stats.swarms, 1);
    assert_eq!(stats.inbox, 4);

    let inbox = InboxRepository::new(db.clone());
    assert_eq!(
        inbox.get(ids[0]).await.unwrap().unwrap().status,
        InboxStatus::Unread
    );
    assert_eq!(
        inbox.get(ids[1]).await.unwrap().unwrap().status,
        InboxStatus::Unread
    );
    let completed = inbox.get(ids[2]).await.unwrap().unwrap();
    assert_eq!(completed.status, InboxStatus::Read);
    assert!(completed.read_at.is_some());
    assert_eq!(
        inbox.get(ids[3]).await.unwrap().unwrap().status,
        InboxStatus::Read
    );

    let swarm = MembershipRepository::new(db.clone())
        .get_swarm(swarm_id)
        .await
        .unwrap()
        .unwrap();
    assert!(swarm.settings.allow_member_invite);
    assert_eq!(swarm.master, "m");
}
