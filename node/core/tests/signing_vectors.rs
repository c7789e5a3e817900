// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Conformance vectors for the canonical signing payload.
//!
//! These pin the exact byte layout other implementations must reproduce.
//! Changing any of them is a wire-protocol break.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use mesh_core::domain::envelope::wire_timestamp;
use mesh_core::infrastructure::crypto::{
    canonical_payload, sign_envelope, verify_envelope, NodeKeypair,
};

mod common;

#[test]
fn canonical_payload_byte_layout() {
    let message_id = Uuid::parse_str("6f1c1e14-9f3a-4f6e-8e18-5a50c2b5e001").unwrap();
    let swarm_id = Uuid::parse_str("0f8899aa-bb44-4c4c-9d9d-7e7e7e7e7e02").unwrap();
    let payload = canonical_payload(
        &message_id,
        "2026-01-15T12:30:45.123Z",
        &swarm_id,
        "broadcast",
        "message",
        "hi",
    );
    let expected: Vec<u8> = [
        "6f1c1e14-9f3a-4f6e-8e18-5a50c2b5e001".as_bytes(),
        &[0],
        "2026-01-15T12:30:45.123Z".as_bytes(),
        &[0],
        "0f8899aa-bb44-4c4c-9d9d-7e7e7e7e7e02".as_bytes(),
        &[0],
        "broadcast".as_bytes(),
        &[0],
        "message".as_bytes(),
        &[0],
        "hi".as_bytes(),
    ]
    .concat();
    assert_eq!(payload, expected);
    // Six fields, five NUL separators.
    assert_eq!(payload.iter().filter(|b| **b == 0).count(), 5);
}

#[test]
fn empty_content_still_has_all_separators() {
    let id = Uuid::nil();
    let payload = canonical_payload(&id, "t", &id, "r", "m", "");
    assert!(payload.ends_with(&[0]));
    assert_eq!(payload.iter().filter(|b| **b == 0).count(), 5);
}

#[test]
fn timestamp_wire_form_is_millisecond_zulu() {
    let ts = DateTime::parse_from_rfc3339("2026-01-15T12:30:45.123456789Z")
        .unwrap()
        .with_timezone(&Utc);
    assert_eq!(wire_timestamp(&ts), "2026-01-15T12:30:45.123Z");
    let whole = DateTime::parse_from_rfc3339("2026-01-15T12:30:45Z")
        .unwrap()
        .with_timezone(&Utc);
    assert_eq!(wire_timestamp(&whole), "2026-01-15T12:30:45.000Z");
}

#[test]
fn ed25519_signatures_are_deterministic_over_the_payload() {
    let keypair = NodeKeypair::from_seed_b64(
        // 32 zero bytes; a fixed seed so the vector is reproducible.
        "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=",
    )
    .unwrap();
    let swarm_id = Uuid::parse_str("0f8899aa-bb44-4c4c-9d9d-7e7e7e7e7e02").unwrap();
    let mut envelope = common::signed_envelope(&keypair, "alice", swarm_id, "broadcast", "hi");

    // Same covered fields, same key: byte-identical signature.
    let again = sign_envelope(&envelope, keypair.signing_key());
    assert_eq!(envelope.signature, again);

    verify_envelope(&envelope, &keypair.public_key_b64()).unwrap();

    // The wire timestamp string participates byte-for-byte: re-signing
    // after any field change produces a different signature.
    envelope.content.push('!');
    assert_ne!(sign_envelope(&envelope, keypair.signing_key()), again);
}

#[test]
fn signature_covers_exactly_the_six_fields() {
    let keypair = NodeKeypair::generate();
    let swarm_id = Uuid::new_v4();
    let envelope = common::signed_envelope(&keypair, "alice", swarm_id, "bob", "payload");
    let pk = keypair.public_key_b64();

    // Uncovered fields may change freely without breaking the signature.
    let mut relabeled = envelope.clone();
    relabeled.sender.endpoint = "https://elsewhere.example.com/agent".to_string();
    relabeled.in_reply_to = Some(Uuid::new_v4());
    relabeled.metadata = Some(serde_json::Map::new());
    verify_envelope(&relabeled, &pk).unwrap();

    // Covered fields may not.
    let mut tampered = envelope;
    tampered.recipient = "broadcast".to_string();
    assert!(verify_envelope(&tampered, &pk).is_err());
}
