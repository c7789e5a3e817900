// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Ed25519 keypair lifecycle and envelope signing.
//!
//! ## Canonical signing payload
//!
//! The signature covers exactly six envelope fields, concatenated as UTF-8
//! with a single NUL byte between each:
//!
//! ```text
//! message_id \0 timestamp \0 swarm_id \0 recipient \0 type \0 content
//! ```
//!
//! `timestamp` is the wire string (millisecond precision, `Z` suffix) and
//! the UUIDs are hyphenated lowercase. The byte layout is pinned by the
//! conformance vectors in `tests/signing_vectors.rs`; changing it breaks
//! interop with every deployed node.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::envelope::Envelope;

const SEED_FILE: &str = "agent.key";
const PUBLIC_FILE: &str = "agent.pub";

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("signature verification failed")]
    SignatureInvalid,
    #[error("malformed key material: {0}")]
    KeyFormat(String),
    #[error("key storage error: {0}")]
    Io(#[from] std::io::Error),
}

/// Build the canonical byte string covered by an envelope signature.
pub fn canonical_payload(
    message_id: &Uuid,
    timestamp: &str,
    swarm_id: &Uuid,
    recipient: &str,
    message_type: &str,
    content: &str,
) -> Vec<u8> {
    let message_id = message_id.to_string();
    let swarm_id = swarm_id.to_string();
    let parts: [&str; 6] = [
        &message_id,
        timestamp,
        &swarm_id,
        recipient,
        message_type,
        content,
    ];
    nul_joined(&parts)
}

fn nul_joined(parts: &[&str]) -> Vec<u8> {
    let total: usize = parts.iter().map(|p| p.len()).sum();
    let mut payload = Vec::with_capacity(total + parts.len());
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            payload.push(0);
        }
        payload.extend_from_slice(part.as_bytes());
    }
    payload
}

fn envelope_payload(envelope: &Envelope) -> Vec<u8> {
    canonical_payload(
        &envelope.message_id,
        &envelope.wire_timestamp(),
        &envelope.swarm_id,
        &envelope.recipient,
        envelope.message_type.as_str(),
        &envelope.content,
    )
}

/// Sign the envelope's canonical payload; returns the base64 signature.
pub fn sign_envelope(envelope: &Envelope, key: &SigningKey) -> String {
    let signature = key.sign(&envelope_payload(envelope));
    STANDARD.encode(signature.to_bytes())
}

/// Verify an envelope's signature against a base64-encoded public key.
pub fn verify_envelope(envelope: &Envelope, public_key_b64: &str) -> Result<(), CryptoError> {
    let key = decode_public_key(public_key_b64)?;
    let raw = STANDARD
        .decode(&envelope.signature)
        .map_err(|_| CryptoError::SignatureInvalid)?;
    let bytes: [u8; 64] = raw
        .try_into()
        .map_err(|_| CryptoError::SignatureInvalid)?;
    let signature = Signature::from_bytes(&bytes);
    key.verify(&envelope_payload(envelope), &signature)
        .map_err(|_| CryptoError::SignatureInvalid)
}

/// Canonical byte string covered by a join-request signature:
/// `swarm_id \0 agent_id \0 endpoint \0 public_key \0 timestamp \0 token`.
/// Signed with the key named in the request itself, proving possession.
fn join_payload(request: &crate::domain::invite::JoinRequest) -> Vec<u8> {
    let swarm_id = request.swarm_id.to_string();
    let timestamp = crate::domain::envelope::wire_timestamp(&request.timestamp);
    let parts: [&str; 6] = [
        &swarm_id,
        &request.sender.agent_id,
        &request.sender.endpoint,
        &request.sender.public_key,
        &timestamp,
        &request.invite_token,
    ];
    nul_joined(&parts)
}

/// Sign a join request's canonical payload; returns the base64 signature.
pub fn sign_join_request(
    request: &crate::domain::invite::JoinRequest,
    key: &SigningKey,
) -> String {
    STANDARD.encode(key.sign(&join_payload(request)).to_bytes())
}

/// Verify a join request against the public key it carries.
pub fn verify_join_request(
    request: &crate::domain::invite::JoinRequest,
) -> Result<(), CryptoError> {
    let key = decode_public_key(&request.sender.public_key)?;
    let raw = STANDARD
        .decode(&request.signature)
        .map_err(|_| CryptoError::SignatureInvalid)?;
    let bytes: [u8; 64] = raw.try_into().map_err(|_| CryptoError::SignatureInvalid)?;
    key.verify(&join_payload(request), &Signature::from_bytes(&bytes))
        .map_err(|_| CryptoError::SignatureInvalid)
}

/// Decode a base64 32-byte Ed25519 public key.
pub fn decode_public_key(encoded: &str) -> Result<VerifyingKey, CryptoError> {
    let raw = STANDARD
        .decode(encoded)
        .map_err(|e| CryptoError::KeyFormat(format!("bad base64: {e}")))?;
    let bytes: [u8; 32] = raw
        .try_into()
        .map_err(|_| CryptoError::KeyFormat("public key must be 32 bytes".into()))?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| CryptoError::KeyFormat(e.to_string()))
}

pub fn encode_public_key(key: &VerifyingKey) -> String {
    STANDARD.encode(key.as_bytes())
}

/// This node's signing identity, read once at startup and held in memory.
#[derive(Clone)]
pub struct NodeKeypair {
    signing: SigningKey,
}

impl NodeKeypair {
    pub fn generate() -> Self {
        let mut csprng = OsRng;
        Self {
            signing: SigningKey::generate(&mut csprng),
        }
    }

    pub fn from_seed_b64(encoded: &str) -> Result<Self, CryptoError> {
        let raw = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::KeyFormat(format!("bad base64 seed: {e}")))?;
        let seed: [u8; 32] = raw
            .try_into()
            .map_err(|_| CryptoError::KeyFormat("seed must be 32 bytes".into()))?;
        Ok(Self {
            signing: SigningKey::from_bytes(&seed),
        })
    }

    /// Load the keypair from `dir`, generating and persisting one if absent.
    /// The seed file is written with owner-only permissions.
    pub fn load_or_generate(dir: &Path) -> Result<Self, CryptoError> {
        let seed_path = dir.join(SEED_FILE);
        if seed_path.exists() {
            let encoded = std::fs::read_to_string(&seed_path)?;
            return Self::from_seed_b64(&encoded);
        }
        std::fs::create_dir_all(dir)?;
        let keypair = Self::generate();
        std::fs::write(&seed_path, STANDARD.encode(keypair.signing.to_bytes()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&seed_path, std::fs::Permissions::from_mode(0o600))?;
        }
        std::fs::write(dir.join(PUBLIC_FILE), keypair.public_key_b64())?;
        Ok(keypair)
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing.verifying_key()
    }

    pub fn public_key_b64(&self) -> String {
        encode_public_key(&self.signing.verifying_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::envelope::{MessageType, Priority, Sender};
    use chrono::Utc;

    fn signed_sample(key: &SigningKey) -> Envelope {
        let mut env = Envelope {
            protocol_version: crate::PROTOCOL_VERSION.to_string(),
            message_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            sender: Sender {
                agent_id: "alice".into(),
                endpoint: "https://alice.example.com/agent".into(),
            },
            recipient: "broadcast".into(),
            swarm_id: Uuid::new_v4(),
            message_type: MessageType::Message,
            content: "hello".into(),
            signature: String::new(),
            in_reply_to: None,
            thread_id: None,
            priority: Priority::Normal,
            expires_at: None,
            references: None,
            attachments: None,
            metadata: None,
        };
        env.signature = sign_envelope(&env, key);
        env
    }

    #[test]
    fn sign_then_verify() {
        let keypair = NodeKeypair::generate();
        let env = signed_sample(keypair.signing_key());
        verify_envelope(&env, &keypair.public_key_b64()).unwrap();
    }

    #[test]
    fn any_covered_field_mutation_flips_verification() {
        let keypair = NodeKeypair::generate();
        let pk = keypair.public_key_b64();
        let env = signed_sample(keypair.signing_key());

        let mut tampered = env.clone();
        tampered.content.push('!');
        assert!(matches!(
            verify_envelope(&tampered, &pk),
            Err(CryptoError::SignatureInvalid)
        ));

        let mut tampered = env.clone();
        tampered.recipient = "bob".into();
        assert!(verify_envelope(&tampered, &pk).is_err());

        let mut tampered = env.clone();
        tampered.message_id = Uuid::new_v4();
        assert!(verify_envelope(&tampered, &pk).is_err());

        let mut tampered = env.clone();
        tampered.message_type = MessageType::System;
        assert!(verify_envelope(&tampered, &pk).is_err());

        let mut tampered = env;
        tampered.timestamp = tampered.timestamp + chrono::Duration::milliseconds(1);
        assert!(verify_envelope(&tampered, &pk).is_err());
    }

    #[test]
    fn wrong_key_fails() {
        let signer = NodeKeypair::generate();
        let other = NodeKeypair::generate();
        let env = signed_sample(signer.signing_key());
        assert!(matches!(
            verify_envelope(&env, &other.public_key_b64()),
            Err(CryptoError::SignatureInvalid)
        ));
    }

    #[test]
    fn malformed_key_reports_key_format() {
        assert!(matches!(
            decode_public_key("not base64!!"),
            Err(CryptoError::KeyFormat(_))
        ));
        assert!(matches!(
            decode_public_key("c2hvcnQ="),
            Err(CryptoError::KeyFormat(_))
        ));
    }

    #[test]
    fn keypair_persists_across_loads() {
        let dir = tempfile::tempdir().unwrap();
        let first = NodeKeypair::load_or_generate(dir.path()).unwrap();
        let second = NodeKeypair::load_or_generate(dir.path()).unwrap();
        assert_eq!(first.public_key_b64(), second.public_key_b64());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(dir.path().join(SEED_FILE))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }
}
