// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Invite JWT issue and verification (EdDSA).
//!
//! The master signs invite tokens with its node key. Expiry lives in the
//! `expires_at` claim as a wire-format timestamp, so numeric `exp`
//! validation is disabled and expiry is checked here with ±60 s skew
//! tolerance. Metering (`max_uses`, revocation) is enforced against the
//! issued-token table, keyed by the SHA-256 of the JWT.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::pkcs8::EncodePrivateKey;
use ed25519_dalek::{SigningKey, VerifyingKey};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::envelope::wire_timestamp;
use crate::domain::invite::{endpoint_host, InviteClaims, InviteUrl, TokenError};

/// Clock skew tolerated when checking token expiry.
const EXPIRY_LEEWAY_SECS: i64 = 60;

/// A freshly generated invite: the JWT, its metering hash, and the URL
/// handed to the invitee.
#[derive(Debug, Clone)]
pub struct GeneratedInvite {
    pub jwt: String,
    pub token_hash: String,
    pub url: String,
    pub claims: InviteClaims,
}

/// SHA-256 of the JWT, hex-encoded; the key into the issued-token table.
pub fn token_hash(jwt: &str) -> String {
    let digest = Sha256::digest(jwt.as_bytes());
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Issue an invite token for `swarm_id`, signed by the master key.
pub fn generate_invite(
    key: &SigningKey,
    swarm_id: Uuid,
    master: &str,
    endpoint: &str,
    expires_in: Option<Duration>,
    max_uses: Option<u32>,
) -> Result<GeneratedInvite, TokenError> {
    let now = Utc::now();
    let claims = InviteClaims {
        swarm_id,
        master: master.to_string(),
        endpoint: endpoint.to_string(),
        iat: now.timestamp(),
        expires_at: expires_in.map(|d| wire_timestamp(&(now + d))),
        max_uses,
    };
    let der = key
        .to_pkcs8_der()
        .map_err(|e| TokenError::Invalid(format!("cannot encode signing key: {e}")))?;
    let encoding_key = EncodingKey::from_ed_der(der.as_bytes());
    let jwt = encode(&Header::new(Algorithm::EdDSA), &claims, &encoding_key)
        .map_err(|e| TokenError::Invalid(format!("cannot sign token: {e}")))?;
    let host = endpoint_host(endpoint)
        .ok_or_else(|| TokenError::Invalid(format!("endpoint '{endpoint}' has no host")))?;
    let url = InviteUrl::format(swarm_id, host, &jwt);
    Ok(GeneratedInvite {
        token_hash: token_hash(&jwt),
        jwt,
        url,
        claims,
    })
}

/// Verify a JWT's structure, algorithm, signature and expiry against the
/// master's public key. Metering is a separate, store-backed step.
pub fn verify_invite(jwt: &str, master_key: &VerifyingKey) -> Result<InviteClaims, TokenError> {
    let decoding_key = DecodingKey::from_ed_der(master_key.as_bytes());
    let mut validation = Validation::new(Algorithm::EdDSA);
    validation.validate_exp = false;
    validation.required_spec_claims = Default::default();
    let data = decode::<InviteClaims>(jwt, &decoding_key, &validation)
        .map_err(|e| TokenError::Invalid(e.to_string()))?;
    check_expiry(&data.claims, Utc::now())?;
    Ok(data.claims)
}

/// Full validation of an invite URL as presented in a join request:
/// signature and expiry first, then the URL-vs-claims cross checks.
pub fn validate_invite_url(
    url: &InviteUrl,
    master_key: &VerifyingKey,
) -> Result<InviteClaims, TokenError> {
    let claims = verify_invite(&url.jwt, master_key)?;
    if claims.swarm_id != url.swarm_id {
        return Err(TokenError::Invalid(format!(
            "URL swarm '{}' does not match token swarm '{}'",
            url.swarm_id, claims.swarm_id
        )));
    }
    let claim_host = endpoint_host(&claims.endpoint)
        .ok_or_else(|| TokenError::Invalid("token endpoint has no host".into()))?;
    if claim_host != url.host {
        return Err(TokenError::Invalid(format!(
            "URL host '{}' does not match token endpoint host '{claim_host}'",
            url.host
        )));
    }
    Ok(claims)
}

fn check_expiry(claims: &InviteClaims, now: DateTime<Utc>) -> Result<(), TokenError> {
    if let Some(expires_at) = &claims.expires_at {
        let expiry = DateTime::parse_from_rfc3339(expires_at)
            .map_err(|e| TokenError::Invalid(format!("bad expires_at: {e}")))?
            .with_timezone(&Utc);
        if now - expiry > Duration::seconds(EXPIRY_LEEWAY_SECS) {
            return Err(TokenError::Expired(expires_at.clone()));
        }
    }
    Ok(())
}

/// Read claims without verifying the signature. Used by a joining client
/// that does not yet hold the master's key; nothing here is trusted until
/// the master verifies the token server-side.
pub fn peek_claims(jwt: &str) -> Result<InviteClaims, TokenError> {
    let payload = jwt
        .split('.')
        .nth(1)
        .ok_or_else(|| TokenError::Invalid("not a JWT".into()))?;
    let raw = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| TokenError::Invalid(format!("bad payload encoding: {e}")))?;
    serde_json::from_slice(&raw).map_err(|e| TokenError::Invalid(format!("bad claims: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::crypto::NodeKeypair;

    fn invite(expires_in: Option<Duration>, max_uses: Option<u32>) -> (NodeKeypair, GeneratedInvite) {
        let keypair = NodeKeypair::generate();
        let invite = generate_invite(
            keypair.signing_key(),
            Uuid::new_v4(),
            "master",
            "https://master.example.com/agent",
            expires_in,
            max_uses,
        )
        .unwrap();
        (keypair, invite)
    }

    #[test]
    fn generate_verify_round_trip() {
        let (keypair, invite) = invite(Some(Duration::hours(1)), Some(3));
        let claims = verify_invite(&invite.jwt, &keypair.verifying_key()).unwrap();
        assert_eq!(claims, invite.claims);
        assert_eq!(claims.max_uses, Some(3));
        assert!(invite
            .url
            .starts_with(&format!("swarm://{}@master.example.com", claims.swarm_id)));
    }

    #[test]
    fn wrong_key_rejected() {
        let (_, invite) = invite(None, None);
        let other = NodeKeypair::generate();
        assert!(matches!(
            verify_invite(&invite.jwt, &other.verifying_key()),
            Err(TokenError::Invalid(_))
        ));
    }

    #[test]
    fn expired_token_rejected() {
        let (keypair, invite) = invite(Some(Duration::seconds(-120)), None);
        assert!(matches!(
            verify_invite(&invite.jwt, &keypair.verifying_key()),
            Err(TokenError::Expired(_))
        ));
    }

    #[test]
    fn expiry_leeway_tolerated() {
        let (keypair, invite) = invite(Some(Duration::seconds(-30)), None);
        assert!(verify_invite(&invite.jwt, &keypair.verifying_key()).is_ok());
    }

    #[test]
    fn url_cross_checks() {
        let (keypair, invite) = invite(None, None);
        let parsed = InviteUrl::parse(&invite.url).unwrap();
        validate_invite_url(&parsed, &keypair.verifying_key()).unwrap();

        let mut wrong_swarm = parsed.clone();
        wrong_swarm.swarm_id = Uuid::new_v4();
        assert!(validate_invite_url(&wrong_swarm, &keypair.verifying_key()).is_err());

        let mut wrong_host = parsed;
        wrong_host.host = "evil.example.com".into();
        assert!(validate_invite_url(&wrong_host, &keypair.verifying_key()).is_err());
    }

    #[test]
    fn token_hash_is_stable_hex() {
        let h = token_hash("a.b.c");
        assert_eq!(h.len(), 64);
        assert_eq!(h, token_hash("a.b.c"));
        assert_ne!(h, token_hash("a.b.d"));
    }

    #[test]
    fn peek_reads_claims_without_key() {
        let (_, invite) = invite(None, Some(1));
        let claims = peek_claims(&invite.jwt).unwrap();
        assert_eq!(claims, invite.claims);
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let (keypair, invite) = invite(None, None);
        let mut parts: Vec<&str> = invite.jwt.split('.').collect();
        let mut claims = peek_claims(&invite.jwt).unwrap();
        claims.master = "mallory".into();
        let forged = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());
        parts[1] = &forged;
        let forged_jwt = parts.join(".");
        assert!(verify_invite(&forged_jwt, &keypair.verifying_key()).is_err());
    }
}
