// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Wire envelope of a swarm message.
//!
//! The envelope is the only unit of cross-node communication. Six of its
//! fields (`message_id`, `timestamp`, `swarm_id`, `recipient`, `type`,
//! `content`) are covered by the Ed25519 signature; the canonical byte
//! layout is built in `infrastructure::crypto`.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Maximum clock skew tolerated on an inbound `timestamp`, in seconds.
pub const TIMESTAMP_SKEW_SECS: i64 = 300;

/// Longest accepted agent identifier.
pub const MAX_AGENT_ID_LEN: usize = 128;

/// Recipient value addressing every member of the swarm.
pub const BROADCAST: &str = "broadcast";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Message,
    System,
    Notification,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::System => "system",
            Self::Notification => "notification",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    pub agent_id: String,
    pub endpoint: String,
}

/// A signed swarm message in wire form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub protocol_version: String,
    pub message_id: Uuid,
    #[serde(with = "wire_time")]
    pub timestamp: DateTime<Utc>,
    pub sender: Sender,
    pub recipient: String,
    pub swarm_id: Uuid,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub content: String,
    pub signature: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "is_normal")]
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub references: Option<Vec<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

fn is_normal(p: &Priority) -> bool {
    *p == Priority::Normal
}

/// Millisecond-precision UTC timestamps on the wire.
///
/// The serialized string is reused byte-for-byte in the canonical signing
/// payload, so precision is pinned here rather than left to the sender.
pub mod wire_time {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::wire_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// Format a timestamp the way it travels on the wire: ISO-8601 UTC,
/// millisecond precision, `Z` suffix.
pub fn wire_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Validation failure for an inbound envelope; the first failed rule wins.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("unsupported protocol version '{0}'")]
    ProtocolVersion(String),
    #[error("required field '{0}' is empty")]
    EmptyField(&'static str),
    #[error("timestamp outside skew tolerance: {0}")]
    TimestampSkew(String),
    #[error("invalid agent_id '{0}'")]
    AgentId(String),
    #[error("sender endpoint must be an absolute https URL, got '{0}'")]
    SenderEndpoint(String),
    #[error("invalid recipient '{0}'")]
    Recipient(String),
    #[error("system message content rejected: {0}")]
    SystemContent(String),
}

/// Structured content of a `system` envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemContent {
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swarm_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initiated_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Lifecycle and control actions a `system` envelope may carry.
pub const SYSTEM_ACTIONS: &[&str] = &[
    "member_joined",
    "member_left",
    "member_kicked",
    "member_muted",
    "member_unmuted",
    "kicked",
    "swarm_dissolved",
    "master_transfer",
    "master_changed",
    "transfer_accepted",
    "transfer_declined",
    "join_approved",
    "join_rejected",
];

impl SystemContent {
    /// Parse and vet a system envelope's content.
    pub fn parse(content: &str) -> Result<Self, EnvelopeError> {
        let parsed: SystemContent = serde_json::from_str(content)
            .map_err(|e| EnvelopeError::SystemContent(format!("not a JSON object: {e}")))?;
        if !SYSTEM_ACTIONS.contains(&parsed.action.as_str()) {
            return Err(EnvelopeError::SystemContent(format!(
                "unrecognized action '{}'",
                parsed.action
            )));
        }
        Ok(parsed)
    }
}

/// An agent identifier: non-empty printable ASCII, at most 128 chars.
pub fn is_valid_agent_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= MAX_AGENT_ID_LEN && id.bytes().all(|b| b.is_ascii_graphic())
}

impl Envelope {
    /// Apply the inbound validation rules in order; the returned error names
    /// the first rule that failed. No side effects happen before this passes.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), EnvelopeError> {
        let major = self.protocol_version.split('.').next().unwrap_or("");
        let supported_major = crate::PROTOCOL_VERSION.split('.').next().unwrap_or("0");
        if major != supported_major {
            return Err(EnvelopeError::ProtocolVersion(self.protocol_version.clone()));
        }
        if self.content.is_empty() {
            return Err(EnvelopeError::EmptyField("content"));
        }
        if self.signature.is_empty() {
            return Err(EnvelopeError::EmptyField("signature"));
        }
        let skew = (now - self.timestamp).abs();
        if skew > Duration::seconds(TIMESTAMP_SKEW_SECS) {
            return Err(EnvelopeError::TimestampSkew(format!(
                "{} is {}s from local clock",
                wire_timestamp(&self.timestamp),
                skew.num_seconds()
            )));
        }
        if self.message_type == MessageType::System {
            SystemContent::parse(&self.content)?;
        }
        if !is_valid_agent_id(&self.sender.agent_id) {
            return Err(EnvelopeError::AgentId(self.sender.agent_id.clone()));
        }
        if !self.sender.endpoint.starts_with("https://") {
            return Err(EnvelopeError::SenderEndpoint(self.sender.endpoint.clone()));
        }
        if self.recipient != BROADCAST && !is_valid_agent_id(&self.recipient) {
            return Err(EnvelopeError::Recipient(self.recipient.clone()));
        }
        Ok(())
    }

    /// The wire form of this envelope's timestamp.
    pub fn wire_timestamp(&self) -> String {
        wire_timestamp(&self.timestamp)
    }

    pub fn is_broadcast(&self) -> bool {
        self.recipient == BROADCAST
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Envelope {
        Envelope {
            protocol_version: crate::PROTOCOL_VERSION.to_string(),
            message_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            sender: Sender {
                agent_id: "alice".into(),
                endpoint: "https://alice.example.com/agent".into(),
            },
            recipient: BROADCAST.into(),
            swarm_id: Uuid::new_v4(),
            message_type: MessageType::Message,
            content: "hello".into(),
            signature: "c2ln".into(),
            in_reply_to: None,
            thread_id: None,
            priority: Priority::Normal,
            expires_at: None,
            references: None,
            attachments: None,
            metadata: None,
        }
    }

    #[test]
    fn valid_envelope_passes() {
        assert!(sample().validate(Utc::now()).is_ok());
    }

    #[test]
    fn wrong_major_version_rejected() {
        let mut env = sample();
        env.protocol_version = "1.0.0".into();
        assert!(matches!(
            env.validate(Utc::now()),
            Err(EnvelopeError::ProtocolVersion(_))
        ));
    }

    #[test]
    fn skewed_timestamp_rejected() {
        let mut env = sample();
        env.timestamp = Utc::now() - Duration::minutes(10);
        assert!(matches!(
            env.validate(Utc::now()),
            Err(EnvelopeError::TimestampSkew(_))
        ));
    }

    #[test]
    fn system_content_must_be_recognized() {
        let mut env = sample();
        env.message_type = MessageType::System;
        env.content = r#"{"action":"reboot_universe"}"#.into();
        assert!(matches!(
            env.validate(Utc::now()),
            Err(EnvelopeError::SystemContent(_))
        ));

        env.content = r#"{"action":"member_joined","swarm_id":"s","agent_id":"bob"}"#.into();
        assert!(env.validate(Utc::now()).is_ok());
    }

    #[test]
    fn http_endpoint_rejected() {
        let mut env = sample();
        env.sender.endpoint = "http://alice.example.com".into();
        assert!(matches!(
            env.validate(Utc::now()),
            Err(EnvelopeError::SenderEndpoint(_))
        ));
    }

    #[test]
    fn recipient_rules() {
        let mut env = sample();
        env.recipient = "bob".into();
        assert!(env.validate(Utc::now()).is_ok());
        env.recipient = "bad agent".into();
        assert!(matches!(
            env.validate(Utc::now()),
            Err(EnvelopeError::Recipient(_))
        ));
    }

    #[test]
    fn wire_timestamp_has_millisecond_precision() {
        let ts = DateTime::parse_from_rfc3339("2026-01-15T12:30:45.123456Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(wire_timestamp(&ts), "2026-01-15T12:30:45.123Z");
    }

    #[test]
    fn optional_fields_omitted_from_wire_json() {
        let env = sample();
        let value = serde_json::to_value(&env).unwrap();
        let obj = value.as_object().unwrap();
        assert!(!obj.contains_key("in_reply_to"));
        assert!(!obj.contains_key("priority"));
        assert_eq!(obj["type"], "message");
    }
}
