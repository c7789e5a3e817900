// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Wake trigger: evaluates inbound messages against notification
//! preferences and, on WAKE, POSTs to the wake endpoint.
//!
//! The POST is fire-and-forget with a bounded timeout; failures are logged
//! and never reach the receive pipeline.

use chrono::{Timelike, Utc};
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::envelope::{Envelope, MessageType, Priority};
use crate::domain::node_config::WakeTriggerConfig;
use crate::domain::wake::{MessageView, WakeDecision};
use crate::infrastructure::invoker::WakePayload;

pub struct WakeTrigger {
    config: WakeTriggerConfig,
    self_agent_id: String,
    client: reqwest::Client,
}

impl WakeTrigger {
    pub fn new(config: WakeTriggerConfig, self_agent_id: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            config,
            self_agent_id: self_agent_id.to_string(),
            client,
        }
    }

    /// Pure decision, without the POST side effect.
    pub fn evaluate(&self, envelope: &Envelope) -> WakeDecision {
        let view = MessageView {
            swarm_id: envelope.swarm_id,
            sender_id: envelope.sender.agent_id.clone(),
            content: envelope.content.clone(),
            is_direct: envelope.recipient == self.self_agent_id,
            is_high_priority: envelope.priority == Priority::High,
            is_system: envelope.message_type == MessageType::System,
        };
        self.config
            .preferences
            .decide(&view, Utc::now().hour() as u8)
    }

    /// Evaluate and, on WAKE, notify the wake endpoint. Always returns the
    /// decision; delivery failures are logged, never propagated.
    pub async fn process(&self, envelope: &Envelope) -> WakeDecision {
        let decision = self.evaluate(envelope);
        if let WakeDecision::Wake(level) = decision {
            let Some(endpoint) = self.config.endpoint.as_deref() else {
                return decision;
            };
            let payload = WakePayload {
                message_id: envelope.message_id.to_string(),
                swarm_id: envelope.swarm_id.to_string(),
                sender_id: envelope.sender.agent_id.clone(),
                notification_level: level.as_str().to_string(),
            };
            match self.client.post(endpoint).json(&payload).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(message_id = %envelope.message_id, "wake POST delivered");
                }
                Ok(response) => {
                    warn!(
                        message_id = %envelope.message_id,
                        status = response.status().as_u16(),
                        "wake endpoint rejected the POST"
                    );
                }
                Err(e) => {
                    warn!(message_id = %envelope.message_id, error = %e, "wake POST failed");
                }
            }
        }
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::envelope::Sender;
    use crate::domain::wake::{NotificationLevel, NotificationPreferences, WakeCondition};
    use uuid::Uuid;

    fn envelope(recipient: &str, priority: Priority) -> Envelope {
        Envelope {
            protocol_version: crate::PROTOCOL_VERSION.to_string(),
            message_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            sender: Sender {
                agent_id: "alice".into(),
                endpoint: "https://alice.example.com".into(),
            },
            recipient: recipient.to_string(),
            swarm_id: Uuid::new_v4(),
            message_type: MessageType::Message,
            content: "ping".into(),
            signature: "sig".into(),
            in_reply_to: None,
            thread_id: None,
            priority,
            expires_at: None,
            references: None,
            attachments: None,
            metadata: None,
        }
    }

    fn trigger(preferences: NotificationPreferences) -> WakeTrigger {
        WakeTrigger::new(
            WakeTriggerConfig {
                enabled: true,
                endpoint: None,
                timeout_secs: 5,
                preferences,
            },
            "me",
        )
    }

    #[test]
    fn direct_mention_is_recognized_against_own_id() {
        let prefs = NotificationPreferences {
            wake_conditions: [WakeCondition::DirectMention].into_iter().collect(),
            ..Default::default()
        };
        let trigger = trigger(prefs);
        assert_eq!(
            trigger.evaluate(&envelope("me", Priority::Normal)),
            WakeDecision::Wake(NotificationLevel::High)
        );
        assert_eq!(
            trigger.evaluate(&envelope("broadcast", Priority::Normal)),
            WakeDecision::Queue
        );
    }

    #[tokio::test]
    async fn process_without_endpoint_still_decides() {
        let trigger = trigger(NotificationPreferences::default());
        let decision = trigger.process(&envelope("broadcast", Priority::Normal)).await;
        assert_eq!(decision, WakeDecision::Wake(NotificationLevel::Normal));
    }
}
