// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Wake decision rules: whether an inbound message activates the agent,
//! queues silently, or is skipped entirely.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Low,
    #[default]
    Normal,
    High,
}

impl NotificationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WakeCondition {
    AnyMessage,
    DirectMention,
    HighPriority,
    FromSpecificAgent,
    KeywordMatch,
    SwarmSystemMessage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeDecision {
    /// Activate the agent.
    Wake(NotificationLevel),
    /// Persist only; no activation.
    Queue,
    /// Muted; the message produced no side effects upstream.
    Skip,
}

/// What the decision rules need to know about one inbound message.
#[derive(Debug, Clone)]
pub struct MessageView {
    pub swarm_id: Uuid,
    pub sender_id: String,
    pub content: String,
    /// True when `recipient` addresses this node directly.
    pub is_direct: bool,
    pub is_high_priority: bool,
    pub is_system: bool,
}

fn default_true() -> bool {
    true
}

/// When to wake the agent versus queue silently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPreferences {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub default_level: NotificationLevel,
    #[serde(default = "NotificationPreferences::default_conditions")]
    pub wake_conditions: HashSet<WakeCondition>,
    #[serde(default)]
    pub watched_agents: HashSet<String>,
    #[serde(default)]
    pub watched_keywords: HashSet<String>,
    #[serde(default)]
    pub muted_swarms: HashSet<Uuid>,
    /// `(start_hour, end_hour)` UTC; wraps past midnight when start > end.
    #[serde(default)]
    pub quiet_hours: Option<(u8, u8)>,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            enabled: true,
            default_level: NotificationLevel::Normal,
            wake_conditions: Self::default_conditions(),
            watched_agents: HashSet::new(),
            watched_keywords: HashSet::new(),
            muted_swarms: HashSet::new(),
            quiet_hours: None,
        }
    }
}

impl NotificationPreferences {
    fn default_conditions() -> HashSet<WakeCondition> {
        [WakeCondition::AnyMessage].into_iter().collect()
    }

    /// Decide what to do with a message. Rules run in order and the first
    /// match wins:
    /// 1. disabled -> Skip
    /// 2. muted swarm -> Skip
    /// 3. quiet hours and not high priority -> Queue
    /// 4. any wake condition matches -> Wake
    /// 5. otherwise -> Queue
    pub fn decide(&self, msg: &MessageView, current_hour_utc: u8) -> WakeDecision {
        if !self.enabled {
            return WakeDecision::Skip;
        }
        if self.muted_swarms.contains(&msg.swarm_id) {
            return WakeDecision::Skip;
        }
        if self.in_quiet_hours(current_hour_utc) && !msg.is_high_priority {
            return WakeDecision::Queue;
        }
        let mut level: Option<NotificationLevel> = None;
        for cond in &self.wake_conditions {
            let matched = match cond {
                WakeCondition::AnyMessage => Some(self.default_level),
                WakeCondition::DirectMention if msg.is_direct => Some(NotificationLevel::High),
                WakeCondition::HighPriority if msg.is_high_priority => {
                    Some(NotificationLevel::High)
                }
                WakeCondition::FromSpecificAgent
                    if self.watched_agents.contains(&msg.sender_id) =>
                {
                    Some(NotificationLevel::High)
                }
                WakeCondition::KeywordMatch if self.matches_keyword(&msg.content) => {
                    Some(NotificationLevel::High)
                }
                WakeCondition::SwarmSystemMessage if msg.is_system => {
                    Some(NotificationLevel::High)
                }
                _ => None,
            };
            if let Some(l) = matched {
                level = Some(level.map_or(l, |prev| prev.max(l)));
            }
        }
        match level {
            Some(l) => WakeDecision::Wake(l),
            None => WakeDecision::Queue,
        }
    }

    fn in_quiet_hours(&self, hour: u8) -> bool {
        match self.quiet_hours {
            None => false,
            Some((start, end)) if start <= end => start <= hour && hour < end,
            Some((start, end)) => hour >= start || hour < end,
        }
    }

    fn matches_keyword(&self, content: &str) -> bool {
        let lowered = content.to_lowercase();
        self.watched_keywords
            .iter()
            .any(|kw| lowered.contains(&kw.to_lowercase()))
    }
}
