// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Sliding-window rate limiting, keyed per sender or per client IP.

use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Unix seconds when the window frees up.
    pub reset_unix: i64,
}

pub struct RateLimiter {
    limit: u32,
    window: Duration,
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            hits: Mutex::new(HashMap::new()),
        }
    }

    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    pub fn per_hour(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(3600))
    }

    /// Admit or reject one hit for `key`, recording it when admitted.
    pub fn check(&self, key: &str) -> RateDecision {
        let now = Instant::now();
        let mut hits = self.hits.lock();
        let entry = hits.entry(key.to_string()).or_default();
        while let Some(front) = entry.front() {
            if now.duration_since(*front) >= self.window {
                entry.pop_front();
            } else {
                break;
            }
        }
        let reset_unix = entry
            .front()
            .map(|oldest| {
                let remaining = self.window.saturating_sub(now.duration_since(*oldest));
                Utc::now().timestamp() + remaining.as_secs() as i64
            })
            .unwrap_or_else(|| Utc::now().timestamp() + self.window.as_secs() as i64);
        if entry.len() as u32 >= self.limit {
            return RateDecision {
                allowed: false,
                limit: self.limit,
                remaining: 0,
                reset_unix,
            };
        }
        entry.push_back(now);
        RateDecision {
            allowed: true,
            limit: self.limit,
            remaining: self.limit - entry.len() as u32,
            reset_unix,
        }
    }
}
