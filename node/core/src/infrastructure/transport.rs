// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Outbound HTTP transport.
//!
//! Signed envelopes are POSTed to peer endpoints with bounded retries:
//! exponential backoff on 5xx and network failures, rate-limit headers
//! honored on 429, terminal failure on any other 4xx. Every call carries a
//! deadline.

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::envelope::Envelope;
use crate::domain::invite::JoinRequest;

pub const HEADER_AGENT_ID: &str = "X-Agent-ID";
pub const HEADER_PROTOCOL: &str = "X-Swarm-Protocol";
pub const HEADER_WAKE_SECRET: &str = "X-Wake-Secret";
pub const HEADER_RATELIMIT_RESET: &str = "X-RateLimit-Reset";

const SEND_TIMEOUT: Duration = Duration::from_secs(30);
const INFO_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ATTEMPTS: u32 = 5;
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const BACKOFF_CAP: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {url} failed after {attempts} attempts: {last_error}")]
    Exhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },
    #[error("terminal HTTP {status} from {url}: {body}")]
    Terminal {
        url: String,
        status: u16,
        body: String,
    },
    #[error("malformed response from {url}: {reason}")]
    InvalidResponse { url: String, reason: String },
    #[error("transport setup failed: {0}")]
    Setup(String),
}

/// Result of a delivered (2xx) request.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub status: u16,
    pub attempts: u32,
    pub body: Option<serde_json::Value>,
}

/// Public identity served by a peer's `/swarm/info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInfo {
    pub agent_id: String,
    pub endpoint: String,
    pub public_key: String,
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Clone)]
pub struct Transport {
    client: reqwest::Client,
    agent_id: String,
}

fn join_url(endpoint: &str, path: &str) -> String {
    format!("{}{path}", endpoint.trim_end_matches('/'))
}

impl Transport {
    pub fn new(agent_id: &str) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .map_err(|e| TransportError::Setup(e.to_string()))?;
        Ok(Self {
            client,
            agent_id: agent_id.to_string(),
        })
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Ok(value) = HeaderValue::from_str(&self.agent_id) {
            headers.insert(HEADER_AGENT_ID, value);
        }
        headers.insert(
            HEADER_PROTOCOL,
            HeaderValue::from_static(crate::PROTOCOL_VERSION),
        );
        headers
    }

    /// POST a signed envelope to a peer's `/swarm/message`.
    pub async fn post_envelope(
        &self,
        endpoint: &str,
        envelope: &Envelope,
    ) -> Result<Delivery, TransportError> {
        self.post_with_retry(&join_url(endpoint, "/swarm/message"), envelope, true)
            .await
    }

    /// Single-attempt envelope POST, for fire-and-forget notifications.
    pub async fn post_envelope_once(
        &self,
        endpoint: &str,
        envelope: &Envelope,
    ) -> Result<Delivery, TransportError> {
        self.post_with_retry(&join_url(endpoint, "/swarm/message"), envelope, false)
            .await
    }

    /// POST a join request to the master's `/swarm/join`. Not retried:
    /// join is metered and the caller decides how to react to failure.
    pub async fn post_join(
        &self,
        endpoint: &str,
        request: &JoinRequest,
    ) -> Result<Delivery, TransportError> {
        self.post_with_retry(&join_url(endpoint, "/swarm/join"), request, false)
            .await
    }

    /// POST an arbitrary JSON payload once, with the standard headers.
    pub async fn post_once<T: Serialize>(
        &self,
        url: &str,
        body: &T,
        timeout: Duration,
    ) -> Result<Delivery, TransportError> {
        let response = self
            .client
            .post(url)
            .headers(self.headers())
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError::Exhausted {
                url: url.to_string(),
                attempts: 1,
                last_error: e.to_string(),
            })?;
        let status = response.status();
        let body = response.json::<serde_json::Value>().await.ok();
        if status.is_success() {
            Ok(Delivery {
                status: status.as_u16(),
                attempts: 1,
                body,
            })
        } else {
            Err(TransportError::Terminal {
                url: url.to_string(),
                status: status.as_u16(),
                body: body.map(|b| b.to_string()).unwrap_or_default(),
            })
        }
    }

    /// Fetch a peer's public identity for the key cache.
    pub async fn fetch_info(&self, endpoint: &str) -> Result<AgentInfo, TransportError> {
        let url = join_url(endpoint, "/swarm/info");
        let response = self
            .client
            .get(&url)
            .headers(self.headers())
            .timeout(INFO_TIMEOUT)
            .send()
            .await
            .map_err(|e| TransportError::Exhausted {
                url: url.clone(),
                attempts: 1,
                last_error: e.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(TransportError::Terminal {
                url,
                status: response.status().as_u16(),
                body: String::new(),
            });
        }
        response
            .json::<AgentInfo>()
            .await
            .map_err(|e| TransportError::InvalidResponse {
                url,
                reason: e.to_string(),
            })
    }

    async fn post_with_retry<T: Serialize>(
        &self,
        url: &str,
        body: &T,
        retry: bool,
    ) -> Result<Delivery, TransportError> {
        let attempts = if retry { MAX_ATTEMPTS } else { 1 };
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            match self
                .client
                .post(url)
                .headers(self.headers())
                .json(body)
                .send()
                .await
            {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let body = response.json::<serde_json::Value>().await.ok();
                        return Ok(Delivery {
                            status: status.as_u16(),
                            attempts: attempt,
                            body,
                        });
                    }
                    if status == StatusCode::TOO_MANY_REQUESTS {
                        last_error = "rate limited".to_string();
                        if attempt < attempts {
                            let delay =
                                rate_limit_delay(&response).unwrap_or_else(|| backoff(attempt));
                            debug!(url, attempt, ?delay, "rate limited, backing off");
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                    } else if status.is_server_error() {
                        last_error = format!("HTTP {}", status.as_u16());
                        if attempt < attempts {
                            tokio::time::sleep(backoff(attempt)).await;
                            continue;
                        }
                    } else {
                        let text = response.text().await.unwrap_or_default();
                        return Err(TransportError::Terminal {
                            url: url.to_string(),
                            status: status.as_u16(),
                            body: text,
                        });
                    }
                }
                Err(e) => {
                    last_error = e.to_string();
                    if attempt < attempts {
                        warn!(url, attempt, error = %e, "send failed, retrying");
                        tokio::time::sleep(backoff(attempt)).await;
                        continue;
                    }
                }
            }
        }
        Err(TransportError::Exhausted {
            url: url.to_string(),
            attempts,
            last_error,
        })
    }
}

fn backoff(attempt: u32) -> Duration {
    let exp = INITIAL_BACKOFF.saturating_mul(1u32 << (attempt - 1).min(16));
    exp.min(BACKOFF_CAP)
}

/// Delay demanded by a 429 response, from `X-RateLimit-Reset` (unix
/// seconds) or `Retry-After` (delta seconds).
fn rate_limit_delay(response: &reqwest::Response) -> Option<Duration> {
    let headers = response.headers();
    if let Some(reset) = headers
        .get(HEADER_RATELIMIT_RESET)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok())
    {
        let now = chrono::Utc::now().timestamp();
        let wait = (reset - now).max(0) as u64;
        return Some(Duration::from_secs(wait.min(BACKOFF_CAP.as_secs())));
    }
    headers
        .get("Retry-After")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(|secs| Duration::from_secs(secs.min(BACKOFF_CAP.as_secs())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff(1), Duration::from_millis(500));
        assert_eq!(backoff(2), Duration::from_secs(1));
        assert_eq!(backoff(3), Duration::from_secs(2));
        assert_eq!(backoff(10), BACKOFF_CAP);
    }

    #[test]
    fn url_joining_strips_trailing_slash() {
        assert_eq!(
            join_url("https://a.example.com/agent/", "/swarm/message"),
            "https://a.example.com/agent/swarm/message"
        );
        assert_eq!(
            join_url("https://a.example.com", "/swarm/info"),
            "https://a.example.com/swarm/info"
        );
    }
}
