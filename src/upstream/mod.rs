// SPDX-License-Identifier: MIT

//! HTTP client for the upstream assistant service.
//!
//! Every suggestion and chat request terminates here. The upstream holds the
//! model API keys — the daemon only forwards prompts and relays replies, so
//! no credentials ever reach editor clients.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::UpstreamConfig;

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// Connection, timeout, or body-decode failure.
    #[error("failed to reach upstream: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("upstream reply has no message")]
    EmptyReply,
}

/// One prior conversation turn, replayed with chat requests.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryItem {
    pub role: String,
    pub content: String,
}

#[derive(Serialize)]
struct SuggestRequest<'a> {
    #[serde(rename = "userId")]
    user_id: &'a str,
    message: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    #[serde(rename = "userId")]
    user_id: &'a str,
    message: &'a str,
    history: &'a [HistoryItem],
}

#[derive(Deserialize)]
struct ReplyBody {
    message: Option<String>,
}

/// Seam for the upstream service so handlers and engines can be tested with
/// an in-process fake instead of a live HTTP server.
#[async_trait]
pub trait UpstreamApi: Send + Sync {
    /// POST /api/suggest — one-shot prompt, returns the raw reply text.
    async fn suggest(
        &self,
        user_id: &str,
        bearer: Option<&str>,
        message: &str,
    ) -> Result<String, UpstreamError>;

    /// POST /api/chat — prompt plus conversation history, returns the reply.
    async fn chat(
        &self,
        user_id: &str,
        bearer: Option<&str>,
        message: &str,
        history: &[HistoryItem],
    ) -> Result<String, UpstreamError>;
}

pub struct VibeClient {
    base_url: String,
    client: reqwest::Client,
}

impl VibeClient {
    pub fn new(cfg: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.timeout_secs))
            .user_agent(format!("vicod/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Cheap reachability check for `vicod doctor`. Any HTTP response counts —
    /// the upstream may not expose a dedicated health route.
    pub async fn probe(&self) -> Result<u16, UpstreamError> {
        let resp = self.client.get(&self.base_url).send().await?;
        Ok(resp.status().as_u16())
    }

    async fn post_and_extract<B: Serialize>(
        &self,
        path: &str,
        bearer: Option<&str>,
        body: &B,
    ) -> Result<String, UpstreamError> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.client.post(&url).json(body);
        if let Some(token) = bearer {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let reply: ReplyBody = resp.json().await?;
        match reply.message {
            Some(m) if !m.is_empty() => Ok(m),
            _ => Err(UpstreamError::EmptyReply),
        }
    }
}

#[async_trait]
impl UpstreamApi for VibeClient {
    async fn suggest(
        &self,
        user_id: &str,
        bearer: Option<&str>,
        message: &str,
    ) -> Result<String, UpstreamError> {
        self.post_and_extract("/api/suggest", bearer, &SuggestRequest { user_id, message })
            .await
    }

    async fn chat(
        &self,
        user_id: &str,
        bearer: Option<&str>,
        message: &str,
        history: &[HistoryItem],
    ) -> Result<String, UpstreamError> {
        self.post_and_extract(
            "/api/chat",
            bearer,
            &ChatRequest {
                user_id,
                message,
                history,
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let cfg = UpstreamConfig {
            base_url: "http://localhost:13100/".to_string(),
            ..Default::default()
        };
        let client = VibeClient::new(&cfg).unwrap();
        assert_eq!(client.base_url, "http://localhost:13100");
    }

    #[test]
    fn chat_request_serializes_camel_case_user_id() {
        let history = vec![HistoryItem {
            role: "user".to_string(),
            content: "hi".to_string(),
        }];
        let req = ChatRequest {
            user_id: "u1",
            message: "next",
            history: &history,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["history"][0]["role"], "user");
    }
}
