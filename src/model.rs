//! Streaming chat-completion client.
//!
//! [`ChatModel`] is the seam between the agent loop and the external
//! language model: one call per reasoning cycle, output delivered as
//! incremental content deltas on a bounded channel. The production
//! implementation speaks the OpenAI-compatible `chat/completions` SSE
//! protocol; tests substitute scripted fakes.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;

use crate::config::ModelConfig;

/// Capacity of the delta channel. Bounded so a slow consumer applies
/// backpressure to the HTTP stream instead of buffering unboundedly.
const TOKEN_CHANNEL_CAPACITY: usize = 32;

/// One message in a chat-completion request.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    /// `system`, `user`, or `assistant`.
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant",
            content: content.into(),
        }
    }
}

/// Receiver of incremental content deltas for one model turn. The
/// channel closing marks the end of the turn; an `Err` item means the
/// stream died mid-turn.
pub type TokenRx = mpsc::Receiver<Result<String>>;

/// A chat-completion model that streams its output.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Start one completion over `messages`. Returns the delta receiver
    /// once the request is accepted; transport errors before the first
    /// byte surface here, later ones as an `Err` item on the channel.
    async fn stream_chat(&self, messages: Vec<ChatMessage>) -> Result<TokenRx>;
}

/// OpenAI-compatible streaming client (`POST {url}/chat/completions`
/// with `stream: true`).
pub struct OpenAiChatModel {
    http: reqwest::Client,
    url: String,
    model: String,
    temperature: f64,
    api_key: Option<String>,
}

impl OpenAiChatModel {
    /// Build the client from configuration. The API key is read from the
    /// configured environment variable; a missing key fails fast here
    /// rather than on the first chat request.
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let api_key = if config.api_key_env.is_empty() {
            None
        } else {
            Some(std::env::var(&config.api_key_env).with_context(|| {
                format!("{} environment variable not set", config.api_key_env)
            })?)
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            api_key,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn stream_chat(&self, messages: Vec<ChatMessage>) -> Result<TokenRx> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "stream": true,
            "messages": messages
                .iter()
                .map(|m| serde_json::json!({ "role": m.role, "content": m.content }))
                .collect::<Vec<_>>(),
        });

        let mut request = self
            .http
            .post(format!("{}/chat/completions", self.url))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.context("chat completion request failed")?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            bail!("chat completion API error {}: {}", status, text);
        }

        let (tx, rx) = mpsc::channel(TOKEN_CHANNEL_CAPACITY);
        tokio::spawn(forward_sse_deltas(response, tx));
        Ok(rx)
    }
}

/// Read the SSE body line by line, forwarding `delta.content` fragments
/// until `[DONE]` or the consumer hangs up.
async fn forward_sse_deltas(response: reqwest::Response, tx: mpsc::Sender<Result<String>>) {
    let mut stream = response.bytes_stream();
    let mut buffer = String::new();

    while let Some(item) = stream.next().await {
        let bytes = match item {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = tx
                    .send(Err(anyhow::anyhow!("model stream failed: {}", e)))
                    .await;
                return;
            }
        };
        buffer.push_str(&String::from_utf8_lossy(&bytes));

        while let Some(newline) = buffer.find('\n') {
            let line = buffer[..newline].trim().to_string();
            buffer.drain(..=newline);

            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data == "[DONE]" {
                return;
            }

            match serde_json::from_str::<serde_json::Value>(data) {
                Ok(event) => {
                    let delta = event
                        .pointer("/choices/0/delta/content")
                        .and_then(|c| c.as_str())
                        .unwrap_or_default();
                    if !delta.is_empty() && tx.send(Ok(delta.to_string())).await.is_err() {
                        // Consumer gone; stop reading.
                        return;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "skipping unparsable stream event");
                }
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_model_reassembles_exactly() {
        let model = testing::ScriptedModel::new(vec!["Final Answer: forty-two, naturally."]);
        let mut rx = model.stream_chat(vec![]).await.unwrap();
        let mut out = String::new();
        while let Some(delta) = rx.recv().await {
            out.push_str(&delta.unwrap());
        }
        assert_eq!(out, "Final Answer: forty-two, naturally.");
    }
}
