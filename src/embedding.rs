//! Embedding client for the external embedding service.
//!
//! One [`EmbeddingClient`] is built at process start from the
//! `[embedding]` config and shared by the indexer and the retriever, so
//! indexing and querying are guaranteed to use the identical model.
//! Nearest-neighbor distances are meaningless otherwise.
//!
//! Supported providers:
//! - **openai** — `POST {url}/embeddings` (OpenAI-compatible), API key
//!   read from the configured environment variable at construction time.
//! - **ollama** — `POST {url}/api/embed` on a local Ollama instance.
//! - **disabled** — construction fails fast; every dependent operation
//!   reports "service unavailable" instead of hitting a null client.
//!
//! # Retry strategy
//!
//! Transient errors (HTTP 429, 5xx, network failures) retry with
//! exponential backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped). Other 4xx
//! responses fail immediately.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::config::EmbeddingConfig;

const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1";
const OLLAMA_URL: &str = "http://localhost:11434";

/// Text-to-vector interface shared by the indexer and the retriever.
///
/// [`EmbeddingClient`] is the production implementation; tests substitute
/// deterministic fakes.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// The embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;

    /// Embed a batch of texts, returning one vector per input in order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let texts = [text.to_string()];
        let results = self.embed_batch(&texts).await?;
        results
            .into_iter()
            .next()
            .context("empty embedding response")
    }
}

enum Provider {
    OpenAi { api_key: String },
    Ollama,
}

/// Client for the configured embedding provider. Holds one shared
/// `reqwest` client; cheap to clone behind an `Arc`.
pub struct EmbeddingClient {
    http: reqwest::Client,
    provider: Provider,
    model: String,
    dims: usize,
    url: String,
    max_retries: u32,
}

impl EmbeddingClient {
    /// Build the client from configuration.
    ///
    /// Fails fast when the provider is disabled, the model or dims are
    /// missing, or (for the openai provider) the API key environment
    /// variable is not set.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        if !config.is_enabled() {
            bail!("embedding provider is disabled; set [embedding] provider in the config");
        }

        let model = config
            .model
            .clone()
            .context("embedding.model is required")?;
        let dims = config.dims.context("embedding.dims is required")?;

        let (provider, url) = match config.provider.as_str() {
            "openai" => {
                let api_key = std::env::var(&config.api_key_env).with_context(|| {
                    format!("{} environment variable not set", config.api_key_env)
                })?;
                let url = config
                    .url
                    .clone()
                    .unwrap_or_else(|| OPENAI_EMBEDDINGS_URL.to_string());
                (Provider::OpenAi { api_key }, url)
            }
            "ollama" => {
                let url = config.url.clone().unwrap_or_else(|| OLLAMA_URL.to_string());
                (Provider::Ollama, url)
            }
            other => bail!("Unknown embedding provider: {}", other),
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            provider,
            model,
            dims,
            url,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let (endpoint, body) = match &self.provider {
            Provider::OpenAi { .. } => (
                format!("{}/embeddings", self.url.trim_end_matches('/')),
                serde_json::json!({ "model": self.model, "input": texts }),
            ),
            Provider::Ollama => (
                format!("{}/api/embed", self.url.trim_end_matches('/')),
                serde_json::json!({ "model": self.model, "input": texts }),
            ),
        };

        let json = self.post_with_retry(&endpoint, &body).await?;

        let embeddings = match &self.provider {
            Provider::OpenAi { .. } => parse_openai_response(&json)?,
            Provider::Ollama => parse_ollama_response(&json)?,
        };

        if embeddings.len() != texts.len() {
            bail!(
                "embedding service returned {} vectors for {} inputs",
                embeddings.len(),
                texts.len()
            );
        }
        Ok(embeddings)
    }
}

impl EmbeddingClient {
    /// POST a JSON body with exponential backoff on transient failures.
    async fn post_with_retry(&self, endpoint: &str, body: &Value) -> Result<Value> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let mut request = self.http.post(endpoint).json(body);
            if let Provider::OpenAi { api_key } = &self.provider {
                request = request.bearer_auth(api_key);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response.json().await?);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err =
                            Some(anyhow::anyhow!("embedding API error {}: {}", status, body_text));
                        continue;
                    }
                    // Client error other than rate limiting: retrying won't help.
                    bail!("embedding API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(anyhow::anyhow!("embedding request failed: {}", e));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("embedding failed after retries")))
    }
}

/// Extract `data[].embedding` from an OpenAI-style response, in input order.
fn parse_openai_response(json: &Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .context("invalid embedding response: missing data array")?;

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .context("invalid embedding response: missing embedding")?;
        embeddings.push(
            embedding
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect(),
        );
    }
    Ok(embeddings)
}

/// Extract `embeddings[]` from an Ollama `/api/embed` response.
fn parse_ollama_response(json: &Value) -> Result<Vec<Vec<f32>>> {
    let rows = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .context("invalid embedding response: missing embeddings array")?;

    let mut embeddings = Vec::with_capacity(rows.len());
    for row in rows {
        let vec = row
            .as_array()
            .context("invalid embedding response: embedding is not an array")?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        embeddings.push(vec);
    }
    Ok(embeddings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_provider_fails_fast() {
        let config = EmbeddingConfig::default();
        assert!(EmbeddingClient::new(&config).is_err());
    }

    #[test]
    fn openai_response_parses_in_order() {
        let json = serde_json::json!({
            "data": [
                { "index": 0, "embedding": [0.1, 0.2] },
                { "index": 1, "embedding": [0.3, 0.4] }
            ]
        });
        let parsed = parse_openai_response(&json).unwrap();
        assert_eq!(parsed, vec![vec![0.1f32, 0.2], vec![0.3, 0.4]]);
    }

    #[test]
    fn openai_response_without_data_is_an_error() {
        let json = serde_json::json!({ "error": { "message": "boom" } });
        assert!(parse_openai_response(&json).is_err());
    }

    #[test]
    fn ollama_response_parses() {
        let json = serde_json::json!({ "embeddings": [[1.0, 0.0], [0.0, 1.0]] });
        let parsed = parse_ollama_response(&json).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0], vec![1.0f32, 0.0]);
    }
}
