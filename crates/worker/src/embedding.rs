//! Embedding service client.

use async_trait::async_trait;
use ingest_core::{EmbeddingConfig, Error, Result};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use telemetry::metrics;
use tracing::debug;

/// Turns texts into vectors, one per input, in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

/// Client for an OpenAI-compatible `POST {url}/embeddings` endpoint.
#[derive(Clone)]
pub struct HttpEmbedder {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    dimensions: Option<usize>,
    client: reqwest::Client,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let base = config
            .url
            .as_deref()
            .ok_or_else(|| Error::config("embedding.url is required"))?;
        let model = config
            .model
            .clone()
            .ok_or_else(|| Error::config("embedding.model is required"))?;
        url::Url::parse(base)
            .map_err(|e| Error::config(format!("invalid embedding.url {}: {}", base, e)))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::config(format!("failed to build embedding client: {}", e)))?;

        Ok(Self {
            endpoint: format!("{}/embeddings", base.trim_end_matches('/')),
            model,
            api_key: config.api_key.clone(),
            dimensions: config.dimensions,
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn check_shape(&self, expected: usize, vectors: &[Vec<f32>]) -> Result<()> {
        if vectors.len() != expected {
            return Err(Error::embedding(format!(
                "expected {} embeddings, got {}",
                expected,
                vectors.len()
            )));
        }
        if let Some(dims) = self.dimensions {
            if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
                return Err(Error::embedding(format!(
                    "expected {} dimensions, got {}",
                    dims,
                    bad.len()
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let mut request = self.client.post(&self.endpoint).json(&EmbeddingRequest {
            model: &self.model,
            input: texts,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::embedding(format!("embedding request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::embedding(format!(
                "embedding service returned {}: {}",
                status,
                body.trim()
            )));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::embedding(format!("invalid embedding response: {}", e)))?;

        // Items carry their input position; order by it when present.
        parsed.data.sort_by_key(|item| item.index.unwrap_or(usize::MAX));
        let vectors: Vec<Vec<f32>> = parsed.data.into_iter().map(|i| i.embedding).collect();
        self.check_shape(texts.len(), &vectors)?;

        let elapsed = start.elapsed();
        metrics()
            .embedding_latency_ms
            .observe(elapsed.as_millis() as u64);
        debug!(count = texts.len(), latency_ms = %elapsed.as_millis(), "Computed embeddings");

        Ok(vectors)
    }
}
