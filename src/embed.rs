//! Embedding gateway client.
//!
//! The catalog never computes embeddings itself; it calls an external
//! service behind [`EmbeddingProvider`]. Failures are expected and
//! callers treat them as a degraded capability, not a hard error.

use serde_json::json;
use thiserror::Error;

use crate::config::EmbeddingConfig;

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding request failed: {0}")]
    Request(#[from] Box<ureq::Error>),
    #[error("failed to read embedding response: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed embedding response: {0}")]
    Malformed(String),
}

/// Converts text into a fixed-length vector, or `None` when the backend
/// has nothing to offer for the input. Implementations must be safe to
/// call repeatedly.
pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, text: &str) -> Result<Option<Vec<f32>>, EmbedError>;
}

/// OpenAI-compatible `/embeddings` endpoint client.
pub struct HttpEmbeddingProvider {
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl HttpEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        }
    }
}

impl EmbeddingProvider for HttpEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Option<Vec<f32>>, EmbedError> {
        if text.trim().is_empty() {
            return Ok(None);
        }

        let url = format!("{}/embeddings", self.endpoint.trim_end_matches('/'));
        let body = json!({
            "model": self.model,
            "input": text,
        });

        let mut request = ureq::post(&url).set("Content-Type", "application/json");
        if let Some(ref key) = self.api_key {
            request = request.set("Authorization", &format!("Bearer {}", key));
        }

        let response: serde_json::Value =
            request.send_json(body).map_err(Box::new)?.into_json()?;

        let values = response["data"][0]["embedding"]
            .as_array()
            .ok_or_else(|| EmbedError::Malformed("no embedding in response".to_string()))?;

        let vector: Vec<f32> = values
            .iter()
            .filter_map(|v| v.as_f64())
            .map(|v| v as f32)
            .collect();

        if vector.is_empty() {
            return Ok(None);
        }
        Ok(Some(vector))
    }
}
