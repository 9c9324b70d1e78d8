#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::config::{Config, EmbeddingConfig};
use crate::embeddings::EmbeddingProvider;
use crate::openai::ApiClient;
use crate::{RagError, Result};

/// Embedding gateway for any OpenAI-compatible `/embeddings` endpoint
#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    client: ApiClient,
    endpoint: Url,
    model: String,
    dimensions: Option<u32>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: [&'a str; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    #[inline]
    pub fn new(client: ApiClient, config: &EmbeddingConfig) -> Result<Self> {
        let endpoint = client.endpoint("embeddings")?;

        Ok(Self {
            client,
            endpoint,
            model: config.model.clone(),
            dimensions: config.dimensions,
        })
    }

    /// Build from the full configuration, reading the API key from the environment
    #[inline]
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config.api.api_key()?;
        let client = ApiClient::new(&config.api, api_key)?;
        Self::new(client, &config.embedding)
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn parse_response(&self, response_text: &str) -> Result<Vec<f32>> {
        let response: EmbeddingResponse = serde_json::from_str(response_text).map_err(|e| {
            RagError::Embedding(format!("Failed to parse embedding response: {}", e))
        })?;

        if response.data.len() > 1 {
            warn!(
                "Expected one embedding, received {}; using index 0",
                response.data.len()
            );
        }

        let embedding = response
            .data
            .into_iter()
            .find(|data| data.index == 0)
            .map(|data| data.embedding)
            .ok_or_else(|| RagError::Embedding("Response contained no embedding".to_string()))?;

        if embedding.is_empty() {
            return Err(RagError::Embedding(
                "Response contained an empty embedding".to_string(),
            ));
        }

        if let Some(expected) = self.dimensions {
            if embedding.len() != expected as usize {
                return Err(RagError::DimensionMismatch {
                    expected: expected as usize,
                    found: embedding.len(),
                });
            }
        }

        Ok(embedding)
    }
}

impl EmbeddingProvider for OpenAiEmbedder {
    #[inline]
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(
            "Requesting embedding for {} characters with model {}",
            text.chars().count(),
            self.model
        );

        let request = EmbeddingRequest {
            model: &self.model,
            input: [text],
            dimensions: self.dimensions,
        };

        let response_text = self
            .client
            .post_json(&self.endpoint, &request)
            .map_err(|e| e.into_rag_error("embedding", RagError::Embedding))?;

        let embedding = self.parse_response(&response_text)?;
        debug!("Received embedding with {} dimensions", embedding.len());
        Ok(embedding)
    }
}
