
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::config::{Config, GenerationConfig};
use crate::generation::TextGenerator;
use crate::openai::ApiClient;
use crate::{RagError, Result};

/// Chat-completions gateway for any OpenAI-compatible endpoint
#[derive(Debug, Clone)]
pub struct OpenAiGenerator {
    client: ApiClient,
    endpoint: Url,
    model: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiGenerator {
    #[inline]
    pub fn new(client: ApiClient, config: &GenerationConfig) -> Result<Self> {
        let endpoint = client.endpoint("chat/completions")?;

        Ok(Self {
            client,
            endpoint,
            model: config.model.clone(),
        })
    }

    #[inline]
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config.api.api_key()?;
        let client = ApiClient::new(&config.api, api_key)?;
        Self::new(client, &config.generation)
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }
}

impl TextGenerator for OpenAiGenerator {
    #[inline]
    fn generate(&self, prompt: &str) -> Result<String> {
        debug!(
            "Requesting completion from {} for a {} character prompt",
            self.model,
            prompt.chars().count()
        );

        let request = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response_text = self
            .client
            .post_json(&self.endpoint, &request)
            .map_err(|e| e.into_rag_error("generation", RagError::Generation))?;

        let response: ChatResponse = serde_json::from_str(&response_text).map_err(|e| {
            RagError::Generation(format!("Failed to parse completion response: {}", e))
        })?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| RagError::Generation("Response contained no completion".to_string()))
    }
}
