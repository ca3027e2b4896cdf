//! Embeddings from OpenAI-compatible HTTP endpoints

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::OpenAiConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{CrewMemError, Result};

/// Calls `POST {base_url}/embeddings` once per text. No retries.
#[derive(Debug)]
pub struct OpenAiEmbeddingProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl OpenAiEmbeddingProvider {
    /// Build a provider reading the API key from the env var named in config
    pub fn new(config: &OpenAiConfig, model: &str, dimension: usize) -> Result<Self> {
        let api_key = env::var(&config.api_key_env).map_err(|_| {
            CrewMemError::Config(format!(
                "API key env var '{}' not set",
                config.api_key_env
            ))
        })?;
        Self::with_api_key(&config.base_url, model, api_key, dimension, config.timeout_secs)
    }

    pub fn with_api_key(
        base_url: &str,
        model: &str,
        api_key: impl Into<String>,
        dimension: usize,
        timeout_secs: u64,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| CrewMemError::Config(format!("Failed to build HTTP client: {e}")))?;

        tracing::info!(
            "OpenAI embedding provider initialized with model: {}, base_url: {}",
            model,
            base_url
        );

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.to_string(),
            dimension,
        })
    }

    /// Only the text-embedding-3 family accepts a requested output width
    fn requested_dimensions(&self) -> Option<usize> {
        self.model
            .starts_with("text-embedding-3")
            .then_some(self.dimension)
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    fn name(&self) -> String {
        format!("openai/{}", self.model)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: text,
            dimensions: self.requested_dimensions(),
        };

        let url = format!("{}/embeddings", self.base_url);
        tracing::debug!("Requesting embedding from: {}", url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| CrewMemError::Embedding(format!("Embedding request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(CrewMemError::Embedding(format!(
                "API returned {status}: {error_text}"
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| CrewMemError::Embedding(format!("Invalid embedding response: {e}")))?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| CrewMemError::Embedding("Empty embedding response".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimensions_only_sent_for_v3_models() {
        let v3 = OpenAiEmbeddingProvider::with_api_key(
            "http://localhost",
            "text-embedding-3-small",
            "key",
            384,
            5,
        )
        .unwrap();
        assert_eq!(v3.requested_dimensions(), Some(384));

        let ada = OpenAiEmbeddingProvider::with_api_key(
            "http://localhost/",
            "text-embedding-ada-002",
            "key",
            1536,
            5,
        )
        .unwrap();
        assert_eq!(ada.requested_dimensions(), None);
        assert_eq!(ada.base_url, "http://localhost");
    }

    #[test]
    fn missing_api_key_env_is_config_error() {
        let config = OpenAiConfig {
            api_key_env: "CREWMEM_TEST_KEY_THAT_IS_NOT_SET".to_string(),
            ..OpenAiConfig::default()
        };
        let err = OpenAiEmbeddingProvider::new(&config, "text-embedding-3-small", 384).unwrap_err();
        assert!(matches!(err, CrewMemError::Config(_)));
    }
}
