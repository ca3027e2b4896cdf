use std::sync::Arc;

use dashmap::DashMap;

use crate::config::{EmbeddingConfig, MemoryPolicy};
use crate::embedding::{
    EmbeddingProvider, FastEmbedProvider, HashEmbeddingProvider, OpenAiEmbeddingProvider,
};
use crate::error::{CrewMemError, Result};

pub const FASTEMBED_PROVIDER: &str = "fastembed";
pub const OPENAI_PROVIDER: &str = "openai";
pub const HASH_PROVIDER: &str = "hash";

/// Resolves a tenant's (provider, model) pair to a shared provider instance.
///
/// Instances are built on first use and cached for the life of the registry.
pub struct ProviderRegistry {
    config: EmbeddingConfig,
    providers: DashMap<(String, String), Arc<dyn EmbeddingProvider>>,
}

impl ProviderRegistry {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self {
            config,
            providers: DashMap::new(),
        }
    }

    /// Width every provider in this registry must produce
    pub fn dimension(&self) -> usize {
        self.config.dimension
    }

    /// Install a provider for a (provider, model) pair, replacing any cached one
    pub fn register(
        &self,
        provider: impl Into<String>,
        model: impl Into<String>,
        instance: Arc<dyn EmbeddingProvider>,
    ) {
        self.providers
            .insert((provider.into(), model.into()), instance);
    }

    /// Provider configured by a tenant policy
    pub async fn for_policy(&self, policy: &MemoryPolicy) -> Result<Arc<dyn EmbeddingProvider>> {
        self.resolve(&policy.embedding_provider, &policy.embedding_model)
            .await
    }

    pub async fn resolve(&self, provider: &str, model: &str) -> Result<Arc<dyn EmbeddingProvider>> {
        let key = (provider.to_string(), model.to_string());
        if let Some(existing) = self.providers.get(&key) {
            return Ok(Arc::clone(existing.value()));
        }

        let instance = self.build(provider, model).await?;
        if instance.dimension() != self.config.dimension {
            return Err(CrewMemError::Config(format!(
                "{} produces {}-dimensional vectors, store is configured for {}",
                instance.name(),
                instance.dimension(),
                self.config.dimension
            )));
        }

        tracing::info!("Embedding provider ready: {}", instance.name());
        let entry = self.providers.entry(key).or_insert(instance);
        Ok(Arc::clone(entry.value()))
    }

    async fn build(&self, provider: &str, model: &str) -> Result<Arc<dyn EmbeddingProvider>> {
        match provider {
            FASTEMBED_PROVIDER => {
                let model = model.to_string();
                let loaded = tokio::task::spawn_blocking(move || FastEmbedProvider::new(&model))
                    .await
                    .map_err(|e| CrewMemError::Embedding(format!("Model load task failed: {e}")))??;
                Ok(Arc::new(loaded))
            }
            OPENAI_PROVIDER => Ok(Arc::new(OpenAiEmbeddingProvider::new(
                &self.config.openai,
                model,
                self.config.dimension,
            )?)),
            HASH_PROVIDER => Ok(Arc::new(HashEmbeddingProvider::new(self.config.dimension))),
            other => Err(CrewMemError::Config(format!(
                "Unknown embedding provider: {other}. Use fastembed, openai, or hash."
            ))),
        }
    }
}
