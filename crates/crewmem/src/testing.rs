//! Test utilities for crewmem
//!
//! Builds coordinators on the hash provider so tests never load a model or
//! touch the network.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{ConfigRepository, EmbeddingConfig, MemoryPolicy};
use crate::coordinator::MemoryCoordinator;
use crate::embedding::{EmbeddingProvider, HASH_PROVIDER, ProviderRegistry};
use crate::error::{CrewMemError, Result};
use crate::memory::StoreContext;
use crate::memory::types::TenantId;
use crate::storage::LanceStore;

/// Vector width used by test databases
pub const TEST_DIMENSION: usize = 256;

/// Default policy switched to the hash provider
pub fn test_policy() -> MemoryPolicy {
    MemoryPolicy {
        embedding_provider: HASH_PROVIDER.to_string(),
        embedding_model: "test".to_string(),
        ..MemoryPolicy::default()
    }
}

pub fn test_registry() -> Arc<ProviderRegistry> {
    Arc::new(ProviderRegistry::new(EmbeddingConfig {
        dimension: TEST_DIMENSION,
        ..EmbeddingConfig::default()
    }))
}

pub async fn test_store(path: &Path) -> Result<Arc<LanceStore>> {
    Ok(Arc::new(LanceStore::open(path, TEST_DIMENSION).await?))
}

/// Coordinator over a fresh database at `path` with the given default policy
pub async fn test_coordinator_with(path: &Path, defaults: MemoryPolicy) -> Result<MemoryCoordinator> {
    let store = test_store(path).await?;
    let configs = Arc::new(ConfigRepository::new(Arc::clone(&store), defaults));
    Ok(MemoryCoordinator::new(store, test_registry(), configs))
}

pub async fn test_coordinator(path: &Path) -> Result<MemoryCoordinator> {
    test_coordinator_with(path, test_policy()).await
}

/// Store context for exercising a single store directly
pub async fn test_context(
    store: Arc<LanceStore>,
    tenant: &str,
    policy: MemoryPolicy,
) -> Result<StoreContext> {
    let embedder = test_registry().for_policy(&policy).await?;
    Ok(StoreContext::new(store, embedder, TenantId::new(tenant)?, policy))
}

/// Provider that fails every call, for error-path tests
#[derive(Debug, Clone)]
pub struct FailingEmbeddingProvider {
    dimension: usize,
}

impl FailingEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl EmbeddingProvider for FailingEmbeddingProvider {
    fn name(&self) -> String {
        "failing".to_string()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(CrewMemError::Embedding("provider offline".to_string()))
    }
}
