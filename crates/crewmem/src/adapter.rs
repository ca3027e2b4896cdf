//! Lenient per-crew memory interface for agent frameworks
//!
//! Every method logs and swallows failures: stores report `false`, reads
//! return empty results, and stats return `None`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::coordinator::{MemoryCoordinator, MemoryStats};
use crate::error::Result;
use crate::memory::params::{
    EntityInput, LongTermInput, MemoryInput, RetrieveOptions, SearchParams, ShortTermInput,
};
use crate::memory::types::{DEFAULT_CONTENT_TYPE, MemoryKind, Metadata, Record, TenantId};

pub const DEFAULT_ADAPTER_LIMIT: usize = 10;

/// Content plus flat metadata, as agent frameworks expect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterItem {
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl AdapterItem {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn memory_type(&self) -> Option<&str> {
        self.metadata.get("memory_type").and_then(Value::as_str)
    }

    pub fn similarity_score(&self) -> Option<f64> {
        self.metadata.get("similarity_score").and_then(Value::as_f64)
    }
}

#[derive(Clone)]
pub struct CrewMemoryAdapter {
    coordinator: Arc<MemoryCoordinator>,
    tenant: TenantId,
    agent_id: Option<String>,
}

impl CrewMemoryAdapter {
    pub fn new(coordinator: Arc<MemoryCoordinator>, tenant: TenantId) -> Self {
        Self {
            coordinator,
            tenant,
            agent_id: None,
        }
    }

    /// Stamp every stored item with this agent's id
    pub fn for_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    pub async fn store(&self, item: AdapterItem) -> bool {
        self.store_short_term(item).await
    }

    pub async fn store_short_term(&self, item: AdapterItem) -> bool {
        self.store_as(MemoryKind::ShortTerm, item).await
    }

    pub async fn store_long_term(&self, item: AdapterItem) -> bool {
        self.store_as(MemoryKind::LongTerm, item).await
    }

    pub async fn store_entity(&self, item: AdapterItem) -> bool {
        self.store_as(MemoryKind::Entity, item).await
    }

    async fn store_as(&self, kind: MemoryKind, item: AdapterItem) -> bool {
        let input = self.input_for(kind, item);
        match self.coordinator.store(&self.tenant, input).await {
            Ok(id) => {
                tracing::debug!("Adapter stored {} memory {} for tenant {}", kind, id, self.tenant);
                true
            }
            Err(e) => {
                tracing::error!("Error storing {} memory for tenant {}: {e}", kind, self.tenant);
                false
            }
        }
    }

    fn input_for(&self, kind: MemoryKind, item: AdapterItem) -> MemoryInput {
        let mut metadata = item.metadata;
        if let Some(agent_id) = &self.agent_id {
            metadata.insert("agent_id".to_string(), Value::String(agent_id.clone()));
        }
        let content_type = metadata
            .get("content_type")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();
        let metadata = (!metadata.is_empty()).then_some(metadata);

        match kind {
            MemoryKind::ShortTerm => MemoryInput::ShortTerm(ShortTermInput {
                content: item.content,
                content_type: Some(content_type),
                metadata,
                agent_id: self.agent_id.clone(),
                ..Default::default()
            }),
            MemoryKind::LongTerm => MemoryInput::LongTerm(LongTermInput {
                content: item.content,
                content_type: Some(content_type),
                metadata,
                ..Default::default()
            }),
            MemoryKind::Entity => MemoryInput::Entity(EntityInput {
                content: item.content,
                attributes: metadata,
                ..Default::default()
            }),
        }
    }

    /// Search every kind; items are grouped by kind in short-term, long-term, entity order
    pub async fn retrieve(&self, query: &str, limit: usize) -> Vec<AdapterItem> {
        self.search(query, limit, None).await
    }

    pub async fn get_short_term_memory(&self, query: &str, limit: usize) -> Vec<AdapterItem> {
        self.search(query, limit, Some(MemoryKind::ShortTerm)).await
    }

    pub async fn get_long_term_memory(&self, query: &str, limit: usize) -> Vec<AdapterItem> {
        self.search(query, limit, Some(MemoryKind::LongTerm)).await
    }

    pub async fn get_entity_memory(&self, query: &str, limit: usize) -> Vec<AdapterItem> {
        self.search(query, limit, Some(MemoryKind::Entity)).await
    }

    async fn search(&self, query: &str, limit: usize, kind: Option<MemoryKind>) -> Vec<AdapterItem> {
        match self.try_search(query, limit, kind).await {
            Ok(items) => items,
            Err(e) => {
                tracing::error!("Error retrieving memory for tenant {}: {e}", self.tenant);
                Vec::new()
            }
        }
    }

    async fn try_search(
        &self,
        query: &str,
        limit: usize,
        kind: Option<MemoryKind>,
    ) -> Result<Vec<AdapterItem>> {
        let mut options = RetrieveOptions {
            search: SearchParams {
                limit,
                ..Default::default()
            },
            ..Default::default()
        };
        if let Some(kind) = kind {
            options = options.with_kinds([kind]);
        }

        let results = self.coordinator.retrieve(&self.tenant, query, &options).await?;
        let items = results
            .into_iter()
            .flat_map(|(kind, hits)| {
                hits.into_iter().map(move |hit| {
                    let mut metadata = hit.record.metadata().cloned().unwrap_or_default();
                    metadata.insert("memory_type".to_string(), Value::from(kind.as_str()));
                    metadata.insert(
                        "similarity_score".to_string(),
                        Value::from(f64::from(hit.similarity)),
                    );
                    metadata.insert(
                        "created_at".to_string(),
                        Value::from(hit.record.created_at().to_rfc3339()),
                    );
                    AdapterItem {
                        content: hit.record.content().to_string(),
                        metadata,
                    }
                })
            })
            .collect();
        Ok(items)
    }

    /// Wipe the crew's memory. Failures are logged only.
    pub async fn clear(&self) {
        if let Err(e) = self.coordinator.clear_all(&self.tenant).await {
            tracing::error!("Error clearing memory for tenant {}: {e}", self.tenant);
        }
    }

    pub async fn get_stats(&self) -> Option<MemoryStats> {
        match self.coordinator.stats(&self.tenant).await {
            Ok(stats) => Some(stats),
            Err(e) => {
                tracing::error!("Error getting memory stats for tenant {}: {e}", self.tenant);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_item_reads_merged_metadata() {
        let item = AdapterItem::new("hello")
            .with_metadata("memory_type", "long_term")
            .with_metadata("similarity_score", 0.75);
        assert_eq!(item.memory_type(), Some("long_term"));
        assert_eq!(item.similarity_score(), Some(0.75));
        assert_eq!(AdapterItem::new("bare").memory_type(), None);
    }
}
