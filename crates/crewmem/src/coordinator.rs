//! Single entry point for tenant memory operations
//!
//! The coordinator resolves each tenant's configuration, builds store
//! handles bound to that configuration, and fans operations out to the
//! short-term, long-term, and entity stores. It also owns the cross-store
//! operations: consolidation, cleanup, wipe, and statistics.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{Config, ConfigRepository, MemoryConfigPatch, MemoryConfiguration};
use crate::embedding::ProviderRegistry;
use crate::error::{Result, ResultExt};
use crate::memory::cleanup_log::{CleanupKind, CleanupLogEntry, CleanupReason};
use crate::memory::params::{MemoryInput, RetrieveOptions};
use crate::memory::types::{
    EntityRecord, LongTermRecord, MemoryKind, MemoryRecord, RelationshipView, SearchHit,
    ShortTermRecord, TenantId,
};
use crate::memory::{EntityStore, LongTermStore, ShortTermStore, StoreContext};
use crate::storage::{LanceStore, RowFilter};

/// Short-term records read per consolidation pass
pub const CONSOLIDATION_BATCH: usize = 50;
/// Cleanup log entries included in stats
pub const RECENT_CLEANUP_LOGS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidationReport {
    pub evaluated: usize,
    pub consolidated: usize,
    pub threshold: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub short_term: usize,
    pub long_term: usize,
    pub entity: usize,
    pub total: usize,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClearReport {
    pub short_term: usize,
    pub long_term: usize,
    pub entity: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryCounts {
    pub short_term: usize,
    pub long_term: usize,
    pub entity: usize,
    pub relationships: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryLimits {
    pub short_term_max_entries: usize,
    pub long_term_max_entries: usize,
}

/// Percent of each capped store in use
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryUtilization {
    pub short_term_percent: f64,
    pub long_term_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub tenant_id: TenantId,
    pub counts: MemoryCounts,
    pub limits: MemoryLimits,
    pub utilization: MemoryUtilization,
    pub recent_cleanups: Vec<CleanupLogEntry>,
    pub config: MemoryConfiguration,
}

fn percent(count: usize, max: usize) -> f64 {
    if max == 0 {
        return 0.0;
    }
    ((count as f64 / max as f64) * 1000.0).round() / 10.0
}

pub struct MemoryCoordinator {
    store: Arc<LanceStore>,
    registry: Arc<ProviderRegistry>,
    configs: Arc<ConfigRepository>,
    short_term: DashMap<TenantId, Arc<ShortTermStore>>,
    long_term: DashMap<TenantId, Arc<LongTermStore>>,
    entity: DashMap<TenantId, Arc<EntityStore>>,
}

impl MemoryCoordinator {
    pub fn new(
        store: Arc<LanceStore>,
        registry: Arc<ProviderRegistry>,
        configs: Arc<ConfigRepository>,
    ) -> Self {
        Self {
            store,
            registry,
            configs,
            short_term: DashMap::new(),
            long_term: DashMap::new(),
            entity: DashMap::new(),
        }
    }

    /// Open the database under the configured data directory and wire up
    /// the registry and configuration repository
    pub async fn open(config: &Config) -> Result<Self> {
        let db_path = config.storage.data_dir.join("lancedb");
        std::fs::create_dir_all(&db_path)?;
        tracing::info!("Opening memory database at {}", db_path.display());

        let store = Arc::new(LanceStore::open(&db_path, config.embedding.dimension).await?);
        let registry = Arc::new(ProviderRegistry::new(config.embedding.clone()));
        let configs = Arc::new(ConfigRepository::new(
            Arc::clone(&store),
            config.defaults.clone(),
        ));
        Ok(Self::new(store, registry, configs))
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub async fn config(&self, tenant: &TenantId) -> Result<MemoryConfiguration> {
        self.configs.get_or_create(tenant).await
    }

    /// Every tenant with a stored configuration
    pub async fn tenants(&self) -> Result<Vec<MemoryConfiguration>> {
        self.configs.list().await
    }

    async fn context(&self, tenant: &TenantId) -> Result<StoreContext> {
        let config = self.config(tenant).await?;
        let embedder = self
            .registry
            .for_policy(&config.policy)
            .await
            .context("resolve embedding provider")?;
        Ok(StoreContext::new(
            Arc::clone(&self.store),
            embedder,
            tenant.clone(),
            config.policy,
        ))
    }

    /// Cached handle for a tenant, built from the current policy on a miss
    async fn cached<S>(
        &self,
        cache: &DashMap<TenantId, Arc<S>>,
        tenant: &TenantId,
        build: impl FnOnce(StoreContext) -> S,
    ) -> Result<Arc<S>> {
        if let Some(handle) = cache.get(tenant) {
            return Ok(Arc::clone(handle.value()));
        }

        let handle = Arc::new(build(self.context(tenant).await?));
        cache.insert(tenant.clone(), Arc::clone(&handle));
        tracing::debug!("Built store handle for tenant {}", tenant);
        Ok(handle)
    }

    pub async fn short_term(&self, tenant: &TenantId) -> Result<Arc<ShortTermStore>> {
        self.cached(&self.short_term, tenant, ShortTermStore::new)
            .await
    }

    pub async fn long_term(&self, tenant: &TenantId) -> Result<Arc<LongTermStore>> {
        self.cached(&self.long_term, tenant, LongTermStore::new).await
    }

    pub async fn entity(&self, tenant: &TenantId) -> Result<Arc<EntityStore>> {
        self.cached(&self.entity, tenant, EntityStore::new).await
    }

    /// Drop cached handles so the next operation picks up the current policy
    pub fn invalidate(&self, tenant: &TenantId) {
        self.short_term.remove(tenant);
        self.long_term.remove(tenant);
        self.entity.remove(tenant);
    }

    /// Number of store handles currently cached for a tenant
    pub fn cached_handles(&self, tenant: &TenantId) -> usize {
        [
            self.short_term.contains_key(tenant),
            self.long_term.contains_key(tenant),
            self.entity.contains_key(tenant),
        ]
        .into_iter()
        .filter(|cached| *cached)
        .count()
    }

    pub async fn store(&self, tenant: &TenantId, input: MemoryInput) -> Result<Uuid> {
        match input {
            MemoryInput::ShortTerm(input) => self.short_term(tenant).await?.store(input).await,
            MemoryInput::LongTerm(input) => self.long_term(tenant).await?.store(input).await,
            MemoryInput::Entity(input) => self.entity(tenant).await?.store(input).await,
        }
    }

    /// Search each requested kind independently; results are not merged
    pub async fn retrieve(
        &self,
        tenant: &TenantId,
        query: &str,
        options: &RetrieveOptions,
    ) -> Result<BTreeMap<MemoryKind, Vec<SearchHit>>> {
        options.search.validate()?;
        let mut results = BTreeMap::new();

        for kind in options.kinds() {
            let hits: Vec<SearchHit> = match kind {
                MemoryKind::ShortTerm => self
                    .short_term(tenant)
                    .await?
                    .retrieve(query, &options.search, &options.short_term)
                    .await?
                    .into_iter()
                    .map(|hit| hit.map(MemoryRecord::from))
                    .collect(),
                MemoryKind::LongTerm => self
                    .long_term(tenant)
                    .await?
                    .retrieve(query, &options.search, &options.long_term)
                    .await?
                    .into_iter()
                    .map(|hit| hit.map(MemoryRecord::from))
                    .collect(),
                MemoryKind::Entity => self
                    .entity(tenant)
                    .await?
                    .retrieve(query, &options.search, &options.entity)
                    .await?
                    .into_iter()
                    .map(|hit| hit.map(MemoryRecord::from))
                    .collect(),
            };
            results.insert(kind, hits);
        }

        Ok(results)
    }

    pub async fn get(
        &self,
        tenant: &TenantId,
        kind: MemoryKind,
        id: Uuid,
    ) -> Result<Option<MemoryRecord>> {
        Ok(match kind {
            MemoryKind::ShortTerm => self
                .short_term(tenant)
                .await?
                .get_by_id(id)
                .await?
                .map(MemoryRecord::from),
            MemoryKind::LongTerm => self
                .long_term(tenant)
                .await?
                .get_by_id(id)
                .await?
                .map(MemoryRecord::from),
            MemoryKind::Entity => self
                .entity(tenant)
                .await?
                .get_by_id(id)
                .await?
                .map(MemoryRecord::from),
        })
    }

    pub async fn delete(&self, tenant: &TenantId, kind: MemoryKind, id: Uuid) -> Result<bool> {
        match kind {
            MemoryKind::ShortTerm => self.short_term(tenant).await?.delete(id).await,
            MemoryKind::LongTerm => self.long_term(tenant).await?.delete(id).await,
            MemoryKind::Entity => self.entity(tenant).await?.delete(id).await,
        }
    }

    /// Newest records of one kind (entities by last update)
    pub async fn recent(
        &self,
        tenant: &TenantId,
        kind: MemoryKind,
        limit: usize,
        content_type: Option<&str>,
    ) -> Result<Vec<MemoryRecord>> {
        Ok(match kind {
            MemoryKind::ShortTerm => self
                .short_term(tenant)
                .await?
                .get_recent(limit, content_type)
                .await?
                .into_iter()
                .map(MemoryRecord::from)
                .collect(),
            MemoryKind::LongTerm => self
                .long_term(tenant)
                .await?
                .get_recent(limit, content_type)
                .await?
                .into_iter()
                .map(MemoryRecord::from)
                .collect(),
            MemoryKind::Entity => self
                .entity(tenant)
                .await?
                .get_recent(limit)
                .await?
                .into_iter()
                .map(MemoryRecord::from)
                .collect(),
        })
    }

    pub async fn conversation_context(
        &self,
        tenant: &TenantId,
        limit: usize,
        execution_id: Option<&str>,
    ) -> Result<Vec<ShortTermRecord>> {
        self.short_term(tenant)
            .await?
            .get_conversation_context(limit, execution_id)
            .await
    }

    pub async fn insights(&self, tenant: &TenantId, limit: usize) -> Result<Vec<LongTermRecord>> {
        self.long_term(tenant).await?.get_insights(limit).await
    }

    pub async fn long_term_by_tags(
        &self,
        tenant: &TenantId,
        tags: &[String],
        limit: usize,
    ) -> Result<Vec<LongTermRecord>> {
        self.long_term(tenant).await?.get_by_tags(tags, limit).await
    }

    pub async fn entities_by_type(
        &self,
        tenant: &TenantId,
        entity_type: &str,
        limit: usize,
    ) -> Result<Vec<EntityRecord>> {
        self.entity(tenant)
            .await?
            .get_by_type(entity_type, limit)
            .await
    }

    pub async fn add_relationship(
        &self,
        tenant: &TenantId,
        source: Uuid,
        target: Uuid,
        relationship_type: &str,
        strength: Option<f32>,
        context: Option<String>,
    ) -> Result<Uuid> {
        self.entity(tenant)
            .await?
            .add_relationship(source, target, relationship_type, strength, context)
            .await
    }

    pub async fn relationships(
        &self,
        tenant: &TenantId,
        entity: Uuid,
        relationship_type: Option<&str>,
    ) -> Result<Vec<RelationshipView>> {
        self.entity(tenant)
            .await?
            .get_relationships(entity, relationship_type)
            .await
    }

    /// Promote the most recent short-term records into long-term memory
    pub async fn consolidate(&self, tenant: &TenantId) -> Result<ConsolidationReport> {
        let short_term = self.short_term(tenant).await?;
        let long_term = self.long_term(tenant).await?;
        let threshold = self.config(tenant).await?.policy.long_term_consolidation_threshold;

        let recent = short_term.get_recent(CONSOLIDATION_BATCH, None).await?;
        let consolidated = long_term.consolidate_from_short_term(&recent).await?;

        tracing::info!(
            "Consolidation for tenant {}: {} evaluated, {} consolidated (threshold {:.2})",
            tenant,
            recent.len(),
            consolidated,
            threshold
        );
        Ok(ConsolidationReport {
            evaluated: recent.len(),
            consolidated,
            threshold,
        })
    }

    /// Run every store's cleanup and record the pass in the cleanup log
    pub async fn cleanup(&self, tenant: &TenantId, reason: CleanupReason) -> Result<CleanupReport> {
        let started = Instant::now();

        let short_term = self.short_term(tenant).await?.cleanup().await?;
        let long_term = self.long_term(tenant).await?.cleanup().await?;
        let entity = self.entity(tenant).await?.cleanup().await?;
        let total = short_term + long_term + entity;
        let duration_seconds = started.elapsed().as_secs_f64();

        self.log_cleanup(tenant, total, reason, duration_seconds)
            .await?;

        tracing::info!(
            "Cleanup ({}) for tenant {}: removed {} in {:.3}s",
            reason,
            tenant,
            total,
            duration_seconds
        );
        Ok(CleanupReport {
            short_term,
            long_term,
            entity,
            total,
            duration_seconds,
        })
    }

    async fn log_cleanup(
        &self,
        tenant: &TenantId,
        removed: usize,
        reason: CleanupReason,
        duration_seconds: f64,
    ) -> Result<()> {
        let entry = CleanupLogEntry::new(
            tenant.clone(),
            CleanupKind::Full,
            removed,
            reason,
            duration_seconds,
        );
        self.store
            .insert(std::slice::from_ref(&entry))
            .await
            .context("write cleanup log")
    }

    /// Cleanup log entries for a tenant, newest first
    pub async fn cleanup_logs(
        &self,
        tenant: &TenantId,
        reason: Option<CleanupReason>,
        limit: usize,
    ) -> Result<Vec<CleanupLogEntry>> {
        let filter = RowFilter::tenant(tenant).eq_opt("reason", reason.map(|r| r.as_str()));
        let mut entries: Vec<CleanupLogEntry> = self
            .store
            .query(&filter)
            .await
            .context("load cleanup log")?;

        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(limit);
        Ok(entries)
    }

    /// Wipe every store for a tenant; the configuration is kept
    pub async fn clear_all(&self, tenant: &TenantId) -> Result<ClearReport> {
        let started = Instant::now();

        let short_term = self.short_term(tenant).await?.clear_all().await?;
        let long_term = self.long_term(tenant).await?.clear_all().await?;
        let entity = self.entity(tenant).await?.clear_all().await?;
        let total = short_term + long_term + entity;

        self.invalidate(tenant);
        self.log_cleanup(
            tenant,
            total,
            CleanupReason::Manual,
            started.elapsed().as_secs_f64(),
        )
        .await?;

        tracing::info!("Cleared all memory for tenant {}: {} records", tenant, total);
        Ok(ClearReport {
            short_term,
            long_term,
            entity,
            total,
        })
    }

    pub async fn stats(&self, tenant: &TenantId) -> Result<MemoryStats> {
        let config = self.config(tenant).await?;
        let short_term = self.short_term(tenant).await?.count().await?;
        let long_term_store = self.long_term(tenant).await?;
        let long_term = long_term_store.count().await?;
        let entity_store = self.entity(tenant).await?;
        let entity = entity_store.count().await?;
        let relationships = entity_store.count_relationships().await?;
        let recent_cleanups = self.cleanup_logs(tenant, None, RECENT_CLEANUP_LOGS).await?;

        Ok(MemoryStats {
            tenant_id: tenant.clone(),
            counts: MemoryCounts {
                short_term,
                long_term,
                entity,
                relationships,
                total: short_term + long_term + entity,
            },
            limits: MemoryLimits {
                short_term_max_entries: config.policy.short_term_max_entries,
                long_term_max_entries: config.policy.long_term_max_entries,
            },
            utilization: MemoryUtilization {
                short_term_percent: percent(short_term, config.policy.short_term_max_entries),
                long_term_percent: percent(long_term, config.policy.long_term_max_entries),
            },
            recent_cleanups,
            config,
        })
    }

    /// Apply recognized policy fields and rebuild the tenant's handles
    pub async fn update_config(
        &self,
        tenant: &TenantId,
        patch: &MemoryConfigPatch,
    ) -> Result<MemoryConfiguration> {
        let updated = self.configs.update(tenant, patch).await?;
        self.invalidate(tenant);
        Ok(updated)
    }
}
