use std::sync::Arc;

use chrono::{SubsecRound, Utc};
use tokio::sync::Mutex;

use crate::config::{MemoryConfigPatch, MemoryConfiguration, MemoryPolicy};
use crate::error::{Result, ResultExt};
use crate::memory::types::TenantId;
use crate::storage::{LanceStore, RowFilter};

/// Per-tenant configuration records, created lazily with the engine defaults.
///
/// Creation and updates are serialized so each tenant ends up with exactly
/// one stored configuration.
pub struct ConfigRepository {
    store: Arc<LanceStore>,
    defaults: MemoryPolicy,
    lock: Mutex<()>,
}

impl ConfigRepository {
    pub fn new(store: Arc<LanceStore>, defaults: MemoryPolicy) -> Self {
        Self {
            store,
            defaults,
            lock: Mutex::new(()),
        }
    }

    pub fn defaults(&self) -> &MemoryPolicy {
        &self.defaults
    }

    /// Stored configuration, if the tenant has one
    pub async fn get(&self, tenant: &TenantId) -> Result<Option<MemoryConfiguration>> {
        self.store
            .get::<MemoryConfiguration>(&RowFilter::tenant(tenant))
            .await
            .context("load memory configuration")
    }

    pub async fn get_or_create(&self, tenant: &TenantId) -> Result<MemoryConfiguration> {
        if let Some(existing) = self.get(tenant).await? {
            return Ok(existing);
        }

        let _guard = self.lock.lock().await;
        self.load_or_insert(tenant).await
    }

    /// Caller must hold `self.lock`
    async fn load_or_insert(&self, tenant: &TenantId) -> Result<MemoryConfiguration> {
        if let Some(existing) = self.get(tenant).await? {
            return Ok(existing);
        }

        let config = MemoryConfiguration::new(tenant.clone(), self.defaults.clone());
        self.store
            .insert(std::slice::from_ref(&config))
            .await
            .context("create memory configuration")?;

        tracing::info!(tenant = %tenant, "Created default memory configuration");
        Ok(config)
    }

    /// Apply a partial update, returning the new configuration.
    ///
    /// The read, patch and write happen under the repository lock so
    /// concurrent updates to different fields all land.
    pub async fn update(
        &self,
        tenant: &TenantId,
        patch: &MemoryConfigPatch,
    ) -> Result<MemoryConfiguration> {
        let _guard = self.lock.lock().await;
        let current = self.load_or_insert(tenant).await?;
        let policy = patch.apply(&current.policy)?;

        let updated = MemoryConfiguration {
            policy,
            updated_at: Utc::now().trunc_subsecs(6),
            ..current
        };
        self.store
            .replace(&RowFilter::tenant(tenant), std::slice::from_ref(&updated))
            .await
            .context("update memory configuration")?;

        tracing::info!(tenant = %tenant, "Updated memory configuration");
        Ok(updated)
    }

    /// Every tenant with a stored configuration
    pub async fn list(&self) -> Result<Vec<MemoryConfiguration>> {
        self.store
            .configured_tenants()
            .await
            .context("list memory configurations")
    }
}
