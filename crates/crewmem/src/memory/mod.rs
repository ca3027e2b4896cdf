//! Memory stores and the types they exchange
//!
//! A store handle is bound to one tenant and that tenant's policy at the
//! time it was built; the coordinator rebuilds handles when the policy
//! changes.

pub mod cleanup_log;
pub mod entity;
pub mod long_term;
pub mod params;
pub mod retrieval;
pub mod short_term;
pub mod types;

pub use entity::EntityStore;
pub use long_term::LongTermStore;
pub use short_term::ShortTermStore;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::MemoryPolicy;
use crate::embedding::{EmbeddingProvider, embed_checked};
use crate::error::Result;
use crate::memory::types::TenantId;
use crate::storage::LanceStore;

/// Everything a store handle needs to serve one tenant
#[derive(Clone)]
pub struct StoreContext {
    pub store: Arc<LanceStore>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub tenant: TenantId,
    pub policy: MemoryPolicy,
}

impl StoreContext {
    pub fn new(
        store: Arc<LanceStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        tenant: TenantId,
        policy: MemoryPolicy,
    ) -> Self {
        Self {
            store,
            embedder,
            tenant,
            policy,
        }
    }

    pub(crate) async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        embed_checked(self.embedder.as_ref(), text, self.store.dimension()).await
    }
}

/// Newest first, ties broken by id
pub(crate) fn newest_first<T>(rows: &mut [T], key: impl Fn(&T) -> (DateTime<Utc>, Uuid)) {
    rows.sort_by(|a, b| key(b).cmp(&key(a)));
}

/// Oldest first, ties broken by id
pub(crate) fn oldest_first<T>(rows: &mut [T], key: impl Fn(&T) -> (DateTime<Utc>, Uuid)) {
    rows.sort_by_key(|r| key(r));
}
