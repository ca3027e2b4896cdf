use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::error::{CrewMemError, Result, ResultExt};
use crate::memory::params::{SearchParams, ShortTermFilter, ShortTermInput, ShortTermUpdate};
use crate::memory::retrieval::rank;
use crate::memory::types::{
    CONVERSATION_CONTENT_TYPES, DEFAULT_CONTENT_TYPE, ScoredRecord, ShortTermRecord, clamp_unit,
};
use crate::memory::{StoreContext, newest_first, oldest_first};
use crate::storage::RowFilter;

/// Default number of turns returned by [`ShortTermStore::get_conversation_context`]
pub const DEFAULT_CONTEXT_LIMIT: usize = 20;

/// Ephemeral per-turn memory with a retention window and a hard-ish entry cap
pub struct ShortTermStore {
    ctx: StoreContext,
}

impl ShortTermStore {
    pub fn new(ctx: StoreContext) -> Self {
        Self { ctx }
    }

    fn filter(&self) -> RowFilter {
        RowFilter::tenant(&self.ctx.tenant)
    }

    pub async fn store(&self, input: ShortTermInput) -> Result<Uuid> {
        self.store_inner(input)
            .await
            .context("store short-term memory")
    }

    async fn store_inner(&self, input: ShortTermInput) -> Result<Uuid> {
        if input.content.trim().is_empty() {
            return Err(CrewMemError::Validation(
                "memory content must not be empty".to_string(),
            ));
        }

        let now = Utc::now();
        let retention = Duration::hours(i64::from(self.ctx.policy.short_term_retention_hours));
        let expires_at = now.checked_add_signed(retention).ok_or_else(|| {
            CrewMemError::Validation(format!(
                "retention of {} hours is out of range",
                self.ctx.policy.short_term_retention_hours
            ))
        })?;

        let embedding = self.ctx.embed(&input.content).await?;
        let record = ShortTermRecord {
            id: Uuid::new_v4(),
            tenant_id: self.ctx.tenant.clone(),
            content: input.content,
            content_type: input
                .content_type
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            metadata: input.metadata,
            relevance_score: input.relevance_score.map(clamp_unit),
            agent_id: input.agent_id,
            execution_id: input.execution_id,
            created_at: now,
            expires_at,
            embedding,
        };

        self.ctx.store.insert(std::slice::from_ref(&record)).await?;

        if let Err(e) = self.enforce_max_entries().await {
            if let Err(rollback) = self
                .ctx
                .store
                .delete_ids::<ShortTermRecord>(&self.ctx.tenant, &[record.id])
                .await
            {
                tracing::error!("Failed to roll back short-term memory {}: {rollback}", record.id);
            }
            return Err(e);
        }

        tracing::debug!(
            "Stored short-term memory {} for tenant {}",
            record.id,
            self.ctx.tenant
        );
        Ok(record.id)
    }

    pub async fn retrieve(
        &self,
        query: &str,
        params: &SearchParams,
        filter: &ShortTermFilter,
    ) -> Result<Vec<ScoredRecord<ShortTermRecord>>> {
        params.validate()?;
        if params.limit == 0 {
            return Ok(Vec::new());
        }

        async {
            let query_embedding = self.ctx.embed(query).await?;
            let row_filter = self
                .filter()
                .eq_opt("content_type", filter.content_type.as_deref())
                .eq_opt("agent_id", filter.agent_id.as_deref());

            let candidates: Vec<ShortTermRecord> = self
                .ctx
                .store
                .nearest(&query_embedding, &row_filter, params.candidate_pool())
                .await?;

            Ok::<_, CrewMemError>(rank(
                candidates,
                &query_embedding,
                self.ctx.embedder.as_ref(),
                params,
            ))
        }
        .await
        .context("retrieve short-term memories")
    }

    /// Most recent conversation turns, returned oldest first
    pub async fn get_conversation_context(
        &self,
        limit: usize,
        execution_id: Option<&str>,
    ) -> Result<Vec<ShortTermRecord>> {
        let filter = self
            .filter()
            .in_list("content_type", &CONVERSATION_CONTENT_TYPES)
            .eq_opt("execution_id", execution_id);

        let mut rows: Vec<ShortTermRecord> = self
            .ctx
            .store
            .query(&filter)
            .await
            .context("load conversation context")?;

        newest_first(&mut rows, |r| (r.created_at, r.id));
        rows.truncate(limit);
        rows.reverse();
        Ok(rows)
    }

    pub async fn get_recent(
        &self,
        limit: usize,
        content_type: Option<&str>,
    ) -> Result<Vec<ShortTermRecord>> {
        let filter = self.filter().eq_opt("content_type", content_type);
        let mut rows: Vec<ShortTermRecord> = self
            .ctx
            .store
            .query(&filter)
            .await
            .context("load recent short-term memories")?;

        newest_first(&mut rows, |r| (r.created_at, r.id));
        rows.truncate(limit);
        Ok(rows)
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<ShortTermRecord>> {
        self.ctx
            .store
            .get(&self.filter().id(id))
            .await
            .context("load short-term memory")
    }

    /// Returns `false` when the record does not exist
    pub async fn update(&self, id: Uuid, update: ShortTermUpdate) -> Result<bool> {
        async {
            let Some(mut record) = self.get_by_id(id).await? else {
                return Ok(false);
            };

            if let Some(content) = update.content {
                if content != record.content {
                    record.embedding = self.ctx.embed(&content).await?;
                    record.content = content;
                }
            }
            if let Some(metadata) = update.metadata {
                record.metadata = Some(metadata);
            }
            if let Some(relevance) = update.relevance_score {
                record.relevance_score = Some(clamp_unit(relevance));
            }

            self.ctx
                .store
                .replace(&self.filter().id(id), std::slice::from_ref(&record))
                .await?;
            Ok::<_, CrewMemError>(true)
        }
        .await
        .context("update short-term memory")
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let removed = self
            .ctx
            .store
            .delete_where::<ShortTermRecord>(&self.filter().id(id))
            .await
            .context("delete short-term memory")?;
        Ok(removed > 0)
    }

    pub async fn clear_all(&self) -> Result<usize> {
        let removed = self
            .ctx
            .store
            .delete_where::<ShortTermRecord>(&self.filter())
            .await
            .context("clear short-term memories")?;
        tracing::info!(
            "Cleared {} short-term memories for tenant {}",
            removed,
            self.ctx.tenant
        );
        Ok(removed)
    }

    pub async fn count(&self) -> Result<usize> {
        self.ctx
            .store
            .count::<ShortTermRecord>(&self.filter())
            .await
            .context("count short-term memories")
    }

    /// Remove expired records, then trim to the entry cap
    pub async fn cleanup(&self) -> Result<usize> {
        async {
            let now = Utc::now();
            let rows: Vec<ShortTermRecord> = self.ctx.store.query(&self.filter()).await?;
            let expired: Vec<Uuid> = rows
                .iter()
                .filter(|r| r.is_expired(now))
                .map(|r| r.id)
                .collect();

            let removed = self
                .ctx
                .store
                .delete_ids::<ShortTermRecord>(&self.ctx.tenant, &expired)
                .await?;
            let evicted = self.enforce_max_entries().await?;

            if removed + evicted > 0 {
                tracing::info!(
                    "Short-term cleanup for tenant {}: {} expired, {} evicted",
                    self.ctx.tenant,
                    removed,
                    evicted
                );
            }
            Ok::<_, CrewMemError>(removed + evicted)
        }
        .await
        .context("clean up short-term memories")
    }

    /// Delete the oldest records beyond the configured cap
    pub async fn enforce_max_entries(&self) -> Result<usize> {
        let max = self.ctx.policy.short_term_max_entries;
        let count = self.ctx.store.count::<ShortTermRecord>(&self.filter()).await?;
        if count <= max {
            return Ok(0);
        }

        let mut rows: Vec<ShortTermRecord> = self.ctx.store.query(&self.filter()).await?;
        oldest_first(&mut rows, |r| (r.created_at, r.id));
        let excess = rows.len().saturating_sub(max);
        let doomed: Vec<Uuid> = rows.iter().take(excess).map(|r| r.id).collect();

        let removed = self
            .ctx
            .store
            .delete_ids::<ShortTermRecord>(&self.ctx.tenant, &doomed)
            .await?;
        tracing::debug!(
            "Evicted {} short-term memories for tenant {} (cap {})",
            removed,
            self.ctx.tenant,
            max
        );
        Ok(removed)
    }
}
