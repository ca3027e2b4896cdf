use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::error::{CrewMemError, Result, ResultExt};
use crate::memory::params::{
    DEFAULT_IMPORTANCE, LongTermFilter, LongTermInput, LongTermUpdate, SearchParams,
};
use crate::memory::retrieval::rank;
use crate::memory::types::{
    DEFAULT_CONTENT_TYPE, INSIGHT_CONTENT_TYPES, LongTermRecord, ScoredRecord, ShortTermRecord,
    clamp_unit, normalize_tags,
};
use crate::memory::{StoreContext, newest_first};
use crate::storage::RowFilter;
use crate::storage::filter::timestamp_literal;

/// Similarity at which a consolidation candidate counts as already known
pub const DUPLICATE_SIMILARITY: f32 = 0.9;
/// Importance added to an existing record when consolidation finds a duplicate
pub const DUPLICATE_IMPORTANCE_BOOST: f32 = 0.1;
/// Minimum importance returned by `get_insights`
pub const INSIGHT_MIN_IMPORTANCE: f32 = 0.7;
/// Characters kept in a consolidated record's summary
pub const SUMMARY_CHARS: usize = 200;

const STALE_IMPORTANCE: f32 = 0.3;
const STALE_AGE_DAYS: i64 = 30;
const DUPLICATE_POOL: usize = 5;

/// Durable knowledge ranked by similarity and importance
pub struct LongTermStore {
    ctx: StoreContext,
}

impl LongTermStore {
    pub fn new(ctx: StoreContext) -> Self {
        Self { ctx }
    }

    fn filter(&self) -> RowFilter {
        RowFilter::tenant(&self.ctx.tenant)
    }

    pub async fn store(&self, input: LongTermInput) -> Result<Uuid> {
        async {
            if input.content.trim().is_empty() {
                return Err(CrewMemError::Validation(
                    "memory content must not be empty".to_string(),
                ));
            }

            let embedding = self.ctx.embed(&input.content).await?;
            let now = Utc::now();
            let record = LongTermRecord {
                id: Uuid::new_v4(),
                tenant_id: self.ctx.tenant.clone(),
                content: input.content,
                content_type: input
                    .content_type
                    .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
                summary: input.summary,
                metadata: input.metadata,
                importance: clamp_unit(input.importance.unwrap_or(DEFAULT_IMPORTANCE)),
                access_count: 0,
                last_accessed: None,
                source_execution_id: input.source_execution_id,
                tags: normalize_tags(&input.tags),
                created_at: now,
                updated_at: now,
                embedding,
            };

            self.insert_record(&record).await?;
            Ok::<_, CrewMemError>(record.id)
        }
        .await
        .context("store long-term memory")
    }

    /// Insert, then enforce the cap; the insert is undone if eviction fails
    async fn insert_record(&self, record: &LongTermRecord) -> Result<()> {
        self.ctx.store.insert(std::slice::from_ref(record)).await?;

        if let Err(e) = self.enforce_max_entries().await {
            if let Err(rollback) = self
                .ctx
                .store
                .delete_ids::<LongTermRecord>(&self.ctx.tenant, &[record.id])
                .await
            {
                tracing::error!("Failed to roll back long-term memory {}: {rollback}", record.id);
            }
            return Err(e);
        }

        tracing::debug!(
            "Stored long-term memory {} for tenant {} (importance {:.2})",
            record.id,
            self.ctx.tenant,
            record.importance
        );
        Ok(())
    }

    /// Ranked by `similarity * 0.7 + importance * 0.3`; returned records
    /// have their access counters bumped
    pub async fn retrieve(
        &self,
        query: &str,
        params: &SearchParams,
        filter: &LongTermFilter,
    ) -> Result<Vec<ScoredRecord<LongTermRecord>>> {
        params.validate()?;
        if params.limit == 0 {
            return Ok(Vec::new());
        }

        let mut results = async {
            let query_embedding = self.ctx.embed(query).await?;
            let tags = normalize_tags(&filter.tags);
            let row_filter = self
                .filter()
                .eq_opt("content_type", filter.content_type.as_deref())
                .at_least_opt("importance", filter.min_importance)
                .has_tags("tags", &tags);

            let candidates: Vec<LongTermRecord> = self
                .ctx
                .store
                .nearest(&query_embedding, &row_filter, params.candidate_pool())
                .await?
                .into_iter()
                .filter(|r| r.has_all_tags(&tags))
                .collect();

            Ok::<_, CrewMemError>(rank(
                candidates,
                &query_embedding,
                self.ctx.embedder.as_ref(),
                params,
            ))
        }
        .await
        .context("retrieve long-term memories")?;

        let ids: Vec<Uuid> = results.iter().map(|r| r.record.id).collect();
        if self.record_access(&ids).await {
            let now = Utc::now();
            for hit in &mut results {
                hit.record.access_count = hit.record.access_count.saturating_add(1);
                hit.record.last_accessed = Some(now);
            }
        }
        Ok(results)
    }

    /// Best-effort `access_count + 1` for the given records.
    ///
    /// Concurrent readers race on the increment; a failure is logged and
    /// reported as `false` rather than failing the read.
    async fn record_access(&self, ids: &[Uuid]) -> bool {
        if ids.is_empty() {
            return false;
        }

        let result = self
            .ctx
            .store
            .update_where::<LongTermRecord>(
                &self.filter().ids(ids),
                &[
                    ("access_count", "access_count + 1".to_string()),
                    ("last_accessed", timestamp_literal(Utc::now())),
                ],
            )
            .await;

        match result {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(
                    "Failed to record access for {} long-term memories: {e}",
                    ids.len()
                );
                false
            }
        }
    }

    /// Fetch one record, bumping its access counter
    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<LongTermRecord>> {
        let Some(mut record) = self.load(id).await? else {
            return Ok(None);
        };

        if self.record_access(&[id]).await {
            record.access_count = record.access_count.saturating_add(1);
            record.last_accessed = Some(Utc::now());
        }
        Ok(Some(record))
    }

    async fn load(&self, id: Uuid) -> Result<Option<LongTermRecord>> {
        self.ctx
            .store
            .get(&self.filter().id(id))
            .await
            .context("load long-term memory")
    }

    pub async fn update(&self, id: Uuid, update: LongTermUpdate) -> Result<bool> {
        async {
            let Some(mut record) = self.load(id).await? else {
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
            if let Some(importance) = update.importance {
                record.importance = clamp_unit(importance);
            }
            if let Some(tags) = update.tags {
                record.tags = normalize_tags(&tags);
            }
            if let Some(summary) = update.summary {
                record.summary = Some(summary);
            }
            record.updated_at = Utc::now();

            self.ctx
                .store
                .replace(&self.filter().id(id), std::slice::from_ref(&record))
                .await?;
            Ok::<_, CrewMemError>(true)
        }
        .await
        .context("update long-term memory")
    }

    /// High-importance insights, learnings, and patterns
    pub async fn get_insights(&self, limit: usize) -> Result<Vec<LongTermRecord>> {
        let filter = self
            .filter()
            .in_list("content_type", &INSIGHT_CONTENT_TYPES)
            .at_least("importance", INSIGHT_MIN_IMPORTANCE);

        let mut rows: Vec<LongTermRecord> = self
            .ctx
            .store
            .query(&filter)
            .await
            .context("load insights")?;

        rows.sort_by(|a, b| {
            b.importance
                .total_cmp(&a.importance)
                .then_with(|| b.access_count.cmp(&a.access_count))
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        rows.truncate(limit);
        Ok(rows)
    }

    /// Records carrying every tag (exact match), most important first
    pub async fn get_by_tags(&self, tags: &[String], limit: usize) -> Result<Vec<LongTermRecord>> {
        let tags = normalize_tags(tags);
        if tags.is_empty() {
            return Ok(Vec::new());
        }

        let mut rows: Vec<LongTermRecord> = self
            .ctx
            .store
            .query(&self.filter().has_tags("tags", &tags))
            .await
            .context("load long-term memories by tag")?;

        rows.retain(|r| r.has_all_tags(&tags));
        rows.sort_by(|a, b| {
            b.importance
                .total_cmp(&a.importance)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        rows.truncate(limit);
        Ok(rows)
    }

    pub async fn get_recent(
        &self,
        limit: usize,
        content_type: Option<&str>,
    ) -> Result<Vec<LongTermRecord>> {
        let mut rows: Vec<LongTermRecord> = self
            .ctx
            .store
            .query(&self.filter().eq_opt("content_type", content_type))
            .await
            .context("load recent long-term memories")?;

        newest_first(&mut rows, |r| (r.created_at, r.id));
        rows.truncate(limit);
        Ok(rows)
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let removed = self
            .ctx
            .store
            .delete_where::<LongTermRecord>(&self.filter().id(id))
            .await
            .context("delete long-term memory")?;
        Ok(removed > 0)
    }

    pub async fn clear_all(&self) -> Result<usize> {
        let removed = self
            .ctx
            .store
            .delete_where::<LongTermRecord>(&self.filter())
            .await
            .context("clear long-term memories")?;
        tracing::info!(
            "Cleared {} long-term memories for tenant {}",
            removed,
            self.ctx.tenant
        );
        Ok(removed)
    }

    pub async fn count(&self) -> Result<usize> {
        self.ctx
            .store
            .count::<LongTermRecord>(&self.filter())
            .await
            .context("count long-term memories")
    }

    /// Remove stale, never-accessed, low-importance records, then trim to the cap
    pub async fn cleanup(&self) -> Result<usize> {
        async {
            let cutoff = Utc::now() - Duration::days(STALE_AGE_DAYS);
            let rows: Vec<LongTermRecord> = self.ctx.store.query(&self.filter()).await?;
            let stale: Vec<Uuid> = rows
                .iter()
                .filter(|r| {
                    r.importance < STALE_IMPORTANCE && r.access_count == 0 && r.created_at < cutoff
                })
                .map(|r| r.id)
                .collect();

            let removed = self
                .ctx
                .store
                .delete_ids::<LongTermRecord>(&self.ctx.tenant, &stale)
                .await?;
            let evicted = self.enforce_max_entries().await?;

            if removed + evicted > 0 {
                tracing::info!(
                    "Long-term cleanup for tenant {}: {} stale, {} evicted",
                    self.ctx.tenant,
                    removed,
                    evicted
                );
            }
            Ok::<_, CrewMemError>(removed + evicted)
        }
        .await
        .context("clean up long-term memories")
    }

    /// Evict ascending on (importance, access_count, created_at) beyond the cap
    pub async fn enforce_max_entries(&self) -> Result<usize> {
        let max = self.ctx.policy.long_term_max_entries;
        let count = self.ctx.store.count::<LongTermRecord>(&self.filter()).await?;
        if count <= max {
            return Ok(0);
        }

        let mut rows: Vec<LongTermRecord> = self.ctx.store.query(&self.filter()).await?;
        rows.sort_by(|a, b| {
            a.importance
                .total_cmp(&b.importance)
                .then_with(|| a.access_count.cmp(&b.access_count))
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        let excess = rows.len().saturating_sub(max);
        let doomed: Vec<Uuid> = rows.iter().take(excess).map(|r| r.id).collect();

        let removed = self
            .ctx
            .store
            .delete_ids::<LongTermRecord>(&self.ctx.tenant, &doomed)
            .await?;
        tracing::debug!(
            "Evicted {} long-term memories for tenant {} (cap {})",
            removed,
            self.ctx.tenant,
            max
        );
        Ok(removed)
    }

    /// Closest record at or above `min_similarity`, without touching access counters
    pub async fn find_duplicate(
        &self,
        embedding: &[f32],
        min_similarity: f32,
    ) -> Result<Option<ScoredRecord<LongTermRecord>>> {
        let candidates: Vec<LongTermRecord> = self
            .ctx
            .store
            .nearest(embedding, &self.filter(), DUPLICATE_POOL)
            .await?;

        let best = candidates
            .into_iter()
            .map(|record| {
                let similarity = self.ctx.embedder.similarity(embedding, &record.embedding);
                ScoredRecord {
                    record,
                    similarity,
                    score: similarity,
                }
            })
            .filter(|hit| hit.similarity >= min_similarity)
            .max_by(|a, b| a.similarity.total_cmp(&b.similarity));
        Ok(best)
    }

    /// Promote qualifying short-term records; returns how many were inserted.
    ///
    /// A record qualifies when its relevance (missing counts as 0) reaches
    /// the tenant's consolidation threshold. Records that duplicate existing
    /// knowledge raise the existing record's importance instead.
    pub async fn consolidate_from_short_term(&self, items: &[ShortTermRecord]) -> Result<usize> {
        let threshold = self.ctx.policy.long_term_consolidation_threshold;
        let mut inserted = 0;

        for item in items {
            if item.relevance_score.unwrap_or(0.0) < threshold {
                continue;
            }
            let promoted = self
                .consolidate_one(item)
                .await
                .context("consolidate short-term memory")?;
            if promoted {
                inserted += 1;
            }
        }

        if inserted > 0 {
            tracing::info!(
                "Consolidated {} short-term memories into long-term for tenant {}",
                inserted,
                self.ctx.tenant
            );
        }
        Ok(inserted)
    }

    async fn consolidate_one(&self, item: &ShortTermRecord) -> Result<bool> {
        let embedding = if item.embedding.len() == self.ctx.store.dimension() {
            item.embedding.clone()
        } else {
            self.ctx.embed(&item.content).await?
        };

        if let Some(duplicate) = self.find_duplicate(&embedding, DUPLICATE_SIMILARITY).await? {
            let mut record = duplicate.record;
            record.importance = (record.importance + DUPLICATE_IMPORTANCE_BOOST).min(1.0);
            record.updated_at = Utc::now();
            self.ctx
                .store
                .replace(&self.filter().id(record.id), std::slice::from_ref(&record))
                .await?;
            tracing::debug!(
                "Short-term memory {} duplicates long-term {} (similarity {:.3}), importance now {:.2}",
                item.id,
                record.id,
                duplicate.similarity,
                record.importance
            );
            return Ok(false);
        }

        let now = Utc::now();
        let record = LongTermRecord {
            id: Uuid::new_v4(),
            tenant_id: self.ctx.tenant.clone(),
            content: item.content.clone(),
            content_type: item.content_type.clone(),
            summary: Some(summarize(&item.content)),
            metadata: item.metadata.clone(),
            importance: clamp_unit(item.relevance_score.unwrap_or(DEFAULT_IMPORTANCE)),
            access_count: 0,
            last_accessed: None,
            source_execution_id: item.execution_id.clone(),
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
            embedding,
        };
        self.insert_record(&record).await?;
        Ok(true)
    }
}

/// First [`SUMMARY_CHARS`] characters, with an ellipsis when truncated
pub fn summarize(content: &str) -> String {
    if content.chars().count() > SUMMARY_CHARS {
        let head: String = content.chars().take(SUMMARY_CHARS).collect();
        format!("{head}...")
    } else {
        content.to_string()
    }
}
