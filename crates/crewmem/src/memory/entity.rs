use std::collections::{HashMap, HashSet};

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::error::{CrewMemError, Result, ResultExt};
use crate::memory::params::{
    DEFAULT_CONFIDENCE, DEFAULT_STRENGTH, EntityFilter, EntityInput, EntityUpdate, SearchParams,
};
use crate::memory::retrieval::rank;
use crate::memory::types::{
    DEFAULT_ENTITY_TYPE, EntityRecord, EntityRelationship, Metadata, RelationshipDirection,
    RelationshipView, ScoredRecord, clamp_unit, entity_embedding_text,
};
use crate::memory::{StoreContext, newest_first};
use crate::storage::RowFilter;
use crate::storage::filter::timestamp_literal;

/// Name used when neither a name nor any content is given
const UNNAMED_ENTITY: &str = "unknown";
const STALE_CONFIDENCE: f32 = 0.3;
const STALE_MAX_MENTIONS: u32 = 1;
const STALE_AGE_DAYS: i64 = 60;

/// Deduplicated named entities and the directed relationships between them
pub struct EntityStore {
    ctx: StoreContext,
}

fn touching(id: Uuid) -> String {
    format!("(source_entity_id = '{id}' OR target_entity_id = '{id}')")
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl EntityStore {
    pub fn new(ctx: StoreContext) -> Self {
        Self { ctx }
    }

    fn filter(&self) -> RowFilter {
        RowFilter::tenant(&self.ctx.tenant)
    }

    /// Store or merge an entity.
    ///
    /// Refused with a validation error when the confidence is below the
    /// tenant's entity confidence threshold. An existing entity whose name
    /// contains the given name (case-insensitive, same type if one is given)
    /// absorbs the mention instead of a new record being created.
    pub async fn store(&self, input: EntityInput) -> Result<Uuid> {
        let confidence = clamp_unit(input.confidence.unwrap_or(DEFAULT_CONFIDENCE));
        let threshold = self.ctx.policy.entity_confidence_threshold;
        if confidence < threshold {
            return Err(CrewMemError::Validation(format!(
                "entity confidence {confidence} below threshold {threshold}"
            )));
        }

        async {
            let name = non_empty(input.name)
                .map(|n| n.trim().to_string())
                .or_else(|| input.content.split_whitespace().next().map(str::to_string))
                .unwrap_or_else(|| UNNAMED_ENTITY.to_string());
            let entity_type = non_empty(input.entity_type);
            let description = non_empty(input.description);

            match self.find_by_name(&name, entity_type.as_deref()).await? {
                Some(existing) => {
                    self.merge(existing, description, input.attributes, confidence)
                        .await
                }
                None => {
                    let entity_type =
                        entity_type.unwrap_or_else(|| DEFAULT_ENTITY_TYPE.to_string());
                    let embedding = self
                        .ctx
                        .embed(&entity_embedding_text(&name, &entity_type, description.as_deref()))
                        .await?;
                    let now = Utc::now();
                    let record = EntityRecord {
                        id: Uuid::new_v4(),
                        tenant_id: self.ctx.tenant.clone(),
                        name,
                        entity_type,
                        description,
                        attributes: input.attributes.unwrap_or_default(),
                        confidence,
                        mention_count: 1,
                        first_mentioned: now,
                        last_updated: now,
                        embedding,
                    };
                    self.ctx.store.insert(std::slice::from_ref(&record)).await?;
                    tracing::debug!(
                        "Stored entity {} ({}) for tenant {}",
                        record.name,
                        record.id,
                        self.ctx.tenant
                    );
                    Ok(record.id)
                }
            }
        }
        .await
        .context("store entity")
    }

    /// Earliest-mentioned entity whose name contains `name`, ignoring case
    async fn find_by_name(&self, name: &str, entity_type: Option<&str>) -> Result<Option<EntityRecord>> {
        let filter = self
            .filter()
            .contains_ci("name", name)
            .eq_opt("entity_type", entity_type);
        let needle = name.to_lowercase();

        let mut rows: Vec<EntityRecord> = self.ctx.store.query(&filter).await?;
        rows.retain(|r| r.name.to_lowercase().contains(&needle));
        Ok(rows
            .into_iter()
            .min_by(|a, b| a.first_mentioned.cmp(&b.first_mentioned).then_with(|| a.id.cmp(&b.id))))
    }

    async fn merge(
        &self,
        mut entity: EntityRecord,
        description: Option<String>,
        attributes: Option<Metadata>,
        confidence: f32,
    ) -> Result<Uuid> {
        let has_description = entity
            .description
            .as_deref()
            .is_some_and(|d| !d.trim().is_empty());
        if let (false, Some(description)) = (has_description, description) {
            entity.description = Some(description);
            entity.embedding = self.ctx.embed(&entity.embedding_text()).await?;
        }
        if let Some(attributes) = attributes {
            entity.attributes.extend(attributes);
        }
        entity.confidence = entity.confidence.max(confidence);
        entity.mention_count = entity.mention_count.saturating_add(1);
        entity.last_updated = Utc::now();

        self.ctx
            .store
            .replace(&self.filter().id(entity.id), std::slice::from_ref(&entity))
            .await?;
        tracing::debug!(
            "Merged mention into entity {} ({}), mentions now {}",
            entity.name,
            entity.id,
            entity.mention_count
        );
        Ok(entity.id)
    }

    /// Ranked by `similarity * 0.5 + confidence * 0.3 + min(mentions / 10, 0.2)`.
    ///
    /// Only the entities returned after the threshold and limit have their
    /// mention count bumped; scored candidates that are cut are left alone.
    pub async fn retrieve(
        &self,
        query: &str,
        params: &SearchParams,
        filter: &EntityFilter,
    ) -> Result<Vec<ScoredRecord<EntityRecord>>> {
        params.validate()?;
        if params.limit == 0 {
            return Ok(Vec::new());
        }

        let mut results = async {
            let query_embedding = self.ctx.embed(query).await?;
            let row_filter = self
                .filter()
                .eq_opt("entity_type", filter.entity_type.as_deref())
                .at_least_opt("confidence", filter.min_confidence);

            let candidates: Vec<EntityRecord> = self
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
        .context("retrieve entities")?;

        let ids: Vec<Uuid> = results.iter().map(|r| r.record.id).collect();
        if self.record_mentions(&ids).await {
            let now = Utc::now();
            for hit in &mut results {
                hit.record.mention_count = hit.record.mention_count.saturating_add(1);
                hit.record.last_updated = now;
            }
        }
        Ok(results)
    }

    /// Best-effort `mention_count + 1`; racy under concurrent readers
    async fn record_mentions(&self, ids: &[Uuid]) -> bool {
        if ids.is_empty() {
            return false;
        }

        let result = self
            .ctx
            .store
            .update_where::<EntityRecord>(
                &self.filter().ids(ids),
                &[
                    ("mention_count", "mention_count + 1".to_string()),
                    ("last_updated", timestamp_literal(Utc::now())),
                ],
            )
            .await;

        match result {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Failed to record mentions for {} entities: {e}", ids.len());
                false
            }
        }
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<EntityRecord>> {
        self.ctx
            .store
            .get(&self.filter().id(id))
            .await
            .context("load entity")
    }

    pub async fn update(&self, id: Uuid, update: EntityUpdate) -> Result<bool> {
        async {
            let Some(mut entity) = self.get_by_id(id).await? else {
                return Ok(false);
            };

            if let Some(description) = update.description {
                if entity.description.as_deref() != Some(description.as_str()) {
                    entity.description = non_empty(Some(description));
                    entity.embedding = self.ctx.embed(&entity.embedding_text()).await?;
                }
            }
            if let Some(attributes) = update.attributes {
                entity.attributes = attributes;
            }
            if let Some(confidence) = update.confidence {
                entity.confidence = clamp_unit(confidence);
            }
            entity.last_updated = Utc::now();

            self.ctx
                .store
                .replace(&self.filter().id(id), std::slice::from_ref(&entity))
                .await?;
            Ok::<_, CrewMemError>(true)
        }
        .await
        .context("update entity")
    }

    /// Most recently updated entities first
    pub async fn get_recent(&self, limit: usize) -> Result<Vec<EntityRecord>> {
        let mut rows: Vec<EntityRecord> = self
            .ctx
            .store
            .query(&self.filter())
            .await
            .context("load recent entities")?;

        newest_first(&mut rows, |r| (r.last_updated, r.id));
        rows.truncate(limit);
        Ok(rows)
    }

    /// Entities of one type, most confident then most mentioned first
    pub async fn get_by_type(&self, entity_type: &str, limit: usize) -> Result<Vec<EntityRecord>> {
        let mut rows: Vec<EntityRecord> = self
            .ctx
            .store
            .query(&self.filter().eq("entity_type", entity_type))
            .await
            .context("load entities by type")?;

        rows.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| b.mention_count.cmp(&a.mention_count))
                .then_with(|| a.name.cmp(&b.name))
        });
        rows.truncate(limit);
        Ok(rows)
    }

    /// Create a directed edge, or strengthen the existing edge of the same type.
    ///
    /// Both endpoints must be entities of this tenant.
    pub async fn add_relationship(
        &self,
        source: Uuid,
        target: Uuid,
        relationship_type: &str,
        strength: Option<f32>,
        context: Option<String>,
    ) -> Result<Uuid> {
        let relationship_type = relationship_type.trim();
        if relationship_type.is_empty() {
            return Err(CrewMemError::Validation(
                "relationship type must not be empty".to_string(),
            ));
        }
        let strength = clamp_unit(strength.unwrap_or(DEFAULT_STRENGTH));

        async {
            for endpoint in [source, target] {
                if self.get_by_id(endpoint).await?.is_none() {
                    return Err(CrewMemError::NotFound(format!("entity {endpoint}")));
                }
            }

            let edge_filter = self
                .filter()
                .eq("source_entity_id", &source.to_string())
                .eq("target_entity_id", &target.to_string())
                .eq("relationship_type", relationship_type);

            if let Some(mut edge) = self
                .ctx
                .store
                .get::<EntityRelationship>(&edge_filter)
                .await?
            {
                edge.strength = edge.strength.max(strength);
                edge.context = context;
                self.ctx
                    .store
                    .replace(&self.filter().id(edge.id), std::slice::from_ref(&edge))
                    .await?;
                return Ok(edge.id);
            }

            let edge = EntityRelationship {
                id: Uuid::new_v4(),
                tenant_id: self.ctx.tenant.clone(),
                source_entity_id: source,
                target_entity_id: target,
                relationship_type: relationship_type.to_string(),
                strength,
                context,
                created_at: Utc::now(),
            };
            self.ctx.store.insert(std::slice::from_ref(&edge)).await?;
            tracing::debug!(
                "Added relationship {} -[{}]-> {} for tenant {}",
                source,
                relationship_type,
                target,
                self.ctx.tenant
            );
            Ok::<_, CrewMemError>(edge.id)
        }
        .await
        .context("add relationship")
    }

    /// Every edge touching `entity`, seen from that entity.
    ///
    /// Edges whose other endpoint no longer exists are skipped.
    pub async fn get_relationships(
        &self,
        entity: Uuid,
        relationship_type: Option<&str>,
    ) -> Result<Vec<RelationshipView>> {
        async {
            let filter = self
                .filter()
                .raw(touching(entity))
                .eq_opt("relationship_type", relationship_type);
            let mut edges: Vec<EntityRelationship> = self.ctx.store.query(&filter).await?;
            edges.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

            let other_ids: Vec<Uuid> = edges
                .iter()
                .map(|e| {
                    if e.source_entity_id == entity {
                        e.target_entity_id
                    } else {
                        e.source_entity_id
                    }
                })
                .collect();
            let others: HashMap<Uuid, EntityRecord> = if other_ids.is_empty() {
                HashMap::new()
            } else {
                self.ctx
                    .store
                    .query::<EntityRecord>(&self.filter().ids(&other_ids))
                    .await?
                    .into_iter()
                    .map(|e| (e.id, e))
                    .collect()
            };

            let views = edges
                .into_iter()
                .zip(other_ids)
                .filter_map(|(relationship, other_id)| {
                    let other = others.get(&other_id)?;
                    let direction = if relationship.source_entity_id == entity {
                        RelationshipDirection::Outgoing
                    } else {
                        RelationshipDirection::Incoming
                    };
                    Some(RelationshipView {
                        relationship,
                        direction,
                        other_entity: other.summary(),
                    })
                })
                .collect();
            Ok::<_, CrewMemError>(views)
        }
        .await
        .context("load relationships")
    }

    /// Remove an entity and every edge touching it
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        async {
            self.ctx
                .store
                .delete_where::<EntityRelationship>(&self.filter().raw(touching(id)))
                .await?;
            let removed = self
                .ctx
                .store
                .delete_where::<EntityRecord>(&self.filter().id(id))
                .await?;
            Ok::<_, CrewMemError>(removed > 0)
        }
        .await
        .context("delete entity")
    }

    /// Remove the tenant's relationships and entities; returns the entity count
    pub async fn clear_all(&self) -> Result<usize> {
        async {
            self.ctx
                .store
                .delete_where::<EntityRelationship>(&self.filter())
                .await?;
            let removed = self
                .ctx
                .store
                .delete_where::<EntityRecord>(&self.filter())
                .await?;
            tracing::info!(
                "Cleared {} entities for tenant {}",
                removed,
                self.ctx.tenant
            );
            Ok::<_, CrewMemError>(removed)
        }
        .await
        .context("clear entities")
    }

    pub async fn count(&self) -> Result<usize> {
        self.ctx
            .store
            .count::<EntityRecord>(&self.filter())
            .await
            .context("count entities")
    }

    pub async fn count_relationships(&self) -> Result<usize> {
        self.ctx
            .store
            .count::<EntityRelationship>(&self.filter())
            .await
            .context("count relationships")
    }

    /// Remove stale low-confidence entities, then edges whose source is gone.
    ///
    /// Edges whose target was removed are left in place; `get_relationships`
    /// hides them.
    pub async fn cleanup(&self) -> Result<usize> {
        async {
            let cutoff = Utc::now() - Duration::days(STALE_AGE_DAYS);
            let entities: Vec<EntityRecord> = self.ctx.store.query(&self.filter()).await?;
            let stale: Vec<Uuid> = entities
                .iter()
                .filter(|e| {
                    e.confidence < STALE_CONFIDENCE
                        && e.mention_count <= STALE_MAX_MENTIONS
                        && e.first_mentioned < cutoff
                })
                .map(|e| e.id)
                .collect();
            let removed = self
                .ctx
                .store
                .delete_ids::<EntityRecord>(&self.ctx.tenant, &stale)
                .await?;

            let stale_ids: HashSet<Uuid> = stale.iter().copied().collect();
            let surviving: HashSet<Uuid> = entities
                .iter()
                .map(|e| e.id)
                .filter(|id| !stale_ids.contains(id))
                .collect();
            let orphans_removed = self.sweep_orphaned_edges(&surviving).await?;

            if removed + orphans_removed > 0 {
                tracing::info!(
                    "Entity cleanup for tenant {}: {} entities, {} orphaned relationships",
                    self.ctx.tenant,
                    removed,
                    orphans_removed
                );
            }
            Ok::<_, CrewMemError>(removed + orphans_removed)
        }
        .await
        .context("clean up entities")
    }

    /// Delete edges whose source entity no longer exists.
    ///
    /// `known` is an earlier snapshot of live entity ids; sources missing from
    /// it are re-read so entities stored since the snapshot keep their edges.
    async fn sweep_orphaned_edges(&self, known: &HashSet<Uuid>) -> Result<usize> {
        let edges: Vec<EntityRelationship> = self.ctx.store.query(&self.filter()).await?;
        let unknown: Vec<Uuid> = edges
            .iter()
            .map(|e| e.source_entity_id)
            .filter(|id| !known.contains(id))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        if unknown.is_empty() {
            return Ok(0);
        }

        let live: HashSet<Uuid> = self
            .ctx
            .store
            .query::<EntityRecord>(&self.filter().ids(&unknown))
            .await?
            .into_iter()
            .map(|e| e.id)
            .collect();
        let orphaned: Vec<Uuid> = edges
            .iter()
            .filter(|e| !known.contains(&e.source_entity_id) && !live.contains(&e.source_entity_id))
            .map(|e| e.id)
            .collect();

        self.ctx
            .store
            .delete_ids::<EntityRelationship>(&self.ctx.tenant, &orphaned)
            .await
    }
}
