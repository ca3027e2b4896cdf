//! Table schemas and row codecs for every persisted type

use std::sync::Arc;

use arrow_array::{
    Array, BooleanArray, Float32Array, Float64Array, Int64Array, RecordBatch, StringArray,
};
use arrow_schema::{DataType, Field, Schema};

use crate::config::{MemoryConfiguration, MemoryPolicy};
use crate::error::Result;
use crate::memory::cleanup_log::CleanupLogEntry;
use crate::memory::types::{EntityRecord, EntityRelationship, LongTermRecord, ShortTermRecord};
use crate::storage::filter::{decode_tags, encode_tags};
use crate::storage::row::{
    Columns, Row, embedding_at, embedding_field, embeddings, finish_batch, metadata_at,
    metadata_json, optional_float_at, optional_string_at, optional_timestamp_at,
    optional_timestamps, string_at, tenant_at, timestamp_at, timestamp_field, timestamps, uuid_at,
};

pub const SHORT_TERM_TABLE: &str = "short_term_memories";
pub const LONG_TERM_TABLE: &str = "long_term_memories";
pub const ENTITY_TABLE: &str = "entity_memories";
pub const RELATIONSHIP_TABLE: &str = "entity_relationships";
pub const CONFIG_TABLE: &str = "memory_configurations";
pub const CLEANUP_LOG_TABLE: &str = "memory_cleanup_logs";

fn ids<T>(rows: &[T], f: impl Fn(&T) -> String) -> Vec<String> {
    rows.iter().map(f).collect()
}

fn refs(values: &[String]) -> Vec<&str> {
    values.iter().map(String::as_str).collect()
}

fn optional_refs(values: &[Option<String>]) -> Vec<Option<&str>> {
    values.iter().map(|v| v.as_deref()).collect()
}

impl Row for ShortTermRecord {
    const TABLE: &'static str = SHORT_TERM_TABLE;

    fn schema(dimension: i32) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("tenant_id", DataType::Utf8, false),
            Field::new("content", DataType::Utf8, false),
            Field::new("content_type", DataType::Utf8, false),
            Field::new("metadata", DataType::Utf8, true),
            Field::new("relevance_score", DataType::Float32, true),
            Field::new("agent_id", DataType::Utf8, true),
            Field::new("execution_id", DataType::Utf8, true),
            embedding_field(dimension),
            timestamp_field("created_at", false),
            timestamp_field("expires_at", false),
        ]))
    }

    fn to_batch(rows: &[Self], dimension: i32) -> Result<RecordBatch> {
        let id = ids(rows, |r| r.id.to_string());
        let tenant = ids(rows, |r| r.tenant_id.to_string());
        let content = ids(rows, |r| r.content.clone());
        let content_type = ids(rows, |r| r.content_type.clone());
        let metadata = rows
            .iter()
            .map(|r| metadata_json(r.metadata.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        let agent: Vec<Option<String>> = rows.iter().map(|r| r.agent_id.clone()).collect();
        let execution: Vec<Option<String>> =
            rows.iter().map(|r| r.execution_id.clone()).collect();

        let columns: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(refs(&id))),
            Arc::new(StringArray::from(refs(&tenant))),
            Arc::new(StringArray::from(refs(&content))),
            Arc::new(StringArray::from(refs(&content_type))),
            Arc::new(StringArray::from(optional_refs(&metadata))),
            Arc::new(Float32Array::from(
                rows.iter().map(|r| r.relevance_score).collect::<Vec<_>>(),
            )),
            Arc::new(StringArray::from(optional_refs(&agent))),
            Arc::new(StringArray::from(optional_refs(&execution))),
            Arc::new(embeddings(rows.iter().map(|r| &r.embedding), dimension)?),
            Arc::new(timestamps(
                rows.iter().map(|r| r.created_at.timestamp_micros()).collect(),
            )),
            Arc::new(timestamps(
                rows.iter().map(|r| r.expires_at.timestamp_micros()).collect(),
            )),
        ];
        finish_batch(Self::schema(dimension), columns, Self::TABLE)
    }

    fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>> {
        let cols = Columns::new(batch);
        let id = cols.strings("id")?;
        let tenant = cols.strings("tenant_id")?;
        let content = cols.strings("content")?;
        let content_type = cols.strings("content_type")?;
        let metadata = cols.strings("metadata")?;
        let relevance = cols.floats("relevance_score")?;
        let agent = cols.strings("agent_id")?;
        let execution = cols.strings("execution_id")?;
        let embedding = cols.embeddings()?;
        let created_at = cols.timestamps("created_at")?;
        let expires_at = cols.timestamps("expires_at")?;

        (0..batch.num_rows())
            .map(|row| {
                Ok(ShortTermRecord {
                    id: uuid_at(id, row)?,
                    tenant_id: tenant_at(tenant, row)?,
                    content: string_at(content, row),
                    content_type: string_at(content_type, row),
                    metadata: metadata_at(metadata, row)?,
                    relevance_score: optional_float_at(relevance, row),
                    agent_id: optional_string_at(agent, row),
                    execution_id: optional_string_at(execution, row),
                    created_at: timestamp_at(created_at, row)?,
                    expires_at: timestamp_at(expires_at, row)?,
                    embedding: embedding_at(embedding, row)?,
                })
            })
            .collect()
    }
}

impl Row for LongTermRecord {
    const TABLE: &'static str = LONG_TERM_TABLE;

    fn schema(dimension: i32) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("tenant_id", DataType::Utf8, false),
            Field::new("content", DataType::Utf8, false),
            Field::new("content_type", DataType::Utf8, false),
            Field::new("summary", DataType::Utf8, true),
            Field::new("metadata", DataType::Utf8, true),
            Field::new("importance", DataType::Float32, false),
            Field::new("access_count", DataType::Int64, false),
            timestamp_field("last_accessed", true),
            Field::new("source_execution_id", DataType::Utf8, true),
            Field::new("tags", DataType::Utf8, false),
            embedding_field(dimension),
            timestamp_field("created_at", false),
            timestamp_field("updated_at", false),
        ]))
    }

    fn to_batch(rows: &[Self], dimension: i32) -> Result<RecordBatch> {
        let id = ids(rows, |r| r.id.to_string());
        let tenant = ids(rows, |r| r.tenant_id.to_string());
        let content = ids(rows, |r| r.content.clone());
        let content_type = ids(rows, |r| r.content_type.clone());
        let summary: Vec<Option<String>> = rows.iter().map(|r| r.summary.clone()).collect();
        let metadata = rows
            .iter()
            .map(|r| metadata_json(r.metadata.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        let source: Vec<Option<String>> = rows
            .iter()
            .map(|r| r.source_execution_id.clone())
            .collect();
        let tags = ids(rows, |r| encode_tags(&r.tags));

        let columns: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(refs(&id))),
            Arc::new(StringArray::from(refs(&tenant))),
            Arc::new(StringArray::from(refs(&content))),
            Arc::new(StringArray::from(refs(&content_type))),
            Arc::new(StringArray::from(optional_refs(&summary))),
            Arc::new(StringArray::from(optional_refs(&metadata))),
            Arc::new(Float32Array::from(
                rows.iter().map(|r| r.importance).collect::<Vec<_>>(),
            )),
            Arc::new(Int64Array::from(
                rows.iter()
                    .map(|r| i64::from(r.access_count))
                    .collect::<Vec<_>>(),
            )),
            Arc::new(optional_timestamps(
                rows.iter()
                    .map(|r| r.last_accessed.map(|t| t.timestamp_micros()))
                    .collect(),
            )),
            Arc::new(StringArray::from(optional_refs(&source))),
            Arc::new(StringArray::from(refs(&tags))),
            Arc::new(embeddings(rows.iter().map(|r| &r.embedding), dimension)?),
            Arc::new(timestamps(
                rows.iter().map(|r| r.created_at.timestamp_micros()).collect(),
            )),
            Arc::new(timestamps(
                rows.iter().map(|r| r.updated_at.timestamp_micros()).collect(),
            )),
        ];
        finish_batch(Self::schema(dimension), columns, Self::TABLE)
    }

    fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>> {
        let cols = Columns::new(batch);
        let id = cols.strings("id")?;
        let tenant = cols.strings("tenant_id")?;
        let content = cols.strings("content")?;
        let content_type = cols.strings("content_type")?;
        let summary = cols.strings("summary")?;
        let metadata = cols.strings("metadata")?;
        let importance = cols.floats("importance")?;
        let access_count = cols.ints("access_count")?;
        let last_accessed = cols.timestamps("last_accessed")?;
        let source = cols.strings("source_execution_id")?;
        let tags = cols.strings("tags")?;
        let embedding = cols.embeddings()?;
        let created_at = cols.timestamps("created_at")?;
        let updated_at = cols.timestamps("updated_at")?;

        (0..batch.num_rows())
            .map(|row| {
                Ok(LongTermRecord {
                    id: uuid_at(id, row)?,
                    tenant_id: tenant_at(tenant, row)?,
                    content: string_at(content, row),
                    content_type: string_at(content_type, row),
                    summary: optional_string_at(summary, row),
                    metadata: metadata_at(metadata, row)?,
                    importance: importance.value(row),
                    access_count: access_count.value(row).max(0) as u32,
                    last_accessed: optional_timestamp_at(last_accessed, row)?,
                    source_execution_id: optional_string_at(source, row),
                    tags: decode_tags(tags.value(row)),
                    created_at: timestamp_at(created_at, row)?,
                    updated_at: timestamp_at(updated_at, row)?,
                    embedding: embedding_at(embedding, row)?,
                })
            })
            .collect()
    }
}

impl Row for EntityRecord {
    const TABLE: &'static str = ENTITY_TABLE;

    fn schema(dimension: i32) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("tenant_id", DataType::Utf8, false),
            Field::new("name", DataType::Utf8, false),
            Field::new("entity_type", DataType::Utf8, false),
            Field::new("description", DataType::Utf8, true),
            Field::new("attributes", DataType::Utf8, false),
            Field::new("confidence", DataType::Float32, false),
            Field::new("mention_count", DataType::Int64, false),
            embedding_field(dimension),
            timestamp_field("first_mentioned", false),
            timestamp_field("last_updated", false),
        ]))
    }

    fn to_batch(rows: &[Self], dimension: i32) -> Result<RecordBatch> {
        let id = ids(rows, |r| r.id.to_string());
        let tenant = ids(rows, |r| r.tenant_id.to_string());
        let name = ids(rows, |r| r.name.clone());
        let entity_type = ids(rows, |r| r.entity_type.clone());
        let description: Vec<Option<String>> =
            rows.iter().map(|r| r.description.clone()).collect();
        let attributes = rows
            .iter()
            .map(|r| serde_json::to_string(&r.attributes).map_err(Into::into))
            .collect::<Result<Vec<String>>>()?;

        let columns: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(refs(&id))),
            Arc::new(StringArray::from(refs(&tenant))),
            Arc::new(StringArray::from(refs(&name))),
            Arc::new(StringArray::from(refs(&entity_type))),
            Arc::new(StringArray::from(optional_refs(&description))),
            Arc::new(StringArray::from(refs(&attributes))),
            Arc::new(Float32Array::from(
                rows.iter().map(|r| r.confidence).collect::<Vec<_>>(),
            )),
            Arc::new(Int64Array::from(
                rows.iter()
                    .map(|r| i64::from(r.mention_count))
                    .collect::<Vec<_>>(),
            )),
            Arc::new(embeddings(rows.iter().map(|r| &r.embedding), dimension)?),
            Arc::new(timestamps(
                rows.iter()
                    .map(|r| r.first_mentioned.timestamp_micros())
                    .collect(),
            )),
            Arc::new(timestamps(
                rows.iter().map(|r| r.last_updated.timestamp_micros()).collect(),
            )),
        ];
        finish_batch(Self::schema(dimension), columns, Self::TABLE)
    }

    fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>> {
        let cols = Columns::new(batch);
        let id = cols.strings("id")?;
        let tenant = cols.strings("tenant_id")?;
        let name = cols.strings("name")?;
        let entity_type = cols.strings("entity_type")?;
        let description = cols.strings("description")?;
        let attributes = cols.strings("attributes")?;
        let confidence = cols.floats("confidence")?;
        let mention_count = cols.ints("mention_count")?;
        let embedding = cols.embeddings()?;
        let first_mentioned = cols.timestamps("first_mentioned")?;
        let last_updated = cols.timestamps("last_updated")?;

        (0..batch.num_rows())
            .map(|row| {
                Ok(EntityRecord {
                    id: uuid_at(id, row)?,
                    tenant_id: tenant_at(tenant, row)?,
                    name: string_at(name, row),
                    entity_type: string_at(entity_type, row),
                    description: optional_string_at(description, row),
                    attributes: metadata_at(attributes, row)?.unwrap_or_default(),
                    confidence: confidence.value(row),
                    mention_count: mention_count.value(row).max(1) as u32,
                    first_mentioned: timestamp_at(first_mentioned, row)?,
                    last_updated: timestamp_at(last_updated, row)?,
                    embedding: embedding_at(embedding, row)?,
                })
            })
            .collect()
    }
}

impl Row for EntityRelationship {
    const TABLE: &'static str = RELATIONSHIP_TABLE;

    fn schema(_dimension: i32) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("tenant_id", DataType::Utf8, false),
            Field::new("source_entity_id", DataType::Utf8, false),
            Field::new("target_entity_id", DataType::Utf8, false),
            Field::new("relationship_type", DataType::Utf8, false),
            Field::new("strength", DataType::Float32, false),
            Field::new("context", DataType::Utf8, true),
            timestamp_field("created_at", false),
        ]))
    }

    fn to_batch(rows: &[Self], dimension: i32) -> Result<RecordBatch> {
        let id = ids(rows, |r| r.id.to_string());
        let tenant = ids(rows, |r| r.tenant_id.to_string());
        let source = ids(rows, |r| r.source_entity_id.to_string());
        let target = ids(rows, |r| r.target_entity_id.to_string());
        let kind = ids(rows, |r| r.relationship_type.clone());
        let context: Vec<Option<String>> = rows.iter().map(|r| r.context.clone()).collect();

        let columns: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(refs(&id))),
            Arc::new(StringArray::from(refs(&tenant))),
            Arc::new(StringArray::from(refs(&source))),
            Arc::new(StringArray::from(refs(&target))),
            Arc::new(StringArray::from(refs(&kind))),
            Arc::new(Float32Array::from(
                rows.iter().map(|r| r.strength).collect::<Vec<_>>(),
            )),
            Arc::new(StringArray::from(optional_refs(&context))),
            Arc::new(timestamps(
                rows.iter().map(|r| r.created_at.timestamp_micros()).collect(),
            )),
        ];
        finish_batch(Self::schema(dimension), columns, Self::TABLE)
    }

    fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>> {
        let cols = Columns::new(batch);
        let id = cols.strings("id")?;
        let tenant = cols.strings("tenant_id")?;
        let source = cols.strings("source_entity_id")?;
        let target = cols.strings("target_entity_id")?;
        let kind = cols.strings("relationship_type")?;
        let strength = cols.floats("strength")?;
        let context = cols.strings("context")?;
        let created_at = cols.timestamps("created_at")?;

        (0..batch.num_rows())
            .map(|row| {
                Ok(EntityRelationship {
                    id: uuid_at(id, row)?,
                    tenant_id: tenant_at(tenant, row)?,
                    source_entity_id: uuid_at(source, row)?,
                    target_entity_id: uuid_at(target, row)?,
                    relationship_type: string_at(kind, row),
                    strength: strength.value(row),
                    context: optional_string_at(context, row),
                    created_at: timestamp_at(created_at, row)?,
                })
            })
            .collect()
    }
}

impl Row for MemoryConfiguration {
    const TABLE: &'static str = CONFIG_TABLE;

    fn schema(_dimension: i32) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("tenant_id", DataType::Utf8, false),
            Field::new("short_term_retention_hours", DataType::Int64, false),
            Field::new("short_term_max_entries", DataType::Int64, false),
            Field::new("long_term_consolidation_threshold", DataType::Float32, false),
            Field::new("long_term_max_entries", DataType::Int64, false),
            Field::new("entity_confidence_threshold", DataType::Float32, false),
            Field::new("entity_similarity_threshold", DataType::Float32, false),
            Field::new("embedding_provider", DataType::Utf8, false),
            Field::new("embedding_model", DataType::Utf8, false),
            Field::new("cleanup_enabled", DataType::Boolean, false),
            Field::new("cleanup_interval_hours", DataType::Int64, false),
            timestamp_field("created_at", false),
            timestamp_field("updated_at", false),
        ]))
    }

    fn to_batch(rows: &[Self], dimension: i32) -> Result<RecordBatch> {
        let tenant = ids(rows, |r| r.tenant_id.to_string());
        let provider = ids(rows, |r| r.policy.embedding_provider.clone());
        let model = ids(rows, |r| r.policy.embedding_model.clone());
        let int_column = |f: fn(&MemoryPolicy) -> i64| -> Arc<dyn Array> {
            Arc::new(Int64Array::from(
                rows.iter().map(|r| f(&r.policy)).collect::<Vec<_>>(),
            ))
        };
        let float_column = |f: fn(&MemoryPolicy) -> f32| -> Arc<dyn Array> {
            Arc::new(Float32Array::from(
                rows.iter().map(|r| f(&r.policy)).collect::<Vec<_>>(),
            ))
        };

        let columns: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(refs(&tenant))),
            int_column(|p| i64::from(p.short_term_retention_hours)),
            int_column(|p| i64::try_from(p.short_term_max_entries).unwrap_or(i64::MAX)),
            float_column(|p| p.long_term_consolidation_threshold),
            int_column(|p| i64::try_from(p.long_term_max_entries).unwrap_or(i64::MAX)),
            float_column(|p| p.entity_confidence_threshold),
            float_column(|p| p.entity_similarity_threshold),
            Arc::new(StringArray::from(refs(&provider))),
            Arc::new(StringArray::from(refs(&model))),
            Arc::new(BooleanArray::from(
                rows.iter()
                    .map(|r| r.policy.cleanup_enabled)
                    .collect::<Vec<_>>(),
            )),
            int_column(|p| i64::from(p.cleanup_interval_hours)),
            Arc::new(timestamps(
                rows.iter().map(|r| r.created_at.timestamp_micros()).collect(),
            )),
            Arc::new(timestamps(
                rows.iter().map(|r| r.updated_at.timestamp_micros()).collect(),
            )),
        ];
        finish_batch(Self::schema(dimension), columns, Self::TABLE)
    }

    fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>> {
        let cols = Columns::new(batch);
        let tenant = cols.strings("tenant_id")?;
        let retention = cols.ints("short_term_retention_hours")?;
        let short_max = cols.ints("short_term_max_entries")?;
        let consolidation = cols.floats("long_term_consolidation_threshold")?;
        let long_max = cols.ints("long_term_max_entries")?;
        let entity_confidence = cols.floats("entity_confidence_threshold")?;
        let entity_similarity = cols.floats("entity_similarity_threshold")?;
        let provider = cols.strings("embedding_provider")?;
        let model = cols.strings("embedding_model")?;
        let cleanup_enabled = cols.bools("cleanup_enabled")?;
        let interval = cols.ints("cleanup_interval_hours")?;
        let created_at = cols.timestamps("created_at")?;
        let updated_at = cols.timestamps("updated_at")?;

        (0..batch.num_rows())
            .map(|row| {
                Ok(MemoryConfiguration {
                    tenant_id: tenant_at(tenant, row)?,
                    policy: MemoryPolicy {
                        short_term_retention_hours: retention.value(row).max(0) as u32,
                        short_term_max_entries: short_max.value(row).max(0) as usize,
                        long_term_consolidation_threshold: consolidation.value(row),
                        long_term_max_entries: long_max.value(row).max(0) as usize,
                        entity_confidence_threshold: entity_confidence.value(row),
                        entity_similarity_threshold: entity_similarity.value(row),
                        embedding_provider: string_at(provider, row),
                        embedding_model: string_at(model, row),
                        cleanup_enabled: cleanup_enabled.value(row),
                        cleanup_interval_hours: interval.value(row).max(0) as u32,
                    },
                    created_at: timestamp_at(created_at, row)?,
                    updated_at: timestamp_at(updated_at, row)?,
                })
            })
            .collect()
    }
}

impl Row for CleanupLogEntry {
    const TABLE: &'static str = CLEANUP_LOG_TABLE;

    fn schema(_dimension: i32) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("tenant_id", DataType::Utf8, false),
            Field::new("cleanup_kind", DataType::Utf8, false),
            Field::new("entries_removed", DataType::Int64, false),
            Field::new("reason", DataType::Utf8, false),
            Field::new("duration_seconds", DataType::Float64, false),
            timestamp_field("created_at", false),
        ]))
    }

    fn to_batch(rows: &[Self], dimension: i32) -> Result<RecordBatch> {
        let id = ids(rows, |r| r.id.to_string());
        let tenant = ids(rows, |r| r.tenant_id.to_string());

        let columns: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(refs(&id))),
            Arc::new(StringArray::from(refs(&tenant))),
            Arc::new(StringArray::from(
                rows.iter()
                    .map(|r| r.cleanup_kind.as_str())
                    .collect::<Vec<_>>(),
            )),
            Arc::new(Int64Array::from(
                rows.iter()
                    .map(|r| r.entries_removed as i64)
                    .collect::<Vec<_>>(),
            )),
            Arc::new(StringArray::from(
                rows.iter().map(|r| r.reason.as_str()).collect::<Vec<_>>(),
            )),
            Arc::new(Float64Array::from(
                rows.iter().map(|r| r.duration_seconds).collect::<Vec<_>>(),
            )),
            Arc::new(timestamps(
                rows.iter().map(|r| r.created_at.timestamp_micros()).collect(),
            )),
        ];
        finish_batch(Self::schema(dimension), columns, Self::TABLE)
    }

    fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>> {
        let cols = Columns::new(batch);
        let id = cols.strings("id")?;
        let tenant = cols.strings("tenant_id")?;
        let kind = cols.strings("cleanup_kind")?;
        let removed = cols.ints("entries_removed")?;
        let reason = cols.strings("reason")?;
        let duration = cols.doubles("duration_seconds")?;
        let created_at = cols.timestamps("created_at")?;

        (0..batch.num_rows())
            .map(|row| {
                Ok(CleanupLogEntry {
                    id: uuid_at(id, row)?,
                    tenant_id: tenant_at(tenant, row)?,
                    cleanup_kind: kind.value(row).parse()?,
                    entries_removed: removed.value(row).max(0) as usize,
                    reason: reason.value(row).parse()?,
                    duration_seconds: duration.value(row),
                    created_at: timestamp_at(created_at, row)?,
                })
            })
            .collect()
    }
}
