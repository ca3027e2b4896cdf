use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CrewMemError, Result};

/// Opaque key/value metadata attached to a record
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Content types that make up the conversation-context view of short-term memory
pub const CONVERSATION_CONTENT_TYPES: [&str; 3] = ["task_input", "task_output", "agent_message"];

/// Long-term content types surfaced by `get_insights`
pub const INSIGHT_CONTENT_TYPES: [&str; 3] = ["insight", "learning", "pattern"];

pub const DEFAULT_CONTENT_TYPE: &str = "text";
pub const DEFAULT_ENTITY_TYPE: &str = "unknown";
pub const ENTITY_CONTENT_TYPE: &str = "entity";

const MAX_TENANT_ID_LEN: usize = 128;

/// Identifier of the crew/workspace that owns a set of memories.
///
/// Restricted to `[A-Za-z0-9_.:-]` so it can be embedded in storage
/// predicates verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() || id.len() > MAX_TENANT_ID_LEN {
            return Err(CrewMemError::Validation(format!(
                "tenant id must be 1-{MAX_TENANT_ID_LEN} characters"
            )));
        }
        if let Some(c) = id
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')))
        {
            return Err(CrewMemError::Validation(format!(
                "tenant id contains invalid character {c:?}"
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TenantId {
    type Err = CrewMemError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for TenantId {
    type Error = CrewMemError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<TenantId> for String {
    fn from(id: TenantId) -> Self {
        id.0
    }
}

/// Parse a record id, rejecting anything that is not a UUID
pub fn parse_record_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id.trim())
        .map_err(|_| CrewMemError::Validation(format!("malformed record id: {id}")))
}

/// The three record collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    ShortTerm,
    LongTerm,
    Entity,
}

impl MemoryKind {
    pub const ALL: [MemoryKind; 3] = [MemoryKind::ShortTerm, MemoryKind::LongTerm, MemoryKind::Entity];

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryKind::ShortTerm => "short_term",
            MemoryKind::LongTerm => "long_term",
            MemoryKind::Entity => "entity",
        }
    }

    /// Human-readable label used in error context
    pub fn label(&self) -> &'static str {
        match self {
            MemoryKind::ShortTerm => "short-term memory",
            MemoryKind::LongTerm => "long-term memory",
            MemoryKind::Entity => "entity memory",
        }
    }
}

impl fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryKind {
    type Err = CrewMemError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "short_term" | "short" => Ok(MemoryKind::ShortTerm),
            "long_term" | "long" => Ok(MemoryKind::LongTerm),
            "entity" | "entities" => Ok(MemoryKind::Entity),
            other => Err(CrewMemError::Validation(format!(
                "unknown memory kind: {other}. Use short_term, long_term, or entity."
            ))),
        }
    }
}

/// Accessors shared by every record kind
pub trait Record {
    fn id(&self) -> Uuid;
    fn tenant_id(&self) -> &TenantId;
    fn content(&self) -> &str;
    fn content_type(&self) -> &str;
    fn metadata(&self) -> Option<&Metadata>;
    fn created_at(&self) -> DateTime<Utc>;
    fn relevance_score(&self) -> Option<f32>;
    fn kind(&self) -> MemoryKind;
}

/// Ephemeral per-turn content: task input/output, agent messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortTermRecord {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub content: String,
    pub content_type: String,
    pub metadata: Option<Metadata>,
    pub relevance_score: Option<f32>,
    pub agent_id: Option<String>,
    pub execution_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(skip)]
    pub embedding: Vec<f32>,
}

impl ShortTermRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

impl Record for ShortTermRecord {
    fn id(&self) -> Uuid {
        self.id
    }
    fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }
    fn content(&self) -> &str {
        &self.content
    }
    fn content_type(&self) -> &str {
        &self.content_type
    }
    fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
    fn relevance_score(&self) -> Option<f32> {
        self.relevance_score
    }
    fn kind(&self) -> MemoryKind {
        MemoryKind::ShortTerm
    }
}

/// Durable, importance-weighted knowledge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongTermRecord {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub content: String,
    pub content_type: String,
    pub summary: Option<String>,
    pub metadata: Option<Metadata>,
    pub importance: f32,
    pub access_count: u32,
    pub last_accessed: Option<DateTime<Utc>>,
    pub source_execution_id: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub embedding: Vec<f32>,
}

impl LongTermRecord {
    pub fn has_all_tags(&self, tags: &[String]) -> bool {
        tags.iter().all(|t| self.tags.iter().any(|own| own == t))
    }
}

impl Record for LongTermRecord {
    fn id(&self) -> Uuid {
        self.id
    }
    fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }
    fn content(&self) -> &str {
        &self.content
    }
    fn content_type(&self) -> &str {
        &self.content_type
    }
    fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
    fn relevance_score(&self) -> Option<f32> {
        Some(self.importance)
    }
    fn kind(&self) -> MemoryKind {
        MemoryKind::LongTerm
    }
}

/// A deduplicated named entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub name: String,
    pub entity_type: String,
    pub description: Option<String>,
    pub attributes: Metadata,
    pub confidence: f32,
    pub mention_count: u32,
    pub first_mentioned: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    #[serde(skip)]
    pub embedding: Vec<f32>,
}

impl EntityRecord {
    /// Text fed to the embedding provider for this entity
    pub fn embedding_text(&self) -> String {
        entity_embedding_text(&self.name, &self.entity_type, self.description.as_deref())
    }

    pub fn summary(&self) -> EntitySummary {
        EntitySummary {
            id: self.id,
            name: self.name.clone(),
            entity_type: self.entity_type.clone(),
            confidence: self.confidence,
        }
    }
}

pub(crate) fn entity_embedding_text(name: &str, entity_type: &str, description: Option<&str>) -> String {
    format!("{name} {entity_type} {}", description.unwrap_or_default())
        .trim_end()
        .to_string()
}

impl Record for EntityRecord {
    fn id(&self) -> Uuid {
        self.id
    }
    fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }
    fn content(&self) -> &str {
        match self.description.as_deref() {
            Some(d) if !d.is_empty() => d,
            _ => &self.name,
        }
    }
    fn content_type(&self) -> &str {
        ENTITY_CONTENT_TYPE
    }
    fn metadata(&self) -> Option<&Metadata> {
        Some(&self.attributes)
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.first_mentioned
    }
    fn relevance_score(&self) -> Option<f32> {
        Some(self.confidence)
    }
    fn kind(&self) -> MemoryKind {
        MemoryKind::Entity
    }
}

/// Directed edge between two entities of the same tenant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRelationship {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub source_entity_id: Uuid,
    pub target_entity_id: Uuid,
    pub relationship_type: String,
    pub strength: f32,
    pub context: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipDirection {
    Outgoing,
    Incoming,
}

/// Denormalized view of the far endpoint of a relationship
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySummary {
    pub id: Uuid,
    pub name: String,
    pub entity_type: String,
    pub confidence: f32,
}

/// A relationship as seen from one of its endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipView {
    pub relationship: EntityRelationship,
    pub direction: RelationshipDirection,
    pub other_entity: EntitySummary,
}

/// Any stored record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "memory_type", rename_all = "snake_case")]
pub enum MemoryRecord {
    ShortTerm(ShortTermRecord),
    LongTerm(LongTermRecord),
    Entity(EntityRecord),
}

impl MemoryRecord {
    fn inner(&self) -> &dyn Record {
        match self {
            MemoryRecord::ShortTerm(r) => r,
            MemoryRecord::LongTerm(r) => r,
            MemoryRecord::Entity(r) => r,
        }
    }
}

impl Record for MemoryRecord {
    fn id(&self) -> Uuid {
        self.inner().id()
    }
    fn tenant_id(&self) -> &TenantId {
        match self {
            MemoryRecord::ShortTerm(r) => &r.tenant_id,
            MemoryRecord::LongTerm(r) => &r.tenant_id,
            MemoryRecord::Entity(r) => &r.tenant_id,
        }
    }
    fn content(&self) -> &str {
        match self {
            MemoryRecord::ShortTerm(r) => r.content(),
            MemoryRecord::LongTerm(r) => r.content(),
            MemoryRecord::Entity(r) => r.content(),
        }
    }
    fn content_type(&self) -> &str {
        match self {
            MemoryRecord::ShortTerm(r) => r.content_type(),
            MemoryRecord::LongTerm(r) => r.content_type(),
            MemoryRecord::Entity(r) => r.content_type(),
        }
    }
    fn metadata(&self) -> Option<&Metadata> {
        match self {
            MemoryRecord::ShortTerm(r) => r.metadata(),
            MemoryRecord::LongTerm(r) => r.metadata(),
            MemoryRecord::Entity(r) => r.metadata(),
        }
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.inner().created_at()
    }
    fn relevance_score(&self) -> Option<f32> {
        self.inner().relevance_score()
    }
    fn kind(&self) -> MemoryKind {
        self.inner().kind()
    }
}

impl From<ShortTermRecord> for MemoryRecord {
    fn from(r: ShortTermRecord) -> Self {
        MemoryRecord::ShortTerm(r)
    }
}

impl From<LongTermRecord> for MemoryRecord {
    fn from(r: LongTermRecord) -> Self {
        MemoryRecord::LongTerm(r)
    }
}

impl From<EntityRecord> for MemoryRecord {
    fn from(r: EntityRecord) -> Self {
        MemoryRecord::Entity(r)
    }
}

/// A retrieval result: the record, its exact similarity to the query, and
/// the combined ranking score it was ordered by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord<T> {
    pub record: T,
    pub similarity: f32,
    pub score: f32,
}

impl<T> ScoredRecord<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ScoredRecord<U> {
        ScoredRecord {
            record: f(self.record),
            similarity: self.similarity,
            score: self.score,
        }
    }
}

/// Coordinator-level retrieval result
pub type SearchHit = ScoredRecord<MemoryRecord>;

/// Clamp a score into [0, 1], mapping NaN to 0
pub fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

/// Normalize a tag list: trimmed, non-empty, no separators, deduplicated
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().replace(',', " ").trim().to_string();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}
