//! Parameter sets for store, update, and retrieve operations

use serde::{Deserialize, Serialize};

use crate::error::{CrewMemError, Result};
use crate::memory::types::{MemoryKind, Metadata};

pub const DEFAULT_SEARCH_LIMIT: usize = 10;
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.5;
pub const DEFAULT_IMPORTANCE: f32 = 0.5;
pub const DEFAULT_CONFIDENCE: f32 = 0.5;
pub const DEFAULT_STRENGTH: f32 = 0.5;

/// Limit and similarity floor for a similarity search
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchParams {
    pub limit: usize,
    pub threshold: f32,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            limit: DEFAULT_SEARCH_LIMIT,
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

impl SearchParams {
    pub fn new(limit: usize, threshold: f32) -> Self {
        Self { limit, threshold }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(CrewMemError::Validation(format!(
                "similarity threshold must be within [0, 1], got {}",
                self.threshold
            )));
        }
        Ok(())
    }

    /// Size of the nearest-neighbour candidate pool fetched before exact scoring
    pub fn candidate_pool(&self) -> usize {
        self.limit.saturating_mul(2)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShortTermInput {
    pub content: String,
    pub content_type: Option<String>,
    pub metadata: Option<Metadata>,
    pub agent_id: Option<String>,
    pub execution_id: Option<String>,
    pub relevance_score: Option<f32>,
}

impl ShortTermInput {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_execution_id(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = Some(execution_id.into());
        self
    }

    pub fn with_relevance(mut self, relevance: f32) -> Self {
        self.relevance_score = Some(relevance);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LongTermInput {
    pub content: String,
    pub content_type: Option<String>,
    pub metadata: Option<Metadata>,
    pub importance: Option<f32>,
    pub source_execution_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub summary: Option<String>,
}

impl LongTermInput {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_importance(mut self, importance: f32) -> Self {
        self.importance = Some(importance);
        self
    }

    pub fn with_source_execution(mut self, execution_id: impl Into<String>) -> Self {
        self.source_execution_id = Some(execution_id.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityInput {
    pub content: String,
    pub name: Option<String>,
    pub entity_type: Option<String>,
    pub description: Option<String>,
    pub attributes: Option<Metadata>,
    pub confidence: Option<f32>,
}

impl EntityInput {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_attributes(mut self, attributes: Metadata) -> Self {
        self.attributes = Some(attributes);
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

/// A store request routed by the coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MemoryInput {
    ShortTerm(ShortTermInput),
    LongTerm(LongTermInput),
    Entity(EntityInput),
}

impl MemoryInput {
    pub fn kind(&self) -> MemoryKind {
        match self {
            MemoryInput::ShortTerm(_) => MemoryKind::ShortTerm,
            MemoryInput::LongTerm(_) => MemoryKind::LongTerm,
            MemoryInput::Entity(_) => MemoryKind::Entity,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShortTermUpdate {
    pub content: Option<String>,
    pub metadata: Option<Metadata>,
    pub relevance_score: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LongTermUpdate {
    pub content: Option<String>,
    pub metadata: Option<Metadata>,
    pub importance: Option<f32>,
    pub tags: Option<Vec<String>>,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityUpdate {
    pub description: Option<String>,
    pub attributes: Option<Metadata>,
    pub confidence: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShortTermFilter {
    pub content_type: Option<String>,
    pub agent_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LongTermFilter {
    pub content_type: Option<String>,
    pub min_importance: Option<f32>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityFilter {
    pub entity_type: Option<String>,
    pub min_confidence: Option<f32>,
}

/// Fan-out retrieval options for the coordinator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrieveOptions {
    /// Kinds to search; `None` searches all three
    pub kinds: Option<Vec<MemoryKind>>,
    #[serde(default)]
    pub search: SearchParams,
    #[serde(default)]
    pub short_term: ShortTermFilter,
    #[serde(default)]
    pub long_term: LongTermFilter,
    #[serde(default)]
    pub entity: EntityFilter,
}

impl RetrieveOptions {
    pub fn new(limit: usize, threshold: f32) -> Self {
        Self {
            search: SearchParams::new(limit, threshold),
            ..Default::default()
        }
    }

    pub fn with_kinds(mut self, kinds: impl IntoIterator<Item = MemoryKind>) -> Self {
        self.kinds = Some(kinds.into_iter().collect());
        self
    }

    pub fn kinds(&self) -> Vec<MemoryKind> {
        match &self.kinds {
            Some(kinds) if !kinds.is_empty() => {
                let mut kinds = kinds.clone();
                kinds.sort();
                kinds.dedup();
                kinds
            }
            _ => MemoryKind::ALL.to_vec(),
        }
    }
}
