use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CrewMemError, Result};
use crate::memory::types::TenantId;

/// Retention, capacity, and threshold policy for one tenant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryPolicy {
    #[serde(default = "default_short_term_retention_hours")]
    pub short_term_retention_hours: u32,
    #[serde(default = "default_short_term_max_entries")]
    pub short_term_max_entries: usize,
    /// Minimum short-term relevance for promotion into long-term memory
    #[serde(default = "default_consolidation_threshold")]
    pub long_term_consolidation_threshold: f32,
    #[serde(default = "default_long_term_max_entries")]
    pub long_term_max_entries: usize,
    /// Entities below this confidence are refused at store time
    #[serde(default = "default_entity_confidence_threshold")]
    pub entity_confidence_threshold: f32,
    /// Reserved: persisted and validated, but entity merging matches on name
    #[serde(default = "default_entity_similarity_threshold")]
    pub entity_similarity_threshold: f32,
    #[serde(default = "default_embedding_provider")]
    pub embedding_provider: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_cleanup_enabled")]
    pub cleanup_enabled: bool,
    #[serde(default = "default_cleanup_interval_hours")]
    pub cleanup_interval_hours: u32,
}

impl Default for MemoryPolicy {
    fn default() -> Self {
        Self {
            short_term_retention_hours: default_short_term_retention_hours(),
            short_term_max_entries: default_short_term_max_entries(),
            long_term_consolidation_threshold: default_consolidation_threshold(),
            long_term_max_entries: default_long_term_max_entries(),
            entity_confidence_threshold: default_entity_confidence_threshold(),
            entity_similarity_threshold: default_entity_similarity_threshold(),
            embedding_provider: default_embedding_provider(),
            embedding_model: default_embedding_model(),
            cleanup_enabled: default_cleanup_enabled(),
            cleanup_interval_hours: default_cleanup_interval_hours(),
        }
    }
}

fn default_short_term_retention_hours() -> u32 {
    24
}

fn default_short_term_max_entries() -> usize {
    100
}

fn default_consolidation_threshold() -> f32 {
    0.7
}

fn default_long_term_max_entries() -> usize {
    1000
}

fn default_entity_confidence_threshold() -> f32 {
    0.6
}

fn default_entity_similarity_threshold() -> f32 {
    0.8
}

fn default_embedding_provider() -> String {
    "fastembed".to_string()
}

fn default_embedding_model() -> String {
    "multilingual-e5-small".to_string()
}

fn default_cleanup_enabled() -> bool {
    true
}

fn default_cleanup_interval_hours() -> u32 {
    24
}

/// Ten years; longer windows overflow timestamp arithmetic
const MAX_HOURS: u64 = 87_600;
/// Caps are persisted as signed 64-bit integers
const MAX_ENTRIES: u64 = i64::MAX as u64;

impl MemoryPolicy {
    pub fn validate(&self) -> Result<()> {
        let unit_fields = [
            (
                "long_term_consolidation_threshold",
                self.long_term_consolidation_threshold,
            ),
            ("entity_confidence_threshold", self.entity_confidence_threshold),
            ("entity_similarity_threshold", self.entity_similarity_threshold),
        ];
        for (name, value) in unit_fields {
            if !(0.0..=1.0).contains(&value) {
                return Err(CrewMemError::Validation(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }

        let positive_fields = [
            ("short_term_retention_hours", self.short_term_retention_hours as usize),
            ("short_term_max_entries", self.short_term_max_entries),
            ("long_term_max_entries", self.long_term_max_entries),
            ("cleanup_interval_hours", self.cleanup_interval_hours as usize),
        ];
        for (name, value) in positive_fields {
            if value == 0 {
                return Err(CrewMemError::Validation(format!(
                    "{name} must be greater than zero"
                )));
            }
        }

        let bounded_fields = [
            (
                "short_term_retention_hours",
                u64::from(self.short_term_retention_hours),
                MAX_HOURS,
            ),
            (
                "cleanup_interval_hours",
                u64::from(self.cleanup_interval_hours),
                MAX_HOURS,
            ),
            (
                "short_term_max_entries",
                self.short_term_max_entries as u64,
                MAX_ENTRIES,
            ),
            (
                "long_term_max_entries",
                self.long_term_max_entries as u64,
                MAX_ENTRIES,
            ),
        ];
        for (name, value, max) in bounded_fields {
            if value > max {
                return Err(CrewMemError::Validation(format!(
                    "{name} must be at most {max}, got {value}"
                )));
            }
        }

        if self.embedding_provider.trim().is_empty() {
            return Err(CrewMemError::Validation(
                "embedding_provider must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// The persisted per-tenant configuration record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfiguration {
    pub tenant_id: TenantId,
    #[serde(flatten)]
    pub policy: MemoryPolicy,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MemoryConfiguration {
    pub fn new(tenant_id: TenantId, policy: MemoryPolicy) -> Self {
        // Stored columns keep microseconds
        let now = Utc::now().trunc_subsecs(6);
        Self {
            tenant_id,
            policy,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update to a tenant policy.
///
/// Unknown keys are ignored when deserializing, so callers can pass through
/// arbitrary JSON objects and only recognized fields take effect.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfigPatch {
    pub short_term_retention_hours: Option<u32>,
    pub short_term_max_entries: Option<usize>,
    pub long_term_consolidation_threshold: Option<f32>,
    pub long_term_max_entries: Option<usize>,
    pub entity_confidence_threshold: Option<f32>,
    pub entity_similarity_threshold: Option<f32>,
    pub embedding_provider: Option<String>,
    pub embedding_model: Option<String>,
    pub cleanup_enabled: Option<bool>,
    pub cleanup_interval_hours: Option<u32>,
}

impl MemoryConfigPatch {
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| CrewMemError::Validation(format!("invalid configuration update: {e}")))
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply the recognized fields to a policy, validating the result
    pub fn apply(&self, policy: &MemoryPolicy) -> Result<MemoryPolicy> {
        let mut next = policy.clone();
        if let Some(v) = self.short_term_retention_hours {
            next.short_term_retention_hours = v;
        }
        if let Some(v) = self.short_term_max_entries {
            next.short_term_max_entries = v;
        }
        if let Some(v) = self.long_term_consolidation_threshold {
            next.long_term_consolidation_threshold = v;
        }
        if let Some(v) = self.long_term_max_entries {
            next.long_term_max_entries = v;
        }
        if let Some(v) = self.entity_confidence_threshold {
            next.entity_confidence_threshold = v;
        }
        if let Some(v) = self.entity_similarity_threshold {
            next.entity_similarity_threshold = v;
        }
        if let Some(v) = &self.embedding_provider {
            next.embedding_provider = v.clone();
        }
        if let Some(v) = &self.embedding_model {
            next.embedding_model = v.clone();
        }
        if let Some(v) = self.cleanup_enabled {
            next.cleanup_enabled = v;
        }
        if let Some(v) = self.cleanup_interval_hours {
            next.cleanup_interval_hours = v;
        }
        next.validate()?;
        Ok(next)
    }
}
