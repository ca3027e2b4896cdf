//! Audit trail of cleanup passes

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CrewMemError;
use crate::memory::types::TenantId;

/// Which stores a cleanup pass touched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupKind {
    Full,
    ShortTerm,
    LongTerm,
    Entity,
}

impl CleanupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CleanupKind::Full => "full",
            CleanupKind::ShortTerm => "short_term",
            CleanupKind::LongTerm => "long_term",
            CleanupKind::Entity => "entity",
        }
    }
}

impl fmt::Display for CleanupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CleanupKind {
    type Err = CrewMemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(CleanupKind::Full),
            "short_term" => Ok(CleanupKind::ShortTerm),
            "long_term" => Ok(CleanupKind::LongTerm),
            "entity" => Ok(CleanupKind::Entity),
            other => Err(CrewMemError::Storage(format!("Unknown cleanup kind: {other}"))),
        }
    }
}

/// Why a cleanup pass ran
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupReason {
    /// Triggered by the background scheduler
    Scheduled,
    /// Requested explicitly by a caller
    OnDemand,
    /// Operator-initiated wipe through `clear_all`
    Manual,
}

impl CleanupReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CleanupReason::Scheduled => "scheduled",
            CleanupReason::OnDemand => "on_demand",
            CleanupReason::Manual => "manual",
        }
    }
}

impl fmt::Display for CleanupReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CleanupReason {
    type Err = CrewMemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(CleanupReason::Scheduled),
            "on_demand" => Ok(CleanupReason::OnDemand),
            "manual" => Ok(CleanupReason::Manual),
            other => Err(CrewMemError::Storage(format!(
                "Unknown cleanup reason: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupLogEntry {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub cleanup_kind: CleanupKind,
    pub entries_removed: usize,
    pub reason: CleanupReason,
    pub duration_seconds: f64,
    pub created_at: DateTime<Utc>,
}

impl CleanupLogEntry {
    pub fn new(
        tenant_id: TenantId,
        cleanup_kind: CleanupKind,
        entries_removed: usize,
        reason: CleanupReason,
        duration_seconds: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            cleanup_kind,
            entries_removed,
            reason,
            duration_seconds,
            created_at: Utc::now(),
        }
    }
}
