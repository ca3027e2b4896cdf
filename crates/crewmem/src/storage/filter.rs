//! Predicate builder for tenant-scoped storage queries
//!
//! Every predicate starts from a tenant condition, so a query built here can
//! never read rows that belong to another tenant. Additional conditions are
//! combined with AND.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::memory::types::TenantId;

/// Quote a string as a SQL literal, doubling embedded single quotes
pub fn sql_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Turn free text into a LIKE-safe fragment.
///
/// Wildcard and escape characters are replaced with the single-character
/// wildcard, so the pattern can over-match but never under-match. Callers
/// re-check matches exactly after loading.
pub fn like_fragment(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '%' | '_' | '\\' => '_',
            c => c,
        })
        .collect::<String>()
        .replace('\'', "''")
}

/// Column expression for a timestamp value (microseconds since the epoch)
pub fn timestamp_literal(at: DateTime<Utc>) -> String {
    format!("{}", at.timestamp_micros())
}

/// Comma-wrapped storage form of a tag list, e.g. `,rust,async,`
pub fn encode_tags(tags: &[String]) -> String {
    if tags.is_empty() {
        String::new()
    } else {
        format!(",{},", tags.join(","))
    }
}

pub fn decode_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Tenant-scoped filter; multiple conditions are combined with AND
#[derive(Debug, Clone)]
pub struct RowFilter {
    conditions: Vec<String>,
}

impl RowFilter {
    pub fn tenant(tenant: &TenantId) -> Self {
        Self {
            conditions: vec![format!("tenant_id = {}", sql_string(tenant.as_str()))],
        }
    }

    pub fn id(mut self, id: Uuid) -> Self {
        self.conditions.push(format!("id = '{id}'"));
        self
    }

    pub fn ids(mut self, ids: &[Uuid]) -> Self {
        let list = ids
            .iter()
            .map(|id| format!("'{id}'"))
            .collect::<Vec<_>>()
            .join(", ");
        self.conditions.push(format!("id IN ({list})"));
        self
    }

    pub fn eq(mut self, column: &str, value: &str) -> Self {
        self.conditions
            .push(format!("{column} = {}", sql_string(value)));
        self
    }

    pub fn eq_opt(self, column: &str, value: Option<&str>) -> Self {
        match value {
            Some(v) => self.eq(column, v),
            None => self,
        }
    }

    pub fn in_list(mut self, column: &str, values: &[&str]) -> Self {
        let list = values
            .iter()
            .map(|v| sql_string(v))
            .collect::<Vec<_>>()
            .join(", ");
        self.conditions.push(format!("{column} IN ({list})"));
        self
    }

    pub fn at_least(mut self, column: &str, value: f32) -> Self {
        self.conditions.push(format!("{column} >= {value}"));
        self
    }

    pub fn at_least_opt(self, column: &str, value: Option<f32>) -> Self {
        match value {
            Some(v) => self.at_least(column, v),
            None => self,
        }
    }

    /// Case-insensitive substring prefilter
    pub fn contains_ci(mut self, column: &str, needle: &str) -> Self {
        let fragment = like_fragment(&needle.to_lowercase());
        self.conditions
            .push(format!("lower({column}) LIKE '%{fragment}%'"));
        self
    }

    /// Require every tag to appear as a whole token in the encoded tag column
    pub fn has_tags(mut self, column: &str, tags: &[String]) -> Self {
        for tag in tags {
            let fragment = like_fragment(tag);
            self.conditions
                .push(format!("{column} LIKE '%,{fragment},%'"));
        }
        self
    }

    pub fn raw(mut self, condition: impl Into<String>) -> Self {
        self.conditions.push(condition.into());
        self
    }

    pub fn to_sql(&self) -> String {
        self.conditions.join(" AND ")
    }
}
