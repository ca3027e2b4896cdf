use std::collections::HashMap;
use std::path::Path;

use arrow_array::{RecordBatch, RecordBatchIterator};
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{DistanceType, Table};
use uuid::Uuid;

use crate::config::MemoryConfiguration;
use crate::error::{CrewMemError, Result};
use crate::memory::cleanup_log::CleanupLogEntry;
use crate::memory::types::{
    EntityRecord, EntityRelationship, LongTermRecord, ShortTermRecord, TenantId,
};
use crate::storage::filter::RowFilter;
use crate::storage::row::Row;

/// Ids per `IN (...)` predicate when deleting in bulk
const DELETE_CHUNK: usize = 256;

/// Tenant-scoped persistence over a single LanceDB database.
///
/// All six tables are created on open, so every later operation can assume
/// its table exists.
pub struct LanceStore {
    connection: Connection,
    dimension: i32,
    tables: HashMap<&'static str, Table>,
}

impl LanceStore {
    /// Connect to (or create) the database at `path` and ensure all tables exist
    pub async fn open(path: &Path, dimension: usize) -> Result<Self> {
        let dimension = i32::try_from(dimension)
            .ok()
            .filter(|d| *d > 0)
            .ok_or_else(|| {
                CrewMemError::Config(format!("Invalid embedding dimension: {dimension}"))
            })?;

        let uri = path
            .to_str()
            .ok_or_else(|| CrewMemError::Storage("Invalid path encoding".to_string()))?;

        let connection = lancedb::connect(uri)
            .execute()
            .await
            .map_err(|e| CrewMemError::Storage(format!("Failed to connect to LanceDB: {e}")))?;

        let mut store = Self {
            connection,
            dimension,
            tables: HashMap::new(),
        };

        store.ensure_table::<ShortTermRecord>().await?;
        store.ensure_table::<LongTermRecord>().await?;
        store.ensure_table::<EntityRecord>().await?;
        store.ensure_table::<EntityRelationship>().await?;
        store.ensure_table::<MemoryConfiguration>().await?;
        store.ensure_table::<CleanupLogEntry>().await?;

        Ok(store)
    }

    pub fn dimension(&self) -> usize {
        self.dimension as usize
    }

    pub async fn table_exists(&self, name: &str) -> Result<bool> {
        let names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| CrewMemError::Storage(format!("Failed to list tables: {e}")))?;

        Ok(names.iter().any(|n| n == name))
    }

    async fn ensure_table<R: Row>(&mut self) -> Result<()> {
        let table = if self.table_exists(R::TABLE).await? {
            tracing::debug!("Opening existing {} table", R::TABLE);
            self.connection
                .open_table(R::TABLE)
                .execute()
                .await
                .map_err(|e| {
                    CrewMemError::Storage(format!("Failed to open {} table: {e}", R::TABLE))
                })?
        } else {
            tracing::info!("Creating {} table", R::TABLE);
            let schema = R::schema(self.dimension);
            let batch = R::to_batch(&[], self.dimension)?;
            let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
            self.connection
                .create_table(R::TABLE, Box::new(batches))
                .execute()
                .await
                .map_err(|e| {
                    CrewMemError::Storage(format!("Failed to create {} table: {e}", R::TABLE))
                })?
        };

        self.tables.insert(R::TABLE, table);
        Ok(())
    }

    fn table<R: Row>(&self) -> Result<&Table> {
        self.tables
            .get(R::TABLE)
            .ok_or_else(|| CrewMemError::Storage(format!("{} table not initialized", R::TABLE)))
    }

    fn decode<R: Row>(batches: &[RecordBatch]) -> Result<Vec<R>> {
        let mut rows = Vec::new();
        for batch in batches {
            rows.extend(R::from_batch(batch)?);
        }
        Ok(rows)
    }

    /// Append rows to their table
    pub async fn insert<R: Row>(&self, rows: &[R]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let table = self.table::<R>()?;
        let schema = R::schema(self.dimension);
        let batch = R::to_batch(rows, self.dimension)?;
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        table
            .add(Box::new(batches))
            .execute()
            .await
            .map_err(|e| CrewMemError::Storage(format!("Failed to insert into {}: {e}", R::TABLE)))?;

        Ok(())
    }

    /// All rows matching the filter, in storage order
    pub async fn query<R: Row>(&self, filter: &RowFilter) -> Result<Vec<R>> {
        let table = self.table::<R>()?;

        let stream = table
            .query()
            .only_if(filter.to_sql())
            .execute()
            .await
            .map_err(|e| CrewMemError::Storage(format!("Failed to query {}: {e}", R::TABLE)))?;

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| CrewMemError::Storage(format!("Failed to collect query results: {e}")))?;

        Self::decode(&batches)
    }

    pub async fn get<R: Row>(&self, filter: &RowFilter) -> Result<Option<R>> {
        Ok(self.query::<R>(filter).await?.into_iter().next())
    }

    /// Nearest-neighbour candidates by cosine distance, prefiltered
    pub async fn nearest<R: Row>(
        &self,
        vector: &[f32],
        filter: &RowFilter,
        limit: usize,
    ) -> Result<Vec<R>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        if vector.len() != self.dimension() {
            return Err(CrewMemError::Embedding(format!(
                "query vector has {} values, expected {}",
                vector.len(),
                self.dimension
            )));
        }

        let table = self.table::<R>()?;

        let query = table
            .query()
            .nearest_to(vector)
            .map_err(|e| CrewMemError::Storage(format!("Failed to create vector query: {e}")))?
            .distance_type(DistanceType::Cosine)
            .limit(limit)
            .only_if(filter.to_sql());

        let stream = query
            .execute()
            .await
            .map_err(|e| CrewMemError::Storage(format!("Failed to execute search: {e}")))?;

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| CrewMemError::Storage(format!("Failed to collect search results: {e}")))?;

        Self::decode(&batches)
    }

    pub async fn count<R: Row>(&self, filter: &RowFilter) -> Result<usize> {
        let table = self.table::<R>()?;

        table
            .count_rows(Some(filter.to_sql()))
            .await
            .map_err(|e| CrewMemError::Storage(format!("Failed to count {}: {e}", R::TABLE)))
    }

    /// Delete matching rows, returning how many existed beforehand
    pub async fn delete_where<R: Row>(&self, filter: &RowFilter) -> Result<usize> {
        let existing = self.count::<R>(filter).await?;
        if existing == 0 {
            return Ok(0);
        }

        let table = self.table::<R>()?;
        table
            .delete(&filter.to_sql())
            .await
            .map_err(|e| CrewMemError::Storage(format!("Failed to delete from {}: {e}", R::TABLE)))?;

        Ok(existing)
    }

    /// Delete a tenant's rows by id
    pub async fn delete_ids<R: Row>(&self, tenant: &TenantId, ids: &[Uuid]) -> Result<usize> {
        let mut removed = 0;
        for chunk in ids.chunks(DELETE_CHUNK) {
            removed += self
                .delete_where::<R>(&RowFilter::tenant(tenant).ids(chunk))
                .await?;
        }
        Ok(removed)
    }

    /// Apply SQL column expressions to matching rows, returning rows updated
    pub async fn update_where<R: Row>(
        &self,
        filter: &RowFilter,
        columns: &[(&str, String)],
    ) -> Result<u64> {
        let table = self.table::<R>()?;

        let mut update = table.update().only_if(filter.to_sql());
        for (column, expr) in columns {
            update = update.column(*column, expr.clone());
        }

        let result = update
            .execute()
            .await
            .map_err(|e| CrewMemError::Storage(format!("Failed to update {}: {e}", R::TABLE)))?;

        Ok(result.rows_updated)
    }

    /// Swap the rows matching `filter` for `replacement`.
    ///
    /// If the insert fails, the previous rows are written back before the
    /// error is returned.
    pub async fn replace<R: Row>(&self, filter: &RowFilter, replacement: &[R]) -> Result<()> {
        let previous = self.query::<R>(filter).await?;
        self.delete_where::<R>(filter).await?;

        if let Err(e) = self.insert(replacement).await {
            if let Err(restore) = self.insert(&previous).await {
                tracing::error!("Failed to restore {} rows after failed replace: {restore}", R::TABLE);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Distinct tenant ids with a stored configuration
    pub async fn configured_tenants(&self) -> Result<Vec<MemoryConfiguration>> {
        let table = self.table::<MemoryConfiguration>()?;

        let stream = table
            .query()
            .execute()
            .await
            .map_err(|e| CrewMemError::Storage(format!("Failed to list configurations: {e}")))?;

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| CrewMemError::Storage(format!("Failed to collect configurations: {e}")))?;

        let mut configs: Vec<MemoryConfiguration> = Self::decode(&batches)?;
        configs.sort_by(|a, b| a.tenant_id.cmp(&b.tenant_id));
        configs.dedup_by(|a, b| a.tenant_id == b.tenant_id);
        Ok(configs)
    }
}
