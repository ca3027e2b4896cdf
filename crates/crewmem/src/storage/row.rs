//! Arrow conversion for persisted rows

use std::sync::Arc;

use arrow_array::{
    Array, BooleanArray, FixedSizeListArray, Float32Array, Float64Array, Int64Array, RecordBatch,
    StringArray, TimestampMicrosecondArray,
};
use arrow_schema::{DataType, Field, Schema, TimeUnit};
use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::error::{CrewMemError, Result};
use crate::memory::types::{Metadata, TenantId};

/// A type stored as one row of a LanceDB table
pub trait Row: Sized + Send + Sync {
    /// Table the rows live in
    const TABLE: &'static str;

    /// Arrow schema for the table; `dimension` sizes the embedding column
    fn schema(dimension: i32) -> Arc<Schema>;

    fn to_batch(rows: &[Self], dimension: i32) -> Result<RecordBatch>;

    fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>>;
}

pub(crate) fn timestamp_field(name: &str, nullable: bool) -> Field {
    Field::new(
        name,
        DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
        nullable,
    )
}

pub(crate) fn embedding_field(dimension: i32) -> Field {
    Field::new(
        "embedding",
        DataType::FixedSizeList(
            Arc::new(Field::new("item", DataType::Float32, true)),
            dimension,
        ),
        false,
    )
}

pub(crate) fn timestamps(values: Vec<i64>) -> TimestampMicrosecondArray {
    TimestampMicrosecondArray::from(values).with_timezone("UTC")
}

pub(crate) fn optional_timestamps(values: Vec<Option<i64>>) -> TimestampMicrosecondArray {
    TimestampMicrosecondArray::from(values).with_timezone("UTC")
}

pub(crate) fn embeddings<'a>(
    vectors: impl Iterator<Item = &'a Vec<f32>>,
    dimension: i32,
) -> Result<FixedSizeListArray> {
    let mut values: Vec<Option<Vec<Option<f32>>>> = Vec::new();
    for vector in vectors {
        if vector.len() != dimension as usize {
            return Err(CrewMemError::Storage(format!(
                "embedding has {} values, table expects {dimension}",
                vector.len()
            )));
        }
        values.push(Some(vector.iter().map(|&v| Some(v)).collect()));
    }
    Ok(FixedSizeListArray::from_iter_primitive::<
        arrow_array::types::Float32Type,
        _,
        _,
    >(values, dimension))
}

pub(crate) fn metadata_json(metadata: Option<&Metadata>) -> Result<Option<String>> {
    metadata
        .map(|m| serde_json::to_string(m).map_err(CrewMemError::from))
        .transpose()
}

pub(crate) fn finish_batch(
    schema: Arc<Schema>,
    columns: Vec<Arc<dyn Array>>,
    table: &str,
) -> Result<RecordBatch> {
    RecordBatch::try_new(schema, columns)
        .map_err(|e| CrewMemError::Storage(format!("Failed to create {table} RecordBatch: {e}")))
}

/// Typed column access for one record batch
pub(crate) struct Columns<'a> {
    batch: &'a RecordBatch,
}

impl<'a> Columns<'a> {
    pub fn new(batch: &'a RecordBatch) -> Self {
        Self { batch }
    }

    fn column<T: Array + 'static>(&self, name: &str) -> Result<&'a T> {
        self.batch
            .column_by_name(name)
            .ok_or_else(|| CrewMemError::Storage(format!("Missing {name} column")))?
            .as_any()
            .downcast_ref::<T>()
            .ok_or_else(|| CrewMemError::Storage(format!("Failed to get {name} column")))
    }

    pub fn strings(&self, name: &str) -> Result<&'a StringArray> {
        self.column::<StringArray>(name)
    }

    pub fn floats(&self, name: &str) -> Result<&'a Float32Array> {
        self.column::<Float32Array>(name)
    }

    pub fn doubles(&self, name: &str) -> Result<&'a Float64Array> {
        self.column::<Float64Array>(name)
    }

    pub fn ints(&self, name: &str) -> Result<&'a Int64Array> {
        self.column::<Int64Array>(name)
    }

    pub fn bools(&self, name: &str) -> Result<&'a BooleanArray> {
        self.column::<BooleanArray>(name)
    }

    pub fn timestamps(&self, name: &str) -> Result<&'a TimestampMicrosecondArray> {
        self.column::<TimestampMicrosecondArray>(name)
    }

    pub fn embeddings(&self) -> Result<&'a FixedSizeListArray> {
        self.column::<FixedSizeListArray>("embedding")
    }
}

pub(crate) fn string_at(array: &StringArray, row: usize) -> String {
    array.value(row).to_string()
}

pub(crate) fn optional_string_at(array: &StringArray, row: usize) -> Option<String> {
    if array.is_null(row) {
        None
    } else {
        Some(array.value(row).to_string())
    }
}

pub(crate) fn uuid_at(array: &StringArray, row: usize) -> Result<Uuid> {
    Uuid::parse_str(array.value(row))
        .map_err(|e| CrewMemError::Storage(format!("Failed to parse UUID: {e}")))
}

pub(crate) fn tenant_at(array: &StringArray, row: usize) -> Result<TenantId> {
    TenantId::new(array.value(row))
        .map_err(|e| CrewMemError::Storage(format!("Corrupt tenant id: {e}")))
}

pub(crate) fn timestamp_at(array: &TimestampMicrosecondArray, row: usize) -> Result<DateTime<Utc>> {
    Utc.timestamp_micros(array.value(row))
        .single()
        .ok_or_else(|| CrewMemError::Storage("Failed to parse timestamp".to_string()))
}

pub(crate) fn optional_timestamp_at(
    array: &TimestampMicrosecondArray,
    row: usize,
) -> Result<Option<DateTime<Utc>>> {
    if array.is_null(row) {
        Ok(None)
    } else {
        timestamp_at(array, row).map(Some)
    }
}

pub(crate) fn optional_float_at(array: &Float32Array, row: usize) -> Option<f32> {
    if array.is_null(row) {
        None
    } else {
        Some(array.value(row))
    }
}

pub(crate) fn metadata_at(array: &StringArray, row: usize) -> Result<Option<Metadata>> {
    match optional_string_at(array, row) {
        Some(raw) if !raw.is_empty() => serde_json::from_str(&raw).map(Some).map_err(|e| {
            CrewMemError::Serialization(format!("Failed to parse stored metadata: {e}"))
        }),
        _ => Ok(None),
    }
}

pub(crate) fn embedding_at(array: &FixedSizeListArray, row: usize) -> Result<Vec<f32>> {
    let list = array.value(row);
    let values = list
        .as_any()
        .downcast_ref::<Float32Array>()
        .ok_or_else(|| CrewMemError::Storage("Failed to get embedding values".to_string()))?;
    Ok((0..values.len()).map(|i| values.value(i)).collect())
}
