//! Parquet encoding of tabular payloads
//!
//! Each [`TableBatch`] becomes one parquet file: dictionary-encoded,
//! SNAPPY-compressed, row groups capped at 10k rows, with provenance
//! embedded as key-value file metadata so a file is self-describing even
//! when found outside its partition.

use crate::storage::{StorageError, StorageResult};
use crate::{ColumnValues, SubResourceKind, TableBatch};
use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, NaiveDate, Utc};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::metadata::KeyValue;
use parquet::file::properties::WriterProperties;
use std::sync::Arc;

/// Target parquet row-group size.
const ROW_GROUP_SIZE: usize = 10_000;

/// Provenance embedded into every output file.
#[derive(Debug, Clone)]
pub struct FileProvenance<'a> {
    /// Upstream system the data came from
    pub source: &'a str,
    /// Logical endpoint/product the payload was fetched from
    pub endpoint: &'a str,
    /// Game identifier
    pub item_id: &'a str,
    /// Game date
    pub date: NaiveDate,
    /// Backfill period the run covered
    pub period: &'a str,
    /// Sub-resource kind
    pub kind: SubResourceKind,
    /// When the payload was ingested
    pub ingestion_timestamp: DateTime<Utc>,
}

impl FileProvenance<'_> {
    fn key_value_metadata(&self, row_count: usize, column_count: usize) -> Vec<KeyValue> {
        [
            ("source", self.source.to_string()),
            ("endpoint", self.endpoint.to_string()),
            ("item_id", self.item_id.to_string()),
            ("date", self.date.to_string()),
            ("period", self.period.to_string()),
            ("kind", self.kind.to_string()),
            ("ingestion_timestamp", self.ingestion_timestamp.to_rfc3339()),
            ("row_count", row_count.to_string()),
            ("column_count", column_count.to_string()),
        ]
        .into_iter()
        .map(|(k, v)| KeyValue::new(k.to_string(), v))
        .collect()
    }
}

/// Encode one result table as parquet bytes.
pub fn encode_table(table: &TableBatch, provenance: &FileProvenance<'_>) -> StorageResult<Vec<u8>> {
    let batch = to_record_batch(table)?;

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_dictionary_enabled(true)
        .set_max_row_group_size(ROW_GROUP_SIZE)
        .set_key_value_metadata(Some(
            provenance.key_value_metadata(table.row_count(), table.column_count()),
        ))
        .build();

    let mut buffer = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, batch.schema(), Some(props))
        .map_err(|e| StorageError::Encode(e.to_string()))?;
    writer
        .write(&batch)
        .map_err(|e| StorageError::Encode(e.to_string()))?;
    writer
        .close()
        .map_err(|e| StorageError::Encode(e.to_string()))?;

    Ok(buffer)
}

fn to_record_batch(table: &TableBatch) -> StorageResult<RecordBatch> {
    table.validate().map_err(StorageError::Encode)?;

    let mut fields = Vec::with_capacity(table.columns.len());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(table.columns.len());

    for column in &table.columns {
        match &column.values {
            ColumnValues::Int64(values) => {
                fields.push(Field::new(&column.name, DataType::Int64, true));
                arrays.push(Arc::new(Int64Array::from(values.clone())));
            }
            ColumnValues::Float64(values) => {
                fields.push(Field::new(&column.name, DataType::Float64, true));
                arrays.push(Arc::new(Float64Array::from(values.clone())));
            }
            ColumnValues::Utf8(values) => {
                fields.push(Field::new(&column.name, DataType::Utf8, true));
                arrays.push(Arc::new(StringArray::from(values.clone())));
            }
        }
    }

    RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)
        .map_err(|e| StorageError::Encode(e.to_string()))
}
