//! Local columnar cache (C8, spec §4.8). Grounded on `DataCache` in
//! `trino_migration/cache.py`: a directory tree keyed by source
//! coordinates, holding one Parquet data file plus a JSON metadata sidecar
//! that is the write-atomicity commit point.
//!
//! Every cell is rendered to its string form before being written to
//! Parquet rather than inferring a typed Arrow schema; this cache exists to
//! make loads resumable, not to be a general columnar store.

use arrow_array::{RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema};
use migrate_core::{CachedDatasetMeta, MigrateError, Result, Row};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct LocalCache {
    root: PathBuf,
}

impl LocalCache {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| MigrateError::Other(e.into()))?;
        Ok(Self { root })
    }

    fn cache_dir(&self, catalog: &str, schema: &str, table: &str) -> PathBuf {
        let safe_name = format!("{catalog}.{schema}.{table}").replace('/', "_");
        self.root.join(safe_name)
    }

    fn data_file(dir: &Path) -> PathBuf {
        dir.join("data.parquet")
    }

    fn metadata_file(dir: &Path) -> PathBuf {
        dir.join("metadata.json")
    }

    pub fn exists(&self, catalog: &str, schema: &str, table: &str) -> bool {
        let dir = self.cache_dir(catalog, schema, table);
        Self::data_file(&dir).exists() && Self::metadata_file(&dir).exists()
    }

    /// Writes data then metadata: metadata is the commit point, so an
    /// orphaned data file (left by a crash between the two writes) is
    /// equivalent to no cache at all (spec §4.8).
    pub fn save(
        &self,
        catalog: &str,
        schema: &str,
        table: &str,
        rows: &[Row],
        columns: &[(String, String)],
        ddl: Option<String>,
    ) -> Result<PathBuf> {
        let dir = self.cache_dir(catalog, schema, table);
        std::fs::create_dir_all(&dir).map_err(|e| MigrateError::Other(e.into()))?;

        let batch = rows_to_record_batch(rows, columns)?;
        let data_file = Self::data_file(&dir);
        let file = File::create(&data_file).map_err(|e| MigrateError::Other(e.into()))?;
        let mut writer = ArrowWriter::try_new(file, batch.schema(), None)
            .map_err(|e| MigrateError::Other(e.into()))?;
        writer.write(&batch).map_err(|e| MigrateError::Other(e.into()))?;
        writer.close().map_err(|e| MigrateError::Other(e.into()))?;

        let metadata = CachedDatasetMeta {
            source_catalog: catalog.to_string(),
            source_schema: schema.to_string(),
            source_table: table.to_string(),
            columns: columns.to_vec(),
            row_count: rows.len() as u64,
            file_format: "PARQUET".to_string(),
            ddl,
        };
        let metadata_file = Self::metadata_file(&dir);
        let json = serde_json::to_string_pretty(&metadata).map_err(|e| MigrateError::Other(e.into()))?;
        std::fs::write(&metadata_file, json).map_err(|e| MigrateError::Other(e.into()))?;

        Ok(dir)
    }

    pub fn load(&self, catalog: &str, schema: &str, table: &str) -> Result<(Vec<Row>, CachedDatasetMeta)> {
        let dir = self.cache_dir(catalog, schema, table);
        if !self.exists(catalog, schema, table) {
            return Err(MigrateError::Schema(format!(
                "no cache for {catalog}.{schema}.{table}"
            )));
        }
        let metadata_text =
            std::fs::read_to_string(Self::metadata_file(&dir)).map_err(|e| MigrateError::Other(e.into()))?;
        let metadata: CachedDatasetMeta =
            serde_json::from_str(&metadata_text).map_err(|e| MigrateError::Other(e.into()))?;

        let file = File::open(Self::data_file(&dir)).map_err(|e| MigrateError::Other(e.into()))?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(|e| MigrateError::Other(e.into()))?
            .build()
            .map_err(|e| MigrateError::Other(e.into()))?;

        let mut rows = Vec::new();
        for batch in reader {
            let batch = batch.map_err(|e| MigrateError::Other(e.into()))?;
            rows.extend(record_batch_to_rows(&batch));
        }
        Ok((rows, metadata))
    }

    pub fn delete(&self, catalog: &str, schema: &str, table: &str) -> Result<bool> {
        let dir = self.cache_dir(catalog, schema, table);
        if dir.exists() {
            std::fs::remove_dir_all(&dir).map_err(|e| MigrateError::Other(e.into()))?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn clear_all(&self) -> Result<u64> {
        let mut count = 0u64;
        for entry in std::fs::read_dir(&self.root).map_err(|e| MigrateError::Other(e.into()))? {
            let entry = entry.map_err(|e| MigrateError::Other(e.into()))?;
            if entry.path().is_dir() {
                std::fs::remove_dir_all(entry.path()).map_err(|e| MigrateError::Other(e.into()))?;
                count += 1;
            }
        }
        Ok(count)
    }

    pub fn list_cached(&self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&self.root).map_err(|e| MigrateError::Other(e.into()))? {
            let entry = entry.map_err(|e| MigrateError::Other(e.into()))?;
            if entry.path().is_dir() && entry.path().join("metadata.json").exists() {
                if let Some(name) = entry.file_name().to_str() {
                    out.push(name.to_string());
                }
            }
        }
        Ok(out)
    }
}

fn rows_to_record_batch(rows: &[Row], columns: &[(String, String)]) -> Result<RecordBatch> {
    let fields: Vec<Field> = columns
        .iter()
        .map(|(name, _)| Field::new(name, DataType::Utf8, true))
        .collect();
    let schema = Arc::new(Schema::new(fields));

    let arrays: Vec<Arc<dyn arrow_array::Array>> = columns
        .iter()
        .map(|(name, _)| {
            let values: Vec<Option<String>> = rows
                .iter()
                .map(|row| row.get(name).map(|v| v.to_string()))
                .collect();
            Arc::new(StringArray::from(values)) as Arc<dyn arrow_array::Array>
        })
        .collect();

    RecordBatch::try_new(schema, arrays).map_err(|e| MigrateError::Other(e.into()))
}

fn record_batch_to_rows(batch: &RecordBatch) -> Vec<Row> {
    let schema = batch.schema();
    let mut rows = Vec::with_capacity(batch.num_rows());
    for row_idx in 0..batch.num_rows() {
        let mut cells = Vec::with_capacity(batch.num_columns());
        for (col_idx, field) in schema.fields().iter().enumerate() {
            let array = batch.column(col_idx);
            let value = if array.is_null(row_idx) {
                migrate_core::RowValue::Null
            } else if let Some(strings) = array.as_any().downcast_ref::<StringArray>() {
                migrate_core::RowValue::Text(strings.value(row_idx).to_string())
            } else {
                migrate_core::RowValue::Null
            };
            cells.push((field.name().clone(), value));
        }
        rows.push(Row::new(cells));
    }
    rows
}
