//! Data model: table descriptors, jobs, and results (spec §3).

use std::collections::BTreeMap;
use std::fmt;

/// A single cell value out of a relational or warehouse row.
///
/// The source project passes untyped cell values straight from the driver
/// to the prepared-statement binder; this tag set is the systems-language
/// stand-in for that dynamic typing (spec §9, "Dynamic typing in DB rows").
#[derive(Debug, Clone, PartialEq)]
pub enum RowValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    /// JSON-ish structured value (maps/arrays), encoded as a string literal
    /// by the EXTRACT_LOAD literal encoder.
    Json(serde_json::Value),
    Timestamp(chrono::NaiveDateTime),
    Decimal(String),
}

impl fmt::Display for RowValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowValue::Null => write!(f, "NULL"),
            RowValue::Bool(b) => write!(f, "{b}"),
            RowValue::Int(i) => write!(f, "{i}"),
            RowValue::Float(x) => write!(f, "{x}"),
            RowValue::Text(s) => write!(f, "{s}"),
            RowValue::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            RowValue::Json(v) => write!(f, "{v}"),
            RowValue::Timestamp(t) => write!(f, "{t}"),
            RowValue::Decimal(s) => write!(f, "{s}"),
        }
    }
}

/// An ordered map of column name to value, preserving the column order the
/// streaming cursor yielded on its first row.
#[derive(Debug, Clone, Default)]
pub struct Row {
    columns: Vec<(String, RowValue)>,
}

impl Row {
    pub fn new(columns: Vec<(String, RowValue)>) -> Self {
        Self { columns }
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &RowValue> {
        self.columns.iter().map(|(_, value)| value)
    }

    pub fn get(&self, name: &str) -> Option<&RowValue> {
        self.columns
            .iter()
            .find(|(col, _)| col == name)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn as_slice(&self) -> &[(String, RowValue)] {
        &self.columns
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub declared_type: String,
    pub is_partition_key: bool,
}

/// Immutable metadata snapshot of a table extracted from the source.
#[derive(Debug, Clone)]
pub struct TableDescriptor {
    pub catalog: Option<String>,
    pub schema: String,
    pub table: String,
    pub columns: Vec<ColumnDef>,
    pub partition_columns: Vec<String>,
    pub location: Option<String>,
    pub format: Option<String>,
    pub ddl: String,
    pub row_count: Option<u64>,
    pub partitions: Option<Vec<BTreeMap<String, String>>>,
}

impl TableDescriptor {
    pub fn is_partitioned(&self) -> bool {
        !self.partition_columns.is_empty()
    }

    /// Parses `(bucket, prefix)` out of an `s3://bucket/prefix` style
    /// location URI. `None` if no location was resolved for this table.
    pub fn bucket_and_prefix(&self) -> Option<(String, String)> {
        let location = self.location.as_ref()?;
        let without_scheme = location.splitn(2, "://").nth(1)?;
        let mut parts = without_scheme.splitn(2, '/');
        let bucket = parts.next()?.to_string();
        let prefix = parts.next().unwrap_or("").trim_end_matches('/').to_string();
        Some((bucket, prefix))
    }

    pub fn full_name(&self) -> String {
        match &self.catalog {
            Some(catalog) => format!("{catalog}.{}.{}", self.schema, self.table),
            None => format!("{}.{}", self.schema, self.table),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MigrationMethod {
    ObjectCopy,
    ExtractLoad,
}

#[derive(Debug, Clone)]
pub struct PartitionPredicate {
    pub column: String,
    pub op: ComparisonOp,
    pub literal: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl ComparisonOp {
    pub fn as_str(self) -> &'static str {
        match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::Lt => "<",
            ComparisonOp::Le => "<=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Ge => ">=",
        }
    }
}

/// Source descriptor + target naming overrides + strategy for one warehouse
/// table, or the row-moving contract for one relational table (spec §3).
#[derive(Debug, Clone)]
pub struct TableJob {
    pub source_catalog: Option<String>,
    pub source_schema: String,
    pub source_table: String,
    pub target_catalog: Option<String>,
    pub target_schema: Option<String>,
    pub target_table: Option<String>,
    pub method: MigrationMethod,
    pub partition_filter: Vec<PartitionPredicate>,
    pub where_clause: Option<String>,
    pub row_limit: Option<u64>,
}

impl TableJob {
    pub fn resolved_target_schema(&self) -> &str {
        self.target_schema.as_deref().unwrap_or(&self.source_schema)
    }

    pub fn resolved_target_table(&self) -> &str {
        self.target_table.as_deref().unwrap_or(&self.source_table)
    }

    pub fn resolved_target_catalog<'a>(&'a self) -> Option<&'a str> {
        self.target_catalog
            .as_deref()
            .or(self.source_catalog.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DatabaseMode {
    All,
    Explicit,
}

#[derive(Debug, Clone)]
pub struct UserPartitionMode {
    pub user_ids: Vec<i64>,
}

/// One static database migration job (spec §3, "Database job").
#[derive(Debug, Clone)]
pub struct DatabaseJob {
    pub source_name: String,
    pub target_name: Option<String>,
    pub mode: DatabaseMode,
    pub include: Vec<String>,
    pub exclude_exact: Vec<String>,
    pub exclude_regex: Vec<String>,
    pub default_where: Option<String>,
    pub default_limit: Option<u64>,
    pub exclude_date_tables: bool,
    pub user_partition: Option<UserPartitionMode>,
    pub truncate: bool,
    pub create_tables: bool,
    pub per_table_where: BTreeMap<String, String>,
    pub per_table_limit: BTreeMap<String, u64>,
}

impl DatabaseJob {
    pub fn resolved_target_name(&self) -> &str {
        self.target_name.as_deref().unwrap_or(&self.source_name)
    }
}

/// A database job whose source (and optionally target) name still contains
/// exactly one `{placeholder}`, to be expanded by the dynamic job expander
/// (C9) before scheduling.
#[derive(Debug, Clone)]
pub struct DynamicDatabaseJob {
    pub source_template: String,
    pub target_template: Option<String>,
    pub lookup_database: String,
    pub lookup_sql: String,
    pub base: DatabaseJob,
}

/// child -> parents, restricted to tables within the same set; self-edges
/// dropped (spec §3, "FK edge set").
#[derive(Debug, Clone, Default)]
pub struct FkEdgeSet {
    edges: BTreeMap<String, Vec<String>>,
}

impl FkEdgeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_edge(&mut self, child: &str, parent: &str) {
        if child == parent {
            return;
        }
        self.edges
            .entry(child.to_string())
            .or_default()
            .push(parent.to_string());
    }

    pub fn parents_of(&self, child: &str) -> &[String] {
        self.edges.get(child).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Ok,
    Warning,
    Error,
    Skipped,
    DryRun,
}

/// Result of migrating one table (spec §3, "Migration result"). Relational
/// migrations populate `fetched`/`inserted`/`skipped`; warehouse migrations
/// populate `files`/`bytes`/`partitions`. Error strings are capped at 5
/// entries to bound memory (spec §7).
#[derive(Debug, Clone, serde::Serialize)]
pub struct MigrationResult {
    pub database: String,
    pub table: String,
    pub method: Option<MigrationMethod>,
    pub status: JobStatus,
    pub fetched: u64,
    pub inserted: u64,
    pub skipped: u64,
    pub files: u64,
    pub bytes: u64,
    pub partitions: u64,
    pub errors: Vec<String>,
}

const MAX_ERRORS: usize = 5;

impl MigrationResult {
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
            method: None,
            status: JobStatus::Ok,
            fetched: 0,
            inserted: 0,
            skipped: 0,
            files: 0,
            bytes: 0,
            partitions: 0,
            errors: Vec::new(),
        }
    }

    /// Records an error string, capping the list at [`MAX_ERRORS`] and
    /// downgrading `OK` to `WARNING` (never downgrading an existing `ERROR`).
    pub fn push_error(&mut self, message: impl Into<String>) {
        if self.errors.len() < MAX_ERRORS {
            self.errors.push(message.into());
        }
        if self.status == JobStatus::Ok {
            self.status = JobStatus::Warning;
        }
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.errors.truncate(MAX_ERRORS.saturating_sub(1));
        self.errors.push(message.into());
        self.status = JobStatus::Error;
    }
}

/// Metadata sidecar for a warehouse extract sitting in the local columnar
/// cache (C8). The JSON file this struct (de)serializes is the commit point.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CachedDatasetMeta {
    pub source_catalog: String,
    pub source_schema: String,
    pub source_table: String,
    pub columns: Vec<(String, String)>,
    pub row_count: u64,
    pub file_format: String,
    pub ddl: Option<String>,
}
