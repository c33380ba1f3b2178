//! Table migrator — relational (C6, spec §4.6). Grounded on
//! `AsyncMySQLMigrator.migrate_table_with_progress`/`_insert_batch` in
//! `mysql_migration/migrator.py`: streaming extract, batched `INSERT IGNORE`,
//! per-row fallback on batch failure.

use crate::inspector::SchemaInspector;
use crate::pool::ConnectionPool;
use futures::StreamExt;
use migrate_core::{encode_values_tuple, JobStatus, MigrationResult, Row};

const DEFAULT_BATCH_SIZE: usize = 1_000;
const MAX_ROW_ERRORS: usize = 5;

#[derive(Debug, Clone)]
pub struct RelationalTableJob {
    pub source_schema: String,
    pub source_table: String,
    pub target_schema: String,
    pub target_table: String,
    pub where_clause: String,
    pub row_limit: Option<u64>,
    pub create_table: bool,
    pub truncate: bool,
    pub batch_size: usize,
}

impl Default for RelationalTableJob {
    fn default() -> Self {
        Self {
            source_schema: String::new(),
            source_table: String::new(),
            target_schema: String::new(),
            target_table: String::new(),
            where_clause: "1=1".to_string(),
            row_limit: None,
            create_table: false,
            truncate: false,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

pub struct RelationalMigrator<'a> {
    source: &'a ConnectionPool,
    target: &'a ConnectionPool,
}

impl<'a> RelationalMigrator<'a> {
    pub fn new(source: &'a ConnectionPool, target: &'a ConnectionPool) -> Self {
        Self { source, target }
    }

    pub async fn migrate_table(&self, job: &RelationalTableJob) -> MigrationResult {
        let mut result = MigrationResult::new(&job.source_schema, &job.source_table);

        if job.create_table {
            if let Err(e) = self.prep_create_table(job).await {
                result.fail(format!("prep failed: {e}"));
                return result;
            }
        }

        let limit_clause = job
            .row_limit
            .map(|n| format!(" LIMIT {n}"))
            .unwrap_or_default();
        let count_sql = format!(
            "SELECT COUNT(*) as cnt FROM {}.{} WHERE {}",
            job.source_schema, job.source_table, job.where_clause
        );
        let fetched = match self.source.query_all(&count_sql).await {
            Ok(rows) => rows
                .first()
                .and_then(|r| r.get("cnt"))
                .map(|v| v.to_string().parse::<u64>().unwrap_or(0))
                .unwrap_or(0),
            Err(e) => {
                result.fail(format!("count failed: {e}"));
                return result;
            }
        };
        result.fetched = match job.row_limit {
            Some(limit) => fetched.min(limit),
            None => fetched,
        };

        if job.truncate {
            let truncate_sql = format!("TRUNCATE TABLE {}.{}", job.target_schema, job.target_table);
            if let Err(e) = self.target.execute(&truncate_sql).await {
                result.push_error(format!("truncate failed: {e}"));
            }
        }

        let select_sql = format!(
            "SELECT * FROM {}.{} WHERE {}{}",
            job.source_schema, job.source_table, job.where_clause, limit_clause
        );

        let mut stream = Box::pin(self.source.stream(&select_sql));
        let mut columns: Option<Vec<String>> = None;
        let mut batch: Vec<Row> = Vec::with_capacity(job.batch_size.max(1));

        while let Some(next) = stream.next().await {
            let row = match next {
                Ok(row) => row,
                Err(e) => {
                    result.push_error(format!("stream error: {e}"));
                    continue;
                }
            };
            if columns.is_none() {
                columns = Some(row.column_names().map(str::to_string).collect());
            }
            batch.push(row);
            if batch.len() >= job.batch_size {
                self.flush_batch(job, columns.as_ref().unwrap(), &mut batch, &mut result)
                    .await;
            }
        }
        if !batch.is_empty() {
            if let Some(cols) = columns.as_ref() {
                self.flush_batch(job, cols, &mut batch, &mut result).await;
            }
        }

        if result.status == JobStatus::Ok && !result.errors.is_empty() {
            result.status = JobStatus::Warning;
        }
        result
    }

    async fn prep_create_table(&self, job: &RelationalTableJob) -> anyhow::Result<()> {
        let inspector = SchemaInspector::new(self.source);
        let ddl = inspector
            .fetch_ddl("", &job.source_schema, &job.source_table)
            .await?;
        let if_not_exists = ddl.replacen("CREATE TABLE", "CREATE TABLE IF NOT EXISTS", 1);
        match self.target.execute(&if_not_exists).await {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().to_lowercase().contains("already exists") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Batch-insert with per-batch then per-row fallback (spec §4.6 steps
    /// 5–6). `INSERT IGNORE` semantics make duplicate-key rows silent;
    /// `rowcount` is the number of rows actually inserted.
    async fn flush_batch(
        &self,
        job: &RelationalTableJob,
        columns: &[String],
        batch: &mut Vec<Row>,
        result: &mut MigrationResult,
    ) {
        let batch_len = batch.len() as u64;
        let insert_sql = build_insert_ignore(&job.target_schema, &job.target_table, columns, batch);

        match self.target.execute(&insert_sql).await {
            Ok(inserted) => {
                result.inserted += inserted;
                result.skipped += batch_len.saturating_sub(inserted);
            }
            Err(_) => {
                // per-row fallback: each row gets its own INSERT IGNORE
                for row in batch.iter() {
                    let single_sql =
                        build_insert_ignore(&job.target_schema, &job.target_table, columns, std::slice::from_ref(row));
                    match self.target.execute(&single_sql).await {
                        Ok(n) if n > 0 => result.inserted += 1,
                        Ok(_) => result.skipped += 1,
                        Err(e) => {
                            if result.errors.len() < MAX_ROW_ERRORS {
                                result.push_error(format!("row insert failed: {e}"));
                            }
                            result.skipped += 1;
                        }
                    }
                }
            }
        }
        batch.clear();
    }
}

fn build_insert_ignore(schema: &str, table: &str, columns: &[String], rows: &[Row]) -> String {
    let col_list = columns.join(", ");
    let tuples: Vec<String> = rows.iter().map(|r| encode_values_tuple(columns, r)).collect();
    format!(
        "INSERT IGNORE INTO {schema}.{table} ({col_list}) VALUES {}",
        tuples.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use migrate_core::RowValue;

    #[test]
    fn build_insert_ignore_preserves_column_order() {
        let row = Row::new(vec![
            ("id".to_string(), RowValue::Int(1)),
            ("name".to_string(), RowValue::Text("a".to_string())),
        ]);
        let sql = build_insert_ignore(
            "shop",
            "orders",
            &["id".to_string(), "name".to_string()],
            std::slice::from_ref(&row),
        );
        assert!(sql.starts_with("INSERT IGNORE INTO shop.orders (id, name) VALUES (1, 'a')"));
    }
}
