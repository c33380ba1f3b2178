//! Table migrator — warehouse (C7, spec §4.7). Grounded on
//! `TrinoMigrator.migrate_table` in `trino_migration/migrator.py`: the
//! OBJECT_COPY and EXTRACT_LOAD strategies, the Iceberg-catalog method
//! switch, and the commit-conflict exponential-backoff retry.

use crate::cache::LocalCache;
use crate::object_copier::{CopyStatus, ObjectStoreCopier, Side};
use futures::StreamExt;
use migrate_core::{predicate_matches, MigrationMethod, MigrationResult, Row, TableJob};
use migrate_db::{ConnectionPool, SchemaInspector};
use rand::Rng;
use std::time::Duration;

const DEFAULT_BATCH_SIZE: usize = 1_000;
const DEFAULT_PARALLEL_INSERTS: usize = 4;
const MAX_COMMIT_RETRY_ATTEMPTS: u32 = 8;
const COMMIT_RETRY_BASE: Duration = Duration::from_millis(200);
const COMMIT_RETRY_CAP: Duration = Duration::from_secs(120);

/// `catalog` names containing this substring are treated as Iceberg-backed;
/// raw file copy between Iceberg tables leaves metadata dangling, so
/// OBJECT_COPY is automatically switched to EXTRACT_LOAD (spec §4.7).
pub fn is_iceberg_catalog(catalog: &str) -> bool {
    catalog.to_lowercase().contains("iceberg")
}

/// Applies the automatic method switch; returns the method actually used
/// (spec §8, "Iceberg-tagged catalog... result.method reports the actual
/// method used").
pub fn resolve_method(job: &TableJob) -> MigrationMethod {
    let source_iceberg = job
        .source_catalog
        .as_deref()
        .map(is_iceberg_catalog)
        .unwrap_or(false);
    let target_iceberg = job
        .resolved_target_catalog()
        .map(is_iceberg_catalog)
        .unwrap_or(false);
    if job.method == MigrationMethod::ObjectCopy && (source_iceberg || target_iceberg) {
        MigrationMethod::ExtractLoad
    } else {
        job.method
    }
}

pub fn is_commit_conflict(error: &str) -> bool {
    let lower = error.to_lowercase();
    lower.contains("commitfailed")
        || lower.contains("metadata location")
        || (lower.contains("commit") && lower.contains("conflict"))
}

pub struct WarehouseMigrator<'a> {
    source_pool: &'a ConnectionPool,
    target_pool: &'a ConnectionPool,
    copier: &'a ObjectStoreCopier,
    cache: &'a LocalCache,
    source_bucket: String,
    target_bucket: String,
    batch_size: usize,
    parallel_inserts: usize,
}

impl<'a> WarehouseMigrator<'a> {
    pub fn new(
        source_pool: &'a ConnectionPool,
        target_pool: &'a ConnectionPool,
        copier: &'a ObjectStoreCopier,
        cache: &'a LocalCache,
        source_bucket: impl Into<String>,
        target_bucket: impl Into<String>,
    ) -> Self {
        Self {
            source_pool,
            target_pool,
            copier,
            cache,
            source_bucket: source_bucket.into(),
            target_bucket: target_bucket.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            parallel_inserts: DEFAULT_PARALLEL_INSERTS,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_parallel_inserts(mut self, parallel_inserts: usize) -> Self {
        self.parallel_inserts = parallel_inserts.max(1);
        self
    }

    pub async fn migrate(&self, job: &TableJob) -> MigrationResult {
        let method = resolve_method(job);
        let mut result = MigrationResult::new(&job.source_schema, &job.source_table);
        result.method = Some(method);

        let outcome = match method {
            MigrationMethod::ObjectCopy => self.object_copy(job, &mut result).await,
            MigrationMethod::ExtractLoad => self.extract_load(job, &mut result).await,
        };
        if let Err(e) = outcome {
            result.fail(e.to_string());
        }
        result
    }

    /// §4.7.1: delete-target-first, copy (whole prefix or filtered
    /// partitions), ensure schema, drop+recreate/register target table.
    async fn object_copy(&self, job: &TableJob, result: &mut MigrationResult) -> anyhow::Result<()> {
        let inspector = SchemaInspector::new(self.source_pool);
        let descriptor = inspector
            .describe_table(
                job.source_catalog.as_deref().unwrap_or(""),
                &job.source_schema,
                &job.source_table,
            )
            .await?;

        let (src_bucket, src_prefix) = descriptor
            .bucket_and_prefix()
            .ok_or_else(|| anyhow::anyhow!("no resolvable location for {}", descriptor.full_name()))?;
        let target_catalog = job.resolved_target_catalog().unwrap_or("").to_string();
        let target_schema = job.resolved_target_schema().to_string();
        let target_table = job.resolved_target_table().to_string();
        let dst_prefix = src_prefix.clone();

        tracing::info!(
            src = %format!("s3://{src_bucket}/{src_prefix}"),
            dst = %format!("s3://{}/{dst_prefix}", self.target_bucket),
            "object-copy source/destination resolved"
        );

        self.copier
            .delete_prefix(&self.target_bucket, &dst_prefix, Side::Target)
            .await?;

        if descriptor.is_partitioned() {
            let partitions = descriptor.partitions.clone().unwrap_or_default();
            let matching: Vec<Vec<(String, String)>> = partitions
                .into_iter()
                .filter(|partition| {
                    job.partition_filter.iter().all(|pred| {
                        partition
                            .get(&pred.column)
                            .map(|v| predicate_matches(pred, v))
                            .unwrap_or(false)
                    })
                })
                .map(|p| p.into_iter().collect())
                .collect();

            let copy_results = self
                .copier
                .copy_partitions(
                    &src_bucket,
                    &src_prefix,
                    &self.target_bucket,
                    &dst_prefix,
                    &matching,
                    crate::object_copier::DEFAULT_PARTITION_PARALLELISM,
                    false,
                )
                .await;
            result.partitions = copy_results.len() as u64;
            for copy in copy_results {
                result.files += copy.files;
                result.bytes += copy.bytes;
                if copy.status == CopyStatus::Error {
                    if let Some(err) = copy.first_error {
                        result.push_error(err);
                    }
                }
            }
        } else {
            let copy = self
                .copier
                .copy_prefix(
                    &src_bucket,
                    &src_prefix,
                    &self.target_bucket,
                    &dst_prefix,
                    crate::object_copier::DEFAULT_COPY_PARALLELISM,
                    false,
                )
                .await;
            result.files = copy.files;
            result.bytes = copy.bytes;
            if copy.status == CopyStatus::Error {
                if let Some(err) = copy.first_error {
                    result.push_error(err);
                }
            }
        }

        let schema_location = format!("s3a://{}/warehouse/{target_schema}.db", self.target_bucket);
        let create_schema_sql =
            format!("CREATE SCHEMA IF NOT EXISTS {target_catalog}.{target_schema} WITH (location = '{schema_location}')");
        self.target_pool.execute(&create_schema_sql).await?;

        let drop_sql = format!("DROP TABLE IF EXISTS {target_catalog}.{target_schema}.{target_table}");
        self.target_pool.execute(&drop_sql).await?;

        if is_iceberg_catalog(&target_catalog) {
            let register_sql = format!(
                "CALL {target_catalog}.system.register_table('{target_schema}', '{target_table}', 's3://{}/{dst_prefix}')",
                self.target_bucket
            );
            self.target_pool.execute(&register_sql).await?;
        } else {
            let new_triple = format!("{target_catalog}.{target_schema}.{target_table}");
            let new_location = format!("s3a://{}/{dst_prefix}", self.target_bucket);
            let ddl = migrate_db::rewrite_ddl(&descriptor.ddl, &new_triple, Some(&new_location));
            self.target_pool.execute(&ddl).await?;
            if descriptor.is_partitioned() {
                let sync_sql = format!(
                    "CALL {target_catalog}.system.sync_partition_metadata('{target_schema}', '{target_table}', 'FULL')"
                );
                if let Err(e) = self.target_pool.execute(&sync_sql).await {
                    result.push_error(format!("sync_partition_metadata failed: {e}"));
                }
            }
        }

        Ok(())
    }

    /// §4.7.2: cache-aware extract, ensure+recreate target, chunked
    /// parallel literal-INSERT load with commit-conflict retry.
    async fn extract_load(&self, job: &TableJob, result: &mut MigrationResult) -> anyhow::Result<()> {
        let source_catalog = job.source_catalog.as_deref().unwrap_or("");
        let target_catalog = job.resolved_target_catalog().unwrap_or("").to_string();
        let target_schema = job.resolved_target_schema().to_string();
        let target_table = job.resolved_target_table().to_string();

        let (rows, descriptor) = self.extract_cache_aware(job, source_catalog).await?;
        result.fetched = rows.len() as u64;

        let create_schema_sql = format!("CREATE SCHEMA IF NOT EXISTS {target_catalog}.{target_schema}");
        self.target_pool.execute(&create_schema_sql).await?;
        let drop_sql = format!("DROP TABLE IF EXISTS {target_catalog}.{target_schema}.{target_table}");
        self.target_pool.execute(&drop_sql).await?;

        let column_defs: Vec<String> = descriptor
            .columns
            .iter()
            .map(|c| format!("{} {}", c.name, c.declared_type))
            .collect();
        let create_sql = if is_iceberg_catalog(&target_catalog) {
            format!(
                "CREATE TABLE {target_catalog}.{target_schema}.{target_table} ({})",
                column_defs.join(", ")
            )
        } else {
            let format = descriptor.format.clone().unwrap_or_else(|| "PARQUET".to_string());
            format!(
                "CREATE TABLE {target_catalog}.{target_schema}.{target_table} ({}) WITH (format = '{format}')",
                column_defs.join(", ")
            )
        };
        self.target_pool.execute(&create_sql).await?;

        let columns: Vec<String> = rows
            .first()
            .map(|r| r.column_names().map(str::to_string).collect())
            .unwrap_or_default();

        let chunks: Vec<&[Row]> = rows.chunks(self.batch_size).collect();
        let full_table = format!("{target_catalog}.{target_schema}.{target_table}");

        let mut batch_futures = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            batch_futures.push(self.load_batch_with_retry(&full_table, &columns, chunk));
        }

        // Up to `parallel_inserts` batch-INSERTs in flight at once.
        let results = futures::stream::iter(batch_futures)
            .buffer_unordered(self.parallel_inserts)
            .collect::<Vec<_>>()
            .await;

        for batch_result in results {
            match batch_result {
                Ok(inserted) => result.inserted += inserted,
                Err(e) => result.push_error(e.to_string()),
            }
        }

        Ok(())
    }

    async fn extract_cache_aware(
        &self,
        job: &TableJob,
        source_catalog: &str,
    ) -> anyhow::Result<(Vec<Row>, migrate_core::TableDescriptor)> {
        let inspector = SchemaInspector::new(self.source_pool);
        let descriptor = inspector
            .describe_table(source_catalog, &job.source_schema, &job.source_table)
            .await?;

        if self.cache.exists(source_catalog, &job.source_schema, &job.source_table) {
            let (rows, _meta) = self.cache.load(source_catalog, &job.source_schema, &job.source_table)?;
            return Ok((rows, descriptor));
        }

        let where_clause = job
            .where_clause
            .as_deref()
            .map(|w| format!(" WHERE {w}"))
            .unwrap_or_default();
        let select_sql = format!(
            "SELECT * FROM {source_catalog}.{}.{}{where_clause}",
            job.source_schema, job.source_table
        );
        // No streaming here: the known size limitation of EXTRACT_LOAD
        // (spec §9, preserved per the Open Question decision).
        let rows = self.source_pool.query_all(&select_sql).await?;

        let columns: Vec<(String, String)> = descriptor
            .columns
            .iter()
            .map(|c| (c.name.clone(), c.declared_type.clone()))
            .collect();
        self.cache.save(
            source_catalog,
            &job.source_schema,
            &job.source_table,
            &rows,
            &columns,
            Some(descriptor.ddl.clone()),
        )?;

        Ok((rows, descriptor))
    }

    /// Exponential backoff starting at 200 ms, doubling, capped at 120 s,
    /// jitter factor in [0.5, 1.5], up to 8 attempts (spec §4.7.2 step 5).
    async fn load_batch_with_retry(
        &self,
        full_table: &str,
        columns: &[String],
        rows: &[Row],
    ) -> anyhow::Result<u64> {
        let tuples: Vec<String> = rows
            .iter()
            .map(|r| migrate_core::encode_values_tuple(columns, r))
            .collect();
        let col_list = columns.join(", ");
        let insert_sql = format!(
            "INSERT INTO {full_table} ({col_list}) VALUES {}",
            tuples.join(", ")
        );

        let mut attempt = 0u32;
        let mut backoff = COMMIT_RETRY_BASE;
        loop {
            match self.target_pool.execute(&insert_sql).await {
                Ok(_) => return Ok(rows.len() as u64),
                Err(e) if is_commit_conflict(&e.to_string()) && attempt + 1 < MAX_COMMIT_RETRY_ATTEMPTS => {
                    attempt += 1;
                    let jitter = rand::thread_rng().gen_range(0.5..=1.5);
                    let sleep_for = backoff.mul_f64(jitter).min(COMMIT_RETRY_CAP);
                    tracing::warn!(attempt, ?sleep_for, "commit conflict, retrying batch");
                    tokio::time::sleep(sleep_for).await;
                    backoff = (backoff * 2).min(COMMIT_RETRY_CAP);
                }
                Err(e) => return Err(anyhow::anyhow!(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_copy_switches_to_extract_load_for_iceberg_target() {
        let job = TableJob {
            source_catalog: Some("hive".to_string()),
            source_schema: "s".to_string(),
            source_table: "t".to_string(),
            target_catalog: Some("iceberg".to_string()),
            target_schema: None,
            target_table: None,
            method: MigrationMethod::ObjectCopy,
            partition_filter: vec![],
            where_clause: None,
            row_limit: None,
        };
        assert_eq!(resolve_method(&job), MigrationMethod::ExtractLoad);
    }

    #[test]
    fn commit_conflict_detection_matches_known_substrings() {
        assert!(is_commit_conflict("CommitFailedException: ..."));
        assert!(is_commit_conflict("metadata location changed"));
        assert!(is_commit_conflict("Commit conflict detected"));
        assert!(!is_commit_conflict("syntax error near SELECT"));
    }
}
