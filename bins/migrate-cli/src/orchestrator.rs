//! Orchestrator (C10, spec §4.10): walks a loaded plan with bounded
//! db-level and table-level concurrency, converts every job's failure into
//! an ERROR result rather than propagating it, and returns the aggregate
//! result list for the `Reporter` to render.
//!
//! The query-engine endpoints (`source_engine`/`target_engine`) are opened
//! through `sqlx::Any`'s `mysql` wire driver. Neither `sqlx` nor the example
//! corpus carries a Trino/Presto driver crate, so warehouse connectivity is
//! modeled the same way the relational side is; a production deployment
//! would sit a MySQL-wire-compatible proxy in front of the query engine.

use futures::stream::{self, StreamExt};
use migrate_core::config::Config;
use migrate_core::{
    parse_partition_predicate, DatabaseJob, DatabaseMode, JobStatus, MigrationResult, Plan,
    Reporter, TableJob, UserPartitionMode,
};
use migrate_core::plan::{DatabaseSpec, DynamicDatabaseSpec, RelationalPlan, SchemaSpec, TableSpec, WarehousePlan};
use migrate_db::{ConnectionPool, RelationalMigrator, RelationalTableJob, SchemaInspector};
use migrate_lake::{LocalCache, ObjectStoreCopier, WarehouseMigrator};
use regex::Regex;
use tokio_util::sync::CancellationToken;

const SQL_SCHEME: &str = "mysql";
const POOL_SIZE: u32 = 10;

pub async fn run_plan(
    plan: &Plan,
    cfg: &Config,
    reporter: &Reporter,
    dry_run: bool,
    cancel: &CancellationToken,
) -> anyhow::Result<Vec<MigrationResult>> {
    match plan {
        Plan::Relational(p) => run_relational_plan(p, cfg, reporter, dry_run, cancel).await,
        Plan::Warehouse(p) => run_warehouse_plan(p, cfg, reporter, dry_run, cancel).await,
    }
}

/// `true` once `cancel` (or an ancestor token) has fired. Checked before a
/// job starts, never mid-job: in-flight work drains rather than aborting
/// (spec §4.10, "Cancellation and timeouts").
fn cancelled_result(database: &str, table: &str) -> MigrationResult {
    let mut result = MigrationResult::new(database, table);
    result.status = JobStatus::Skipped;
    result.push_error("cancelled before start".to_string());
    result
}

fn database_spec_to_job(spec: &DatabaseSpec, plan: &RelationalPlan) -> DatabaseJob {
    let mut per_table_where = std::collections::BTreeMap::new();
    let mut per_table_limit = std::collections::BTreeMap::new();
    for entry in &spec.tables {
        if let migrate_core::plan::TableEntry::Detailed { name, where_clause, limit } = entry {
            if let Some(w) = where_clause {
                per_table_where.insert(name.clone(), w.clone());
            }
            if let Some(l) = limit {
                per_table_limit.insert(name.clone(), *l);
            }
        }
    }
    let include = if spec.mode == DatabaseMode::Explicit {
        spec.tables.iter().map(|t| t.name().to_string()).collect()
    } else {
        Vec::new()
    };
    DatabaseJob {
        source_name: spec.name.clone(),
        target_name: spec.target_name.clone(),
        mode: spec.mode,
        include,
        exclude_exact: spec.exclude.clone(),
        exclude_regex: spec.exclude_regex.clone(),
        default_where: spec.where_clause.clone(),
        default_limit: spec.limit,
        exclude_date_tables: spec.exclude_date_tables.unwrap_or(plan.exclude_date_tables),
        user_partition: (spec.laplace_mode && !spec.user_ids.is_empty())
            .then(|| UserPartitionMode { user_ids: spec.user_ids.clone() }),
        truncate: plan.truncate,
        create_tables: plan.create_tables,
        per_table_where,
        per_table_limit,
    }
}

fn dynamic_spec_to_base_job(spec: &DynamicDatabaseSpec, plan: &RelationalPlan) -> DatabaseJob {
    let mut per_table_where = std::collections::BTreeMap::new();
    let mut per_table_limit = std::collections::BTreeMap::new();
    for entry in &spec.tables {
        if let migrate_core::plan::TableEntry::Detailed { name, where_clause, limit } = entry {
            if let Some(w) = where_clause {
                per_table_where.insert(name.clone(), w.clone());
            }
            if let Some(l) = limit {
                per_table_limit.insert(name.clone(), *l);
            }
        }
    }
    let include = if spec.mode == DatabaseMode::Explicit {
        spec.tables.iter().map(|t| t.name().to_string()).collect()
    } else {
        Vec::new()
    };
    DatabaseJob {
        // placeholder names, overwritten per expanded row by migrate_db::dynamic::expand
        source_name: spec.pattern.clone(),
        target_name: spec.target_pattern.clone(),
        mode: spec.mode,
        include,
        exclude_exact: spec.exclude.clone(),
        exclude_regex: spec.exclude_regex.clone(),
        default_where: spec.where_clause.clone(),
        default_limit: spec.limit,
        exclude_date_tables: spec.exclude_date_tables.unwrap_or(plan.exclude_date_tables),
        user_partition: (!spec.user_ids.is_empty())
            .then(|| UserPartitionMode { user_ids: spec.user_ids.clone() }),
        truncate: plan.truncate,
        create_tables: plan.create_tables,
        per_table_where,
        per_table_limit,
    }
}

/// Resolves the concrete table set for one database job: enumerate base
/// tables, filter by include/exclude/date-suffix, and FK-schedule them into
/// levels (spec §4.5, §4.10).
async fn resolve_table_levels(
    source_pool: &ConnectionPool,
    job: &DatabaseJob,
) -> anyhow::Result<Vec<Vec<String>>> {
    let inspector = SchemaInspector::new(source_pool);
    let all_tables = inspector.list_base_tables("", &job.source_name).await?;

    let exclude_regexes: Vec<Regex> = job
        .exclude_regex
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect();

    let tables: Vec<String> = all_tables
        .into_iter()
        .filter(|t| job.include.is_empty() || job.include.contains(t))
        .filter(|t| !job.exclude_exact.contains(t))
        .filter(|t| !exclude_regexes.iter().any(|r| r.is_match(t)))
        .filter(|t| !job.exclude_date_tables || !migrate_core::is_date_suffixed(t))
        .collect();

    let edges = inspector.fetch_fk_edges("", &job.source_name, &tables).await?;
    let schedule = migrate_schedule::schedule_levels(&tables, &edges);
    Ok(schedule.levels)
}

/// Only tables with a `user_id` column get the partition predicate; others
/// keep their original WHERE clause (spec §4.6, test 4).
async fn resolve_user_id_tables(
    source_pool: &ConnectionPool,
    job: &DatabaseJob,
    tables: &[String],
) -> std::collections::HashSet<String> {
    let mut has_user_id = std::collections::HashSet::new();
    if job.user_partition.is_none() {
        return has_user_id;
    }
    let inspector = SchemaInspector::new(source_pool);
    for table in tables {
        match inspector.fetch_columns("", &job.source_name, table).await {
            Ok(columns) => {
                if columns.iter().any(|c| c.name.eq_ignore_ascii_case("user_id")) {
                    has_user_id.insert(table.clone());
                }
            }
            Err(e) => {
                tracing::warn!(table = %table, error = %e, "failed to introspect columns for user-partition check");
            }
        }
    }
    has_user_id
}

fn build_relational_job(job: &DatabaseJob, table: &str, has_user_id: bool) -> RelationalTableJob {
    let override_where = job
        .per_table_where
        .get(table)
        .map(String::as_str)
        .or(job.default_where.as_deref());
    let where_clause = match &job.user_partition {
        Some(user) if has_user_id => migrate_core::build_user_filter(&user.user_ids, override_where),
        _ => migrate_core::normalize_where(override_where),
    };
    RelationalTableJob {
        source_schema: job.source_name.clone(),
        source_table: table.to_string(),
        target_schema: job.resolved_target_name().to_string(),
        target_table: table.to_string(),
        where_clause,
        row_limit: job.per_table_limit.get(table).copied().or(job.default_limit),
        create_table: job.create_tables,
        truncate: job.truncate,
        batch_size: 1_000,
    }
}

async fn migrate_one_database(
    source_pool: &ConnectionPool,
    target_pool: &ConnectionPool,
    job: &DatabaseJob,
    reporter: &Reporter,
    max_table_workers: usize,
    dry_run: bool,
    cancel: &CancellationToken,
) -> Vec<MigrationResult> {
    if cancel.is_cancelled() {
        return vec![cancelled_result(&job.source_name, "*")];
    }
    let levels = match resolve_table_levels(source_pool, job).await {
        Ok(levels) => levels,
        Err(e) => {
            let mut result = MigrationResult::new(&job.source_name, "*");
            result.fail(format!("table resolution failed: {e}"));
            return vec![result];
        }
    };

    if !dry_run {
        let create_sql = format!("CREATE DATABASE IF NOT EXISTS {}", job.resolved_target_name());
        if let Err(e) = target_pool.execute(&create_sql).await {
            let mut result = MigrationResult::new(&job.source_name, "*");
            result.fail(format!("failed to create target database: {e}"));
            return vec![result];
        }
    }

    let all_tables: Vec<String> = levels.iter().flatten().cloned().collect();
    let user_id_tables = std::sync::Arc::new(resolve_user_id_tables(source_pool, job, &all_tables).await);

    let migrator = RelationalMigrator::new(source_pool, target_pool);
    let mut results = Vec::new();
    for level in levels {
        if cancel.is_cancelled() {
            results.extend(
                level
                    .into_iter()
                    .map(|table| cancelled_result(&job.source_name, &table)),
            );
            continue;
        }
        let level_results: Vec<MigrationResult> = stream::iter(level.into_iter().map(|table| {
            let job = job.clone();
            let migrator = &migrator;
            let reporter = reporter;
            let table_cancel = cancel.child_token();
            let user_id_tables = user_id_tables.clone();
            async move {
                if table_cancel.is_cancelled() {
                    return cancelled_result(&job.source_name, &table);
                }
                reporter.job_started(&job.source_name, &table);
                if dry_run {
                    let mut result = MigrationResult::new(&job.source_name, &table);
                    result.status = JobStatus::DryRun;
                    return result;
                }
                let has_user_id = user_id_tables.contains(&table);
                let table_job = build_relational_job(&job, &table, has_user_id);
                let result = migrator.migrate_table(&table_job).await;
                reporter.job_finished(&result);
                result
            }
        }))
        .buffer_unordered(max_table_workers.max(1))
        .collect()
        .await;
        results.extend(level_results);
    }
    results
}

pub async fn run_relational_plan(
    plan: &RelationalPlan,
    cfg: &Config,
    reporter: &Reporter,
    dry_run: bool,
    cancel: &CancellationToken,
) -> anyhow::Result<Vec<MigrationResult>> {
    let source_pool = ConnectionPool::connect(&cfg.source_db, SQL_SCHEME, POOL_SIZE).await?;
    let target_pool = ConnectionPool::connect(&cfg.target_db, SQL_SCHEME, POOL_SIZE).await?;

    let mut jobs: Vec<DatabaseJob> = plan.databases.iter().map(|s| database_spec_to_job(s, plan)).collect();
    for dynamic in &plan.dynamic_databases {
        let base = dynamic_spec_to_base_job(dynamic, plan);
        let dynamic_job = migrate_core::model::DynamicDatabaseJob {
            source_template: dynamic.pattern.clone(),
            target_template: dynamic.target_pattern.clone(),
            lookup_database: dynamic.lookup_query.database.clone(),
            lookup_sql: dynamic.lookup_query.sql.clone(),
            base,
        };
        match migrate_db::dynamic::expand(&source_pool, &dynamic_job).await {
            Ok(expanded) => jobs.extend(expanded),
            Err(e) => tracing::error!(pattern = %dynamic.pattern, error = %e, "dynamic database expansion failed"),
        }
    }

    let max_db_workers = plan.max_workers.max(1);
    let max_table_workers = plan.max_table_workers.max(1);

    let per_db: Vec<Vec<MigrationResult>> = stream::iter(jobs.iter().map(|job| {
        let source_pool = &source_pool;
        let target_pool = &target_pool;
        let reporter = reporter;
        let db_cancel = cancel.child_token();
        async move {
            migrate_one_database(
                source_pool,
                target_pool,
                job,
                reporter,
                max_table_workers,
                dry_run,
                &db_cancel,
            )
            .await
        }
    }))
    .buffer_unordered(max_db_workers)
    .collect()
    .await;

    Ok(per_db.into_iter().flatten().collect())
}

fn table_spec_to_job(spec: &TableSpec) -> TableJob {
    TableJob {
        source_catalog: Some(spec.catalog.clone()),
        source_schema: spec.schema.clone(),
        source_table: spec.table.clone(),
        target_catalog: spec.target_catalog.clone(),
        target_schema: spec.target_schema.clone(),
        target_table: spec.target_table.clone(),
        method: spec.method,
        partition_filter: spec.partition_filter.iter().filter_map(|p| parse_partition_predicate(p)).collect(),
        where_clause: spec.where_clause.clone(),
        row_limit: None,
    }
}

async fn expand_schema_spec(source_pool: &ConnectionPool, spec: &SchemaSpec) -> anyhow::Result<Vec<TableJob>> {
    let inspector = SchemaInspector::new(source_pool);
    let include_regexes: Vec<Regex> = spec.include_regex.iter().filter_map(|p| Regex::new(p).ok()).collect();
    let mut jobs = Vec::new();
    for schema_name in spec.schema.clone().into_vec() {
        let tables = inspector.list_base_tables(&spec.catalog, &schema_name).await?;
        for table in tables {
            if !spec.exclude.is_empty() && spec.exclude.contains(&table) {
                continue;
            }
            let matches_include = spec.include.is_empty() && include_regexes.is_empty()
                || spec.include.contains(&table)
                || include_regexes.iter().any(|r| r.is_match(&table));
            if !matches_include {
                continue;
            }
            jobs.push(TableJob {
                source_catalog: Some(spec.catalog.clone()),
                source_schema: schema_name.clone(),
                source_table: table,
                target_catalog: spec.target_catalog.clone(),
                target_schema: spec.target_schema.clone(),
                target_table: None,
                method: spec.method,
                partition_filter: spec.partition_filter.iter().filter_map(|p| parse_partition_predicate(p)).collect(),
                where_clause: None,
                row_limit: None,
            });
        }
    }
    Ok(jobs)
}

pub async fn run_warehouse_plan(
    plan: &WarehousePlan,
    cfg: &Config,
    reporter: &Reporter,
    dry_run: bool,
    cancel: &CancellationToken,
) -> anyhow::Result<Vec<MigrationResult>> {
    let source_pool = ConnectionPool::connect(&cfg.source_engine, SQL_SCHEME, POOL_SIZE).await?;
    let target_pool = ConnectionPool::connect(&cfg.target_engine, SQL_SCHEME, POOL_SIZE).await?;
    let copier = ObjectStoreCopier::new(cfg.source_store.clone(), cfg.target_store.clone());
    let cache_root = cfg.cache_root.clone().unwrap_or_else(|| "./cache".to_string());
    let cache = LocalCache::new(cache_root)?;

    let source_bucket = plan.source_bucket.clone().unwrap_or_default();
    let target_bucket = plan.target_bucket.clone().unwrap_or_default();

    let mut jobs: Vec<TableJob> = plan.tables.iter().map(table_spec_to_job).collect();
    for schema in &plan.schemas {
        match expand_schema_spec(&source_pool, schema).await {
            Ok(expanded) => jobs.extend(expanded),
            Err(e) => tracing::error!(catalog = %schema.catalog, error = %e, "schema expansion failed"),
        }
    }

    let migrator = WarehouseMigrator::new(&source_pool, &target_pool, &copier, &cache, source_bucket, target_bucket)
        .with_batch_size(plan.batch_size)
        .with_parallel_inserts(plan.parallel_inserts);

    // `stop_on_error` only stops jobs not yet started; in-flight jobs still
    // complete (spec §4.10 bounds the pool, it does not describe cancellation).
    let stop_flag = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let stop_on_error = plan.stop_on_error;

    let results: Vec<MigrationResult> = stream::iter(jobs.iter().map(|job| {
        let migrator = &migrator;
        let reporter = reporter;
        let stop_flag = stop_flag.clone();
        let job_cancel = cancel.child_token();
        async move {
            if job_cancel.is_cancelled() {
                return cancelled_result(&job.source_schema, &job.source_table);
            }
            if stop_on_error && stop_flag.load(std::sync::atomic::Ordering::Relaxed) {
                let mut result = MigrationResult::new(&job.source_schema, &job.source_table);
                result.status = JobStatus::Skipped;
                return result;
            }
            reporter.job_started(&job.source_schema, &job.source_table);
            if dry_run {
                let mut result = MigrationResult::new(&job.source_schema, &job.source_table);
                result.status = JobStatus::DryRun;
                return result;
            }
            let result = migrator.migrate(job).await;
            reporter.job_finished(&result);
            if stop_on_error && result.status == JobStatus::Error {
                stop_flag.store(true, std::sync::atomic::Ordering::Relaxed);
            }
            result
        }
    }))
    .buffer_unordered(plan.parallel_tables.max(1))
    .collect()
    .await;

    Ok(results)
}
