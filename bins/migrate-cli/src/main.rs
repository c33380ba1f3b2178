//! Command-line entrypoint (C11, spec §4.11).

mod cli;
mod orchestrator;

use clap::Parser;
use cli::{Command, MigrateTarget};
use migrate_core::config::Config;
use migrate_core::{MigrationResult, Plan, Reporter};
use migrate_db::{ConnectionPool, RelationalMigrator, RelationalTableJob, SchemaInspector};
use migrate_lake::{LocalCache, ObjectStoreCopier, WarehouseMigrator};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SQL_SCHEME: &str = "mysql";
const POOL_SIZE: u32 = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = cli::Args::parse();
    let reporter = Reporter::new(true);

    let results = match &args.command {
        Command::ShowConfig => {
            let cfg = Config::load()?;
            print_redacted_config(&cfg);
            Vec::new()
        }
        Command::Init { warehouse, output } => {
            let text = if *warehouse { sample_warehouse_plan() } else { sample_relational_plan() };
            match output {
                Some(path) => std::fs::write(path, text)?,
                None => println!("{text}"),
            }
            Vec::new()
        }
        Command::Run { plan } => {
            let cfg = Config::load()?;
            let text = std::fs::read_to_string(plan)?;
            let parsed = Plan::load_from_str(&text)?;
            run_with_ctrl_c(|cancel| orchestrator::run_plan(&parsed, &cfg, &reporter, args.dry_run, cancel)).await?
        }
        Command::Migrate { target } => {
            let cfg = Config::load()?;
            run_with_ctrl_c(|cancel| run_direct_migrate(target, &cfg, &reporter, args.dry_run, cancel)).await?
        }
        Command::Analyze { catalog, schema, table } => {
            let cfg = Config::load()?;
            let pool = ConnectionPool::connect(&cfg.source_engine, SQL_SCHEME, POOL_SIZE).await?;
            let inspector = SchemaInspector::new(&pool);
            let descriptor = inspector
                .describe_table(catalog.as_deref().unwrap_or(""), schema, table)
                .await?;
            println!("{:#?}", descriptor);
            Vec::new()
        }
        Command::CheckConnection => {
            let cfg = Config::load()?;
            check_connections(&cfg).await;
            Vec::new()
        }
    };

    if !results.is_empty() {
        print!("{}", Reporter::summary_table(&results));
        std::process::exit(Reporter::exit_code(&results));
    }
    Ok(())
}

/// Runs `f` against a fresh [`CancellationToken`], racing it against
/// ctrl-c. On interrupt the token is cancelled so not-yet-started jobs are
/// skipped, then the original future is awaited to completion so in-flight
/// jobs still drain (spec §4.10, "Cancellation and timeouts").
async fn run_with_ctrl_c<F, Fut>(f: F) -> anyhow::Result<Vec<MigrationResult>>
where
    F: FnOnce(&CancellationToken) -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<Vec<MigrationResult>>>,
{
    let cancel = CancellationToken::new();
    let work = f(&cancel);
    tokio::pin!(work);
    tokio::select! {
        res = &mut work => res,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("ctrl-c received, cancelling not-yet-started jobs and draining in-flight ones");
            cancel.cancel();
            work.await
        }
    }
}

fn print_redacted_config(cfg: &Config) {
    println!("source_db:      {}", cfg.source_db.redacted());
    println!("target_db:      {}", cfg.target_db.redacted());
    println!("source_engine:  {}", cfg.source_engine.redacted());
    println!("target_engine:  {}", cfg.target_engine.redacted());
    println!("source_store:   {}", cfg.source_store.endpoint_url);
    println!("target_store:   {}", cfg.target_store.endpoint_url);
    println!("workflow_engine:{}", cfg.workflow_engine.base_url);
    println!("cache_root:     {}", cfg.cache_root.as_deref().unwrap_or("./cache"));
}

async fn check_connections(cfg: &Config) {
    let targets = [
        ("source_db", &cfg.source_db),
        ("target_db", &cfg.target_db),
        ("source_engine", &cfg.source_engine),
        ("target_engine", &cfg.target_engine),
    ];
    for (name, target) in targets {
        match ConnectionPool::connect(target, SQL_SCHEME, 1).await {
            Ok(pool) => println!("{name}: {}", if pool.ping().await { "OK" } else { "UNREACHABLE" }),
            Err(e) => println!("{name}: FAILED ({e})"),
        }
    }
}

async fn run_direct_migrate(
    target: &MigrateTarget,
    cfg: &Config,
    reporter: &Reporter,
    dry_run: bool,
    cancel: &CancellationToken,
) -> anyhow::Result<Vec<MigrationResult>> {
    match target {
        MigrateTarget::Database {
            name,
            target_name,
            include,
            exclude,
            where_clause,
            limit,
            truncate,
            create_tables,
        } => {
            let source_pool = ConnectionPool::connect(&cfg.source_db, SQL_SCHEME, POOL_SIZE).await?;
            let target_pool = ConnectionPool::connect(&cfg.target_db, SQL_SCHEME, POOL_SIZE).await?;
            let inspector = SchemaInspector::new(&source_pool);
            let mut tables = inspector.list_base_tables("", name).await?;
            if !include.is_empty() {
                tables.retain(|t| include.contains(t));
            }
            tables.retain(|t| !exclude.contains(t));

            let migrator = RelationalMigrator::new(&source_pool, &target_pool);
            let resolved_target = target_name.clone().unwrap_or_else(|| name.clone());
            let mut results = Vec::new();
            for table in tables {
                if cancel.is_cancelled() {
                    let mut result = MigrationResult::new(name, &table);
                    result.status = migrate_core::JobStatus::Skipped;
                    result.push_error("cancelled before start".to_string());
                    results.push(result);
                    continue;
                }
                reporter.job_started(name, &table);
                if dry_run {
                    let mut result = MigrationResult::new(name, &table);
                    result.status = migrate_core::JobStatus::DryRun;
                    results.push(result);
                    continue;
                }
                let job = RelationalTableJob {
                    source_schema: name.clone(),
                    source_table: table.clone(),
                    target_schema: resolved_target.clone(),
                    target_table: table,
                    where_clause: migrate_core::normalize_where(where_clause.as_deref()),
                    row_limit: *limit,
                    create_table: *create_tables,
                    truncate: *truncate,
                    batch_size: 1_000,
                };
                let result = migrator.migrate_table(&job).await;
                reporter.job_finished(&result);
                results.push(result);
            }
            Ok(results)
        }
        MigrateTarget::Table {
            catalog,
            schema,
            table,
            method,
            target_catalog,
            target_schema,
            target_table,
            partition_filter,
        } => {
            let source_pool = ConnectionPool::connect(&cfg.source_engine, SQL_SCHEME, POOL_SIZE).await?;
            let target_pool = ConnectionPool::connect(&cfg.target_engine, SQL_SCHEME, POOL_SIZE).await?;
            let copier = ObjectStoreCopier::new(cfg.source_store.clone(), cfg.target_store.clone());
            let cache = LocalCache::new(cfg.cache_root.clone().unwrap_or_else(|| "./cache".to_string()))?;
            let migrator = WarehouseMigrator::new(&source_pool, &target_pool, &copier, &cache, "", "");

            let job = migrate_core::TableJob {
                source_catalog: Some(catalog.clone()),
                source_schema: schema.clone(),
                source_table: table.clone(),
                target_catalog: target_catalog.clone(),
                target_schema: target_schema.clone(),
                target_table: target_table.clone(),
                method: (*method).into(),
                partition_filter: partition_filter
                    .iter()
                    .filter_map(|p| migrate_core::parse_partition_predicate(p))
                    .collect(),
                where_clause: None,
                row_limit: None,
            };

            reporter.job_started(schema, table);
            if dry_run {
                let mut result = MigrationResult::new(schema, table);
                result.status = migrate_core::JobStatus::DryRun;
                return Ok(vec![result]);
            }
            let result = migrator.migrate(&job).await;
            reporter.job_finished(&result);
            Ok(vec![result])
        }
    }
}

fn sample_relational_plan() -> &'static str {
    r#"auto_order: true
truncate: false
create_tables: true
exclude_date_tables: true
parallel: true
max_workers: 3
max_table_workers: 5
databases:
  - name: shop
    mode: ALL
    exclude: ["audit_log"]
dynamic_databases: []
"#
}

fn sample_warehouse_plan() -> &'static str {
    r#"parallel_tables: 5
parallel_partitions: 5
parallel_inserts: 4
batch_size: 1000
dry_run: false
stop_on_error: false
source_bucket: source-bucket
target_bucket: target-bucket
tables:
  - catalog: hive
    schema: events
    table: clicks
    method: OBJECT_COPY
schemas: []
"#
}
