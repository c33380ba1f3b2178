//! Command-line surface (C11, spec §4.11). `clap` derive-based subcommands.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "migrate")]
#[command(about = "Table migration between relational databases and Hive/Iceberg warehouses")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Skip all writes; report what would have happened
    #[arg(long, global = true)]
    pub dry_run: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the resolved configuration, secrets redacted
    ShowConfig,

    /// Emit a sample YAML plan
    Init {
        #[arg(long)]
        warehouse: bool,
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Load a YAML plan and execute it
    Run {
        #[arg(short, long)]
        plan: PathBuf,
    },

    /// Migrate one database or one table directly, bypassing a plan file
    Migrate {
        #[command(subcommand)]
        target: MigrateTarget,
    },

    /// Inspect one table's schema and print its descriptor
    Analyze {
        #[arg(long)]
        catalog: Option<String>,
        #[arg(long)]
        schema: String,
        #[arg(long)]
        table: String,
    },

    /// Ping every configured endpoint and report liveness
    CheckConnection,
}

#[derive(Subcommand, Debug)]
pub enum MigrateTarget {
    /// Move every table (or an explicit include list) of one relational database
    Database {
        #[arg(long)]
        name: String,
        #[arg(long)]
        target_name: Option<String>,
        #[arg(long)]
        include: Vec<String>,
        #[arg(long)]
        exclude: Vec<String>,
        #[arg(long)]
        where_clause: Option<String>,
        #[arg(long)]
        limit: Option<u64>,
        #[arg(long)]
        truncate: bool,
        #[arg(long)]
        create_tables: bool,
    },

    /// Copy or extract-load a single warehouse table
    Table {
        #[arg(long)]
        catalog: String,
        #[arg(long)]
        schema: String,
        #[arg(long)]
        table: String,
        #[arg(long, value_enum)]
        method: MethodArg,
        #[arg(long)]
        target_catalog: Option<String>,
        #[arg(long)]
        target_schema: Option<String>,
        #[arg(long)]
        target_table: Option<String>,
        #[arg(long)]
        partition_filter: Vec<String>,
    },
}

#[derive(clap::ValueEnum, Debug, Clone, Copy)]
pub enum MethodArg {
    ObjectCopy,
    ExtractLoad,
}

impl From<MethodArg> for migrate_core::MigrationMethod {
    fn from(value: MethodArg) -> Self {
        match value {
            MethodArg::ObjectCopy => migrate_core::MigrationMethod::ObjectCopy,
            MethodArg::ExtractLoad => migrate_core::MigrationMethod::ExtractLoad,
        }
    }
}
