//! Shared types for the migrate workspace: the row/table/job data model,
//! the error enum every crate converges on, environment + YAML configuration,
//! and the `Reporter` sink that replaces the source project's console
//! singleton.
//!
//! ```yaml
//! databases:
//!   - name: shop
//!     mode: ALL
//!     exclude: ["audit_log"]
//! auto_order: true
//! ```

pub mod config;
pub mod literal;
pub mod model;
pub mod plan;
pub mod reporter;
pub mod text;

pub use config::Config;
pub use model::{
    CachedDatasetMeta, ColumnDef, ComparisonOp, DatabaseJob, DatabaseMode, DynamicDatabaseJob,
    FkEdgeSet, JobStatus, MigrationMethod, MigrationResult, PartitionPredicate, Row, RowValue,
    TableDescriptor, TableJob, UserPartitionMode,
};
pub use literal::{encode_sql_literal, encode_values_tuple};
pub use plan::{Plan, RelationalPlan, WarehousePlan};
pub use reporter::Reporter;
pub use text::{
    build_user_filter, is_date_suffixed, normalize_where, parse_partition_predicate,
    predicate_matches,
};

use thiserror::Error;

/// The error kinds from ERROR HANDLING DESIGN. Internal functions mostly
/// propagate `anyhow::Error` and attach context as they unwind; only crate
/// boundaries (the orchestrator, the CLI) convert into a specific variant.
#[derive(Error, Debug)]
pub enum MigrateError {
    #[error("config error: {0}")]
    Config(String),

    #[error("connect error: {0}")]
    Connect(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("transient data error: {0}")]
    TransientData(String),

    #[error("verification error: {0}")]
    Verification(String),

    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, MigrateError>;
