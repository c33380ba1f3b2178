//! Relational connection pool (C1), schema inspector (C3), DDL rewriter
//! (C4), relational table migrator (C6), dynamic job expander (C9), and the
//! auxiliary failure checker (C14).

pub mod ddl;
pub mod dynamic;
pub mod failure_checker;
pub mod inspector;
pub mod migrator;
pub mod pool;

pub use ddl::rewrite_ddl;
pub use failure_checker::{ApiFailureChecker, DbFailureChecker, FailedRun, FailureChecker};
pub use inspector::SchemaInspector;
pub use migrator::{RelationalMigrator, RelationalTableJob};
pub use pool::ConnectionPool;
