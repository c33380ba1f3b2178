//! Object-store copier (C2), local columnar cache (C8), and the warehouse
//! table migrator (C7) that composes both with the schema inspector and DDL
//! rewriter from `migrate-db`.

pub mod cache;
pub mod object_copier;
pub mod warehouse_migrator;

pub use cache::LocalCache;
pub use object_copier::{CopyResult, CopyStatus, ObjectStoreCopier, Side, VerifyResult, VerifyStatus};
pub use warehouse_migrator::{is_iceberg_catalog, resolve_method, WarehouseMigrator};
