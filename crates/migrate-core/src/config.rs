//! Environment-sourced configuration (spec §6, §4.12). Loaded once, eagerly,
//! before any connection opens; every field is overridable by a CLI flag and
//! carries a compiled-in default, matching `SourceDBSettings`/
//! `TargetDBSettings` in the source project's `mysql_migration/config.py`.

use crate::{MigrateError, Result};
use serde::Deserialize;

/// Connection parameters for one relational or query-engine endpoint.
/// Immutable after construction (spec §3).
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub secret: String,
    pub database: Option<String>,
    #[serde(default = "default_charset")]
    pub charset: String,
}

fn default_charset() -> String {
    "utf8mb4".to_string()
}

impl ConnectionTarget {
    /// Secrets never print verbatim (spec §8, ambient-stack property).
    pub fn redacted(&self) -> String {
        format!(
            "{}@{}:{}/{}",
            self.user,
            self.host,
            self.port,
            self.database.as_deref().unwrap_or("-")
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObjectStoreEndpoint {
    pub endpoint_url: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowEngineConfig {
    pub base_url: String,
    #[serde(default)]
    pub token: String,
}

/// The resolved environment: up to four connection targets, two object-store
/// endpoints, and the auxiliary failure checker's workflow-engine endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub source_db: ConnectionTarget,
    pub target_db: ConnectionTarget,
    pub source_engine: ConnectionTarget,
    pub target_engine: ConnectionTarget,
    pub source_store: ObjectStoreEndpoint,
    pub target_store: ObjectStoreEndpoint,
    pub workflow_engine: WorkflowEngineConfig,
    #[serde(default)]
    pub cache_root: Option<String>,
}

impl Config {
    /// Builds the layered `config::Config` (environment, `MIGRATE_` prefixed,
    /// double-underscore nested keys) over compiled-in defaults, then
    /// deserializes into this struct. Returns `MigrateError::Config` on any
    /// malformed value so the caller never opens a connection against a
    /// half-parsed environment.
    pub fn load() -> Result<Self> {
        let defaults = serde_json::json!({
            "source_db": {"host": "localhost", "port": 3306, "user": "user", "secret": "password", "database": null, "charset": "utf8mb4"},
            "target_db": {"host": "localhost", "port": 3307, "user": "migrate", "secret": "migrate123", "database": null, "charset": "utf8mb4"},
            "source_engine": {"host": "localhost", "port": 8080, "user": "engine", "secret": "", "database": null, "charset": "utf8mb4"},
            "target_engine": {"host": "localhost", "port": 8081, "user": "engine", "secret": "", "database": null, "charset": "utf8mb4"},
            "source_store": {"endpoint_url": "http://localhost:9000", "region": "us-east-1", "access_key": "minioadmin", "secret_key": "minioadmin"},
            "target_store": {"endpoint_url": "http://localhost:9001", "region": "us-east-1", "access_key": "minioadmin", "secret_key": "minioadmin"},
            "workflow_engine": {"base_url": "http://localhost:8793", "token": ""},
            "cache_root": "./cache",
        });

        let built = config::Config::builder()
            .add_source(config::File::from_str(
                &defaults.to_string(),
                config::FileFormat::Json,
            ))
            .add_source(
                config::Environment::with_prefix("MIGRATE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| MigrateError::Config(e.to_string()))?;

        built
            .try_deserialize()
            .map_err(|e| MigrateError::Config(e.to_string()))
    }
}
