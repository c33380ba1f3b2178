//! YAML plan file parsing (spec §6, §4.12) and pre-I/O validation.
//!
//! A plan has exactly one of the two shapes below; the `run` verb picks the
//! shape by looking at which top-level keys are present (DESIGN.md, ambient
//! open questions).

use crate::model::{DatabaseMode, MigrationMethod};
use crate::{MigrateError, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TableEntry {
    Name(String),
    Detailed {
        name: String,
        #[serde(rename = "where")]
        where_clause: Option<String>,
        limit: Option<u64>,
    },
}

impl TableEntry {
    pub fn name(&self) -> &str {
        match self {
            TableEntry::Name(name) => name,
            TableEntry::Detailed { name, .. } => name,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_workers() -> usize {
    3
}

fn default_max_table_workers() -> usize {
    5
}

fn default_batch_size() -> usize {
    1_000
}

fn default_parallel_inserts() -> usize {
    4
}

fn default_parallel_partitions() -> usize {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSpec {
    pub name: String,
    pub target_name: Option<String>,
    pub mode: DatabaseMode,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub exclude_regex: Vec<String>,
    #[serde(default)]
    pub tables: Vec<TableEntry>,
    #[serde(rename = "where")]
    pub where_clause: Option<String>,
    pub limit: Option<u64>,
    #[serde(default)]
    pub exclude_date_tables: Option<bool>,
    #[serde(default)]
    pub laplace_mode: bool,
    #[serde(default)]
    pub user_ids: Vec<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LookupQuery {
    pub database: String,
    pub sql: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DynamicDatabaseSpec {
    pub pattern: String,
    pub target_pattern: Option<String>,
    pub lookup_query: LookupQuery,
    pub mode: DatabaseMode,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub exclude_regex: Vec<String>,
    #[serde(default)]
    pub tables: Vec<TableEntry>,
    #[serde(rename = "where")]
    pub where_clause: Option<String>,
    pub limit: Option<u64>,
    #[serde(default)]
    pub exclude_date_tables: Option<bool>,
    #[serde(default)]
    pub user_ids: Vec<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelationalPlan {
    #[serde(default = "default_true")]
    pub auto_order: bool,
    #[serde(default)]
    pub truncate: bool,
    #[serde(default)]
    pub create_tables: bool,
    #[serde(default)]
    pub exclude_date_tables: bool,
    #[serde(default = "default_true")]
    pub parallel: bool,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_max_table_workers")]
    pub max_table_workers: usize,
    #[serde(default)]
    pub databases: Vec<DatabaseSpec>,
    #[serde(default)]
    pub dynamic_databases: Vec<DynamicDatabaseSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableSpec {
    pub catalog: String,
    pub schema: String,
    pub table: String,
    pub method: MigrationMethod,
    #[serde(default)]
    pub partition_filter: Vec<String>,
    #[serde(rename = "where")]
    pub where_clause: Option<String>,
    pub target_catalog: Option<String>,
    pub target_schema: Option<String>,
    pub target_table: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SchemaNameOrList {
    One(String),
    Many(Vec<String>),
}

impl SchemaNameOrList {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            SchemaNameOrList::One(s) => vec![s],
            SchemaNameOrList::Many(v) => v,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchemaSpec {
    pub catalog: String,
    pub schema: SchemaNameOrList,
    pub method: MigrationMethod,
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub include_regex: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub partition_filter: Vec<String>,
    pub target_catalog: Option<String>,
    pub target_schema: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WarehousePlan {
    #[serde(default = "default_max_table_workers")]
    pub parallel_tables: usize,
    #[serde(default = "default_parallel_partitions")]
    pub parallel_partitions: usize,
    #[serde(default = "default_parallel_inserts")]
    pub parallel_inserts: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub stop_on_error: bool,
    pub source_bucket: Option<String>,
    pub target_bucket: Option<String>,
    #[serde(default)]
    pub tables: Vec<TableSpec>,
    #[serde(default)]
    pub schemas: Vec<SchemaSpec>,
}

#[derive(Debug, Clone)]
pub enum Plan {
    Relational(RelationalPlan),
    Warehouse(WarehousePlan),
}

impl Plan {
    /// Detects the plan's shape from its top-level keys, then parses and
    /// validates it. A plan naming both families, or neither, is a
    /// `ConfigError` reported before any connection opens (spec §7).
    pub fn load_from_str(text: &str) -> Result<Self> {
        let raw: serde_yaml::Value = serde_yaml::from_str(text)
            .map_err(|e| MigrateError::Config(format!("invalid YAML: {e}")))?;
        let mapping = raw
            .as_mapping()
            .ok_or_else(|| MigrateError::Config("plan must be a YAML mapping".to_string()))?;

        let has_relational = mapping.contains_key("databases") || mapping.contains_key("dynamic_databases");
        let has_warehouse = mapping.contains_key("tables") || mapping.contains_key("schemas");

        match (has_relational, has_warehouse) {
            (true, true) => Err(MigrateError::Config(
                "plan carries both relational (databases/dynamic_databases) and warehouse \
                 (tables/schemas) keys; exactly one family is required"
                    .to_string(),
            )),
            (false, false) => Err(MigrateError::Config(
                "plan carries neither a relational (databases/dynamic_databases) nor a \
                 warehouse (tables/schemas) key"
                    .to_string(),
            )),
            (true, false) => {
                let plan: RelationalPlan = serde_yaml::from_value(raw)
                    .map_err(|e| MigrateError::Config(format!("relational plan: {e}")))?;
                validate_relational(&plan)?;
                Ok(Plan::Relational(plan))
            }
            (false, true) => {
                let plan: WarehousePlan = serde_yaml::from_value(raw)
                    .map_err(|e| MigrateError::Config(format!("warehouse plan: {e}")))?;
                validate_warehouse(&plan)?;
                Ok(Plan::Warehouse(plan))
            }
        }
    }
}

fn validate_relational(plan: &RelationalPlan) -> Result<()> {
    for dynamic in &plan.dynamic_databases {
        validate_single_placeholder(&dynamic.pattern)?;
        if let Some(target) = &dynamic.target_pattern {
            validate_single_placeholder(target)?;
        }
    }
    Ok(())
}

fn validate_single_placeholder(template: &str) -> Result<()> {
    let count = template.matches('{').count();
    if count != 1 || template.matches('}').count() != 1 {
        return Err(MigrateError::Config(format!(
            "template `{template}` must carry exactly one {{placeholder}}"
        )));
    }
    Ok(())
}

fn validate_warehouse(plan: &WarehousePlan) -> Result<()> {
    if plan.batch_size == 0 {
        return Err(MigrateError::Config(
            "warehouse plan batch_size must be positive".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_relational_shape() {
        let yaml = "databases:\n  - name: shop\n    mode: ALL\n";
        match Plan::load_from_str(yaml).unwrap() {
            Plan::Relational(plan) => assert_eq!(plan.databases.len(), 1),
            Plan::Warehouse(_) => panic!("expected relational plan"),
        }
    }

    #[test]
    fn detects_warehouse_shape() {
        let yaml = "tables:\n  - catalog: hive\n    schema: events\n    table: clicks\n    method: OBJECT_COPY\n";
        match Plan::load_from_str(yaml).unwrap() {
            Plan::Warehouse(plan) => assert_eq!(plan.tables.len(), 1),
            Plan::Relational(_) => panic!("expected warehouse plan"),
        }
    }

    #[test]
    fn rejects_ambiguous_plan() {
        let yaml = "databases: []\ntables: []\n";
        assert!(Plan::load_from_str(yaml).is_err());
    }

    #[test]
    fn rejects_template_without_single_placeholder() {
        let yaml = "dynamic_databases:\n  - pattern: \"laplacian\"\n    mode: ALL\n    lookup_query:\n      database: meta\n      sql: \"SELECT id FROM users\"\n";
        assert!(Plan::load_from_str(yaml).is_err());
    }
}
