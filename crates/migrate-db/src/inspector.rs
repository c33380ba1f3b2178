//! Schema inspector (C3, spec §4.3). Grounded on `TrinoClient` in
//! `trino_migration/client.py`: information-schema enumeration, `SHOW CREATE
//! TABLE` for DDL, regex extraction of location/format out of the DDL text.

use crate::pool::ConnectionPool;
use migrate_core::{ColumnDef, MigrateError, Result, TableDescriptor};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

fn location_patterns() -> &'static [Regex; 3] {
    static PATTERNS: OnceLock<[Regex; 3]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            Regex::new(r"(?i)LOCATION\s+'([^']+)'").unwrap(),
            Regex::new(r"(?i)external_location\s*=\s*'([^']+)'").unwrap(),
            Regex::new(r"(?i)location\s*=\s*'([^']+)'").unwrap(),
        ]
    })
}

fn format_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)format\s*=\s*'(\w+)'").unwrap())
}

/// Three forms, first match wins (spec §4.3).
pub fn parse_location(ddl: &str) -> Option<String> {
    location_patterns()
        .iter()
        .find_map(|re| re.captures(ddl).map(|c| c[1].to_string()))
}

/// Case-folded to upper (spec §4.3).
pub fn parse_format(ddl: &str) -> Option<String> {
    format_pattern()
        .captures(ddl)
        .map(|c| c[1].to_uppercase())
}

pub struct SchemaInspector<'a> {
    pool: &'a ConnectionPool,
}

impl<'a> SchemaInspector<'a> {
    pub fn new(pool: &'a ConnectionPool) -> Self {
        Self { pool }
    }

    /// Enumerates base tables, excluding views and materialized views. The
    /// source writes `is_base_table` via equality against `table_type`, not
    /// an allowlist of known view type strings (spec §9, preserved).
    pub async fn list_base_tables(&self, catalog: &str, schema: &str) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT table_name, table_type FROM {catalog}.information_schema.tables \
             WHERE table_schema = '{schema}'"
        );
        let rows = self.pool.query_all(&sql).await?;
        Ok(rows
            .into_iter()
            .filter(|r| {
                matches!(r.get("table_type"), Some(v) if v.to_string() == "BASE TABLE")
            })
            .filter_map(|r| r.get("table_name").map(|v| v.to_string()))
            .collect())
    }

    pub async fn is_base_table(&self, catalog: &str, schema: &str, table: &str) -> Result<bool> {
        let sql = format!(
            "SELECT table_type FROM {catalog}.information_schema.tables \
             WHERE table_schema = '{schema}' AND table_name = '{table}'"
        );
        let rows = self.pool.query_all(&sql).await?;
        Ok(rows
            .first()
            .and_then(|r| r.get("table_type"))
            .map(|v| v.to_string() == "BASE TABLE")
            .unwrap_or(false))
    }

    pub async fn fetch_columns(&self, catalog: &str, schema: &str, table: &str) -> Result<Vec<ColumnDef>> {
        let sql = format!("DESCRIBE {catalog}.{schema}.{table}");
        let rows = self.pool.query_all(&sql).await?;
        Ok(rows
            .into_iter()
            .map(|r| {
                let name = r
                    .get("Column")
                    .or_else(|| r.get("column_name"))
                    .map(|v| v.to_string())
                    .unwrap_or_default();
                let declared_type = r
                    .get("Type")
                    .or_else(|| r.get("data_type"))
                    .map(|v| v.to_string())
                    .unwrap_or_default();
                let extra = r
                    .get("Extra")
                    .or_else(|| r.get("extra"))
                    .map(|v| v.to_string())
                    .unwrap_or_default();
                ColumnDef {
                    name,
                    declared_type,
                    is_partition_key: extra.to_lowercase().contains("partition key"),
                }
            })
            .collect())
    }

    /// Tolerates "not partitioned" errors by returning empty (spec §4.3).
    pub async fn fetch_partitions(
        &self,
        catalog: &str,
        schema: &str,
        table: &str,
    ) -> Vec<BTreeMap<String, String>> {
        let sql = format!("SHOW PARTITIONS FROM {catalog}.{schema}.\"{table}\"");
        match self.pool.query_all(&sql).await {
            Ok(rows) => rows
                .into_iter()
                .map(|r| {
                    r.as_slice()
                        .iter()
                        .map(|(name, value)| (name.clone(), value.to_string()))
                        .collect()
                })
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// If the engine refuses (e.g. a materialized view), the caller should
    /// skip the table entirely (spec §4.3).
    pub async fn fetch_ddl(&self, catalog: &str, schema: &str, table: &str) -> Result<String> {
        let sql = format!("SHOW CREATE TABLE {catalog}.{schema}.{table}");
        let rows = self.pool.query_all(&sql).await?;
        rows.first()
            .and_then(|r| r.get("Create Table"))
            .map(|v| v.to_string())
            .ok_or_else(|| MigrateError::Schema(format!("no DDL for {catalog}.{schema}.{table}")))
    }

    pub async fn row_count(&self, catalog: &str, schema: &str, table: &str, where_clause: &str) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) as cnt FROM {catalog}.{schema}.{table} WHERE {where_clause}");
        let rows = self.pool.query_all(&sql).await?;
        Ok(rows
            .first()
            .and_then(|r| r.get("cnt"))
            .map(|v| v.to_string().parse().unwrap_or(0))
            .unwrap_or(0))
    }

    /// Foreign-key edges for a table set, via the standard information-schema
    /// key-column-usage view, filtered by owning schema and subject tables
    /// (spec §4.3).
    pub async fn fetch_fk_edges(
        &self,
        catalog: &str,
        schema: &str,
        tables: &[String],
    ) -> Result<migrate_core::FkEdgeSet> {
        let in_list = tables
            .iter()
            .map(|t| format!("'{t}'"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT table_name, referenced_table_name \
             FROM {catalog}.information_schema.key_column_usage \
             WHERE table_schema = '{schema}' AND table_name IN ({in_list}) \
               AND referenced_table_name IS NOT NULL"
        );
        let rows = self.pool.query_all(&sql).await?;
        let mut edges = migrate_core::FkEdgeSet::new();
        for row in rows {
            if let (Some(child), Some(parent)) = (
                row.get("table_name").map(|v| v.to_string()),
                row.get("referenced_table_name").map(|v| v.to_string()),
            ) {
                edges.add_edge(&child, &parent);
            }
        }
        Ok(edges)
    }

    /// Assembles a full [`TableDescriptor`] for one table, parsing location
    /// and format out of the DDL (spec §4.3).
    pub async fn describe_table(
        &self,
        catalog: &str,
        schema: &str,
        table: &str,
    ) -> Result<TableDescriptor> {
        let ddl = self.fetch_ddl(catalog, schema, table).await?;
        let columns = self.fetch_columns(catalog, schema, table).await?;
        let partition_columns: Vec<String> = columns
            .iter()
            .filter(|c| c.is_partition_key)
            .map(|c| c.name.clone())
            .collect();
        let partitions = if partition_columns.is_empty() {
            None
        } else {
            Some(self.fetch_partitions(catalog, schema, table).await)
        };
        Ok(TableDescriptor {
            catalog: Some(catalog.to_string()),
            schema: schema.to_string(),
            table: table.to_string(),
            columns,
            partition_columns,
            location: parse_location(&ddl),
            format: parse_format(&ddl),
            ddl,
            row_count: None,
            partitions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_three_location_forms() {
        assert_eq!(
            parse_location("CREATE TABLE t (...) LOCATION 's3://b/p'"),
            Some("s3://b/p".to_string())
        );
        assert_eq!(
            parse_location("CREATE TABLE t (...) WITH (external_location = 's3://b/p')"),
            Some("s3://b/p".to_string())
        );
        assert_eq!(
            parse_location("CREATE TABLE t (...) WITH (location = 's3://b/p')"),
            Some("s3://b/p".to_string())
        );
        assert_eq!(parse_location("CREATE TABLE t (...)"), None);
    }

    #[test]
    fn parses_format_case_folded() {
        assert_eq!(
            parse_format("WITH (format = 'parquet')"),
            Some("PARQUET".to_string())
        );
    }
}
