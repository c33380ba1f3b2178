//! DDL rewriter (C4, spec §4.4). The source project carries three slightly
//! different implementations across duplicated files; this is the single,
//! authoritative rewrite matching the newest one (handles Hive `LOCATION`
//! and the Iceberg `location` property — spec §9 Open Questions).

use regex::Regex;
use std::sync::OnceLock;

/// Properties tied to the source engine's retry/parallelism knobs that do
/// not carry over to a target `CREATE TABLE` (spec §4.4, step 2).
pub const INCOMPATIBLE_PROPERTIES: &[&str] = &[
    "retry_policy",
    "retry_count",
    "max_writer_tasks_count",
    "scheduling_policy",
    "query_max_memory_per_node",
];

fn create_table_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)CREATE TABLE\s+(?:IF NOT EXISTS\s+)?(?:"?[\w]+"?\.)*"?[\w]+"?"#).unwrap()
    })
}

fn location_value_pattern(key: &str) -> Regex {
    match key {
        "LOCATION" => Regex::new(r"(?i)LOCATION\s+'([^']*)'").unwrap(),
        _ => Regex::new(&format!(r"(?i){key}\s*=\s*'([^']*)'")).unwrap(),
    }
}

fn property_pattern(name: &str) -> Regex {
    // tolerates quoted string values and bare numeric values
    Regex::new(&format!(
        r",?\s*{name}\s*=\s*('[^']*'|[0-9]+(?:\.[0-9]+)?)\s*,?"
    ))
    .expect("property pattern is valid")
}

fn empty_with_clause_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)WITH\s*\(\s*\)").unwrap())
}

fn stray_comma_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",\s*\)").unwrap())
}

fn leading_comma_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(\s*,").unwrap())
}

/// Rewrites `ddl` for `new_triple` (`catalog.schema.table` or
/// `schema.table`), optionally relocating storage to `new_location`. Applies
/// the four transformations of spec §4.4 in order.
pub fn rewrite_ddl(ddl: &str, new_triple: &str, new_location: Option<&str>) -> String {
    let mut out = create_table_pattern()
        .replace(ddl, format!("CREATE TABLE {new_triple}"))
        .into_owned();

    for prop in INCOMPATIBLE_PROPERTIES {
        out = property_pattern(prop).replace_all(&out, "").into_owned();
    }

    out = stray_comma_pattern().replace_all(&out, ")").into_owned();
    out = leading_comma_pattern().replace_all(&out, "(").into_owned();
    out = empty_with_clause_pattern().replace_all(&out, "").into_owned();

    if let Some(location) = new_location {
        for key in ["LOCATION", "external_location", "location"] {
            let pattern = location_value_pattern(key);
            let replacement = if key == "LOCATION" {
                format!("LOCATION '{location}'")
            } else {
                format!("{key} = '{location}'")
            };
            out = pattern.replace_all(&out, replacement.as_str()).into_owned();
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_table_name_and_strips_incompatible_properties() {
        let ddl = "CREATE TABLE hive.src.orders (\n  id bigint\n) WITH (\n  format = 'PARQUET',\n  retry_count = 3\n)";
        let out = rewrite_ddl(ddl, "hive.tgt.orders", None);
        assert!(out.starts_with("CREATE TABLE hive.tgt.orders"));
        assert!(!out.contains("retry_count"));
        assert!(out.contains("format = 'PARQUET'"));
    }

    #[test]
    fn relocates_all_location_forms() {
        let ddl = "CREATE TABLE hive.src.orders (id bigint) WITH (location = 's3://src/orders')";
        let out = rewrite_ddl(ddl, "hive.tgt.orders", Some("s3://tgt/orders"));
        assert!(out.contains("location = 's3://tgt/orders'"));
    }

    #[test]
    fn idempotent_under_repeated_target_override() {
        let ddl = "CREATE TABLE hive.src.orders (id bigint) LOCATION 's3://src/orders'";
        let once = rewrite_ddl(ddl, "hive.tgt.orders", Some("s3://x/orders"));
        let twice = rewrite_ddl(&once, "hive.tgt.orders", Some("s3://y/orders"));
        let direct = rewrite_ddl(ddl, "hive.tgt.orders", Some("s3://y/orders"));
        assert_eq!(twice, direct);
    }

    #[test]
    fn collapses_empty_with_clause_left_by_stripped_properties() {
        let ddl = "CREATE TABLE hive.src.t (id bigint) WITH (retry_count = 3)";
        let out = rewrite_ddl(ddl, "hive.tgt.t", None);
        assert!(!out.contains("WITH ()"));
    }
}
