//! WHERE-clause and table-name text helpers shared by C6 and C9.

use crate::model::{ComparisonOp, PartitionPredicate};
use regex::Regex;
use std::sync::OnceLock;

/// Maps an empty or whitespace-only predicate to the universal predicate
/// `1=1`, otherwise returns the trimmed predicate (spec §8).
pub fn normalize_where(where_clause: Option<&str>) -> String {
    match where_clause.map(str::trim) {
        None => "1=1".to_string(),
        Some(w) if w.is_empty() => "1=1".to_string(),
        Some(w) => w.to_string(),
    }
}

/// `user_id IN (...)` when the existing predicate normalizes to `1=1`,
/// otherwise `(w) AND user_id IN (...)` (spec §8).
pub fn build_user_filter(user_ids: &[i64], where_clause: Option<&str>) -> String {
    let ids = user_ids
        .iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    let filter = format!("user_id IN ({ids})");
    let normalized = normalize_where(where_clause);
    if normalized == "1=1" {
        filter
    } else {
        format!("({normalized}) AND {filter}")
    }
}

fn date_suffix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)_(\d{8}|\d{6}|\d{4}-\d{2}-\d{2}|\d{2}-\d{2}-\d{2})(_\w+)?$",
        )
        .expect("static date-suffix pattern is valid")
    })
}

/// A table whose name ends in `_YYYYMMDD`, `_YYMMDD`, `_YYYY-MM-DD`, or
/// `_YY-MM-DD`, optionally followed by a `_word` tail, is date-suffixed
/// (spec §4.6).
pub fn is_date_suffixed(table_name: &str) -> bool {
    date_suffix_regex().is_match(table_name)
}

/// Parses a plan's `partition_filter` entry (e.g. `"dt >= '2024-07-01'"`)
/// into a structured predicate, trying each comparison operator in turn so
/// that `<=`/`>=` are checked before the bare `<`/`>` they contain (spec §4.7).
pub fn parse_partition_predicate(predicate: &str) -> Option<PartitionPredicate> {
    const OPS: [(&str, ComparisonOp); 5] = [
        ("<=", ComparisonOp::Le),
        (">=", ComparisonOp::Ge),
        ("=", ComparisonOp::Eq),
        ("<", ComparisonOp::Lt),
        (">", ComparisonOp::Gt),
    ];
    for (token, op) in OPS {
        if let Some(idx) = predicate.find(token) {
            let column = predicate[..idx].trim().to_string();
            let literal = predicate[idx + token.len()..]
                .trim()
                .trim_matches('\'')
                .to_string();
            return Some(PartitionPredicate { column, op, literal });
        }
    }
    None
}

/// `true` if `value` satisfies `predicate` under lexical string comparison
/// (partition values are always strings on the wire) (spec §4.7).
pub fn predicate_matches(predicate: &PartitionPredicate, value: &str) -> bool {
    match predicate.op {
        ComparisonOp::Eq => value == predicate.literal,
        ComparisonOp::Lt => value < predicate.literal.as_str(),
        ComparisonOp::Le => value <= predicate.literal.as_str(),
        ComparisonOp::Gt => value > predicate.literal.as_str(),
        ComparisonOp::Ge => value >= predicate.literal.as_str(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_where_maps_blank_to_universal() {
        assert_eq!(normalize_where(None), "1=1");
        assert_eq!(normalize_where(Some("  ")), "1=1");
        assert_eq!(normalize_where(Some(" status = 1 ")), "status = 1");
    }

    #[test]
    fn build_user_filter_combines_existing_predicate() {
        assert_eq!(build_user_filter(&[1, 2], None), "user_id IN (1, 2)");
        assert_eq!(
            build_user_filter(&[1, 2], Some("active = true")),
            "(active = true) AND user_id IN (1, 2)"
        );
    }

    #[test]
    fn date_suffix_recognizes_all_shapes() {
        assert!(is_date_suffixed("orders_20240115"));
        assert!(is_date_suffixed("orders_2024-01-15"));
        assert!(is_date_suffixed("orders_240115_bak"));
        assert!(!is_date_suffixed("orders"));
    }

    #[test]
    fn partition_predicate_parses_all_operators() {
        let p = parse_partition_predicate("dt >= '2024-07-01'").unwrap();
        assert_eq!(p.column, "dt");
        assert_eq!(p.op, ComparisonOp::Ge);
        assert_eq!(p.literal, "2024-07-01");
        assert!(predicate_matches(&p, "2024-07-02"));
        assert!(!predicate_matches(&p, "2024-06-30"));
    }

    #[test]
    fn partition_predicate_prefers_two_char_operators() {
        let p = parse_partition_predicate("region = 'us'").unwrap();
        assert_eq!(p.op, ComparisonOp::Eq);
        assert_eq!(p.literal, "us");
    }
}
