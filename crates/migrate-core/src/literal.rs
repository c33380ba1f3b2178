//! SQL literal encoding shared by the relational batch-insert path (C6) and
//! the warehouse EXTRACT_LOAD literal `VALUES` builder (C7, spec §4.7.2).

use crate::model::RowValue;

/// Encodes one cell as a SQL literal: NULL, single-quote-escaped string,
/// `true`/`false`, integer/float as-is, JSON-encoded string for structured
/// values, `TIMESTAMP 'yyyy-MM-dd HH:mm:ss'` for temporal values, and
/// string-escaped for anything else.
pub fn encode_sql_literal(value: &RowValue) -> String {
    match value {
        RowValue::Null => "NULL".to_string(),
        RowValue::Bool(b) => if *b { "true" } else { "false" }.to_string(),
        RowValue::Int(i) => i.to_string(),
        RowValue::Float(f) => f.to_string(),
        RowValue::Text(s) => format!("'{}'", escape_single_quotes(s)),
        RowValue::Bytes(_) => format!("'{}'", escape_single_quotes(&value.to_string())),
        RowValue::Json(v) => format!("'{}'", escape_single_quotes(&v.to_string())),
        RowValue::Timestamp(t) => format!("TIMESTAMP '{}'", t.format("%Y-%m-%d %H:%M:%S")),
        RowValue::Decimal(s) => s.clone(),
    }
}

fn escape_single_quotes(s: &str) -> String {
    s.replace('\'', "''")
}

/// Builds a single `VALUES (...)` tuple in the given column order.
pub fn encode_values_tuple(columns: &[String], row: &crate::model::Row) -> String {
    let rendered: Vec<String> = columns
        .iter()
        .map(|c| row.get(c).map(encode_sql_literal).unwrap_or_else(|| "NULL".to_string()))
        .collect();
    format!("({})", rendered.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_strings_and_renders_scalars() {
        assert_eq!(encode_sql_literal(&RowValue::Null), "NULL");
        assert_eq!(encode_sql_literal(&RowValue::Bool(true)), "true");
        assert_eq!(encode_sql_literal(&RowValue::Int(42)), "42");
        assert_eq!(
            encode_sql_literal(&RowValue::Text("it's".to_string())),
            "'it''s'"
        );
    }
}
