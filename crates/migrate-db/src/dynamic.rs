//! Dynamic job expander (C9, spec §4.9). Grounded on `execute_lookup_query`
//! in `mysql_migration/migrator.py`: run the lookup, take the first column
//! of each row, substitute into the template.

use crate::pool::ConnectionPool;
use migrate_core::{DatabaseJob, DynamicDatabaseJob, Result};

/// Expands one [`DynamicDatabaseJob`] into zero or more concrete
/// [`DatabaseJob`]s. Emits a `tracing::warn!` and returns an empty vec if
/// the lookup returns no rows (spec §4.9, step 4).
pub async fn expand(pool: &ConnectionPool, job: &DynamicDatabaseJob) -> Result<Vec<DatabaseJob>> {
    let rows = pool.query_all(&job.lookup_sql).await?;
    if rows.is_empty() {
        tracing::warn!(
            lookup_database = %job.lookup_database,
            "dynamic job expansion lookup returned no rows; producing zero jobs"
        );
        return Ok(Vec::new());
    }

    let mut jobs = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(value) = row.values().next() else {
            continue;
        };
        let value = value.to_string();
        let mut concrete = job.base.clone();
        concrete.source_name = substitute_placeholder(&job.source_template, &value);
        concrete.target_name = job
            .target_template
            .as_ref()
            .map(|t| substitute_placeholder(t, &value));
        jobs.push(concrete);
    }
    Ok(jobs)
}

/// Replaces the template's single `{placeholder}` span (whatever name it
/// carries, e.g. `{user_id}`) with `value`.
fn substitute_placeholder(template: &str, value: &str) -> String {
    match (template.find('{'), template.find('}')) {
        (Some(start), Some(end)) if start < end => {
            format!("{}{value}{}", &template[..start], &template[end + 1..])
        }
        _ => template.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::substitute_placeholder;

    #[test]
    fn substitutes_named_placeholder() {
        assert_eq!(substitute_placeholder("laplacian_{user_id}", "42"), "laplacian_42");
        assert_eq!(substitute_placeholder("{user_id}_db", "7"), "7_db");
        assert_eq!(substitute_placeholder("static", "7"), "static");
    }

    // `expand`'s I/O path requires a live pool and is covered by the CLI's
    // integration tests instead.
}
