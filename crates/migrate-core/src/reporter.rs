//! Replaces the source project's "console singleton" (spec §9): a `Reporter`
//! value injected at the orchestrator constructor rather than process-wide
//! mutable state. Job-level events go through `tracing`; the final result
//! list is rendered as a human summary table.

use crate::model::{JobStatus, MigrationResult};

/// Injected at the orchestrator constructor. Cheap to clone: the only state
/// it carries today is whether to also emit plain per-job lines to stdout,
/// for environments where a terminal, not a log aggregator, is watching.
#[derive(Debug, Clone, Default)]
pub struct Reporter {
    echo_to_stdout: bool,
}

impl Reporter {
    pub fn new(echo_to_stdout: bool) -> Self {
        Self { echo_to_stdout }
    }

    pub fn job_started(&self, database: &str, table: &str) {
        tracing::info!(database, table, "migrating table");
    }

    pub fn job_finished(&self, result: &MigrationResult) {
        match result.status {
            JobStatus::Ok | JobStatus::DryRun | JobStatus::Skipped => {
                tracing::info!(
                    database = %result.database,
                    table = %result.table,
                    status = ?result.status,
                    inserted = result.inserted,
                    "table migration finished"
                );
            }
            JobStatus::Warning => {
                tracing::warn!(
                    database = %result.database,
                    table = %result.table,
                    errors = result.errors.len(),
                    "table migration finished with warnings"
                );
            }
            JobStatus::Error => {
                tracing::error!(
                    database = %result.database,
                    table = %result.table,
                    errors = ?result.errors,
                    "table migration failed"
                );
            }
        }
        if self.echo_to_stdout {
            println!(
                "{:<24} {:<24} {:?}",
                result.database, result.table, result.status
            );
        }
    }

    /// Renders the full result list as a fixed-width summary table, for the
    /// terminal-facing CLI verbs (spec §6, "Result surface").
    pub fn summary_table(results: &[MigrationResult]) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "{:<20} {:<20} {:<10} {:>10} {:>10} {:>10}\n",
            "DATABASE", "TABLE", "STATUS", "FETCHED", "INSERTED", "SKIPPED"
        ));
        for r in results {
            out.push_str(&format!(
                "{:<20} {:<20} {:<10?} {:>10} {:>10} {:>10}\n",
                r.database, r.table, r.status, r.fetched, r.inserted, r.skipped
            ));
        }
        out
    }

    /// Exit code policy: 0 unless at least one job ended in `ERROR`
    /// (spec §7, §8).
    pub fn exit_code(results: &[MigrationResult]) -> i32 {
        if results.iter().any(|r| r.status == JobStatus::Error) {
            1
        } else {
            0
        }
    }
}
