//! Auxiliary failure checker (C14, spec §4.14, §9 "Inheritance for the
//! failure-checker variants"). A single trait replaces the source project's
//! abstract base class; two concrete types implement it, one over HTTP
//! (`reqwest`, as used for other outbound API clients in this workspace),
//! one over the relational pool already built for C1.

use crate::pool::ConnectionPool;
use async_trait::async_trait;
use migrate_core::{MigrateError, Result};

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct FailedRun {
    pub dag_id: String,
    pub execution_date: String,
    pub state: String,
}

#[async_trait]
pub trait FailureChecker: Send + Sync {
    async fn test_connection(&self) -> bool;
    async fn get_failures(&self, dag_ids: &[String], date: &str) -> Result<Vec<FailedRun>>;
}

/// Talks to the workflow engine's HTTP API directly.
pub struct ApiFailureChecker {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl ApiFailureChecker {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("reqwest client builder"),
            base_url: base_url.into(),
            token: token.into(),
        }
    }
}

#[async_trait]
impl FailureChecker for ApiFailureChecker {
    async fn test_connection(&self) -> bool {
        self.client
            .get(format!("{}/health", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn get_failures(&self, dag_ids: &[String], date: &str) -> Result<Vec<FailedRun>> {
        let mut results = Vec::new();
        for dag_id in dag_ids {
            let url = format!("{}/api/v1/dags/{dag_id}/dagRuns", self.base_url);
            let resp = self
                .client
                .get(&url)
                .bearer_auth(&self.token)
                .query(&[("execution_date_gte", date), ("state", "failed")])
                .send()
                .await
                .map_err(|e| MigrateError::Other(e.into()))?;
            let body: serde_json::Value = resp.json().await.map_err(|e| MigrateError::Other(e.into()))?;
            if let Some(runs) = body.get("dag_runs").and_then(|v| v.as_array()) {
                for run in runs {
                    results.push(FailedRun {
                        dag_id: dag_id.clone(),
                        execution_date: run
                            .get("execution_date")
                            .and_then(|v| v.as_str())
                            .unwrap_or(date)
                            .to_string(),
                        state: run
                            .get("state")
                            .and_then(|v| v.as_str())
                            .unwrap_or("failed")
                            .to_string(),
                    });
                }
            }
        }
        Ok(results)
    }
}

/// Talks directly to the workflow engine's metadata database, reusing the
/// same pool machinery as C1.
pub struct DbFailureChecker<'a> {
    pool: &'a ConnectionPool,
}

impl<'a> DbFailureChecker<'a> {
    pub fn new(pool: &'a ConnectionPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl<'a> FailureChecker for DbFailureChecker<'a> {
    async fn test_connection(&self) -> bool {
        self.pool.ping().await
    }

    async fn get_failures(&self, dag_ids: &[String], date: &str) -> Result<Vec<FailedRun>> {
        let in_list = dag_ids
            .iter()
            .map(|d| format!("'{d}'"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT dag_id, execution_date, state FROM dag_run \
             WHERE dag_id IN ({in_list}) AND execution_date >= '{date}' AND state = 'failed'"
        );
        let rows = self.pool.query_all(&sql).await?;
        Ok(rows
            .into_iter()
            .map(|r| FailedRun {
                dag_id: r.get("dag_id").map(|v| v.to_string()).unwrap_or_default(),
                execution_date: r
                    .get("execution_date")
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
                state: r.get("state").map(|v| v.to_string()).unwrap_or_default(),
            })
            .collect())
    }
}
