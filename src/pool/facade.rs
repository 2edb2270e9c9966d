use super::{PoolKey, TenantPool};
use crate::error::PoolError;
use crate::sql::{row_to_json, SqlParam};
use crate::tenant::Route;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::mysql::MySqlConnection;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::TryAcquireError;

fn identifier_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_$-]{1,64}$").expect("static identifier pattern"))
}

#[derive(Clone, Copy, Debug, Default)]
pub struct QueryOptions {
    /// Fetch result rows; otherwise report affected rows.
    pub expect_rows: bool,
}

impl QueryOptions {
    pub fn rows() -> Self {
        QueryOptions { expect_rows: true }
    }

    pub fn affected() -> Self {
        QueryOptions { expect_rows: false }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryOutcome {
    Rows(Vec<Map<String, Value>>),
    Affected { rows_affected: u64, last_insert_id: u64 },
}

impl QueryOutcome {
    pub fn into_rows(self) -> Vec<Map<String, Value>> {
        match self {
            QueryOutcome::Rows(rows) => rows,
            QueryOutcome::Affected { .. } => Vec::new(),
        }
    }
}

/// Tenant-scoped handle for running parameterized queries. Cheap to clone; holds no
/// connection between calls.
#[derive(Clone)]
pub struct ExecutionFacade {
    pool: Arc<TenantPool>,
    route: Arc<Route>,
    query_timeout: Duration,
}

impl std::fmt::Debug for ExecutionFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionFacade")
            .field("tenant", &self.route.tenant_key)
            .field("pool", &self.pool.key)
            .finish()
    }
}

impl ExecutionFacade {
    pub(crate) fn new(pool: Arc<TenantPool>, route: Arc<Route>, query_timeout: Duration) -> Self {
        ExecutionFacade {
            pool,
            route,
            query_timeout,
        }
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    /// Physical target this facade executes against.
    pub fn target(&self) -> String {
        self.pool.key.target.to_string()
    }

    pub fn pool_key(&self) -> &PoolKey {
        &self.pool.key
    }

    #[cfg(test)]
    pub(crate) fn shares_pool_with(&self, other: &ExecutionFacade) -> bool {
        Arc::ptr_eq(&self.pool, &other.pool)
    }

    #[cfg(test)]
    pub(crate) fn pool_is_retired(&self) -> bool {
        self.pool.admission.is_closed()
    }

    pub async fn query(
        &self,
        sql: &str,
        params: &[SqlParam],
        options: QueryOptions,
    ) -> Result<QueryOutcome, PoolError> {
        let target = self.pool.key.target.to_string();
        let switch = self.database_switch()?;
        let _permit = self.pool.admission.clone().try_acquire_owned().map_err(|e| match e {
            TryAcquireError::Closed => PoolError::ShuttingDown,
            TryAcquireError::NoPermits => {
                tracing::warn!(tenant = %self.route.tenant_key, target_db = %target, "pool wait queue full");
                PoolError::PoolExhausted(target.clone())
            }
        })?;

        // Returned to the pool on drop, whichever way this function exits.
        let mut conn = self
            .pool
            .pool
            .acquire()
            .await
            .map_err(|e| PoolError::from_acquire(e, &target))?;

        if let Some(statement) = switch {
            sqlx::Executor::execute(&mut *conn, statement.as_str()).await?;
        }

        tracing::debug!(tenant = %self.route.tenant_key, sql = %sql, params = ?params, "query");
        let run = run_query(&mut *conn, sql, params, options);
        match tokio::time::timeout(self.query_timeout, run).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(tenant = %self.route.tenant_key, timeout = ?self.query_timeout, "query timed out");
                Err(PoolError::QueryTimeout(self.query_timeout))
            }
        }
    }

    /// Rows from a SELECT-style statement.
    pub async fn fetch_all(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<Map<String, Value>>, PoolError> {
        Ok(self.query(sql, params, QueryOptions::rows()).await?.into_rows())
    }

    pub async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<QueryOutcome, PoolError> {
        self.query(sql, params, QueryOptions::affected()).await
    }

    /// `USE` statement needed when the route names a database other than the one
    /// the pool binds to. Checked before admission so a bad name costs no connection.
    fn database_switch(&self) -> Result<Option<String>, PoolError> {
        let database = &self.route.database_name;
        if *database == self.pool.key.target.database {
            return Ok(None);
        }
        if !identifier_pattern().is_match(database) {
            return Err(PoolError::InvalidTarget(database.clone()));
        }
        Ok(Some(format!("USE `{}`", database)))
    }
}

async fn run_query(
    conn: &mut MySqlConnection,
    sql: &str,
    params: &[SqlParam],
    options: QueryOptions,
) -> Result<QueryOutcome, PoolError> {
    let mut query = sqlx::query(sql);
    for p in params {
        query = query.bind(p.clone());
    }
    if options.expect_rows {
        let rows = query.fetch_all(&mut *conn).await?;
        Ok(QueryOutcome::Rows(rows.iter().map(row_to_json).collect()))
    } else {
        let done = query.execute(&mut *conn).await?;
        Ok(QueryOutcome::Affected {
            rows_affected: done.rows_affected(),
            last_insert_id: done.last_insert_id(),
        })
    }
}
