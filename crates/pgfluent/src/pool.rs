//! Connection pool manager.
//!
//! A bounded deadpool-postgres pool behind a small facade. Acquisition is
//! scoped: the connection returns to the pool when the guard drops, whether
//! the statement succeeded or failed. Pool-level failures (exhaustion,
//! acquire timeout) map to [`QueryError::Pool`] / [`QueryError::Connection`];
//! statement failures go through the statement taxonomy, so callers can tell
//! which side broke.

use crate::error::{QueryError, QueryResult};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime, Status};
use serde::Deserialize;
use std::time::Duration;
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row};
use tracing::debug;

/// Pool tuning, loadable from application configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Hard upper bound on simultaneously open connections.
    pub max_size: usize,
    /// How long an acquisition may queue before failing with a pool error.
    pub acquire_timeout: Option<Duration>,
    /// Timeout for establishing a new connection.
    pub create_timeout: Option<Duration>,
    /// Timeout for recycling an idle connection on checkout.
    pub recycle_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 16,
            acquire_timeout: Some(Duration::from_secs(30)),
            create_timeout: Some(Duration::from_secs(30)),
            recycle_timeout: Some(Duration::from_secs(5)),
        }
    }
}

/// Shared handle to a bounded pool of live database connections.
#[derive(Clone)]
pub struct DbPool {
    pool: Pool,
}

impl DbPool {
    /// Build a pool from a database URL. Connections are established lazily;
    /// use [`DbPool::health_check`] to verify reachability at startup.
    pub fn connect(database_url: &str, config: PoolConfig) -> QueryResult<Self> {
        let pg_config: tokio_postgres::Config = database_url
            .parse()
            .map_err(|e: tokio_postgres::Error| QueryError::Connection(e.to_string()))?;

        let mgr = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let pool = Pool::builder(mgr)
            .max_size(config.max_size)
            .wait_timeout(config.acquire_timeout)
            .create_timeout(config.create_timeout)
            .recycle_timeout(config.recycle_timeout)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| QueryError::Pool(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Execute a statement and return its rows.
    pub async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> QueryResult<Vec<Row>> {
        let client = self.pool.get().await?;
        debug!(sql, params = params.len(), "executing statement");
        client
            .query(sql, params)
            .await
            .map_err(QueryError::from_db_error)
    }

    /// Execute a statement and return the affected row count.
    pub async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> QueryResult<u64> {
        let client = self.pool.get().await?;
        debug!(sql, params = params.len(), "executing statement");
        client
            .execute(sql, params)
            .await
            .map_err(QueryError::from_db_error)
    }

    /// Round-trip `SELECT 1` on a pooled connection.
    pub async fn health_check(&self) -> QueryResult<()> {
        let client = self.pool.get().await?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(QueryError::from_db_error)?;
        Ok(())
    }

    /// Current pool occupancy.
    pub fn status(&self) -> Status {
        self.pool.status()
    }

    /// Close the pool. Subsequent acquisitions fail with a pool error.
    pub fn close(&self) {
        self.pool.close();
    }
}

impl std::fmt::Debug for DbPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.pool.status();
        f.debug_struct("DbPool")
            .field("size", &status.size)
            .field("available", &status.available)
            .field("max_size", &status.max_size)
            .finish()
    }
}
