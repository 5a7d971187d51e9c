//! Top-level client handle.
//!
//! Owns the injected connection pool and hands out one [`TableQuery`] per
//! statement. No process-wide state: applications construct the client from
//! configuration and pass it where it is needed.

use crate::builder::TableQuery;
use crate::error::QueryResult;
use crate::param::{Param, ParamList};
use crate::pool::{DbPool, PoolConfig};
use crate::value::row_to_json;
use serde_json::{Map, Value};

/// Database client bound to one connection pool.
#[derive(Clone, Debug)]
pub struct Client {
    pool: DbPool,
}

impl Client {
    /// Build a client from a database URL and pool configuration.
    pub fn connect(database_url: &str, config: PoolConfig) -> QueryResult<Self> {
        Ok(Self {
            pool: DbPool::connect(database_url, config)?,
        })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Start a chainable statement against a table.
    pub fn from(&self, table: &str) -> TableQuery {
        TableQuery::new(self.pool.clone(), table)
    }

    /// Call a stored routine by name with named arguments, bypassing the
    /// builder. Arguments bind positionally; names map through Postgres'
    /// `name => value` call syntax.
    pub async fn rpc(&self, routine: &str, args: Map<String, Value>) -> QueryResult<Value> {
        let mut params = ParamList::new();
        let arg_list: Vec<String> = args
            .into_iter()
            .map(|(name, value)| {
                let idx = params.push_param(Param::from_json(value));
                format!("{} => ${}", name, idx)
            })
            .collect();
        let sql = format!("SELECT * FROM {}({})", routine, arg_list.join(", "));

        let rows = self.pool.query(&sql, &params.as_refs()).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(Value::Object(row_to_json(row)?));
        }
        Ok(Value::Array(out))
    }

    /// The underlying pool, for health checks and shutdown.
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}
