//! # pgfluent
//!
//! A fluent, chainable PostgreSQL query layer.
//!
//! Application code describes one statement method-by-method — filters,
//! projection (including joins written in a compact mini-grammar), ordering,
//! pagination, mutations — and resolves it once. Resolution compiles the
//! chain into a single parameterized statement, executes it on a bounded
//! connection pool, and reshapes flat result rows back into the nested
//! objects the projection asked for.
//!
//! ## Usage
//!
//! ```ignore
//! use pgfluent::{Client, OrderOptions, PoolConfig};
//!
//! let client = Client::connect("postgres://app@localhost/app", PoolConfig::default())?;
//!
//! // SELECT with a join: rows carry a nested `household` object
//! let out = client
//!     .from("members")
//!     .select("id, name, household:households(street, city)")
//!     .eq("status", "active")
//!     .order("name", OrderOptions::default())
//!     .range(0, 49)
//!     .resolve()
//!     .await?;
//!
//! // UPSERT keyed on email
//! client
//!     .from("members")
//!     .upsert(serde_json::json!({"email": "a@x.no", "name": "A"}), "email")
//!     .resolve()
//!     .await?;
//! ```
//!
//! Every statement resolves to [`QueryOutput`] (`data` + optional `count`) or
//! a [`QueryError`] whose `code()`/message pair callers can branch on
//! uniformly.

pub mod builder;
pub mod client;
pub mod compile;
pub mod error;
pub mod param;
pub mod pool;
pub mod predicate;
pub mod projection;
pub mod reshape;
pub mod value;

pub use builder::{OrderOptions, QueryOutput, TableQuery};
pub use client::Client;
pub use compile::{CompiledStatement, Operation, StatementContext};
pub use error::{QueryError, QueryResult};
pub use param::{Param, ParamList};
pub use pool::{DbPool, PoolConfig};
pub use projection::{JoinDescriptor, Projection};
pub use value::SqlValue;
