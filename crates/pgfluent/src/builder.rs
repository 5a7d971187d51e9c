//! The chainable query facade.
//!
//! A `TableQuery` owns one `StatementContext`, mutated method-by-method and
//! compiled+executed exactly once by [`TableQuery::resolve`]. Builder-time
//! errors (bad OR-group grammar, bad projection, bad payload) are captured at
//! the call site and surfaced at resolution, before any connection is
//! acquired.

use crate::compile::{Operation, StatementContext};
use crate::error::{QueryError, QueryResult};
use crate::pool::DbPool;
use crate::reshape::reshape_row;
use crate::value::row_to_json;
use serde_json::{Map, Value};
use tokio_postgres::types::ToSql;

/// Ordering options for [`TableQuery::order`].
#[derive(Clone, Copy, Debug)]
pub struct OrderOptions {
    pub ascending: bool,
    pub nulls_first: Option<bool>,
}

impl Default for OrderOptions {
    fn default() -> Self {
        Self {
            ascending: true,
            nulls_first: None,
        }
    }
}

/// Resolved output: reshaped data plus the optional count.
///
/// Together with [`QueryError`] this realizes the `{data, error, count}`
/// envelope as a tagged result, so data cannot be read without the error
/// branch being decided first.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryOutput {
    pub data: Value,
    pub count: Option<i64>,
}

/// One in-progress statement against one table.
#[derive(Debug)]
pub struct TableQuery {
    pool: DbPool,
    ctx: StatementContext,
    build_error: Option<QueryError>,
}

impl TableQuery {
    pub(crate) fn new(pool: DbPool, table: &str) -> Self {
        Self {
            pool,
            ctx: StatementContext::new(table),
            build_error: None,
        }
    }

    fn fail(&mut self, err: QueryError) {
        // First builder error wins.
        if self.build_error.is_none() {
            self.build_error = Some(err);
        }
    }

    // ==================== Projection ====================

    /// Set the projection expression (columns, aliases, join descriptors).
    pub fn select(mut self, expr: &str) -> Self {
        match crate::projection::Projection::parse(expr) {
            Ok(projection) => self.ctx.projection = projection,
            Err(e) => self.fail(e),
        }
        self
    }

    // ==================== Filters ====================

    /// Add WHERE: column = value
    pub fn eq<T: ToSql + Send + Sync + 'static>(mut self, column: &str, value: T) -> Self {
        self.ctx.predicates.eq(column, value);
        self
    }

    /// Add WHERE: column != value
    pub fn neq<T: ToSql + Send + Sync + 'static>(mut self, column: &str, value: T) -> Self {
        self.ctx.predicates.neq(column, value);
        self
    }

    /// Add WHERE: column > value
    pub fn gt<T: ToSql + Send + Sync + 'static>(mut self, column: &str, value: T) -> Self {
        self.ctx.predicates.gt(column, value);
        self
    }

    /// Add WHERE: column >= value
    pub fn gte<T: ToSql + Send + Sync + 'static>(mut self, column: &str, value: T) -> Self {
        self.ctx.predicates.gte(column, value);
        self
    }

    /// Add WHERE: column < value
    pub fn lt<T: ToSql + Send + Sync + 'static>(mut self, column: &str, value: T) -> Self {
        self.ctx.predicates.lt(column, value);
        self
    }

    /// Add WHERE: column <= value
    pub fn lte<T: ToSql + Send + Sync + 'static>(mut self, column: &str, value: T) -> Self {
        self.ctx.predicates.lte(column, value);
        self
    }

    /// Add WHERE: column LIKE pattern
    pub fn like<T: ToSql + Send + Sync + 'static>(mut self, column: &str, pattern: T) -> Self {
        self.ctx.predicates.like(column, pattern);
        self
    }

    /// Add WHERE: column ILIKE pattern (case-insensitive)
    pub fn ilike<T: ToSql + Send + Sync + 'static>(mut self, column: &str, pattern: T) -> Self {
        self.ctx.predicates.ilike(column, pattern);
        self
    }

    /// Add WHERE: column IS NULL
    pub fn is_null(mut self, column: &str) -> Self {
        self.ctx.predicates.is_null(column);
        self
    }

    /// Add WHERE: column IS NOT NULL
    pub fn is_not_null(mut self, column: &str) -> Self {
        self.ctx.predicates.is_not_null(column);
        self
    }

    /// Add WHERE: column IS TRUE
    pub fn is_true(mut self, column: &str) -> Self {
        self.ctx.predicates.is_true(column);
        self
    }

    /// Add WHERE: column IS FALSE
    pub fn is_false(mut self, column: &str) -> Self {
        self.ctx.predicates.is_false(column);
        self
    }

    /// Add WHERE: column IN (values...). Empty lists match no rows.
    pub fn in_list<T: ToSql + Send + Sync + 'static>(mut self, column: &str, values: Vec<T>) -> Self {
        self.ctx.predicates.in_list(column, values);
        self
    }

    /// Add WHERE: column NOT IN (values...)
    pub fn not_in<T: ToSql + Send + Sync + 'static>(mut self, column: &str, values: Vec<T>) -> Self {
        self.ctx.predicates.not_in(column, values);
        self
    }

    /// Add WHERE: column @> value (jsonb containment)
    pub fn contains(mut self, column: &str, value: Value) -> Self {
        self.ctx.predicates.contains(column, value);
        self
    }

    /// Add WHERE: column <@ value (jsonb containment)
    pub fn contained_by(mut self, column: &str, value: Value) -> Self {
        self.ctx.predicates.contained_by(column, value);
        self
    }

    /// Add a parenthesized OR group from compact `column.operator.value`
    /// terms, e.g. `"status.eq.active,role.eq.admin"`.
    pub fn or_filter(mut self, raw: &str) -> Self {
        if let Err(e) = self.ctx.predicates.or_group(raw) {
            self.fail(e);
        }
        self
    }

    // ==================== Ordering & pagination ====================

    /// Add an ORDER BY clause for a column.
    pub fn order(mut self, column: &str, options: OrderOptions) -> Self {
        let qualified = if column.contains('.') {
            column.to_string()
        } else {
            format!("{}.{}", self.ctx.table, column)
        };
        let mut clause = format!(
            "{} {}",
            qualified,
            if options.ascending { "ASC" } else { "DESC" }
        );
        match options.nulls_first {
            Some(true) => clause.push_str(" NULLS FIRST"),
            Some(false) => clause.push_str(" NULLS LAST"),
            None => {}
        }
        self.ctx.order_clauses.push(clause);
        self
    }

    /// Set LIMIT without an offset.
    pub fn limit(mut self, n: i64) -> Self {
        self.ctx.limit = Some(n);
        self
    }

    /// Inclusive row range: `range(from, to)` is OFFSET `from`,
    /// LIMIT `to - from + 1`.
    pub fn range(mut self, from: i64, to: i64) -> Self {
        self.ctx.offset = Some(from);
        self.ctx.limit = Some(to - from + 1);
        self
    }

    // ==================== Result shape ====================

    /// Expect exactly one row; zero rows resolve to a not-found error.
    pub fn single(mut self) -> Self {
        self.ctx.single = true;
        self
    }

    /// Expect at most one row; zero rows resolve to `null` data, no error.
    pub fn maybe_single(mut self) -> Self {
        self.ctx.maybe_single = true;
        self
    }

    /// Return no data rows (count only, when requested).
    pub fn head(mut self) -> Self {
        self.ctx.head_only = true;
        self
    }

    /// Request the matching-row count alongside the data.
    pub fn count(mut self) -> Self {
        self.ctx.count_requested = true;
        self
    }

    // ==================== Mutations ====================

    /// Insert one row (object) or several (array of objects).
    pub fn insert(mut self, payload: Value) -> Self {
        self.ctx.op = Operation::Insert;
        self.set_payload(payload);
        self
    }

    /// Update filtered rows from a single-object payload.
    pub fn update(mut self, payload: Value) -> Self {
        self.ctx.op = Operation::Update;
        self.set_payload(payload);
        self
    }

    /// Delete filtered rows.
    pub fn delete(mut self) -> Self {
        self.ctx.op = Operation::Delete;
        self
    }

    /// Insert-or-update on the given conflict column.
    pub fn upsert(mut self, payload: Value, on_conflict: &str) -> Self {
        self.ctx.op = Operation::Upsert;
        self.ctx.conflict_key = Some(on_conflict.to_string());
        self.set_payload(payload);
        self
    }

    fn set_payload(&mut self, payload: Value) {
        match payload {
            Value::Object(row) => self.ctx.payload = vec![row],
            Value::Array(rows) => {
                let mut out = Vec::with_capacity(rows.len());
                for row in rows {
                    match row {
                        Value::Object(map) => out.push(map),
                        other => {
                            self.fail(QueryError::Payload(format!(
                                "payload rows must be objects, got {}",
                                other
                            )));
                            return;
                        }
                    }
                }
                self.ctx.payload = out;
            }
            other => self.fail(QueryError::Payload(format!(
                "payload must be an object or an array of objects, got {}",
                other
            ))),
        }
    }

    // ==================== Resolution ====================

    /// The compiled SQL for this statement (debug helper).
    pub fn to_sql(&self) -> QueryResult<String> {
        if let Some(err) = &self.build_error {
            return Err(err.clone());
        }
        Ok(self.ctx.compile()?.sql)
    }

    /// Compile, execute once, and reshape. The single suspension point of a
    /// statement's lifecycle.
    pub async fn resolve(self) -> QueryResult<QueryOutput> {
        if let Some(err) = self.build_error {
            return Err(err);
        }

        let count = if self.ctx.count_requested && self.ctx.op == Operation::Select {
            let counted = self.ctx.compile_count()?;
            let rows = self
                .pool
                .query(&counted.sql, &counted.params.as_refs())
                .await?;
            let row = rows
                .first()
                .ok_or_else(|| QueryError::Compiler("count query returned no row".to_string()))?;
            Some(
                row.try_get::<_, i64>(0)
                    .map_err(|e| QueryError::decode("count", e.to_string()))?,
            )
        } else {
            None
        };

        // A head-only SELECT needs no data query at all. Mutations still
        // execute; only their returned rows are discarded.
        if self.ctx.head_only && self.ctx.op == Operation::Select {
            return Ok(QueryOutput {
                data: Value::Null,
                count,
            });
        }

        let stmt = self.ctx.compile()?;
        let rows = self.pool.query(&stmt.sql, &stmt.params.as_refs()).await?;

        let mut decoded = Vec::with_capacity(rows.len());
        for row in &rows {
            let map = row_to_json(row)?;
            decoded.push(if self.ctx.projection.has_joins() {
                reshape_row(map, &self.ctx.projection.joins)
            } else {
                map
            });
        }

        let count = if self.ctx.count_requested && self.ctx.op != Operation::Select {
            Some(decoded.len() as i64)
        } else {
            count
        };

        if self.ctx.head_only {
            return Ok(QueryOutput {
                data: Value::Null,
                count,
            });
        }

        let data = shape_rows(decoded, self.ctx.single, self.ctx.maybe_single)?;
        Ok(QueryOutput { data, count })
    }
}

/// Apply single/maybe-single semantics to decoded rows.
fn shape_rows(
    rows: Vec<Map<String, Value>>,
    single: bool,
    maybe_single: bool,
) -> QueryResult<Value> {
    if single {
        return match rows.into_iter().next() {
            Some(row) => Ok(Value::Object(row)),
            None => Err(QueryError::not_found("expected one row, got none")),
        };
    }
    if maybe_single {
        return Ok(rows
            .into_iter()
            .next()
            .map(Value::Object)
            .unwrap_or(Value::Null));
    }
    Ok(Value::Array(rows.into_iter().map(Value::Object).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolConfig;
    use serde_json::json;

    // A pool handle is constructed lazily, so builder tests never touch the
    // network.
    fn pool() -> DbPool {
        DbPool::connect("postgres://pgfluent@localhost/pgfluent", PoolConfig::default()).unwrap()
    }

    fn from(table: &str) -> TableQuery {
        TableQuery::new(pool(), table)
    }

    #[test]
    fn chained_filters_compile_in_order() {
        let sql = from("members")
            .eq("status", "active")
            .gte("age", 18i32)
            .order("name", OrderOptions::default())
            .limit(10)
            .to_sql()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT members.* FROM members WHERE members.status = $1 \
             AND members.age >= $2 ORDER BY members.name ASC LIMIT 10"
        );
    }

    #[test]
    fn order_descending_with_nulls_last() {
        let sql = from("members")
            .order(
                "joined_at",
                OrderOptions {
                    ascending: false,
                    nulls_first: Some(false),
                },
            )
            .to_sql()
            .unwrap();
        assert!(sql.ends_with("ORDER BY members.joined_at DESC NULLS LAST"));
    }

    #[test]
    fn range_is_offset_limit_sugar() {
        let sql = from("members").range(10, 19).to_sql().unwrap();
        assert!(sql.ends_with("LIMIT 10 OFFSET 10"));
    }

    #[test]
    fn select_with_joins_compiles_left_joins() {
        let sql = from("payments")
            .select("id, profile:users!owner_id(name,email)")
            .to_sql()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT payments.id, _j_profile.name AS \"profile.name\", \
             _j_profile.email AS \"profile.email\" FROM payments \
             LEFT JOIN users _j_profile ON payments.owner_id = _j_profile.id"
        );
    }

    #[test]
    fn builder_error_is_reported_before_any_io() {
        let err = from("members")
            .or_filter("status.matches.active")
            .to_sql()
            .unwrap_err();
        assert!(matches!(err, QueryError::Filter(_)));
    }

    #[test]
    fn insert_payload_array() {
        let sql = from("members")
            .insert(json!([{"name": "A"}, {"name": "B"}]))
            .to_sql()
            .unwrap();
        assert_eq!(
            sql,
            "INSERT INTO members (name) VALUES ($1), ($2) RETURNING *"
        );
    }

    #[test]
    fn scalar_payload_is_rejected() {
        let err = from("members").insert(json!(42)).to_sql().unwrap_err();
        assert!(matches!(err, QueryError::Payload(_)));
    }

    #[test]
    fn filters_before_update_are_renumbered() {
        let sql = from("members")
            .eq("id", 7i64)
            .update(json!({"name": "New"}))
            .to_sql()
            .unwrap();
        assert_eq!(
            sql,
            "UPDATE members SET name = $1 WHERE members.id = $2 RETURNING *"
        );
    }

    #[test]
    fn upsert_sets_conflict_key() {
        let sql = from("members")
            .upsert(json!({"email": "a@x.no", "name": "A"}), "email")
            .to_sql()
            .unwrap();
        assert!(sql.contains("ON CONFLICT (email) DO UPDATE SET name = EXCLUDED.name"));
    }

    #[test]
    fn shape_single_errors_on_zero_rows() {
        let err = shape_rows(vec![], true, false).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn shape_maybe_single_returns_null_on_zero_rows() {
        let data = shape_rows(vec![], false, true).unwrap();
        assert_eq!(data, Value::Null);
    }

    #[test]
    fn shape_single_returns_object() {
        let row = json!({"id": 1}).as_object().cloned().unwrap();
        let data = shape_rows(vec![row], true, false).unwrap();
        assert_eq!(data, json!({"id": 1}));
    }

    #[test]
    fn shape_default_returns_array() {
        let row = json!({"id": 1}).as_object().cloned().unwrap();
        let data = shape_rows(vec![row], false, false).unwrap();
        assert_eq!(data, json!([{"id": 1}]));
    }
}
