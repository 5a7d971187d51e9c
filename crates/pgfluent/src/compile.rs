//! Statement compilation: one `StatementContext` in, one SQL string plus its
//! parameter array out.
//!
//! Placeholder numbering is owned by `ParamList` for every clause except the
//! UPDATE WHERE clause, whose predicates may have been accumulated before the
//! SET payload was known; those are shifted to continue after the SET
//! parameters. A final invariant check rejects any statement whose highest
//! `$n` disagrees with the parameter count.

use crate::error::{QueryError, QueryResult};
use crate::param::{Param, ParamList};
use crate::predicate::PredicateSet;
use crate::projection::Projection;
use serde_json::{Map, Value};

/// Operation tag for one statement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Select,
    Insert,
    Update,
    Delete,
    Upsert,
}

/// Mutable accumulator for one in-progress statement. Created when a builder
/// is obtained for a table, discarded after the single compile+execute cycle.
#[derive(Clone, Debug)]
pub struct StatementContext {
    pub table: String,
    pub op: Operation,
    pub predicates: PredicateSet,
    pub projection: Projection,
    pub order_clauses: Vec<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    /// Insert/update/upsert payload, one map per row.
    pub payload: Vec<Map<String, Value>>,
    pub conflict_key: Option<String>,
    pub single: bool,
    pub maybe_single: bool,
    pub head_only: bool,
    pub count_requested: bool,
}

impl StatementContext {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            op: Operation::Select,
            predicates: PredicateSet::new(table),
            projection: Projection::all(),
            order_clauses: Vec::new(),
            limit: None,
            offset: None,
            payload: Vec::new(),
            conflict_key: None,
            single: false,
            maybe_single: false,
            head_only: false,
            count_requested: false,
        }
    }

    /// Compile into the final SQL text and parameter array.
    pub fn compile(&self) -> QueryResult<CompiledStatement> {
        let compiled = match self.op {
            Operation::Select => self.compile_select()?,
            Operation::Insert => self.compile_insert(false)?,
            Operation::Upsert => self.compile_insert(true)?,
            Operation::Update => self.compile_update()?,
            Operation::Delete => self.compile_delete()?,
        };
        compiled.verify()?;
        Ok(compiled)
    }

    /// Compile the companion count query (same FROM/JOIN/WHERE, no
    /// projection/order/pagination).
    pub fn compile_count(&self) -> QueryResult<CompiledStatement> {
        let mut params = ParamList::new();
        let mut sql = format!("SELECT COUNT(*) FROM {}", self.table);
        self.push_joins(&mut sql);
        self.push_where(&mut sql, &mut params);
        let compiled = CompiledStatement { sql, params };
        compiled.verify()?;
        Ok(compiled)
    }

    fn compile_select(&self) -> QueryResult<CompiledStatement> {
        let mut params = ParamList::new();
        let cols = self.projection.select_list(&self.table).join(", ");
        let mut sql = format!("SELECT {} FROM {}", cols, self.table);

        self.push_joins(&mut sql);
        self.push_where(&mut sql, &mut params);

        if !self.order_clauses.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_clauses.join(", "));
        }

        // single()/maybe_single() force LIMIT 1
        let limit = if self.single || self.maybe_single {
            Some(1)
        } else {
            self.limit
        };
        if let Some(n) = limit {
            sql.push_str(&format!(" LIMIT {}", n));
        }
        if let Some(n) = self.offset {
            sql.push_str(&format!(" OFFSET {}", n));
        }

        Ok(CompiledStatement { sql, params })
    }

    fn compile_insert(&self, upsert: bool) -> QueryResult<CompiledStatement> {
        let columns = self.payload_columns()?;
        let mut params = ParamList::new();

        let mut tuples = Vec::with_capacity(self.payload.len());
        for row in &self.payload {
            let placeholders: Vec<String> = columns
                .iter()
                .map(|col| {
                    let value = row.get(col).cloned().unwrap_or(Value::Null);
                    format!("${}", params.push_param(Param::from_json(value)))
                })
                .collect();
            tuples.push(format!("({})", placeholders.join(", ")));
        }

        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.table,
            columns.join(", "),
            tuples.join(", ")
        );

        if upsert {
            let key = self.conflict_key.as_deref().ok_or_else(|| {
                QueryError::Payload("upsert requires an on_conflict column".to_string())
            })?;
            let updates: Vec<String> = columns
                .iter()
                .filter(|col| col.as_str() != key)
                .map(|col| format!("{} = EXCLUDED.{}", col, col))
                .collect();
            if updates.is_empty() {
                sql.push_str(&format!(" ON CONFLICT ({}) DO NOTHING", key));
            } else {
                sql.push_str(&format!(
                    " ON CONFLICT ({}) DO UPDATE SET {}",
                    key,
                    updates.join(", ")
                ));
            }
        }

        sql.push_str(" RETURNING *");
        Ok(CompiledStatement { sql, params })
    }

    fn compile_update(&self) -> QueryResult<CompiledStatement> {
        if self.payload.len() != 1 {
            return Err(QueryError::Payload(format!(
                "update requires exactly one payload row, got {}",
                self.payload.len()
            )));
        }
        let row = &self.payload[0];
        if row.is_empty() {
            return Err(QueryError::Payload("update payload is empty".to_string()));
        }

        let mut params = ParamList::new();
        let set_parts: Vec<String> = row
            .iter()
            .map(|(col, value)| {
                let idx = params.push_param(Param::from_json(value.clone()));
                format!("{} = ${}", col, idx)
            })
            .collect();

        let mut sql = format!("UPDATE {} SET {}", self.table, set_parts.join(", "));

        // Predicates were numbered independently; shift them past the SET params.
        if !self.predicates.is_empty() {
            let where_sql = self.predicates.build_with_offset(params.len(), &mut params);
            sql.push_str(" WHERE ");
            sql.push_str(&where_sql);
        }

        sql.push_str(" RETURNING *");
        Ok(CompiledStatement { sql, params })
    }

    fn compile_delete(&self) -> QueryResult<CompiledStatement> {
        if self.predicates.is_empty() {
            return Err(QueryError::Filter(
                "delete requires at least one filter".to_string(),
            ));
        }
        let mut params = ParamList::new();
        let mut sql = format!("DELETE FROM {}", self.table);
        self.push_where(&mut sql, &mut params);
        sql.push_str(" RETURNING *");
        Ok(CompiledStatement { sql, params })
    }

    fn push_joins(&self, sql: &mut String) {
        for join in &self.projection.joins {
            let alias = join.sql_alias();
            sql.push_str(&format!(
                " LEFT JOIN {} {} ON {}.{} = {}.id",
                join.table, alias, self.table, join.foreign_key, alias
            ));
        }
    }

    fn push_where(&self, sql: &mut String, params: &mut ParamList) {
        if !self.predicates.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.predicates.build(params));
        }
    }

    /// Column list for insert/upsert, taken from the first payload row.
    /// Rows must be homogeneous.
    fn payload_columns(&self) -> QueryResult<Vec<String>> {
        let first = self
            .payload
            .first()
            .ok_or_else(|| QueryError::Payload("insert payload is empty".to_string()))?;
        if first.is_empty() {
            return Err(QueryError::Payload(
                "insert payload row has no columns".to_string(),
            ));
        }
        let columns: Vec<String> = first.keys().cloned().collect();
        for (i, row) in self.payload.iter().enumerate().skip(1) {
            if row.len() != columns.len() || !columns.iter().all(|c| row.contains_key(c)) {
                return Err(QueryError::Payload(format!(
                    "insert payload rows are not homogeneous: row {} differs from row 0",
                    i
                )));
            }
        }
        Ok(columns)
    }
}

/// Immutable output of compilation, executed exactly once.
#[derive(Debug)]
pub struct CompiledStatement {
    pub sql: String,
    pub params: ParamList,
}

impl CompiledStatement {
    /// Check the placeholder/parameter lock-step invariant: the highest `$n`
    /// in the SQL must equal the parameter count. A mismatch is a compiler
    /// bug and must never reach the database.
    fn verify(&self) -> QueryResult<()> {
        let highest = highest_placeholder(&self.sql);
        if highest != self.params.len() {
            return Err(QueryError::Compiler(format!(
                "placeholder/parameter mismatch: highest placeholder ${}, {} parameters, sql: {}",
                highest,
                self.params.len(),
                self.sql
            )));
        }
        Ok(())
    }
}

fn highest_placeholder(sql: &str) -> usize {
    let mut highest = 0usize;
    let mut chars = sql.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '$' {
            continue;
        }
        let mut num = String::new();
        while let Some(&next) = chars.peek() {
            if next.is_ascii_digit() {
                num.push(next);
                chars.next();
            } else {
                break;
            }
        }
        if let Ok(idx) = num.parse::<usize>() {
            highest = highest.max(idx);
        }
    }
    highest
}
