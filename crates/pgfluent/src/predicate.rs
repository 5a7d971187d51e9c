//! Predicate accumulation for WHERE clauses.
//!
//! Each filter call appends one SQL fragment; placeholder indices are taken
//! from the shared `ParamList` at build time, never via string substitution
//! after the fact. Bare column references are qualified with the owning table
//! name so they stay unambiguous once joins are present.

use crate::error::{QueryError, QueryResult};
use crate::param::{Param, ParamList};
use serde_json::Value;
use tokio_postgres::types::ToSql;

/// One WHERE condition fragment plus its bound parameter(s).
#[derive(Clone, Debug)]
pub enum Predicate {
    /// column op $n
    Compare {
        column: String,
        op: &'static str,
        value: Param,
    },

    /// column IS NULL / column IS NOT NULL
    NullCheck { column: String, is_null: bool },

    /// column IS TRUE / column IS FALSE
    BoolTest { column: String, expected: bool },

    /// column IN ($1, $2, ...) or column NOT IN (...)
    InList {
        column: String,
        values: Vec<Param>,
        negated: bool,
    },

    /// jsonb containment: column @> $n or column <@ $n
    JsonCompare {
        column: String,
        op: &'static str,
        value: Param,
    },

    /// Parenthesized OR group of sub-predicates.
    OrGroup(Vec<Predicate>),

    /// Matches every row (empty NOT IN list).
    AlwaysTrue,

    /// Matches no row (empty IN list).
    AlwaysFalse,
}

impl Predicate {
    /// Render this predicate, appending its parameters to `params`.
    pub fn build(&self, params: &mut ParamList) -> String {
        match self {
            Predicate::Compare { column, op, value } => {
                let idx = params.push_param(value.clone());
                format!("{} {} ${}", column, op, idx)
            }
            Predicate::NullCheck { column, is_null } => {
                if *is_null {
                    format!("{} IS NULL", column)
                } else {
                    format!("{} IS NOT NULL", column)
                }
            }
            Predicate::BoolTest { column, expected } => {
                if *expected {
                    format!("{} IS TRUE", column)
                } else {
                    format!("{} IS FALSE", column)
                }
            }
            Predicate::InList {
                column,
                values,
                negated,
            } => {
                let placeholders: Vec<String> = values
                    .iter()
                    .map(|v| format!("${}", params.push_param(v.clone())))
                    .collect();
                let op = if *negated { "NOT IN" } else { "IN" };
                format!("{} {} ({})", column, op, placeholders.join(", "))
            }
            Predicate::JsonCompare { column, op, value } => {
                let idx = params.push_param(value.clone());
                format!("{} {} ${}", column, op, idx)
            }
            Predicate::OrGroup(preds) => {
                let parts: Vec<String> = preds.iter().map(|p| p.build(params)).collect();
                format!("({})", parts.join(" OR "))
            }
            Predicate::AlwaysTrue => "TRUE".to_string(),
            Predicate::AlwaysFalse => "FALSE".to_string(),
        }
    }
}

/// Ordered collection of predicates, AND-joined at the top level.
#[derive(Clone, Debug, Default)]
pub struct PredicateSet {
    table: String,
    preds: Vec<Predicate>,
}

impl PredicateSet {
    /// Create an empty set owning predicates for `table`.
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            preds: Vec::new(),
        }
    }

    /// Qualify a bare column with the owning table name.
    fn qualify(&self, column: &str) -> String {
        if column.contains('.') {
            column.to_string()
        } else {
            format!("{}.{}", self.table, column)
        }
    }

    fn compare<T: ToSql + Send + Sync + 'static>(&mut self, column: &str, op: &'static str, value: T) {
        self.preds.push(Predicate::Compare {
            column: self.qualify(column),
            op,
            value: Param::new(value),
        });
    }

    /// column = value
    pub fn eq<T: ToSql + Send + Sync + 'static>(&mut self, column: &str, value: T) {
        self.compare(column, "=", value);
    }

    /// column != value
    pub fn neq<T: ToSql + Send + Sync + 'static>(&mut self, column: &str, value: T) {
        self.compare(column, "!=", value);
    }

    /// column > value
    pub fn gt<T: ToSql + Send + Sync + 'static>(&mut self, column: &str, value: T) {
        self.compare(column, ">", value);
    }

    /// column >= value
    pub fn gte<T: ToSql + Send + Sync + 'static>(&mut self, column: &str, value: T) {
        self.compare(column, ">=", value);
    }

    /// column < value
    pub fn lt<T: ToSql + Send + Sync + 'static>(&mut self, column: &str, value: T) {
        self.compare(column, "<", value);
    }

    /// column <= value
    pub fn lte<T: ToSql + Send + Sync + 'static>(&mut self, column: &str, value: T) {
        self.compare(column, "<=", value);
    }

    /// column LIKE pattern
    pub fn like<T: ToSql + Send + Sync + 'static>(&mut self, column: &str, pattern: T) {
        self.compare(column, "LIKE", pattern);
    }

    /// column ILIKE pattern (case-insensitive)
    pub fn ilike<T: ToSql + Send + Sync + 'static>(&mut self, column: &str, pattern: T) {
        self.compare(column, "ILIKE", pattern);
    }

    /// column IS NULL
    pub fn is_null(&mut self, column: &str) {
        self.preds.push(Predicate::NullCheck {
            column: self.qualify(column),
            is_null: true,
        });
    }

    /// column IS NOT NULL
    pub fn is_not_null(&mut self, column: &str) {
        self.preds.push(Predicate::NullCheck {
            column: self.qualify(column),
            is_null: false,
        });
    }

    /// column IS TRUE
    pub fn is_true(&mut self, column: &str) {
        self.preds.push(Predicate::BoolTest {
            column: self.qualify(column),
            expected: true,
        });
    }

    /// column IS FALSE
    pub fn is_false(&mut self, column: &str) {
        self.preds.push(Predicate::BoolTest {
            column: self.qualify(column),
            expected: false,
        });
    }

    /// column IN (values...). An empty list compiles to FALSE, never `IN ()`.
    pub fn in_list<T: ToSql + Send + Sync + 'static>(&mut self, column: &str, values: Vec<T>) {
        if values.is_empty() {
            self.preds.push(Predicate::AlwaysFalse);
            return;
        }
        self.preds.push(Predicate::InList {
            column: self.qualify(column),
            values: values.into_iter().map(Param::new).collect(),
            negated: false,
        });
    }

    /// column NOT IN (values...). An empty list compiles to TRUE.
    pub fn not_in<T: ToSql + Send + Sync + 'static>(&mut self, column: &str, values: Vec<T>) {
        if values.is_empty() {
            self.preds.push(Predicate::AlwaysTrue);
            return;
        }
        self.preds.push(Predicate::InList {
            column: self.qualify(column),
            values: values.into_iter().map(Param::new).collect(),
            negated: true,
        });
    }

    /// jsonb containment: column @> value
    pub fn contains(&mut self, column: &str, value: Value) {
        self.preds.push(Predicate::JsonCompare {
            column: self.qualify(column),
            op: "@>",
            value: Param::new(value),
        });
    }

    /// jsonb containment: column <@ value
    pub fn contained_by(&mut self, column: &str, value: Value) {
        self.preds.push(Predicate::JsonCompare {
            column: self.qualify(column),
            op: "<@",
            value: Param::new(value),
        });
    }

    /// Parse a compact `column.operator.value` OR group and append it as one
    /// parenthesized predicate.
    ///
    /// Terms are comma-separated with no nesting: `"status.eq.active,age.gte.18"`.
    /// An unknown operator tag is rejected before any SQL is built.
    pub fn or_group(&mut self, raw: &str) -> QueryResult<()> {
        let mut members = Vec::new();
        for term in raw.split(',') {
            let term = term.trim();
            if term.is_empty() {
                continue;
            }
            members.push(self.parse_or_term(term)?);
        }
        if members.is_empty() {
            return Err(QueryError::Filter(format!("empty OR group: {:?}", raw)));
        }
        self.preds.push(Predicate::OrGroup(members));
        Ok(())
    }

    fn parse_or_term(&self, term: &str) -> QueryResult<Predicate> {
        let mut parts = term.splitn(3, '.');
        let (column, op, value) = match (parts.next(), parts.next(), parts.next()) {
            (Some(c), Some(o), Some(v)) if !c.is_empty() => (c, o, v),
            _ => {
                return Err(QueryError::Filter(format!(
                    "malformed OR term {:?}: expected column.operator.value",
                    term
                )));
            }
        };
        let column = self.qualify(column);

        let sql_op = match op {
            "eq" => "=",
            "neq" => "!=",
            "gt" => ">",
            "gte" => ">=",
            "lt" => "<",
            "lte" => "<=",
            "like" => "LIKE",
            "ilike" => "ILIKE",
            "is" => {
                return match value {
                    "null" => Ok(Predicate::NullCheck {
                        column,
                        is_null: true,
                    }),
                    "true" => Ok(Predicate::BoolTest {
                        column,
                        expected: true,
                    }),
                    "false" => Ok(Predicate::BoolTest {
                        column,
                        expected: false,
                    }),
                    other => Err(QueryError::Filter(format!(
                        "unsupported `is` operand {:?} in OR term {:?}",
                        other, term
                    ))),
                };
            }
            unknown => {
                return Err(QueryError::Filter(format!(
                    "unknown operator tag {:?} in OR term {:?}",
                    unknown, term
                )));
            }
        };

        // Values ride as text and coerce to the column's type on the wire.
        Ok(Predicate::Compare {
            column,
            op: sql_op,
            value: Param::from_json(Value::String(value.to_string())),
        })
    }

    /// Check if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.preds.is_empty()
    }

    /// Build the WHERE clause content (without the WHERE keyword),
    /// AND-joining the accumulated predicates.
    pub fn build(&self, params: &mut ParamList) -> String {
        let parts: Vec<String> = self.preds.iter().map(|p| p.build(params)).collect();
        parts.join(" AND ")
    }

    /// Build with placeholder numbers shifted by `offset`.
    ///
    /// Needed for UPDATE: predicates may be accumulated before the SET payload
    /// is known, so their indices must continue after the SET parameters.
    pub fn build_with_offset(&self, offset: usize, params: &mut ParamList) -> String {
        let mut local = ParamList::new();
        let sql = self.build(&mut local);
        params.extend(&local);
        if offset == 0 {
            sql
        } else {
            shift_placeholders(&sql, offset)
        }
    }
}

/// Shift placeholder numbers in a SQL fragment by `offset`.
///
/// With offset=3: `$1 AND $2` becomes `$4 AND $5`.
pub(crate) fn shift_placeholders(sql: &str, offset: usize) -> String {
    let mut result = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' {
            let mut num = String::new();
            while let Some(&next) = chars.peek() {
                if next.is_ascii_digit() {
                    num.push(next);
                    chars.next();
                } else {
                    break;
                }
            }
            result.push('$');
            match num.parse::<usize>() {
                Ok(idx) => result.push_str(&(idx + offset).to_string()),
                Err(_) => result.push_str(&num),
            }
        } else {
            result.push(ch);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_are_and_joined_with_sequential_placeholders() {
        let mut set = PredicateSet::new("members");
        set.eq("status", "active");
        set.gt("age", 18i32);
        let mut params = ParamList::new();
        let sql = set.build(&mut params);
        assert_eq!(sql, "members.status = $1 AND members.age > $2");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn qualified_columns_pass_through() {
        let mut set = PredicateSet::new("members");
        set.eq("households.city", "Oslo");
        let mut params = ParamList::new();
        assert_eq!(set.build(&mut params), "households.city = $1");
    }

    #[test]
    fn empty_in_list_compiles_to_false() {
        let mut set = PredicateSet::new("members");
        set.in_list::<i64>("id", vec![]);
        let mut params = ParamList::new();
        assert_eq!(set.build(&mut params), "FALSE");
        assert_eq!(params.len(), 0);
    }

    #[test]
    fn empty_not_in_list_compiles_to_true() {
        let mut set = PredicateSet::new("members");
        set.not_in::<i64>("id", vec![]);
        let mut params = ParamList::new();
        assert_eq!(set.build(&mut params), "TRUE");
    }

    #[test]
    fn in_list_emits_one_placeholder_per_value() {
        let mut set = PredicateSet::new("members");
        set.in_list("id", vec![1i64, 2, 3]);
        let mut params = ParamList::new();
        assert_eq!(set.build(&mut params), "members.id IN ($1, $2, $3)");
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn or_group_is_parenthesized() {
        let mut set = PredicateSet::new("members");
        set.or_group("status.eq.active,role.eq.admin").unwrap();
        let mut params = ParamList::new();
        let sql = set.build(&mut params);
        assert_eq!(sql, "(members.status = $1 OR members.role = $2)");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn or_group_supports_is_null() {
        let mut set = PredicateSet::new("members");
        set.or_group("deleted_at.is.null,archived.is.true").unwrap();
        let mut params = ParamList::new();
        let sql = set.build(&mut params);
        assert_eq!(
            sql,
            "(members.deleted_at IS NULL OR members.archived IS TRUE)"
        );
        assert_eq!(params.len(), 0);
    }

    #[test]
    fn or_group_rejects_unknown_operator() {
        let mut set = PredicateSet::new("members");
        let err = set.or_group("status.matches.active").unwrap_err();
        assert!(matches!(err, QueryError::Filter(_)));
    }

    #[test]
    fn or_group_rejects_malformed_term() {
        let mut set = PredicateSet::new("members");
        assert!(set.or_group("status").is_err());
        assert!(set.or_group("").is_err());
    }

    #[test]
    fn or_group_value_may_contain_dots() {
        let mut set = PredicateSet::new("members");
        set.or_group("email.eq.a.b@example.com").unwrap();
        let mut params = ParamList::new();
        assert_eq!(set.build(&mut params), "(members.email = $1)");
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn null_checks_bind_no_parameters() {
        let mut set = PredicateSet::new("members");
        set.is_null("deleted_at");
        set.is_false("archived");
        let mut params = ParamList::new();
        let sql = set.build(&mut params);
        assert_eq!(
            sql,
            "members.deleted_at IS NULL AND members.archived IS FALSE"
        );
        assert_eq!(params.len(), 0);
    }

    #[test]
    fn json_containment_operators() {
        let mut set = PredicateSet::new("members");
        set.contains("tags", serde_json::json!(["board"]));
        set.contained_by("flags", serde_json::json!({"a": 1}));
        let mut params = ParamList::new();
        let sql = set.build(&mut params);
        assert_eq!(sql, "members.tags @> $1 AND members.flags <@ $2");
    }

    #[test]
    fn shift_placeholders_adds_offset() {
        assert_eq!(shift_placeholders("$1 AND $2 AND $10", 5), "$6 AND $7 AND $15");
    }

    #[test]
    fn build_with_offset_renumbers_but_keeps_params() {
        let mut set = PredicateSet::new("members");
        set.eq("name", "alice");
        set.gt("age", 18i32);
        let mut params = ParamList::new();
        let sql = set.build_with_offset(3, &mut params);
        assert_eq!(sql, "members.name = $4 AND members.age > $5");
        assert_eq!(params.len(), 2);
    }
}
