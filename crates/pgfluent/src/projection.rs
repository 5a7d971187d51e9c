//! Projection expression parsing.
//!
//! A projection is a comma-separated list of segments; commas inside
//! parentheses do not split. Supported segment forms:
//!
//! - `*` — all base-table columns
//! - `column` — base-table column, auto-qualified
//! - `alias:column` — base-table column rendered as `column AS alias`
//! - `related(col, ...)` — join, foreign key inferred as `singular(related)_id`
//! - `related!fk(col, ...)` — join with an explicit foreign-key column
//! - `alias:related(col, ...)` / `alias:related!fk(col, ...)` — join whose
//!   nested output key is `alias`
//!
//! Segments that match no pattern are leniently treated as plain columns.

use crate::error::{QueryError, QueryResult};

/// One base-table column in the SELECT list.
#[derive(Clone, Debug, PartialEq)]
pub enum BaseColumn {
    /// `table.*`
    Star,
    /// `table.column [AS alias]`
    Column { name: String, alias: Option<String> },
}

/// Parsed description of one related-table join.
#[derive(Clone, Debug, PartialEq)]
pub struct JoinDescriptor {
    /// Table being joined.
    pub table: String,
    /// Foreign-key column on the owning table.
    pub foreign_key: String,
    /// Nested result key clients see in the output.
    pub alias: String,
    /// Columns projected from the joined table.
    pub columns: Vec<String>,
}

impl JoinDescriptor {
    /// Internal SQL alias, derived from the output alias so it cannot collide
    /// with the base table.
    pub fn sql_alias(&self) -> String {
        format!("_j_{}", self.alias)
    }
}

/// Parsed projection: base columns plus join descriptors.
#[derive(Clone, Debug, Default)]
pub struct Projection {
    pub base: Vec<BaseColumn>,
    pub joins: Vec<JoinDescriptor>,
}

impl Projection {
    /// Default projection: all base-table columns, no joins.
    pub fn all() -> Self {
        Self {
            base: vec![BaseColumn::Star],
            joins: Vec::new(),
        }
    }

    /// Parse a raw projection expression. Column qualification happens at
    /// render time in [`Projection::select_list`].
    pub fn parse(expr: &str) -> QueryResult<Self> {
        let mut base = Vec::new();
        let mut joins: Vec<JoinDescriptor> = Vec::new();

        for segment in split_top_level(expr) {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            if segment == "*" {
                base.push(BaseColumn::Star);
            } else if let Some(open) = segment.find('(') {
                let join = parse_join_segment(segment, open)?;
                if joins.iter().any(|j| j.alias == join.alias) {
                    return Err(QueryError::Projection(format!(
                        "duplicate join alias {:?} in projection {:?}",
                        join.alias, expr
                    )));
                }
                joins.push(join);
            } else if let Some((alias, column)) = segment.split_once(':') {
                base.push(BaseColumn::Column {
                    name: column.trim().to_string(),
                    alias: Some(alias.trim().to_string()),
                });
            } else {
                base.push(BaseColumn::Column {
                    name: segment.to_string(),
                    alias: None,
                });
            }
        }

        if base.is_empty() && joins.is_empty() {
            base.push(BaseColumn::Star);
        }
        Ok(Self { base, joins })
    }

    /// Render the final SELECT column list. Joined columns always follow base
    /// columns; each carries a compound `"alias.column"` output key for the
    /// reshaper.
    pub fn select_list(&self, table: &str) -> Vec<String> {
        let mut cols = Vec::new();
        if self.base.is_empty() {
            cols.push(format!("{}.*", table));
        }
        for col in &self.base {
            match col {
                BaseColumn::Star => cols.push(format!("{}.*", table)),
                BaseColumn::Column { name, alias } => {
                    let qualified = if name.contains('.') {
                        name.clone()
                    } else {
                        format!("{}.{}", table, name)
                    };
                    match alias {
                        Some(a) => cols.push(format!("{} AS {}", qualified, a)),
                        None => cols.push(qualified),
                    }
                }
            }
        }
        for join in &self.joins {
            let sql_alias = join.sql_alias();
            for col in &join.columns {
                cols.push(format!("{}.{} AS \"{}.{}\"", sql_alias, col, join.alias, col));
            }
        }
        cols
    }

    /// Whether any join is active (reshaping is skipped otherwise).
    pub fn has_joins(&self) -> bool {
        !self.joins.is_empty()
    }
}

/// Parse one `[alias:]table[!fk](col, ...)` join segment.
fn parse_join_segment(segment: &str, open: usize) -> QueryResult<JoinDescriptor> {
    let head = &segment[..open];
    let rest = &segment[open + 1..];
    let close = rest.rfind(')').ok_or_else(|| {
        QueryError::Projection(format!("unterminated join segment {:?}", segment))
    })?;

    let columns: Vec<String> = rest[..close]
        .split(',')
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();

    let (alias, spec) = match head.split_once(':') {
        Some((alias, spec)) => (Some(alias.trim().to_string()), spec.trim()),
        None => (None, head.trim()),
    };

    let (table, explicit_fk) = match spec.split_once('!') {
        Some((table, fk)) => (table.trim().to_string(), Some(fk.trim().to_string())),
        None => (spec.to_string(), None),
    };

    if table.is_empty() {
        return Err(QueryError::Projection(format!(
            "missing table name in join segment {:?}",
            segment
        )));
    }

    let foreign_key = explicit_fk.unwrap_or_else(|| format!("{}_id", singularize(&table)));
    let alias = alias.unwrap_or_else(|| table.clone());

    Ok(JoinDescriptor {
        table,
        foreign_key,
        alias,
        columns,
    })
}

/// Split on commas not enclosed in parentheses.
fn split_top_level(expr: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();

    for ch in expr.chars() {
        match ch {
            '(' => {
                depth += 1;
                current.push(ch);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if depth == 0 => {
                segments.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    segments.push(current);
    segments
}

/// Best-effort English singularization for foreign-key inference.
fn singularize(table: &str) -> String {
    if let Some(stem) = table.strip_suffix("ies") {
        return format!("{}y", stem);
    }
    for suffix in ["sses", "shes", "ches", "xes", "zes"] {
        if let Some(stem) = table.strip_suffix(suffix) {
            return format!("{}{}", stem, &suffix[..suffix.len() - 2]);
        }
    }
    table.strip_suffix('s').unwrap_or(table).to_string()
}
