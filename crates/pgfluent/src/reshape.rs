//! Flat-row to nested-object reshaping.
//!
//! Joined columns arrive under compound `"alias.column"` keys. When joins are
//! active, those keys are regrouped into one sub-object per join alias; a
//! sub-object whose values are all null is the signature of an unmatched
//! outer join and collapses to `null`.

use crate::projection::JoinDescriptor;
use serde_json::{Map, Value};

/// Reshape one flat row. Keys without a recognized alias prefix stay at the
/// top level unchanged. No-op (and never called) when no joins are active.
pub fn reshape_row(row: Map<String, Value>, joins: &[JoinDescriptor]) -> Map<String, Value> {
    let mut top = Map::with_capacity(row.len());
    let mut nested: Vec<(String, Map<String, Value>)> = joins
        .iter()
        .map(|j| (j.alias.clone(), Map::new()))
        .collect();

    'keys: for (key, value) in row {
        if let Some((prefix, column)) = key.split_once('.') {
            for (alias, sub) in nested.iter_mut() {
                if alias == prefix {
                    sub.insert(column.to_string(), value);
                    continue 'keys;
                }
            }
        }
        top.insert(key, value);
    }

    for (alias, sub) in nested {
        if sub.is_empty() {
            continue;
        }
        if sub.values().all(Value::is_null) {
            top.insert(alias, Value::Null);
        } else {
            top.insert(alias, Value::Object(sub));
        }
    }
    top
}
