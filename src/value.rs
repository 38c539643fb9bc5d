//! Small helpers over JSON cell values shared by hydration and the in-memory adapter.

use serde_json::Value;
use std::cmp::Ordering;

/// Normalized grouping key for a join column value. Only strings and numbers join.
pub fn join_key(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Bool(_) => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Array(_) | Value::Object(_) => 3,
        Value::Null => 4,
    }
}

/// Ascending order with nulls last, matching PostgreSQL's default.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Descending is the exact reverse, so nulls come first.
pub fn compare_directed(a: &Value, b: &Value, descending: bool) -> Ordering {
    let ord = compare_values(a, b);
    if descending {
        ord.reverse()
    } else {
        ord
    }
}
