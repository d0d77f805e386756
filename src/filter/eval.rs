//! Evaluates compiled conditions against JSON records.

use std::cmp::Ordering;

use serde_json::{Map, Value};

use super::compile::{Condition, OrderBy, Predicate};
use super::types::SortDirection;

impl Condition {
    pub fn matches(&self, record: &Map<String, Value>) -> bool {
        match self {
            Condition::And(children) => children.iter().all(|c| c.matches(record)),
            Condition::Or(children) => children.iter().any(|c| c.matches(record)),
            Condition::Column { column, predicate } => {
                let actual = record.get(column).unwrap_or(&Value::Null);
                predicate.matches(actual)
            }
        }
    }
}

impl Predicate {
    pub fn matches(&self, actual: &Value) -> bool {
        match self {
            Predicate::Eq(expected) => values_equal(actual, expected),
            Predicate::Ne(expected) => !values_equal(actual, expected),
            Predicate::Gt(bound) => compare(actual, bound) == Some(Ordering::Greater),
            Predicate::Gte(bound) => matches!(compare(actual, bound), Some(Ordering::Greater | Ordering::Equal)),
            Predicate::Lt(bound) => compare(actual, bound) == Some(Ordering::Less),
            Predicate::Lte(bound) => matches!(compare(actual, bound), Some(Ordering::Less | Ordering::Equal)),
            Predicate::In(values) => values.iter().any(|v| values_equal(actual, v)),
            Predicate::NotIn(values) => !values.iter().any(|v| values_equal(actual, v)),
            Predicate::Contains { needle, case_insensitive } => match as_text(actual) {
                Some(text) if *case_insensitive => text.to_lowercase().contains(&needle.to_lowercase()),
                Some(text) => text.contains(needle.as_str()),
                None => false,
            },
            Predicate::NotContains(needle) => match as_text(actual) {
                Some(text) => !text.contains(needle.as_str()),
                None => false,
            },
            Predicate::StartsWith(prefix) => as_text(actual).is_some_and(|t| t.starts_with(prefix.as_str())),
            Predicate::EndsWith(suffix) => as_text(actual).is_some_and(|t| t.ends_with(suffix.as_str())),
            Predicate::IsNull => actual.is_null(),
            Predicate::IsNotNull => !actual.is_null(),
            Predicate::Between(low, high) => {
                matches!(compare(actual, low), Some(Ordering::Greater | Ordering::Equal))
                    && matches!(compare(actual, high), Some(Ordering::Less | Ordering::Equal))
            }
        }
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

pub fn values_equal(a: &Value, b: &Value) -> bool {
    match compare(a, b) {
        Some(ordering) => ordering == Ordering::Equal,
        None => a == b,
    }
}

/// Numbers compare numerically, strings lexically; a number and a numeric
/// string compare as numbers. Anything else is unordered.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Number(x), Value::String(y)) => x.as_f64()?.partial_cmp(&y.trim().parse::<f64>().ok()?),
        (Value::String(x), Value::Number(y)) => x.trim().parse::<f64>().ok()?.partial_cmp(&y.as_f64()?),
        _ => None,
    }
}

/// Stable multi-key sort; nulls sort first ascending.
pub fn sort_records(records: &mut [Map<String, Value>], order: &[OrderBy]) {
    if order.is_empty() {
        return;
    }
    records.sort_by(|a, b| {
        for o in order {
            let left = a.get(&o.column).unwrap_or(&Value::Null);
            let right = b.get(&o.column).unwrap_or(&Value::Null);
            let ordering = match (left.is_null(), right.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                _ => compare(left, right).unwrap_or(Ordering::Equal),
            };
            let ordering = match o.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}
