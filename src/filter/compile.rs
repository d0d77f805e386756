//! Lowers a [`FilterTree`] into a backend-neutral [`Condition`].
//!
//! Unknown fields, unknown operators and values that cannot take the
//! column's type are dropped with a warning; compiling never fails. Backends consume the result through `filter_where` (SQL) or
//! `eval` (in-memory).

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;
use uuid::Uuid;

use crate::schema::FieldType;

use super::types::{Comparison, FilterNode, FilterOp, FilterTree, SortDirection, SortSpec};

/// Column vocabulary a tree is compiled against.
pub trait CompileTarget {
    fn target_name(&self) -> &str;

    /// `None` when the field is not a column of the target.
    fn field_type(&self, field: &str) -> Option<FieldType>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    Contains { needle: String, case_insensitive: bool },
    NotContains(String),
    StartsWith(String),
    EndsWith(String),
    IsNull,
    IsNotNull,
    /// Inclusive on both ends
    Between(Value, Value),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Column { column: String, predicate: Predicate },
    And(Vec<Condition>),
    Or(Vec<Condition>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub direction: SortDirection,
}

pub fn compile<T: CompileTarget + ?Sized>(target: &T, tree: &FilterTree) -> Option<Condition> {
    let conditions = tree
        .nodes()
        .iter()
        .filter_map(|node| compile_node(target, node))
        .collect();
    combine(conditions, Condition::And)
}

fn compile_node<T: CompileTarget + ?Sized>(target: &T, node: &FilterNode) -> Option<Condition> {
    match node {
        FilterNode::And(branches) => {
            let children = branches.iter().filter_map(|b| compile(target, b)).collect();
            combine(children, Condition::And)
        }
        FilterNode::Or(branches) => {
            let children = branches.iter().filter_map(|b| compile(target, b)).collect();
            combine(children, Condition::Or)
        }
        FilterNode::Field { field, comparison } => {
            let Some(field_type) = target.field_type(field) else {
                tracing::warn!("Unknown field '{}' on {}, ignoring filter", field, target.target_name());
                return None;
            };
            match comparison {
                Comparison::Equals(value) => Some(Condition::Column {
                    column: field.clone(),
                    predicate: Predicate::Eq(coerce(value, field_type)?),
                }),
                Comparison::Operators(ops) => {
                    let conditions = ops
                        .iter()
                        .filter_map(|(op, value)| {
                            let predicate = apply_operator(op, value, field_type)?;
                            Some(Condition::Column { column: field.clone(), predicate })
                        })
                        .collect();
                    combine(conditions, Condition::And)
                }
            }
        }
    }
}

fn combine(mut conditions: Vec<Condition>, wrap: fn(Vec<Condition>) -> Condition) -> Option<Condition> {
    match conditions.len() {
        0 => None,
        1 => conditions.pop(),
        _ => Some(wrap(conditions)),
    }
}

fn apply_operator(op_key: &str, value: &Value, field_type: FieldType) -> Option<Predicate> {
    let Some(op) = FilterOp::from_key(op_key) else {
        tracing::warn!("Unknown operator: {}", op_key);
        return None;
    };

    let predicate = match op {
        FilterOp::Eq => Predicate::Eq(coerce(value, field_type)?),
        FilterOp::Ne => Predicate::Ne(coerce(value, field_type)?),
        FilterOp::Gt => Predicate::Gt(coerce(value, field_type)?),
        FilterOp::Gte => Predicate::Gte(coerce(value, field_type)?),
        FilterOp::Lt => Predicate::Lt(coerce(value, field_type)?),
        FilterOp::Lte => Predicate::Lte(coerce(value, field_type)?),
        FilterOp::In => Predicate::In(list(value, field_type)?),
        FilterOp::NotIn => Predicate::NotIn(list(value, field_type)?),
        FilterOp::Contains => Predicate::Contains { needle: text(value), case_insensitive: false },
        FilterOp::ContainsI => Predicate::Contains { needle: text(value), case_insensitive: true },
        FilterOp::NotContains => Predicate::NotContains(text(value)),
        FilterOp::StartsWith => Predicate::StartsWith(text(value)),
        FilterOp::EndsWith => Predicate::EndsWith(text(value)),
        FilterOp::Null => {
            if truthy(value) { Predicate::IsNull } else { Predicate::IsNotNull }
        }
        FilterOp::NotNull => {
            if truthy(value) { Predicate::IsNotNull } else { Predicate::IsNull }
        }
        FilterOp::Between => {
            let bounds = list(value, field_type)?;
            if bounds.len() != 2 {
                tracing::warn!("$between requires exactly 2 values, got {}", bounds.len());
                return None;
            }
            let mut it = bounds.into_iter();
            let (low, high) = (it.next()?, it.next()?);
            Predicate::Between(low, high)
        }
    };
    Some(predicate)
}

/// Query values arrive as strings; give them the column's type. `None` when
/// the string cannot hold a value of that type, which drops the comparison.
pub fn coerce(value: &Value, field_type: FieldType) -> Option<Value> {
    let Value::String(s) = value else { return Some(value.clone()) };
    let trimmed = s.trim();
    let coerced = match field_type {
        FieldType::Integer => trimmed.parse::<i64>().ok().map(Value::from),
        FieldType::Float => trimmed
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number),
        FieldType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
            "true" | "1" => Some(Value::Bool(true)),
            "false" | "0" => Some(Value::Bool(false)),
            _ => None,
        },
        FieldType::Uuid => Uuid::parse_str(trimmed).ok().map(|_| Value::String(trimmed.to_string())),
        FieldType::Timestamp if is_timestamp(trimmed) => Some(Value::String(trimmed.to_string())),
        FieldType::Timestamp => None,
        _ => Some(value.clone()),
    };
    if coerced.is_none() {
        tracing::warn!("Value '{}' is not a valid {}, ignoring comparison", s, field_type.as_str());
    }
    coerced
}

fn is_timestamp(s: &str) -> bool {
    DateTime::parse_from_rfc3339(s).is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").is_ok()
        || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

/// Arrays or comma-separated strings; one bad element drops the whole list.
fn list(value: &Value, field_type: FieldType) -> Option<Vec<Value>> {
    match value {
        Value::Array(items) => items.iter().map(|v| coerce(v, field_type)).collect(),
        Value::String(s) => s
            .split(',')
            .map(|part| coerce(&Value::String(part.trim().to_string()), field_type))
            .collect(),
        Value::Null => Some(Vec::new()),
        other => Some(vec![other.clone()]),
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1"),
        Value::Number(n) => n.as_i64() == Some(1),
        _ => false,
    }
}

/// Keeps the relative order of known fields.
pub fn compile_sort<T: CompileTarget + ?Sized>(target: &T, sort: &[SortSpec]) -> Vec<OrderBy> {
    sort.iter()
        .filter_map(|spec| {
            if target.field_type(&spec.field).is_none() {
                tracing::warn!("Unknown sort field '{}' on {}", spec.field, target.target_name());
                return None;
            }
            Some(OrderBy { column: spec.field.clone(), direction: spec.direction })
        })
        .collect()
}
