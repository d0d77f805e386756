use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Comparison operators understood by the query compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterOp {
    #[serde(rename = "$eq")] Eq,
    #[serde(rename = "$ne")] Ne,
    #[serde(rename = "$gt")] Gt,
    #[serde(rename = "$gte")] Gte,
    #[serde(rename = "$lt")] Lt,
    #[serde(rename = "$lte")] Lte,

    #[serde(rename = "$in")] In,
    #[serde(rename = "$notIn")] NotIn,

    #[serde(rename = "$contains")] Contains,
    #[serde(rename = "$containsi")] ContainsI,
    #[serde(rename = "$notContains")] NotContains,
    #[serde(rename = "$startsWith")] StartsWith,
    #[serde(rename = "$endsWith")] EndsWith,

    #[serde(rename = "$null")] Null,
    #[serde(rename = "$notNull")] NotNull,

    #[serde(rename = "$between")] Between,
}

impl FilterOp {
    pub fn from_key(key: &str) -> Option<Self> {
        Some(match key {
            "$eq" => FilterOp::Eq,
            "$ne" => FilterOp::Ne,
            "$gt" => FilterOp::Gt,
            "$gte" => FilterOp::Gte,
            "$lt" => FilterOp::Lt,
            "$lte" => FilterOp::Lte,
            "$in" => FilterOp::In,
            "$notIn" => FilterOp::NotIn,
            "$contains" => FilterOp::Contains,
            "$containsi" => FilterOp::ContainsI,
            "$notContains" => FilterOp::NotContains,
            "$startsWith" => FilterOp::StartsWith,
            "$endsWith" => FilterOp::EndsWith,
            "$null" => FilterOp::Null,
            "$notNull" => FilterOp::NotNull,
            "$between" => FilterOp::Between,
            _ => return None,
        })
    }

    pub fn key(&self) -> &'static str {
        match self {
            FilterOp::Eq => "$eq",
            FilterOp::Ne => "$ne",
            FilterOp::Gt => "$gt",
            FilterOp::Gte => "$gte",
            FilterOp::Lt => "$lt",
            FilterOp::Lte => "$lte",
            FilterOp::In => "$in",
            FilterOp::NotIn => "$notIn",
            FilterOp::Contains => "$contains",
            FilterOp::ContainsI => "$containsi",
            FilterOp::NotContains => "$notContains",
            FilterOp::StartsWith => "$startsWith",
            FilterOp::EndsWith => "$endsWith",
            FilterOp::Null => "$null",
            FilterOp::NotNull => "$notNull",
            FilterOp::Between => "$between",
        }
    }
}

pub const AND_KEY: &str = "$and";
pub const OR_KEY: &str = "$or";

/// Right-hand side of a field entry in a filter tree.
///
/// Operator keys are kept verbatim; deciding whether they are known is the
/// compiler's job, so a tree can always be built from any input.
#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
    /// `{field: value}`
    Equals(Value),
    /// `{field: {"$op": value, ...}}`
    Operators(Vec<(String, Value)>),
}

/// One entry of a filter object.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterNode {
    Field { field: String, comparison: Comparison },
    And(Vec<FilterTree>),
    Or(Vec<FilterTree>),
}

/// A filter object: its entries are implicitly conjoined.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterTree(pub Vec<FilterNode>);

impl FilterTree {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn nodes(&self) -> &[FilterNode] {
        &self.0
    }

    /// Lenient conversion from the JSON form. Shapes that cannot be part of a
    /// filter are dropped with a warning.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Object(map) => Self::from_object(map),
            Value::Null => Self::empty(),
            other => {
                tracing::warn!("Ignoring filter that is not an object: {}", other);
                Self::empty()
            }
        }
    }

    fn from_object(map: &Map<String, Value>) -> Self {
        let mut nodes = Vec::with_capacity(map.len());
        for (key, value) in map {
            match key.as_str() {
                AND_KEY | OR_KEY => {
                    let Some(items) = value.as_array() else {
                        tracing::warn!("{} requires an array, ignoring", key);
                        continue;
                    };
                    let branches = items.iter().map(Self::from_json).collect();
                    nodes.push(if key == AND_KEY {
                        FilterNode::And(branches)
                    } else {
                        FilterNode::Or(branches)
                    });
                }
                field => {
                    let comparison = match value {
                        Value::Object(ops) => Comparison::Operators(
                            ops.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                        ),
                        other => Comparison::Equals(other.clone()),
                    };
                    nodes.push(FilterNode::Field { field: field.to_string(), comparison });
                }
            }
        }
        Self(nodes)
    }

    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        for node in &self.0 {
            match node {
                FilterNode::Field { field, comparison } => {
                    let value = match comparison {
                        Comparison::Equals(v) => v.clone(),
                        Comparison::Operators(ops) => Value::Object(
                            ops.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                        ),
                    };
                    map.insert(field.clone(), value);
                }
                FilterNode::And(branches) => {
                    map.insert(AND_KEY.to_string(), Value::Array(branches.iter().map(Self::to_json).collect()));
                }
                FilterNode::Or(branches) => {
                    map.insert(OR_KEY.to_string(), Value::Array(branches.iter().map(Self::to_json).collect()));
                }
            }
        }
        Value::Object(map)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// A requested sort entry, as parsed from `sort=field,-field2`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
}

impl Pagination {
    pub fn offset(&self) -> u64 {
        (self.page.saturating_sub(1) as u64) * self.page_size as u64
    }
}

/// Options handed to `Repository::find`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub filters: Option<FilterTree>,
    pub sort: Vec<SortSpec>,
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Clone)]
pub struct SqlResult {
    pub query: String,
    pub params: Vec<Value>,
}
