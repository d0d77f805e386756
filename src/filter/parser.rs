//! Decodes `filters[...]` query keys into a [`FilterTree`].
//!
//! Keys are split into bracket segments, assembled into an intermediate
//! tree of maps and positional lists, and then lowered into the algebraic
//! filter tree. Nothing here fails: malformed keys are skipped.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use super::types::{Comparison, FilterNode, FilterTree, AND_KEY, OR_KEY};

pub const FILTERS_PREFIX: &str = "filters";

/// Parse every `filters[...]` entry of a flat query mapping.
pub fn parse_filters(query: &HashMap<String, String>) -> FilterTree {
    // Sorted so that conflicting paths resolve the same way on every call
    let mut entries: Vec<(&String, &String)> = query.iter().collect();
    entries.sort();

    let mut root = PathNode::Map(BTreeMap::new());
    for (key, value) in entries {
        let Some(segments) = split_key(key) else { continue };
        if segments.is_empty() {
            tracing::warn!("Ignoring filter key without a path: {}", key);
            continue;
        }
        root.insert(&segments, value);
    }

    match root {
        PathNode::Map(map) => lower_object(&map),
        _ => FilterTree::empty(),
    }
}

/// `filters[a][b][0][c]` → `["a", "b", "0", "c"]`. Keys that do not start
/// with the prefix yield `None`; keys with a broken bracket path are skipped.
pub fn split_key(key: &str) -> Option<Vec<String>> {
    let rest = key.strip_prefix(FILTERS_PREFIX)?;
    if !rest.starts_with('[') {
        return None;
    }

    let mut segments = Vec::new();
    let mut remaining = rest;
    while !remaining.is_empty() {
        let Some(inner) = remaining.strip_prefix('[') else {
            tracing::warn!("Malformed filter key: {}", key);
            return None;
        };
        let Some(close) = inner.find(']') else {
            tracing::warn!("Unterminated bracket in filter key: {}", key);
            return None;
        };
        segments.push(inner[..close].to_string());
        remaining = &inner[close + 1..];
    }
    Some(segments)
}

#[derive(Debug, Clone)]
enum PathNode {
    Leaf(String),
    Map(BTreeMap<String, PathNode>),
    List(BTreeMap<usize, PathNode>),
}

impl PathNode {
    fn insert(&mut self, segments: &[String], value: &str) {
        let Some((head, tail)) = segments.split_first() else {
            *self = PathNode::Leaf(value.to_string());
            return;
        };

        match head.parse::<usize>() {
            Ok(index) => {
                if !matches!(self, PathNode::List(_)) {
                    *self = PathNode::List(BTreeMap::new());
                }
                if let PathNode::List(items) = self {
                    items
                        .entry(index)
                        .or_insert_with(|| PathNode::Map(BTreeMap::new()))
                        .insert(tail, value);
                }
            }
            Err(_) => {
                if !matches!(self, PathNode::Map(_)) {
                    *self = PathNode::Map(BTreeMap::new());
                }
                if let PathNode::Map(entries) = self {
                    entries
                        .entry(head.clone())
                        .or_insert_with(|| PathNode::Map(BTreeMap::new()))
                        .insert(tail, value);
                }
            }
        }
    }

    fn to_value(&self) -> Value {
        match self {
            PathNode::Leaf(s) => Value::String(s.clone()),
            PathNode::Map(entries) => Value::Object(
                entries.iter().map(|(k, v)| (k.clone(), v.to_value())).collect(),
            ),
            PathNode::List(items) => Value::Array(items.values().map(PathNode::to_value).collect()),
        }
    }
}

fn lower_object(entries: &BTreeMap<String, PathNode>) -> FilterTree {
    let mut nodes = Vec::with_capacity(entries.len());
    for (key, node) in entries {
        match key.as_str() {
            AND_KEY | OR_KEY => {
                let branches = lower_branches(key, node);
                nodes.push(if key == AND_KEY {
                    FilterNode::And(branches)
                } else {
                    FilterNode::Or(branches)
                });
            }
            field => {
                let comparison = match node {
                    PathNode::Map(ops) => Comparison::Operators(
                        ops.iter().map(|(op, v)| (op.clone(), v.to_value())).collect(),
                    ),
                    other => Comparison::Equals(other.to_value()),
                };
                nodes.push(FilterNode::Field { field: field.to_string(), comparison });
            }
        }
    }
    FilterTree(nodes)
}

fn lower_branches(key: &str, node: &PathNode) -> Vec<FilterTree> {
    let items: Vec<&PathNode> = match node {
        PathNode::List(items) => items.values().collect(),
        PathNode::Map(entries) => {
            // `filters[$or][name][$eq]=x` - a single branch without a position
            return vec![lower_object(entries)];
        }
        PathNode::Leaf(_) => {
            tracing::warn!("{} expects nested conditions, ignoring scalar value", key);
            return Vec::new();
        }
    };

    items
        .into_iter()
        .filter_map(|item| match item {
            PathNode::Map(entries) => Some(lower_object(entries)),
            _ => {
                tracing::warn!("Ignoring non-object branch under {}", key);
                None
            }
        })
        .collect()
}
