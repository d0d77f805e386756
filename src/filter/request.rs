use std::collections::HashMap;

use crate::config::PaginationConfig;

use super::parser::parse_filters;
use super::types::{FindOptions, Pagination, SortDirection, SortSpec};

pub const PAGE_KEY: &str = "pagination[page]";
pub const PAGE_SIZE_KEY: &str = "pagination[pageSize]";
pub const SORT_KEY: &str = "sort";

/// `pagination[page]` / `pagination[pageSize]`; missing, non-numeric or
/// zero values fall back to page 1 and the configured default size.
pub fn parse_pagination(query: &HashMap<String, String>, config: &PaginationConfig) -> Pagination {
    let page = positive(query.get(PAGE_KEY)).unwrap_or(1);
    let mut page_size = positive(query.get(PAGE_SIZE_KEY)).unwrap_or(config.default_page_size.max(1));

    if let Some(max) = config.max_page_size {
        if page_size > max {
            tracing::debug!("pageSize {} exceeds max {}, capping", page_size, max);
            page_size = max;
        }
    }

    Pagination { page, page_size }
}

fn positive(raw: Option<&String>) -> Option<u32> {
    raw.and_then(|s| s.trim().parse::<u32>().ok()).filter(|n| *n >= 1)
}

/// `sort=name,-createdAt` → `[name asc, createdAt desc]`.
pub fn parse_sort(query: &HashMap<String, String>) -> Vec<SortSpec> {
    let Some(raw) = query.get(SORT_KEY) else { return Vec::new() };

    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .filter_map(|item| {
            let (field, direction) = match item.strip_prefix('-') {
                Some(rest) => (rest, SortDirection::Desc),
                None => (item, SortDirection::Asc),
            };
            if field.is_empty() {
                return None;
            }
            Some(SortSpec { field: field.to_string(), direction })
        })
        .collect()
}

/// All three parsers over the same flat query mapping.
pub fn parse_find_options(query: &HashMap<String, String>, config: &PaginationConfig) -> FindOptions {
    let filters = parse_filters(query);
    FindOptions {
        filters: if filters.is_empty() { None } else { Some(filters) },
        sort: parse_sort(query),
        pagination: Some(parse_pagination(query, config)),
    }
}

/// `pageCount` is `ceil(total / pageSize)`.
pub fn create_pagination_response(page: u32, page_size: u32, total: u64) -> PaginationMeta {
    let page_count = if page_size == 0 { 0 } else { total.div_ceil(page_size as u64) };
    PaginationMeta { page, page_size, page_count, total }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMeta {
    pub page: u32,
    pub page_size: u32,
    pub page_count: u64,
    pub total: u64,
}
