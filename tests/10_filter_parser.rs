mod common;

use anyhow::Result;
use serde_json::json;

use crudloom::filter::{parse_filters, parse_find_options, FilterTree};
use crudloom::config::AppConfig;

use common::query;

#[tokio::test]
async fn bracket_path_lands_at_leaf() -> Result<()> {
    for (field, op, value) in [("name", "$eq", "Ann"), ("age", "$gt", "18"), ("email", "$endsWith", "@x.io")] {
        let key = format!("filters[{}][{}]", field, op);
        let tree = parse_filters(&query(&[(key.as_str(), value)]));
        assert_eq!(tree.to_json()[field][op], json!(value), "path {}.{}", field, op);
    }
    Ok(())
}

#[tokio::test]
async fn parsing_is_idempotent() -> Result<()> {
    let input = query(&[
        ("filters[$or][1][age][$lt]", "5"),
        ("filters[$or][0][age][$gt]", "18"),
        ("filters[name][$containsi]", "an"),
        ("filters[id][$in][1]", "b"),
        ("filters[id][$in][0]", "a"),
        ("pagination[page]", "2"),
    ]);
    let first = parse_filters(&input);
    let second = parse_filters(&input);
    assert_eq!(first, second);
    assert_eq!(first.to_json(), second.to_json());
    Ok(())
}

#[tokio::test]
async fn logical_branches_keep_positions() -> Result<()> {
    let tree = parse_filters(&query(&[
        ("filters[$and][1][$or][0][name][$eq]", "b"),
        ("filters[$and][0][age][$gte]", "30"),
        ("filters[$and][1][$or][1][name][$eq]", "c"),
    ]));
    assert_eq!(
        tree.to_json(),
        json!({"$and": [
            {"age": {"$gte": "30"}},
            {"$or": [{"name": {"$eq": "b"}}, {"name": {"$eq": "c"}}]}
        ]})
    );
    Ok(())
}

#[tokio::test]
async fn other_keys_are_ignored() -> Result<()> {
    let tree = parse_filters(&query(&[
        ("sort", "-age"),
        ("pagination[pageSize]", "10"),
        ("filter[name]", "typo"),
        ("filters", "bare"),
    ]));
    assert_eq!(tree, FilterTree::empty());
    Ok(())
}

#[tokio::test]
async fn implicit_equality_and_json_form_agree() -> Result<()> {
    let parsed = parse_filters(&query(&[("filters[name]", "Ann")]));
    let from_json = FilterTree::from_json(&json!({"name": "Ann"}));
    assert_eq!(parsed, from_json);
    Ok(())
}

#[tokio::test]
async fn find_options_from_one_query() -> Result<()> {
    let config = AppConfig::default();
    let options = parse_find_options(
        &query(&[
            ("filters[age][$gt]", "18"),
            ("sort", "name,-age"),
            ("pagination[page]", "3"),
            ("pagination[pageSize]", "5"),
        ]),
        &config.pagination,
    );
    assert!(options.filters.is_some());
    assert_eq!(options.sort.len(), 2);
    let pagination = options.pagination.expect("pagination");
    assert_eq!((pagination.page, pagination.page_size), (3, 5));

    let defaults = parse_find_options(&query(&[]), &config.pagination);
    assert!(defaults.filters.is_none());
    let pagination = defaults.pagination.expect("pagination");
    assert_eq!((pagination.page, pagination.page_size), (1, 25));
    Ok(())
}
