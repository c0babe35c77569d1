use indexmap::IndexMap;

use crate::error::SearchError;
use crate::query_builder::{build_query_plan, ALL_FIELDS};
use crate::registry::{DatasetDescriptor, FieldType, SearchField, SortDirection};

fn minimal_descriptor() -> DatasetDescriptor {
    let mut field_types = IndexMap::new();
    field_types.insert("name".to_string(), FieldType::Text);

    DatasetDescriptor {
        category: "dataA".to_string(),
        subcategory: "minimal".to_string(),
        result_type: None,
        remote_url: None,
        local_path: Some("/tmp/minimal.parquet".to_string()),
        display_fields: vec![],
        search_fields: vec![SearchField {
            field: "name".to_string(),
            name: "Name".to_string(),
            placeholder: None,
        }],
        field_types,
        download_fields: vec![],
        exact_match_fields: vec![],
        default_search_field: "name".to_string(),
        default_sort_field: None,
        default_sort_order: SortDirection::Ascending,
        page_size: 20,
    }
}

fn expect_invalid(result: Result<crate::query_builder::QueryPlan, SearchError>) -> String {
    match result {
        Err(SearchError::InvalidQuery(message)) => message,
        other => panic!("expected InvalidQuery, got {:?}", other),
    }
}

#[test]
fn test_rejects_single_character_keyword() {
    let descriptor = minimal_descriptor();
    let message = expect_invalid(build_query_plan(&descriptor, "a", ALL_FIELDS, 1, 20));
    assert!(message.contains("at least 2"), "got: {}", message);
}

#[test]
fn test_accepts_two_character_keyword() {
    let descriptor = minimal_descriptor();
    assert!(build_query_plan(&descriptor, "ab", ALL_FIELDS, 1, 20).is_ok());
}

#[test]
fn test_multibyte_keyword_counts_characters_not_bytes() {
    let descriptor = minimal_descriptor();
    // Two Hangul syllables are two characters even though they are six bytes.
    assert!(build_query_plan(&descriptor, "삼성", ALL_FIELDS, 1, 20).is_ok());
    expect_invalid(build_query_plan(&descriptor, "삼", ALL_FIELDS, 1, 20));
}

#[test]
fn test_rejects_unknown_search_field() {
    let descriptor = minimal_descriptor();
    let message = expect_invalid(build_query_plan(&descriptor, "samsung", "no_such", 1, 20));
    assert!(message.contains("no_such"), "got: {}", message);
}

#[test]
fn test_rejects_zero_page_size() {
    let descriptor = minimal_descriptor();
    expect_invalid(build_query_plan(&descriptor, "samsung", ALL_FIELDS, 1, 0));
}

#[test]
fn test_never_fails_for_valid_inputs() {
    let descriptor = minimal_descriptor();

    // Any keyword of at least two characters against any configured field
    // must build, whatever the page number.
    for keyword in ["ab", "samsung", "KC-100", "12", "한국어키워드"] {
        for page in [1u64, 2, 100] {
            let plan = build_query_plan(&descriptor, keyword, "name", page, 20);
            assert!(plan.is_ok(), "build failed for keyword {:?}", keyword);
        }
    }
}

#[test]
fn test_whitespace_keyword_is_browse_mode() {
    let descriptor = minimal_descriptor();
    let plan = build_query_plan(&descriptor, "   ", ALL_FIELDS, 1, 20).unwrap();
    assert!(plan.predicates.is_empty());
}
