use crate::error::SearchError;
use crate::registry::{DatasetKey, DatasetRegistry, FieldType, SortDirection};

const SAMPLE_REGISTRY: &str = r#"{
    "datasets": [
        {
            "category": "dataA",
            "subcategory": "safetykorea",
            "remote_url": "https://files.example.com/1_safetykorea_flattened.parquet",
            "display_fields": [
                { "field": "cert_num", "name": "Certification No.", "width": "15%" },
                { "field": "issue_date", "name": "Issue Date", "type": "date" }
            ],
            "search_fields": [
                { "field": "product_name", "name": "Product" },
                { "field": "cert_num", "name": "Certification No." }
            ],
            "field_types": {
                "cert_num": "text",
                "issue_date": "date",
                "price": "integer"
            },
            "exact_match_fields": ["cert_num"],
            "default_search_field": "product_name",
            "default_sort_field": "issue_date",
            "default_sort_order": "desc"
        },
        {
            "category": "dataC",
            "subcategory": "approval",
            "result_type": "failed",
            "remote_url": "https://files.example.com/6_approval_flattened_failed.parquet",
            "display_fields": [
                { "field": "approval_no", "name": "Approval No." }
            ],
            "search_fields": [
                { "field": "approval_no", "name": "Approval No." }
            ],
            "default_search_field": "approval_no",
            "page_size": 50
        }
    ]
}"#;

#[test]
fn test_resolve_known_dataset() {
    let registry = DatasetRegistry::from_json_str(SAMPLE_REGISTRY).unwrap();

    let descriptor = registry.resolve("dataA", "safetykorea", None).unwrap();
    assert_eq!(descriptor.category, "dataA");
    assert_eq!(descriptor.default_search_field, "product_name");
    assert_eq!(descriptor.page_size, 20, "page_size should default to 20");
    assert!(matches!(
        descriptor.default_sort_order,
        SortDirection::Descending
    ));
}

#[test]
fn test_resolve_with_result_type() {
    let registry = DatasetRegistry::from_json_str(SAMPLE_REGISTRY).unwrap();

    let descriptor = registry
        .resolve("dataC", "approval", Some("failed"))
        .unwrap();
    assert_eq!(descriptor.page_size, 50);

    // The same subcategory without the result type is a different dataset.
    let missing = registry.resolve("dataC", "approval", None);
    assert!(matches!(
        missing,
        Err(SearchError::UnknownDataset { .. })
    ));
}

#[test]
fn test_resolve_unknown_dataset_never_substitutes() {
    let registry = DatasetRegistry::from_json_str(SAMPLE_REGISTRY).unwrap();

    let result = registry.resolve("dataA", "nonexistent", None);
    match result {
        Err(SearchError::UnknownDataset { key }) => {
            assert_eq!(key.subcategory, "nonexistent");
        }
        other => panic!("expected UnknownDataset, got {:?}", other),
    }
}

#[test]
fn test_subcategory_alias_normalization() {
    let registry = DatasetRegistry::from_json_str(SAMPLE_REGISTRY).unwrap();

    // "approval-details" is a renamed spelling of "approval".
    let descriptor = registry
        .resolve("dataC", "approval-details", Some("failed"))
        .unwrap();
    assert_eq!(descriptor.subcategory, "approval");
}

#[test]
fn test_field_type_defaults_to_text() {
    let registry = DatasetRegistry::from_json_str(SAMPLE_REGISTRY).unwrap();
    let descriptor = registry.resolve("dataA", "safetykorea", None).unwrap();

    assert_eq!(descriptor.field_type("issue_date"), FieldType::Date);
    assert_eq!(descriptor.field_type("price"), FieldType::Integer);
    // Fields absent from field_types are opaque text.
    assert_eq!(descriptor.field_type("unconfigured"), FieldType::Text);
}

#[test]
fn test_searchable_and_exact_match_flags() {
    let registry = DatasetRegistry::from_json_str(SAMPLE_REGISTRY).unwrap();
    let descriptor = registry.resolve("dataA", "safetykorea", None).unwrap();

    assert!(descriptor.is_searchable("cert_num"));
    assert!(!descriptor.is_searchable("issue_date"));
    assert!(descriptor.is_exact_match("cert_num"));
    assert!(!descriptor.is_exact_match("product_name"));
}

#[test]
fn test_key_slug_and_display() {
    let key = DatasetKey::new("dataC", "approval", Some("failed"));
    assert_eq!(key.slug(), "dataC_failed_approval");
    assert_eq!(key.to_string(), "dataC/failed/approval");

    let key = DatasetKey::new("dataA", "safetykorea", None);
    assert_eq!(key.slug(), "dataA_safetykorea");
}
