//! End-to-end tests: registry JSON in, searched pages and export files out,
//! through the same [`SearchService`](crate::SearchService) surface the
//! embedding service uses.

#[cfg(test)]
mod tests {
    use arrow::array::{Date32Array, Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;
    use parquet::arrow::ArrowWriter;
    use serde_json::json;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    use crate::{
        DatasetRegistry, ExportFormat, PrefetchEvent, SearchError, SearchService, ALL_FIELDS,
    };

    /// Writes a small certification-style dataset: text, date, and numeric
    /// columns with one certification number per row.
    fn write_certifications(path: &Path) {
        let schema = Arc::new(Schema::new(vec![
            Field::new("cert_num", DataType::Utf8, false),
            Field::new("product_name", DataType::Utf8, false),
            Field::new("maker", DataType::Utf8, true),
            Field::new("issue_date", DataType::Date32, false),
            Field::new("price", DataType::Int64, false),
        ]));
        // Date32 is days since the unix epoch; 19723 is 2024-01-01.
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(vec!["KC-100", "KC-1001", "KC-200"])),
                Arc::new(StringArray::from(vec![
                    "Samsung TV",
                    "Samsung Phone",
                    "LG Fridge",
                ])),
                Arc::new(StringArray::from(vec![Some("Samsung"), None, Some("LG")])),
                Arc::new(Date32Array::from(vec![19723, 19724, 19725])),
                Arc::new(Int64Array::from(vec![11234, 500, 999])),
            ],
        )
        .unwrap();
        let file = std::fs::File::create(path).unwrap();
        let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();
    }

    fn registry_json(parquet_path: &Path) -> String {
        json!({
            "datasets": [{
                "category": "dataA",
                "subcategory": "safetykorea",
                "local_path": parquet_path.to_string_lossy(),
                "display_fields": [
                    { "field": "cert_num", "name": "Certification No." },
                    { "field": "product_name", "name": "Product" },
                    { "field": "issue_date", "name": "Issue Date", "type": "date" },
                    { "field": "price", "name": "Price", "type": "integer" }
                ],
                "search_fields": [
                    { "field": "product_name", "name": "Product" },
                    { "field": "cert_num", "name": "Certification No." },
                    { "field": "price", "name": "Price" }
                ],
                "field_types": {
                    "cert_num": "text",
                    "product_name": "text",
                    "issue_date": "date",
                    "price": "integer"
                },
                "download_fields": ["cert_num", "product_name"],
                "exact_match_fields": ["cert_num"],
                "default_search_field": "product_name",
                "default_sort_field": "issue_date",
                "default_sort_order": "desc"
            }]
        })
        .to_string()
    }

    fn service_over(dir: &TempDir) -> SearchService {
        let parquet_path = dir.path().join("safetykorea.parquet");
        write_certifications(&parquet_path);
        let registry =
            DatasetRegistry::from_json_str(&registry_json(&parquet_path)).unwrap();
        SearchService::new(Arc::new(registry), dir.path().join("staging"))
    }

    #[tokio::test]
    async fn test_search_end_to_end() {
        let dir = TempDir::new().unwrap();
        let service = service_over(&dir);

        let page = service
            .search("dataA", "safetykorea", None, "samsung", Some(ALL_FIELDS), None, None)
            .await
            .unwrap();

        assert_eq!(page.pagination.total_count, 2);
        assert_eq!(page.pagination.total_pages, 1);
        assert_eq!(page.pagination.current_page, 1);
        // Default sort is issue_date descending: the later row first.
        assert_eq!(page.rows[0]["product_name"], json!("Samsung Phone"));
        assert_eq!(page.rows[1]["product_name"], json!("Samsung TV"));
        // Dates render as their canonical text form, prices stay numbers.
        assert_eq!(page.rows[1]["issue_date"], json!("2024-01-01"));
        assert_eq!(page.rows[1]["price"], json!(11234));
    }

    #[tokio::test]
    async fn test_exact_certification_number_lookup() {
        let dir = TempDir::new().unwrap();
        let service = service_over(&dir);

        let page = service
            .search("dataA", "safetykorea", None, "KC-100", Some("cert_num"), None, None)
            .await
            .unwrap();

        // Exact match: "KC-100" must not pull in "KC-1001".
        assert_eq!(page.pagination.total_count, 1);
        assert_eq!(page.rows[0]["cert_num"], json!("KC-100"));
    }

    #[tokio::test]
    async fn test_default_search_field_is_used_when_unspecified() {
        let dir = TempDir::new().unwrap();
        let service = service_over(&dir);

        // "11234" appears in the price column but not in product_name, the
        // configured default field.
        let page = service
            .search("dataA", "safetykorea", None, "11234", None, None, None)
            .await
            .unwrap();
        assert_eq!(page.pagination.total_count, 0);

        let page = service
            .search("dataA", "safetykorea", None, "11234", Some("price"), None, None)
            .await
            .unwrap();
        assert_eq!(page.pagination.total_count, 1);
    }

    #[tokio::test]
    async fn test_caller_page_size_overrides_dataset_default() {
        let dir = TempDir::new().unwrap();
        let service = service_over(&dir);

        // Browse mode over all three rows, two per page instead of the
        // dataset's configured twenty.
        let page = service
            .search("dataA", "safetykorea", None, "", None, Some(1), Some(2))
            .await
            .unwrap();
        assert_eq!(page.pagination.page_size, 2);
        assert_eq!(page.pagination.total_pages, 2);
        assert_eq!(page.rows.len(), 2);

        let page = service
            .search("dataA", "safetykorea", None, "", None, Some(2), Some(2))
            .await
            .unwrap();
        assert_eq!(page.pagination.current_page, 2);
        assert_eq!(page.rows.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_dataset_and_bad_queries_fail_cleanly() {
        let dir = TempDir::new().unwrap();
        let service = service_over(&dir);

        let err = service
            .search("dataA", "no-such-dataset", None, "samsung", None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::UnknownDataset { .. }));

        let err = service
            .search("dataA", "safetykorea", None, "x", None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn test_legacy_subcategory_alias_resolves() {
        let dir = TempDir::new().unwrap();
        let parquet_path = dir.path().join("approval.parquet");
        write_certifications(&parquet_path);

        let registry_json = registry_json(&parquet_path)
            .replace("\"safetykorea\"", "\"approval\"");
        let registry = DatasetRegistry::from_json_str(&registry_json).unwrap();
        let service = SearchService::new(Arc::new(registry), dir.path().join("staging"));

        // "approval-details" is the legacy spelling of "approval".
        let page = service
            .search("dataA", "approval-details", None, "samsung", None, None, None)
            .await
            .unwrap();
        assert_eq!(page.pagination.total_count, 2);
    }

    #[tokio::test]
    async fn test_prefetch_then_search() {
        let dir = TempDir::new().unwrap();
        let service = service_over(&dir);

        let mut events = service.subscribe_readiness();
        service.ensure_ready("dataA", "safetykorea", None).unwrap();

        loop {
            let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
                .await
                .expect("timed out waiting for readiness")
                .expect("event stream closed");
            if let PrefetchEvent::Ready { degraded, .. } = event {
                assert!(!degraded, "local dataset warms without staging errors");
                break;
            }
        }

        let page = service
            .search("dataA", "safetykorea", None, "samsung", None, None, None)
            .await
            .unwrap();
        assert_eq!(page.pagination.total_count, 2);
    }

    #[tokio::test]
    async fn test_export_through_the_service() {
        let dir = TempDir::new().unwrap();
        let service = service_over(&dir);

        let handle = service
            .export(
                "dataA",
                "safetykorea",
                None,
                "samsung",
                Some(ALL_FIELDS),
                ExportFormat::Csv,
            )
            .await
            .unwrap();
        assert!(handle.filename.starts_with("dataA_safetykorea_export_"));

        let (chunks, rows) = handle.collect().await.unwrap();
        assert_eq!(rows, 2);

        let text: String = chunks
            .iter()
            .map(|chunk| String::from_utf8(chunk.to_vec()).unwrap())
            .collect();
        // Download fields only, header plus one line per matching row.
        assert!(text.starts_with("cert_num,product_name"));
        assert_eq!(text.lines().count(), 3);
    }
}
