//! Datapage - Config-Driven Keyword Search over Columnar Datasets
//!
//! A library for serving paginated keyword searches over a catalog of Parquet
//! datasets. Datasets live on local disk, S3-compatible storage, or plain
//! HTTPS hosts; a JSON registry describes each one's fields, types, and
//! defaults, and a single shared query path serves them all.
//!
//! # Overview
//!
//! This library provides:
//! - **Config-driven datasets**: Per-dataset behavior is registry data, not code
//! - **Typed matching**: Substring for text, text-form matching for numeric and
//!   date columns, exact comparison for certification numbers
//! - **Background staging**: Remote files download once, searches prefer the
//!   local copy and fall back to remote reads when staging fails
//! - **Streaming export**: Full result sets encode to CSV or JSON lines in
//!   batches, cancellable mid-stream
//!
//! # Quick Start
//!
//! ```no_run
//! use datapage::{DatasetRegistry, SearchService};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let registry = Arc::new(DatasetRegistry::from_json_file("registry.json")?);
//!     let service = SearchService::new(registry, "./staging");
//!
//!     // Stage and warm every configured dataset in the background.
//!     service.warm_all();
//!
//!     let page = service
//!         .search("dataA", "safetykorea", None, "samsung", None, Some(1), None)
//!         .await?;
//!     println!("{} rows of {}", page.rows.len(), page.pagination.total_count);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod export;
pub mod prefetch;
pub mod query_builder;
pub mod registry;
pub mod retrieval;
#[cfg(test)]
pub mod unit_tests;
pub mod utils;

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

pub use crate::error::SearchError;
pub use crate::export::{ExportFormat, ExportHandle, ExportOutcome, ExportPipeline};
pub use crate::prefetch::{PrefetchCoordinator, PrefetchEvent, PrefetchState};
pub use crate::query_builder::{build_export_plan, build_query_plan, QueryPlan, ALL_FIELDS};
pub use crate::registry::{
    DatasetDescriptor, DatasetKey, DatasetRegistry, DisplayField, FieldType, SearchField,
    SortDirection,
};
pub use crate::retrieval::{PaginationInfo, ResultPage, RetrievalExecutor, Row};

/// Facade wiring the registry, executor, prefetch coordinator, and export
/// pipeline together.
///
/// One service instance serves every configured dataset. All methods take the
/// dataset identity triple and resolve it through the registry, so an unknown
/// dataset fails fast instead of reading the wrong file.
pub struct SearchService {
    registry: Arc<DatasetRegistry>,
    executor: Arc<RetrievalExecutor>,
    coordinator: Arc<PrefetchCoordinator>,
    exports: ExportPipeline,
}

impl SearchService {
    /// Builds a service around a loaded registry. Staged dataset files land
    /// under `staging_dir`, one subdirectory per dataset.
    pub fn new(registry: Arc<DatasetRegistry>, staging_dir: impl Into<PathBuf>) -> Self {
        let executor = Arc::new(RetrievalExecutor::new());
        let coordinator = Arc::new(PrefetchCoordinator::new(
            Arc::clone(&registry),
            Arc::clone(&executor),
            staging_dir,
        ));
        SearchService {
            registry,
            exports: ExportPipeline::new(Arc::clone(&executor)),
            executor,
            coordinator,
        }
    }

    /// The registry this service was built with.
    pub fn registry(&self) -> &DatasetRegistry {
        &self.registry
    }

    /// Runs one paginated keyword search.
    ///
    /// # Arguments
    ///
    /// * `category`, `subcategory`, `result_type` - dataset identity; the
    ///   subcategory may be a legacy alias
    /// * `keyword` - search keyword; empty means browse mode
    /// * `field_selector` - search field name or [`ALL_FIELDS`]; `None` uses
    ///   the dataset's default search field
    /// * `page` - 1-based page number, `None` for the first page
    /// * `page_size` - rows per page, `None` for the dataset's configured
    ///   default
    ///
    /// Reads the staged local file when prefetch has produced one, otherwise
    /// the dataset's configured locator.
    pub async fn search(
        &self,
        category: &str,
        subcategory: &str,
        result_type: Option<&str>,
        keyword: &str,
        field_selector: Option<&str>,
        page: Option<u64>,
        page_size: Option<usize>,
    ) -> Result<ResultPage, SearchError> {
        let descriptor = self.registry.resolve(category, subcategory, result_type)?;
        let field = field_selector.unwrap_or(&descriptor.default_search_field);
        let plan = build_query_plan(
            descriptor,
            keyword,
            field,
            page.unwrap_or(1),
            page_size.unwrap_or(descriptor.page_size),
        )?;

        let locator = self.locator_for(descriptor)?;
        self.executor.execute(descriptor, &locator, &plan).await
    }

    /// Starts an export of every row matching the keyword. See
    /// [`ExportPipeline::stream_export`].
    pub async fn export(
        &self,
        category: &str,
        subcategory: &str,
        result_type: Option<&str>,
        keyword: &str,
        field_selector: Option<&str>,
        format: ExportFormat,
    ) -> Result<ExportHandle, SearchError> {
        let descriptor = self.registry.resolve(category, subcategory, result_type)?;
        let field = field_selector.unwrap_or(&descriptor.default_search_field);
        let locator = self.locator_for(descriptor)?;
        self.exports
            .stream_export(descriptor, &locator, keyword, field, format)
            .await
    }

    /// Triggers background staging for one dataset. Returns `true` when the
    /// dataset is already ready; otherwise readiness arrives via
    /// [`subscribe_readiness`].
    ///
    /// [`subscribe_readiness`]: SearchService::subscribe_readiness
    pub fn ensure_ready(
        &self,
        category: &str,
        subcategory: &str,
        result_type: Option<&str>,
    ) -> Result<bool, SearchError> {
        let descriptor = self.registry.resolve(category, subcategory, result_type)?;
        Ok(self.coordinator.ensure_ready(&descriptor.key()))
    }

    /// Stages and warms every configured dataset in the background.
    pub fn warm_all(&self) {
        self.coordinator.warm_all();
    }

    /// Subscribes to staging readiness events for all datasets.
    pub fn subscribe_readiness(&self) -> broadcast::Receiver<PrefetchEvent> {
        self.coordinator.subscribe()
    }

    /// Readiness state of one dataset, `None` when staging never ran.
    pub fn readiness(
        &self,
        category: &str,
        subcategory: &str,
        result_type: Option<&str>,
    ) -> Result<Option<PrefetchState>, SearchError> {
        let descriptor = self.registry.resolve(category, subcategory, result_type)?;
        Ok(self.coordinator.state(&descriptor.key()))
    }

    /// Forgets a dataset's staged state and cached sessions, so the next
    /// search re-opens a replaced file.
    pub fn invalidate(
        &self,
        category: &str,
        subcategory: &str,
        result_type: Option<&str>,
    ) -> Result<(), SearchError> {
        let descriptor = self.registry.resolve(category, subcategory, result_type)?;
        self.coordinator.invalidate(&descriptor.key());
        Ok(())
    }

    /// Locator a search should read: the staged local copy when present,
    /// otherwise the configured local path or remote URL.
    fn locator_for(&self, descriptor: &DatasetDescriptor) -> Result<String, SearchError> {
        if let Some(staged) = self.coordinator.local_path(&descriptor.key()) {
            return Ok(staged.to_string_lossy().into_owned());
        }
        descriptor
            .locator()
            .map(str::to_string)
            .ok_or_else(|| SearchError::InvalidQuery(format!(
                "dataset {} has no file locator configured",
                descriptor.key()
            )))
    }
}
