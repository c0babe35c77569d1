//! Query plan execution against Parquet files through the embedded
//! analytical engine.
//!
//! One engine session is built per dataset locator and cached, so the file's
//! schema is inferred once and later searches reuse the open table. Remote
//! locators get their object store registered with the session before the
//! table is created; local paths register directly.
//!
//! # Matching semantics
//!
//! Plan predicates translate to engine expressions by declared field type:
//!
//! * `Contains` lowercases both sides and does a substring test
//! * `ContainsText` first casts the column to text, so a keyword like "123"
//!   matches the rendering of a numeric or date value and never participates
//!   in a numeric comparison
//! * `Equals` compares the column's text form verbatim
//!
//! Array columns are flattened to a space-joined string before matching, so a
//! keyword can hit any element.
//!
//! # Ordering of missing values
//!
//! Text sorts treat empty strings as missing: ascending puts them after all
//! real values, descending before. Numeric sorts put NULLs last in both
//! directions.

use dashmap::DashMap;
use datafusion::common::{Column, ScalarValue};
use datafusion::execution::SendableRecordBatchStream;
use datafusion::functions::expr_fn::{contains, lower};
use datafusion::functions_nested::expr_fn::array_to_string;
use datafusion::logical_expr::{cast, lit, when, Expr};
use datafusion::prelude::{DataFrame, ParquetReadOptions, SessionContext};
use std::sync::Arc;

use arrow::datatypes::DataType;

use crate::error::SearchError;
use crate::query_builder::{Predicate, PredicateOp, QueryPlan};
use crate::registry::{DatasetDescriptor, FieldType, SortDirection};
use crate::retrieval::result_page::{shape_rows, PaginationInfo, ResultPage};
use crate::utils::object_access;

/// Name every dataset's table is registered under within its own session.
const DATASET_TABLE: &str = "dataset";

/// Executes query plans against dataset files, caching one engine session
/// per locator.
#[derive(Default)]
pub struct RetrievalExecutor {
    contexts: DashMap<String, Arc<SessionContext>>,
}

impl RetrievalExecutor {
    pub fn new() -> Self {
        RetrievalExecutor {
            contexts: DashMap::new(),
        }
    }

    /// Runs a paginated plan and shapes the outcome into a result page.
    ///
    /// The total count and the page rows run against the same filtered frame,
    /// so the pagination metadata always agrees with the predicate set. A
    /// window past the end of the result set returns empty rows with the
    /// reported page clamped to the last one that exists.
    pub async fn execute(
        &self,
        descriptor: &DatasetDescriptor,
        locator: &str,
        plan: &QueryPlan,
    ) -> Result<ResultPage, SearchError> {
        let page_size = plan.limit.unwrap_or(0);
        if page_size == 0 {
            return Err(SearchError::InvalidQuery(
                "paginated execution needs a row limit".to_string(),
            ));
        }

        let frame = self.frame_for_plan(locator, plan).await?;
        let total_count = frame
            .clone()
            .count()
            .await
            .map_err(SearchError::retrieval)? as u64;

        let batches = frame
            .limit(plan.offset as usize, Some(page_size as usize))
            .map_err(SearchError::retrieval)?
            .collect()
            .await
            .map_err(SearchError::retrieval)?;

        let requested_page = plan.offset / page_size + 1;
        Ok(ResultPage {
            rows: shape_rows(&batches, descriptor)?,
            pagination: PaginationInfo::for_request(requested_page, page_size, total_count),
        })
    }

    /// Counts the rows a plan's predicates match, ignoring its row window.
    pub async fn count(&self, locator: &str, plan: &QueryPlan) -> Result<u64, SearchError> {
        let frame = self.frame_for_plan(locator, plan).await?;
        let count = frame.count().await.map_err(SearchError::retrieval)?;
        Ok(count as u64)
    }

    /// Opens an unbuffered batch stream for an unpaginated plan. The export
    /// pipeline drains this incrementally instead of collecting.
    pub async fn stream(
        &self,
        locator: &str,
        plan: &QueryPlan,
    ) -> Result<SendableRecordBatchStream, SearchError> {
        let mut frame = self.frame_for_plan(locator, plan).await?;
        if let Some(limit) = plan.limit {
            frame = frame
                .limit(plan.offset as usize, Some(limit as usize))
                .map_err(SearchError::retrieval)?;
        }
        frame.execute_stream().await.map_err(SearchError::retrieval)
    }

    /// Drops the cached session for a locator. The next query rebuilds it,
    /// picking up a replaced file.
    pub fn invalidate(&self, locator: &str) {
        self.contexts.remove(locator);
    }

    /// Filtered, sorted, projected frame for a plan, without the row window.
    async fn frame_for_plan(
        &self,
        locator: &str,
        plan: &QueryPlan,
    ) -> Result<DataFrame, SearchError> {
        let ctx = self.context_for(locator).await?;
        let mut frame = ctx
            .table(DATASET_TABLE)
            .await
            .map_err(SearchError::retrieval)?;

        if let Some(filter) = combined_filter(&plan.predicates) {
            frame = frame.filter(filter).map_err(SearchError::retrieval)?;
        }

        // Sort before projecting so a sort key dropped from the projection
        // is still available to the plan.
        if let Some(sort) = &plan.sort {
            if frame.schema().has_column_with_unqualified_name(&sort.field) {
                let sort_expr = sort_key(&sort.field, sort.value_type)
                    .map_err(SearchError::retrieval)?
                    .sort(sort.direction.is_ascending(), empty_first(sort));
                frame = frame.sort(vec![sort_expr]).map_err(SearchError::retrieval)?;
            }
        }

        let present: Vec<&str> = plan
            .projection
            .iter()
            .map(String::as_str)
            .filter(|name| frame.schema().has_column_with_unqualified_name(name))
            .collect();
        if !present.is_empty() {
            frame = frame
                .select_columns(&present)
                .map_err(SearchError::retrieval)?;
        }

        Ok(frame)
    }

    /// Gets or builds the cached session for a locator.
    async fn context_for(&self, locator: &str) -> Result<Arc<SessionContext>, SearchError> {
        if let Some(ctx) = self.contexts.get(locator) {
            return Ok(Arc::clone(ctx.value()));
        }

        let ctx = SessionContext::new();
        if let Some(url) = object_access::base_url(locator).map_err(SearchError::retrieval)? {
            let (store, _) = object_access::get_object_store(locator)
                .await
                .map_err(SearchError::retrieval)?;
            ctx.register_object_store(&url, store);
        }

        ctx.register_parquet(DATASET_TABLE, table_path(locator), ParquetReadOptions::default())
            .await
            .map_err(SearchError::retrieval)?;

        let ctx = Arc::new(ctx);
        self.contexts
            .insert(locator.to_string(), Arc::clone(&ctx));
        Ok(ctx)
    }
}

/// Locator without its query string, the form the table registration wants.
fn table_path(locator: &str) -> &str {
    if locator.starts_with("s3://") || locator.starts_with("http://") || locator.starts_with("https://") {
        locator.split('?').next().unwrap_or(locator)
    } else {
        locator
    }
}

/// OR-combines the plan's predicates. `None` means match everything.
fn combined_filter(predicates: &[Predicate]) -> Option<Expr> {
    predicates
        .iter()
        .map(predicate_expr)
        .reduce(|acc, expr| acc.or(expr))
}

fn predicate_expr(predicate: &Predicate) -> Expr {
    let column = Expr::Column(Column::from_name(&predicate.field));
    match predicate.op {
        PredicateOp::Contains => {
            let haystack = if predicate.value_type == FieldType::Array {
                array_to_string(column, lit(" "))
            } else {
                column
            };
            contains(lower(haystack), lit(predicate.value.to_lowercase()))
        }
        PredicateOp::ContainsText => contains(
            lower(cast(column, DataType::Utf8)),
            lit(predicate.value.to_lowercase()),
        ),
        PredicateOp::Equals => cast(column, DataType::Utf8).eq(lit(predicate.value.clone())),
    }
}

/// Expression a sort actually orders by.
///
/// Numeric columns sort natively. Everything else sorts on its text form
/// with empty strings rewritten to NULL, which lets the NULL placement flag
/// position them as missing values.
fn sort_key(field: &str, value_type: FieldType) -> datafusion::common::Result<Expr> {
    let column = Expr::Column(Column::from_name(field));
    if value_type.is_numeric() {
        return Ok(column);
    }
    let text = cast(column, DataType::Utf8);
    when(text.clone().eq(lit("")), lit(ScalarValue::Utf8(None))).otherwise(text)
}

/// NULL placement flag: missing values go last ascending, first descending
/// for text, and last in both directions for numeric columns.
fn empty_first(sort: &crate::query_builder::SortSpec) -> bool {
    if sort.value_type.is_numeric() {
        false
    } else {
        !matches!(sort.direction, SortDirection::Ascending)
    }
}

// Link to test module (only compiled during tests)
#[cfg(test)]
#[path = "tests/mod.rs"]
mod tests;
