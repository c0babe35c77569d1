//! Pure, engine-agnostic query construction.
//!
//! [`build_query_plan`] turns a dataset descriptor plus the caller's keyword,
//! field selector, and page window into a [`QueryPlan`]: a fully-specified,
//! immutable value describing predicates, sort, projection, and the row
//! window. The plan never contains engine syntax; translating it into the
//! analytical engine's form is the retrieval executor's job alone. Keeping
//! that translation in one place is what prevents numeric/text type-coercion
//! mistakes: the operator for each predicate is chosen from the descriptor's
//! declared field type, never from inspecting values at query time.
//!
//! Building a plan does no I/O. Equal inputs always produce structurally
//! equal plans.

use smallvec::SmallVec;

use crate::error::SearchError;
use crate::registry::{DatasetDescriptor, FieldType, SortDirection};

/// Field selector meaning "search every configured search field".
pub const ALL_FIELDS: &str = "all";

/// Minimum keyword length accepted for a non-empty keyword.
const MIN_KEYWORD_CHARS: usize = 2;

/// How a single predicate compares a column against the keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredicateOp {
    /// Case-insensitive substring match on a text column.
    Contains,
    /// Substring match against the column's text representation. Used for
    /// numeric and date columns so "123" can match a value of 11234 without
    /// ever comparing numeric literals lexicographically.
    ContainsText,
    /// Exact comparison, for certification/registration number fields.
    Equals,
}

/// One filter condition within a query plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub field: String,
    pub op: PredicateOp,
    pub value: String,
    pub value_type: FieldType,
}

/// Sort clause of a query plan.
///
/// The value type travels with the field name so the executor can apply the
/// empty-string ordering policy to text sorts without a second descriptor
/// lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
    pub value_type: FieldType,
}

/// A fully-specified, immutable description of one retrieval.
///
/// Predicates are OR-combined: a row matches when any predicate matches.
/// `limit` is `None` only for unpaginated export plans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    pub predicates: SmallVec<[Predicate; 4]>,
    pub sort: Option<SortSpec>,
    pub offset: u64,
    pub limit: Option<u64>,
    /// Columns the executor should read, in output order. The executor
    /// intersects this with the file's actual schema.
    pub projection: Vec<String>,
}

impl QueryPlan {
    /// Page size of a paginated plan. Unpaginated (export) plans have none.
    pub fn page_size(&self) -> Option<u64> {
        self.limit
    }
}

/// Builds a paginated query plan.
///
/// # Arguments
///
/// * `descriptor` - the dataset configuration driving field types and sort
/// * `keyword` - the search keyword; an empty keyword produces a match-all
///   plan (browse mode, also used by the prefetch warm-up)
/// * `field_selector` - [`ALL_FIELDS`] or the name of one configured search
///   field
/// * `page` - 1-based page number; values below 1 are clamped to 1
/// * `page_size` - rows per page
///
/// # Errors
///
/// Fails with [`SearchError::InvalidQuery`] before any I/O when:
/// - the keyword is non-empty but shorter than two characters
/// - `field_selector` names a field that is not in the descriptor's search
///   fields
/// - `page_size` is zero
pub fn build_query_plan(
    descriptor: &DatasetDescriptor,
    keyword: &str,
    field_selector: &str,
    page: u64,
    page_size: usize,
) -> Result<QueryPlan, SearchError> {
    if page_size == 0 {
        return Err(SearchError::InvalidQuery(
            "page size must be positive".to_string(),
        ));
    }

    let predicates = build_predicates(descriptor, keyword, field_selector)?;
    let page = page.max(1);
    let limit = page_size as u64;

    Ok(QueryPlan {
        projection: build_projection(descriptor, &predicates),
        sort: build_sort(descriptor),
        offset: page.saturating_sub(1).saturating_mul(limit),
        limit: Some(limit),
        predicates,
    })
}

/// Builds an unpaginated plan for the export pipeline.
///
/// Same predicate and sort rules as [`build_query_plan`], but no row window,
/// and the projection prefers the descriptor's download fields.
pub fn build_export_plan(
    descriptor: &DatasetDescriptor,
    keyword: &str,
    field_selector: &str,
) -> Result<QueryPlan, SearchError> {
    let predicates = build_predicates(descriptor, keyword, field_selector)?;

    let mut projection: Vec<String> = if descriptor.download_fields.is_empty() {
        descriptor
            .display_fields
            .iter()
            .map(|df| df.field.clone())
            .collect()
    } else {
        descriptor.download_fields.clone()
    };
    for predicate in &predicates {
        push_unique(&mut projection, &predicate.field);
    }

    Ok(QueryPlan {
        projection,
        sort: build_sort(descriptor),
        offset: 0,
        limit: None,
        predicates,
    })
}

fn build_predicates(
    descriptor: &DatasetDescriptor,
    keyword: &str,
    field_selector: &str,
) -> Result<SmallVec<[Predicate; 4]>, SearchError> {
    let keyword = keyword.trim();
    if keyword.is_empty() {
        // Browse mode: no filter, every row matches.
        return Ok(SmallVec::new());
    }
    if keyword.chars().count() < MIN_KEYWORD_CHARS {
        return Err(SearchError::InvalidQuery(format!(
            "keyword must be at least {} characters",
            MIN_KEYWORD_CHARS
        )));
    }

    let mut predicates = SmallVec::new();
    if field_selector == ALL_FIELDS {
        for search_field in &descriptor.search_fields {
            predicates.push(predicate_for(descriptor, &search_field.field, keyword));
        }
    } else {
        if !descriptor.is_searchable(field_selector) {
            return Err(SearchError::InvalidQuery(format!(
                "'{}' is not a searchable field of {}",
                field_selector,
                descriptor.key()
            )));
        }
        predicates.push(predicate_for(descriptor, field_selector, keyword));
    }
    Ok(predicates)
}

/// Chooses the operator for one field from its declared type, never from the
/// keyword's shape.
fn predicate_for(descriptor: &DatasetDescriptor, field: &str, keyword: &str) -> Predicate {
    let value_type = descriptor.field_type(field);
    let op = if descriptor.is_exact_match(field) {
        PredicateOp::Equals
    } else {
        match value_type {
            FieldType::Integer | FieldType::Double | FieldType::Date => PredicateOp::ContainsText,
            _ => PredicateOp::Contains,
        }
    };
    Predicate {
        field: field.to_string(),
        op,
        value: keyword.to_string(),
        value_type,
    }
}

fn build_sort(descriptor: &DatasetDescriptor) -> Option<SortSpec> {
    descriptor
        .default_sort_field
        .as_ref()
        .map(|field| SortSpec {
            field: field.clone(),
            direction: descriptor.default_sort_order,
            value_type: descriptor.field_type(field),
        })
}

/// Ordered union of display fields, queried fields, and the sort field, so
/// the executor reads only the columns a result page can need.
fn build_projection(descriptor: &DatasetDescriptor, predicates: &[Predicate]) -> Vec<String> {
    let mut projection = Vec::new();
    for display_field in &descriptor.display_fields {
        push_unique(&mut projection, &display_field.field);
    }
    for predicate in predicates {
        push_unique(&mut projection, &predicate.field);
    }
    if let Some(sort_field) = &descriptor.default_sort_field {
        push_unique(&mut projection, sort_field);
    }
    projection
}

fn push_unique(columns: &mut Vec<String>, candidate: &str) {
    if !columns.iter().any(|c| c == candidate) {
        columns.push(candidate.to_string());
    }
}

// Link to test module (only compiled during tests)
#[cfg(test)]
#[path = "query_builder/tests/mod.rs"]
mod tests;
