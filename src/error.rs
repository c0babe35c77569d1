//! Error taxonomy for the search core.
//!
//! Every fallible public operation in this crate returns [`SearchError`].
//! Validation failures are rejected before any I/O happens, and engine-level
//! failures are normalized at the retrieval boundary so callers never see
//! engine-specific error shapes.

use std::error::Error;
use std::fmt;

use crate::registry::DatasetKey;

/// Unified error type for registry lookup, query validation, retrieval,
/// staging, and export operations.
///
/// The variants map directly onto the user-facing failure classes:
///
/// - [`SearchError::UnknownDataset`] - the (category, subcategory,
///   result_type) triple has no registry entry ("this dataset isn't
///   configured")
/// - [`SearchError::InvalidQuery`] - bad keyword length, unknown search
///   field, or bad page size; rejected before any I/O
/// - [`SearchError::Retrieval`] - the analytical engine or storage failed
///   while running a search; not retried automatically
/// - [`SearchError::StagingFailed`] - prefetch of a dataset file failed;
///   non-fatal, search falls back to the remote locator
/// - [`SearchError::ExportCancelled`] - a download was aborted by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchError {
    /// No dataset is configured for the requested key.
    UnknownDataset { key: DatasetKey },
    /// The search request failed validation before reaching the engine.
    InvalidQuery(String),
    /// The analytical engine or backing storage failed during retrieval.
    Retrieval { reason: String },
    /// Staging a dataset file to local storage failed.
    StagingFailed { reason: String },
    /// An in-flight export was cancelled by the caller.
    ExportCancelled,
}

impl SearchError {
    /// Wraps an engine or storage failure, keeping only its message.
    pub fn retrieval(err: impl fmt::Display) -> Self {
        SearchError::Retrieval {
            reason: err.to_string(),
        }
    }

    /// Wraps a staging failure, keeping only its message.
    pub fn staging(err: impl fmt::Display) -> Self {
        SearchError::StagingFailed {
            reason: err.to_string(),
        }
    }
}

impl fmt::Display for SearchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchError::UnknownDataset { key } => {
                write!(f, "dataset is not configured: {}", key)
            }
            SearchError::InvalidQuery(message) => {
                write!(f, "invalid query: {}", message)
            }
            SearchError::Retrieval { reason } => {
                write!(f, "search failed: {}", reason)
            }
            SearchError::StagingFailed { reason } => {
                write!(f, "staging failed: {}", reason)
            }
            SearchError::ExportCancelled => write!(f, "export cancelled"),
        }
    }
}

impl Error for SearchError {}
