//! Retrieval: translating query plans into the embedded analytical engine and
//! shaping the results.
//!
//! The executor is the only module that speaks the engine's expression
//! language. Everything upstream works with [`QueryPlan`](crate::query_builder::QueryPlan)
//! values, everything downstream with [`ResultPage`](result_page::ResultPage)
//! values built from plain JSON-ready rows.

pub mod executor;
pub mod result_page;

pub use executor::RetrievalExecutor;
pub use result_page::{PaginationInfo, ResultPage, Row};
