//! Background staging and warm-up of dataset files.
//!
//! The coordinator tracks per-dataset readiness, stages remote files to
//! local disk exactly once per transition, and broadcasts readiness events
//! keyed by dataset so listeners can wait for the one they care about.

pub mod coordinator;

pub use coordinator::{
    ObjectStoreStager, PrefetchCoordinator, PrefetchEvent, PrefetchState, Stager,
};
