//! Crate-wide integration tests exercising the public service facade.

pub mod integration_tests;
