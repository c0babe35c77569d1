// Test module organization for the query builder.
// This module is only compiled during testing via #[path] in query_builder.rs.

mod validation_tests;
