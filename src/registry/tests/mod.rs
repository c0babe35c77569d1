// Test module organization for the dataset registry.
// This module is only compiled during testing via #[path] in registry.rs.

mod lookup_tests;
