// Test module organization for retrieval.
// This module is only compiled during testing via #[path] in executor.rs.
