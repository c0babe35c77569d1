// Test module organization for prefetch.
// This module is only compiled during testing via #[path] in coordinator.rs.
