// Test module organization for export.
// This module is only compiled during testing via #[path] in export.rs.
