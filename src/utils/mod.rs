//! Shared utilities: object store access and staging.

pub mod object_access;
