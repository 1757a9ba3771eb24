//! Local filesystem side of a backup: traversal, metadata and staging.

pub mod cloner;
pub mod metadata;
pub mod walker;
