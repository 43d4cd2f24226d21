//! Repository layer: the document driver seam and its SQLite implementation.
//!
//! # Responsibility
//! - Define the storage contract the CRUD accessor delegates to.
//! - Keep SQL generation inside the persistence boundary.
//!
//! # Invariants
//! - Repositories trust already-validated model types and never re-parse
//!   caller JSON.
//! - Driver failures are returned as `RepoError`, never retried.

pub mod document_repo;
mod sql_filter;
