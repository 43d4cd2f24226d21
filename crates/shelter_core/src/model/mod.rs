//! Record and query models shared by the accessor and storage drivers.
//!
//! # Responsibility
//! - Define the validated shapes crossing the accessor boundary.
//! - Keep JSON-input parsing separate from SQL generation.
//!
//! # Invariants
//! - Every value held by these types already passed boundary validation.

pub mod field;
pub mod query;
pub mod record;
