//! Use-case services.
//!
//! # Responsibility
//! - Expose the validated CRUD accessor to callers (CLI, dashboards).
//! - Keep callers decoupled from SQL and connection details.

pub mod crud_accessor;
