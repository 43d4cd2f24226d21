//! Validated CRUD access to a schema-less animal-shelter record store.
//! The accessor is the single place where caller input becomes storage calls.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, ConnectionConfig, Credentials, StoreLocation};
pub use logging::{
    default_log_level, init_logging, logging_status, LoggingConfig, LoggingError, LoggingStatus,
};
pub use model::field::{validate_field_name, FieldNameError, ID_FIELD};
pub use model::query::{FindOptions, Projection, QueryError, QueryFilter, SortDirection, SortKey};
pub use model::record::{FieldChanges, Record, RecordId, RecordValidationError};
pub use repo::document_repo::{
    DocumentRepository, FindRequest, RepoError, RepoResult, SqliteDocumentRepository, WriteScope,
};
pub use service::crud_accessor::{AccessorError, AccessorResult, CrudAccessor, Cursor};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
