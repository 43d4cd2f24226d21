//! Document repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Define the driver seam the CRUD accessor delegates to.
//! - Store schema-less records as JSON bodies in the `documents` table.
//!
//! # Invariants
//! - Each repository instance is bound to exactly one collection.
//! - `_id` lives in the `id` column, never inside `body`.
//! - Natural order (insertion order, `rowid`) breaks every sort tie.
//! - Read paths reject undecodable stored bodies instead of masking them.

use crate::config::{ConfigError, ConnectionConfig};
use crate::db::migrations::latest_version;
use crate::db::{open_connection, DbError};
use crate::model::field::validate_field_name;
use crate::model::query::{QueryFilter, SortKey};
use crate::model::record::{FieldChanges, Record, RecordId};
use crate::repo::sql_filter::{compile_filter, field_expr, json_path};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, Row};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type RepoResult<T> = Result<T, RepoError>;

/// Bound parameters per `IN (...)` lookup; stays well under SQLite's limit.
const MAX_IDS_PER_FETCH: usize = 500;

/// Driver-level failure surfaced to accessor callers unchanged.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    Config(ConfigError),
    DuplicateId(RecordId),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Config(err) => write!(f, "{err}"),
            Self::DuplicateId(id) => write!(f, "duplicate record id: {id}"),
            Self::InvalidData(message) => write!(f, "invalid stored document: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Config(err) => Some(err),
            Self::DuplicateId(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<ConfigError> for RepoError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// How many matching records a write may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteScope {
    /// First match in natural order.
    One,
    Many,
}

/// Selection half of a read: which records, in which order.
#[derive(Debug, Clone, Copy)]
pub struct FindRequest<'a> {
    pub filter: &'a QueryFilter,
    pub sort: &'a [SortKey],
    /// `None` returns every match.
    pub limit: Option<u32>,
}

/// Driver seam for document CRUD.
///
/// Every method maps to exactly one request against the underlying store.
pub trait DocumentRepository {
    fn ping(&self) -> RepoResult<()>;
    /// Inserts one record, generating `_id` when absent; returns the id.
    fn insert_one(&self, record: &Record) -> RepoResult<RecordId>;
    /// Ids of matching records in result order, evaluated once per read.
    fn find_ids(&self, request: &FindRequest<'_>) -> RepoResult<Vec<RecordId>>;
    /// Loads current records for `ids`, keeping their order; ids removed
    /// since `find_ids` are skipped.
    fn fetch_by_ids(&self, ids: &[RecordId]) -> RepoResult<Vec<Record>>;
    /// Applies `$set`-style changes; returns how many records changed.
    fn update(
        &self,
        filter: &QueryFilter,
        changes: &FieldChanges,
        scope: WriteScope,
    ) -> RepoResult<u64>;
    fn delete(&self, filter: &QueryFilter, scope: WriteScope) -> RepoResult<u64>;
    /// Creates an index if missing; returns the index name.
    fn create_index(&self, keys: &[SortKey]) -> RepoResult<String>;

    /// Releases the underlying handle, reporting close-time failures.
    fn close(self) -> RepoResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

/// SQLite-backed document repository owning its connection handle.
pub struct SqliteDocumentRepository {
    conn: Connection,
    collection: String,
}

impl SqliteDocumentRepository {
    /// Opens, migrates and authenticates the store described by `config`.
    pub fn open(config: &ConnectionConfig) -> RepoResult<Self> {
        config.validate()?;
        let conn = open_connection(config)?;
        Ok(Self {
            conn,
            collection: config.collection.clone(),
        })
    }

    /// Wraps an already opened connection.
    ///
    /// # Errors
    /// - `Config` when `collection` is not a valid name.
    /// - `InvalidData` when the connection was not migrated to the latest
    ///   schema version.
    pub fn from_connection(conn: Connection, collection: impl Into<String>) -> RepoResult<Self> {
        let collection = collection.into();
        validate_field_name(&collection)
            .map_err(|_| ConfigError::InvalidCollection(collection.clone()))?;

        let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
        if version != latest_version() {
            return Err(RepoError::InvalidData(format!(
                "connection schema version {version} does not match expected {}",
                latest_version()
            )));
        }

        Ok(Self { conn, collection })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl DocumentRepository for SqliteDocumentRepository {
    fn ping(&self) -> RepoResult<()> {
        self.conn
            .query_row("SELECT 1;", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    fn insert_one(&self, record: &Record) -> RepoResult<RecordId> {
        let id = record
            .id()
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let body = serde_json::to_string(&record.body())
            .map_err(|err| RepoError::InvalidData(format!("cannot encode record body: {err}")))?;

        let inserted = self.conn.execute(
            "INSERT INTO documents (collection, id, body) VALUES (?1, ?2, json(?3));",
            params![self.collection.as_str(), id.as_str(), body],
        );
        match inserted {
            Ok(_) => Ok(id),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if matches!(
                    err.extended_code,
                    rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                        | rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                ) =>
            {
                Err(RepoError::DuplicateId(id))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn find_ids(&self, request: &FindRequest<'_>) -> RepoResult<Vec<RecordId>> {
        let filter = compile_filter(request.filter);
        let mut sql = format!(
            "SELECT id FROM documents WHERE collection = ? AND {} ORDER BY ",
            filter.sql
        );
        for key in request.sort {
            sql.push_str(&field_expr(key.field()));
            sql.push(' ');
            sql.push_str(key.direction().as_sql());
            sql.push_str(", ");
        }
        sql.push_str("rowid ASC");

        let mut bind_values = Vec::with_capacity(filter.params.len() + 2);
        bind_values.push(SqlValue::Text(self.collection.clone()));
        bind_values.extend(filter.params);
        if let Some(limit) = request.limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(SqlValue::Integer(i64::from(limit)));
        }
        sql.push(';');

        let mut stmt = self.conn.prepare(&sql)?;
        let ids = stmt
            .query_map(params_from_iter(bind_values), |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    fn fetch_by_ids(&self, ids: &[RecordId]) -> RepoResult<Vec<Record>> {
        let mut found = HashMap::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_IDS_PER_FETCH) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT id, body FROM documents WHERE collection = ? AND id IN ({placeholders});"
            );
            let mut bind_values = Vec::with_capacity(chunk.len() + 1);
            bind_values.push(SqlValue::Text(self.collection.clone()));
            bind_values.extend(chunk.iter().map(|id| SqlValue::Text(id.clone())));

            let mut stmt = self.conn.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(bind_values))?;
            while let Some(row) = rows.next()? {
                let record = parse_document_row(row)?;
                if let Some(id) = record.id() {
                    found.insert(id.to_string(), record);
                }
            }
        }

        Ok(ids.iter().filter_map(|id| found.remove(id)).collect())
    }

    fn update(
        &self,
        filter: &QueryFilter,
        changes: &FieldChanges,
        scope: WriteScope,
    ) -> RepoResult<u64> {
        let filter = compile_filter(filter);

        let mut set_args = String::new();
        let mut set_values = Vec::with_capacity(changes.len());
        for (field, value) in changes.iter() {
            set_args.push_str(&format!(", '{}', json(?)", json_path(field)));
            set_values.push(SqlValue::Text(value.to_string()));
        }
        let set_expr = format!("json_set(body{set_args})");

        // Rows whose body would not change are excluded so the count
        // reflects modified records, not matched ones.
        let sql = format!(
            "UPDATE documents
             SET
                body = {set_expr},
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE rowid IN (
                SELECT rowid FROM documents
                WHERE collection = ? AND {filter_sql}
                ORDER BY rowid ASC{limit}
             )
               AND body IS NOT {set_expr};",
            filter_sql = filter.sql,
            limit = scope_limit(scope),
        );

        let mut bind_values = set_values.clone();
        bind_values.push(SqlValue::Text(self.collection.clone()));
        bind_values.extend(filter.params);
        bind_values.extend(set_values);

        let changed = self.conn.execute(&sql, params_from_iter(bind_values))?;
        Ok(changed as u64)
    }

    fn delete(&self, filter: &QueryFilter, scope: WriteScope) -> RepoResult<u64> {
        let filter = compile_filter(filter);
        let sql = match scope {
            WriteScope::Many => format!(
                "DELETE FROM documents WHERE collection = ? AND {};",
                filter.sql
            ),
            WriteScope::One => format!(
                "DELETE FROM documents
                 WHERE rowid IN (
                    SELECT rowid FROM documents
                    WHERE collection = ? AND {}
                    ORDER BY rowid ASC{}
                 );",
                filter.sql,
                scope_limit(scope)
            ),
        };

        let mut bind_values = Vec::with_capacity(filter.params.len() + 1);
        bind_values.push(SqlValue::Text(self.collection.clone()));
        bind_values.extend(filter.params);

        let removed = self.conn.execute(&sql, params_from_iter(bind_values))?;
        Ok(removed as u64)
    }

    fn create_index(&self, keys: &[SortKey]) -> RepoResult<String> {
        if keys.is_empty() {
            return Err(RepoError::InvalidData(
                "index requires at least one key".to_string(),
            ));
        }

        let columns = keys
            .iter()
            .map(|key| format!("{} {}", field_expr(key.field()), key.direction().as_sql()))
            .collect::<Vec<_>>()
            .join(", ");
        let name = index_name(&self.collection, keys, &columns);

        self.conn.execute_batch(&format!(
            "CREATE INDEX IF NOT EXISTS \"{name}\" ON documents (collection, {columns});"
        ))?;
        Ok(name)
    }

    fn close(self) -> RepoResult<()> {
        self.conn.close().map_err(|(_, err)| RepoError::from(err))
    }
}

fn scope_limit(scope: WriteScope) -> &'static str {
    match scope {
        WriteScope::One => " LIMIT 1",
        WriteScope::Many => "",
    }
}

/// Readable index name with a digest suffix so sanitized names stay unique.
fn index_name(collection: &str, keys: &[SortKey], columns: &str) -> String {
    let readable = keys
        .iter()
        .map(|key| {
            let field: String = key
                .field()
                .chars()
                .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
                .collect();
            format!("{field}_{}", key.direction().as_sql().to_ascii_lowercase())
        })
        .collect::<Vec<_>>()
        .join("_");
    let digest = Sha256::digest(format!("{collection}|{columns}").as_bytes());
    format!(
        "idx_documents_{collection}_{readable}_{}",
        hex::encode(&digest[..4])
    )
}

fn parse_document_row(row: &Row<'_>) -> RepoResult<Record> {
    let id: String = row.get("id")?;
    let body_text: String = row.get("body")?;
    let body = match serde_json::from_str::<Value>(&body_text) {
        Ok(Value::Object(body)) => body,
        Ok(other) => {
            return Err(RepoError::InvalidData(format!(
                "document `{id}` body is not an object: {other}"
            )))
        }
        Err(err) => {
            return Err(RepoError::InvalidData(format!(
                "document `{id}` body is not valid JSON: {err}"
            )))
        }
    };
    Ok(Record::from_stored(id, body))
}

#[cfg(test)]
mod tests {
    use super::index_name;
    use crate::model::query::SortKey;

    #[test]
    fn index_names_are_sanitized_and_distinct() {
        let spaced = [SortKey::ascending("Outcome Type").unwrap()];
        let underscored = [SortKey::ascending("Outcome_Type").unwrap()];

        let spaced_name = index_name("animals", &spaced, "a");
        let underscored_name = index_name("animals", &underscored, "b");

        assert!(spaced_name.starts_with("idx_documents_animals_Outcome_Type_asc_"));
        assert!(!spaced_name.contains(' '));
        assert_ne!(spaced_name, underscored_name);
    }
}
