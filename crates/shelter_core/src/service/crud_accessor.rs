//! CRUD accessor over a document repository.
//!
//! # Responsibility
//! - Validate untyped caller input at the boundary.
//! - Delegate each operation to exactly one repository call.
//! - Report outcomes through typed errors and metadata-only log events.
//!
//! # Invariants
//! - Validation and query errors are raised before any repository call.
//! - Update/delete never run with an empty filter.
//! - Repository failures are propagated unchanged and never retried.

use crate::config::ConnectionConfig;
use crate::model::query::{FindOptions, Projection, QueryError, QueryFilter, SortKey};
use crate::model::record::{FieldChanges, Record, RecordId, RecordValidationError};
use crate::repo::document_repo::{
    DocumentRepository, FindRequest, RepoError, SqliteDocumentRepository, WriteScope,
};
use log::{debug, error, info, warn};
use serde_json::Value;
use std::collections::VecDeque;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::iter::FusedIterator;
use std::time::Instant;

/// Records fetched per repository round-trip while iterating a cursor.
pub const DEFAULT_BATCH_SIZE: u32 = 100;

/// Fields indexed by `create_default_indexes`, matching common dashboard
/// filters over the shelter outcomes dataset.
pub const DEFAULT_INDEX_FIELDS: &[&str] = &[
    "animal_type",
    "breed",
    "sex_upon_outcome",
    "age_upon_outcome_in_weeks",
    "outcome_type",
    "name",
    "location_lat",
    "location_long",
];

pub type AccessorResult<T> = Result<T, AccessorError>;

/// Error surfaced by every accessor operation.
#[derive(Debug)]
pub enum AccessorError {
    /// Malformed or empty input; fix the input and retry.
    Validation(RecordValidationError),
    /// Malformed filter, projection, sort or index keys.
    Query(QueryError),
    /// Failure reported by the underlying driver.
    Driver(RepoError),
}

impl Display for AccessorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "validation error: {err}"),
            Self::Query(err) => write!(f, "query error: {err}"),
            Self::Driver(err) => write!(f, "driver error: {err}"),
        }
    }
}

impl Error for AccessorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Query(err) => Some(err),
            Self::Driver(err) => Some(err),
        }
    }
}

impl From<RecordValidationError> for AccessorError {
    fn from(value: RecordValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<QueryError> for AccessorError {
    fn from(value: QueryError) -> Self {
        Self::Query(value)
    }
}

impl From<RepoError> for AccessorError {
    fn from(value: RepoError) -> Self {
        Self::Driver(value)
    }
}

impl AccessorError {
    fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Query(_) => "query",
            Self::Driver(_) => "driver",
        }
    }

    /// Error text for log events. Driver errors that would echo an `_id`
    /// or a stored body are reduced to their kind.
    fn log_message(&self) -> String {
        match self {
            Self::Driver(RepoError::DuplicateId(_)) => "duplicate record id".to_string(),
            Self::Driver(RepoError::InvalidData(_)) => "invalid stored document".to_string(),
            other => other.to_string(),
        }
    }
}

/// Validated CRUD entry point owning one repository (and its handle).
pub struct CrudAccessor<R: DocumentRepository> {
    repo: R,
    batch_size: u32,
}

impl CrudAccessor<SqliteDocumentRepository> {
    /// Opens the SQLite-backed store described by `config`.
    ///
    /// # Errors
    /// Returns `AccessorError::Driver` for configuration, open, migration or
    /// authentication failures.
    pub fn connect(config: &ConnectionConfig) -> AccessorResult<Self> {
        let started_at = Instant::now();
        match SqliteDocumentRepository::open(config) {
            Ok(repo) => {
                info!(
                    "event=accessor_connect module=accessor status=ok collection={} duration_ms={}",
                    repo.collection(),
                    started_at.elapsed().as_millis()
                );
                Ok(Self::new(repo))
            }
            Err(err) => {
                error!(
                    "event=accessor_connect module=accessor status=error duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err.into())
            }
        }
    }
}

impl<R: DocumentRepository> CrudAccessor<R> {
    pub fn new(repo: R) -> Self {
        Self {
            repo,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Overrides the cursor batch size; zero is raised to one.
    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Health check against the driver.
    pub fn ping(&self) -> AccessorResult<()> {
        self.repo.ping().map_err(AccessorError::from)
    }

    /// Inserts one record and returns its `_id`.
    ///
    /// # Errors
    /// - `Validation` when `record` is not a non-empty object of scalars.
    /// - `Driver` for storage failures, including duplicate `_id`.
    pub fn create(&self, record: &Value) -> AccessorResult<RecordId> {
        let started_at = Instant::now();
        let result = Record::from_value(record)
            .map_err(AccessorError::from)
            .and_then(|record| self.repo.insert_one(&record).map_err(AccessorError::from));

        match &result {
            Ok(_) => info!(
                "event=record_create module=accessor status=ok duration_ms={}",
                started_at.elapsed().as_millis()
            ),
            Err(err) => log_failure("record_create", err, started_at),
        }
        result
    }

    /// Starts a lazy read over records matching `filter`.
    ///
    /// `null` or `{}` selects every record. Records are fetched from the
    /// driver in batches while the cursor is iterated.
    ///
    /// # Errors
    /// `Query` when the filter is malformed. Driver failures surface as
    /// `Err` items during iteration.
    pub fn read(&self, filter: &Value, options: FindOptions) -> AccessorResult<Cursor<'_, R>> {
        let filter = QueryFilter::parse(filter).map_err(|err| {
            let err = AccessorError::from(err);
            warn!(
                "event=record_read module=accessor status=error error_code={} error={}",
                err.code(),
                err.log_message()
            );
            err
        })?;
        debug!(
            "event=record_read module=accessor status=start clauses={} sort_keys={} limit={}",
            filter.clauses().len(),
            options.sort.len(),
            options.effective_limit().map_or(0, u64::from)
        );
        Ok(Cursor::new(&self.repo, filter, options, self.batch_size))
    }

    /// Convenience read taking JSON projection and sort documents.
    ///
    /// # Errors
    /// `Query` when any of the documents is malformed.
    pub fn read_json(
        &self,
        filter: &Value,
        projection: Option<&Value>,
        sort: Option<&Value>,
        limit: Option<u32>,
    ) -> AccessorResult<Cursor<'_, R>> {
        let options = FindOptions {
            projection: projection.map(Projection::parse).transpose()?,
            sort: sort.map(SortKey::parse_list).transpose()?.unwrap_or_default(),
            limit,
        };
        self.read(filter, options)
    }

    /// Sets `changes` on every record matching `filter`.
    ///
    /// Returns the number of records whose stored values changed.
    ///
    /// # Errors
    /// - `Validation` for empty filter or empty/malformed changes.
    /// - `Query` for a malformed filter.
    pub fn update(&self, filter: &Value, changes: &Value) -> AccessorResult<u64> {
        self.update_scoped(filter, changes, WriteScope::Many)
    }

    /// Like `update`, limited to the first match in insertion order.
    pub fn update_one(&self, filter: &Value, changes: &Value) -> AccessorResult<u64> {
        self.update_scoped(filter, changes, WriteScope::One)
    }

    /// Removes every record matching `filter`; returns the removed count.
    ///
    /// # Errors
    /// - `Validation` for an empty filter.
    /// - `Query` for a malformed filter.
    pub fn delete(&self, filter: &Value) -> AccessorResult<u64> {
        self.delete_scoped(filter, WriteScope::Many)
    }

    /// Like `delete`, limited to the first match in insertion order.
    pub fn delete_one(&self, filter: &Value) -> AccessorResult<u64> {
        self.delete_scoped(filter, WriteScope::One)
    }

    /// Creates an index over `keys` if it does not exist yet.
    ///
    /// # Errors
    /// `Query` when `keys` is empty.
    pub fn create_index(&self, keys: &[SortKey]) -> AccessorResult<String> {
        if keys.is_empty() {
            return Err(AccessorError::Query(QueryError::InvalidIndex(
                "index requires at least one key".to_string(),
            )));
        }
        let name = self.repo.create_index(keys)?;
        info!(
            "event=index_create module=accessor status=ok keys={}",
            keys.len()
        );
        Ok(name)
    }

    /// Creates the dashboard indexes plus `(animal_type, breed)`.
    ///
    /// Safe to call repeatedly.
    pub fn create_default_indexes(&self) -> AccessorResult<Vec<String>> {
        let mut names = Vec::with_capacity(DEFAULT_INDEX_FIELDS.len() + 1);
        for field in DEFAULT_INDEX_FIELDS {
            names.push(self.create_index(&[SortKey::ascending(*field)?])?);
        }
        names.push(self.create_index(&[
            SortKey::ascending("animal_type")?,
            SortKey::ascending("breed")?,
        ])?);
        Ok(names)
    }

    /// Releases the repository and its connection handle.
    pub fn close(self) -> AccessorResult<()> {
        self.repo.close()?;
        info!("event=accessor_close module=accessor status=ok");
        Ok(())
    }

    fn update_scoped(
        &self,
        filter: &Value,
        changes: &Value,
        scope: WriteScope,
    ) -> AccessorResult<u64> {
        let started_at = Instant::now();
        let result = mutation_filter(filter).and_then(|filter| {
            let changes = FieldChanges::from_value(changes)?;
            Ok(self.repo.update(&filter, &changes, scope)?)
        });

        match &result {
            Ok(modified) => info!(
                "event=record_update module=accessor status=ok scope={} modified={} duration_ms={}",
                scope_label(scope),
                modified,
                started_at.elapsed().as_millis()
            ),
            Err(err) => log_failure("record_update", err, started_at),
        }
        result
    }

    fn delete_scoped(&self, filter: &Value, scope: WriteScope) -> AccessorResult<u64> {
        let started_at = Instant::now();
        let result = mutation_filter(filter)
            .and_then(|filter| Ok(self.repo.delete(&filter, scope)?));

        match &result {
            Ok(removed) => info!(
                "event=record_delete module=accessor status=ok scope={} removed={} duration_ms={}",
                scope_label(scope),
                removed,
                started_at.elapsed().as_millis()
            ),
            Err(err) => log_failure("record_delete", err, started_at),
        }
        result
    }
}

/// Parses a filter for update/delete, refusing to match everything.
///
/// Match-all shapes nested in logical operators, such as `{"$and": [{}]}`,
/// count as empty too.
fn mutation_filter(filter: &Value) -> AccessorResult<QueryFilter> {
    let filter = QueryFilter::parse(filter)?;
    if filter.selects_all() {
        return Err(RecordValidationError::EmptyFilter.into());
    }
    Ok(filter)
}

fn scope_label(scope: WriteScope) -> &'static str {
    match scope {
        WriteScope::One => "one",
        WriteScope::Many => "many",
    }
}

fn log_failure(event: &str, err: &AccessorError, started_at: Instant) {
    match err {
        AccessorError::Driver(_) => error!(
            "event={} module=accessor status=error error_code={} duration_ms={} error={}",
            event,
            err.code(),
            started_at.elapsed().as_millis(),
            err.log_message()
        ),
        _ => warn!(
            "event={} module=accessor status=error error_code={} error={}",
            event,
            err.code(),
            err.log_message()
        ),
    }
}

/// Lazy, batch-fetching sequence of records returned by `read`.
///
/// The first `next` call fixes which records match and in what order;
/// record bodies are then loaded in batches, so writes made while iterating
/// never shift or hide records that are still pending. A pending record
/// deleted in the meantime is skipped.
///
/// Iteration cannot be rewound; call `read` again to restart. After a
/// driver error the cursor yields that error once and then ends.
pub struct Cursor<'a, R: DocumentRepository> {
    repo: &'a R,
    filter: QueryFilter,
    sort: Vec<SortKey>,
    projection: Option<Projection>,
    limit: Option<u32>,
    /// `None` until the matching ids were captured.
    pending: Option<VecDeque<RecordId>>,
    batch_size: u32,
    buffer: VecDeque<Record>,
    exhausted: bool,
    returned: u64,
}

impl<'a, R: DocumentRepository> Cursor<'a, R> {
    fn new(repo: &'a R, filter: QueryFilter, options: FindOptions, batch_size: u32) -> Self {
        let limit = options.effective_limit();
        Self {
            repo,
            filter,
            sort: options.sort,
            projection: options.projection,
            limit,
            pending: None,
            batch_size,
            buffer: VecDeque::new(),
            exhausted: false,
            returned: 0,
        }
    }

    /// Records yielded so far.
    pub fn returned(&self) -> u64 {
        self.returned
    }

    fn fetch_next_batch(&mut self) -> Result<(), RepoError> {
        if self.pending.is_none() {
            let ids = self.repo.find_ids(&FindRequest {
                filter: &self.filter,
                sort: &self.sort,
                limit: self.limit,
            })?;
            debug!(
                "event=cursor_open module=accessor status=ok matched={}",
                ids.len()
            );
            self.pending = Some(VecDeque::from(ids));
        }
        let Some(pending) = self.pending.as_mut() else {
            self.exhausted = true;
            return Ok(());
        };

        let take = pending.len().min(self.batch_size as usize);
        if take == 0 {
            self.exhausted = true;
            return Ok(());
        }
        let ids: Vec<RecordId> = pending.drain(..take).collect();
        let batch = self.repo.fetch_by_ids(&ids)?;
        debug!(
            "event=cursor_batch module=accessor status=ok requested={} fetched={}",
            ids.len(),
            batch.len()
        );
        self.buffer.extend(batch);
        Ok(())
    }
}

impl<R: DocumentRepository> Iterator for Cursor<'_, R> {
    type Item = AccessorResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        // A batch can come back empty when all of its records were deleted.
        while self.buffer.is_empty() && !self.exhausted {
            if let Err(err) = self.fetch_next_batch() {
                self.exhausted = true;
                let err = AccessorError::from(err);
                error!(
                    "event=record_read module=accessor status=error error_code={} returned={} error={}",
                    err.code(),
                    self.returned,
                    err.log_message()
                );
                return Some(Err(err));
            }
        }

        let record = self.buffer.pop_front()?;
        self.returned += 1;
        Some(Ok(match &self.projection {
            Some(projection) => projection.apply(record),
            None => record,
        }))
    }
}

impl<R: DocumentRepository> FusedIterator for Cursor<'_, R> {}
