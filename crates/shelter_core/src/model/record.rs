//! Record and change-set models.
//!
//! # Responsibility
//! - Turn untyped JSON input into validated `Record` / `FieldChanges` values.
//! - Keep boundary validation independent from any storage driver.
//!
//! # Invariants
//! - A `Record` built from caller input is a non-empty object of scalar
//!   values with valid field names.
//! - `_id`, when present, is a non-empty string.
//! - `FieldChanges` never touches `_id`.

use crate::model::field::{is_scalar, json_kind, validate_field_name, FieldNameError, ID_FIELD};
use serde::Serialize;
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Identifier stored in the `_id` field of every persisted record.
pub type RecordId = String;

/// Validation failure raised before any driver call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordValidationError {
    /// Input for `input` was not a JSON object.
    NotAMapping {
        input: &'static str,
        found: &'static str,
    },
    EmptyRecord,
    EmptyChanges,
    /// Update/delete filters must select something explicitly.
    EmptyFilter,
    InvalidFieldName {
        field: String,
        reason: FieldNameError,
    },
    UnsupportedValue {
        field: String,
        kind: &'static str,
    },
    InvalidId {
        kind: &'static str,
    },
    ImmutableId,
}

impl Display for RecordValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAMapping { input, found } => {
                write!(f, "{input} must be a JSON object, got {found}")
            }
            Self::EmptyRecord => write!(f, "record must contain at least one field"),
            Self::EmptyChanges => write!(f, "changes must contain at least one field"),
            Self::EmptyFilter => write!(
                f,
                "filter must contain at least one condition for update/delete"
            ),
            Self::InvalidFieldName { field, reason } => {
                write!(f, "invalid field name `{field}`: {reason}")
            }
            Self::UnsupportedValue { field, kind } => write!(
                f,
                "field `{field}` holds unsupported {kind} value; expected string, number, boolean or null"
            ),
            Self::InvalidId { kind } => {
                write!(f, "`_id` must be a non-empty string, got {kind}")
            }
            Self::ImmutableId => write!(f, "`_id` cannot be changed by an update"),
        }
    }
}

impl Error for RecordValidationError {}

/// One schema-less document: field name to scalar value.
///
/// Built only through `from_value` or storage reads, so every instance
/// passed validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    /// Validates caller input and builds a record.
    ///
    /// # Errors
    /// - `NotAMapping` when `value` is not an object.
    /// - `EmptyRecord` when the object has no fields.
    /// - `InvalidFieldName` / `UnsupportedValue` / `InvalidId` per field.
    pub fn from_value(value: &Value) -> Result<Self, RecordValidationError> {
        let object = value
            .as_object()
            .ok_or(RecordValidationError::NotAMapping {
                input: "record",
                found: json_kind(value),
            })?;
        if object.is_empty() {
            return Err(RecordValidationError::EmptyRecord);
        }

        for (field, field_value) in object {
            validate_entry(field, field_value)?;
        }
        if let Some(id) = object.get(ID_FIELD) {
            match id {
                Value::String(text) if !text.is_empty() => {}
                other => {
                    return Err(RecordValidationError::InvalidId {
                        kind: json_kind(other),
                    })
                }
            }
        }

        Ok(Self {
            fields: object.clone(),
        })
    }

    /// Rebuilds a record read back from storage.
    ///
    /// Storage keeps `_id` outside of the body, so it is re-attached here.
    pub(crate) fn from_stored(id: RecordId, mut body: Map<String, Value>) -> Self {
        body.insert(ID_FIELD.to_string(), Value::String(id));
        Self { fields: body }
    }

    pub(crate) fn from_fields(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Returns the `_id` value when present.
    pub fn id(&self) -> Option<&str> {
        self.fields.get(ID_FIELD).and_then(Value::as_str)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Fields excluding `_id`, in the shape stored as the document body.
    pub fn body(&self) -> Map<String, Value> {
        let mut body = self.fields.clone();
        body.remove(ID_FIELD);
        body
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub(crate) fn into_fields(self) -> Map<String, Value> {
        self.fields
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

/// Validated `$set`-style change set for updates.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChanges {
    fields: Map<String, Value>,
}

impl FieldChanges {
    /// Validates caller input for an update.
    ///
    /// # Errors
    /// - `NotAMapping` / `EmptyChanges` for malformed containers.
    /// - `ImmutableId` when `_id` is part of the changes.
    /// - `InvalidFieldName` / `UnsupportedValue` per field.
    pub fn from_value(value: &Value) -> Result<Self, RecordValidationError> {
        let object = value
            .as_object()
            .ok_or(RecordValidationError::NotAMapping {
                input: "changes",
                found: json_kind(value),
            })?;
        if object.is_empty() {
            return Err(RecordValidationError::EmptyChanges);
        }
        if object.contains_key(ID_FIELD) {
            return Err(RecordValidationError::ImmutableId);
        }
        for (field, field_value) in object {
            validate_entry(field, field_value)?;
        }

        Ok(Self {
            fields: object.clone(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

fn validate_entry(field: &str, value: &Value) -> Result<(), RecordValidationError> {
    validate_field_name(field).map_err(|reason| RecordValidationError::InvalidFieldName {
        field: field.to_string(),
        reason,
    })?;
    if !is_scalar(value) {
        return Err(RecordValidationError::UnsupportedValue {
            field: field.to_string(),
            kind: json_kind(value),
        });
    }
    Ok(())
}
