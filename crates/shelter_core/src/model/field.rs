//! Field-name rules shared by records, filters, projections and indexes.
//!
//! # Invariants
//! - A valid field name is non-empty, never starts with `$`, and only uses
//!   `[A-Za-z0-9_ -]` (first character excludes space and dash).
//! - Valid names can be embedded verbatim in a JSON path (`$."name"`).

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Reserved identifier field generated on insert.
pub const ID_FIELD: &str = "_id";

static FIELD_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_ \-]*$").expect("valid field name regex"));

/// Reason a field name was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldNameError {
    Empty,
    OperatorPrefix,
    UnsupportedCharacters,
}

impl Display for FieldNameError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "field name cannot be empty"),
            Self::OperatorPrefix => write!(f, "field name cannot start with `$`"),
            Self::UnsupportedCharacters => write!(
                f,
                "field name may only contain letters, digits, `_`, `-` and spaces"
            ),
        }
    }
}

impl Error for FieldNameError {}

/// Checks one field name against the storage naming rules.
pub fn validate_field_name(name: &str) -> Result<(), FieldNameError> {
    if name.is_empty() {
        return Err(FieldNameError::Empty);
    }
    if name.starts_with('$') {
        return Err(FieldNameError::OperatorPrefix);
    }
    if !FIELD_NAME_RE.is_match(name) {
        return Err(FieldNameError::UnsupportedCharacters);
    }
    Ok(())
}

/// Short JSON kind label used in error messages.
pub(crate) fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Whether a value is storable as a record field value.
pub(crate) fn is_scalar(value: &serde_json::Value) -> bool {
    !matches!(
        value,
        serde_json::Value::Array(_) | serde_json::Value::Object(_)
    )
}

#[cfg(test)]
mod tests {
    use super::{validate_field_name, FieldNameError};

    #[test]
    fn accepts_dataset_style_names() {
        for name in ["animal_type", "age_upon_outcome_in_weeks", "_id", "Outcome Type", "1"] {
            assert_eq!(validate_field_name(name), Ok(()), "{name}");
        }
    }

    #[test]
    fn rejects_operator_prefix_and_path_characters() {
        assert_eq!(validate_field_name(""), Err(FieldNameError::Empty));
        assert_eq!(
            validate_field_name("$where"),
            Err(FieldNameError::OperatorPrefix)
        );
        for name in ["a.b", "quo\"te", "it's", " leading", "-dash", "tab\t"] {
            assert_eq!(
                validate_field_name(name),
                Err(FieldNameError::UnsupportedCharacters),
                "{name}"
            );
        }
    }
}
