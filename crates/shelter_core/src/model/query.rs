//! Query filter, projection and sort models.
//!
//! # Responsibility
//! - Parse Mongo-style JSON query documents into a typed filter tree.
//! - Validate projection and sort documents before they reach a driver.
//!
//! # Invariants
//! - A parsed `QueryFilter` only references valid field names.
//! - Comparison operands are scalars; `$gt/$gte/$lt/$lte` reject `null`.
//! - A `Projection` is either inclusive or exclusive, never both (except
//!   for excluding `_id` from an inclusion).

use crate::model::field::{is_scalar, json_kind, validate_field_name, FieldNameError, ID_FIELD};
use crate::model::record::Record;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Malformed filter, projection, sort or index keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    NotAMapping {
        input: &'static str,
        found: &'static str,
    },
    InvalidField {
        field: String,
        reason: FieldNameError,
    },
    UnknownOperator(String),
    InvalidOperand {
        operator: String,
        message: String,
    },
    /// `$and`/`$or` with no branches.
    EmptyLogical(String),
    InvalidProjection(String),
    InvalidSort(String),
    InvalidIndex(String),
}

impl Display for QueryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAMapping { input, found } => {
                write!(f, "{input} must be a JSON object, got {found}")
            }
            Self::InvalidField { field, reason } => {
                write!(f, "invalid field `{field}` in query: {reason}")
            }
            Self::UnknownOperator(operator) => write!(f, "unknown query operator `{operator}`"),
            Self::InvalidOperand { operator, message } => {
                write!(f, "invalid operand for `{operator}`: {message}")
            }
            Self::EmptyLogical(operator) => {
                write!(f, "`{operator}` requires a non-empty array of filters")
            }
            Self::InvalidProjection(message) => write!(f, "invalid projection: {message}"),
            Self::InvalidSort(message) => write!(f, "invalid sort: {message}"),
            Self::InvalidIndex(message) => write!(f, "invalid index: {message}"),
        }
    }
}

impl Error for QueryError {}

/// Single predicate applied to one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
}

/// One top-level clause; clauses of a filter are combined with AND.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterClause {
    Field {
        field: String,
        conditions: Vec<Condition>,
    },
    And(Vec<QueryFilter>),
    Or(Vec<QueryFilter>),
}

/// Parsed query filter. The empty filter matches every record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryFilter {
    clauses: Vec<FilterClause>,
}

impl QueryFilter {
    /// Filter matching every record.
    pub fn all() -> Self {
        Self::default()
    }

    /// Parses a JSON filter document.
    ///
    /// `null` is accepted as the empty filter.
    ///
    /// # Errors
    /// Returns `QueryError` for non-object input, invalid field names,
    /// unknown operators and malformed operands.
    pub fn parse(value: &Value) -> Result<Self, QueryError> {
        match value {
            Value::Null => Ok(Self::all()),
            Value::Object(object) => Self::parse_object(object),
            other => Err(QueryError::NotAMapping {
                input: "filter",
                found: json_kind(other),
            }),
        }
    }

    fn parse_object(object: &Map<String, Value>) -> Result<Self, QueryError> {
        let mut clauses = Vec::with_capacity(object.len());
        for (key, value) in object {
            let clause = match key.as_str() {
                "$and" => FilterClause::And(parse_branches(key, value)?),
                "$or" => FilterClause::Or(parse_branches(key, value)?),
                other if other.starts_with('$') => {
                    return Err(QueryError::UnknownOperator(other.to_string()))
                }
                field => {
                    validate_field_name(field).map_err(|reason| QueryError::InvalidField {
                        field: field.to_string(),
                        reason,
                    })?;
                    FilterClause::Field {
                        field: field.to_string(),
                        conditions: parse_conditions(field, value)?,
                    }
                }
            };
            clauses.push(clause);
        }
        Ok(Self { clauses })
    }

    pub fn clauses(&self) -> &[FilterClause] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// True when the filter is structurally match-all: no clauses, or only
    /// logical operators whose branches reduce to match-all.
    pub fn selects_all(&self) -> bool {
        self.clauses.iter().all(|clause| match clause {
            FilterClause::Field { .. } => false,
            FilterClause::And(branches) => branches.iter().all(QueryFilter::selects_all),
            FilterClause::Or(branches) => branches.iter().any(QueryFilter::selects_all),
        })
    }
}

fn parse_branches(operator: &str, value: &Value) -> Result<Vec<QueryFilter>, QueryError> {
    let items = value.as_array().ok_or_else(|| QueryError::InvalidOperand {
        operator: operator.to_string(),
        message: format!("expected array, got {}", json_kind(value)),
    })?;
    if items.is_empty() {
        return Err(QueryError::EmptyLogical(operator.to_string()));
    }

    let mut branches = Vec::with_capacity(items.len());
    for item in items {
        let object = item.as_object().ok_or_else(|| QueryError::InvalidOperand {
            operator: operator.to_string(),
            message: format!("expected filter object, got {}", json_kind(item)),
        })?;
        branches.push(QueryFilter::parse_object(object)?);
    }
    Ok(branches)
}

fn parse_conditions(field: &str, value: &Value) -> Result<Vec<Condition>, QueryError> {
    let object = match value {
        Value::Object(object) => object,
        other => return Ok(vec![Condition::Eq(scalar_operand("$eq", other)?)]),
    };

    if object.is_empty() || !object.keys().all(|key| key.starts_with('$')) {
        // Records are flat, so embedded-document equality can never match.
        return Err(QueryError::InvalidOperand {
            operator: "$eq".to_string(),
            message: format!("field `{field}` expects a scalar or an operator document"),
        });
    }

    let mut conditions = Vec::with_capacity(object.len());
    for (operator, operand) in object {
        let condition = match operator.as_str() {
            "$eq" => Condition::Eq(scalar_operand(operator, operand)?),
            "$ne" => Condition::Ne(scalar_operand(operator, operand)?),
            "$gt" => Condition::Gt(ordered_operand(operator, operand)?),
            "$gte" => Condition::Gte(ordered_operand(operator, operand)?),
            "$lt" => Condition::Lt(ordered_operand(operator, operand)?),
            "$lte" => Condition::Lte(ordered_operand(operator, operand)?),
            "$in" => Condition::In(list_operand(operator, operand)?),
            "$nin" => Condition::Nin(list_operand(operator, operand)?),
            "$exists" => match operand {
                Value::Bool(flag) => Condition::Exists(*flag),
                other => {
                    return Err(QueryError::InvalidOperand {
                        operator: operator.clone(),
                        message: format!("expected boolean, got {}", json_kind(other)),
                    })
                }
            },
            unknown => return Err(QueryError::UnknownOperator(unknown.to_string())),
        };
        conditions.push(condition);
    }
    Ok(conditions)
}

fn scalar_operand(operator: &str, operand: &Value) -> Result<Value, QueryError> {
    if !is_scalar(operand) {
        return Err(QueryError::InvalidOperand {
            operator: operator.to_string(),
            message: format!("expected scalar, got {}", json_kind(operand)),
        });
    }
    Ok(operand.clone())
}

fn ordered_operand(operator: &str, operand: &Value) -> Result<Value, QueryError> {
    if operand.is_null() {
        return Err(QueryError::InvalidOperand {
            operator: operator.to_string(),
            message: "cannot order against null".to_string(),
        });
    }
    scalar_operand(operator, operand)
}

fn list_operand(operator: &str, operand: &Value) -> Result<Vec<Value>, QueryError> {
    let items = operand.as_array().ok_or_else(|| QueryError::InvalidOperand {
        operator: operator.to_string(),
        message: format!("expected array, got {}", json_kind(operand)),
    })?;
    items
        .iter()
        .map(|item| scalar_operand(operator, item))
        .collect()
}

/// Field selection applied to returned records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// Keep only these fields; `_id` is kept unless `exclude_id` is set.
    Include {
        fields: BTreeSet<String>,
        exclude_id: bool,
    },
    /// Drop these fields.
    Exclude(BTreeSet<String>),
}

impl Projection {
    /// Parses `{field: 1|0|true|false}`.
    ///
    /// # Errors
    /// Returns `QueryError` for non-object input, empty projections, invalid
    /// field names, non-0/1 flags or mixed inclusion/exclusion.
    pub fn parse(value: &Value) -> Result<Self, QueryError> {
        let object = value.as_object().ok_or(QueryError::NotAMapping {
            input: "projection",
            found: json_kind(value),
        })?;
        if object.is_empty() {
            return Err(QueryError::InvalidProjection(
                "projection must name at least one field".to_string(),
            ));
        }

        let mut included = BTreeSet::new();
        let mut excluded = BTreeSet::new();
        for (field, flag) in object {
            validate_field_name(field).map_err(|reason| QueryError::InvalidField {
                field: field.clone(),
                reason,
            })?;
            let include = match flag {
                Value::Bool(flag) => *flag,
                Value::Number(number) if number.as_i64() == Some(1) => true,
                Value::Number(number) if number.as_i64() == Some(0) => false,
                other => {
                    return Err(QueryError::InvalidProjection(format!(
                        "field `{field}` must be 0, 1, true or false, got {other}"
                    )))
                }
            };
            if include {
                included.insert(field.clone());
            } else {
                excluded.insert(field.clone());
            }
        }

        if included.is_empty() {
            return Ok(Self::Exclude(excluded));
        }
        let exclude_id = excluded.remove(ID_FIELD);
        if let Some(field) = excluded.into_iter().next() {
            return Err(QueryError::InvalidProjection(format!(
                "cannot exclude `{field}` in an inclusion projection"
            )));
        }
        Ok(Self::Include {
            fields: included,
            exclude_id,
        })
    }

    /// Builds an inclusion projection from field names.
    pub fn include<I, S>(fields: I) -> Result<Self, QueryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields = collect_fields(fields)?;
        if fields.is_empty() {
            return Err(QueryError::InvalidProjection(
                "projection must name at least one field".to_string(),
            ));
        }
        Ok(Self::Include {
            fields,
            exclude_id: false,
        })
    }

    /// Builds an exclusion projection from field names.
    pub fn exclude<I, S>(fields: I) -> Result<Self, QueryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields = collect_fields(fields)?;
        if fields.is_empty() {
            return Err(QueryError::InvalidProjection(
                "projection must name at least one field".to_string(),
            ));
        }
        Ok(Self::Exclude(fields))
    }

    /// Applies this projection to one record.
    pub fn apply(&self, record: Record) -> Record {
        let fields = record.into_fields();
        let projected = match self {
            Self::Include { fields: keep, exclude_id } => fields
                .into_iter()
                .filter(|(field, _)| {
                    keep.contains(field) || (field == ID_FIELD && !exclude_id)
                })
                .collect(),
            Self::Exclude(drop) => fields
                .into_iter()
                .filter(|(field, _)| !drop.contains(field))
                .collect(),
        };
        Record::from_fields(projected)
    }
}

fn collect_fields<I, S>(fields: I) -> Result<BTreeSet<String>, QueryError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut collected = BTreeSet::new();
    for field in fields {
        let field = field.into();
        validate_field_name(&field).map_err(|reason| QueryError::InvalidField {
            field: field.clone(),
            reason,
        })?;
        collected.insert(field);
    }
    Ok(collected)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    /// Maps Mongo-style `1` / `-1` directions.
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            1 => Some(Self::Ascending),
            -1 => Some(Self::Descending),
            _ => None,
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

/// Validated `(field, direction)` pair used by sorts and indexes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    field: String,
    direction: SortDirection,
}

impl SortKey {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Result<Self, QueryError> {
        let field = field.into();
        validate_field_name(&field).map_err(|reason| QueryError::InvalidField {
            field: field.clone(),
            reason,
        })?;
        Ok(Self { field, direction })
    }

    pub fn ascending(field: impl Into<String>) -> Result<Self, QueryError> {
        Self::new(field, SortDirection::Ascending)
    }

    pub fn descending(field: impl Into<String>) -> Result<Self, QueryError> {
        Self::new(field, SortDirection::Descending)
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn direction(&self) -> SortDirection {
        self.direction
    }

    /// Parses `[["field", 1], ["other", -1]]`.
    ///
    /// # Errors
    /// Returns `QueryError::InvalidSort` for any malformed entry.
    pub fn parse_list(value: &Value) -> Result<Vec<Self>, QueryError> {
        let items = value.as_array().ok_or_else(|| {
            QueryError::InvalidSort(format!("expected array, got {}", json_kind(value)))
        })?;

        let mut keys = Vec::with_capacity(items.len());
        for item in items {
            let pair = match item.as_array() {
                Some(pair) if pair.len() == 2 => pair,
                _ => {
                    return Err(QueryError::InvalidSort(format!(
                        "expected [field, direction] pair, got {item}"
                    )))
                }
            };
            let field = pair[0].as_str().ok_or_else(|| {
                QueryError::InvalidSort(format!("sort field must be a string, got {}", pair[0]))
            })?;
            let direction = pair[1]
                .as_i64()
                .and_then(SortDirection::from_i64)
                .ok_or_else(|| {
                    QueryError::InvalidSort(format!(
                        "direction for `{field}` must be 1 or -1, got {}",
                        pair[1]
                    ))
                })?;
            keys.push(Self::new(field, direction)?);
        }
        Ok(keys)
    }
}

/// Read shaping options: projection, sort and limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub projection: Option<Projection>,
    pub sort: Vec<SortKey>,
    /// `None` or `Some(0)` reads every match.
    pub limit: Option<u32>,
}

impl FindOptions {
    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn with_sort(mut self, key: SortKey) -> Self {
        self.sort.push(key);
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Effective limit; zero means unlimited.
    pub fn effective_limit(&self) -> Option<u32> {
        self.limit.filter(|limit| *limit > 0)
    }
}
