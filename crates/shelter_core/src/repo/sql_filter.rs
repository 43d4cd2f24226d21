//! Translation of parsed query filters into SQLite predicates.
//!
//! # Invariants
//! - Field names are embedded as JSON path literals only after they passed
//!   `validate_field_name`; values are always bound parameters.
//! - Equality and ordering are type-strict: a predicate only matches stored
//!   values of the same JSON type family (string, number, boolean).
//! - Every generated predicate evaluates to 0/1, never SQL `NULL`.

use crate::model::field::ID_FIELD;
use crate::model::query::{Condition, FilterClause, QueryFilter};
use rusqlite::types::Value as SqlValue;
use serde_json::Value;

/// SQL fragment plus its positional (`?`) parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct SqlFragment {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

/// Compiles a whole filter. The empty filter compiles to `1`.
pub(crate) fn compile_filter(filter: &QueryFilter) -> SqlFragment {
    let mut parts = Vec::with_capacity(filter.clauses().len());
    let mut params = Vec::new();
    for clause in filter.clauses() {
        let fragment = compile_clause(clause);
        parts.push(fragment.sql);
        params.extend(fragment.params);
    }
    SqlFragment {
        sql: join_or_default(parts, " AND ", "1"),
        params,
    }
}

/// Expression reading one field from a stored document.
pub(crate) fn field_expr(field: &str) -> String {
    if field == ID_FIELD {
        "id".to_string()
    } else {
        format!("json_extract(body, '{}')", json_path(field))
    }
}

/// JSON path literal for a validated field name.
pub(crate) fn json_path(field: &str) -> String {
    format!("$.\"{field}\"")
}

fn compile_clause(clause: &FilterClause) -> SqlFragment {
    match clause {
        FilterClause::Field { field, conditions } => {
            let mut parts = Vec::with_capacity(conditions.len());
            let mut params = Vec::new();
            for condition in conditions {
                let fragment = compile_condition(field, condition);
                parts.push(fragment.sql);
                params.extend(fragment.params);
            }
            SqlFragment {
                sql: join_or_default(parts, " AND ", "1"),
                params,
            }
        }
        FilterClause::And(branches) => compile_branches(branches, " AND ", "1"),
        FilterClause::Or(branches) => compile_branches(branches, " OR ", "0"),
    }
}

fn compile_branches(branches: &[QueryFilter], separator: &str, empty: &str) -> SqlFragment {
    let mut parts = Vec::with_capacity(branches.len());
    let mut params = Vec::new();
    for branch in branches {
        let fragment = compile_filter(branch);
        parts.push(fragment.sql);
        params.extend(fragment.params);
    }
    SqlFragment {
        sql: join_or_default(parts, separator, empty),
        params,
    }
}

fn compile_condition(field: &str, condition: &Condition) -> SqlFragment {
    match condition {
        Condition::Eq(value) => equals(field, value),
        Condition::Ne(value) => negate(equals(field, value)),
        Condition::Gt(value) => compare(field, ">", value),
        Condition::Gte(value) => compare(field, ">=", value),
        Condition::Lt(value) => compare(field, "<", value),
        Condition::Lte(value) => compare(field, "<=", value),
        Condition::In(values) => any_equals(field, values),
        Condition::Nin(values) => negate(any_equals(field, values)),
        Condition::Exists(expected) => exists(field, *expected),
    }
}

fn equals(field: &str, value: &Value) -> SqlFragment {
    if value.is_null() {
        // Null matches both explicit null and a missing field.
        return literal(if field == ID_FIELD {
            "0".to_string()
        } else {
            format!("({} IS NULL)", field_expr(field))
        });
    }
    compare(field, "=", value)
}

fn compare(field: &str, operator: &str, value: &Value) -> SqlFragment {
    if field == ID_FIELD {
        return match value {
            Value::String(text) => SqlFragment {
                sql: format!("(id {operator} ?)"),
                params: vec![SqlValue::Text(text.clone())],
            },
            _ => literal("0".to_string()),
        };
    }

    let Some(types) = json_types(value) else {
        return literal("0".to_string());
    };
    SqlFragment {
        sql: format!(
            "COALESCE((json_type(body, '{path}') IN ({types}) AND {expr} {operator} ?), 0)",
            path = json_path(field),
            expr = field_expr(field),
        ),
        params: vec![bind_scalar(value)],
    }
}

fn any_equals(field: &str, values: &[Value]) -> SqlFragment {
    let mut parts = Vec::with_capacity(values.len());
    let mut params = Vec::new();
    for value in values {
        let fragment = equals(field, value);
        parts.push(fragment.sql);
        params.extend(fragment.params);
    }
    SqlFragment {
        sql: join_or_default(parts, " OR ", "0"),
        params,
    }
}

fn exists(field: &str, expected: bool) -> SqlFragment {
    let sql = if field == ID_FIELD {
        let matched = if expected { "1" } else { "0" };
        matched.to_string()
    } else if expected {
        format!("(json_type(body, '{}') IS NOT NULL)", json_path(field))
    } else {
        format!("(json_type(body, '{}') IS NULL)", json_path(field))
    };
    literal(sql)
}

fn negate(fragment: SqlFragment) -> SqlFragment {
    SqlFragment {
        sql: format!("(NOT COALESCE({}, 0))", fragment.sql),
        params: fragment.params,
    }
}

fn literal(sql: String) -> SqlFragment {
    SqlFragment {
        sql,
        params: Vec::new(),
    }
}

fn join_or_default(parts: Vec<String>, separator: &str, empty: &str) -> String {
    if parts.is_empty() {
        empty.to_string()
    } else {
        format!("({})", parts.join(separator))
    }
}

/// `json_type` names that share a comparison family with `value`.
fn json_types(value: &Value) -> Option<&'static str> {
    match value {
        Value::String(_) => Some("'text'"),
        Value::Number(_) => Some("'integer', 'real'"),
        Value::Bool(_) => Some("'true', 'false'"),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Binds a scalar the way `json_extract` surfaces it.
fn bind_scalar(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Number(number) => match number.as_i64() {
            Some(integer) => SqlValue::Integer(integer),
            None => SqlValue::Real(number.as_f64().unwrap_or(f64::MAX)),
        },
        Value::String(text) => SqlValue::Text(text.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::{compile_filter, field_expr};
    use crate::model::query::QueryFilter;
    use rusqlite::types::Value as SqlValue;
    use serde_json::json;

    #[test]
    fn empty_filter_matches_everything() {
        let fragment = compile_filter(&QueryFilter::all());
        assert_eq!(fragment.sql, "1");
        assert!(fragment.params.is_empty());
    }

    #[test]
    fn id_field_maps_to_id_column() {
        assert_eq!(field_expr("_id"), "id");
        assert_eq!(field_expr("breed"), "json_extract(body, '$.\"breed\"')");

        let fragment = compile_filter(&QueryFilter::parse(&json!({"_id": "A1"})).unwrap());
        assert_eq!(fragment.sql, "(((id = ?)))");
        assert_eq!(fragment.params, vec![SqlValue::Text("A1".to_string())]);
    }

    #[test]
    fn values_are_bound_not_inlined() {
        let fragment = compile_filter(
            &QueryFilter::parse(&json!({"name": "Robert'); DROP TABLE documents;--"})).unwrap(),
        );
        assert!(!fragment.sql.contains("DROP"));
        assert_eq!(fragment.params.len(), 1);
    }

    #[test]
    fn booleans_bind_as_integers_with_boolean_type_guard() {
        let fragment = compile_filter(&QueryFilter::parse(&json!({"neutered": true})).unwrap());
        assert!(fragment.sql.contains("'true', 'false'"));
        assert_eq!(fragment.params, vec![SqlValue::Integer(1)]);
    }

    #[test]
    fn empty_in_list_matches_nothing() {
        let fragment = compile_filter(&QueryFilter::parse(&json!({"breed": {"$in": []}})).unwrap());
        assert_eq!(fragment.sql, "((0))");
    }
}
