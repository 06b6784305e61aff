//! Mongo-style predicate matching over stored records.
//!
//! Filters are evaluated against the whole record, so payload fields are
//! addressed as `_data.<path>`. A path that crosses an array fans out over
//! its elements, and a field condition holds if any reached value satisfies
//! it (`$ne` and `$nin` hold only if none do).
//!
//! Supported operators:
//! - field: `$eq $ne $gt $gte $lt $lte $in $nin $exists`
//! - logical (top level): `$and $or $nor`

use std::cmp::Ordering;

use serde_json::{Map, Value};

use refdb_types::Entry;

use crate::error::{QueryError, QueryResult};
use crate::value::{compare_values, values_equal};

/// Returns `true` if `document` satisfies every clause of `filter`.
///
/// An empty filter matches everything.
pub fn matches(document: &Value, filter: &Map<String, Value>) -> QueryResult<bool> {
    for (key, condition) in filter {
        let satisfied = match key.as_str() {
            "$and" => all_of(document, condition)?,
            "$or" => any_of(document, condition)?,
            "$nor" => !any_of(document, condition)?,
            op if op.starts_with('$') => return Err(QueryError::UnknownOperator(op.to_string())),
            path => {
                let mut reached = Vec::new();
                collect(document, &path.split('.').collect::<Vec<_>>(), &mut reached);
                matches_condition(&reached, condition)?
            }
        };
        if !satisfied {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Keep the entries whose record matches `filter`, preserving order.
pub fn filter_entries(entries: Vec<Entry>, filter: &Map<String, Value>) -> QueryResult<Vec<Entry>> {
    if filter.is_empty() {
        return Ok(entries);
    }
    let mut kept = Vec::with_capacity(entries.len());
    for entry in entries {
        if matches(&entry.to_value(), filter)? {
            kept.push(entry);
        }
    }
    Ok(kept)
}

fn clauses<'a>(op: &str, condition: &'a Value) -> QueryResult<Vec<&'a Map<String, Value>>> {
    let Value::Array(items) = condition else {
        return Err(QueryError::InvalidOperand {
            op: op.to_string(),
            expected: "an array of filters",
        });
    };
    items
        .iter()
        .map(|item| item.as_object().ok_or(QueryError::NotAnObject))
        .collect()
}

fn all_of(document: &Value, condition: &Value) -> QueryResult<bool> {
    for clause in clauses("$and", condition)? {
        if !matches(document, clause)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn any_of(document: &Value, condition: &Value) -> QueryResult<bool> {
    for clause in clauses("$or", condition)? {
        if matches(document, clause)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn collect<'a>(value: &'a Value, path: &[&str], out: &mut Vec<&'a Value>) {
    let Some((head, rest)) = path.split_first() else {
        out.push(value);
        return;
    };
    match value {
        Value::Object(map) => {
            if let Some(child) = map.get(*head) {
                collect(child, rest, out);
            }
        }
        Value::Array(items) => match head.parse::<usize>() {
            Ok(index) => {
                if let Some(child) = items.get(index) {
                    collect(child, rest, out);
                }
            }
            Err(_) => {
                for item in items {
                    collect(item, path, out);
                }
            }
        },
        _ => {}
    }
}

fn is_operator_object(condition: &Value) -> Option<&Map<String, Value>> {
    match condition {
        Value::Object(map) if !map.is_empty() && map.keys().all(|k| k.starts_with('$')) => Some(map),
        _ => None,
    }
}

/// Equality where an array value also matches any of its elements.
fn equals(actual: &Value, expected: &Value) -> bool {
    values_equal(actual, expected)
        || matches!(actual, Value::Array(items) if items.iter().any(|item| values_equal(item, expected)))
}

fn any_equals(reached: &[&Value], expected: &Value) -> bool {
    if reached.is_empty() {
        return expected.is_null();
    }
    reached.iter().any(|actual| equals(actual, expected))
}

fn matches_condition(reached: &[&Value], condition: &Value) -> QueryResult<bool> {
    let Some(operators) = is_operator_object(condition) else {
        return Ok(any_equals(reached, condition));
    };

    for (op, operand) in operators {
        let satisfied = match op.as_str() {
            "$eq" => any_equals(reached, operand),
            "$ne" => !any_equals(reached, operand),
            "$gt" => any_compares(reached, operand, |o| o == Ordering::Greater),
            "$gte" => any_compares(reached, operand, |o| o != Ordering::Less),
            "$lt" => any_compares(reached, operand, |o| o == Ordering::Less),
            "$lte" => any_compares(reached, operand, |o| o != Ordering::Greater),
            "$in" => in_list(op, reached, operand)?,
            "$nin" => !in_list(op, reached, operand)?,
            "$exists" => {
                let Value::Bool(expected) = operand else {
                    return Err(QueryError::InvalidOperand {
                        op: op.clone(),
                        expected: "a boolean",
                    });
                };
                reached.is_empty() != *expected
            }
            other => return Err(QueryError::UnknownOperator(other.to_string())),
        };
        if !satisfied {
            return Ok(false);
        }
    }
    Ok(true)
}

fn any_compares(reached: &[&Value], operand: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    reached.iter().any(|actual| {
        let check = |v: &Value| compare_values(v, operand).map(&accept).unwrap_or(false);
        match *actual {
            Value::Array(items) => items.iter().any(check),
            other => check(other),
        }
    })
}

fn in_list(op: &str, reached: &[&Value], operand: &Value) -> QueryResult<bool> {
    let Value::Array(candidates) = operand else {
        return Err(QueryError::InvalidOperand {
            op: op.to_string(),
            expected: "an array",
        });
    };
    Ok(candidates.iter().any(|candidate| any_equals(reached, candidate)))
}
