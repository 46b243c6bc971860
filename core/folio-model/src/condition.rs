//! Field visibility conditions.
//!
//! A field with conditions is visible when at least one of them holds.
//! Conditions reference sibling fields, so they are evaluated against the
//! object that encloses the field: the entry root, or a list item / nested
//! object addressed by a dotted path such as `list.2`.

use crate::field::Field;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// One or many visibility conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Conditions {
    One(Condition),
    Any(Vec<Condition>),
}

impl Conditions {
    fn as_slice(&self) -> &[Condition] {
        match self {
            Self::One(condition) => std::slice::from_ref(condition),
            Self::Any(conditions) => conditions,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Sibling field name, dotted for nested lookups (`meta.kind`).
    pub field: String,
    /// Expected value; when absent the condition checks for a truthy value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default)]
    pub operator: ConditionOperator,
}

impl Condition {
    pub fn equals(field: &str, value: Value) -> Self {
        Self {
            field: field.into(),
            value: Some(value),
            operator: ConditionOperator::Eq,
        }
    }

    fn holds(&self, scope: &Value) -> bool {
        let actual = resolve_path(scope, &self.field);
        let Some(expected) = &self.value else {
            return actual.is_some_and(is_truthy);
        };
        let actual = actual.unwrap_or(&Value::Null);
        match self.operator {
            ConditionOperator::Eq => values_equal(actual, expected),
            ConditionOperator::Ne => !values_equal(actual, expected),
            ConditionOperator::Gt => compare(actual, expected) == Some(Ordering::Greater),
            ConditionOperator::Ge => matches!(
                compare(actual, expected),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            ConditionOperator::Lt => compare(actual, expected) == Some(Ordering::Less),
            ConditionOperator::Le => matches!(
                compare(actual, expected),
                Some(Ordering::Less | Ordering::Equal)
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionOperator {
    #[default]
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
}

/// Returns true when `field` should be hidden for the given entry data.
///
/// `scope_path` is the dotted path of the object enclosing the field
/// (`None` for top-level fields). Without data every field is visible.
pub fn is_hidden(field: &Field, data: Option<&Value>, scope_path: Option<&str>) -> bool {
    let (Some(conditions), Some(data)) = (&field.condition, data) else {
        return false;
    };
    let scope = match scope_path {
        Some(path) if !path.is_empty() => resolve_path(data, path).unwrap_or(&Value::Null),
        _ => data,
    };
    !conditions.as_slice().iter().any(|c| c.holds(scope))
}

/// Looks up a dotted path (`list.1.title`) inside a JSON value.
pub fn resolve_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(value, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => true,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
