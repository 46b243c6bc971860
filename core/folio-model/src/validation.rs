//! Shape validation of entry data against a field tree.
//!
//! Walks the field tree and the data together, carrying the dotted path of
//! the current object so visibility conditions resolve against the right
//! siblings. Hidden fields are not validated.

use crate::condition::is_hidden;
use crate::field::{Field, FieldKind, NumberType};
use serde_json::Value;
use std::fmt;

/// A single validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    /// Dotted path of the offending value, e.g. `authors.1.name`.
    pub path: String,
    pub message: String,
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Validates `data` (an object) against `fields`, returning every issue found.
pub fn validate_data(fields: &[Field], data: &Value) -> Vec<FieldIssue> {
    let mut issues = Vec::new();
    match data {
        Value::Object(_) => walk_object(fields, data, None, data, &mut issues),
        _ => issues.push(FieldIssue {
            path: String::new(),
            message: "entry data must be an object".into(),
        }),
    }
    issues
}

fn join(scope: Option<&str>, name: &str) -> String {
    match scope {
        Some(scope) if !scope.is_empty() => format!("{scope}.{name}"),
        _ => name.to_string(),
    }
}

fn walk_object(
    fields: &[Field],
    root: &Value,
    scope: Option<&str>,
    object: &Value,
    issues: &mut Vec<FieldIssue>,
) {
    for field in fields {
        if is_hidden(field, Some(root), scope) {
            continue;
        }
        let path = join(scope, &field.name);
        check_value(field, root, &path, object.get(&field.name), issues);
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn check_value(
    field: &Field,
    root: &Value,
    path: &str,
    value: Option<&Value>,
    issues: &mut Vec<FieldIssue>,
) {
    let mut issue = |message: String| {
        issues.push(FieldIssue {
            path: path.to_string(),
            message,
        })
    };

    let value = match value {
        Some(v) if !is_blank(v) => v,
        _ => {
            let implied = matches!(field.kind, FieldKind::Boolean) || field.default.is_some();
            if field.required && !implied {
                issue("is required".into());
            }
            return;
        }
    };

    match &field.kind {
        FieldKind::String
        | FieldKind::Text
        | FieldKind::Markdown
        | FieldKind::Code
        | FieldKind::Color
        | FieldKind::Image
        | FieldKind::File
        | FieldKind::Datetime { .. } => {
            if !value.is_string() {
                issue("expected a string".into());
            }
        }
        FieldKind::Hidden | FieldKind::Map => {}
        FieldKind::Boolean => {
            if !value.is_boolean() {
                issue("expected a boolean".into());
            }
        }
        FieldKind::Number { value_type } => match value_type {
            NumberType::Int if !(value.is_i64() || value.is_u64()) => {
                issue("expected an integer".into())
            }
            NumberType::Float if !value.is_number() => issue("expected a number".into()),
            _ => {}
        },
        FieldKind::Select { options, multiple } => {
            let allowed = |v: &Value| {
                options.is_empty()
                    || options
                        .iter()
                        .any(|o| o == v || o.get("value").is_some_and(|inner| inner == v))
            };
            match (multiple, value) {
                (true, Value::Array(items)) => {
                    for item in items.iter().filter(|item| !allowed(item)) {
                        issue(format!("{item} is not an allowed option"));
                    }
                }
                (true, _) => issue("expected a list of options".into()),
                (false, v) if !allowed(v) => issue(format!("{v} is not an allowed option")),
                _ => {}
            }
        }
        FieldKind::Relation { multiple, .. } => {
            let ok = if *multiple {
                value.as_array().is_some_and(|items| items.iter().all(Value::is_string))
            } else {
                value.is_string()
            };
            if !ok {
                issue("expected a relation reference".into());
            }
        }
        FieldKind::List {
            fields,
            field: single,
        } => {
            let Some(items) = value.as_array() else {
                issue("expected a list".into());
                return;
            };
            for (index, item) in items.iter().enumerate() {
                let item_path = format!("{path}.{index}");
                if let Some(single) = single {
                    check_value(single, root, &item_path, Some(item), issues);
                } else if !fields.is_empty() {
                    if item.is_object() {
                        walk_object(fields, root, Some(&item_path), item, issues);
                    } else {
                        issues.push(FieldIssue {
                            path: item_path,
                            message: "expected an object".into(),
                        });
                    }
                }
            }
        }
        FieldKind::Object { fields } => {
            if value.is_object() {
                walk_object(fields, root, Some(path), value, issues);
            } else {
                issue("expected an object".into());
            }
        }
    }
}
