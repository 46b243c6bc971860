//! Slug templates.
//!
//! A template such as `{{year}}-{{month}}-{{day}}-{{slug}}` is rendered from
//! an entry's field data plus an explicit creation time, so the same inputs
//! always yield the same slug.
//!
//! Supported variables:
//! - `year`, `month`, `day`, `hour`, `minute`, `second` (zero padded), taken
//!   from the collection's date field when set, else from the creation time
//! - `slug`: the slugified identifier field
//! - `fields.<name>` or a bare `<name>`: any top-level field, slugified

use crate::error::{FormatError, FormatResult};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Utc};
use folio_model::Collection;
use serde_json::Value;

/// Renders the collection's slug template for `data`.
pub fn render_slug(collection: &Collection, data: &Value, now: DateTime<Utc>) -> FormatResult<String> {
    let template = collection.slug_template();
    let date = entry_date(collection, data).unwrap_or(now);

    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| FormatError::Slug(format!("unterminated variable in `{template}`")))?;
        let name = after[..end].trim();
        out.push_str(&render_variable(collection, data, date, name)?);
        rest = &after[end + 2..];
    }
    out.push_str(rest);

    let slug = out.trim_matches('-').to_string();
    if slug.is_empty() {
        return Err(FormatError::Slug(format!(
            "template `{template}` rendered an empty slug"
        )));
    }
    Ok(slug)
}

fn render_variable(
    collection: &Collection,
    data: &Value,
    date: DateTime<Utc>,
    name: &str,
) -> FormatResult<String> {
    let rendered = match name {
        "year" => format!("{:04}", date.year()),
        "month" => format!("{:02}", date.month()),
        "day" => format!("{:02}", date.day()),
        "hour" => format!("{:02}", date.hour()),
        "minute" => format!("{:02}", date.minute()),
        "second" => format!("{:02}", date.second()),
        "slug" => {
            let identifier = collection.identifier_field();
            let value = data
                .get(identifier)
                .and_then(value_text)
                .filter(|text| !text.trim().is_empty())
                .ok_or_else(|| {
                    FormatError::Slug(format!("identifier field `{identifier}` is empty"))
                })?;
            slugify(&value)
        }
        other => {
            let field = other.strip_prefix("fields.").unwrap_or(other);
            data.get(field)
                .and_then(value_text)
                .map(|text| slugify(&text))
                .unwrap_or_default()
        }
    };
    Ok(rendered)
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// The date an entry is filed under: a field named `date`, else the first
/// datetime field of the collection.
fn entry_date(collection: &Collection, data: &Value) -> Option<DateTime<Utc>> {
    let field = collection
        .fields
        .iter()
        .find(|f| f.name == "date")
        .or_else(|| collection.fields.iter().find(|f| f.is_datetime()))?;
    data.get(&field.name)?.as_str().and_then(parse_date)
}

/// Parses the date formats a datetime widget produces.
pub fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(text) {
        return Some(date.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(date) = NaiveDateTime::parse_from_str(text, format) {
            return Some(date.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
}

/// Lowercases and replaces every run of characters other than letters,
/// digits and `_` with a single `-`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() || c == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    slug
}
