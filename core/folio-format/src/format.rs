//! Byte encodings for entry files.
//!
//! Encoding is deterministic: `serde_json::Map` keeps keys sorted, so the
//! same value always produces the same bytes in every format.

use crate::error::{FormatError, FormatResult};
use folio_model::FileFormat;
use serde_json::{Map, Value};

const DELIMITER: &str = "---";
const BODY_FIELD: &str = "body";

/// Encodes field data in the given format.
pub fn encode(format: FileFormat, data: &Value) -> FormatResult<Vec<u8>> {
    match format {
        FileFormat::Json => {
            let mut bytes = serde_json::to_vec_pretty(data)?;
            bytes.push(b'\n');
            Ok(bytes)
        }
        FileFormat::Yaml => Ok(serde_yaml::to_string(data)?.into_bytes()),
        FileFormat::Frontmatter => encode_frontmatter(data),
    }
}

/// Decodes a file's bytes into field data. `path` is only used for error reporting.
pub fn decode(format: FileFormat, path: &str, bytes: &[u8]) -> FormatResult<Value> {
    let value = match format {
        FileFormat::Json => serde_json::from_slice(bytes)?,
        FileFormat::Yaml => {
            if bytes.iter().all(u8::is_ascii_whitespace) {
                Value::Object(Map::new())
            } else {
                serde_yaml::from_slice(bytes)?
            }
        }
        FileFormat::Frontmatter => {
            let text = std::str::from_utf8(bytes).map_err(|e| FormatError::Malformed {
                path: path.to_string(),
                reason: e.to_string(),
            })?;
            decode_frontmatter(path, text)?
        }
    };
    if !value.is_object() {
        return Err(FormatError::Malformed {
            path: path.to_string(),
            reason: "top-level value must be a mapping".into(),
        });
    }
    Ok(value)
}

fn encode_frontmatter(data: &Value) -> FormatResult<Vec<u8>> {
    let mut front = data.as_object().cloned().unwrap_or_default();
    // An empty or non-string body stays in the header; below the delimiter
    // it would read back as no body at all.
    let body = match front.remove(BODY_FIELD) {
        Some(Value::String(body)) if !body.is_empty() => body,
        Some(other) => {
            front.insert(BODY_FIELD.into(), other);
            String::new()
        }
        None => String::new(),
    };

    let yaml = serde_yaml::to_string(&Value::Object(front))?;
    let mut out = String::with_capacity(yaml.len() + body.len() + 8);
    out.push_str(DELIMITER);
    out.push('\n');
    out.push_str(&yaml);
    out.push_str(DELIMITER);
    out.push('\n');
    out.push_str(&body);
    Ok(out.into_bytes())
}

fn decode_frontmatter(path: &str, text: &str) -> FormatResult<Value> {
    let Some(rest) = text.strip_prefix("---\n") else {
        // Plain markdown without front matter.
        let mut map = Map::new();
        if !text.is_empty() {
            map.insert(BODY_FIELD.into(), Value::String(text.to_string()));
        }
        return Ok(Value::Object(map));
    };

    let (front, body) = if let Some(rest) = rest.strip_prefix("---\n") {
        ("", rest)
    } else if let Some(end) = rest.find("\n---\n") {
        (&rest[..=end], &rest[end + 5..])
    } else if let Some(front) = rest.strip_suffix("\n---") {
        (front, "")
    } else {
        return Err(FormatError::Malformed {
            path: path.to_string(),
            reason: "unterminated front matter".into(),
        });
    };

    let mut map = if front.trim().is_empty() {
        Map::new()
    } else {
        match serde_yaml::from_str::<Value>(front)? {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            _ => {
                return Err(FormatError::Malformed {
                    path: path.to_string(),
                    reason: "front matter must be a mapping".into(),
                });
            }
        }
    };
    if !body.is_empty() {
        map.insert(BODY_FIELD.into(), Value::String(body.to_string()));
    }
    Ok(Value::Object(map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn frontmatter_splits_body() {
        let data = json!({"title": "Hello", "body": "Hi there\n"});
        let bytes = encode(FileFormat::Frontmatter, &data).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert_eq!(text, "---\ntitle: Hello\n---\nHi there\n");
        assert_eq!(decode(FileFormat::Frontmatter, "a.md", &bytes).unwrap(), data);
    }

    #[test]
    fn empty_body_survives_frontmatter() {
        let data = json!({"title": "Hello", "body": ""});
        let bytes = encode(FileFormat::Frontmatter, &data).unwrap();
        assert_eq!(decode(FileFormat::Frontmatter, "a.md", &bytes).unwrap(), data);

        let untouched = json!({"title": "Hello"});
        let bytes = encode(FileFormat::Frontmatter, &untouched).unwrap();
        assert_eq!(String::from_utf8(bytes.clone()).unwrap(), "---\ntitle: Hello\n---\n");
        assert_eq!(decode(FileFormat::Frontmatter, "a.md", &bytes).unwrap(), untouched);
    }

    #[test]
    fn frontmatter_without_header_is_all_body() {
        let value = decode(FileFormat::Frontmatter, "a.md", b"# Title\n").unwrap();
        assert_eq!(value, json!({"body": "# Title\n"}));
    }

    #[test]
    fn empty_front_matter() {
        let value = decode(FileFormat::Frontmatter, "a.md", b"---\n---\ntext").unwrap();
        assert_eq!(value, json!({"body": "text"}));
    }

    #[test]
    fn unterminated_front_matter_is_malformed() {
        let err = decode(FileFormat::Frontmatter, "a.md", b"---\ntitle: x\n").unwrap_err();
        assert!(matches!(err, FormatError::Malformed { .. }));
    }

    #[test]
    fn json_must_be_object() {
        let err = decode(FileFormat::Json, "a.json", b"[1,2]").unwrap_err();
        assert!(matches!(err, FormatError::Malformed { .. }));
    }
}
