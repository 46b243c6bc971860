use crate::condition::Conditions;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// One field of a collection's field tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default = "required_by_default")]
    pub required: bool,
    #[serde(default)]
    pub i18n: FieldI18n,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Conditions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(flatten)]
    pub kind: FieldKind,
}

fn required_by_default() -> bool {
    true
}

/// Widget-specific shape of a field, tagged by the `widget` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "widget", rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Text,
    Markdown,
    Code,
    Color,
    Hidden,
    Map,
    Image,
    File,
    Boolean,
    Number {
        #[serde(default)]
        value_type: NumberType,
    },
    Datetime {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        format: Option<String>,
    },
    Select {
        #[serde(default)]
        options: Vec<Value>,
        #[serde(default)]
        multiple: bool,
    },
    Relation {
        collection: String,
        #[serde(default)]
        multiple: bool,
    },
    List {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        fields: Vec<Field>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        field: Option<Box<Field>>,
    },
    Object {
        #[serde(default)]
        fields: Vec<Field>,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberType {
    Int,
    #[default]
    Float,
}

/// Per-field internationalization granularity.
///
/// Configured as `true`/`"translate"`, `false`/`"none"` or `"duplicate"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FieldI18n {
    /// Independent value per locale.
    #[default]
    Translate,
    /// Copied from the default locale when the entry is created, then independent.
    Duplicate,
    /// Every locale carries the default locale's value.
    None,
}

impl Serialize for FieldI18n {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Translate => serializer.serialize_bool(true),
            Self::None => serializer.serialize_bool(false),
            Self::Duplicate => serializer.serialize_str("duplicate"),
        }
    }
}

impl<'de> Deserialize<'de> for FieldI18n {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Flag(bool),
            Name(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Flag(true) => Ok(Self::Translate),
            Raw::Flag(false) => Ok(Self::None),
            Raw::Name(name) => match name.as_str() {
                "translate" => Ok(Self::Translate),
                "duplicate" => Ok(Self::Duplicate),
                "none" => Ok(Self::None),
                other => Err(serde::de::Error::custom(format!(
                    "unknown field i18n mode `{other}`"
                ))),
            },
        }
    }
}

impl Field {
    fn simple(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            label: None,
            required: true,
            i18n: FieldI18n::default(),
            condition: None,
            default: None,
            kind,
        }
    }

    /// Shorthand for a single-line string field.
    pub fn string(name: &str) -> Self {
        Self::simple(name, FieldKind::String)
    }

    /// Shorthand for a multi-line text field.
    pub fn text(name: &str) -> Self {
        Self::simple(name, FieldKind::Text)
    }

    /// Shorthand for a markdown field.
    pub fn markdown(name: &str) -> Self {
        Self::simple(name, FieldKind::Markdown)
    }

    /// Shorthand for a boolean field.
    pub fn boolean(name: &str) -> Self {
        Self::simple(name, FieldKind::Boolean)
    }

    /// Shorthand for a float number field.
    pub fn number(name: &str) -> Self {
        Self::simple(
            name,
            FieldKind::Number {
                value_type: NumberType::Float,
            },
        )
    }

    /// Shorthand for a datetime field.
    pub fn datetime(name: &str) -> Self {
        Self::simple(name, FieldKind::Datetime { format: None })
    }

    /// Shorthand for an image field.
    pub fn image(name: &str) -> Self {
        Self::simple(name, FieldKind::Image)
    }

    /// Shorthand for a list of objects.
    pub fn list(name: &str, fields: Vec<Field>) -> Self {
        Self::simple(name, FieldKind::List { fields, field: None })
    }

    /// Shorthand for a nested object.
    pub fn object(name: &str, fields: Vec<Field>) -> Self {
        Self::simple(name, FieldKind::Object { fields })
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_i18n(mut self, i18n: FieldI18n) -> Self {
        self.i18n = i18n;
        self
    }

    pub fn with_condition(mut self, condition: Conditions) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn is_datetime(&self) -> bool {
        matches!(self.kind, FieldKind::Datetime { .. })
    }

    /// Nested fields for `list` and `object` widgets.
    pub fn children(&self) -> &[Field] {
        match &self.kind {
            FieldKind::List { fields, .. } | FieldKind::Object { fields } => fields,
            _ => &[],
        }
    }
}
