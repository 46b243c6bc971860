use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Per-file version markers observed when an entry was last read or written.
///
/// Keys are repository paths, values are the host's content hash for that
/// path. A path missing from the map is expected to be absent remotely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BaseHash(BTreeMap<String, String>);

impl BaseHash {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.0.get(path).map(String::as_str)
    }

    pub fn insert(&mut self, path: impl Into<String>, hash: impl Into<String>) {
        self.0.insert(path.into(), hash.into());
    }

    pub fn remove(&mut self, path: &str) -> Option<String> {
        self.0.remove(path)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(p, h)| (p.as_str(), h.as_str()))
    }
}

impl FromIterator<(String, String)> for BaseHash {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A unit of structured content stored as one or more files.
///
/// `data` holds the default locale's field values. When the collection is
/// internationalized, `i18n` holds the field values of every other locale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub collection: String,
    pub slug: String,
    /// Path of the default locale's file; identifies the entry.
    pub path: String,
    #[serde(default = "empty_object")]
    pub data: Value,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub i18n: BTreeMap<String, Value>,
    #[serde(default)]
    pub base_hash: BaseHash,
    #[serde(default)]
    pub new_entry: bool,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl Entry {
    /// Starts a new, not yet persisted entry. Slug and path are assigned by
    /// the serializer from the collection's slug template.
    pub fn new(collection: impl Into<String>, data: Value) -> Self {
        Self {
            collection: collection.into(),
            slug: String::new(),
            path: String::new(),
            data,
            i18n: BTreeMap::new(),
            base_hash: BaseHash::new(),
            new_entry: true,
        }
    }

    /// Sets the field data of a non-default locale.
    pub fn with_locale(mut self, locale: impl Into<String>, data: Value) -> Self {
        self.i18n.insert(locale.into(), data);
        self
    }

    /// Returns the field data for `locale`, falling back to `data` for the
    /// default locale.
    pub fn locale_data(&self, locale: &str, default_locale: &str) -> Option<&Value> {
        if locale == default_locale {
            Some(&self.data)
        } else {
            self.i18n.get(locale)
        }
    }

    /// Extract a string value from `data` using a JSON pointer (e.g., "/title").
    pub fn get_str(&self, pointer: &str) -> Option<&str> {
        self.data.pointer(pointer).and_then(|v| v.as_str())
    }

    /// Extract a boolean value from `data` using a JSON pointer.
    pub fn get_bool(&self, pointer: &str) -> Option<bool> {
        self.data.pointer(pointer).and_then(|v| v.as_bool())
    }

    /// Extract a numeric value from `data` using a JSON pointer.
    pub fn get_number(&self, pointer: &str) -> Option<f64> {
        self.data.pointer(pointer).and_then(|v| v.as_f64())
    }
}
