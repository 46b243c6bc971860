//! Entry ⇄ files conversion.

use crate::error::{FormatError, FormatResult};
use crate::format::{decode, encode};
use crate::layout::{LocaleFile, entry_files, entry_path, parse_path};
use crate::slug::render_slug;
use chrono::{DateTime, Utc};
use folio_model::{
    BaseHash, Collection, CollectionStorage, Entry, FieldI18n, FileFormat, I18nConfig,
    I18nStructure, PersistedFile, validate_data,
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

/// Converts entries to the files a collection stores them in, and back.
///
/// Stateless; collections passed in must already have `i18n: true`
/// resolved against the site configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntrySerializer;

impl EntrySerializer {
    pub fn new() -> Self {
        Self
    }

    /// Fills in `slug` and `path` of a new entry.
    ///
    /// Folder collections render the slug template against the entry data
    /// and `now`; files collections require the slug to name one of the
    /// declared files. Entries that already have a path are left unchanged.
    pub fn assign_path(
        &self,
        collection: &Collection,
        entry: &mut Entry,
        now: DateTime<Utc>,
    ) -> FormatResult<()> {
        if !entry.path.is_empty() {
            return Ok(());
        }
        if matches!(collection.storage, CollectionStorage::Folder(_)) && entry.slug.is_empty() {
            entry.slug = render_slug(collection, &entry.data, now)?;
        }
        entry.path = entry_path(collection, &entry.slug)?;
        Ok(())
    }

    /// Every path the entry occupies, default locale first.
    pub fn entry_paths(&self, collection: &Collection, slug: &str) -> FormatResult<Vec<String>> {
        Ok(entry_files(collection, slug)?
            .into_iter()
            .map(|f| f.path)
            .collect())
    }

    /// Slug of the entry that owns `path`, if the path belongs to the collection.
    pub fn slug_for_path(&self, collection: &Collection, path: &str) -> Option<String> {
        parse_path(collection, path).map(|p| p.slug)
    }

    /// Whether `path` is the file that identifies an entry (its default
    /// locale file).
    pub fn is_entry_path(&self, collection: &Collection, path: &str) -> bool {
        let Some(parsed) = parse_path(collection, path) else {
            return false;
        };
        match (&parsed.locale, collection.i18n()) {
            (Some(locale), Some(config)) => locale == config.default_locale(),
            _ => true,
        }
    }

    /// Validates the entry and renders its files.
    ///
    /// Each file carries the hash recorded for its path in the entry's
    /// `base_hash` (none for files not seen before).
    pub fn serialize(
        &self,
        collection: &Collection,
        entry: &Entry,
    ) -> FormatResult<Vec<PersistedFile>> {
        collection.validate()?;
        if entry.path.is_empty() {
            return Err(FormatError::Slug("entry has no path assigned".into()));
        }
        let issues = validate_data(collection.fields_for(&entry.slug), &entry.data);
        if !issues.is_empty() {
            return Err(FormatError::Validation(issues));
        }

        let files = entry_files(collection, &entry.slug)?;
        let rendered = match collection.i18n() {
            None => {
                let file = single(&files)?;
                vec![(file.path.clone(), encode_for(collection, &file.path, &entry.data)?)]
            }
            Some(config) => {
                let locales = locale_values(collection, config, entry);
                match config.structure {
                    I18nStructure::SingleFile => {
                        let file = single(&files)?;
                        let all: Map<String, Value> = config
                            .locales
                            .iter()
                            .filter_map(|l| locales.get(l).map(|v| (l.clone(), v.clone())))
                            .collect();
                        vec![(
                            file.path.clone(),
                            encode_for(collection, &file.path, &Value::Object(all))?,
                        )]
                    }
                    I18nStructure::MultipleFiles | I18nStructure::MultipleFolders => files
                        .iter()
                        .map(|file| {
                            let locale = file.locale.as_deref().unwrap_or_default();
                            let data = locales
                                .get(locale)
                                .cloned()
                                .unwrap_or_else(|| Value::Object(Map::new()));
                            Ok((file.path.clone(), encode_for(collection, &file.path, &data)?))
                        })
                        .collect::<FormatResult<Vec<_>>>()?,
                }
            }
        };

        debug!(
            "Serialized entry {} of {} into {} file(s)",
            entry.path,
            collection.name,
            rendered.len()
        );
        Ok(rendered
            .into_iter()
            .map(|(path, content)| {
                let hash = entry.base_hash.get(&path).map(str::to_string);
                PersistedFile {
                    path,
                    content,
                    content_hash: hash,
                }
            })
            .collect())
    }

    /// Rebuilds an entry from its files.
    ///
    /// The default locale's file must be present; missing locale files of
    /// multi-file layouts are skipped. `base_hash` is taken from the files'
    /// content hashes.
    pub fn deserialize(&self, collection: &Collection, files: &[PersistedFile]) -> FormatResult<Entry> {
        let first = files.first().ok_or_else(|| FormatError::UnknownPath {
            collection: collection.name.clone(),
            path: String::new(),
        })?;
        let slug = parse_path(collection, &first.path)
            .ok_or_else(|| FormatError::UnknownPath {
                collection: collection.name.clone(),
                path: first.path.clone(),
            })?
            .slug;
        let layout = entry_files(collection, &slug)?;
        let entry_path = single(&layout)?.path.clone();

        let mut by_locale: BTreeMap<String, Value> = BTreeMap::new();
        let mut base_hash = BaseHash::new();
        let mut data = None;

        for file in files {
            let Some(expected) = layout.iter().find(|f| f.path == file.path) else {
                return Err(FormatError::UnknownPath {
                    collection: collection.name.clone(),
                    path: file.path.clone(),
                });
            };
            if let Some(hash) = &file.content_hash {
                base_hash.insert(file.path.clone(), hash.clone());
            }
            let value = decode(format_for(collection, &file.path), &file.path, &file.content)?;
            match (collection.i18n(), &expected.locale) {
                (None, _) => data = Some(value),
                (Some(config), None) => {
                    // single_file: one mapping of locale -> data
                    let Value::Object(mut all) = value else {
                        continue;
                    };
                    data = Some(
                        all.remove(config.default_locale())
                            .unwrap_or_else(|| Value::Object(Map::new())),
                    );
                    for (locale, value) in all {
                        if config.locales.contains(&locale) {
                            by_locale.insert(locale, value);
                        }
                    }
                }
                (Some(config), Some(locale)) => {
                    if locale == config.default_locale() {
                        data = Some(value);
                    } else {
                        by_locale.insert(locale.clone(), value);
                    }
                }
            }
        }

        let data = data.ok_or_else(|| FormatError::Malformed {
            path: entry_path.clone(),
            reason: "default locale file is missing".into(),
        })?;

        Ok(Entry {
            collection: collection.name.clone(),
            slug,
            path: entry_path,
            data,
            i18n: by_locale,
            base_hash,
            new_entry: false,
        })
    }
}

fn single(files: &[LocaleFile]) -> FormatResult<&LocaleFile> {
    files
        .first()
        .ok_or_else(|| FormatError::Slug("layout produced no files".into()))
}

/// Per-locale field data after applying each field's i18n mode.
fn locale_values(
    collection: &Collection,
    config: &I18nConfig,
    entry: &Entry,
) -> BTreeMap<String, Value> {
    let default_locale = config.default_locale();
    let fields = collection.fields_for(&entry.slug);
    let mut values = BTreeMap::new();
    values.insert(default_locale.to_string(), entry.data.clone());

    for locale in config.other_locales() {
        let mut data = match entry.i18n.get(locale) {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };
        for field in fields {
            let default_value = entry.data.get(&field.name);
            match field.i18n {
                FieldI18n::Translate => {}
                FieldI18n::None => match default_value {
                    Some(value) => {
                        data.insert(field.name.clone(), value.clone());
                    }
                    None => {
                        data.remove(&field.name);
                    }
                },
                FieldI18n::Duplicate => {
                    if let (true, Some(value)) = (entry.new_entry, default_value) {
                        data.insert(field.name.clone(), value.clone());
                    }
                }
            }
        }
        values.insert(locale.to_string(), Value::Object(data));
    }
    values
}

/// Format of a specific file: the collection's explicit format, else the
/// path's extension, else the collection default.
fn format_for(collection: &Collection, path: &str) -> FileFormat {
    collection
        .format
        .or_else(|| {
            path.rsplit_once('.')
                .and_then(|(_, ext)| FileFormat::from_extension(ext))
        })
        .unwrap_or_else(|| collection.file_format())
}

fn encode_for(collection: &Collection, path: &str, data: &Value) -> FormatResult<Vec<u8>> {
    encode(format_for(collection, path), data)
}
