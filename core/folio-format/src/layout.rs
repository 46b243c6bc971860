//! Mapping between an entry's slug and the repository paths of its files.
//!
//! | structure          | folder collection                  | files collection          |
//! |--------------------|------------------------------------|---------------------------|
//! | none / single_file | `{folder}/{slug}.{ext}`            | `{dir}/{name}.{ext}`      |
//! | multiple_files     | `{folder}/{slug}.{locale}.{ext}`   | `{dir}/{name}.{locale}.{ext}` |
//! | multiple_folders   | `{folder}/{locale}/{slug}.{ext}`   | `{dir}/{locale}/{name}.{ext}` |

use crate::error::{FormatError, FormatResult};
use folio_model::{Collection, CollectionStorage, I18nStructure};

/// One file of an entry. `locale` is `None` when the file holds every
/// locale (or the collection is not internationalized).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaleFile {
    pub path: String,
    pub locale: Option<String>,
}

/// Where a path sits in a collection's layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPath {
    pub slug: String,
    pub locale: Option<String>,
}

/// Every file of the entry identified by `slug`, default locale first.
pub fn entry_files(collection: &Collection, slug: &str) -> FormatResult<Vec<LocaleFile>> {
    let (dir, stem, ext) = base_parts(collection, slug)?;
    let config = match collection.i18n() {
        Some(config) if config.structure != I18nStructure::SingleFile => config,
        _ => {
            return Ok(vec![LocaleFile {
                path: join(&dir, &format!("{stem}{ext}")),
                locale: None,
            }]);
        }
    };

    let default = config.default_locale();
    let locales = std::iter::once(default).chain(config.other_locales());
    Ok(locales
        .map(|locale| {
            let path = match config.structure {
                I18nStructure::MultipleFolders => {
                    join(&join(&dir, locale), &format!("{stem}{ext}"))
                }
                _ => join(&dir, &format!("{stem}.{locale}{ext}")),
            };
            LocaleFile {
                path,
                locale: Some(locale.to_string()),
            }
        })
        .collect())
}

/// Path of the default locale's file, which identifies the entry.
pub fn entry_path(collection: &Collection, slug: &str) -> FormatResult<String> {
    entry_files(collection, slug)?
        .into_iter()
        .next()
        .map(|f| f.path)
        .ok_or_else(|| FormatError::Slug(format!("no files for slug `{slug}`")))
}

/// Recovers slug and locale from a path produced by [`entry_files`].
///
/// Returns `None` for paths that do not belong to the collection.
pub fn parse_path(collection: &Collection, path: &str) -> Option<ParsedPath> {
    match &collection.storage {
        CollectionStorage::Folder(_) => {
            let folder = collection.folder_path()?;
            let relative = if folder.is_empty() {
                path
            } else {
                path.strip_prefix(folder)?.strip_prefix('/')?
            };
            let ext = format!(".{}", collection.file_extension());
            parse_relative(collection, relative, &ext)
        }
        CollectionStorage::Files(files) => files.iter().find_map(|file| {
            entry_files(collection, &file.name)
                .ok()?
                .into_iter()
                .find(|f| f.path == path)
                .map(|f| ParsedPath {
                    slug: file.name.clone(),
                    locale: f.locale,
                })
        }),
    }
}

fn parse_relative(collection: &Collection, relative: &str, ext: &str) -> Option<ParsedPath> {
    let config = collection
        .i18n()
        .filter(|c| c.structure != I18nStructure::SingleFile);
    let Some(config) = config else {
        let slug = relative.strip_suffix(ext)?;
        return valid_slug(slug).then(|| ParsedPath {
            slug: slug.to_string(),
            locale: None,
        });
    };

    let (slug, locale) = match config.structure {
        I18nStructure::MultipleFolders => {
            let (locale, file) = relative.split_once('/')?;
            (file.strip_suffix(ext)?, locale)
        }
        _ => relative.strip_suffix(ext)?.rsplit_once('.')?,
    };
    if !valid_slug(slug) || !config.locales.iter().any(|l| l == locale) {
        return None;
    }
    Some(ParsedPath {
        slug: slug.to_string(),
        locale: Some(locale.to_string()),
    })
}

fn valid_slug(slug: &str) -> bool {
    !slug.is_empty() && !slug.contains('/')
}

/// Splits a collection + slug into (directory, file stem, `.ext`).
fn base_parts(collection: &Collection, slug: &str) -> FormatResult<(String, String, String)> {
    match &collection.storage {
        CollectionStorage::Folder(_) => {
            if !valid_slug(slug) {
                return Err(FormatError::Slug(format!("invalid slug `{slug}`")));
            }
            let dir = collection.folder_path().unwrap_or_default().to_string();
            Ok((dir, slug.to_string(), format!(".{}", collection.file_extension())))
        }
        CollectionStorage::Files(files) => {
            let file = files.iter().find(|f| f.name == slug).ok_or_else(|| {
                FormatError::UnknownPath {
                    collection: collection.name.clone(),
                    path: slug.to_string(),
                }
            })?;
            let (dir, name) = file.file.rsplit_once('/').unwrap_or(("", &file.file));
            let (stem, ext) = match name.rsplit_once('.') {
                Some((stem, ext)) if !stem.is_empty() => (stem, format!(".{ext}")),
                _ => (name, String::new()),
            };
            Ok((dir.to_string(), stem.to_string(), ext))
        }
    }
}

fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}
