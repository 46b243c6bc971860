use crate::field::Field;
use crate::{ModelError, ModelResult};
use serde::{Deserialize, Serialize};

/// Describes a content type: where its entries live and how they are shaped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(flatten)]
    pub storage: CollectionStorage,
    /// Slug template, e.g. `{{year}}-{{month}}-{{day}}-{{slug}}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<FileFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier_field: Option<String>,
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub i18n: Option<I18nSetting>,
    #[serde(default)]
    pub create: bool,
}

/// Storage shape of a collection.
///
/// Serialized flat into the collection, matching the site configuration:
/// `{"folder": "_posts"}` or `{"files": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionStorage {
    /// Many entries inside one folder.
    Folder(String),
    /// A fixed set of named files.
    Files(Vec<CollectionFile>),
}

/// One named file of a `files` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionFile {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub file: String,
    #[serde(default)]
    pub fields: Vec<Field>,
}

/// On-disk encoding of an entry file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    /// Markdown with YAML front matter; the `body` field is the document body.
    #[serde(alias = "yaml-frontmatter", alias = "md")]
    Frontmatter,
    Json,
    #[serde(alias = "yml")]
    Yaml,
}

impl FileFormat {
    pub fn default_extension(self) -> &'static str {
        match self {
            Self::Frontmatter => "md",
            Self::Json => "json",
            Self::Yaml => "yml",
        }
    }

    /// Infers a format from a file extension.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension {
            "md" | "markdown" | "mdx" => Some(Self::Frontmatter),
            "json" => Some(Self::Json),
            "yml" | "yaml" => Some(Self::Yaml),
            _ => None,
        }
    }
}

/// File layout of an internationalized collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum I18nStructure {
    /// One file holding a locale → data mapping.
    SingleFile,
    /// One file per locale in the same folder, suffixed with the locale code.
    MultipleFiles,
    /// One file per locale inside a locale-named folder.
    MultipleFolders,
}

/// Locales and layout for an internationalized collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct I18nConfig {
    pub structure: I18nStructure,
    pub locales: Vec<String>,
    #[serde(
        default,
        alias = "defaultLocale",
        skip_serializing_if = "Option::is_none"
    )]
    pub default_locale: Option<String>,
}

impl I18nConfig {
    pub fn new(structure: I18nStructure, locales: &[&str], default_locale: &str) -> Self {
        Self {
            structure,
            locales: locales.iter().map(|l| l.to_string()).collect(),
            default_locale: Some(default_locale.to_string()),
        }
    }

    /// The default locale; the first declared locale when not set.
    pub fn default_locale(&self) -> &str {
        self.default_locale
            .as_deref()
            .or_else(|| self.locales.first().map(String::as_str))
            .unwrap_or_default()
    }

    /// Non-default locales in declaration order.
    pub fn other_locales(&self) -> impl Iterator<Item = &str> {
        let default = self.default_locale();
        self.locales
            .iter()
            .map(String::as_str)
            .filter(move |l| *l != default)
    }

    pub fn validate(&self) -> ModelResult<()> {
        if self.locales.is_empty() {
            return Err(ModelError::InvalidI18n("locales must not be empty".into()));
        }
        for locale in &self.locales {
            if locale.is_empty() || locale.contains(['/', '.']) {
                return Err(ModelError::InvalidI18n(format!(
                    "invalid locale code `{locale}`"
                )));
            }
        }
        let default = self.default_locale();
        if !self.locales.iter().any(|l| l == default) {
            return Err(ModelError::InvalidI18n(format!(
                "default locale `{default}` is not one of the declared locales"
            )));
        }
        Ok(())
    }
}

/// Collection-level i18n declaration: a boolean (inherit the site-wide
/// config, or disable) or an explicit configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum I18nSetting {
    Enabled(bool),
    Config(I18nConfig),
}

impl Collection {
    /// Shorthand for a folder collection with frontmatter files.
    pub fn folder(name: &str, folder: &str, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            label: None,
            storage: CollectionStorage::Folder(folder.into()),
            slug: None,
            format: None,
            extension: None,
            identifier_field: None,
            fields,
            i18n: None,
            create: true,
        }
    }

    /// Shorthand for a files collection.
    pub fn files(name: &str, files: Vec<CollectionFile>) -> Self {
        Self {
            name: name.into(),
            label: None,
            storage: CollectionStorage::Files(files),
            slug: None,
            format: None,
            extension: None,
            identifier_field: None,
            fields: Vec::new(),
            i18n: None,
            create: false,
        }
    }

    pub fn with_slug(mut self, template: &str) -> Self {
        self.slug = Some(template.into());
        self
    }

    pub fn with_i18n(mut self, config: I18nConfig) -> Self {
        self.i18n = Some(I18nSetting::Config(config));
        self
    }

    pub fn with_format(mut self, format: FileFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Resolves `i18n: true` against the site-wide configuration.
    pub fn inherit_i18n(&mut self, site: &I18nConfig) {
        if self.i18n == Some(I18nSetting::Enabled(true)) {
            self.i18n = Some(I18nSetting::Config(site.clone()));
        }
    }

    /// The effective i18n configuration; `None` means not internationalized.
    pub fn i18n(&self) -> Option<&I18nConfig> {
        match &self.i18n {
            Some(I18nSetting::Config(config)) => Some(config),
            _ => None,
        }
    }

    pub fn folder_path(&self) -> Option<&str> {
        match &self.storage {
            CollectionStorage::Folder(folder) => Some(folder.trim_end_matches('/')),
            CollectionStorage::Files(_) => None,
        }
    }

    pub fn collection_files(&self) -> &[CollectionFile] {
        match &self.storage {
            CollectionStorage::Folder(_) => &[],
            CollectionStorage::Files(files) => files,
        }
    }

    pub fn file_format(&self) -> FileFormat {
        self.format
            .or_else(|| self.extension.as_deref().and_then(FileFormat::from_extension))
            .unwrap_or(FileFormat::Frontmatter)
    }

    pub fn file_extension(&self) -> &str {
        self.extension
            .as_deref()
            .unwrap_or_else(|| self.file_format().default_extension())
    }

    pub fn slug_template(&self) -> &str {
        self.slug.as_deref().unwrap_or("{{slug}}")
    }

    pub fn identifier_field(&self) -> &str {
        self.identifier_field.as_deref().unwrap_or("title")
    }

    /// Field tree for an entry; `files` collections declare fields per file.
    pub fn fields_for(&self, slug: &str) -> &[Field] {
        match &self.storage {
            CollectionStorage::Folder(_) => &self.fields,
            CollectionStorage::Files(files) => files
                .iter()
                .find(|f| f.name == slug)
                .map(|f| f.fields.as_slice())
                .unwrap_or(&self.fields),
        }
    }

    pub fn validate(&self) -> ModelResult<()> {
        let invalid = |reason: &str| ModelError::InvalidCollection {
            collection: self.name.clone(),
            reason: reason.to_string(),
        };
        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty"));
        }
        match &self.storage {
            CollectionStorage::Folder(folder) if folder.trim().is_empty() => {
                return Err(invalid("folder must not be empty"));
            }
            CollectionStorage::Files(files) if files.is_empty() => {
                return Err(invalid("files must not be empty"));
            }
            _ => {}
        }
        if let Some(config) = self.i18n() {
            config.validate()?;
        }
        Ok(())
    }
}
