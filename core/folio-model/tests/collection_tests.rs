use folio_model::{
    Collection, CollectionFile, CollectionStorage, Field, FieldI18n, FieldKind, FileFormat,
    I18nConfig, I18nSetting, I18nStructure, ModelError,
};
use pretty_assertions::assert_eq;
use serde_json::json;

fn posts_json() -> serde_json::Value {
    json!({
        "name": "posts",
        "label": "Posts",
        "folder": "_posts",
        "slug": "{{year}}-{{month}}-{{day}}-{{slug}}",
        "create": true,
        "fields": [
            { "label": "Title", "name": "title", "widget": "string" },
            { "label": "Draft", "name": "draft", "widget": "boolean", "default": false },
            {
                "label": "Publish Date",
                "name": "date",
                "widget": "datetime",
                "format": "yyyy-MM-dd"
            },
            { "label": "Cover Image", "name": "image", "widget": "image", "required": false },
            { "label": "Body", "name": "body", "widget": "markdown", "hint": "Main content goes here." }
        ]
    })
}

// ── Deserialization from site configuration ──────────────────────

#[test]
fn folder_collection_deserializes() {
    let collection: Collection = serde_json::from_value(posts_json()).unwrap();
    assert_eq!(collection.name, "posts");
    assert_eq!(collection.folder_path(), Some("_posts"));
    assert_eq!(collection.slug_template(), "{{year}}-{{month}}-{{day}}-{{slug}}");
    assert_eq!(collection.fields.len(), 5);
    assert_eq!(collection.fields[0].kind, FieldKind::String);
    assert!(collection.fields[0].required);
    assert!(!collection.fields[3].required);
    assert_eq!(collection.fields[1].default, Some(json!(false)));
    assert!(collection.fields[2].is_datetime());
    assert!(collection.i18n().is_none());
}

#[test]
fn files_collection_deserializes() {
    let collection: Collection = serde_json::from_value(json!({
        "name": "settings",
        "files": [
            {
                "name": "general",
                "file": "_data/settings.json",
                "fields": [{ "name": "site_title", "widget": "string" }]
            }
        ]
    }))
    .unwrap();

    assert_eq!(collection.folder_path(), None);
    assert_eq!(collection.collection_files().len(), 1);
    assert_eq!(collection.fields_for("general")[0].name, "site_title");
    assert!(collection.fields_for("unknown").is_empty());
}

#[test]
fn nested_list_fields_deserialize() {
    let field: Field = serde_json::from_value(json!({
        "name": "authors",
        "widget": "list",
        "fields": [
            { "name": "name", "widget": "string" },
            { "name": "links", "widget": "list", "field": { "name": "url", "widget": "string" } }
        ]
    }))
    .unwrap();

    let FieldKind::List { fields, field: single } = &field.kind else {
        panic!("expected list");
    };
    assert!(single.is_none());
    assert_eq!(fields.len(), 2);
    assert!(matches!(
        &fields[1].kind,
        FieldKind::List { field: Some(inner), .. } if inner.name == "url"
    ));
}

#[test]
fn field_i18n_accepts_bool_and_names() {
    let parse = |v: serde_json::Value| -> FieldI18n {
        let field: Field =
            serde_json::from_value(json!({"name": "f", "widget": "string", "i18n": v})).unwrap();
        field.i18n
    };
    assert_eq!(parse(json!(true)), FieldI18n::Translate);
    assert_eq!(parse(json!(false)), FieldI18n::None);
    assert_eq!(parse(json!("duplicate")), FieldI18n::Duplicate);
    assert_eq!(parse(json!("translate")), FieldI18n::Translate);

    let missing: Field = serde_json::from_value(json!({"name": "f", "widget": "string"})).unwrap();
    assert_eq!(missing.i18n, FieldI18n::Translate);

    let bad = serde_json::from_value::<Field>(json!({"name": "f", "widget": "string", "i18n": "x"}));
    assert!(bad.is_err());
}

#[test]
fn field_serialization_keeps_widget_tag() {
    let field = Field::datetime("date").with_i18n(FieldI18n::Duplicate);
    let json = serde_json::to_value(&field).unwrap();
    assert_eq!(json["widget"], "datetime");
    assert_eq!(json["i18n"], "duplicate");

    let back: Field = serde_json::from_value(json).unwrap();
    assert_eq!(back, field);
}

// ── i18n settings ────────────────────────────────────────────────

#[test]
fn i18n_config_accepts_camel_case_default_locale() {
    let collection: Collection = serde_json::from_value(json!({
        "name": "pages",
        "folder": "_pages",
        "i18n": { "structure": "multiple_folders", "locales": ["en", "de", "fr"], "defaultLocale": "de" }
    }))
    .unwrap();

    let config = collection.i18n().unwrap();
    assert_eq!(config.structure, I18nStructure::MultipleFolders);
    assert_eq!(config.default_locale(), "de");
    assert_eq!(config.other_locales().collect::<Vec<_>>(), vec!["en", "fr"]);
}

#[test]
fn i18n_default_locale_falls_back_to_first() {
    let config = I18nConfig {
        structure: I18nStructure::SingleFile,
        locales: vec!["fr".into(), "en".into()],
        default_locale: None,
    };
    assert_eq!(config.default_locale(), "fr");
}

#[test]
fn i18n_true_inherits_site_config() {
    let mut collection: Collection = serde_json::from_value(json!({
        "name": "playground",
        "folder": "_i18n_playground",
        "i18n": true
    }))
    .unwrap();
    assert_eq!(collection.i18n, Some(I18nSetting::Enabled(true)));
    assert!(collection.i18n().is_none());

    let site = I18nConfig::new(I18nStructure::MultipleFiles, &["en", "de", "fr"], "en");
    collection.inherit_i18n(&site);
    assert_eq!(collection.i18n(), Some(&site));
}

#[test]
fn i18n_false_is_not_replaced() {
    let mut collection = Collection::folder("c", "c", vec![]);
    collection.i18n = Some(I18nSetting::Enabled(false));
    collection.inherit_i18n(&I18nConfig::new(I18nStructure::SingleFile, &["en"], "en"));
    assert!(collection.i18n().is_none());
}

// ── Validation ───────────────────────────────────────────────────

#[test]
fn validate_rejects_unknown_default_locale() {
    let collection = Collection::folder("posts", "_posts", vec![]).with_i18n(I18nConfig::new(
        I18nStructure::MultipleFiles,
        &["en", "de"],
        "fr",
    ));
    assert!(matches!(collection.validate(), Err(ModelError::InvalidI18n(_))));
}

#[test]
fn validate_rejects_empty_folder() {
    let collection = Collection::folder("posts", "  ", vec![]);
    assert!(matches!(
        collection.validate(),
        Err(ModelError::InvalidCollection { .. })
    ));
}

#[test]
fn validate_rejects_locale_with_separator() {
    let config = I18nConfig::new(I18nStructure::MultipleFolders, &["en", "pt/br"], "en");
    assert!(config.validate().is_err());
}

#[test]
fn validate_accepts_files_collection() {
    let collection = Collection::files(
        "settings",
        vec![CollectionFile {
            name: "general".into(),
            label: None,
            file: "_data/general.yml".into(),
            fields: vec![],
        }],
    );
    assert!(collection.validate().is_ok());
    assert!(matches!(collection.storage, CollectionStorage::Files(_)));
}

// ── Formats ──────────────────────────────────────────────────────

#[test]
fn format_defaults_and_inference() {
    let mut collection = Collection::folder("c", "c", vec![]);
    assert_eq!(collection.file_format(), FileFormat::Frontmatter);
    assert_eq!(collection.file_extension(), "md");

    collection.extension = Some("json".into());
    assert_eq!(collection.file_format(), FileFormat::Json);

    collection.extension = None;
    collection.format = Some(FileFormat::Yaml);
    assert_eq!(collection.file_extension(), "yml");
}
