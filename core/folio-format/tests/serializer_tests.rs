use chrono::{TimeZone, Utc};
use folio_format::{EntrySerializer, FormatError, format};
use folio_model::{
    BaseHash, Collection, CollectionFile, Entry, Field, FieldI18n, FileFormat, I18nConfig,
    I18nStructure, PersistedFile,
};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 7, 8, 9, 10).unwrap()
}

fn posts() -> Collection {
    Collection::folder(
        "posts",
        "_posts",
        vec![
            Field::string("title"),
            Field::boolean("draft"),
            Field::datetime("date"),
            Field::image("image").optional(),
            Field::markdown("body"),
        ],
    )
    .with_slug("{{year}}-{{month}}-{{day}}-{{slug}}")
}

fn pages(structure: I18nStructure) -> Collection {
    Collection::folder(
        "pages",
        "_pages",
        vec![
            Field::string("title"),
            Field::string("layout").with_i18n(FieldI18n::None),
            Field::string("author").with_i18n(FieldI18n::Duplicate).optional(),
            Field::markdown("body").optional(),
        ],
    )
    .with_i18n(I18nConfig::new(structure, &["en", "de", "fr"], "en"))
}

fn new_page() -> Entry {
    Entry::new(
        "pages",
        json!({"title": "About", "layout": "page", "author": "Ada", "body": "Hello\n"}),
    )
    .with_locale("de", json!({"title": "Über", "layout": "ignored"}))
    .with_locale("fr", json!({"title": "À propos"}))
}

fn assigned(collection: &Collection, mut entry: Entry) -> Entry {
    EntrySerializer::new()
        .assign_path(collection, &mut entry, now())
        .unwrap();
    entry
}

fn paths(files: &[PersistedFile]) -> Vec<&str> {
    files.iter().map(|f| f.path.as_str()).collect()
}

fn text(file: &PersistedFile) -> &str {
    std::str::from_utf8(&file.content).unwrap()
}

// ── Posts scenario ───────────────────────────────────────────────

#[test]
fn dated_post_lands_at_template_path() {
    let collection = posts();
    let entry = assigned(
        &collection,
        Entry::new(
            "posts",
            json!({"title": "Hello", "date": "2024-01-01", "body": "Welcome aboard.\n"}),
        ),
    );
    assert_eq!(entry.slug, "2024-01-01-hello");
    assert_eq!(entry.path, "_posts/2024-01-01-hello.md");

    let files = EntrySerializer::new().serialize(&collection, &entry).unwrap();
    assert_eq!(paths(&files), vec!["_posts/2024-01-01-hello.md"]);
    assert_eq!(files[0].content_hash, None);

    let content = text(&files[0]);
    assert!(content.starts_with("---\n"));
    assert!(content.contains("title: Hello\n"));
    assert!(content.contains("2024-01-01"));
    assert!(content.ends_with("---\nWelcome aboard.\n"));

    let decoded = format::decode(FileFormat::Frontmatter, &files[0].path, &files[0].content).unwrap();
    assert_eq!(decoded, entry.data);
}

#[test]
fn creation_time_fills_date_when_field_is_absent() {
    let collection = Collection::folder("notes", "notes", vec![Field::string("title")])
        .with_slug("{{year}}{{month}}{{day}}-{{hour}}{{minute}}{{second}}-{{slug}}");
    let entry = assigned(&collection, Entry::new("notes", json!({"title": "Quick Note!"})));
    assert_eq!(entry.path, "notes/20250607-080910-quick-note.md");
}

#[test]
fn field_variables_are_slugified() {
    let collection = Collection::folder(
        "docs",
        "docs",
        vec![Field::string("title"), Field::string("category")],
    )
    .with_slug("{{fields.category}}-{{slug}}-{{category}}");
    let entry = assigned(
        &collection,
        Entry::new("docs", json!({"title": "Setup", "category": "Getting Started"})),
    );
    assert_eq!(entry.slug, "getting-started-setup-getting-started");
}

#[test]
fn missing_identifier_is_a_slug_error() {
    let mut entry = Entry::new("posts", json!({"date": "2024-01-01"}));
    let err = EntrySerializer::new()
        .assign_path(&posts(), &mut entry, now())
        .unwrap_err();
    assert!(matches!(err, FormatError::Slug(_)));
}

#[test]
fn existing_path_is_kept() {
    let mut entry = Entry::new("posts", json!({"title": "Renamed", "date": "2030-01-01"}));
    entry.slug = "2024-01-01-hello".into();
    entry.path = "_posts/2024-01-01-hello.md".into();
    EntrySerializer::new()
        .assign_path(&posts(), &mut entry, now())
        .unwrap();
    assert_eq!(entry.path, "_posts/2024-01-01-hello.md");
}

#[test]
fn invalid_data_is_rejected_before_encoding() {
    let collection = posts();
    let entry = assigned(
        &collection,
        Entry::new("posts", json!({"title": "Hello", "date": "2024-01-01", "draft": "no"})),
    );
    let err = EntrySerializer::new().serialize(&collection, &entry).unwrap_err();
    let FormatError::Validation(issues) = err else {
        panic!("expected validation error, got {err:?}");
    };
    let issue_paths: Vec<_> = issues.iter().map(|i| i.path.as_str()).collect();
    assert_eq!(issue_paths, vec!["draft", "body"]);
}

#[test]
fn base_hash_is_attached_to_known_paths() {
    let collection = posts();
    let mut entry = assigned(
        &collection,
        Entry::new("posts", json!({"title": "Hello", "date": "2024-01-01", "body": "x"})),
    );
    entry.base_hash.insert("_posts/2024-01-01-hello.md", "h0");
    let files = EntrySerializer::new().serialize(&collection, &entry).unwrap();
    assert_eq!(files[0].content_hash.as_deref(), Some("h0"));
}

// ── i18n layouts ─────────────────────────────────────────────────

#[test]
fn single_file_holds_every_locale() {
    let collection = pages(I18nStructure::SingleFile);
    let entry = assigned(&collection, new_page());
    let files = EntrySerializer::new().serialize(&collection, &entry).unwrap();

    assert_eq!(paths(&files), vec!["_pages/about.md"]);
    let value = format::decode(FileFormat::Frontmatter, &files[0].path, &files[0].content).unwrap();
    let mut locales: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
    locales.sort();
    assert_eq!(locales, vec!["de", "en", "fr"]);
    assert_eq!(value["en"]["body"], "Hello\n");
}

#[test]
fn multiple_files_share_one_folder() {
    let collection = pages(I18nStructure::MultipleFiles);
    let entry = assigned(&collection, new_page());
    assert_eq!(entry.path, "_pages/about.en.md");

    let files = EntrySerializer::new().serialize(&collection, &entry).unwrap();
    assert_eq!(
        paths(&files),
        vec!["_pages/about.en.md", "_pages/about.de.md", "_pages/about.fr.md"]
    );
}

#[test]
fn multiple_folders_use_locale_directories() {
    let collection = pages(I18nStructure::MultipleFolders);
    let entry = assigned(&collection, new_page());
    let files = EntrySerializer::new().serialize(&collection, &entry).unwrap();
    assert_eq!(
        paths(&files),
        vec!["_pages/en/about.md", "_pages/de/about.md", "_pages/fr/about.md"]
    );
}

#[test]
fn untranslatable_and_duplicated_fields_follow_default_locale() {
    let collection = pages(I18nStructure::MultipleFiles);
    let entry = assigned(&collection, new_page());
    let files = EntrySerializer::new().serialize(&collection, &entry).unwrap();

    let decode = |i: usize| format::decode(FileFormat::Frontmatter, &files[i].path, &files[i].content).unwrap();
    let de = decode(1);
    assert_eq!(de["title"], "Über");
    assert_eq!(de["layout"], "page");
    assert_eq!(de["author"], "Ada");

    let fr = decode(2);
    assert_eq!(fr["title"], "À propos");
    assert_eq!(fr["layout"], "page");
    assert_eq!(fr["author"], "Ada");
    assert_eq!(fr.get("body"), None);
}

#[test]
fn duplicated_fields_are_independent_after_creation() {
    let collection = pages(I18nStructure::MultipleFiles);
    let serializer = EntrySerializer::new();
    let entry = assigned(&collection, new_page());
    let files = serializer.serialize(&collection, &entry).unwrap();

    let mut loaded = serializer.deserialize(&collection, &files).unwrap();
    loaded.data["author"] = json!("Grace");
    loaded.data["layout"] = json!("wide");
    let files = serializer.serialize(&collection, &loaded).unwrap();
    let de = format::decode(FileFormat::Frontmatter, &files[1].path, &files[1].content).unwrap();
    assert_eq!(de["author"], "Ada");
    assert_eq!(de["layout"], "wide");
}

// ── Round trips ──────────────────────────────────────────────────

fn hashed(files: Vec<PersistedFile>) -> Vec<PersistedFile> {
    files
        .into_iter()
        .enumerate()
        .map(|(i, f)| {
            let hash = format!("h{i}");
            f.with_hash(hash)
        })
        .collect()
}

#[test]
fn reserializing_loaded_entries_is_byte_identical() {
    let serializer = EntrySerializer::new();
    for structure in [
        I18nStructure::SingleFile,
        I18nStructure::MultipleFiles,
        I18nStructure::MultipleFolders,
    ] {
        for format in [FileFormat::Frontmatter, FileFormat::Json, FileFormat::Yaml] {
            let collection = pages(structure).with_format(format);
            let entry = assigned(&collection, new_page());
            let first = hashed(serializer.serialize(&collection, &entry).unwrap());

            let loaded = serializer.deserialize(&collection, &first).unwrap();
            assert!(!loaded.new_entry);
            assert_eq!(loaded.base_hash.len(), first.len());

            let second = serializer.serialize(&collection, &loaded).unwrap();
            assert_eq!(second, first, "{structure:?} / {format:?}");
        }
    }
}

#[test]
fn deserialize_recovers_entry_identity() {
    let collection = pages(I18nStructure::MultipleFolders);
    let serializer = EntrySerializer::new();
    let files = serializer
        .serialize(&collection, &assigned(&collection, new_page()))
        .unwrap();

    // Any locale file may come first.
    let mut shuffled = files.clone();
    shuffled.reverse();
    let entry = serializer.deserialize(&collection, &shuffled).unwrap();
    assert_eq!(entry.slug, "about");
    assert_eq!(entry.path, "_pages/en/about.md");
    assert_eq!(entry.data["title"], "About");
    assert_eq!(entry.i18n["de"]["title"], "Über");
    assert_eq!(entry.base_hash, BaseHash::new());
}

#[test]
fn deserialize_skips_missing_translations() {
    let collection = pages(I18nStructure::MultipleFiles);
    let serializer = EntrySerializer::new();
    let files = serializer
        .serialize(&collection, &assigned(&collection, new_page()))
        .unwrap();
    let entry = serializer.deserialize(&collection, &files[..1]).unwrap();
    assert!(entry.i18n.is_empty());

    let err = serializer.deserialize(&collection, &files[1..]).unwrap_err();
    assert!(matches!(err, FormatError::Malformed { .. }));
}

#[test]
fn deserialize_rejects_foreign_paths() {
    let files = vec![PersistedFile::new("elsewhere/x.md", b"---\n---\n".to_vec())];
    let err = EntrySerializer::new().deserialize(&posts(), &files).unwrap_err();
    assert!(matches!(err, FormatError::UnknownPath { .. }));
}

// ── Files collections ────────────────────────────────────────────

fn settings() -> Collection {
    Collection::files(
        "settings",
        vec![CollectionFile {
            name: "general".into(),
            label: None,
            file: "_data/general.json".into(),
            fields: vec![Field::string("site_title")],
        }],
    )
}

#[test]
fn files_collection_uses_declared_path_and_format() {
    let collection = settings();
    let serializer = EntrySerializer::new();
    let mut entry = Entry::new("settings", json!({"site_title": "My Site"}));
    entry.slug = "general".into();
    serializer.assign_path(&collection, &mut entry, now()).unwrap();
    assert_eq!(entry.path, "_data/general.json");

    let files = serializer.serialize(&collection, &entry).unwrap();
    let value: Value = serde_json::from_slice(&files[0].content).unwrap();
    assert_eq!(value, json!({"site_title": "My Site"}));

    let loaded = serializer.deserialize(&collection, &files).unwrap();
    assert_eq!(loaded.slug, "general");
}

#[test]
fn files_collection_rejects_unknown_file() {
    let mut entry = Entry::new("settings", json!({}));
    entry.slug = "missing".into();
    let err = EntrySerializer::new()
        .assign_path(&settings(), &mut entry, now())
        .unwrap_err();
    assert!(matches!(err, FormatError::UnknownPath { .. }));
}

#[test]
fn files_collection_with_locales() {
    let collection = settings().with_i18n(I18nConfig::new(
        I18nStructure::MultipleFolders,
        &["en", "de"],
        "en",
    ));
    let serializer = EntrySerializer::new();
    assert_eq!(
        serializer.entry_paths(&collection, "general").unwrap(),
        vec!["_data/en/general.json", "_data/de/general.json"]
    );
    assert!(serializer.is_entry_path(&collection, "_data/en/general.json"));
    assert!(!serializer.is_entry_path(&collection, "_data/de/general.json"));
}
