//! Entry serialization for Folio.
//!
//! Turns an [`Entry`](folio_model::Entry) into the `(path, bytes)` pairs a
//! collection stores it as, and back:
//!
//! - [`format`]: front matter markdown, JSON and YAML encodings
//! - [`slug`]: slug templates (`{{year}}-{{month}}-{{day}}-{{slug}}`)
//! - [`layout`]: i18n file layouts (`single_file`, `multiple_files`, `multiple_folders`)
//! - [`EntrySerializer`]: validation plus per-field i18n rules on top of the above
//!
//! Serialization is a pure function of the collection, the entry and the
//! creation time supplied by the caller. Deserializing the serializer's own
//! output and serializing it again yields byte-identical files.

mod error;
mod serializer;

pub mod format;
pub mod layout;
pub mod slug;

pub use error::{FormatError, FormatResult};
pub use layout::{LocaleFile, ParsedPath};
pub use serializer::EntrySerializer;
pub use slug::slugify;
