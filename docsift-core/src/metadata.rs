//! Engine metadata and its canonical snapshot.
//!
//! Decoders write into a live [`Metadata`] container during a parse. Once
//! decoding and language detection are done, [`canonicalize`] consumes the
//! container and produces an owned [`CanonicalMetadata`] snapshot.

use crate::language::Language;
use std::collections::{BTreeMap, HashSet};

/// Engine-native metadata keys.
pub mod keys {
    pub const RESOURCE_NAME: &str = "resourceName";
    pub const CONTENT_TYPE: &str = "Content-Type";
    pub const CONTENT_LENGTH: &str = "Content-Length";
    pub const CONTENT_ENCODING: &str = "Content-Encoding";
    pub const CONTENT_LANGUAGE: &str = "Content-Language";
    pub const CONTENT_LANGUAGE_BELIEF: &str = "Content-Language-Belief";
    pub const TITLE: &str = "dc:title";
    pub const CREATOR: &str = "dc:creator";
    pub const PAGE_COUNT: &str = "xmpTPg:NPages";
    pub const ENCRYPTED: &str = "pdf:encrypted";
    pub const EMBEDDED_EXCEPTION: &str = "X-Embedded-Exception";
}

/// The only encoding the canonicalizer ever reports.
pub const UTF_8: &str = "UTF-8";

/// Live, multi-valued metadata filled by decoders during one parse.
///
/// Entries keep insertion order. Reads return the last value written for a
/// key.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    entries: Vec<(String, String)>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value, keeping earlier values for the same key.
    pub fn add(&mut self, name: &str, value: impl Into<String>) {
        self.entries.push((name.to_string(), value.into()));
    }

    /// Replace every value for `name` with a single value.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.entries.retain(|(key, _)| key != name);
        self.entries.push((name.to_string(), value.into()));
    }

    /// Set only when no value is present yet.
    pub fn set_if_absent(&mut self, name: &str, value: impl Into<String>) {
        if !self.contains(name) {
            self.set(name, value);
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(key, _)| key == name)
    }

    /// Distinct names in first-insertion order.
    pub fn names(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.entries
            .iter()
            .map(|(key, _)| key.as_str())
            .filter(|key| seen.insert(*key))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Canonical view of engine metadata, detached from the live container.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalMetadata {
    pub resource_name: Option<String>,
    pub content_type: Option<String>,
    /// Signed, as declared; a negative length is kept rather than dropped
    pub content_length: Option<i64>,
    pub content_encoding: Option<&'static str>,
    pub content_language: Option<Language>,
    /// Every engine key, one value each.
    pub entries: BTreeMap<String, String>,
}

impl CanonicalMetadata {
    /// Document `mimeType`, with the "UNKNOWN" sentinel when absent.
    pub fn mime_type(&self) -> String {
        self.content_type
            .clone()
            .unwrap_or_else(|| "UNKNOWN".to_string())
    }
}

/// Map engine keys onto canonical fields.
pub fn canonicalize(metadata: Metadata) -> CanonicalMetadata {
    let resource_name = metadata.get(keys::RESOURCE_NAME).map(str::to_string);
    let content_type = metadata.get(keys::CONTENT_TYPE).map(str::to_string);
    let content_length = metadata.get(keys::CONTENT_LENGTH).and_then(parse_length);
    // No charset sniffing: any declared encoding is reported as UTF-8.
    let content_encoding = metadata.contains(keys::CONTENT_ENCODING).then_some(UTF_8);
    let content_language = metadata
        .get(keys::CONTENT_LANGUAGE)
        .map(Language::from_metadata_value);

    let entries = metadata
        .names()
        .into_iter()
        .filter_map(|name| {
            metadata
                .get(name)
                .map(|value| (name.to_string(), value.to_string()))
        })
        .collect();

    CanonicalMetadata {
        resource_name,
        content_type,
        content_length,
        content_encoding,
        content_language,
        entries,
    }
}

fn parse_length(raw: &str) -> Option<i64> {
    raw.parse::<i64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_replaces_and_add_appends() {
        let mut metadata = Metadata::new();
        metadata.add("dc:creator", "alice");
        metadata.add("dc:creator", "bob");
        assert_eq!(metadata.get_all("dc:creator"), vec!["alice", "bob"]);
        assert_eq!(metadata.get("dc:creator"), Some("bob"));

        metadata.set("dc:creator", "carol");
        assert_eq!(metadata.get_all("dc:creator"), vec!["carol"]);
    }

    #[test]
    fn test_names_are_unique_and_ordered() {
        let mut metadata = Metadata::new();
        metadata.add("b", "1");
        metadata.add("a", "2");
        metadata.add("b", "3");
        assert_eq!(metadata.names(), vec!["b", "a"]);
    }

    #[test]
    fn test_missing_keys_stay_absent() {
        let canonical = canonicalize(Metadata::new());
        assert_eq!(canonical.resource_name, None);
        assert_eq!(canonical.content_type, None);
        assert_eq!(canonical.content_length, None);
        assert_eq!(canonical.content_encoding, None);
        assert_eq!(canonical.content_language, None);
        assert_eq!(canonical.mime_type(), "UNKNOWN");
        assert!(canonical.entries.is_empty());
    }

    #[test]
    fn test_content_length_parsing() {
        let cases = [
            ("1024", Some(1024)),
            ("0", Some(0)),
            ("9223372036854775807", Some(i64::MAX)),
            ("18446744073709551615", None),
            ("12kb", None),
            ("", None),
            ("-5", Some(-5)),
            ("3.5", None),
            (" 7", None),
        ];
        for (raw, expected) in cases {
            let mut metadata = Metadata::new();
            metadata.set(keys::CONTENT_LENGTH, raw);
            assert_eq!(canonicalize(metadata).content_length, expected, "raw {raw:?}");
        }
    }

    #[test]
    fn test_any_declared_encoding_is_utf8() {
        let mut metadata = Metadata::new();
        metadata.set(keys::CONTENT_ENCODING, "ISO-8859-1");
        let canonical = canonicalize(metadata);
        assert_eq!(canonical.content_encoding, Some(UTF_8));
        assert_eq!(canonical.entries[keys::CONTENT_ENCODING], "ISO-8859-1");
    }

    #[test]
    fn test_canonical_fields_and_pass_through() {
        let mut metadata = Metadata::new();
        metadata.set(keys::RESOURCE_NAME, "report.pdf");
        metadata.set(keys::CONTENT_TYPE, "application/pdf");
        metadata.set(keys::CONTENT_LANGUAGE, "gl");
        metadata.add("dc:creator", "alice");
        metadata.add("dc:creator", "bob");

        let canonical = canonicalize(metadata);
        assert_eq!(canonical.resource_name.as_deref(), Some("report.pdf"));
        assert_eq!(canonical.mime_type(), "application/pdf");
        assert_eq!(canonical.content_language, Some(Language::Spanish));
        assert_eq!(canonical.entries["dc:creator"], "bob");
        assert_eq!(canonical.entries.len(), 4);
    }
}
