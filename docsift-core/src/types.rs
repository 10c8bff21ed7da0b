use crate::language::Language;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Engine name stamped into every extraction method.
pub const ENGINE_NAME: &str = "docsift";

// ===== DOCUMENT =====
// A Document only exists for a file whose decode completed without a fatal
// error. Fields are private so a built Document cannot be altered.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    path: PathBuf,
    content: String,
    language: Language,
    encoding: String,
    mime_type: String,
    metadata: BTreeMap<String, String>,
    extraction_method: ExtractionMethod,
}

impl Document {
    pub(crate) fn new(
        path: PathBuf,
        content: String,
        language: Language,
        encoding: String,
        mime_type: String,
        metadata: BTreeMap<String, String>,
        extraction_method: ExtractionMethod,
    ) -> Self {
        Self {
            path,
            content,
            language,
            encoding,
            mime_type,
            metadata,
            extraction_method,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn extraction_method(&self) -> &ExtractionMethod {
        &self.extraction_method
    }
}

/// Provenance of a Document: which engine, decoder and OCR setup made it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionMethod {
    pub engine: String,
    pub version: String,
    /// Decoder that claimed the top-level media type
    pub decoder: String,
    pub ocr_enabled: bool,
    pub ocr_language: Option<String>,
}

// ===== LINKS =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Anchor,
    Image,
    Link,
    Script,
    Iframe,
    Frame,
    Area,
}

impl LinkKind {
    /// Element name and the attribute carrying the target.
    pub fn from_element(name: &str) -> Option<(Self, &'static str)> {
        match name {
            "a" => Some((Self::Anchor, "href")),
            "area" => Some((Self::Area, "href")),
            "link" => Some((Self::Link, "href")),
            "img" => Some((Self::Image, "src")),
            "script" => Some((Self::Script, "src")),
            "iframe" => Some((Self::Iframe, "src")),
            "frame" => Some((Self::Frame, "src")),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub kind: LinkKind,
    pub uri: String,
    pub title: Option<String>,
    pub rel: Option<String>,
    pub text: String,
}

// ===== SCANNING =====

/// Owner of a scan: selects the root directory and the queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    /// Directory relative to the scan base; the user id when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl User {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| PathBuf::from(&self.id))
    }
}

/// One discovered file, handed from the scanner to exactly one worker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanQueueEntry {
    pub path: PathBuf,
    pub user: String,
}

impl ScanQueueEntry {
    pub fn new(path: impl Into<PathBuf>, user: &User) -> Self {
        Self {
            path: path.into(),
            user: user.id.clone(),
        }
    }
}
