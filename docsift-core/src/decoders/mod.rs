//! Format decoders and the registry that dispatches to them.
//!
//! ## Architecture
//!
//! ```text
//! bytes + resource name
//!     ↓
//! [Media type detection]
//!     ↓
//! [ParserRegistry] ── no claim / decoder error ──▶ [Fallback: explicit failure]
//!     ↓
//! [Decoder] ── embedded images ──▶ ParseContext::parse_embedded ──▶ [ParserRegistry]
//!     ↓
//! ContentHandler events (tee: text sink + link sink) + Metadata
//! ```
//!
//! ## Available Decoders
//!
//! - `TextDecoder` - plain text
//! - `HtmlDecoder` - HTML and XHTML (also consumes Tika output)
//! - `PdfDecoder` - PDF text layer, annotations and inline images via `lopdf`
//! - `OcrDecoder` - images through the `tesseract` executable
//! - `TikaJniDecoder` - Office formats via Apache Tika (feature `jni-backend`)

pub mod detect;
pub mod handler;
pub mod html;
pub mod ocr;
pub mod pdf;
mod raster;
pub mod registry;
pub mod text;

#[cfg(feature = "jni-backend")]
pub mod tika;

use crate::error::{DecodeError, ExtractError};
use crate::metadata::{keys, Metadata};
use serde::{Serialize, Serializer};
use std::fmt;

pub use handler::{ContentHandler, LinkSink, TeeHandler, TextSink, XhtmlWriter};
pub use html::HtmlDecoder;
pub use ocr::{OcrConfig, OcrConfigurator, OcrDecoder};
pub use pdf::{PdfConfig, PdfDecoder};
pub use registry::{ParserDescriptor, ParserRegistry, RegistryBuilder};
pub use text::TextDecoder;

#[cfg(feature = "jni-backend")]
pub use tika::TikaJniDecoder;

/// Stable identifier of a decoder implementation, used as the key for
/// exclusion instead of any runtime type check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DecoderId(&'static str);

impl DecoderId {
    pub const TEXT: DecoderId = DecoderId("text");
    pub const HTML: DecoderId = DecoderId("html");
    pub const PDF: DecoderId = DecoderId("pdf");
    pub const OCR: DecoderId = DecoderId("tesseract-ocr");
    pub const TIKA: DecoderId = DecoderId("tika-jni");

    pub const fn new(id: &'static str) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for DecoderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// A media type reduced to its lowercase `type/subtype` base, parameters
/// dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MediaType(String);

impl MediaType {
    pub const OCTET_STREAM: &'static str = "application/octet-stream";
    pub const TEXT_PLAIN: &'static str = "text/plain";

    pub fn parse(raw: &str) -> Self {
        let base = raw.split(';').next().unwrap_or_default();
        Self(base.trim().to_ascii_lowercase())
    }

    pub fn octet_stream() -> Self {
        Self(Self::OCTET_STREAM.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn top_level(&self) -> &str {
        self.0.split('/').next().unwrap_or_default()
    }

    pub fn is_text(&self) -> bool {
        self.top_level() == "text"
    }

    pub fn is_image(&self) -> bool {
        self.top_level() == "image"
    }
}

impl From<&str> for MediaType {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for MediaType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// A format decoder.
///
/// Decoders are configured once and shared across workers, so `decode` takes
/// `&self`; per-call state lives in the handler, the metadata and the
/// context passed in.
pub trait Decoder: Send + Sync {
    fn id(&self) -> DecoderId;

    /// Media types this decoder claims.
    fn supported_types(&self) -> Vec<MediaType>;

    /// Decode `input`, emitting content events into `handler` and fields into
    /// `metadata`.
    fn decode(
        &self,
        input: &[u8],
        handler: &mut dyn ContentHandler,
        metadata: &mut Metadata,
        context: &ParseContext<'_>,
    ) -> Result<(), DecodeError>;
}

/// Read-only configuration visible to decoders during one parse.
pub struct ParseContext<'a> {
    registry: &'a ParserRegistry,
    pdf: &'a PdfConfig,
    ocr: &'a OcrConfig,
}

impl<'a> ParseContext<'a> {
    pub fn new(registry: &'a ParserRegistry, pdf: &'a PdfConfig, ocr: &'a OcrConfig) -> Self {
        Self { registry, pdf, ocr }
    }

    pub fn registry(&self) -> &ParserRegistry {
        self.registry
    }

    pub fn pdf(&self) -> &PdfConfig {
        self.pdf
    }

    pub fn ocr(&self) -> &OcrConfig {
        self.ocr
    }

    /// Decode an embedded resource through the registry, writing its content
    /// into the parent's handler inside an `embedded` div.
    pub fn parse_embedded(
        &self,
        input: &[u8],
        media_type: Option<MediaType>,
        name: Option<&str>,
        handler: &mut dyn ContentHandler,
    ) -> Result<DecoderId, ExtractError> {
        let mut metadata = Metadata::new();
        if let Some(name) = name {
            metadata.set(keys::RESOURCE_NAME, name);
        }
        let media_type = media_type.unwrap_or_else(|| detect::detect(input, name));
        metadata.set(keys::CONTENT_TYPE, media_type.as_str());

        let mut writer = XhtmlWriter::new(handler);
        writer.start_element("div", &[("class", "embedded")]);
        let result = self
            .registry
            .dispatch(input, &media_type, writer.handler(), &mut metadata, self);
        writer.end_element("div");
        result
    }
}
