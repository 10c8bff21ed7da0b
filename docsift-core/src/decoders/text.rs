use super::{ContentHandler, Decoder, DecoderId, MediaType, ParseContext, XhtmlWriter};
use crate::error::DecodeError;
use crate::metadata::{keys, Metadata};
use std::borrow::Cow;

const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

/// Plain text. UTF-8 when valid, otherwise read as ISO-8859-1, which never
/// fails.
#[derive(Debug, Default)]
pub struct TextDecoder;

impl TextDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for TextDecoder {
    fn id(&self) -> DecoderId {
        DecoderId::TEXT
    }

    fn supported_types(&self) -> Vec<MediaType> {
        vec![MediaType::from(MediaType::TEXT_PLAIN)]
    }

    fn decode(
        &self,
        input: &[u8],
        handler: &mut dyn ContentHandler,
        metadata: &mut Metadata,
        _context: &ParseContext<'_>,
    ) -> Result<(), DecodeError> {
        let (text, charset) = decode_bytes(input);

        metadata.set(keys::CONTENT_ENCODING, charset);
        metadata.set(
            keys::CONTENT_TYPE,
            format!("{}; charset={}", MediaType::TEXT_PLAIN, charset),
        );

        let mut writer = XhtmlWriter::new(handler);
        writer.element("p", &text);
        Ok(())
    }
}

/// Bytes to text plus the charset used. A UTF-8 BOM is dropped.
pub(crate) fn decode_bytes(input: &[u8]) -> (Cow<'_, str>, &'static str) {
    let input = input.strip_prefix(UTF8_BOM).unwrap_or(input);
    match std::str::from_utf8(input) {
        Ok(text) => (Cow::Borrowed(text), "UTF-8"),
        Err(_) => (
            Cow::Owned(input.iter().map(|&b| b as char).collect()),
            "ISO-8859-1",
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoders::{OcrConfig, PdfConfig, RegistryBuilder, TextSink};

    fn decode(input: &[u8]) -> (String, Metadata) {
        let registry = RegistryBuilder::new().build();
        let pdf = PdfConfig::default();
        let ocr = OcrConfig::default();
        let context = ParseContext::new(&registry, &pdf, &ocr);
        let mut sink = TextSink::new();
        let mut metadata = Metadata::new();
        TextDecoder::new()
            .decode(input, &mut sink, &mut metadata, &context)
            .unwrap();
        (sink.into_string(), metadata)
    }

    #[test]
    fn test_utf8_with_bom() {
        let (text, metadata) = decode(b"\xef\xbb\xbfhello");
        assert_eq!(text, "hello\n");
        assert_eq!(metadata.get(keys::CONTENT_ENCODING), Some("UTF-8"));
        assert_eq!(
            metadata.get(keys::CONTENT_TYPE),
            Some("text/plain; charset=UTF-8")
        );
    }

    #[test]
    fn test_invalid_utf8_reads_as_latin1() {
        let (text, metadata) = decode(b"caf\xe9");
        assert_eq!(text, "café\n");
        assert_eq!(metadata.get(keys::CONTENT_ENCODING), Some("ISO-8859-1"));
    }

    #[test]
    fn test_empty_input() {
        let (text, _) = decode(b"");
        assert_eq!(text, "\n");
    }
}
