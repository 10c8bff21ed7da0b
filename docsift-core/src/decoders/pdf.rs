//! PDF decoding via `lopdf`: text layer per page, document info, link
//! annotations and, when enabled, inline images routed back through the
//! registry.

use super::raster;
use super::{ContentHandler, Decoder, DecoderId, MediaType, ParseContext, XhtmlWriter};
use crate::error::DecodeError;
use crate::metadata::{keys, Metadata};
use lopdf::{Dictionary, Document as PdfDocument, Object, ObjectId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Container-level switches for the PDF decoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdfConfig {
    /// Hand inline images to the registry as embedded resources
    pub extract_inline_images: bool,
    /// Only process the first occurrence of an image object
    pub extract_unique_inline_images_only: bool,
}

impl PdfConfig {
    pub const DEFAULT: PdfConfig = PdfConfig {
        extract_inline_images: false,
        extract_unique_inline_images_only: true,
    };
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Debug, Default)]
pub struct PdfDecoder;

impl PdfDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for PdfDecoder {
    fn id(&self) -> DecoderId {
        DecoderId::PDF
    }

    fn supported_types(&self) -> Vec<MediaType> {
        vec![MediaType::from("application/pdf")]
    }

    fn decode(
        &self,
        input: &[u8],
        handler: &mut dyn ContentHandler,
        metadata: &mut Metadata,
        context: &ParseContext<'_>,
    ) -> Result<(), DecodeError> {
        let pdf = PdfDocument::load_mem(input)
            .map_err(|e| DecodeError::Malformed(format!("unreadable PDF: {e}")))?;

        read_info(&pdf, metadata);
        let pages = pdf.get_pages();
        metadata.set(keys::PAGE_COUNT, pages.len().to_string());
        metadata.set(keys::ENCRYPTED, pdf.is_encrypted().to_string());

        let mut writer = XhtmlWriter::new(handler);
        let mut seen_images = HashSet::new();

        for (&page_number, &page_id) in &pages {
            writer.start_element("div", &[("class", "page")]);

            match pdf.extract_text(&[page_number]) {
                Ok(text) => {
                    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
                        writer.element("p", paragraph);
                    }
                }
                Err(e) => debug!("No text layer on page {}: {}", page_number, e),
            }

            for uri in page_link_uris(&pdf, page_id) {
                writer.start_element("a", &[("href", uri.as_str())]);
                writer.end_element("a");
            }

            if context.pdf().extract_inline_images {
                let unique_only = context.pdf().extract_unique_inline_images_only;
                extract_inline_images(
                    &pdf,
                    page_number,
                    page_id,
                    unique_only.then_some(&mut seen_images),
                    &mut writer,
                    metadata,
                    context,
                );
            }

            writer.end_element("div");
        }

        Ok(())
    }
}

fn extract_inline_images(
    pdf: &PdfDocument,
    page_number: u32,
    page_id: ObjectId,
    mut seen: Option<&mut HashSet<ObjectId>>,
    writer: &mut XhtmlWriter<'_>,
    metadata: &mut Metadata,
    context: &ParseContext<'_>,
) {
    let images = match pdf.get_page_images(page_id) {
        Ok(images) => images,
        Err(e) => {
            debug!("Failed to list images on page {}: {}", page_number, e);
            return;
        }
    };

    for (index, image) in images.iter().enumerate() {
        if let Some(seen) = seen.as_deref_mut() {
            if !seen.insert(image.id) {
                continue;
            }
        }

        let name = format!("page{page_number}-image{index}");
        let embedded = match raster::embeddable(pdf, image) {
            Ok(embedded) => embedded,
            Err(e) => {
                warn!("Cannot hand image {} to the registry: {}", name, e);
                metadata.add(keys::EMBEDDED_EXCEPTION, format!("{name}: {e}"));
                continue;
            }
        };

        if let Err(e) = context.parse_embedded(
            &embedded.bytes,
            Some(MediaType::from(embedded.media_type)),
            Some(&name),
            writer.handler(),
        ) {
            warn!("Embedded image {} failed: {}", name, e);
            metadata.add(keys::EMBEDDED_EXCEPTION, format!("{name}: {e}"));
        }
    }
}

fn read_info(pdf: &PdfDocument, metadata: &mut Metadata) {
    let Ok((_, info)) = pdf
        .trailer
        .get(b"Info")
        .and_then(|object| pdf.dereference(object))
    else {
        return;
    };
    let Ok(info) = info.as_dict() else {
        return;
    };

    let fields = [
        ("Title", keys::TITLE),
        ("Author", keys::CREATOR),
        ("Subject", "dc:subject"),
        ("Keywords", "meta:keyword"),
        ("Creator", "xmp:CreatorTool"),
        ("Producer", "pdf:producer"),
        ("CreationDate", "dcterms:created"),
        ("ModDate", "dcterms:modified"),
    ];
    for (key, field) in fields {
        if let Some(value) = info_string(info, key.as_bytes()) {
            metadata.set(field, value);
        }
    }
}

fn info_string(info: &Dictionary, key: &[u8]) -> Option<String> {
    let bytes = info.get(key).and_then(Object::as_str).ok()?;
    let value = pdf_text_string(bytes);
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// PDF text strings are UTF-16BE when they carry a BOM, PDFDocEncoding
/// (close enough to Latin-1 for metadata) otherwise.
fn pdf_text_string(bytes: &[u8]) -> String {
    match bytes.strip_prefix(b"\xfe\xff".as_slice()) {
        Some(utf16) => {
            let units: Vec<u16> = utf16
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        None => bytes.iter().map(|&b| b as char).collect(),
    }
}

fn page_link_uris(pdf: &PdfDocument, page_id: ObjectId) -> Vec<String> {
    let Ok(page) = pdf.get_dictionary(page_id) else {
        return Vec::new();
    };
    let Ok((_, annots)) = page
        .get(b"Annots")
        .and_then(|object| pdf.dereference(object))
    else {
        return Vec::new();
    };
    let Ok(annots) = annots.as_array() else {
        return Vec::new();
    };

    annots
        .iter()
        .filter_map(|annot| {
            let (_, annot) = pdf.dereference(annot).ok()?;
            let (_, action) = pdf.dereference(annot.as_dict().ok()?.get(b"A").ok()?).ok()?;
            let uri = action.as_dict().ok()?.get(b"URI").ok()?.as_str().ok()?;
            Some(pdf_text_string(uri))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoders::{LinkSink, OcrConfig, RegistryBuilder, TeeHandler, TextSink};
    use crate::types::LinkKind;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Stream};

    fn sample_pdf(text: &str) -> Vec<u8> {
        let mut doc = PdfDocument::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let link_id = doc.add_object(dictionary! {
            "Type" => "Annot",
            "Subtype" => "Link",
            "A" => dictionary! { "S" => "URI", "URI" => Object::string_literal("https://example.org") },
        });
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Annots" => vec![link_id.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        let info_id = doc.add_object(dictionary! {
            "Title" => Object::string_literal("Quarterly report"),
        });
        doc.trailer.set("Root", catalog_id);
        doc.trailer.set("Info", info_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_text_info_and_links() {
        let registry = RegistryBuilder::new().build();
        let pdf = PdfConfig::default();
        let ocr = OcrConfig::default();
        let context = ParseContext::new(&registry, &pdf, &ocr);

        let mut text = TextSink::new();
        let mut links = LinkSink::new();
        let mut metadata = Metadata::new();
        {
            let mut tee = TeeHandler::new(&mut text, &mut links);
            PdfDecoder::new()
                .decode(&sample_pdf("Hello PDF"), &mut tee, &mut metadata, &context)
                .unwrap();
        }

        assert!(text.into_string().contains("Hello PDF"));
        assert_eq!(metadata.get(keys::TITLE), Some("Quarterly report"));
        assert_eq!(metadata.get(keys::PAGE_COUNT), Some("1"));
        let links = links.into_links();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].kind, LinkKind::Anchor);
        assert_eq!(links[0].uri, "https://example.org");
    }

    #[test]
    fn test_garbage_is_malformed() {
        let registry = RegistryBuilder::new().build();
        let pdf = PdfConfig::default();
        let ocr = OcrConfig::default();
        let context = ParseContext::new(&registry, &pdf, &ocr);
        let err = PdfDecoder::new()
            .decode(b"not a pdf at all", &mut TextSink::new(), &mut Metadata::new(), &context)
            .unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn test_utf16_info_strings() {
        assert_eq!(pdf_text_string(b"\xfe\xff\x00H\x00i"), "Hi");
        assert_eq!(pdf_text_string(b"caf\xe9"), "café");
    }

    struct RecordingImageDecoder {
        seen: parking_lot::Mutex<Vec<Vec<u8>>>,
    }

    impl Decoder for RecordingImageDecoder {
        fn id(&self) -> DecoderId {
            DecoderId::OCR
        }

        fn supported_types(&self) -> Vec<MediaType> {
            vec![MediaType::from("image/png")]
        }

        fn decode(
            &self,
            input: &[u8],
            handler: &mut dyn ContentHandler,
            _metadata: &mut Metadata,
            _context: &ParseContext<'_>,
        ) -> Result<(), DecodeError> {
            self.seen.lock().push(input.to_vec());
            XhtmlWriter::new(handler).element("p", "RECOGNIZED");
            Ok(())
        }
    }

    /// One page, no text layer, a Flate gray scan and a JBIG2 image.
    fn scanned_pdf() -> Vec<u8> {
        let mut doc = PdfDocument::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut scan = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 16,
                "Height" => 16,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            vec![255u8; 256],
        );
        scan.compress().unwrap();
        let scan_id = doc.add_object(scan);
        let jbig2_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 16,
                "Height" => 16,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 1,
                "Filter" => "JBIG2Decode",
            },
            vec![0u8; 32],
        ));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im1" => scan_id, "Im2" => jbig2_id },
            },
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_flate_scan_reaches_the_image_decoder() {
        let recorder = std::sync::Arc::new(RecordingImageDecoder {
            seen: parking_lot::Mutex::new(Vec::new()),
        });
        let mut builder = RegistryBuilder::new();
        builder.register_shared(recorder.clone());
        let registry = builder.build();
        let pdf = PdfConfig {
            extract_inline_images: true,
            extract_unique_inline_images_only: false,
        };
        let ocr = OcrConfig::default();
        let context = ParseContext::new(&registry, &pdf, &ocr);

        let mut text = TextSink::new();
        let mut metadata = Metadata::new();
        PdfDecoder::new()
            .decode(&scanned_pdf(), &mut text, &mut metadata, &context)
            .unwrap();

        let seen = recorder.seen.lock();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].starts_with(b"\x89PNG\r\n\x1a\n"));
        assert!(text.into_string().contains("RECOGNIZED"));

        let exceptions = metadata.get_all(keys::EMBEDDED_EXCEPTION);
        assert_eq!(exceptions.len(), 1);
        assert!(exceptions[0].contains("JBIG2Decode"));
    }

    #[test]
    fn test_default_config_skips_inline_images() {
        assert!(!PdfConfig::DEFAULT.extract_inline_images);
        assert!(PdfConfig::DEFAULT.extract_unique_inline_images_only);
    }
}
