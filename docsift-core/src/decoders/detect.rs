//! Media type probing from magic bytes, falling back to the resource name.

use super::MediaType;
use regex::bytes::Regex;
use std::sync::LazyLock;

/// Bytes inspected by the content sniffers.
const SNIFF_LEN: usize = 1024;

static HTML_SNIFF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(<!--.*?-->\s*)*<(!doctype\s+html|html|head|body|title)[\s>]")
        .expect("static regex")
});

static XHTML_NAMESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<html[^>]+xmlns=").expect("static regex"));

const MAGIC: &[(&[u8], &str)] = &[
    (b"%PDF-", "application/pdf"),
    (b"\x89PNG\r\n\x1a\n", "image/png"),
    (b"\xff\xd8\xff", "image/jpeg"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"II*\x00", "image/tiff"),
    (b"MM\x00*", "image/tiff"),
    (b"\x00\x00\x00\x0cjP  \r\n\x87\n", "image/jp2"),
    (b"{\\rtf", "application/rtf"),
];

/// Valid BITMAPINFOHEADER family sizes at offset 14 of a BMP file.
const BMP_DIB_HEADER_SIZES: &[u32] = &[12, 40, 52, 56, 64, 108, 124];

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE2_MAGIC: &[u8] = b"\xd0\xcf\x11\xe0\xa1\xb1\x1a\xe1";

/// Probe `bytes` for a media type. `name` is the resource name, used to
/// refine container formats and when no magic matches.
pub fn detect(bytes: &[u8], name: Option<&str>) -> MediaType {
    let by_name = name.and_then(|name| mime_guess::from_path(name).first_raw());

    if let Some((_, media_type)) = MAGIC.iter().find(|(magic, _)| bytes.starts_with(magic)) {
        return MediaType::from(*media_type);
    }
    if is_bmp(bytes) {
        return MediaType::from("image/bmp");
    }
    if bytes.starts_with(ZIP_MAGIC) {
        return MediaType::from(by_name.unwrap_or("application/zip"));
    }
    if bytes.starts_with(OLE2_MAGIC) {
        return MediaType::from(by_name.unwrap_or("application/x-tika-msoffice"));
    }

    let head = &bytes[..bytes.len().min(SNIFF_LEN)];
    let head = head.strip_prefix(b"\xef\xbb\xbf".as_slice()).unwrap_or(head);
    if head.starts_with(b"<?xml") {
        if XHTML_NAMESPACE.is_match(head) {
            return MediaType::from("application/xhtml+xml");
        }
        return MediaType::from(by_name.unwrap_or("application/xml"));
    }
    if HTML_SNIFF.is_match(head) {
        return MediaType::from("text/html");
    }

    if let Some(media_type) = by_name {
        return MediaType::from(media_type);
    }
    if looks_like_text(bytes) {
        return MediaType::from(MediaType::TEXT_PLAIN);
    }
    MediaType::octet_stream()
}

/// A "BM" prefix counts only with a known DIB header size behind it.
fn is_bmp(bytes: &[u8]) -> bool {
    if !bytes.starts_with(b"BM") || bytes.len() < 18 {
        return false;
    }
    let dib_size = u32::from_le_bytes([bytes[14], bytes[15], bytes[16], bytes[17]]);
    BMP_DIB_HEADER_SIZES.contains(&dib_size)
}

fn looks_like_text(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(SNIFF_LEN * 8)];
    if head.contains(&0) {
        return false;
    }
    match std::str::from_utf8(head) {
        Ok(_) => true,
        // A multi-byte sequence cut by the sample boundary is still text.
        Err(e) => e.error_len().is_none(),
    }
}
