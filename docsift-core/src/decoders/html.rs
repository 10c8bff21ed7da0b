//! HTML and XHTML decoding.
//!
//! The same event walker consumes browser HTML and the XHTML produced by the
//! Tika backend: `<head>` feeds metadata, everything else feeds the handler.

use super::text::decode_bytes;
use super::{ContentHandler, Decoder, DecoderId, MediaType, ParseContext, XhtmlWriter};
use crate::error::DecodeError;
use crate::metadata::{keys, Metadata};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::sync::LazyLock;

/// Elements that never have an end tag in HTML.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "frame", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Elements whose text is never document content. Their bodies are not
/// markup, so they are cut out before the walk.
static RAW_TEXT_ELEMENTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>|<noscript\b[^>]*>.*?</noscript\s*>|<template\b[^>]*>.*?</template\s*>",
    )
    .expect("static regex")
});

static ENTITY_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[A-Za-z][A-Za-z0-9]{1,31});")
        .expect("static regex")
});

#[derive(Debug, Default)]
pub struct HtmlDecoder;

impl HtmlDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for HtmlDecoder {
    fn id(&self) -> DecoderId {
        DecoderId::HTML
    }

    fn supported_types(&self) -> Vec<MediaType> {
        vec![
            MediaType::from("text/html"),
            MediaType::from("application/xhtml+xml"),
        ]
    }

    fn decode(
        &self,
        input: &[u8],
        handler: &mut dyn ContentHandler,
        metadata: &mut Metadata,
        _context: &ParseContext<'_>,
    ) -> Result<(), DecodeError> {
        let (markup, charset) = decode_bytes(input);
        metadata.set(keys::CONTENT_ENCODING, charset);
        metadata.set(keys::CONTENT_TYPE, format!("text/html; charset={charset}"));
        walk_xhtml(&markup, handler, metadata)
    }
}

/// Walk (X)HTML markup, emitting body events into `handler` and head fields
/// into `metadata`.
///
/// Markup is read leniently: mismatched end tags are accepted, a `<` that
/// cannot open a tag is text and unknown entities are kept as written. Any
/// remaining syntax error fails the walk.
pub fn walk_xhtml(
    markup: &str,
    handler: &mut dyn ContentHandler,
    metadata: &mut Metadata,
) -> Result<(), DecodeError> {
    let stripped = RAW_TEXT_ELEMENTS.replace_all(markup, "");
    let markup = escape_stray_angles(&stripped);
    let mut reader = Reader::from_str(&markup);
    reader.trim_text(false);
    reader.check_end_names(false);

    let mut walker = Walker {
        writer: XhtmlWriter::new(handler),
        metadata,
        in_head: false,
        in_title: false,
        pre_depth: 0,
        title: String::new(),
    };

    loop {
        let event = reader.read_event().map_err(|e| {
            DecodeError::Malformed(format!(
                "markup error at byte {}: {e}",
                reader.buffer_position()
            ))
        })?;

        match event {
            Event::Start(start) => {
                let name = element_name(&start);
                walker.start(&name, &start);
                if VOID_ELEMENTS.contains(&name.as_str()) {
                    walker.end(&name);
                }
            }
            Event::Empty(start) => {
                let name = element_name(&start);
                walker.start(&name, &start);
                walker.end(&name);
            }
            Event::End(end) => {
                let name = String::from_utf8_lossy(end.local_name().as_ref()).to_ascii_lowercase();
                if !VOID_ELEMENTS.contains(&name.as_str()) {
                    walker.end(&name);
                }
            }
            Event::Text(text) => {
                let raw = String::from_utf8_lossy(&text);
                walker.text(&unescape_text(&raw));
            }
            Event::CData(data) => walker.text(&String::from_utf8_lossy(&data)),
            Event::Eof => break,
            _ => {}
        }
    }

    let title = walker.title.trim();
    if !title.is_empty() {
        walker.metadata.set(keys::TITLE, title);
    }
    Ok(())
}

struct Walker<'h, 'm> {
    writer: XhtmlWriter<'h>,
    metadata: &'m mut Metadata,
    in_head: bool,
    in_title: bool,
    pre_depth: usize,
    title: String,
}

impl Walker<'_, '_> {
    fn start(&mut self, name: &str, start: &BytesStart<'_>) {
        let attributes = attributes(start);
        let borrowed: Vec<(&str, &str)> = attributes
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .collect();

        match name {
            "head" => self.in_head = true,
            "body" => self.in_head = false,
            "title" => self.in_title = true,
            "pre" => self.pre_depth += 1,
            "html" => {
                if let Some(lang) = super::handler::attribute(&borrowed, "lang") {
                    self.metadata.set(keys::CONTENT_LANGUAGE, lang);
                }
            }
            "meta" => self.meta(&borrowed),
            _ => {}
        }

        if !matches!(name, "html" | "head" | "body" | "title" | "meta") {
            self.writer.start_element(name, &borrowed);
        }
    }

    fn end(&mut self, name: &str) {
        match name {
            "head" => self.in_head = false,
            "title" => self.in_title = false,
            "pre" => self.pre_depth = self.pre_depth.saturating_sub(1),
            _ => {}
        }
        if !matches!(name, "html" | "head" | "body" | "title" | "meta") {
            self.writer.end_element(name);
        }
    }

    fn text(&mut self, text: &str) {
        if self.in_title {
            self.title.push_str(text);
            return;
        }
        if self.in_head {
            return;
        }
        if self.pre_depth > 0 {
            self.writer.characters(text);
            return;
        }
        let collapsed = collapse_whitespace(text);
        if !collapsed.trim().is_empty() {
            self.writer.characters(&collapsed);
        }
    }

    fn meta(&mut self, attributes: &[(&str, &str)]) {
        use super::handler::attribute;

        let Some(content) = attribute(attributes, "content") else {
            return;
        };
        if let Some(equiv) = attribute(attributes, "http-equiv") {
            if equiv.eq_ignore_ascii_case("content-language") {
                self.metadata.set(keys::CONTENT_LANGUAGE, content);
            }
            return;
        }
        if let Some(name) = attribute(attributes, "name") {
            self.metadata.add(name, content);
        }
    }
}

fn element_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.local_name().as_ref()).to_ascii_lowercase()
}

fn attributes(start: &BytesStart<'_>) -> Vec<(String, String)> {
    start
        .html_attributes()
        .flatten()
        .map(|attr| {
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).to_ascii_lowercase();
            let value = match attr.unescape_value() {
                Ok(value) => value.into_owned(),
                Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
            };
            (key, value)
        })
        .collect()
}

/// A `<` that cannot open a tag is text. Escape it so the reader does not
/// take the following markup for a tag name.
fn escape_stray_angles(markup: &str) -> Cow<'_, str> {
    let opens_tag = |next: Option<char>| {
        next.is_some_and(|c| c.is_ascii_alphabetic() || matches!(c, '/' | '!' | '?'))
    };

    let mut escaped: Option<String> = None;
    let mut copied = 0;
    let mut chars = markup.char_indices().peekable();
    while let Some((index, c)) = chars.next() {
        if c == '<' && !opens_tag(chars.peek().map(|&(_, next)| next)) {
            let out = escaped.get_or_insert_with(|| String::with_capacity(markup.len() + 16));
            out.push_str(&markup[copied..index]);
            out.push_str("&lt;");
            copied = index + 1;
        }
    }

    match escaped {
        Some(mut out) => {
            out.push_str(&markup[copied..]);
            Cow::Owned(out)
        }
        None => Cow::Borrowed(markup),
    }
}

/// Resolve references one at a time; an unknown one stays as written.
fn unescape_text(raw: &str) -> Cow<'_, str> {
    ENTITY_REFERENCE.replace_all(raw, |caps: &Captures<'_>| {
        resolve_reference(&caps[1]).unwrap_or_else(|| caps[0].to_string())
    })
}

fn resolve_reference(name: &str) -> Option<String> {
    let Some(code) = name.strip_prefix('#') else {
        return resolve_html_entity(name).map(str::to_string);
    };
    let value = match code.strip_prefix(['x', 'X']) {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => code.parse().ok()?,
    };
    char::from_u32(value).map(String::from)
}

fn resolve_html_entity(entity: &str) -> Option<&'static str> {
    match entity {
        "amp" => Some("&"),
        "lt" => Some("<"),
        "gt" => Some(">"),
        "quot" => Some("\""),
        "apos" => Some("'"),
        "nbsp" => Some("\u{a0}"),
        "copy" => Some("©"),
        "reg" => Some("®"),
        "mdash" => Some("—"),
        "ndash" => Some("–"),
        "hellip" => Some("…"),
        "euro" => Some("€"),
        "pound" => Some("£"),
        "laquo" => Some("«"),
        "raquo" => Some("»"),
        "eacute" => Some("é"),
        "egrave" => Some("è"),
        "agrave" => Some("à"),
        "ccedil" => Some("ç"),
        "ntilde" => Some("ñ"),
        "uuml" => Some("ü"),
        "ouml" => Some("ö"),
        "auml" => Some("ä"),
        "szlig" => Some("ß"),
        _ => None,
    }
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_space = false;
    for c in text.chars() {
        if c.is_whitespace() && c != '\u{a0}' {
            if !last_space {
                out.push(' ');
            }
            last_space = true;
        } else {
            out.push(c);
            last_space = false;
        }
    }
    out
}
