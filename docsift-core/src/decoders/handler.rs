//! Content handlers: the event sinks decoders write into.
//!
//! A decoder walks its input once and emits XHTML-shaped events. The
//! orchestrator tees those events into a [`TextSink`] and a [`LinkSink`], so
//! text and links come from the same traversal. Both sinks only append while
//! decoding and are turned into their final form afterwards.

use crate::types::{Link, LinkKind};

/// Element attributes as (name, value) pairs.
pub type Attributes<'a> = [(&'a str, &'a str)];

/// Receiver of decode events. All methods default to no-ops.
pub trait ContentHandler {
    fn start_element(&mut self, _name: &str, _attributes: &Attributes<'_>) {}

    fn end_element(&mut self, _name: &str) {}

    fn characters(&mut self, _text: &str) {}

    /// Layout whitespace (line breaks after blocks). Not part of anchor text.
    fn ignorable_whitespace(&mut self, _text: &str) {}
}

/// Look up an attribute value by name.
pub fn attribute<'a>(attributes: &'a Attributes<'a>, name: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| *value)
}

/// Plain-text body collector.
#[derive(Debug, Default)]
pub struct TextSink {
    buffer: String,
}

impl TextSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_string(self) -> String {
        self.buffer
    }
}

impl ContentHandler for TextSink {
    fn characters(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    fn ignorable_whitespace(&mut self, text: &str) {
        self.buffer.push_str(text);
    }
}

#[derive(Debug)]
struct OpenLink {
    kind: LinkKind,
    uri: String,
    title: Option<String>,
    rel: Option<String>,
    text: String,
}

impl OpenLink {
    fn finish(self) -> Link {
        Link {
            kind: self.kind,
            uri: self.uri,
            title: self.title,
            rel: self.rel,
            text: self.text.trim().to_string(),
        }
    }
}

/// Hyperlink collector.
///
/// Anchors (`a`, `area`) stay open until their end tag so they can collect
/// their text; every other link kind is recorded on its start tag.
#[derive(Debug, Default)]
pub struct LinkSink {
    links: Vec<Link>,
    open: Vec<OpenLink>,
}

impl LinkSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finished links in document order. Anchors left unclosed by a
    /// truncated document are kept.
    pub fn into_links(mut self) -> Vec<Link> {
        while let Some(open) = self.open.pop() {
            self.links.push(open.finish());
        }
        self.links
    }
}

impl ContentHandler for LinkSink {
    fn start_element(&mut self, name: &str, attributes: &Attributes<'_>) {
        let Some((kind, target)) = LinkKind::from_element(name) else {
            return;
        };
        let Some(uri) = attribute(attributes, target) else {
            return;
        };

        let open = OpenLink {
            kind,
            uri: uri.to_string(),
            title: attribute(attributes, "title").map(str::to_string),
            rel: attribute(attributes, "rel").map(str::to_string),
            text: attribute(attributes, "alt").unwrap_or_default().to_string(),
        };

        if matches!(kind, LinkKind::Anchor | LinkKind::Area) {
            self.open.push(open);
        } else {
            self.links.push(open.finish());
        }
    }

    fn end_element(&mut self, name: &str) {
        if matches!(name, "a" | "area") {
            if let Some(open) = self.open.pop() {
                self.links.push(open.finish());
            }
        }
    }

    fn characters(&mut self, text: &str) {
        for open in &mut self.open {
            open.text.push_str(text);
        }
    }
}

/// Fans every event out to two handlers.
pub struct TeeHandler<'a> {
    first: &'a mut dyn ContentHandler,
    second: &'a mut dyn ContentHandler,
}

impl<'a> TeeHandler<'a> {
    pub fn new(first: &'a mut dyn ContentHandler, second: &'a mut dyn ContentHandler) -> Self {
        Self { first, second }
    }
}

impl ContentHandler for TeeHandler<'_> {
    fn start_element(&mut self, name: &str, attributes: &Attributes<'_>) {
        self.first.start_element(name, attributes);
        self.second.start_element(name, attributes);
    }

    fn end_element(&mut self, name: &str) {
        self.first.end_element(name);
        self.second.end_element(name);
    }

    fn characters(&mut self, text: &str) {
        self.first.characters(text);
        self.second.characters(text);
    }

    fn ignorable_whitespace(&mut self, text: &str) {
        self.first.ignorable_whitespace(text);
        self.second.ignorable_whitespace(text);
    }
}

const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "h1", "h2", "h3", "h4", "h5", "h6", "li", "ul", "ol", "dl", "dt", "dd", "table",
    "tr", "blockquote", "pre", "section", "article", "header", "footer", "address", "form",
];

/// Decoder-side helper that keeps text layout consistent: a line break after
/// every block element and for every `br`.
pub struct XhtmlWriter<'a> {
    handler: &'a mut dyn ContentHandler,
}

impl<'a> XhtmlWriter<'a> {
    pub fn new(handler: &'a mut dyn ContentHandler) -> Self {
        Self { handler }
    }

    pub fn start_element(&mut self, name: &str, attributes: &Attributes<'_>) {
        self.handler.start_element(name, attributes);
        if name == "br" {
            self.handler.ignorable_whitespace("\n");
        }
    }

    pub fn end_element(&mut self, name: &str) {
        self.handler.end_element(name);
        if BLOCK_ELEMENTS.contains(&name) {
            self.handler.ignorable_whitespace("\n");
        }
    }

    pub fn characters(&mut self, text: &str) {
        if !text.is_empty() {
            self.handler.characters(text);
        }
    }

    /// A complete element holding only text.
    pub fn element(&mut self, name: &str, text: &str) {
        self.start_element(name, &[]);
        self.characters(text);
        self.end_element(name);
    }

    pub fn handler(&mut self) -> &mut dyn ContentHandler {
        &mut *self.handler
    }
}
