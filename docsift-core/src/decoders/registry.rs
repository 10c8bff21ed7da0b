//! Decoder registry.
//!
//! The registry is an explicit descriptor table keyed by [`DecoderId`]. It is
//! assembled with a [`RegistryBuilder`], where decoders can be registered and
//! excluded, and frozen by [`RegistryBuilder::build`]. The built
//! [`ParserRegistry`] has no mutators and is shared by every worker.

use super::{
    ContentHandler, Decoder, DecoderId, HtmlDecoder, MediaType, OcrDecoder, ParseContext,
    PdfDecoder, TextDecoder,
};
use crate::error::{DecodeError, ExtractError};
use crate::metadata::Metadata;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;

/// One registry entry.
pub struct ParserDescriptor {
    id: DecoderId,
    media_types: BTreeSet<MediaType>,
    enabled: bool,
    decoder: Arc<dyn Decoder>,
}

impl ParserDescriptor {
    fn new(decoder: Arc<dyn Decoder>) -> Self {
        Self {
            id: decoder.id(),
            media_types: decoder.supported_types().into_iter().collect(),
            enabled: true,
            decoder,
        }
    }

    pub fn id(&self) -> DecoderId {
        self.id
    }

    pub fn media_types(&self) -> &BTreeSet<MediaType> {
        &self.media_types
    }

    /// False once the decoder has been excluded.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn decoder(&self) -> &dyn Decoder {
        self.decoder.as_ref()
    }
}

impl std::fmt::Debug for ParserDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserDescriptor")
            .field("id", &self.id)
            .field("media_types", &self.media_types)
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Mutable, configuration-time view of the registry.
#[derive(Default)]
pub struct RegistryBuilder {
    descriptors: Vec<ParserDescriptor>,
    excluded: BTreeSet<MediaType>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Base registry with every built-in decoder.
    pub fn with_defaults() -> Self {
        let mut builder = Self::new();
        builder
            .register(TextDecoder::new())
            .register(HtmlDecoder::new())
            .register(PdfDecoder::new())
            .register(OcrDecoder::new());
        builder
    }

    /// Register a decoder, replacing any entry with the same id. Its media
    /// types stop being excluded.
    pub fn register<D: Decoder + 'static>(&mut self, decoder: D) -> &mut Self {
        self.register_shared(Arc::new(decoder))
    }

    pub fn register_shared(&mut self, decoder: Arc<dyn Decoder>) -> &mut Self {
        let descriptor = ParserDescriptor::new(decoder);
        self.descriptors.retain(|existing| existing.id != descriptor.id);
        for media_type in &descriptor.media_types {
            self.excluded.remove(media_type);
        }
        debug!(
            "Registered decoder {} for {} media types",
            descriptor.id,
            descriptor.media_types.len()
        );
        self.descriptors.push(descriptor);
        self
    }

    /// Disable every entry for `id` and record the media types they claimed
    /// as excluded. Returns the number of entries disabled.
    pub fn exclude(&mut self, id: DecoderId) -> usize {
        let mut disabled = 0;
        for descriptor in self
            .descriptors
            .iter_mut()
            .filter(|d| d.id == id && d.enabled)
        {
            descriptor.enabled = false;
            self.excluded.extend(descriptor.media_types.iter().cloned());
            disabled += 1;
        }
        debug!("Excluded decoder {id} ({disabled} entries)");
        disabled
    }

    pub fn contains(&self, id: DecoderId) -> bool {
        self.descriptors.iter().any(|d| d.id == id && d.enabled)
    }

    pub fn excluded_types(&self) -> &BTreeSet<MediaType> {
        &self.excluded
    }

    /// Freeze the table. When several decoders claim one media type the
    /// last registered wins.
    pub fn build(self) -> ParserRegistry {
        let mut by_type = HashMap::new();
        for (index, descriptor) in self.descriptors.iter().enumerate() {
            if !descriptor.enabled {
                continue;
            }
            for media_type in &descriptor.media_types {
                by_type.insert(media_type.clone(), index);
            }
        }

        ParserRegistry {
            descriptors: self.descriptors,
            by_type,
            excluded: self.excluded,
        }
    }
}

/// Frozen decoder table. Holds no per-call state.
pub struct ParserRegistry {
    descriptors: Vec<ParserDescriptor>,
    by_type: HashMap<MediaType, usize>,
    excluded: BTreeSet<MediaType>,
}

impl ParserRegistry {
    pub fn descriptors(&self) -> &[ParserDescriptor] {
        &self.descriptors
    }

    pub fn descriptor(&self, id: DecoderId) -> Option<&ParserDescriptor> {
        self.descriptors.iter().find(|d| d.id == id)
    }

    /// True if an enabled entry exists for `id`.
    pub fn contains(&self, id: DecoderId) -> bool {
        self.descriptor(id).is_some_and(ParserDescriptor::is_enabled)
    }

    pub fn excluded_types(&self) -> &BTreeSet<MediaType> {
        &self.excluded
    }

    pub fn is_excluded(&self, media_type: &MediaType) -> bool {
        self.excluded.contains(media_type)
    }

    /// Decoder claiming `media_type`. Unclaimed `text/*` types fall back to
    /// `text/plain` unless the type itself is excluded.
    pub fn lookup(&self, media_type: &MediaType) -> Option<&ParserDescriptor> {
        if let Some(&index) = self.by_type.get(media_type) {
            return Some(&self.descriptors[index]);
        }
        if self.is_excluded(media_type) || !media_type.is_text() {
            return None;
        }
        self.by_type
            .get(&MediaType::from(MediaType::TEXT_PLAIN))
            .map(|&index| &self.descriptors[index])
    }

    /// Decode `input` with the decoder claiming `media_type`. Anything the
    /// registry cannot handle goes to the fallback, which always fails.
    pub fn dispatch(
        &self,
        input: &[u8],
        media_type: &MediaType,
        handler: &mut dyn ContentHandler,
        metadata: &mut Metadata,
        context: &ParseContext<'_>,
    ) -> Result<DecoderId, ExtractError> {
        let fallback = FallbackDecoder {
            excluded: &self.excluded,
        };
        let Some(descriptor) = self.lookup(media_type) else {
            return Err(fallback.reject(media_type));
        };

        debug!("Decoding {} with {}", media_type, descriptor.id);
        match descriptor.decoder.decode(input, handler, metadata, context) {
            Ok(()) => Ok(descriptor.id),
            Err(source) => Err(fallback.reject_failed(descriptor.id, media_type, source)),
        }
    }
}

/// Terminal decoder: turns "nothing could decode this" into an explicit
/// error so an unparseable file never looks like an empty one.
struct FallbackDecoder<'a> {
    excluded: &'a BTreeSet<MediaType>,
}

impl FallbackDecoder<'_> {
    fn reject(&self, media_type: &MediaType) -> ExtractError {
        if self.excluded.contains(media_type) {
            ExtractError::ExcludedType(media_type.clone())
        } else {
            ExtractError::UnsupportedType(media_type.clone())
        }
    }

    fn reject_failed(
        &self,
        decoder: DecoderId,
        media_type: &MediaType,
        source: DecodeError,
    ) -> ExtractError {
        ExtractError::Decode {
            decoder,
            media_type: media_type.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoders::{OcrConfig, PdfConfig, TextSink};

    struct FailingDecoder;

    impl Decoder for FailingDecoder {
        fn id(&self) -> DecoderId {
            DecoderId::new("failing")
        }

        fn supported_types(&self) -> Vec<MediaType> {
            vec![MediaType::from("application/x-broken")]
        }

        fn decode(
            &self,
            _input: &[u8],
            _handler: &mut dyn ContentHandler,
            _metadata: &mut Metadata,
            _context: &ParseContext<'_>,
        ) -> Result<(), DecodeError> {
            Err(DecodeError::Malformed("truncated".to_string()))
        }
    }

    fn dispatch(registry: &ParserRegistry, input: &[u8], media_type: &str) -> Result<(DecoderId, String), ExtractError> {
        let pdf = PdfConfig::default();
        let ocr = OcrConfig::default();
        let context = ParseContext::new(registry, &pdf, &ocr);
        let mut sink = TextSink::new();
        let mut metadata = Metadata::new();
        let id = registry.dispatch(
            input,
            &MediaType::from(media_type),
            &mut sink,
            &mut metadata,
            &context,
        )?;
        Ok((id, sink.into_string()))
    }

    #[test]
    fn test_defaults_register_builtin_decoders() {
        let registry = RegistryBuilder::with_defaults().build();
        for id in [DecoderId::TEXT, DecoderId::HTML, DecoderId::PDF, DecoderId::OCR] {
            assert!(registry.contains(id), "missing {id}");
        }
        assert!(registry.excluded_types().is_empty());
    }

    #[test]
    fn test_exclude_records_media_types() {
        let mut builder = RegistryBuilder::with_defaults();
        assert_eq!(builder.exclude(DecoderId::OCR), 1);
        let registry = builder.build();

        assert!(!registry.contains(DecoderId::OCR));
        assert!(registry.is_excluded(&MediaType::from("image/png")));
        assert!(registry.lookup(&MediaType::from("image/png")).is_none());
        assert!(!registry.descriptor(DecoderId::OCR).unwrap().is_enabled());
    }

    #[test]
    fn test_excluded_type_fails_explicitly() {
        let mut builder = RegistryBuilder::with_defaults();
        builder.exclude(DecoderId::OCR);
        let registry = builder.build();

        let err = dispatch(&registry, b"\x89PNG", "image/png").unwrap_err();
        assert!(matches!(err, ExtractError::ExcludedType(ref t) if t.as_str() == "image/png"));
    }

    #[test]
    fn test_unclaimed_type_is_unsupported() {
        let registry = RegistryBuilder::with_defaults().build();
        let err = dispatch(&registry, &[0, 1, 2], "application/x-unknown").unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedType(_)));
    }

    #[test]
    fn test_decoder_failure_goes_through_fallback() {
        let mut builder = RegistryBuilder::new();
        builder.register(FailingDecoder);
        let registry = builder.build();

        let err = dispatch(&registry, b"x", "application/x-broken").unwrap_err();
        match err {
            ExtractError::Decode { decoder, source, .. } => {
                assert_eq!(decoder.as_str(), "failing");
                assert!(matches!(source, DecodeError::Malformed(_)));
            }
            other => panic!("expected decode failure, got {other:?}"),
        }
    }

    #[test]
    fn test_text_subtypes_fall_back_to_plain_text() {
        let registry = RegistryBuilder::with_defaults().build();
        let (id, text) = dispatch(&registry, b"a,b,c", "text/csv").unwrap();
        assert_eq!(id, DecoderId::TEXT);
        assert!(text.contains("a,b,c"));
    }

    #[test]
    fn test_excluded_text_subtype_does_not_fall_back() {
        let mut builder = RegistryBuilder::with_defaults();
        builder.exclude(DecoderId::HTML);
        let registry = builder.build();

        let err = dispatch(&registry, b"<p>hi</p>", "text/html").unwrap_err();
        assert!(matches!(err, ExtractError::ExcludedType(_)));
    }

    #[test]
    fn test_register_again_lifts_exclusion() {
        let mut builder = RegistryBuilder::with_defaults();
        builder.exclude(DecoderId::OCR);
        builder.register(OcrDecoder::new());
        assert!(builder.contains(DecoderId::OCR));
        assert!(builder.excluded_types().is_empty());
    }
}
