//! Extraction orchestrator: one file in, one Document (or an explicit error)
//! out.

use crate::config::ExtractionConfig;
use crate::decoders::{
    detect, Decoder, DecoderId, LinkSink, OcrConfig, OcrConfigurator, ParseContext,
    ParserRegistry, PdfConfig, RegistryBuilder, TeeHandler, TextSink,
};
use crate::error::ExtractError;
use crate::language::{normalize, Language, LanguageDetector, NoopDetector, WhatlangDetector};
use crate::metadata::{canonicalize, keys, Metadata};
use crate::types::{Document, ExtractionMethod, Link, ENGINE_NAME};
use anyhow::Result;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Per-document step timings, logged when profiling is on.
pub struct StepProfiler {
    enabled: bool,
    timings: Vec<(&'static str, Duration)>,
}

impl StepProfiler {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            timings: Vec::new(),
        }
    }

    pub fn time_step<F, R>(&mut self, step_name: &'static str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        if !self.enabled {
            return f();
        }

        let start = Instant::now();
        let result = f();
        let elapsed = start.elapsed();

        self.timings.push((step_name, elapsed));
        debug!("{}: {:.0}ms", step_name, elapsed.as_millis());

        result
    }

    pub fn log_summary(&self, path: &Path) {
        if !self.enabled || self.timings.is_empty() {
            return;
        }

        let total: Duration = self.timings.iter().map(|(_, d)| *d).sum();
        let steps = self
            .timings
            .iter()
            .map(|(step, duration)| {
                let percentage = if total.is_zero() {
                    0.0
                } else {
                    duration.as_secs_f64() / total.as_secs_f64() * 100.0
                };
                format!("{step}={}ms ({percentage:.1}%)", duration.as_millis())
            })
            .collect::<Vec<_>>()
            .join(", ");
        info!(
            "Extraction profile for {}: total {}ms [{}]",
            path.display(),
            total.as_millis(),
            steps
        );
    }
}

/// A Document together with the links found in the same decode pass.
#[derive(Debug, Clone)]
pub struct Extracted {
    pub document: Document,
    pub links: Vec<Link>,
}

/// Drives files through the decoder registry.
///
/// Built once by [`ExtractorBuilder`]; everything inside is read-only
/// afterwards, so one instance is shared by reference across workers.
pub struct Extractor {
    config: ExtractionConfig,
    registry: ParserRegistry,
    pdf: PdfConfig,
    ocr: OcrConfig,
    detector: Box<dyn LanguageDetector>,
}

pub struct ExtractorBuilder {
    config: ExtractionConfig,
    registry: RegistryBuilder,
    detector: Option<Box<dyn LanguageDetector>>,
}

impl ExtractorBuilder {
    pub fn new(config: ExtractionConfig) -> Self {
        Self {
            config,
            registry: RegistryBuilder::with_defaults(),
            detector: None,
        }
    }

    /// Start from `registry` instead of the built-in decoders.
    pub fn registry(mut self, registry: RegistryBuilder) -> Self {
        self.registry = registry;
        self
    }

    pub fn register<D: Decoder + 'static>(mut self, decoder: D) -> Self {
        self.registry.register(decoder);
        self
    }

    pub fn detector<L: LanguageDetector + 'static>(mut self, detector: L) -> Self {
        self.detector = Some(Box::new(detector));
        self
    }

    pub fn build(self) -> Result<Extractor> {
        let Self {
            config,
            mut registry,
            detector,
        } = self;
        config.validate()?;

        #[cfg(feature = "jni-backend")]
        if config.tika.is_configured() && !registry.contains(DecoderId::TIKA) {
            registry.register(crate::decoders::TikaJniDecoder::new(&config.tika)?);
        }

        let mut pdf = PdfConfig::DEFAULT;
        let mut ocr = config.ocr.clone();
        OcrConfigurator::new(config.ocr_enabled, config.language).apply(
            &mut registry,
            &mut pdf,
            &mut ocr,
        );

        let detector: Box<dyn LanguageDetector> = match detector {
            Some(detector) => detector,
            None if config.language_detection.enabled => Box::new(WhatlangDetector::new(
                config.language_detection.min_confidence,
            )),
            None => Box::new(NoopDetector),
        };

        let registry = registry.build();
        info!(
            "Extractor ready: {} decoders, {} excluded media types",
            registry.descriptors().iter().filter(|d| d.is_enabled()).count(),
            registry.excluded_types().len()
        );

        Ok(Extractor {
            config,
            registry,
            pdf,
            ocr,
            detector,
        })
    }
}

impl Extractor {
    pub fn new(config: ExtractionConfig) -> Result<Self> {
        ExtractorBuilder::new(config).build()
    }

    pub fn builder(config: ExtractionConfig) -> ExtractorBuilder {
        ExtractorBuilder::new(config)
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    pub fn registry(&self) -> &ParserRegistry {
        &self.registry
    }

    pub fn pdf_config(&self) -> &PdfConfig {
        &self.pdf
    }

    pub fn ocr_config(&self) -> &OcrConfig {
        &self.ocr
    }

    /// Extract `path`, logging and swallowing any per-file failure.
    pub fn parse(&self, path: &Path) -> Option<Document> {
        match self.extract_file(path) {
            Ok(document) => Some(document),
            Err(e) if e.is_rejection() => {
                warn!("Skipping {}: {}", path.display(), e);
                None
            }
            Err(e) => {
                error!("Extraction failed for {}: {}", path.display(), e);
                None
            }
        }
    }

    pub fn extract_file(&self, path: &Path) -> Result<Document, ExtractError> {
        self.extract_file_with_links(path)
            .map(|extracted| extracted.document)
    }

    pub fn extract_file_with_links(&self, path: &Path) -> Result<Extracted, ExtractError> {
        let mut profiler = StepProfiler::new(self.config.profile);
        let bytes = profiler
            .time_step("read", || std::fs::read(path))
            .map_err(|source| ExtractError::StreamOpen {
                path: path.to_path_buf(),
                source,
            })?;
        self.extract_bytes(path, &bytes, profiler)
    }

    /// Extract from an already open stream; `path` names the Document.
    pub fn extract_reader<R: Read>(
        &self,
        path: &Path,
        mut reader: R,
    ) -> Result<Extracted, ExtractError> {
        let mut profiler = StepProfiler::new(self.config.profile);
        let mut bytes = Vec::new();
        profiler
            .time_step("read", || reader.read_to_end(&mut bytes))
            .map_err(|source| ExtractError::StreamOpen {
                path: path.to_path_buf(),
                source,
            })?;
        self.extract_bytes(path, &bytes, profiler)
    }

    fn extract_bytes(
        &self,
        path: &Path,
        bytes: &[u8],
        mut profiler: StepProfiler,
    ) -> Result<Extracted, ExtractError> {
        let mut metadata = Metadata::new();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        if let Some(name) = &name {
            metadata.set(keys::RESOURCE_NAME, name.as_str());
        }
        metadata.set(keys::CONTENT_LENGTH, bytes.len().to_string());

        let media_type = profiler.time_step("detect", || detect::detect(bytes, name.as_deref()));
        metadata.set_if_absent(keys::CONTENT_TYPE, media_type.as_str());

        let mut text = TextSink::new();
        let mut links = LinkSink::new();
        let context = ParseContext::new(&self.registry, &self.pdf, &self.ocr);
        let decoder = profiler.time_step("decode", || {
            let mut tee = TeeHandler::new(&mut text, &mut links);
            self.registry
                .dispatch(bytes, &media_type, &mut tee, &mut metadata, &context)
        })?;

        let content = text.into_string().trim().to_string();
        profiler.time_step("language", || self.detect_language(&content, &mut metadata));

        let canonical = canonicalize(metadata);
        let document = Document::new(
            absolute_path(path),
            content,
            canonical.content_language.unwrap_or(Language::Unknown),
            canonical
                .content_encoding
                .map(str::to_string)
                .unwrap_or_else(|| self.config.default_encoding.to_string()),
            canonical.mime_type(),
            canonical.entries,
            self.extraction_method(decoder),
        );

        profiler.log_summary(path);
        debug!(
            "Extracted {} ({}, {} chars, {})",
            path.display(),
            document.mime_type(),
            document.content().len(),
            document.language()
        );

        Ok(Extracted {
            document,
            links: links.into_links(),
        })
    }

    /// A confident guess overrides any decoder-reported language; an
    /// inconclusive one leaves metadata untouched.
    fn detect_language(&self, content: &str, metadata: &mut Metadata) {
        let Some(detection) = self.detector.detect(content) else {
            debug!("Language detection inconclusive");
            return;
        };
        let language = normalize(&detection.language);
        if let Some(code) = language.iso6391() {
            metadata.set(keys::CONTENT_LANGUAGE, code);
            metadata.set(
                keys::CONTENT_LANGUAGE_BELIEF,
                format!("{:.4}", detection.confidence),
            );
        }
    }

    fn extraction_method(&self, decoder: DecoderId) -> ExtractionMethod {
        ExtractionMethod {
            engine: ENGINE_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            decoder: decoder.to_string(),
            ocr_enabled: self.config.ocr_enabled,
            ocr_language: self.ocr.language.as_deref().map(str::to_string),
        }
    }
}

fn absolute_path(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::{Detection, RawLanguage};
    use std::io::Write;

    struct FixedDetector(Option<RawLanguage>);

    impl LanguageDetector for FixedDetector {
        fn detect(&self, _text: &str) -> Option<Detection> {
            self.0.clone().map(|language| Detection {
                language,
                confidence: 0.9,
            })
        }
    }

    fn write_file(dir: &tempfile::TempDir, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::File::create(&path)
            .unwrap()
            .write_all(contents)
            .unwrap();
        path
    }

    #[test]
    fn test_text_file_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "note.txt", b"plain words");
        let extractor = Extractor::builder(ExtractionConfig::default())
            .detector(FixedDetector(Some(RawLanguage::Other("it".to_string()))))
            .build()
            .unwrap();

        let document = extractor.extract_file(&path).unwrap();
        assert_eq!(document.content(), "plain words");
        assert_eq!(document.language(), Language::English);
        assert_eq!(document.encoding(), "UTF-8");
        assert_eq!(document.mime_type(), "text/plain; charset=UTF-8");
        assert!(document.path().is_absolute());
        assert_eq!(document.metadata()[keys::RESOURCE_NAME], "note.txt");
        assert_eq!(document.metadata()[keys::CONTENT_LENGTH], "11");
        assert_eq!(document.metadata()[keys::CONTENT_LANGUAGE_BELIEF], "0.9000");
        assert_eq!(document.extraction_method().decoder, "text");
        assert_eq!(document.extraction_method().engine, ENGINE_NAME);
    }

    #[test]
    fn test_inconclusive_detection_keeps_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "digits.txt", b"12345");
        let extractor = Extractor::builder(ExtractionConfig::default())
            .detector(FixedDetector(None))
            .build()
            .unwrap();

        let document = extractor.extract_file(&path).unwrap();
        assert_eq!(document.language(), Language::Unknown);
        assert!(!document.metadata().contains_key(keys::CONTENT_LANGUAGE));
    }

    #[test]
    fn test_missing_file_is_stream_open_error() {
        let extractor = Extractor::new(ExtractionConfig::default()).unwrap();
        let err = extractor
            .extract_file(Path::new("/nonexistent/missing.txt"))
            .unwrap_err();
        assert!(matches!(err, ExtractError::StreamOpen { .. }));
        assert!(extractor.parse(Path::new("/nonexistent/missing.txt")).is_none());
    }

    #[test]
    fn test_reader_input_and_links() {
        let extractor = Extractor::builder(ExtractionConfig::default())
            .detector(NoopDetector)
            .build()
            .unwrap();
        let html = br#"<html><body><p>Go <a href="https://example.org">there</a></p></body></html>"#;

        let extracted = extractor
            .extract_reader(Path::new("page.html"), &html[..])
            .unwrap();
        assert_eq!(extracted.document.content(), "Go there");
        assert_eq!(extracted.links.len(), 1);
        assert_eq!(extracted.links[0].uri, "https://example.org");
        assert_eq!(extracted.document.extraction_method().decoder, "html");
    }

    #[test]
    fn test_ocr_switch_reaches_registry() {
        let mut config = ExtractionConfig::default();
        config.ocr_enabled = false;
        let extractor = Extractor::new(config).unwrap();
        assert!(!extractor.registry().contains(DecoderId::OCR));
        assert!(!extractor.pdf_config().extract_inline_images);

        let mut config = ExtractionConfig::default();
        config.ocr_enabled = true;
        config.language = Language::French;
        let extractor = Extractor::new(config).unwrap();
        assert!(extractor.registry().contains(DecoderId::OCR));
        assert!(extractor.pdf_config().extract_inline_images);
        assert_eq!(extractor.ocr_config().language.as_deref(), Some("fra"));
    }

    #[test]
    fn test_profiler_passes_results_through() {
        let mut profiler = StepProfiler::new(true);
        assert_eq!(profiler.time_step("answer", || 42), 42);
        profiler.log_summary(Path::new("x"));
        let mut disabled = StepProfiler::new(false);
        assert_eq!(disabled.time_step("answer", || 7), 7);
    }
}
