use crate::decoders::OcrConfig;
use crate::language::{Language, WhatlangDetector};
use crate::types::User;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Pipeline configuration, built once at startup and shared by reference.
///
/// Missing YAML keys take the values of [`ExtractionConfig::DEFAULT`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Route images (standalone and inside PDFs) through OCR
    #[serde(alias = "ocrEnabled")]
    pub ocr_enabled: bool,
    /// OCR language hint; NONE/UNKNOWN sets no hint
    pub language: Language,
    /// Document encoding when the decoder declared none
    #[serde(alias = "defaultEncoding")]
    pub default_encoding: Cow<'static, str>,
    pub language_detection: LanguageDetectionConfig,
    pub ocr: OcrConfig,
    pub tika: TikaConfig,
    pub scanner: ScannerConfig,
    pub queue: QueueConfig,
    /// Extraction worker threads draining a scan queue
    pub workers: usize,
    /// Log per-step timings for every document
    pub profile: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageDetectionConfig {
    pub enabled: bool,
    /// Guesses below this confidence count as inconclusive
    pub min_confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TikaConfig {
    pub jre_path: Option<PathBuf>,
    pub jar_path: Option<PathBuf>,
    /// JNI class name exposing `parseToXhtml(byte[])`
    pub main_class: Cow<'static, str>,
    pub jvm_args: Vec<String>,
}

/// Options handed to the path filter and directory walker unmodified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Glob patterns; when non-empty only matching files are enqueued
    pub include: Vec<String>,
    /// Glob patterns for files and directories to skip
    pub exclude: Vec<String>,
    pub follow_symlinks: bool,
    pub max_depth: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Base name; each user gets `<name>_<user id>`
    pub name: Cow<'static, str>,
    /// Bound on queued entries, 0 for unbounded
    pub capacity: usize,
    /// Give up on a blocked push after this long instead of waiting forever
    pub push_timeout_ms: Option<u64>,
}

impl ExtractionConfig {
    pub const DEFAULT: ExtractionConfig = ExtractionConfig {
        ocr_enabled: false,
        language: Language::Unknown,
        default_encoding: Cow::Borrowed("UTF-8"),
        language_detection: LanguageDetectionConfig::DEFAULT,
        ocr: OcrConfig::DEFAULT,
        tika: TikaConfig::DEFAULT,
        scanner: ScannerConfig::DEFAULT,
        queue: QueueConfig::DEFAULT,
        workers: 4,
        profile: false,
    };

    /// Load config from a YAML file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: ExtractionConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load config with fallback to default
    pub fn load_with_fallback(path: Option<&str>) -> Self {
        match path {
            Some(p) => Self::load_from_file(p).unwrap_or_else(|e| {
                warn!("Failed to load config from {}, using defaults: {:#}", p, e);
                Self::default()
            }),
            None => Self::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            bail!("workers must be at least 1");
        }
        let threshold = self.language_detection.min_confidence;
        if !(0.0..=1.0).contains(&threshold) {
            bail!("language_detection.min_confidence must be within 0..=1, got {threshold}");
        }
        if self.queue.name.is_empty() {
            bail!("queue.name must not be empty");
        }
        Ok(())
    }

    /// Name of the queue holding `user`'s scan entries.
    pub fn queue_name(&self, user: &User) -> String {
        format!("{}_{}", self.queue.name, user.id)
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl LanguageDetectionConfig {
    pub const DEFAULT: LanguageDetectionConfig = LanguageDetectionConfig {
        enabled: true,
        min_confidence: WhatlangDetector::DEFAULT_MIN_CONFIDENCE,
    };
}

impl Default for LanguageDetectionConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TikaConfig {
    pub const DEFAULT: TikaConfig = TikaConfig {
        jre_path: None,
        jar_path: None,
        main_class: Cow::Borrowed("org/docsift/tika/TikaBridge"),
        jvm_args: Vec::new(),
    };

    /// Both runtime paths are set.
    pub fn is_configured(&self) -> bool {
        self.jre_path.is_some() && self.jar_path.is_some()
    }
}

impl Default for TikaConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl ScannerConfig {
    pub const DEFAULT: ScannerConfig = ScannerConfig {
        include: Vec::new(),
        exclude: Vec::new(),
        follow_symlinks: false,
        max_depth: None,
    };
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl QueueConfig {
    pub const DEFAULT: QueueConfig = QueueConfig {
        name: Cow::Borrowed("extract:queue"),
        capacity: 1000,
        push_timeout_ms: None,
    };
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_constant_matches_default() {
        let config = ExtractionConfig::default();
        assert_eq!(config, ExtractionConfig::DEFAULT);
        assert!(!config.ocr_enabled);
        assert_eq!(config.language, Language::Unknown);
        assert_eq!(config.default_encoding, "UTF-8");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
ocrEnabled: true
language: GERMAN
scanner:
  exclude: ["*.tmp"]
queue:
  capacity: 10
"#;
        let config: ExtractionConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.ocr_enabled);
        assert_eq!(config.language, Language::German);
        assert_eq!(config.scanner.exclude, vec!["*.tmp".to_string()]);
        assert_eq!(config.queue.capacity, 10);
        assert_eq!(config.queue.name, "extract:queue");
        assert_eq!(config.ocr.tesseract_path, "tesseract");
        assert_eq!(config.workers, 4);
    }

    #[test]
    fn test_queue_name_is_per_user() {
        let config = ExtractionConfig::default();
        assert_eq!(config.queue_name(&User::new("alice")), "extract:queue_alice");
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut config = ExtractionConfig::default();
        config.workers = 0;
        assert!(config.validate().is_err());

        let mut config = ExtractionConfig::default();
        config.language_detection.min_confidence = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file_and_fallback() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "workers: 2\nprofile: true").unwrap();
        let path = file.path().to_str().unwrap();

        let config = ExtractionConfig::load_from_file(path).unwrap();
        assert_eq!(config.workers, 2);
        assert!(config.profile);

        let fallback = ExtractionConfig::load_with_fallback(Some("/nonexistent/docsift.yaml"));
        assert_eq!(fallback, ExtractionConfig::DEFAULT);
    }
}
