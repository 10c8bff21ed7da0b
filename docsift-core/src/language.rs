//! Language detection and normalization.
//!
//! Detection runs a trigram-profile identifier (`whatlang`) over extracted
//! text. Its vocabulary is far wider than what downstream analysis supports,
//! so every raw guess is folded onto the canonical [`Language`] set by
//! [`normalize`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Canonical language set carried by a Document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", try_from = "String")]
pub enum Language {
    English,
    Spanish,
    French,
    German,
    None,
    Unknown,
}

impl Language {
    /// ISO 639-1 code, absent for NONE/UNKNOWN.
    pub fn iso6391(&self) -> Option<&'static str> {
        match self {
            Self::English => Some("en"),
            Self::Spanish => Some("es"),
            Self::French => Some("fr"),
            Self::German => Some("de"),
            Self::None | Self::Unknown => None,
        }
    }

    /// Tesseract traineddata name used as the OCR language hint.
    pub fn ocr_code(&self) -> Option<&'static str> {
        match self {
            Self::English => Some("eng"),
            Self::Spanish => Some("spa"),
            Self::French => Some("fra"),
            Self::German => Some("deu"),
            Self::None | Self::Unknown => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::English => "ENGLISH",
            Self::Spanish => "SPANISH",
            Self::French => "FRENCH",
            Self::German => "GERMAN",
            Self::None => "NONE",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Resolve a metadata value (name, code or language tag) to the canonical
    /// set. Recognised non-canonical languages are normalized; anything
    /// unrecognisable is UNKNOWN.
    pub fn from_metadata_value(value: &str) -> Self {
        if let Ok(language) = value.parse::<Language>() {
            return language;
        }
        RawLanguage::parse(value)
            .map(|raw| normalize(&raw))
            .unwrap_or(Self::Unknown)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseLanguageError(String);

impl fmt::Display for ParseLanguageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown language: {}", self.0)
    }
}

impl std::error::Error for ParseLanguageError {}

impl FromStr for Language {
    type Err = ParseLanguageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "english" | "en" | "eng" => Ok(Self::English),
            "spanish" | "es" | "spa" => Ok(Self::Spanish),
            "french" | "fr" | "fra" | "fre" => Ok(Self::French),
            "german" | "de" | "deu" | "ger" => Ok(Self::German),
            "none" => Ok(Self::None),
            "unknown" => Ok(Self::Unknown),
            _ => Err(ParseLanguageError(s.to_string())),
        }
    }
}

impl TryFrom<String> for Language {
    type Error = ParseLanguageError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A language as reported by a detector or a decoder, before normalization.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RawLanguage {
    English,
    Spanish,
    French,
    German,
    Galician,
    Catalan,
    /// Any other recognised language, keyed by its ISO 639 code.
    Other(String),
}

// ISO 639-1 codes accepted for languages outside the named variants.
const OTHER_ISO6391: &[&str] = &[
    "af", "ar", "bg", "bn", "cs", "da", "el", "eo", "et", "eu", "fa", "fi", "he", "hi", "hr",
    "hu", "hy", "id", "it", "ja", "ka", "ko", "la", "lt", "lv", "mk", "nb", "nl", "nn", "no",
    "pl", "pt", "ro", "ru", "sk", "sl", "sr", "sv", "ta", "th", "tl", "tr", "uk", "ur", "vi",
    "yi", "zh",
];

impl RawLanguage {
    /// Parse a language name, ISO 639-1/639-3 code or BCP-47 tag ("gl-ES").
    pub fn parse(value: &str) -> Option<Self> {
        let lowered = value.trim().to_lowercase();
        let primary = lowered
            .split(|c| c == '-' || c == '_')
            .next()
            .unwrap_or_default();

        let raw = match primary {
            "en" | "eng" | "english" => Self::English,
            "es" | "spa" | "spanish" | "castilian" => Self::Spanish,
            "fr" | "fra" | "fre" | "french" => Self::French,
            "de" | "deu" | "ger" | "german" => Self::German,
            "gl" | "glg" | "galician" => Self::Galician,
            "ca" | "cat" | "catalan" => Self::Catalan,
            code if code.len() == 2 && OTHER_ISO6391.contains(&code) => {
                Self::Other(code.to_string())
            }
            code if code.len() == 3 && whatlang::Lang::from_code(code).is_some() => {
                Self::Other(code.to_string())
            }
            _ => return None,
        };
        Some(raw)
    }

    pub fn from_whatlang(lang: whatlang::Lang) -> Self {
        match lang {
            whatlang::Lang::Eng => Self::English,
            whatlang::Lang::Spa => Self::Spanish,
            whatlang::Lang::Fra => Self::French,
            whatlang::Lang::Deu => Self::German,
            whatlang::Lang::Cat => Self::Catalan,
            other => Self::Other(other.code().to_string()),
        }
    }
}

/// Fold a raw language onto the canonical set.
///
/// Total and deterministic: the four supported languages map to themselves,
/// Galician and Catalan map to Spanish, everything else maps to English.
pub fn normalize(raw: &RawLanguage) -> Language {
    match raw {
        RawLanguage::English => Language::English,
        RawLanguage::Spanish => Language::Spanish,
        RawLanguage::French => Language::French,
        RawLanguage::German => Language::German,
        RawLanguage::Galician | RawLanguage::Catalan => Language::Spanish,
        RawLanguage::Other(_) => Language::English,
    }
}

/// A confident detector guess.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub language: RawLanguage,
    pub confidence: f64,
}

/// Statistical language identification over extracted text.
///
/// Implementations are shared read-only across extraction workers.
pub trait LanguageDetector: Send + Sync {
    /// Best guess for the dominant language, or `None` when inconclusive.
    fn detect(&self, text: &str) -> Option<Detection>;
}

/// Trigram-based detector backed by `whatlang`.
pub struct WhatlangDetector {
    min_confidence: f64,
    max_sample_chars: usize,
}

impl WhatlangDetector {
    /// Large documents are sampled from the start; this many characters are
    /// enough for a stable trigram profile.
    pub const DEFAULT_SAMPLE_CHARS: usize = 10_000;

    /// whatlang scores a word or two of noise well under this, while a
    /// short real sentence clears it.
    pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.15;

    /// Below this many letters there is nothing to profile.
    pub const MIN_LETTERS: usize = 12;

    pub fn new(min_confidence: f64) -> Self {
        Self {
            min_confidence,
            max_sample_chars: Self::DEFAULT_SAMPLE_CHARS,
        }
    }

    pub fn with_sample_chars(mut self, max_sample_chars: usize) -> Self {
        self.max_sample_chars = max_sample_chars;
        self
    }

    fn sample<'a>(&self, text: &'a str) -> &'a str {
        match text.char_indices().nth(self.max_sample_chars) {
            Some((end, _)) => &text[..end],
            None => text,
        }
    }
}

impl Default for WhatlangDetector {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MIN_CONFIDENCE)
    }
}

impl LanguageDetector for WhatlangDetector {
    fn detect(&self, text: &str) -> Option<Detection> {
        let sample = self.sample(text);
        if sample.chars().filter(|c| c.is_alphabetic()).count() < Self::MIN_LETTERS {
            debug!("Too little text for language detection");
            return None;
        }
        let info = whatlang::detect(sample)?;
        if info.confidence() < self.min_confidence {
            debug!(
                "Language guess {:?} below confidence threshold ({:.3} < {:.3})",
                info.lang(),
                info.confidence(),
                self.min_confidence
            );
            return None;
        }
        Some(Detection {
            language: RawLanguage::from_whatlang(info.lang()),
            confidence: info.confidence(),
        })
    }
}

/// Detector used when language detection is switched off.
pub struct NoopDetector;

impl LanguageDetector for NoopDetector {
    fn detect(&self, _text: &str) -> Option<Detection> {
        None
    }
}
