//! OCR through the `tesseract` executable, and the switch that turns the
//! whole image path on or off at pipeline construction.

use super::{
    ContentHandler, Decoder, DecoderId, MediaType, ParseContext, PdfConfig, RegistryBuilder,
    XhtmlWriter,
};
use crate::error::DecodeError;
use crate::language::Language;
use crate::metadata::Metadata;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::io::Write;
use std::process::{Command, Stdio};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Executable name or path
    pub tesseract_path: Cow<'static, str>,
    /// Tesseract `--psm` value
    pub page_segmentation_mode: u8,
    /// Traineddata name passed as `-l`; tesseract's own default when unset
    #[serde(skip)]
    pub language: Option<Cow<'static, str>>,
}

impl OcrConfig {
    pub const DEFAULT: OcrConfig = OcrConfig {
        tesseract_path: Cow::Borrowed("tesseract"),
        page_segmentation_mode: 1,
        language: None,
    };
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Debug, Default)]
pub struct OcrDecoder;

impl OcrDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for OcrDecoder {
    fn id(&self) -> DecoderId {
        DecoderId::OCR
    }

    fn supported_types(&self) -> Vec<MediaType> {
        ["image/png", "image/jpeg", "image/tiff", "image/gif", "image/bmp", "image/jp2"]
            .into_iter()
            .map(MediaType::from)
            .collect()
    }

    fn decode(
        &self,
        input: &[u8],
        handler: &mut dyn ContentHandler,
        metadata: &mut Metadata,
        context: &ParseContext<'_>,
    ) -> Result<(), DecodeError> {
        let config = context.ocr();
        let text = run_tesseract(config, input)?;
        if let Some(language) = &config.language {
            metadata.set("ocr:language", language.as_ref());
        }

        let mut writer = XhtmlWriter::new(handler);
        for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
            writer.element("p", paragraph);
        }
        Ok(())
    }
}

fn run_tesseract(config: &OcrConfig, image: &[u8]) -> Result<String, DecodeError> {
    let tool_error = |message: String| DecodeError::Tool {
        tool: config.tesseract_path.to_string(),
        message,
    };

    let mut command = Command::new(config.tesseract_path.as_ref());
    command
        .arg("stdin")
        .arg("stdout")
        .arg("--psm")
        .arg(config.page_segmentation_mode.to_string());
    if let Some(language) = &config.language {
        command.arg("-l").arg(language.as_ref());
    }
    debug!("Running {:?}", command);

    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| tool_error(format!("cannot start: {e}")))?;

    // The child is reaped even when it stops reading early.
    let written = match child.stdin.take() {
        Some(mut stdin) => stdin.write_all(image),
        None => Ok(()),
    };
    let output = child.wait_with_output()?;
    if let Err(e) = written {
        return Err(tool_error(format!(
            "stopped reading the image ({}): {e}",
            output.status
        )));
    }

    if !output.status.success() {
        return Err(tool_error(format!(
            "exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Applies the OCR on/off decision to the registry and container settings.
///
/// Runs once, before the registry is frozen.
#[derive(Debug, Clone, Copy)]
pub struct OcrConfigurator {
    pub enabled: bool,
    pub language: Language,
}

impl OcrConfigurator {
    pub fn new(enabled: bool, language: Language) -> Self {
        Self { enabled, language }
    }

    pub fn apply(&self, registry: &mut RegistryBuilder, pdf: &mut PdfConfig, ocr: &mut OcrConfig) {
        if self.enabled {
            pdf.extract_inline_images = true;
            pdf.extract_unique_inline_images_only = false;
            if !registry.contains(DecoderId::OCR) {
                registry.register(OcrDecoder::new());
            }
            if let Some(code) = self.language.ocr_code() {
                ocr.language = Some(Cow::Borrowed(code));
            }
            info!(
                "OCR enabled (language hint: {})",
                ocr.language.as_deref().unwrap_or("none")
            );
        } else {
            registry.exclude(DecoderId::OCR);
            pdf.extract_inline_images = false;
            info!("OCR disabled");
        }
    }
}
