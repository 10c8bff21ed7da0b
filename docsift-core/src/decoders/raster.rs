//! Re-encoding of PDF image XObjects into files an OCR engine can read.
//!
//! JPEG and JPEG 2000 streams are already image files. Raw samples (after
//! Flate/LZW decompression) and CCITT fax data are not, so they are decoded
//! to pixels here and written out as PNG.

use crate::error::DecodeError;
use image::{GrayImage, ImageFormat, RgbImage};
use lopdf::{Dictionary, Document as PdfDocument, Object};
use lopdf::xobject::PdfImage;
use std::borrow::Cow;
use std::io::Cursor;
use tracing::debug;

/// An image ready to hand to the registry.
#[derive(Debug)]
pub struct EmbeddedImage<'a> {
    pub bytes: Cow<'a, [u8]>,
    pub media_type: &'static str,
}

/// Parameters of a CCITTFaxDecode stream (`/DecodeParms`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CcittParams {
    /// Negative: Group 4, otherwise Group 3
    pub k: i64,
    pub columns: u16,
    pub rows: Option<u16>,
    pub black_is_1: bool,
}

impl CcittParams {
    fn from_dict(params: Option<&Dictionary>, height: i64) -> Self {
        let int = |key: &[u8]| {
            params
                .and_then(|p| p.get(key).ok())
                .and_then(|v| v.as_i64().ok())
        };
        let black_is_1 = params
            .and_then(|p| p.get(b"BlackIs1").ok())
            .and_then(|v| v.as_bool().ok())
            .unwrap_or(false);
        Self {
            k: int(b"K").unwrap_or(0),
            columns: int(b"Columns")
                .and_then(|c| u16::try_from(c).ok())
                .unwrap_or(1728),
            rows: int(b"Rows")
                .or(Some(height))
                .and_then(|r| u16::try_from(r).ok()),
            black_is_1,
        }
    }
}

/// Turn a page image into an embeddable file, or explain why it cannot be.
pub fn embeddable<'a>(
    pdf: &PdfDocument,
    image: &PdfImage<'a>,
) -> Result<EmbeddedImage<'a>, DecodeError> {
    let filters = image.filters.as_deref().unwrap_or_default();
    let last = filters.last().map(String::as_str);

    match last {
        Some("DCTDecode") => Ok(EmbeddedImage {
            bytes: Cow::Borrowed(image.content),
            media_type: "image/jpeg",
        }),
        Some("JPXDecode") => Ok(EmbeddedImage {
            bytes: Cow::Borrowed(image.content),
            media_type: "image/jp2",
        }),
        Some("CCITTFaxDecode") if filters.len() == 1 => {
            let params = decode_parms(pdf, image.origin_dict);
            let params = CcittParams::from_dict(params, image.height);
            Ok(png(ccitt_to_gray(image.content, &params)?)?)
        }
        None | Some("FlateDecode" | "LZWDecode") => {
            let stream = pdf
                .get_object(image.id)
                .and_then(Object::as_stream)
                .map_err(|e| DecodeError::Malformed(format!("image stream: {e}")))?;
            let samples = stream
                .get_plain_content()
                .map_err(|e| DecodeError::Malformed(format!("image samples: {e}")))?;
            let width = dimension(image.width)?;
            let height = dimension(image.height)?;
            let bits = image.bits_per_component.unwrap_or(8);
            let samples = RawSamples {
                data: &samples,
                width,
                height,
                bits_per_component: bits,
            };
            samples.to_png()
        }
        Some(other) => Err(DecodeError::Malformed(format!(
            "unsupported image encoding {other}"
        ))),
    }
}

fn decode_parms<'d>(pdf: &'d PdfDocument, dict: &'d Dictionary) -> Option<&'d Dictionary> {
    let (_, params) = pdf.dereference(dict.get(b"DecodeParms").ok()?).ok()?;
    match params {
        Object::Dictionary(params) => Some(params),
        Object::Array(array) => array.last().and_then(|p| p.as_dict().ok()),
        _ => None,
    }
}

fn dimension(value: i64) -> Result<u32, DecodeError> {
    u32::try_from(value)
        .ok()
        .filter(|&v| v > 0)
        .ok_or_else(|| DecodeError::Malformed(format!("bad image dimension {value}")))
}

/// Uncompressed image samples in one of the layouts OCR cares about.
struct RawSamples<'a> {
    data: &'a [u8],
    width: u32,
    height: u32,
    bits_per_component: i64,
}

impl RawSamples<'_> {
    fn to_png(&self) -> Result<EmbeddedImage<'static>, DecodeError> {
        let pixels = self.width as usize * self.height as usize;
        match self.bits_per_component {
            8 if self.data.len() >= pixels * 4 => {
                // DeviceCMYK
                let rgb = self.data[..pixels * 4]
                    .chunks_exact(4)
                    .flat_map(|cmyk| {
                        let k = 255 - u16::from(cmyk[3]);
                        cmyk[..3]
                            .iter()
                            .map(move |&c| ((255 - u16::from(c)) * k / 255) as u8)
                    })
                    .collect();
                png(Raster::Rgb(self.rgb(rgb)?))
            }
            8 if self.data.len() >= pixels * 3 => {
                png(Raster::Rgb(self.rgb(self.data[..pixels * 3].to_vec())?))
            }
            8 if self.data.len() >= pixels => {
                png(Raster::Gray(self.gray(self.data[..pixels].to_vec())?))
            }
            1 => {
                let row_bytes = (self.width as usize).div_ceil(8);
                if self.data.len() < row_bytes * self.height as usize {
                    return Err(self.short());
                }
                let gray = self
                    .data
                    .chunks_exact(row_bytes)
                    .take(self.height as usize)
                    .flat_map(|row| {
                        (0..self.width as usize)
                            .map(move |x| if row[x / 8] & (0x80 >> (x % 8)) != 0 { 255 } else { 0 })
                    })
                    .collect();
                png(Raster::Gray(self.gray(gray)?))
            }
            8 => Err(self.short()),
            bits => Err(DecodeError::Malformed(format!(
                "unsupported {bits}-bit image samples"
            ))),
        }
    }

    fn gray(&self, data: Vec<u8>) -> Result<GrayImage, DecodeError> {
        GrayImage::from_raw(self.width, self.height, data).ok_or_else(|| self.short())
    }

    fn rgb(&self, data: Vec<u8>) -> Result<RgbImage, DecodeError> {
        RgbImage::from_raw(self.width, self.height, data).ok_or_else(|| self.short())
    }

    fn short(&self) -> DecodeError {
        DecodeError::Malformed(format!(
            "{} bytes of samples for a {}x{} image",
            self.data.len(),
            self.width,
            self.height
        ))
    }
}

enum Raster {
    Gray(GrayImage),
    Rgb(RgbImage),
}

fn png(raster: Raster) -> Result<EmbeddedImage<'static>, DecodeError> {
    let mut output = Cursor::new(Vec::new());
    let written = match &raster {
        Raster::Gray(image) => image.write_to(&mut output, ImageFormat::Png),
        Raster::Rgb(image) => image.write_to(&mut output, ImageFormat::Png),
    };
    written.map_err(|e| DecodeError::Malformed(format!("PNG encoding failed: {e}")))?;
    Ok(EmbeddedImage {
        bytes: Cow::Owned(output.into_inner()),
        media_type: "image/png",
    })
}

/// Decode CCITT Group 3/4 data to 8-bit gray, white 255 and black 0.
fn ccitt_to_gray(data: &[u8], params: &CcittParams) -> Result<Raster, DecodeError> {
    use fax::decoder;

    let width = usize::from(params.columns);
    let mut gray = Vec::new();
    let mut rows = 0u32;
    let mut push_row = |transitions: &[u16]| {
        gray.extend(transitions_to_gray(transitions, width));
        rows += 1;
    };

    let decoded = if params.k < 0 {
        decoder::decode_g4(data.iter().copied(), params.columns, params.rows, &mut push_row)
    } else {
        decoder::decode_g3(data.iter().copied(), &mut push_row)
    };
    if decoded.is_none() || rows == 0 {
        return Err(DecodeError::Malformed(format!(
            "CCITT decoding failed ({} bytes, K={})",
            data.len(),
            params.k
        )));
    }
    debug!("CCITT decoded {} rows of {} columns", rows, width);

    if params.black_is_1 {
        gray.iter_mut().for_each(|value| *value = !*value);
    }
    GrayImage::from_raw(u32::from(params.columns), rows, gray)
        .map(Raster::Gray)
        .ok_or_else(|| DecodeError::Malformed("CCITT row size mismatch".to_string()))
}

/// Transition positions alternate white→black→white, starting white.
fn transitions_to_gray(transitions: &[u16], width: usize) -> Vec<u8> {
    let mut row = vec![255u8; width];
    let mut start = 0usize;
    let mut black = false;
    for &position in transitions {
        let end = usize::from(position).min(width);
        if black {
            row[start.min(end)..end].fill(0);
        }
        start = end;
        black = !black;
    }
    if black {
        row[start..].fill(0);
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_fill_black_runs() {
        assert_eq!(
            transitions_to_gray(&[2, 4, 6], 8),
            vec![255, 255, 0, 0, 255, 255, 0, 0]
        );
        assert_eq!(transitions_to_gray(&[], 3), vec![255, 255, 255]);
    }

    #[test]
    fn test_gray_samples_become_png() {
        let samples = RawSamples {
            data: &[0, 128, 255, 64],
            width: 2,
            height: 2,
            bits_per_component: 8,
        };
        let image = samples.to_png().unwrap();
        assert_eq!(image.media_type, "image/png");
        assert!(image.bytes.starts_with(b"\x89PNG\r\n\x1a\n"));
    }

    #[test]
    fn test_bilevel_samples_are_unpacked() {
        let samples = RawSamples {
            data: &[0b1010_0000, 0b0101_0000],
            width: 4,
            height: 2,
            bits_per_component: 1,
        };
        assert!(samples.to_png().is_ok());
    }

    #[test]
    fn test_truncated_samples_are_rejected() {
        let samples = RawSamples {
            data: &[0, 0, 0],
            width: 2,
            height: 2,
            bits_per_component: 8,
        };
        assert!(matches!(samples.to_png(), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_ccitt_params_defaults() {
        let params = CcittParams::from_dict(None, 40);
        assert_eq!(params.k, 0);
        assert_eq!(params.columns, 1728);
        assert_eq!(params.rows, Some(40));
        assert!(!params.black_is_1);
    }
}
