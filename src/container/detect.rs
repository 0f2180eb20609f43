//! Detección del formato por número mágico.

use super::ImageFormat;
use crate::error::{Result, StripError};

const JPEG_SIGNATURE: &[u8] = &[0xFF, 0xD8];
const PNG_SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const TIFF_LE_SIGNATURE: &[u8] = b"II*\0";
const TIFF_BE_SIGNATURE: &[u8] = b"MM\0*";
const RIFF_SIGNATURE: &[u8] = b"RIFF";
const WEBP_FORM: &[u8] = b"WEBP";
const WEBP_MIN_LEN: usize = 12;

/// Identifica el contenedor a partir de su prefijo.
///
/// Un prefijo que coincide parcialmente con alguna firma pero es demasiado
/// corto para confirmarla devuelve `TruncatedInput`; uno que no coincide con
/// ninguna, `UnsupportedFormat`.
pub fn detect_format(data: &[u8]) -> Result<ImageFormat> {
    if data.is_empty() {
        return Err(StripError::truncated(JPEG_SIGNATURE.len(), 0));
    }

    let candidates: [(&[u8], ImageFormat); 4] = [
        (JPEG_SIGNATURE, ImageFormat::Jpeg),
        (PNG_SIGNATURE, ImageFormat::Png),
        (TIFF_LE_SIGNATURE, ImageFormat::Tiff),
        (TIFF_BE_SIGNATURE, ImageFormat::Tiff),
    ];

    for (signature, format) in candidates {
        if data.starts_with(signature) {
            return Ok(format);
        }
        if data.len() < signature.len() && signature.starts_with(data) {
            return Err(StripError::truncated(signature.len(), data.len()));
        }
    }

    if data.starts_with(RIFF_SIGNATURE) {
        if data.len() < WEBP_MIN_LEN {
            return Err(StripError::truncated(WEBP_MIN_LEN, data.len()));
        }
        if &data[8..12] == WEBP_FORM {
            return Ok(ImageFormat::Webp);
        }
        return Err(StripError::UnsupportedFormat);
    }
    if data.len() < RIFF_SIGNATURE.len() && RIFF_SIGNATURE.starts_with(data) {
        return Err(StripError::truncated(WEBP_MIN_LEN, data.len()));
    }

    Err(StripError::UnsupportedFormat)
}
