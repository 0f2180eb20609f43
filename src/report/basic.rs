//! Información básica de la imagen: formato, dimensiones, modo de color y MIME.

use crate::container::ImageFormat;
use image::{ColorType, ImageDecoder, ImageReader};
use serde::Serialize;
use std::io::Cursor;
use tracing::debug;

const UNKNOWN: &str = "desconocido";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BasicInfo {
    pub format: String,
    /// `"W×H"` o `"desconocido"` si no se pudo leer la cabecera.
    pub size: String,
    pub mode: String,
    pub mime: String,
    #[serde(skip)]
    pub dimensions: Option<(u32, u32)>,
}

/// Lee la cabecera de la imagen sin decodificar los píxeles. Nunca falla.
pub fn basic_info(data: &[u8], format: ImageFormat) -> BasicInfo {
    let mime = infer::get(data)
        .map(|kind| kind.mime_type().to_string())
        .unwrap_or_else(|| format.mime_type().to_string());

    let header = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .ok()
        .and_then(|reader| reader.into_decoder().ok())
        .map(|decoder| (decoder.dimensions(), decoder.color_type()));

    let (dimensions, mode) = match header {
        Some((dimensions, color)) => (Some(dimensions), color_mode(color)),
        None => {
            debug!(%format, "no se pudo leer la cabecera de la imagen");
            (None, UNKNOWN.to_string())
        }
    };

    BasicInfo {
        format: format.name().to_string(),
        size: dimensions.map_or_else(|| UNKNOWN.to_string(), |(w, h)| format!("{w}×{h}")),
        mode,
        mime,
        dimensions,
    }
}

/// Nombre corto del modo de color (`L`, `LA`, `RGB`, `RGBA`, ...).
fn color_mode(color: ColorType) -> String {
    match color {
        ColorType::L8 => "L".to_string(),
        ColorType::L16 => "I;16".to_string(),
        ColorType::La8 | ColorType::La16 => "LA".to_string(),
        ColorType::Rgb8 | ColorType::Rgb16 | ColorType::Rgb32F => "RGB".to_string(),
        ColorType::Rgba8 | ColorType::Rgba16 | ColorType::Rgba32F => "RGBA".to_string(),
        other => format!("{other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn reads_png_header() {
        let info = basic_info(&fixtures::bare_png(), ImageFormat::Png);
        assert_eq!(info.format, "PNG");
        assert_eq!(info.size, "1×1");
        assert_eq!(info.mode, "L");
        assert_eq!(info.mime, "image/png");
    }

    #[test]
    fn unreadable_header_is_not_fatal() {
        let info = basic_info(&[0xFF, 0xD8, 0xFF, 0xD9], ImageFormat::Jpeg);
        assert_eq!(info.size, "desconocido");
        assert_eq!(info.mime, "image/jpeg");
        assert!(info.dimensions.is_none());
    }
}
