//! Comprobación de la salida reescrita.
//!
//! La salida se vuelve a escanear con el propio escáner y, como segunda
//! opinión, con `kamadak-exif` y el decodificador `png`.

use super::KeepSet;
use crate::config::Limits;
use crate::container::{ImageContainer, ImageFormat, Marker, SegmentKind};
use crate::decode::{decode_segment, exif_tags::TAG_EXIF_POINTER};
use crate::error::{Result, StripError};
use crate::tag::Namespace;
use exif::{Context, In, Reader};
use std::io::Cursor;
use tracing::debug;

pub(super) fn verify(
    original: &ImageContainer<'_>,
    output: &[u8],
    keep: &KeepSet,
    limits: &Limits,
) -> Result<()> {
    let cleaned = ImageContainer::parse(output, limits)
        .map_err(|err| rejected(format!("la salida no se puede escanear: {err}")))?;
    if cleaned.format() != original.format() {
        return Err(rejected(format!(
            "la salida es {} y la entrada {}",
            cleaned.format(),
            original.format()
        )));
    }
    if cleaned.is_partial() {
        return Err(rejected("la salida no se recorre por completo".into()));
    }

    residual_metadata(&cleaned, keep, limits)?;
    same_pixels(original, &cleaned)?;

    if cleaned.format() == ImageFormat::Png {
        png::Decoder::new(Cursor::new(output))
            .read_info()
            .map_err(|err| rejected(format!("PNG inválido tras la limpieza: {err}")))?;
    }
    if matches!(
        cleaned.format(),
        ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::Webp
    ) {
        second_opinion(output, keep)?;
    }
    debug!(format = %cleaned.format(), "salida verificada");
    Ok(())
}

/// Solo puede quedar EXIF con etiquetas conservadas, o la cadena de IFDs de
/// un TIFF nativo sin etiquetas que informar.
fn residual_metadata(cleaned: &ImageContainer<'_>, keep: &KeepSet, limits: &Limits) -> Result<()> {
    for segment in cleaned.metadata_segments() {
        let allowed = segment.kind == SegmentKind::Exif
            && (!keep.is_empty() || segment.marker == Marker::TiffIfd);
        if !allowed {
            return Err(rejected(format!(
                "queda un segmento {:?} en {}",
                segment.kind, segment.marker
            )));
        }
        let outcome = decode_segment(cleaned, segment, limits);
        if let Some(issue) = outcome.issues.first() {
            return Err(rejected(format!("EXIF residual ilegible: {issue}")));
        }
        let unexpected = outcome.tags.iter().find(|tag| {
            tag.namespace != Namespace::Exif
                || !tag.id.numeric().is_some_and(|id| keep.contains(id))
        });
        if let Some(tag) = unexpected {
            return Err(rejected(format!("queda la etiqueta {}", tag.name)));
        }
    }
    Ok(())
}

fn same_pixels(original: &ImageContainer<'_>, cleaned: &ImageContainer<'_>) -> Result<()> {
    let before = original.pixel_regions();
    let after = cleaned.pixel_regions();
    if before.len() != after.len() {
        return Err(rejected(format!(
            "{} regiones de píxeles antes y {} después",
            before.len(),
            after.len()
        )));
    }
    let changed = before
        .iter()
        .zip(after)
        .position(|(a, b)| original.pixels(a) != cleaned.pixels(b));
    match changed {
        Some(index) => Err(rejected(format!("la región de píxeles {index} cambió"))),
        None => Ok(()),
    }
}

/// Lectura independiente con `kamadak-exif`.
fn second_opinion(output: &[u8], keep: &KeepSet) -> Result<()> {
    let mut cursor = Cursor::new(output);
    match Reader::new().read_from_container(&mut cursor) {
        Ok(exif) => {
            let leaked = exif.fields().find(|field| {
                let in_main_ifds = matches!(field.tag.context(), Context::Tiff | Context::Exif)
                    && field.ifd_num == In::PRIMARY;
                let number = field.tag.number();
                !(in_main_ifds && (keep.contains(number) || number == TAG_EXIF_POINTER))
            });
            match leaked {
                Some(field) => Err(rejected(format!("kamadak-exif encontró {}", field.tag))),
                None => Ok(()),
            }
        }
        Err(exif::Error::NotFound(_)) | Err(exif::Error::BlankValue(_)) => Ok(()),
        Err(exif::Error::InvalidFormat(_)) => Ok(()),
        Err(err) => Err(rejected(format!("kamadak-exif no pudo leer la salida: {err}"))),
    }
}

fn rejected(reason: String) -> StripError {
    StripError::UnsafeRewrite(reason)
}
