//! Reescritura de imágenes sin metadata.
//!
//! Cada formato copia la estructura que no es metadata y las regiones de
//! píxeles byte a byte, descarta los segmentos EXIF, IPTC, XMP y de texto, y
//! recalcula las longitudes y sumas de control de lo que emite. Si se pidió
//! conservar algunas etiquetas EXIF, se reconstruye una carga EXIF mínima con
//! ellas. La salida se vuelve a escanear antes de devolverla.

mod exif_writer;
mod jpeg;
mod png;
mod tiff;
mod verify;
mod webp;


use crate::config::Limits;
use crate::container::{ImageContainer, ImageFormat, Segment};
use crate::decode::exif_tags::{
    self, EMBEDDED_PAYLOAD_TAGS, TAG_EXIF_POINTER, TAG_GPS_POINTER, TAG_INTEROP_POINTER,
    TAG_SUB_IFDS,
};
use crate::error::{Result, StripError};
use crate::tag::parse_numeric;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Etiquetas que nunca se conservan: punteros, miniatura JPEG y cargas embebidas.
const NEVER_KEPT: &[u16] = &[
    TAG_EXIF_POINTER,
    TAG_GPS_POINTER,
    TAG_INTEROP_POINTER,
    TAG_SUB_IFDS,
    0x0201,
    0x0202,
];

/// Opciones de limpieza.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizeOptions {
    /// Etiquetas EXIF a conservar, por nombre (`Orientation`) o id (`0x0112`).
    #[serde(default)]
    pub keep: Vec<String>,
}

impl SanitizeOptions {
    pub fn keep<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keep: tags.into_iter().map(Into::into).collect(),
        }
    }
}

/// Lista de conservación ya resuelta a ids de etiqueta de IFD0/EXIF.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct KeepSet {
    tags: BTreeSet<u16>,
}

impl KeepSet {
    pub fn resolve(names: &[String]) -> Result<Self> {
        let mut tags = BTreeSet::new();
        for name in names {
            let trimmed = name.trim();
            let tag = parse_numeric(trimmed)
                .or_else(|| exif_tags::tiff_tag_by_name(trimmed))
                .ok_or_else(|| {
                    StripError::Config(format!("etiqueta a conservar desconocida: '{trimmed}'"))
                })?;
            if NEVER_KEPT.contains(&tag)
                || EMBEDDED_PAYLOAD_TAGS.contains(&tag)
                || exif_tags::is_structural(tag)
            {
                warn!(tag = format_args!("{tag:#06x}"), "la etiqueta no se puede conservar");
                continue;
            }
            tags.insert(tag);
        }
        Ok(Self { tags })
    }

    pub fn contains(&self, tag: u16) -> bool {
        self.tags.contains(&tag)
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

/// Devuelve una copia de la imagen sin metadata.
///
/// Falla con `UnsafeRewrite` si el escaneo fue parcial o si la verificación
/// posterior encuentra metadata residual o píxeles alterados.
pub fn sanitize(
    container: &ImageContainer<'_>,
    options: &SanitizeOptions,
    limits: &Limits,
) -> Result<Vec<u8>> {
    if container.is_partial() {
        return Err(StripError::UnsafeRewrite(format!(
            "la estructura del {} no se pudo recorrer por completo",
            container.format()
        )));
    }
    let keep = KeepSet::resolve(&options.keep)?;

    let output = match container.format() {
        ImageFormat::Jpeg => jpeg::rewrite(container, &keep, limits)?,
        ImageFormat::Png => png::rewrite(container, &keep, limits)?,
        ImageFormat::Webp => webp::rewrite(container, &keep, limits)?,
        ImageFormat::Tiff => tiff::rewrite(container, &keep, limits)?,
        ImageFormat::Unknown => return Err(StripError::UnsupportedFormat),
    };

    verify::verify(container, &output, &keep, limits)?;
    debug!(
        format = %container.format(),
        before = container.data().len(),
        after = output.len(),
        "imagen reescrita"
    );
    Ok(output)
}

/// Copia `data[start..end]` sustituyendo cada segmento de metadata por lo que
/// devuelva `replace` (nada si devuelve `None`).
fn splice<'s, F>(
    data: &[u8],
    start: usize,
    end: usize,
    segments: impl IntoIterator<Item = &'s Segment>,
    mut replace: F,
) -> Result<Vec<u8>>
where
    F: FnMut(&Segment) -> Result<Option<Vec<u8>>>,
{
    let mut ordered: Vec<&Segment> = segments.into_iter().collect();
    ordered.sort_by_key(|segment| segment.range.start);

    let mut out = Vec::with_capacity(end.saturating_sub(start));
    let mut cursor = start;
    for segment in ordered {
        if segment.range.start < cursor || segment.range.end() > end {
            return Err(StripError::UnsafeRewrite(format!(
                "segmento en {} solapado o fuera de la estructura",
                segment.range.start
            )));
        }
        out.extend_from_slice(copy_range(data, cursor, segment.range.start)?);
        if let Some(replacement) = replace(segment)? {
            out.extend_from_slice(&replacement);
        }
        cursor = segment.range.end();
    }
    out.extend_from_slice(copy_range(data, cursor, end)?);
    Ok(out)
}

fn copy_range(data: &[u8], start: usize, end: usize) -> Result<&[u8]> {
    data.get(start..end).ok_or_else(|| {
        StripError::UnsafeRewrite(format!("rango {start}..{end} fuera del archivo"))
    })
}
