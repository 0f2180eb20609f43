//! Detección de contenedores y escaneo de segmentos con metadata.
//!
//! [`ImageContainer::parse`] identifica el formato por su firma y recorre la
//! estructura nativa (marcadores JPEG, chunks PNG/RIFF o IFDs TIFF) sin
//! interpretar el contenido de la metadata. El resultado son vistas
//! `ByteRange` sobre un único buffer prestado.

pub mod detect;
pub mod ifd;
pub(crate) mod jpeg;
pub(crate) mod png;
pub(crate) mod tiff;
pub(crate) mod webp;

use crate::config::Limits;
use crate::error::{DecodeIssue, Result};
use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

pub use detect::detect_format;

/// Formatos de contenedor reconocidos.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Tiff,
    Webp,
    Unknown,
}

impl ImageFormat {
    pub fn name(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "JPEG",
            ImageFormat::Png => "PNG",
            ImageFormat::Tiff => "TIFF",
            ImageFormat::Webp => "WEBP",
            ImageFormat::Unknown => "UNKNOWN",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Tiff => "image/tiff",
            ImageFormat::Webp => "image/webp",
            ImageFormat::Unknown => "application/octet-stream",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Tipo de carga que transporta un segmento.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    Exif,
    Iptc,
    Xmp,
    /// Texto libre: chunks textuales PNG y comentarios JPEG.
    Text,
    Other,
}

impl SegmentKind {
    /// Indica si el segmento se elimina en la limpieza por defecto.
    pub fn is_metadata(self) -> bool {
        !matches!(self, SegmentKind::Other)
    }
}

/// Vista `(inicio, longitud)` dentro del buffer de entrada.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ByteRange {
    pub start: usize,
    pub len: usize,
}

impl ByteRange {
    pub fn new(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    pub fn from_bounds(start: usize, end: usize) -> Self {
        Self {
            start,
            len: end.saturating_sub(start),
        }
    }

    pub fn end(&self) -> usize {
        self.start + self.len
    }

    pub fn overlaps(&self, other: &ByteRange) -> bool {
        self.start < other.end() && other.start < self.end()
    }

    pub fn slice<'a>(&self, data: &'a [u8]) -> Option<&'a [u8]> {
        data.get(self.start..self.end())
    }
}

/// Identificador del elemento del contenedor del que procede un segmento.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Marker {
    /// Segundo byte del marcador JPEG (`0xE1` para APP1, etc.).
    Jpeg(u8),
    /// Tipo de chunk PNG.
    PngChunk([u8; 4]),
    /// FourCC de un chunk RIFF.
    RiffChunk([u8; 4]),
    /// Cadena de IFDs de un TIFF nativo.
    TiffIfd,
    /// Etiqueta TIFF que embebe otra carga (XMP, IPTC).
    TiffTag(u16),
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Marker::Jpeg(code) => write!(f, "FF{code:02X}"),
            Marker::PngChunk(kind) | Marker::RiffChunk(kind) => {
                f.write_str(&String::from_utf8_lossy(kind))
            }
            Marker::TiffIfd => f.write_str("IFD"),
            Marker::TiffTag(tag) => write!(f, "tag {tag:#06x}"),
        }
    }
}

/// Región del contenedor con metadata.
///
/// `range` cubre los bytes que desaparecen al eliminarla (cabeceras de
/// marcador/chunk incluidas); `payload` es lo que recibe el decodificador.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Segment {
    pub kind: SegmentKind,
    pub range: ByteRange,
    pub payload: ByteRange,
    pub marker: Marker,
}

/// Resultado de un escaneo, parcial o completo.
#[derive(Debug, Default)]
pub(crate) struct ScanOutcome {
    pub segments: Vec<Segment>,
    pub pixel_regions: Vec<ByteRange>,
    pub partial: bool,
    pub issues: Vec<DecodeIssue>,
    /// Fin de la última estructura reconocida; lo posterior es basura final.
    pub structure_end: usize,
    max_segments: usize,
    max_chunks: usize,
    walked: usize,
}

impl ScanOutcome {
    pub fn new(limits: &Limits, structure_end: usize) -> Self {
        Self {
            max_segments: limits.max_segments,
            max_chunks: limits.max_chunks,
            structure_end,
            ..Self::default()
        }
    }

    /// Registra un segmento; devuelve `false` si se alcanzó el límite.
    pub fn push_segment(&mut self, segment: Segment) -> bool {
        if self.segments.len() >= self.max_segments {
            self.stop(DecodeIssue::LimitExceeded {
                resource: "segmentos",
                limit: self.max_segments,
            });
            return false;
        }
        debug!(
            kind = ?segment.kind,
            marker = %segment.marker,
            start = segment.range.start,
            len = segment.range.len,
            "segmento encontrado"
        );
        self.segments.push(segment);
        true
    }

    pub fn push_pixels(&mut self, region: ByteRange) {
        self.pixel_regions.push(region);
    }

    /// Cuenta un elemento recorrido; devuelve `false` si se superó el límite.
    pub fn tick(&mut self) -> bool {
        self.walked += 1;
        if self.walked > self.max_chunks {
            self.stop(DecodeIssue::LimitExceeded {
                resource: "chunks",
                limit: self.max_chunks,
            });
            return false;
        }
        true
    }

    /// Marca el escaneo como parcial con el problema que lo detuvo.
    pub fn stop(&mut self, issue: DecodeIssue) {
        warn!(%issue, "escaneo interrumpido");
        self.partial = true;
        self.issues.push(issue);
    }

    /// Registra un problema que descarta un elemento sin detener el escaneo.
    pub fn skip(&mut self, issue: DecodeIssue) {
        warn!(%issue, "segmento descartado");
        self.partial = true;
        self.issues.push(issue);
    }
}

/// Contenedor escaneado. Solo guarda vistas sobre `data`.
#[derive(Debug)]
pub struct ImageContainer<'a> {
    data: &'a [u8],
    format: ImageFormat,
    segments: Vec<Segment>,
    pixel_regions: Vec<ByteRange>,
    partial: bool,
    issues: Vec<DecodeIssue>,
    structure_end: usize,
}

impl<'a> ImageContainer<'a> {
    /// Detecta el formato y recorre su estructura.
    ///
    /// Falla solo si el formato no se reconoce o si la entrada es demasiado
    /// corta para la estructura mínima; cualquier otro problema deja el
    /// contenedor marcado como parcial.
    pub fn parse(data: &'a [u8], limits: &Limits) -> Result<Self> {
        let format = detect_format(data)?;
        let outcome = match format {
            ImageFormat::Jpeg => jpeg::scan(data, limits)?,
            ImageFormat::Png => png::scan(data, limits)?,
            ImageFormat::Tiff => tiff::scan(data, limits)?,
            ImageFormat::Webp => webp::scan(data, limits)?,
            ImageFormat::Unknown => return Err(crate::error::StripError::UnsupportedFormat),
        };

        debug!(
            %format,
            segments = outcome.segments.len(),
            pixel_regions = outcome.pixel_regions.len(),
            partial = outcome.partial,
            "contenedor escaneado"
        );

        Ok(Self {
            data,
            format,
            segments: outcome.segments,
            pixel_regions: outcome.pixel_regions,
            partial: outcome.partial,
            issues: outcome.issues,
            structure_end: outcome.structure_end,
        })
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Segmentos que contienen metadata, en orden de escaneo.
    pub fn metadata_segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter().filter(|segment| segment.kind.is_metadata())
    }

    pub fn pixel_regions(&self) -> &[ByteRange] {
        &self.pixel_regions
    }

    pub fn is_partial(&self) -> bool {
        self.partial
    }

    pub fn issues(&self) -> &[DecodeIssue] {
        &self.issues
    }

    pub(crate) fn structure_end(&self) -> usize {
        self.structure_end
    }

    /// Bytes que recibe el decodificador del segmento.
    pub fn payload(&self, segment: &Segment) -> &'a [u8] {
        segment.payload.slice(self.data).unwrap_or_default()
    }

    /// Bytes de una región de píxeles.
    pub fn pixels(&self, region: &ByteRange) -> &'a [u8] {
        region.slice(self.data).unwrap_or_default()
    }
}

/// Lee un `u16` big-endian con comprobación de límites.
pub(crate) fn be_u16(data: &[u8], offset: usize) -> Option<u16> {
    let bytes: [u8; 2] = data.get(offset..offset.checked_add(2)?)?.try_into().ok()?;
    Some(u16::from_be_bytes(bytes))
}

pub(crate) fn be_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes: [u8; 4] = data.get(offset..offset.checked_add(4)?)?.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}

pub(crate) fn le_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes: [u8; 4] = data.get(offset..offset.checked_add(4)?)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    fn assert_disjoint(container: &ImageContainer<'_>) {
        let mut ranges: Vec<ByteRange> = container.segments().iter().map(|s| s.range).collect();
        ranges.extend_from_slice(container.pixel_regions());
        for (index, a) in ranges.iter().enumerate() {
            for b in &ranges[index + 1..] {
                assert!(!a.overlaps(b), "{a:?} se solapa con {b:?}");
            }
        }
    }

    #[test]
    fn segments_never_overlap_pixel_regions() {
        let limits = Limits::default();
        let samples = [
            fixtures::jpeg_with_everything(),
            fixtures::png_with_everything(),
            fixtures::webp_with_everything(),
            fixtures::tiff_with_metadata(),
        ];
        for sample in &samples {
            let container = ImageContainer::parse(sample, &limits).expect("contenedor válido");
            assert!(!container.is_partial(), "{:?}", container.issues());
            assert!(!container.pixel_regions().is_empty());
            assert_disjoint(&container);
        }
    }

    #[test]
    fn byte_range_overlap_is_half_open() {
        let a = ByteRange::new(0, 4);
        let b = ByteRange::new(4, 4);
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&ByteRange::new(3, 1)));
    }

    #[test]
    fn segment_cap_marks_scan_partial() {
        let limits = Limits {
            max_segments: 2,
            ..Limits::default()
        };
        let bytes = fixtures::jpeg_with_everything();
        let container = ImageContainer::parse(&bytes, &limits).expect("JPEG");
        assert!(container.is_partial());
        assert!(container.segments().len() <= 2);
        assert!(
            container
                .issues()
                .iter()
                .any(|issue| matches!(issue, DecodeIssue::LimitExceeded { .. }))
        );
    }
}
