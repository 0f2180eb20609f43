//! Decodificadores de segmentos: EXIF, IPTC, XMP y texto libre.
//!
//! Cada decodificador recibe la carga cruda de un segmento y devuelve las
//! etiquetas en orden de aparición junto con los problemas encontrados. Un
//! segmento roto nunca aborta el análisis del resto.

pub mod exif;
pub mod exif_tags;
pub mod iptc;
pub mod text;
pub mod xmp;

use crate::config::Limits;
use crate::container::{ImageContainer, ImageFormat, Marker, Segment, SegmentKind};
use crate::error::DecodeIssue;
use crate::tag::{Namespace, TagId};
use tracing::warn;

/// Longitud máxima, en caracteres, de un valor informado.
pub(crate) const MAX_VALUE_CHARS: usize = 256;

/// Etiqueta decodificada, todavía sin clasificar.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedTag {
    pub namespace: Namespace,
    pub id: TagId,
    pub name: String,
    pub value: String,
}

impl DecodedTag {
    pub(crate) fn new(
        namespace: Namespace,
        id: TagId,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            namespace,
            id,
            name: name.into(),
            value: truncate_value(value.into()),
        }
    }
}

/// Resultado de decodificar un segmento.
#[derive(Clone, Debug, Default)]
pub struct DecodeOutcome {
    pub tags: Vec<DecodedTag>,
    pub issues: Vec<DecodeIssue>,
}

impl DecodeOutcome {
    pub(crate) fn issue(&mut self, issue: DecodeIssue) {
        warn!(%issue, "problema al decodificar segmento");
        self.issues.push(issue);
    }

    pub(crate) fn failed(issue: DecodeIssue) -> Self {
        let mut outcome = Self::default();
        outcome.issue(issue);
        outcome
    }
}

/// Decodifica un segmento según su tipo.
pub fn decode_segment(
    container: &ImageContainer<'_>,
    segment: &Segment,
    limits: &Limits,
) -> DecodeOutcome {
    let payload = container.payload(segment);
    match segment.kind {
        SegmentKind::Exif => {
            let mode = if container.format() == ImageFormat::Tiff
                && segment.marker == Marker::TiffIfd
            {
                exif::ExifMode::Tiff
            } else {
                exif::ExifMode::Embedded
            };
            exif::decode(payload, mode, limits)
        }
        SegmentKind::Iptc => iptc::decode(payload, limits),
        SegmentKind::Xmp => xmp::decode(payload, limits),
        SegmentKind::Text => text::decode(payload, segment.marker),
        SegmentKind::Other => DecodeOutcome::default(),
    }
}

pub(crate) fn truncate_value(value: String) -> String {
    if value.chars().count() <= MAX_VALUE_CHARS {
        return value;
    }
    let mut truncated: String = value.chars().take(MAX_VALUE_CHARS).collect();
    truncated.push('…');
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_values_are_truncated() {
        let value = truncate_value("x".repeat(MAX_VALUE_CHARS + 10));
        assert_eq!(value.chars().count(), MAX_VALUE_CHARS + 1);
        assert!(value.ends_with('…'));
        assert_eq!(truncate_value("corto".into()), "corto");
    }
}
