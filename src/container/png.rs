//! Recorrido de chunks PNG.

use super::{ByteRange, Marker, ScanOutcome, Segment, SegmentKind, be_u32};
use crate::config::Limits;
use crate::error::{DecodeIssue, Result, StripError};

pub(crate) const PNG_SIGNATURE_LEN: usize = 8;
/// Longitud + tipo + CRC.
pub(crate) const CHUNK_OVERHEAD: usize = 12;
const MAX_CHUNK_LEN: u32 = 0x7FFF_FFFF;

pub(crate) const XMP_KEYWORD: &[u8] = b"XML:com.adobe.xmp";

pub(super) fn scan(data: &[u8], limits: &Limits) -> Result<ScanOutcome> {
    // Firma más la cabecera del primer chunk.
    let minimum = PNG_SIGNATURE_LEN + 8;
    if data.len() < minimum {
        return Err(StripError::truncated(minimum, data.len()));
    }

    let mut outcome = ScanOutcome::new(limits, data.len());
    let mut pos = PNG_SIGNATURE_LEN;
    let mut seen_iend = false;

    while pos < data.len() {
        if !outcome.tick() {
            break;
        }
        let (Some(length), Some(kind)) = (be_u32(data, pos), chunk_type(data, pos + 4)) else {
            outcome.stop(DecodeIssue::malformed(pos, "cabecera de chunk truncada"));
            break;
        };
        if length > MAX_CHUNK_LEN {
            outcome.stop(DecodeIssue::malformed(pos, format!("longitud de chunk {length} inválida")));
            break;
        }
        let data_start = pos + 8;
        let end = data_start + length as usize + 4;
        if end > data.len() {
            outcome.skip(DecodeIssue::malformed(
                pos,
                format!(
                    "el chunk {} excede el final del archivo",
                    String::from_utf8_lossy(&kind)
                ),
            ));
            break;
        }

        let range = ByteRange::from_bounds(pos, end);
        let body = ByteRange::new(data_start, length as usize);
        match &kind {
            b"IDAT" => outcome.push_pixels(range),
            b"IEND" => {
                outcome.structure_end = end;
                seen_iend = true;
                break;
            }
            _ => {
                if let Some(segment) = classify(data, kind, range, body) {
                    if !outcome.push_segment(segment) {
                        break;
                    }
                }
            }
        }
        pos = end;
    }

    if !seen_iend && !outcome.partial {
        outcome.stop(DecodeIssue::malformed(pos, "falta el chunk IEND"));
    }

    Ok(outcome)
}

fn chunk_type(data: &[u8], offset: usize) -> Option<[u8; 4]> {
    data.get(offset..offset + 4)?.try_into().ok()
}

fn classify(data: &[u8], kind: [u8; 4], range: ByteRange, body: ByteRange) -> Option<Segment> {
    let segment = |kind_of, payload| Segment {
        kind: kind_of,
        range,
        payload,
        marker: Marker::PngChunk(kind),
    };
    let bytes = body.slice(data)?;

    match &kind {
        b"eXIf" => Some(segment(SegmentKind::Exif, body)),
        b"tEXt" | b"iTXt" if keyword(bytes) == XMP_KEYWORD => {
            let payload = if &kind == b"tEXt" {
                let skip = XMP_KEYWORD.len() + 1;
                ByteRange::from_bounds(body.start + skip, body.end())
            } else {
                itxt_text_range(bytes)
                    .map(|text| ByteRange::new(body.start + text.start, text.len))
                    .unwrap_or(body)
            };
            Some(segment(SegmentKind::Xmp, payload))
        }
        b"tEXt" | b"zTXt" | b"iTXt" | b"tIME" => Some(segment(SegmentKind::Text, body)),
        _ => None,
    }
}

/// Palabra clave de un chunk textual (hasta el primer NUL).
pub(crate) fn keyword(body: &[u8]) -> &[u8] {
    let end = body.iter().position(|b| *b == 0).unwrap_or(body.len());
    &body[..end]
}

/// Rango relativo del texto de un `iTXt` sin comprimir.
///
/// Estructura: palabra clave, NUL, bandera de compresión, método, idioma,
/// NUL, palabra clave traducida, NUL, texto.
pub(crate) fn itxt_text_range(body: &[u8]) -> Option<ByteRange> {
    let key_end = body.iter().position(|b| *b == 0)?;
    let compressed = *body.get(key_end + 1)?;
    if compressed != 0 {
        return None;
    }
    let language_start = key_end + 3;
    let language_end = language_start + body.get(language_start..)?.iter().position(|b| *b == 0)?;
    let translated_start = language_end + 1;
    let translated_end =
        translated_start + body.get(translated_start..)?.iter().position(|b| *b == 0)?;
    Some(ByteRange::from_bounds(translated_end + 1, body.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ImageContainer;
    use crate::fixtures;

    #[test]
    fn classifies_exif_xmp_and_text_chunks() {
        let data = fixtures::png_with_everything();
        let container = ImageContainer::parse(&data, &Limits::default()).expect("PNG válido");
        let kinds: Vec<SegmentKind> = container.segments().iter().map(|s| s.kind).collect();
        assert!(kinds.contains(&SegmentKind::Exif));
        assert!(kinds.contains(&SegmentKind::Xmp));
        assert!(kinds.contains(&SegmentKind::Text));

        let xmp = container
            .segments()
            .iter()
            .find(|s| s.kind == SegmentKind::Xmp)
            .expect("segmento XMP");
        assert!(container.payload(xmp).starts_with(b"<x:xmpmeta"));
        assert_eq!(container.structure_end(), data.len());
    }

    #[test]
    fn every_idat_is_a_pixel_region() {
        let idat = fixtures::png_chunk(b"IDAT", &fixtures::GRAY_1X1_IDAT[..6]);
        let tail = fixtures::png_chunk(b"IDAT", &fixtures::GRAY_1X1_IDAT[6..]);
        let data = fixtures::png_from_chunks(&[idat, tail]);
        let container = ImageContainer::parse(&data, &Limits::default()).expect("PNG válido");
        assert_eq!(container.pixel_regions().len(), 2);
        assert!(!container.is_partial());
    }

    #[test]
    fn missing_iend_marks_partial() {
        let mut data = fixtures::png_with_everything();
        data.truncate(data.len() - CHUNK_OVERHEAD);
        let container = ImageContainer::parse(&data, &Limits::default()).expect("escaneo parcial");
        assert!(container.is_partial());
    }

    #[test]
    fn oversized_length_stops_scan() {
        let mut data = fixtures::png_from_chunks(&[]);
        let iend_at = data.len() - CHUNK_OVERHEAD;
        data[iend_at..iend_at + 4].copy_from_slice(&0x8000_0000u32.to_be_bytes());
        let container = ImageContainer::parse(&data, &Limits::default()).expect("escaneo parcial");
        assert!(container.is_partial());
        assert!(matches!(
            container.issues()[0],
            DecodeIssue::MalformedSegment { .. }
        ));
    }

    #[test]
    fn itxt_text_skips_language_fields() {
        let body = b"Title\0\0\0es\0Titulo\0Hola";
        let range = itxt_text_range(body).expect("iTXt sin comprimir");
        assert_eq!(&body[range.start..range.end()], b"Hola");
        assert!(itxt_text_range(b"Title\0\x01\0\0\0x").is_none());
    }
}
