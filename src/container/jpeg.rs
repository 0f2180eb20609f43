//! Recorrido de marcadores JPEG hasta el inicio del escaneo (SOS).

use super::{ByteRange, Marker, ScanOutcome, Segment, SegmentKind, be_u16, be_u32};
use crate::config::Limits;
use crate::error::{DecodeIssue, Result, StripError};

pub(crate) const MARKER_SOI: u8 = 0xD8;
pub(crate) const MARKER_EOI: u8 = 0xD9;
pub(crate) const MARKER_SOS: u8 = 0xDA;
pub(crate) const MARKER_APP1: u8 = 0xE1;
pub(crate) const MARKER_APP13: u8 = 0xED;
pub(crate) const MARKER_COM: u8 = 0xFE;

pub(crate) const EXIF_SIGNATURE: &[u8] = b"Exif\0";
pub(crate) const XMP_SIGNATURE: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";
const XMP_EXTENSION_SIGNATURE: &[u8] = b"http://ns.adobe.com/xmp/extension/\0";
/// GUID (32) + longitud total (4) + offset del fragmento (4).
const XMP_EXTENSION_HEADER: usize = 40;
const PHOTOSHOP_SIGNATURE: &[u8] = b"Photoshop 3.0\0";
const BIM_SIGNATURE: &[u8] = b"8BIM";
const IPTC_RESOURCE_ID: u16 = 0x0404;

/// Marcadores sin campo de longitud.
fn is_standalone(marker: u8) -> bool {
    matches!(marker, MARKER_SOI | 0x01 | 0xD0..=0xD7)
}

pub(super) fn scan(data: &[u8], limits: &Limits) -> Result<ScanOutcome> {
    // SOI más, como mínimo, la cabecera de un marcador.
    if data.len() < 4 {
        return Err(StripError::truncated(4, data.len()));
    }

    let mut outcome = ScanOutcome::new(limits, data.len());
    let mut pos = 2;

    loop {
        if pos == data.len() {
            // La imagen termina en un límite de marcador sin datos de escaneo.
            return Err(StripError::truncated(pos + 4, data.len()));
        }
        if !outcome.tick() {
            break;
        }
        if data[pos] != 0xFF {
            outcome.stop(DecodeIssue::malformed(pos, "se esperaba un marcador"));
            break;
        }

        // Bytes de relleno 0xFF antes del código del marcador.
        let mut code_pos = pos + 1;
        while code_pos < data.len() && data[code_pos] == 0xFF {
            code_pos += 1;
        }
        let Some(&code) = data.get(code_pos) else {
            outcome.stop(DecodeIssue::malformed(pos, "marcador truncado"));
            break;
        };

        if is_standalone(code) {
            pos = code_pos + 1;
            continue;
        }
        if code == MARKER_EOI {
            outcome.stop(DecodeIssue::malformed(pos, "EOI antes del inicio del escaneo"));
            break;
        }
        if code == MARKER_SOS {
            outcome.push_pixels(ByteRange::from_bounds(pos, data.len()));
            break;
        }

        let Some(declared) = be_u16(data, code_pos + 1) else {
            outcome.stop(DecodeIssue::malformed(pos, "longitud de marcador truncada"));
            break;
        };
        if declared < 2 {
            outcome.stop(DecodeIssue::malformed(pos, format!("longitud {declared} inválida")));
            break;
        }
        let body_start = code_pos + 3;
        let end = code_pos + 1 + declared as usize;
        if end > data.len() {
            // Solo se descarta este marcador; detrás no quedan más datos.
            outcome.skip(DecodeIssue::malformed(
                pos,
                format!("el marcador FF{code:02X} excede el final del archivo"),
            ));
            break;
        }

        let range = ByteRange::from_bounds(pos, end);
        if let Some(segment) = classify(data, code, range, body_start) {
            if !outcome.push_segment(segment) {
                break;
            }
        }
        pos = end;
    }

    Ok(outcome)
}

fn classify(data: &[u8], code: u8, range: ByteRange, body_start: usize) -> Option<Segment> {
    let body = &data[body_start..range.end()];
    let segment = |kind, payload_start: usize, payload_end: usize| Segment {
        kind,
        range,
        payload: ByteRange::from_bounds(payload_start, payload_end),
        marker: Marker::Jpeg(code),
    };

    match code {
        MARKER_APP1 if body.starts_with(EXIF_SIGNATURE) && body.len() >= 6 => {
            Some(segment(SegmentKind::Exif, body_start + 6, range.end()))
        }
        MARKER_APP1 if body.starts_with(XMP_SIGNATURE) => Some(segment(
            SegmentKind::Xmp,
            body_start + XMP_SIGNATURE.len(),
            range.end(),
        )),
        MARKER_APP1 if body.starts_with(XMP_EXTENSION_SIGNATURE) => {
            let payload_start =
                (body_start + XMP_EXTENSION_SIGNATURE.len() + XMP_EXTENSION_HEADER).min(range.end());
            Some(segment(SegmentKind::Xmp, payload_start, range.end()))
        }
        MARKER_APP13 if body.starts_with(PHOTOSHOP_SIGNATURE) => {
            let resources = body_start + PHOTOSHOP_SIGNATURE.len();
            match find_iptc_resource(data, resources, range.end()) {
                Some(iim) => Some(Segment {
                    kind: SegmentKind::Iptc,
                    range,
                    payload: iim,
                    marker: Marker::Jpeg(code),
                }),
                None => Some(segment(SegmentKind::Other, resources, range.end())),
            }
        }
        MARKER_COM => Some(segment(SegmentKind::Text, body_start, range.end())),
        _ => None,
    }
}

/// Busca el recurso IPTC (`0x0404`) entre los bloques `8BIM` de un IRB.
pub(crate) fn find_iptc_resource(data: &[u8], start: usize, end: usize) -> Option<ByteRange> {
    let mut pos = start;
    while pos + 12 <= end {
        if data.get(pos..pos + 4)? != BIM_SIGNATURE {
            return None;
        }
        let id = be_u16(data, pos + 4)?;
        // Nombre en formato Pascal, con relleno hasta longitud par.
        let name_len = *data.get(pos + 6)? as usize;
        let name_total = (1 + name_len + 1) & !1;
        let size_pos = pos + 6 + name_total;
        let size = be_u32(data, size_pos)? as usize;
        let data_start = size_pos + 4;
        let data_end = data_start.checked_add(size)?;
        if data_end > end {
            return None;
        }
        if id == IPTC_RESOURCE_ID {
            return Some(ByteRange::from_bounds(data_start, data_end));
        }
        pos = data_end + (size & 1);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{ImageContainer, ImageFormat};
    use crate::fixtures;

    #[test]
    fn finds_exif_xmp_iptc_and_comment_segments() {
        let data = fixtures::jpeg_with_everything();
        let container = ImageContainer::parse(&data, &Limits::default()).expect("JPEG válido");
        assert_eq!(container.format(), ImageFormat::Jpeg);

        let kinds: Vec<SegmentKind> = container.segments().iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                SegmentKind::Exif,
                SegmentKind::Xmp,
                SegmentKind::Iptc,
                SegmentKind::Text
            ]
        );
        let exif = &container.segments()[0];
        assert!(container.payload(exif).starts_with(b"II*\0"));

        let pixels = container.pixel_regions();
        assert_eq!(pixels.len(), 1);
        assert_eq!(pixels[0].end(), data.len());
        assert_eq!(&data[pixels[0].start..pixels[0].start + 2], &[0xFF, MARKER_SOS]);
    }

    #[test]
    fn soi_only_is_truncated() {
        let err = ImageContainer::parse(&[0xFF, 0xD8], &Limits::default()).unwrap_err();
        assert!(matches!(err, StripError::TruncatedInput { .. }));
    }

    #[test]
    fn file_ending_at_marker_boundary_is_truncated() {
        let mut data = vec![0xFF, 0xD8];
        data.extend_from_slice(&fixtures::jpeg_app1_exif(&fixtures::gps_exif()));
        let err = ImageContainer::parse(&data, &Limits::default()).unwrap_err();
        assert!(matches!(err, StripError::TruncatedInput { .. }));
    }

    #[test]
    fn overrunning_marker_yields_partial_scan() {
        let mut data = vec![0xFF, 0xD8];
        data.extend_from_slice(&fixtures::jpeg_app1_exif(&fixtures::gps_exif()));
        data.extend_from_slice(&[0xFF, 0xE2, 0x40, 0x00, 0x01, 0x02]);

        let container = ImageContainer::parse(&data, &Limits::default()).expect("escaneo parcial");
        assert!(container.is_partial());
        assert_eq!(container.segments().len(), 1);
        assert!(container.pixel_regions().is_empty());
    }

    #[test]
    fn garbage_between_markers_stops_scan() {
        let mut data = vec![0xFF, 0xD8, 0x00, 0x11, 0x22, 0x33];
        data.extend_from_slice(&fixtures::jpeg_scan());
        let container = ImageContainer::parse(&data, &Limits::default()).expect("escaneo parcial");
        assert!(container.is_partial());
        assert!(container.segments().is_empty());
    }

    #[test]
    fn photoshop_block_without_iptc_is_kept_as_other() {
        let mut irb = PHOTOSHOP_SIGNATURE.to_vec();
        irb.extend_from_slice(b"8BIM\x04\x25\x00\x00\x00\x00\x00\x02\xAB\xCD");
        let data = fixtures::jpeg_with_segments(&[fixtures::jpeg_segment(MARKER_APP13, &irb)]);
        let container = ImageContainer::parse(&data, &Limits::default()).expect("JPEG válido");
        assert_eq!(container.segments().len(), 1);
        assert_eq!(container.segments()[0].kind, SegmentKind::Other);
        assert_eq!(container.metadata_segments().count(), 0);
    }

    #[test]
    fn iptc_resource_after_other_blocks_is_found() {
        let mut irb = b"8BIM\x03\xED\x03abc\x00\x00\x00\x03xyz\x00".to_vec();
        irb.extend_from_slice(b"8BIM\x04\x04\x00\x00\x00\x00\x00\x04\x1C\x02\x00\x00");
        let found = find_iptc_resource(&irb, 0, irb.len()).expect("recurso IPTC");
        assert_eq!(&irb[found.start..found.end()], b"\x1C\x02\x00\x00");
    }
}
