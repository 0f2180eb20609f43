//! Recorrido de sub-chunks RIFF de WebP.

use super::{ByteRange, Marker, ScanOutcome, Segment, SegmentKind, le_u32};
use crate::config::Limits;
use crate::error::{DecodeIssue, Result, StripError};

/// `RIFF` + tamaño + `WEBP`.
pub(crate) const RIFF_HEADER_LEN: usize = 12;
pub(crate) const CHUNK_HEADER_LEN: usize = 8;

pub(crate) const VP8X_FLAG_XMP: u8 = 0x04;
pub(crate) const VP8X_FLAG_EXIF: u8 = 0x08;

/// Chunk RIFF con su relleno a longitud par incluido en `range`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct RiffChunk {
    pub fourcc: [u8; 4],
    pub range: ByteRange,
    pub body: ByteRange,
}

/// Iterador sobre los chunks comprendidos entre la cabecera RIFF y `end`.
///
/// Tras el primer error no produce más elementos.
pub(crate) struct RiffChunks<'a> {
    data: &'a [u8],
    pos: usize,
    end: usize,
    failed: bool,
}

pub(crate) fn riff_chunks(data: &[u8], end: usize) -> RiffChunks<'_> {
    RiffChunks {
        data,
        pos: RIFF_HEADER_LEN,
        end: end.min(data.len()),
        failed: false,
    }
}

impl Iterator for RiffChunks<'_> {
    type Item = std::result::Result<RiffChunk, DecodeIssue>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.end {
            return None;
        }
        let pos = self.pos;
        let header = self
            .data
            .get(pos..pos + CHUNK_HEADER_LEN)
            .filter(|_| pos + CHUNK_HEADER_LEN <= self.end);
        let Some(header) = header else {
            self.failed = true;
            return Some(Err(DecodeIssue::malformed(pos, "cabecera de chunk RIFF truncada")));
        };
        let mut fourcc = [0u8; 4];
        fourcc.copy_from_slice(&header[..4]);
        let size = le_u32(header, 4).unwrap_or_default() as usize;
        let body_start = pos + CHUNK_HEADER_LEN;
        let Some(body_end) = body_start.checked_add(size).filter(|end| *end <= self.end) else {
            self.failed = true;
            return Some(Err(DecodeIssue::malformed(
                pos,
                format!(
                    "el chunk {} excede el contenedor RIFF",
                    String::from_utf8_lossy(&fourcc)
                ),
            )));
        };
        // El byte de relleno puede faltar si el chunk cierra el archivo.
        let padded_end = (body_end + (size & 1)).min(self.end);
        self.pos = padded_end;
        Some(Ok(RiffChunk {
            fourcc,
            range: ByteRange::from_bounds(pos, padded_end),
            body: ByteRange::from_bounds(body_start, body_end),
        }))
    }
}

/// Fin declarado por la cabecera RIFF.
pub(crate) fn riff_end(data: &[u8]) -> Option<usize> {
    le_u32(data, 4).map(|size| 8usize.saturating_add(size as usize))
}

pub(super) fn scan(data: &[u8], limits: &Limits) -> Result<ScanOutcome> {
    let minimum = RIFF_HEADER_LEN + CHUNK_HEADER_LEN;
    if data.len() < minimum {
        return Err(StripError::truncated(minimum, data.len()));
    }

    let declared_end = riff_end(data).unwrap_or(data.len());
    let end = declared_end.min(data.len());
    let mut outcome = ScanOutcome::new(limits, end);
    if declared_end > data.len() {
        outcome.skip(DecodeIssue::malformed(
            4,
            format!("RIFF declara {declared_end} bytes y solo hay {}", data.len()),
        ));
    }

    for chunk in riff_chunks(data, end) {
        if !outcome.tick() {
            break;
        }
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(issue) => {
                outcome.stop(issue);
                break;
            }
        };

        let kind = match &chunk.fourcc {
            b"EXIF" => SegmentKind::Exif,
            b"XMP " => SegmentKind::Xmp,
            b"VP8 " | b"VP8L" | b"ALPH" | b"ANMF" => {
                // Sin el relleno: puede faltar en el original y la reescritura lo repone.
                outcome.push_pixels(ByteRange::from_bounds(chunk.range.start, chunk.body.end()));
                continue;
            }
            _ => continue,
        };
        let segment = Segment {
            kind,
            range: chunk.range,
            payload: chunk.body,
            marker: Marker::RiffChunk(chunk.fourcc),
        };
        if !outcome.push_segment(segment) {
            break;
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ImageContainer;
    use crate::fixtures;

    #[test]
    fn finds_exif_and_xmp_chunks() {
        let data = fixtures::webp_with_everything();
        let container = ImageContainer::parse(&data, &Limits::default()).expect("WebP válido");
        let kinds: Vec<SegmentKind> = container.segments().iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![SegmentKind::Exif, SegmentKind::Xmp]);
        assert_eq!(container.pixel_regions().len(), 1);
        assert_eq!(container.structure_end(), data.len());
    }

    #[test]
    fn odd_sized_chunks_are_padded() {
        let chunks = [
            fixtures::webp_chunk(b"XMP ", b"<a/>x"),
            fixtures::webp_chunk(b"VP8L", &fixtures::VP8L_1X1),
        ];
        let data = fixtures::webp_from_chunks(&chunks);
        let container = ImageContainer::parse(&data, &Limits::default()).expect("WebP válido");
        assert!(!container.is_partial());
        assert_eq!(container.segments()[0].range.len, CHUNK_HEADER_LEN + 6);
        assert_eq!(container.payload(&container.segments()[0]), b"<a/>x");
    }

    #[test]
    fn overrunning_chunk_marks_partial() {
        let mut data = fixtures::webp_from_chunks(&[fixtures::webp_chunk(b"VP8L", &fixtures::VP8L_1X1)]);
        let size_at = RIFF_HEADER_LEN + 4;
        data[size_at..size_at + 4].copy_from_slice(&0x1000u32.to_le_bytes());
        let container = ImageContainer::parse(&data, &Limits::default()).expect("escaneo parcial");
        assert!(container.is_partial());
        assert!(container.pixel_regions().is_empty());
    }

    #[test]
    fn trailing_bytes_after_riff_are_outside_structure() {
        let mut data = fixtures::webp_from_chunks(&[fixtures::webp_chunk(b"VP8L", &fixtures::VP8L_1X1)]);
        let riff_len = data.len();
        data.extend_from_slice(b"basura");
        let container = ImageContainer::parse(&data, &Limits::default()).expect("WebP válido");
        assert_eq!(container.structure_end(), riff_len);
    }
}
