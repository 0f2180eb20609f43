//! Recorrido de la cadena de IFDs de un TIFF nativo.
//!
//! La cadena completa se expone como un único segmento EXIF cuyo `range`
//! cubre la tabla del IFD0; las tiras o teselas de cada página son regiones
//! de píxeles. XMP (`0x02BC`) e IPTC (`0x83BB`, `0x8649`) embebidos en
//! etiquetas se exponen como segmentos propios.

use super::ifd::{Endian, IfdEntry, TIFF_HEADER_LEN, TiffHeader, read_ifd};
use super::jpeg::find_iptc_resource;
use super::{ByteRange, Marker, ScanOutcome, Segment, SegmentKind};
use crate::config::Limits;
use crate::error::{DecodeIssue, Result, StripError};
use std::collections::HashSet;

pub(crate) const TAG_STRIP_OFFSETS: u16 = 0x0111;
pub(crate) const TAG_STRIP_BYTE_COUNTS: u16 = 0x0117;
pub(crate) const TAG_TILE_OFFSETS: u16 = 0x0144;
pub(crate) const TAG_TILE_BYTE_COUNTS: u16 = 0x0145;
pub(crate) const TAG_XMP: u16 = 0x02BC;
pub(crate) const TAG_IPTC: u16 = 0x83BB;
pub(crate) const TAG_PHOTOSHOP: u16 = 0x8649;

pub(super) fn scan(data: &[u8], limits: &Limits) -> Result<ScanOutcome> {
    if data.len() < TIFF_HEADER_LEN {
        return Err(StripError::truncated(TIFF_HEADER_LEN, data.len()));
    }

    let mut outcome = ScanOutcome::new(limits, data.len());
    let header = match TiffHeader::parse(data) {
        Ok(header) => header,
        Err(issue) => {
            outcome.stop(issue);
            return Ok(outcome);
        }
    };

    let mut visited = HashSet::new();
    let mut next = header.first_ifd as usize;
    let mut page = 0usize;

    while next != 0 {
        if !outcome.tick() {
            break;
        }
        if !visited.insert(next) {
            outcome.stop(DecodeIssue::CycleDetected { offset: next });
            break;
        }
        let ifd = match read_ifd(data, header.endian, next, limits.max_ifd_entries) {
            Ok(ifd) => ifd,
            Err(issue) => {
                outcome.stop(issue);
                break;
            }
        };

        if page == 0 {
            let segment = Segment {
                kind: SegmentKind::Exif,
                range: ByteRange::new(ifd.offset, ifd.table_len()),
                payload: ByteRange::new(0, data.len()),
                marker: Marker::TiffIfd,
            };
            if !outcome.push_segment(segment) {
                break;
            }
        }

        for entry in &ifd.entries {
            if let Some(segment) = embedded_segment(data, header.endian, entry) {
                if !outcome.push_segment(segment) {
                    return Ok(outcome);
                }
            }
        }

        let (offsets_tag, counts_tag) = if ifd.find(TAG_TILE_OFFSETS).is_some() {
            (TAG_TILE_OFFSETS, TAG_TILE_BYTE_COUNTS)
        } else {
            (TAG_STRIP_OFFSETS, TAG_STRIP_BYTE_COUNTS)
        };
        match image_regions(data, header.endian, &ifd, offsets_tag, counts_tag, limits) {
            Ok(regions) => regions.into_iter().for_each(|region| outcome.push_pixels(region)),
            Err(issue) => outcome.skip(issue),
        }

        next = ifd.next as usize;
        page += 1;
    }

    Ok(outcome)
}

/// Carga XMP o IPTC guardada fuera de línea en una etiqueta.
fn embedded_segment(data: &[u8], endian: Endian, entry: &IfdEntry) -> Option<Segment> {
    if !matches!(entry.tag, TAG_XMP | TAG_IPTC | TAG_PHOTOSHOP) || entry.value_len()? <= 4 {
        return None;
    }
    let value = entry.value_range(data, endian)?;
    let range = ByteRange::from_bounds(value.start, value.end);
    let (kind, payload) = match entry.tag {
        TAG_XMP => (SegmentKind::Xmp, range),
        TAG_IPTC => (SegmentKind::Iptc, range),
        _ => match find_iptc_resource(data, value.start, value.end) {
            Some(iim) => (SegmentKind::Iptc, iim),
            None => (SegmentKind::Other, range),
        },
    };
    Some(Segment {
        kind,
        range,
        payload,
        marker: Marker::TiffTag(entry.tag),
    })
}

/// Tiras o teselas de una página, validadas contra el buffer.
pub(crate) fn image_regions(
    data: &[u8],
    endian: Endian,
    ifd: &super::ifd::Ifd,
    offsets_tag: u16,
    counts_tag: u16,
    limits: &Limits,
) -> std::result::Result<Vec<ByteRange>, DecodeIssue> {
    let (Some(offsets), Some(counts)) = (ifd.find(offsets_tag), ifd.find(counts_tag)) else {
        return Ok(Vec::new());
    };
    let malformed = |reason: &str| DecodeIssue::malformed(ifd.offset, reason.to_string());
    let offsets = offsets
        .unsigned_values(data, endian, limits.max_chunks)
        .ok_or_else(|| malformed("offsets de tiras ilegibles"))?;
    let counts = counts
        .unsigned_values(data, endian, limits.max_chunks)
        .ok_or_else(|| malformed("tamaños de tiras ilegibles"))?;
    if offsets.len() != counts.len() {
        return Err(malformed("número de offsets y tamaños de tiras distinto"));
    }

    offsets
        .iter()
        .zip(&counts)
        .map(|(&offset, &count)| {
            let region = ByteRange::new(offset as usize, count as usize);
            if region.end() > data.len() {
                return Err(DecodeIssue::malformed(
                    offset as usize,
                    "la tira excede el final del archivo",
                ));
            }
            Ok(region)
        })
        .collect()
}
