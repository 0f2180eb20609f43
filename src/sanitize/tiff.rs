//! Reescritura de TIFF nativo.
//!
//! Cada página se regenera con sus etiquetas estructurales, y la primera
//! además con las etiquetas conservadas. Las tiras o teselas se copian al
//! final del archivo nuevo con sus offsets recalculados. Solo se descartan
//! etiquetas de metadata conocidas: una etiqueta sin nombre podría hacer
//! falta para decodificar los píxeles y el archivo no se reescribe. Tampoco
//! se reescriben los SubIFDs ni la compresión JPEG antigua.

use super::exif_writer::{self, OwnedEntry, PageSpec};
use super::KeepSet;
use crate::config::Limits;
use crate::container::ifd::{Endian, Ifd, TiffHeader, read_ifd};
use crate::container::tiff::{
    TAG_STRIP_BYTE_COUNTS, TAG_STRIP_OFFSETS, TAG_TILE_BYTE_COUNTS, TAG_TILE_OFFSETS,
    image_regions,
};
use crate::container::ImageContainer;
use crate::decode::exif_tags::{TAG_SUB_IFDS, is_known_tiff_tag, is_structural};
use crate::error::{Result, StripError};
use std::collections::HashSet;

const TAG_COMPRESSION: u16 = 0x0103;
/// Compresión JPEG "old-style" (TIFF 6.0, sección 22).
const COMPRESSION_OLD_JPEG: u32 = 6;

pub(super) fn rewrite(
    container: &ImageContainer<'_>,
    keep: &KeepSet,
    limits: &Limits,
) -> Result<Vec<u8>> {
    let data = container.data();
    let header = TiffHeader::parse(data).map_err(unsafe_rewrite)?;
    let endian = header.endian;

    let mut pages = Vec::new();
    let mut visited = HashSet::new();
    let mut next = header.first_ifd as usize;
    while next != 0 {
        if !visited.insert(next) {
            return Err(StripError::UnsafeRewrite(format!("ciclo de IFDs en {next}")));
        }
        if pages.len() >= limits.max_chunks {
            return Err(StripError::UnsafeRewrite("demasiadas páginas".into()));
        }
        let ifd = read_ifd(data, endian, next, limits.max_ifd_entries).map_err(unsafe_rewrite)?;
        if ifd.declared > ifd.entries.len() {
            return Err(StripError::UnsafeRewrite(format!(
                "el IFD en {} tiene más entradas de las que se pueden copiar",
                ifd.offset
            )));
        }
        let first = pages.is_empty();
        pages.push(page(data, endian, &ifd, first, keep, limits)?);
        next = ifd.next as usize;
    }

    exif_writer::write_tiff(endian, &pages)
}

fn page<'a>(
    data: &'a [u8],
    endian: Endian,
    ifd: &Ifd,
    first: bool,
    keep: &KeepSet,
    limits: &Limits,
) -> Result<PageSpec<'a>> {
    if ifd.find(TAG_SUB_IFDS).is_some() {
        return Err(StripError::UnsafeRewrite("TIFF con SubIFDs".into()));
    }
    let compression = ifd
        .find(TAG_COMPRESSION)
        .and_then(|entry| entry.first_unsigned(data, endian));
    if compression == Some(COMPRESSION_OLD_JPEG) {
        return Err(StripError::UnsafeRewrite("TIFF con compresión JPEG antigua".into()));
    }

    let tiled = ifd.find(TAG_TILE_OFFSETS).is_some();
    let (offsets_tag, counts_tag) = if tiled {
        (TAG_TILE_OFFSETS, TAG_TILE_BYTE_COUNTS)
    } else {
        (TAG_STRIP_OFFSETS, TAG_STRIP_BYTE_COUNTS)
    };
    let regions =
        image_regions(data, endian, ifd, offsets_tag, counts_tag, limits).map_err(unsafe_rewrite)?;
    let strips = regions
        .iter()
        .map(|region| {
            region
                .slice(data)
                .ok_or_else(|| StripError::UnsafeRewrite("tira fuera del archivo".into()))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut entries = Vec::new();
    for entry in &ifd.entries {
        if matches!(entry.tag, TAG_STRIP_OFFSETS | TAG_TILE_OFFSETS) {
            continue;
        }
        let wanted = is_structural(entry.tag) || (first && keep.contains(entry.tag));
        if !wanted {
            if !is_known_tiff_tag(entry.tag) {
                return Err(StripError::UnsafeRewrite(format!(
                    "etiqueta TIFF desconocida {:#06x} en el IFD de {}",
                    entry.tag, ifd.offset
                )));
            }
            continue;
        }
        let owned = OwnedEntry::copy(entry, data, endian).ok_or_else(|| {
            StripError::UnsafeRewrite(format!("valor ilegible en la etiqueta {:#06x}", entry.tag))
        })?;
        entries.push(owned);
    }

    let exif = if first {
        exif_writer::exif_entries(data, endian, ifd, keep, limits)?
    } else {
        Vec::new()
    };

    Ok(PageSpec {
        entries,
        exif,
        offsets_tag: (!strips.is_empty()).then_some(offsets_tag),
        strips,
    })
}

fn unsafe_rewrite(issue: crate::error::DecodeIssue) -> StripError {
    StripError::UnsafeRewrite(issue.to_string())
}
