//! Reescritura PNG: se descartan los chunks de metadata y lo que sigue a IEND.

use super::{KeepSet, exif_writer, splice};
use crate::config::Limits;
use crate::container::{ImageContainer, SegmentKind};
use crate::error::{Result, StripError};

pub(super) fn rewrite(
    container: &ImageContainer<'_>,
    keep: &KeepSet,
    limits: &Limits,
) -> Result<Vec<u8>> {
    let data = container.data();
    let mut exif_emitted = false;
    splice(
        data,
        0,
        container.structure_end(),
        container.metadata_segments(),
        |segment| {
            if segment.kind != SegmentKind::Exif || exif_emitted {
                return Ok(None);
            }
            let Some(tiff) = exif_writer::rebuild(container.payload(segment), keep, limits)? else {
                return Ok(None);
            };
            exif_emitted = true;
            chunk(b"eXIf", &tiff).map(Some)
        },
    )
}

/// Chunk con longitud y CRC32 calculados sobre tipo y datos.
fn chunk(kind: &[u8; 4], body: &[u8]) -> Result<Vec<u8>> {
    let length = u32::try_from(body.len())
        .map_err(|_| StripError::UnsafeRewrite("chunk PNG demasiado grande".into()))?;
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(kind);
    hasher.update(body);

    let mut out = Vec::with_capacity(body.len() + 12);
    out.extend_from_slice(&length.to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(body);
    out.extend_from_slice(&hasher.finalize().to_be_bytes());
    Ok(out)
}
