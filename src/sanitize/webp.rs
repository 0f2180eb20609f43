//! Reescritura WebP: se eliminan los chunks EXIF y XMP, se ajustan las
//! banderas de VP8X y se recalcula el tamaño RIFF.

use super::{KeepSet, exif_writer};
use crate::config::Limits;
use crate::container::webp::{RIFF_HEADER_LEN, VP8X_FLAG_EXIF, VP8X_FLAG_XMP, riff_chunks};
use crate::container::{ImageContainer, SegmentKind};
use crate::error::{Result, StripError};
use tracing::warn;

/// Offset del byte de banderas dentro de un chunk VP8X.
const VP8X_FLAGS_OFFSET: usize = 8;

pub(super) fn rewrite(
    container: &ImageContainer<'_>,
    keep: &KeepSet,
    limits: &Limits,
) -> Result<Vec<u8>> {
    let data = container.data();
    let mut body = Vec::with_capacity(data.len());
    let mut vp8x_flags_at = None;
    let mut extended = false;
    let mut exif_kept = false;

    for (index, chunk) in riff_chunks(data, container.structure_end()).enumerate() {
        let chunk = chunk.map_err(|issue| StripError::UnsafeRewrite(issue.to_string()))?;
        let bytes = chunk
            .range
            .slice(data)
            .ok_or_else(|| StripError::UnsafeRewrite("chunk RIFF fuera del archivo".into()))?;

        if index == 0 && &chunk.fourcc == b"VP8X" {
            extended = true;
            vp8x_flags_at = Some(RIFF_HEADER_LEN + body.len() + VP8X_FLAGS_OFFSET);
        }

        let segment = container
            .metadata_segments()
            .find(|segment| segment.range.start == chunk.range.start);
        let Some(segment) = segment else {
            body.extend_from_slice(bytes);
            if chunk.body.len % 2 == 1 && chunk.range.end() == chunk.body.end() {
                body.push(0);
            }
            continue;
        };

        if segment.kind != SegmentKind::Exif || exif_kept || keep.is_empty() {
            continue;
        }
        if !extended {
            warn!("WebP simple: no admite EXIF, se ignora la lista de conservación");
            continue;
        }
        if let Some(tiff) = exif_writer::rebuild(container.payload(segment), keep, limits)? {
            body.extend_from_slice(&chunk_bytes(b"EXIF", &tiff)?);
            exif_kept = true;
        }
    }

    let riff_size = u32::try_from(body.len() + 4)
        .map_err(|_| StripError::UnsafeRewrite("contenedor RIFF demasiado grande".into()))?;
    let mut out = Vec::with_capacity(body.len() + RIFF_HEADER_LEN);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&riff_size.to_le_bytes());
    out.extend_from_slice(b"WEBP");
    out.extend_from_slice(&body);

    if let Some(at) = vp8x_flags_at {
        let flags = out
            .get_mut(at)
            .ok_or_else(|| StripError::UnsafeRewrite("chunk VP8X truncado".into()))?;
        *flags &= !VP8X_FLAG_XMP;
        if exif_kept {
            *flags |= VP8X_FLAG_EXIF;
        } else {
            *flags &= !VP8X_FLAG_EXIF;
        }
    }
    Ok(out)
}

/// Chunk RIFF con relleno a longitud par.
fn chunk_bytes(fourcc: &[u8; 4], body: &[u8]) -> Result<Vec<u8>> {
    let size = u32::try_from(body.len())
        .map_err(|_| StripError::UnsafeRewrite("chunk RIFF demasiado grande".into()))?;
    let mut out = Vec::with_capacity(body.len() + 9);
    out.extend_from_slice(fourcc);
    out.extend_from_slice(&size.to_le_bytes());
    out.extend_from_slice(body);
    if body.len() % 2 == 1 {
        out.push(0);
    }
    Ok(out)
}
