//! Reescritura JPEG: se eliminan los marcadores de metadata anteriores al
//! escaneo y el resto del archivo se copia tal cual.

use super::{KeepSet, exif_writer, splice};
use crate::config::Limits;
use crate::container::jpeg::MARKER_APP1;
use crate::container::{ImageContainer, SegmentKind};
use crate::decode::exif::EXIF_PREFIX;
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
        data.len(),
        container.metadata_segments(),
        |segment| {
            if segment.kind != SegmentKind::Exif || exif_emitted {
                return Ok(None);
            }
            let Some(tiff) = exif_writer::rebuild(container.payload(segment), keep, limits)? else {
                return Ok(None);
            };
            exif_emitted = true;
            app1_exif(&tiff).map(Some)
        },
    )
}

/// Marcador APP1 con la firma `Exif\0\0` y la longitud recalculada.
fn app1_exif(tiff: &[u8]) -> Result<Vec<u8>> {
    let length = u16::try_from(2 + EXIF_PREFIX.len() + tiff.len()).map_err(|_| {
        StripError::UnsafeRewrite("el EXIF conservado no cabe en un marcador APP1".into())
    })?;
    let mut out = Vec::with_capacity(usize::from(length) + 2);
    out.extend_from_slice(&[0xFF, MARKER_APP1]);
    out.extend_from_slice(&length.to_be_bytes());
    out.extend_from_slice(EXIF_PREFIX);
    out.extend_from_slice(tiff);
    Ok(out)
}
