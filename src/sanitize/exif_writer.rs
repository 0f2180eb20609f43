//! Escritura de estructuras TIFF: IFDs con su área de datos, sub-IFD EXIF y
//! tiras de píxeles al final.

use super::KeepSet;
use crate::config::Limits;
use crate::container::ifd::{
    Endian, IFD_ENTRY_LEN, Ifd, IfdEntry, TIFF_HEADER_LEN, TIFF_MAGIC, TYPE_LONG, TiffHeader,
    read_ifd,
};
use crate::decode::exif::EXIF_PREFIX;
use crate::decode::exif_tags::TAG_EXIF_POINTER;
use crate::error::{Result, StripError};
use tracing::warn;

/// Entrada de IFD con su valor copiado, en el orden de bytes de origen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) struct OwnedEntry {
    pub tag: u16,
    pub field_type: u16,
    pub count: u32,
    pub value: Vec<u8>,
}

impl OwnedEntry {
    pub fn copy(entry: &IfdEntry, data: &[u8], endian: Endian) -> Option<Self> {
        Some(Self {
            tag: entry.tag,
            field_type: entry.field_type,
            count: entry.count,
            value: entry.value_bytes(data, endian)?.to_vec(),
        })
    }

    /// LONGs a cero que se rellenan después de escribir.
    fn placeholder(tag: u16, count: usize) -> Result<Self> {
        Ok(Self {
            tag,
            field_type: TYPE_LONG,
            count: to_u32(count)?,
            value: vec![0; count * 4],
        })
    }
}

/// Página de un TIFF por escribir.
#[derive(Debug, Default)]
pub(super) struct PageSpec<'a> {
    pub entries: Vec<OwnedEntry>,
    /// Entradas del sub-IFD EXIF; vacío si no hay sub-IFD.
    pub exif: Vec<OwnedEntry>,
    pub strips: Vec<&'a [u8]>,
    /// Etiqueta que recibe los offsets de `strips` (`StripOffsets` o `TileOffsets`).
    pub offsets_tag: Option<u16>,
}

struct WrittenIfd {
    values: Vec<(u16, usize)>,
    next_at: usize,
}

impl WrittenIfd {
    fn value_at(&self, tag: u16) -> Result<usize> {
        self.values
            .iter()
            .find(|(candidate, _)| *candidate == tag)
            .map(|(_, at)| *at)
            .ok_or_else(|| StripError::UnsafeRewrite(format!("etiqueta {tag:#06x} no escrita")))
    }
}

/// Serializa las páginas enlazadas en orden; las tiras van al final.
pub(super) fn write_tiff(endian: Endian, pages: &[PageSpec<'_>]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.extend_from_slice(&endian.marker());
    out.extend_from_slice(&endian.u16_bytes(TIFF_MAGIC));
    out.extend_from_slice(&[0; 4]);

    let mut link_at = 4;
    let mut pending = Vec::new();
    for page in pages {
        align(&mut out);
        let ifd_at = out.len();
        patch(&mut out, endian, link_at, ifd_at)?;

        let mut entries = page.entries.clone();
        if !page.exif.is_empty() {
            entries.push(OwnedEntry::placeholder(TAG_EXIF_POINTER, 1)?);
        }
        if let Some(tag) = page.offsets_tag {
            entries.push(OwnedEntry::placeholder(tag, page.strips.len())?);
        }
        entries.sort_by_key(|entry| entry.tag);
        let written = write_ifd(&mut out, endian, &entries)?;
        link_at = written.next_at;

        if !page.exif.is_empty() {
            let mut exif = page.exif.clone();
            exif.sort_by_key(|entry| entry.tag);
            align(&mut out);
            let exif_at = out.len();
            write_ifd(&mut out, endian, &exif)?;
            patch(&mut out, endian, written.value_at(TAG_EXIF_POINTER)?, exif_at)?;
        }
        if let Some(tag) = page.offsets_tag {
            pending.push((written.value_at(tag)?, &page.strips));
        }
    }

    for (offsets_at, strips) in pending {
        for (index, strip) in strips.iter().enumerate() {
            align(&mut out);
            let strip_at = out.len();
            out.extend_from_slice(strip);
            patch(&mut out, endian, offsets_at + index * 4, strip_at)?;
        }
    }
    Ok(out)
}

fn write_ifd(out: &mut Vec<u8>, endian: Endian, entries: &[OwnedEntry]) -> Result<WrittenIfd> {
    let start = out.len();
    let count = u16::try_from(entries.len())
        .map_err(|_| StripError::UnsafeRewrite("demasiadas entradas en el IFD".into()))?;
    let table_len = 2 + entries.len() * IFD_ENTRY_LEN + 4;

    let mut area = Vec::new();
    let mut values = Vec::with_capacity(entries.len());
    out.extend_from_slice(&endian.u16_bytes(count));
    for entry in entries {
        let position = out.len();
        out.extend_from_slice(&endian.u16_bytes(entry.tag));
        out.extend_from_slice(&endian.u16_bytes(entry.field_type));
        out.extend_from_slice(&endian.u32_bytes(entry.count));
        if entry.value.len() <= 4 {
            let mut field = [0u8; 4];
            field[..entry.value.len()].copy_from_slice(&entry.value);
            out.extend_from_slice(&field);
            values.push((entry.tag, position + 8));
        } else {
            let at = start + table_len + area.len();
            out.extend_from_slice(&endian.u32_bytes(to_u32(at)?));
            values.push((entry.tag, at));
            area.extend_from_slice(&entry.value);
            if area.len() % 2 == 1 {
                area.push(0);
            }
        }
    }
    let next_at = out.len();
    out.extend_from_slice(&[0; 4]);
    out.extend_from_slice(&area);
    Ok(WrittenIfd { values, next_at })
}

fn align(out: &mut Vec<u8>) {
    if out.len() % 2 == 1 {
        out.push(0);
    }
}

fn to_u32(value: usize) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| StripError::UnsafeRewrite("offset TIFF mayor de 4 GiB".into()))
}

fn patch(out: &mut [u8], endian: Endian, at: usize, value: usize) -> Result<()> {
    let bytes = endian.u32_bytes(to_u32(value)?);
    let slot = out
        .get_mut(at..at + 4)
        .ok_or_else(|| StripError::UnsafeRewrite(format!("offset {at} fuera de la salida")))?;
    slot.copy_from_slice(&bytes);
    Ok(())
}

/// Entradas de `ifd` incluidas en la lista de conservación.
pub(super) fn kept_entries(
    data: &[u8],
    endian: Endian,
    ifd: &Ifd,
    keep: &KeepSet,
) -> Vec<OwnedEntry> {
    ifd.entries
        .iter()
        .filter(|entry| keep.contains(entry.tag))
        .filter_map(|entry| {
            let owned = OwnedEntry::copy(entry, data, endian);
            if owned.is_none() {
                warn!(tag = format_args!("{:#06x}", entry.tag), "valor ilegible; no se conserva");
            }
            owned
        })
        .collect()
}

/// Entradas conservadas del sub-IFD EXIF al que apunta `ifd0`.
pub(super) fn exif_entries(
    data: &[u8],
    endian: Endian,
    ifd0: &Ifd,
    keep: &KeepSet,
    limits: &Limits,
) -> Result<Vec<OwnedEntry>> {
    if keep.is_empty() {
        return Ok(Vec::new());
    }
    let Some(pointer) = ifd0.find(TAG_EXIF_POINTER) else {
        return Ok(Vec::new());
    };
    let target = pointer
        .first_unsigned(data, endian)
        .ok_or_else(|| StripError::UnsafeRewrite("puntero EXIF ilegible".into()))?
        as usize;
    if target < TIFF_HEADER_LEN || target == ifd0.offset {
        warn!(target, "puntero EXIF inválido; no se conserva el sub-IFD");
        return Ok(Vec::new());
    }
    let ifd = read_ifd(data, endian, target, limits.max_ifd_entries)
        .map_err(|issue| StripError::UnsafeRewrite(issue.to_string()))?;
    Ok(kept_entries(data, endian, &ifd, keep))
}

/// Reconstruye una carga EXIF (TIFF sin prefijo) con las etiquetas conservadas.
///
/// Devuelve `None` si no queda ninguna o si la carga original no se puede
/// leer; en ambos casos la carga se elimina entera.
pub(super) fn rebuild(payload: &[u8], keep: &KeepSet, limits: &Limits) -> Result<Option<Vec<u8>>> {
    if keep.is_empty() {
        return Ok(None);
    }
    let data = payload.strip_prefix(EXIF_PREFIX).unwrap_or(payload);
    let ifd0 = TiffHeader::parse(data).and_then(|header| {
        read_ifd(data, header.endian, header.first_ifd as usize, limits.max_ifd_entries)
            .map(|ifd| (header.endian, ifd))
    });
    let (endian, ifd0) = match ifd0 {
        Ok(parsed) => parsed,
        Err(issue) => {
            warn!(%issue, "EXIF ilegible; se elimina sin conservar etiquetas");
            return Ok(None);
        }
    };

    let page = PageSpec {
        entries: kept_entries(data, endian, &ifd0, keep),
        exif: exif_entries(data, endian, &ifd0, keep, limits)?,
        ..PageSpec::default()
    };
    if page.entries.is_empty() && page.exif.is_empty() {
        return Ok(None);
    }
    write_tiff(endian, &[page]).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn rebuild_keeps_only_listed_entries() {
        let keep = KeepSet::resolve(&["Orientation".into(), "ExposureTime".into()])
            .expect("nombres conocidos");
        let rebuilt = rebuild(&fixtures::gps_exif(), &keep, &Limits::default())
            .expect("reescritura")
            .expect("hay etiquetas conservadas");

        let header = TiffHeader::parse(&rebuilt).expect("cabecera");
        let ifd0 = read_ifd(&rebuilt, header.endian, header.first_ifd as usize, 64).expect("IFD0");
        let tags: Vec<u16> = ifd0.entries.iter().map(|entry| entry.tag).collect();
        assert_eq!(tags, vec![0x0112, TAG_EXIF_POINTER]);

        let target = ifd0
            .find(TAG_EXIF_POINTER)
            .and_then(|entry| entry.first_unsigned(&rebuilt, header.endian))
            .expect("puntero EXIF");
        let exif = read_ifd(&rebuilt, header.endian, target as usize, 64).expect("sub-IFD");
        assert_eq!(exif.entries.len(), 1);
        assert_eq!(exif.entries[0].tag, 0x829A);
        assert_eq!(exif.next, 0);
    }

    #[test]
    fn rebuild_without_matches_drops_payload() {
        let keep = KeepSet::resolve(&["Artist".into()]).expect("nombre conocido");
        let rebuilt = rebuild(&fixtures::gps_exif(), &keep, &Limits::default()).expect("reescritura");
        assert!(rebuilt.is_none());
    }

    #[test]
    fn strips_are_appended_and_offsets_patched() {
        let strip: &[u8] = &[1, 2, 3, 4, 5];
        let page = PageSpec {
            entries: vec![OwnedEntry {
                tag: 0x0117,
                field_type: TYPE_LONG,
                count: 1,
                value: Endian::Big.u32_bytes(5).to_vec(),
            }],
            strips: vec![strip],
            offsets_tag: Some(0x0111),
            ..PageSpec::default()
        };
        let out = write_tiff(Endian::Big, &[page]).expect("escritura");
        let ifd = read_ifd(&out, Endian::Big, 8, 16).expect("IFD0");
        let offset = ifd
            .find(0x0111)
            .and_then(|entry| entry.first_unsigned(&out, Endian::Big))
            .expect("offset de la tira") as usize;
        assert_eq!(&out[offset..offset + strip.len()], strip);
        assert_eq!(offset % 2, 0);
    }
}
