//! Primitivas TIFF compartidas: orden de bytes, cabecera y lectura de IFDs.
//!
//! Todas las lecturas devuelven `Option`/`Result` y validan los límites del
//! buffer antes de tocarlo. Este módulo no sigue punteros por su cuenta; los
//! recorridos con conjunto de offsets visitados viven en cada consumidor.

use crate::error::DecodeIssue;

pub const TIFF_HEADER_LEN: usize = 8;
pub const IFD_ENTRY_LEN: usize = 12;
pub const TIFF_MAGIC: u16 = 42;

pub const TYPE_BYTE: u16 = 1;
pub const TYPE_ASCII: u16 = 2;
pub const TYPE_SHORT: u16 = 3;
pub const TYPE_LONG: u16 = 4;
pub const TYPE_RATIONAL: u16 = 5;
pub const TYPE_SBYTE: u16 = 6;
pub const TYPE_UNDEFINED: u16 = 7;
pub const TYPE_SSHORT: u16 = 8;
pub const TYPE_SLONG: u16 = 9;
pub const TYPE_SRATIONAL: u16 = 10;
pub const TYPE_FLOAT: u16 = 11;
pub const TYPE_DOUBLE: u16 = 12;

/// Tamaño en bytes de un valor del tipo indicado.
pub fn type_unit_size(field_type: u16) -> Option<usize> {
    match field_type {
        TYPE_BYTE | TYPE_ASCII | TYPE_SBYTE | TYPE_UNDEFINED => Some(1),
        TYPE_SHORT | TYPE_SSHORT => Some(2),
        TYPE_LONG | TYPE_SLONG | TYPE_FLOAT => Some(4),
        TYPE_RATIONAL | TYPE_SRATIONAL | TYPE_DOUBLE => Some(8),
        _ => None,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    pub fn read_u16(self, data: &[u8], offset: usize) -> Option<u16> {
        let bytes: [u8; 2] = data.get(offset..offset.checked_add(2)?)?.try_into().ok()?;
        Some(match self {
            Endian::Little => u16::from_le_bytes(bytes),
            Endian::Big => u16::from_be_bytes(bytes),
        })
    }

    pub fn read_u32(self, data: &[u8], offset: usize) -> Option<u32> {
        let bytes: [u8; 4] = data.get(offset..offset.checked_add(4)?)?.try_into().ok()?;
        Some(match self {
            Endian::Little => u32::from_le_bytes(bytes),
            Endian::Big => u32::from_be_bytes(bytes),
        })
    }

    pub fn read_u64(self, data: &[u8], offset: usize) -> Option<u64> {
        let bytes: [u8; 8] = data.get(offset..offset.checked_add(8)?)?.try_into().ok()?;
        Some(match self {
            Endian::Little => u64::from_le_bytes(bytes),
            Endian::Big => u64::from_be_bytes(bytes),
        })
    }

    pub fn u16_bytes(self, value: u16) -> [u8; 2] {
        match self {
            Endian::Little => value.to_le_bytes(),
            Endian::Big => value.to_be_bytes(),
        }
    }

    pub fn u32_bytes(self, value: u32) -> [u8; 4] {
        match self {
            Endian::Little => value.to_le_bytes(),
            Endian::Big => value.to_be_bytes(),
        }
    }

    /// Marca de orden de bytes (`II` o `MM`).
    pub fn marker(self) -> [u8; 2] {
        match self {
            Endian::Little => *b"II",
            Endian::Big => *b"MM",
        }
    }
}

/// Cabecera TIFF: orden de bytes y offset del primer IFD.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TiffHeader {
    pub endian: Endian,
    pub first_ifd: u32,
}

impl TiffHeader {
    pub fn parse(data: &[u8]) -> Result<Self, DecodeIssue> {
        let endian = match data.get(0..2) {
            Some(b"II") => Endian::Little,
            Some(b"MM") => Endian::Big,
            Some(_) => return Err(DecodeIssue::malformed(0, "marca de orden de bytes inválida")),
            None => return Err(DecodeIssue::malformed(0, "cabecera TIFF truncada")),
        };
        let magic = endian
            .read_u16(data, 2)
            .ok_or_else(|| DecodeIssue::malformed(2, "cabecera TIFF truncada"))?;
        if magic != TIFF_MAGIC {
            return Err(DecodeIssue::malformed(2, format!("número mágico {magic} inesperado")));
        }
        let first_ifd = endian
            .read_u32(data, 4)
            .ok_or_else(|| DecodeIssue::malformed(4, "offset del IFD0 truncado"))?;
        Ok(Self { endian, first_ifd })
    }
}

/// Entrada cruda de un IFD. `position` es el offset de la entrada en el buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IfdEntry {
    pub tag: u16,
    pub field_type: u16,
    pub count: u32,
    pub position: usize,
}

impl IfdEntry {
    /// Tamaño total del valor, si el tipo es conocido y no desborda.
    pub fn value_len(&self) -> Option<usize> {
        type_unit_size(self.field_type)?.checked_mul(self.count as usize)
    }

    /// Los cuatro bytes crudos del campo valor/offset.
    pub fn raw_field<'a>(&self, data: &'a [u8]) -> Option<&'a [u8]> {
        data.get(self.position + 8..self.position + 12)
    }

    /// Rango absoluto del valor dentro de `data`, validado contra sus límites.
    pub fn value_range(&self, data: &[u8], endian: Endian) -> Option<std::ops::Range<usize>> {
        let len = self.value_len()?;
        let start = if len <= 4 {
            self.position + 8
        } else {
            endian.read_u32(data, self.position + 8)? as usize
        };
        let end = start.checked_add(len)?;
        (end <= data.len()).then_some(start..end)
    }

    pub fn value_bytes<'a>(&self, data: &'a [u8], endian: Endian) -> Option<&'a [u8]> {
        self.value_range(data, endian).map(|range| &data[range])
    }

    /// Interpreta el valor como lista de enteros sin signo (BYTE, SHORT o LONG).
    pub fn unsigned_values(&self, data: &[u8], endian: Endian, max: usize) -> Option<Vec<u32>> {
        let bytes = self.value_bytes(data, endian)?;
        let unit = type_unit_size(self.field_type)?;
        let count = (self.count as usize).min(max);
        (0..count)
            .map(|index| match self.field_type {
                TYPE_BYTE | TYPE_UNDEFINED => bytes.get(index).map(|b| u32::from(*b)),
                TYPE_SHORT => endian.read_u16(bytes, index * unit).map(u32::from),
                TYPE_LONG => endian.read_u32(bytes, index * unit),
                _ => None,
            })
            .collect()
    }

    pub fn first_unsigned(&self, data: &[u8], endian: Endian) -> Option<u32> {
        self.unsigned_values(data, endian, 1)?.into_iter().next()
    }
}

/// Directorio leído: entradas, puntero al siguiente IFD y rango ocupado.
#[derive(Clone, Debug)]
pub struct Ifd {
    pub offset: usize,
    pub entries: Vec<IfdEntry>,
    pub next: u32,
    /// Número de entradas declarado, que puede superar las leídas.
    pub declared: usize,
}

impl Ifd {
    pub fn table_len(&self) -> usize {
        2 + self.declared * IFD_ENTRY_LEN + 4
    }

    pub fn find(&self, tag: u16) -> Option<&IfdEntry> {
        self.entries.iter().find(|entry| entry.tag == tag)
    }
}

/// Lee el IFD que empieza en `offset`, como mucho `max_entries` entradas.
pub fn read_ifd(
    data: &[u8],
    endian: Endian,
    offset: usize,
    max_entries: usize,
) -> Result<Ifd, DecodeIssue> {
    let declared = endian
        .read_u16(data, offset)
        .ok_or_else(|| DecodeIssue::malformed(offset, "IFD fuera del segmento"))?
        as usize;
    let table_end = offset + 2 + declared * IFD_ENTRY_LEN;
    if table_end > data.len() {
        return Err(DecodeIssue::malformed(
            offset,
            format!("el IFD declara {declared} entradas que exceden el segmento"),
        ));
    }

    let entries = (0..declared.min(max_entries))
        .map(|index| {
            let position = offset + 2 + index * IFD_ENTRY_LEN;
            IfdEntry {
                tag: endian.read_u16(data, position).unwrap_or_default(),
                field_type: endian.read_u16(data, position + 2).unwrap_or_default(),
                count: endian.read_u32(data, position + 4).unwrap_or_default(),
                position,
            }
        })
        .collect();

    let next = endian.read_u32(data, table_end).unwrap_or(0);

    Ok(Ifd {
        offset,
        entries,
        next,
        declared,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_rejects_bad_magic() {
        assert!(TiffHeader::parse(b"II\x2b\x00\x08\x00\x00\x00").is_err());
        let header = TiffHeader::parse(b"MM\x00\x2a\x00\x00\x00\x08").expect("cabecera válida");
        assert_eq!(header.endian, Endian::Big);
        assert_eq!(header.first_ifd, 8);
    }

    #[test]
    fn read_ifd_rejects_oversized_tables() {
        let mut data = b"II\x2a\x00\x08\x00\x00\x00".to_vec();
        data.extend_from_slice(&500u16.to_le_bytes());
        let issue = read_ifd(&data, Endian::Little, 8, 64).unwrap_err();
        assert!(matches!(issue, DecodeIssue::MalformedSegment { offset: 8, .. }));
    }

    #[test]
    fn inline_values_are_read_from_entry() {
        let mut data = b"II\x2a\x00\x08\x00\x00\x00".to_vec();
        data.extend_from_slice(&1u16.to_le_bytes());
        data.extend_from_slice(&0x0112u16.to_le_bytes());
        data.extend_from_slice(&TYPE_SHORT.to_le_bytes());
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&[6, 0, 0, 0]);
        data.extend_from_slice(&0u32.to_le_bytes());

        let ifd = read_ifd(&data, Endian::Little, 8, 64).expect("IFD válido");
        let entry = ifd.find(0x0112).expect("Orientation presente");
        assert_eq!(entry.first_unsigned(&data, Endian::Little), Some(6));
        assert_eq!(ifd.next, 0);
    }

    #[test]
    fn out_of_bounds_value_offsets_are_rejected() {
        let mut data = b"II\x2a\x00\x08\x00\x00\x00".to_vec();
        data.extend_from_slice(&1u16.to_le_bytes());
        data.extend_from_slice(&0x010Fu16.to_le_bytes());
        data.extend_from_slice(&TYPE_ASCII.to_le_bytes());
        data.extend_from_slice(&20u32.to_le_bytes());
        data.extend_from_slice(&0xFFFFu32.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());

        let ifd = read_ifd(&data, Endian::Little, 8, 64).expect("IFD válido");
        assert!(ifd.entries[0].value_bytes(&data, Endian::Little).is_none());
    }
}
