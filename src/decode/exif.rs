//! Decodificador EXIF sobre estructuras TIFF.
//!
//! Recorre IFD0, IFD1 (o todas las páginas de un TIFF nativo) y los sub-IFD
//! EXIF, GPS e Interop con una lista de trabajo explícita y un conjunto de offsets visitados. Un puntero a un
//! offset ya visitado o fuera del segmento se registra como problema y el
//! recorrido sigue con las entradas restantes.

use super::exif_tags::{
    self, EMBEDDED_PAYLOAD_TAGS, IfdKind, TAG_EXIF_POINTER, TAG_GPS_POINTER, TAG_INTEROP_POINTER,
    TAG_SUB_IFDS,
};
use super::{DecodeOutcome, DecodedTag};
use crate::config::Limits;
use crate::container::ifd::{
    Endian, Ifd, IfdEntry, TIFF_HEADER_LEN, TYPE_ASCII, TYPE_BYTE, TYPE_DOUBLE, TYPE_FLOAT,
    TYPE_LONG, TYPE_RATIONAL, TYPE_SBYTE, TYPE_SHORT, TYPE_SLONG, TYPE_SRATIONAL, TYPE_SSHORT,
    TYPE_UNDEFINED, TiffHeader, read_ifd,
};
use crate::error::DecodeIssue;
use crate::tag::{Namespace, TagId};
use chrono::{NaiveDate, NaiveDateTime};
use encoding_rs::{SHIFT_JIS, UTF_16BE, UTF_16LE};
use std::collections::{HashMap, HashSet, VecDeque};

/// Prefijo de APP1 que algunos escritores dejan también en WebP y PNG.
pub const EXIF_PREFIX: &[u8] = b"Exif\0\0";

/// Valores numéricos que se muestran como máximo por etiqueta.
const MAX_RENDERED_VALUES: usize = 64;

/// Cómo interpretar la estructura TIFF recibida.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExifMode {
    /// Carga EXIF embebida en otro contenedor.
    Embedded,
    /// Archivo TIFF nativo: las etiquetas estructurales no son metadata.
    Tiff,
}

pub fn decode(payload: &[u8], mode: ExifMode, limits: &Limits) -> DecodeOutcome {
    let data = payload.strip_prefix(EXIF_PREFIX).unwrap_or(payload);
    let header = match TiffHeader::parse(data) {
        Ok(header) => header,
        Err(issue) => return DecodeOutcome::failed(issue),
    };

    let mut walker = Walker {
        data,
        endian: header.endian,
        mode,
        limits,
        outcome: DecodeOutcome::default(),
        gps: GpsContext::default(),
    };
    walker.run(header.first_ifd as usize);
    walker.outcome
}

struct Walker<'a> {
    data: &'a [u8],
    endian: Endian,
    mode: ExifMode,
    limits: &'a Limits,
    outcome: DecodeOutcome,
    gps: GpsContext,
}

impl<'a> Walker<'a> {
    fn run(&mut self, first_ifd: usize) {
        let mut worklist = VecDeque::from([(first_ifd, IfdKind::Primary)]);
        let mut visited = HashSet::new();
        let mut pages = 1;

        while let Some((offset, kind)) = worklist.pop_front() {
            if !visited.insert(offset) {
                self.outcome.issue(DecodeIssue::CycleDetected { offset });
                continue;
            }
            if offset < TIFF_HEADER_LEN || offset >= self.data.len() {
                self.outcome.issue(DecodeIssue::malformed(
                    offset,
                    format!("puntero de IFD {kind:?} fuera del segmento"),
                ));
                continue;
            }
            let ifd = match read_ifd(self.data, self.endian, offset, self.limits.max_ifd_entries) {
                Ok(ifd) => ifd,
                Err(issue) => {
                    self.outcome.issue(issue);
                    continue;
                }
            };
            if ifd.declared > self.limits.max_ifd_entries {
                self.outcome.issue(DecodeIssue::LimitExceeded {
                    resource: "entradas de IFD",
                    limit: self.limits.max_ifd_entries,
                });
            }

            if ifd.next != 0 {
                match (self.mode, kind) {
                    (ExifMode::Embedded, IfdKind::Primary) => {
                        worklist.push_back((ifd.next as usize, IfdKind::Thumbnail));
                    }
                    (ExifMode::Tiff, IfdKind::Primary | IfdKind::Page(_)) => {
                        if pages >= self.limits.max_chunks {
                            self.outcome.issue(DecodeIssue::LimitExceeded {
                                resource: "páginas TIFF",
                                limit: self.limits.max_chunks,
                            });
                        } else {
                            pages += 1;
                            worklist.push_back((ifd.next as usize, IfdKind::Page(pages)));
                        }
                    }
                    _ => {}
                }
            }
            if kind == IfdKind::Gps {
                self.gps = GpsContext::read(&ifd, self.data, self.endian);
            }

            for entry in &ifd.entries {
                if let Some(child) = pointer_target(kind, entry.tag) {
                    match entry.first_unsigned(self.data, self.endian) {
                        Some(0) => {}
                        Some(target) => worklist.push_back((target as usize, child)),
                        None => self.outcome.issue(DecodeIssue::malformed(
                            entry.position,
                            "puntero de sub-IFD ilegible",
                        )),
                    }
                    continue;
                }
                if self.skipped(kind, entry.tag) {
                    continue;
                }
                if !self.push(kind, entry) {
                    return;
                }
            }

            if kind == IfdKind::Gps {
                if let Some(position) = self.gps.position() {
                    let tag = DecodedTag::new(
                        Namespace::Gps,
                        TagId::Key("GPSPosition".into()),
                        "GPSPosition",
                        position,
                    );
                    if !self.push_tag(tag) {
                        return;
                    }
                }
            }
        }
    }

    fn skipped(&self, kind: IfdKind, tag: u16) -> bool {
        if tag == TAG_SUB_IFDS {
            return true;
        }
        self.mode == ExifMode::Tiff
            && matches!(kind, IfdKind::Primary | IfdKind::Thumbnail | IfdKind::Page(_))
            && (exif_tags::is_structural(tag) || EMBEDDED_PAYLOAD_TAGS.contains(&tag))
    }

    /// Registra el problema si ya no caben más etiquetas.
    fn tag_limit_reached(&mut self) -> bool {
        let full = self.outcome.tags.len() >= self.limits.max_tags;
        if full {
            self.outcome.issue(DecodeIssue::LimitExceeded {
                resource: "etiquetas",
                limit: self.limits.max_tags,
            });
        }
        full
    }

    /// Añade una etiqueta ya decodificada; devuelve `false` si se alcanzó el
    /// límite de etiquetas.
    fn push_tag(&mut self, tag: DecodedTag) -> bool {
        if self.tag_limit_reached() {
            return false;
        }
        self.outcome.tags.push(tag);
        true
    }

    /// Decodifica y añade la entrada; devuelve `false` si se alcanzó el límite.
    fn push(&mut self, kind: IfdKind, entry: &IfdEntry) -> bool {
        if self.tag_limit_reached() {
            return false;
        }
        let Some(value) = self.render(kind, entry) else {
            self.outcome.issue(DecodeIssue::malformed(
                entry.position,
                format!("valor ilegible en la etiqueta 0x{:04X}", entry.tag),
            ));
            return true;
        };
        let namespace = if kind == IfdKind::Gps {
            Namespace::Gps
        } else {
            Namespace::Exif
        };
        self.outcome.tags.push(DecodedTag::new(
            namespace,
            TagId::Numeric(entry.tag),
            exif_tags::display_name(kind, entry.tag),
            value,
        ));
        true
    }

    fn render(&mut self, kind: IfdKind, entry: &IfdEntry) -> Option<String> {
        let data = self.data;
        let bytes = entry.value_bytes(data, self.endian)?;
        self.render_special(kind, entry, bytes)
            .or_else(|| render_generic(entry.field_type, bytes, self.endian))
    }

    fn render_special(&mut self, kind: IfdKind, entry: &IfdEntry, bytes: &[u8]) -> Option<String> {
        let endian = self.endian;
        match (kind, entry.tag) {
            (IfdKind::Gps, 0x0000) => Some(
                bytes
                    .iter()
                    .map(u8::to_string)
                    .collect::<Vec<_>>()
                    .join("."),
            ),
            (IfdKind::Gps, tag @ (0x0002 | 0x0004 | 0x0014 | 0x0016)) => {
                let values = rationals(entry, bytes, endian)?;
                let mut decimal = dms_to_decimal(&values)?;
                if matches!(self.gps.refs.get(&(tag - 1)), Some('S' | 'W')) {
                    decimal = -decimal;
                }
                match tag {
                    0x0002 => self.gps.latitude = Some(decimal),
                    0x0004 => self.gps.longitude = Some(decimal),
                    _ => {}
                }
                Some(format!("{decimal:.6}"))
            }
            (IfdKind::Gps, 0x0006) => {
                let altitude = first_rational(entry, bytes, endian)?;
                let sign = if self.gps.below_sea_level { "-" } else { "" };
                Some(format!("{sign}{} m", format_float(altitude)))
            }
            (IfdKind::Gps, 0x0007) => {
                let values = rationals(entry, bytes, endian)?;
                let [hours, minutes, seconds] = values.get(..3)? else {
                    return None;
                };
                let seconds = if seconds.fract() == 0.0 {
                    format!("{:02}", *seconds as u32)
                } else {
                    format!("{seconds:05.2}")
                };
                Some(format!("{:02}:{:02}:{seconds}", *hours as u32, *minutes as u32))
            }
            (IfdKind::Gps, 0x001D) => {
                let raw = ascii(bytes);
                Some(
                    NaiveDate::parse_from_str(&raw, "%Y:%m:%d")
                        .map(|date| date.format("%Y-%m-%d").to_string())
                        .unwrap_or(raw),
                )
            }
            (IfdKind::Gps, 0x001B | 0x001C) => Some(encoded_text(bytes, endian)),
            (IfdKind::Gps, _) => None,
            (IfdKind::Interop, 0x0002) => Some(ascii(bytes)),
            (IfdKind::Interop, _) => None,
            (_, 0x0132 | 0x9003 | 0x9004) => {
                let raw = ascii(bytes);
                Some(iso_datetime(&raw).unwrap_or(raw))
            }
            (_, 0x829A) => {
                let seconds = first_rational(entry, bytes, endian)?;
                if seconds <= 0.0 {
                    return None;
                }
                if seconds < 1.0 {
                    Some(format!("1/{} s", (1.0 / seconds).round()))
                } else {
                    Some(format!("{} s", format_float(seconds)))
                }
            }
            (_, 0x829D) => first_rational(entry, bytes, endian).map(|f| format!("f/{f:.1}")),
            (_, 0x920A) => {
                first_rational(entry, bytes, endian).map(|mm| format!("{} mm", format_float(mm)))
            }
            (_, 0x927C) => Some(format!("({} bytes)", bytes.len())),
            (_, 0x9286) => Some(encoded_text(bytes, endian)),
            (_, 0x9C9B..=0x9C9F) => Some(trim_text(&UTF_16LE.decode_without_bom_handling(bytes).0)),
            (_, 0x9000 | 0xA000) => Some(ascii(bytes)),
            _ => None,
        }
    }
}

/// Sub-IFD al que apunta una etiqueta puntero dentro de `kind`.
fn pointer_target(kind: IfdKind, tag: u16) -> Option<IfdKind> {
    match (kind, tag) {
        (IfdKind::Primary | IfdKind::Page(_), TAG_EXIF_POINTER) => Some(IfdKind::Exif),
        (IfdKind::Primary | IfdKind::Page(_), TAG_GPS_POINTER) => Some(IfdKind::Gps),
        (IfdKind::Exif, TAG_INTEROP_POINTER) => Some(IfdKind::Interop),
        _ => None,
    }
}

/// Referencias de hemisferio y altitud leídas antes de interpretar el IFD GPS.
#[derive(Debug, Default)]
struct GpsContext {
    refs: HashMap<u16, char>,
    below_sea_level: bool,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

impl GpsContext {
    fn read(ifd: &Ifd, data: &[u8], endian: Endian) -> Self {
        let mut context = Self::default();
        for tag in [0x0001, 0x0003, 0x0013, 0x0015] {
            let reference = ifd
                .find(tag)
                .and_then(|entry| entry.value_bytes(data, endian))
                .and_then(|bytes| ascii(bytes).chars().next())
                .map(|c| c.to_ascii_uppercase());
            if let Some(reference) = reference {
                context.refs.insert(tag, reference);
            }
        }
        context.below_sea_level = ifd
            .find(0x0005)
            .and_then(|entry| entry.first_unsigned(data, endian))
            == Some(1);
        context
    }

    fn position(&self) -> Option<String> {
        let (lat, lon) = (self.latitude?, self.longitude?);
        Some(format!("{lat:.6}, {lon:.6}"))
    }
}

fn render_generic(field_type: u16, bytes: &[u8], endian: Endian) -> Option<String> {
    match field_type {
        TYPE_ASCII => Some(ascii(bytes)),
        TYPE_UNDEFINED => Some(undefined(bytes)),
        _ => numbers(field_type, bytes, endian).map(|values| values.join(", ")),
    }
}

fn numbers(field_type: u16, bytes: &[u8], endian: Endian) -> Option<Vec<String>> {
    let unit = crate::container::ifd::type_unit_size(field_type)?;
    let count = (bytes.len() / unit).min(MAX_RENDERED_VALUES);
    (0..count)
        .map(|index| {
            let at = index * unit;
            match field_type {
                TYPE_BYTE => bytes.get(at).map(u8::to_string),
                TYPE_SBYTE => bytes.get(at).map(|b| (*b as i8).to_string()),
                TYPE_SHORT => endian.read_u16(bytes, at).map(|v| v.to_string()),
                TYPE_SSHORT => endian.read_u16(bytes, at).map(|v| (v as i16).to_string()),
                TYPE_LONG => endian.read_u32(bytes, at).map(|v| v.to_string()),
                TYPE_SLONG => endian.read_u32(bytes, at).map(|v| (v as i32).to_string()),
                TYPE_RATIONAL | TYPE_SRATIONAL => {
                    let numerator = endian.read_u32(bytes, at)?;
                    let denominator = endian.read_u32(bytes, at + 4)?;
                    Some(if field_type == TYPE_SRATIONAL {
                        format_rational(i64::from(numerator as i32), i64::from(denominator as i32))
                    } else {
                        format_rational(i64::from(numerator), i64::from(denominator))
                    })
                }
                TYPE_FLOAT => endian
                    .read_u32(bytes, at)
                    .map(|bits| format_float(f64::from(f32::from_bits(bits)))),
                TYPE_DOUBLE => endian
                    .read_u64(bytes, at)
                    .map(|bits| format_float(f64::from_bits(bits))),
                _ => None,
            }
        })
        .collect()
}

/// Racionales como `f64`; `None` si algún denominador es cero.
fn rationals(entry: &IfdEntry, bytes: &[u8], endian: Endian) -> Option<Vec<f64>> {
    if !matches!(entry.field_type, TYPE_RATIONAL | TYPE_SRATIONAL) {
        return None;
    }
    let count = (bytes.len() / 8).min(MAX_RENDERED_VALUES);
    (0..count)
        .map(|index| {
            let numerator = endian.read_u32(bytes, index * 8)?;
            let denominator = endian.read_u32(bytes, index * 8 + 4)?;
            if denominator == 0 {
                return None;
            }
            Some(if entry.field_type == TYPE_SRATIONAL {
                f64::from(numerator as i32) / f64::from(denominator as i32)
            } else {
                f64::from(numerator) / f64::from(denominator)
            })
        })
        .collect()
}

fn first_rational(entry: &IfdEntry, bytes: &[u8], endian: Endian) -> Option<f64> {
    rationals(entry, bytes, endian)?.into_iter().next()
}

/// Grados, minutos y segundos a grados decimales sin signo.
fn dms_to_decimal(values: &[f64]) -> Option<f64> {
    let degrees = *values.first()?;
    let minutes = values.get(1).copied().unwrap_or(0.0);
    let seconds = values.get(2).copied().unwrap_or(0.0);
    let decimal = degrees.abs() + minutes.abs() / 60.0 + seconds.abs() / 3600.0;
    decimal.is_finite().then_some(decimal)
}

fn format_rational(numerator: i64, denominator: i64) -> String {
    if denominator == 0 {
        return format!("{numerator}/{denominator}");
    }
    format_float(numerator as f64 / denominator as f64)
}

pub(crate) fn format_float(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{value:.0}");
    }
    let formatted = format!("{value:.4}");
    formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

fn iso_datetime(raw: &str) -> Option<String> {
    NaiveDateTime::parse_from_str(raw.trim(), "%Y:%m:%d %H:%M:%S")
        .ok()
        .map(|datetime| datetime.format("%Y-%m-%dT%H:%M:%S").to_string())
}

fn ascii(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim().to_string()
}

fn trim_text(text: &str) -> String {
    text.trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_string()
}

fn undefined(bytes: &[u8]) -> String {
    let content = bytes
        .iter()
        .rposition(|b| *b != 0)
        .map_or(&bytes[..0], |last| &bytes[..=last]);
    let printable = !content.is_empty()
        && content.len() <= 64
        && content.iter().all(|b| (0x20..=0x7E).contains(b));
    if printable {
        String::from_utf8_lossy(content).into_owned()
    } else {
        format!("({} bytes)", bytes.len())
    }
}

/// Texto con prefijo de juego de caracteres de 8 bytes (UserComment y similares).
fn encoded_text(bytes: &[u8], endian: Endian) -> String {
    if bytes.len() < 8 {
        return trim_text(&String::from_utf8_lossy(bytes));
    }
    let (charset, body) = bytes.split_at(8);
    let text = match charset {
        b"UNICODE\0" => {
            let encoding = match endian {
                Endian::Little => UTF_16LE,
                Endian::Big => UTF_16BE,
            };
            encoding.decode_without_bom_handling(body).0.into_owned()
        }
        b"JIS\0\0\0\0\0" => SHIFT_JIS.decode(body).0.into_owned(),
        _ => String::from_utf8_lossy(body).into_owned(),
    };
    trim_text(&text)
}
