//! Decodificador IPTC-IIM.
//!
//! Cada dataset empieza con `0x1C`, seguido del número de registro, el de
//! dataset y una longitud big-endian de 2 bytes (o extendida si el bit alto
//! está activo). El juego de caracteres lo fija el dataset 1:90; sin él los
//! textos se leen como Windows-1252, superconjunto de Latin-1.

use super::{DecodeOutcome, DecodedTag};
use crate::config::Limits;
use crate::container::{be_u16, be_u32};
use crate::error::DecodeIssue;
use crate::tag::{Namespace, TagId};
use chrono::NaiveDate;
use encoding_rs::WINDOWS_1252;

const TAG_MARKER: u8 = 0x1C;
const HEADER_LEN: usize = 5;
/// Secuencia ISO 2022 que declara UTF-8 en el dataset 1:90.
const UTF8_ESCAPE: &[u8] = &[0x1B, 0x25, 0x47];

const ENVELOPE_RECORD: &[(u8, &str)] = &[
    (0, "EnvelopeRecordVersion"),
    (5, "Destination"),
    (20, "FileFormat"),
    (22, "FileVersion"),
    (30, "ServiceIdentifier"),
    (40, "EnvelopeNumber"),
    (50, "ProductID"),
    (60, "EnvelopePriority"),
    (70, "DateSent"),
    (80, "TimeSent"),
    (90, "CodedCharacterSet"),
    (100, "UniqueObjectName"),
    (120, "ARMIdentifier"),
    (122, "ARMVersion"),
];

const APPLICATION_RECORD: &[(u8, &str)] = &[
    (0, "ApplicationRecordVersion"),
    (3, "ObjectTypeReference"),
    (4, "ObjectAttributeReference"),
    (5, "ObjectName"),
    (7, "EditStatus"),
    (10, "Urgency"),
    (12, "SubjectReference"),
    (15, "Category"),
    (20, "SupplementalCategories"),
    (22, "FixtureIdentifier"),
    (25, "Keywords"),
    (26, "ContentLocationCode"),
    (27, "ContentLocationName"),
    (30, "ReleaseDate"),
    (35, "ReleaseTime"),
    (37, "ExpirationDate"),
    (38, "ExpirationTime"),
    (40, "SpecialInstructions"),
    (42, "ActionAdvised"),
    (45, "ReferenceService"),
    (47, "ReferenceDate"),
    (50, "ReferenceNumber"),
    (55, "DateCreated"),
    (60, "TimeCreated"),
    (62, "DigitalCreationDate"),
    (63, "DigitalCreationTime"),
    (65, "OriginatingProgram"),
    (70, "ProgramVersion"),
    (75, "ObjectCycle"),
    (80, "By-line"),
    (85, "By-lineTitle"),
    (90, "City"),
    (92, "Sub-location"),
    (95, "Province-State"),
    (100, "Country-PrimaryLocationCode"),
    (101, "Country-PrimaryLocationName"),
    (103, "OriginalTransmissionReference"),
    (105, "Headline"),
    (110, "Credit"),
    (115, "Source"),
    (116, "CopyrightNotice"),
    (118, "Contact"),
    (120, "Caption-Abstract"),
    (121, "LocalCaption"),
    (122, "Writer-Editor"),
    (130, "ImageType"),
    (131, "ImageOrientation"),
    (135, "LanguageIdentifier"),
];

pub fn dataset_name(record: u8, dataset: u8) -> String {
    let table = match record {
        1 => ENVELOPE_RECORD,
        2 => APPLICATION_RECORD,
        _ => &[],
    };
    table
        .iter()
        .find(|(id, _)| *id == dataset)
        .map(|(_, name)| (*name).to_string())
        .unwrap_or_else(|| format!("IPTC {record}:{dataset}"))
}

/// Datasets que contienen enteros binarios en lugar de texto.
fn is_binary(record: u8, dataset: u8) -> bool {
    matches!((record, dataset), (1, 0 | 20 | 22 | 120 | 122) | (2, 0))
}

fn is_date(record: u8, dataset: u8) -> bool {
    matches!((record, dataset), (1, 70) | (2, 30 | 37 | 47 | 55 | 62))
}

fn is_time(record: u8, dataset: u8) -> bool {
    matches!((record, dataset), (1, 80) | (2, 35 | 38 | 60 | 63))
}

pub fn decode(payload: &[u8], limits: &Limits) -> DecodeOutcome {
    let mut outcome = DecodeOutcome::default();
    let mut utf8 = false;
    let mut pos = 0;
    let mut datasets = 0usize;

    while pos < payload.len() {
        if payload[pos] != TAG_MARKER {
            // Relleno nulo al final del recurso.
            if payload[pos..].iter().all(|b| *b == 0) {
                break;
            }
            outcome.issue(DecodeIssue::malformed(pos, "se esperaba 0x1C al inicio del dataset"));
            break;
        }
        if datasets >= limits.max_iptc_datasets {
            outcome.issue(DecodeIssue::LimitExceeded {
                resource: "datasets IPTC",
                limit: limits.max_iptc_datasets,
            });
            break;
        }
        let Some((record, dataset, value_start, length)) = read_header(payload, pos) else {
            outcome.issue(DecodeIssue::malformed(pos, "cabecera de dataset truncada"));
            break;
        };
        let Some(value) = value_start
            .checked_add(length)
            .and_then(|end| payload.get(value_start..end))
        else {
            outcome.issue(DecodeIssue::malformed(
                pos,
                format!("el dataset {record}:{dataset} excede el segmento"),
            ));
            break;
        };
        datasets += 1;
        pos = value_start + length;

        if (record, dataset) == (1, 90) {
            utf8 = value.starts_with(UTF8_ESCAPE);
        }
        if outcome.tags.len() >= limits.max_tags {
            outcome.issue(DecodeIssue::LimitExceeded {
                resource: "etiquetas",
                limit: limits.max_tags,
            });
            break;
        }
        outcome.tags.push(DecodedTag::new(
            Namespace::Iptc,
            TagId::Dataset { record, dataset },
            dataset_name(record, dataset),
            render(record, dataset, value, utf8),
        ));
    }

    outcome
}

/// Devuelve registro, dataset, inicio del valor y longitud.
fn read_header(payload: &[u8], pos: usize) -> Option<(u8, u8, usize, usize)> {
    let record = *payload.get(pos + 1)?;
    let dataset = *payload.get(pos + 2)?;
    let declared = be_u16(payload, pos + 3)?;
    if declared & 0x8000 == 0 {
        return Some((record, dataset, pos + HEADER_LEN, declared as usize));
    }
    // Longitud extendida: los 15 bits bajos indican cuántos bytes la codifican.
    let width = (declared & 0x7FFF) as usize;
    let field = pos + HEADER_LEN;
    let length = match width {
        1 => *payload.get(field)? as usize,
        2 => be_u16(payload, field)? as usize,
        4 => be_u32(payload, field)? as usize,
        _ => return None,
    };
    Some((record, dataset, field + width, length))
}

fn render(record: u8, dataset: u8, value: &[u8], utf8: bool) -> String {
    if is_binary(record, dataset) {
        return match value {
            [high, low] => u16::from_be_bytes([*high, *low]).to_string(),
            _ => value.iter().map(u8::to_string).collect::<Vec<_>>().join(" "),
        };
    }
    if (record, dataset) == (1, 90) {
        return if value.starts_with(UTF8_ESCAPE) {
            "UTF-8".into()
        } else {
            format!("({} bytes)", value.len())
        };
    }

    let text = if utf8 {
        String::from_utf8_lossy(value).into_owned()
    } else {
        WINDOWS_1252.decode_without_bom_handling(value).0.into_owned()
    };
    let text = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());

    if is_date(record, dataset) {
        if let Ok(date) = NaiveDate::parse_from_str(text, "%Y%m%d") {
            return date.format("%Y-%m-%d").to_string();
        }
    }
    if is_time(record, dataset) {
        if let Some(time) = format_time(text) {
            return time;
        }
    }
    text.to_string()
}

/// `HHMMSS±HHMM` → `HH:MM:SS±HH:MM`.
fn format_time(raw: &str) -> Option<String> {
    if raw.len() < 6 || !raw.is_char_boundary(6) || !raw[..6].bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let clock = format!("{}:{}:{}", &raw[0..2], &raw[2..4], &raw[4..6]);
    let zone = &raw[6..];
    if zone.len() == 5 && zone.is_ascii() && (zone.starts_with('+') || zone.starts_with('-')) {
        return Some(format!("{clock}{}:{}", &zone[..3], &zone[3..]));
    }
    Some(clock)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::iptc_dataset;

    #[test]
    fn decodes_byline_city_and_keywords() {
        let mut data = iptc_dataset(2, 0, &[0, 4]);
        data.extend(iptc_dataset(2, 80, b"Ana Fotografa"));
        data.extend(iptc_dataset(2, 90, b"Valencia"));
        data.extend(iptc_dataset(2, 25, b"playa"));
        data.extend(iptc_dataset(2, 25, b"verano"));
        data.extend(iptc_dataset(2, 55, b"20240501"));
        data.extend(iptc_dataset(2, 60, b"102030+0200"));

        let outcome = decode(&data, &Limits::default());
        assert!(outcome.issues.is_empty());
        let pairs: Vec<(&str, &str)> = outcome
            .tags
            .iter()
            .map(|t| (t.name.as_str(), t.value.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("ApplicationRecordVersion", "4"),
                ("By-line", "Ana Fotografa"),
                ("City", "Valencia"),
                ("Keywords", "playa"),
                ("Keywords", "verano"),
                ("DateCreated", "2024-05-01"),
                ("TimeCreated", "10:20:30+02:00"),
            ]
        );
    }

    #[test]
    fn charset_follows_coded_character_set() {
        let latin1 = iptc_dataset(2, 80, &[b'J', b'o', b's', 0xE9]);
        let outcome = decode(&latin1, &Limits::default());
        assert_eq!(outcome.tags[0].value, "José");

        let mut utf8 = iptc_dataset(1, 90, UTF8_ESCAPE);
        utf8.extend(iptc_dataset(2, 80, "José".as_bytes()));
        let outcome = decode(&utf8, &Limits::default());
        assert_eq!(outcome.tags[0].value, "UTF-8");
        assert_eq!(outcome.tags[1].value, "José");
    }

    #[test]
    fn unknown_datasets_keep_generic_label() {
        let outcome = decode(&iptc_dataset(3, 7, b"x"), &Limits::default());
        assert_eq!(outcome.tags[0].name, "IPTC 3:7");
        assert_eq!(
            outcome.tags[0].id,
            TagId::Dataset {
                record: 3,
                dataset: 7
            }
        );
    }

    #[test]
    fn garbage_stops_with_malformed_issue() {
        let mut data = iptc_dataset(2, 5, b"Titulo");
        data.extend_from_slice(&[0x42, 0x00, 0x01]);
        let outcome = decode(&data, &Limits::default());
        assert_eq!(outcome.tags.len(), 1);
        assert!(matches!(
            outcome.issues[0],
            DecodeIssue::MalformedSegment { .. }
        ));

        let mut padded = iptc_dataset(2, 5, b"Titulo");
        padded.extend_from_slice(&[0, 0]);
        assert!(decode(&padded, &Limits::default()).issues.is_empty());
    }

    #[test]
    fn overrunning_length_is_reported() {
        let mut data = vec![TAG_MARKER, 2, 80];
        data.extend_from_slice(&40u16.to_be_bytes());
        data.extend_from_slice(b"corto");
        let outcome = decode(&data, &Limits::default());
        assert!(outcome.tags.is_empty());
        assert_eq!(outcome.issues.len(), 1);
    }

    #[test]
    fn extended_lengths_are_read() {
        let mut data = vec![TAG_MARKER, 2, 120];
        data.extend_from_slice(&0x8002u16.to_be_bytes());
        data.extend_from_slice(&3u16.to_be_bytes());
        data.extend_from_slice(b"abc");
        let outcome = decode(&data, &Limits::default());
        assert_eq!(outcome.tags[0].value, "abc");
    }

    #[test]
    fn dataset_limit_is_enforced() {
        let limits = Limits {
            max_iptc_datasets: 1,
            ..Limits::default()
        };
        let mut data = iptc_dataset(2, 25, b"a");
        data.extend(iptc_dataset(2, 25, b"b"));
        let outcome = decode(&data, &limits);
        assert_eq!(outcome.tags.len(), 1);
        assert!(matches!(
            outcome.issues[0],
            DecodeIssue::LimitExceeded { .. }
        ));
    }
}
