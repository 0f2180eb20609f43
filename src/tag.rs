//! Modelo de etiqueta de metadata ya clasificada.

use crate::risk::RiskTier;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Espacio de nombres del que procede una etiqueta.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    Exif,
    Gps,
    Iptc,
    Xmp,
    /// Chunks textuales PNG y comentarios JPEG.
    Text,
}

impl Namespace {
    pub fn label(self) -> &'static str {
        match self {
            Namespace::Exif => "Exif",
            Namespace::Gps => "GPS",
            Namespace::Iptc => "IPTC",
            Namespace::Xmp => "XMP",
            Namespace::Text => "Text",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Identificador de etiqueta dentro de su espacio de nombres.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TagId {
    /// Etiqueta TIFF/EXIF.
    Numeric(u16),
    /// Par registro:dataset IPTC.
    Dataset { record: u8, dataset: u8 },
    /// Clave textual (XMP `prefijo:nombre`, palabra clave PNG).
    Key(String),
}

impl TagId {
    /// Interpreta un identificador escrito por una persona.
    ///
    /// EXIF y GPS aceptan `0x8825` o `34853`; IPTC acepta `2:80`; XMP y
    /// texto aceptan cualquier clave no vacía.
    pub fn parse(namespace: Namespace, raw: &str) -> Option<Self> {
        let raw = raw.trim();
        match namespace {
            Namespace::Exif | Namespace::Gps => parse_numeric(raw).map(TagId::Numeric),
            Namespace::Iptc => {
                let (record, dataset) = raw.split_once(':')?;
                Some(TagId::Dataset {
                    record: record.trim().parse().ok()?,
                    dataset: dataset.trim().parse().ok()?,
                })
            }
            Namespace::Xmp | Namespace::Text => {
                (!raw.is_empty()).then(|| TagId::Key(raw.to_string()))
            }
        }
    }

    pub fn numeric(&self) -> Option<u16> {
        match self {
            TagId::Numeric(value) => Some(*value),
            _ => None,
        }
    }
}

/// Acepta hexadecimal con prefijo `0x` o decimal.
pub(crate) fn parse_numeric(raw: &str) -> Option<u16> {
    match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16).ok(),
        None => raw.parse().ok(),
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagId::Numeric(tag) => write!(f, "0x{tag:04X}"),
            TagId::Dataset { record, dataset } => write!(f, "{record}:{dataset}"),
            TagId::Key(key) => f.write_str(key),
        }
    }
}

impl Serialize for TagId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Etiqueta decodificada y clasificada. Inmutable una vez construida.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MetadataTag {
    #[serde(rename = "tag")]
    pub name: String,
    pub value: String,
    #[serde(rename = "threat")]
    pub tier: RiskTier,
    pub namespace: Namespace,
    pub id: TagId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ids_per_namespace() {
        assert_eq!(TagId::parse(Namespace::Gps, "0x0002"), Some(TagId::Numeric(2)));
        assert_eq!(TagId::parse(Namespace::Exif, "271"), Some(TagId::Numeric(0x010F)));
        assert_eq!(
            TagId::parse(Namespace::Iptc, "2:80"),
            Some(TagId::Dataset {
                record: 2,
                dataset: 80
            })
        );
        assert_eq!(
            TagId::parse(Namespace::Xmp, "dc:creator"),
            Some(TagId::Key("dc:creator".into()))
        );
        assert_eq!(TagId::parse(Namespace::Iptc, "80"), None);
        assert_eq!(TagId::parse(Namespace::Text, "  "), None);
    }

    #[test]
    fn serializes_with_report_field_names() {
        let tag = MetadataTag {
            name: "GPSLatitude".into(),
            value: "40.446111".into(),
            tier: RiskTier::Critical,
            namespace: Namespace::Gps,
            id: TagId::Numeric(2),
        };
        let json = serde_json::to_value(&tag).expect("serializable");
        assert_eq!(json["tag"], "GPSLatitude");
        assert_eq!(json["threat"], "critical");
        assert_eq!(json["namespace"], "gps");
        assert_eq!(json["id"], "0x0002");
    }
}
