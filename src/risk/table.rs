use super::RiskTier;
use crate::config::RiskConfig;
use crate::error::Result;
use crate::tag::{Namespace, TagId};
use std::collections::HashMap;

/// Etiquetas EXIF que identifican a la persona o al equipo.
const EXIF_WARNING: &[u16] = &[
    0x010F, // Make
    0x0110, // Model
    0x013B, // Artist
    0x013C, // HostComputer
    0x0132, // DateTime
    0x8298, // Copyright
    0x9003, // DateTimeOriginal
    0x9004, // DateTimeDigitized
    0x927C, // MakerNote
    0x9286, // UserComment
    0x9C9D, // XPAuthor
    0xA420, // ImageUniqueID
    0xA430, // CameraOwnerName
    0xA431, // BodySerialNumber
    0xA434, // LensModel
    0xA435, // LensSerialNumber
    0xC614, // UniqueCameraModel
    0xC62F, // CameraSerialNumber
];

/// Autoría, contacto y ubicación precisa en IPTC (registro 2).
const IPTC_WARNING: &[u8] = &[
    26,  // ContentLocationCode
    27,  // ContentLocationName
    55,  // DateCreated
    60,  // TimeCreated
    80,  // By-line
    85,  // By-lineTitle
    90,  // City
    92,  // Sub-location
    95,  // Province-State
    100, // Country-PrimaryLocationCode
    101, // Country-PrimaryLocationName
    116, // CopyrightNotice
    118, // Contact
    122, // Writer-Editor
];

/// Nombres locales XMP (sin prefijo, en minúsculas).
const XMP_WARNING: &[&str] = &[
    "creator",
    "rights",
    "owner",
    "ownername",
    "cameraownername",
    "serialnumber",
    "bodyserialnumber",
    "lensserialnumber",
    "imageuniqueid",
    "make",
    "model",
    "lens",
    "lensmodel",
    "createdate",
    "datetimeoriginal",
    "datecreated",
    "modifydate",
    "city",
    "state",
    "country",
    "location",
    "sublocation",
    "authorsposition",
    "captionwriter",
    "ciadrextadr",
    "ciadrcity",
    "ciadrregion",
    "ciadrpcode",
    "ciadrctry",
    "ciemailwork",
    "citelwork",
    "ciurlwork",
];

/// Palabras clave de texto PNG.
const TEXT_WARNING: &[&str] = &["author", "copyright", "source", "artist"];

/// Tabla `(espacio de nombres, etiqueta) → nivel`.
///
/// Las claves XMP y de texto se normalizan a su nombre local en minúsculas,
/// de modo que `dc:creator`, `creator` y `Iptc4xmpCore:X/dc:creator`
/// comparten fila.
#[derive(Debug, Clone, Default)]
pub struct RiskTable {
    builtin: HashMap<(Namespace, TagId), RiskTier>,
    overrides: HashMap<(Namespace, TagId), RiskTier>,
}

impl RiskTable {
    pub fn builtin() -> Self {
        let mut builtin = HashMap::new();
        for tag in EXIF_WARNING {
            builtin.insert((Namespace::Exif, TagId::Numeric(*tag)), RiskTier::Warning);
        }
        for dataset in IPTC_WARNING {
            let id = TagId::Dataset {
                record: 2,
                dataset: *dataset,
            };
            builtin.insert((Namespace::Iptc, id), RiskTier::Warning);
        }
        for key in XMP_WARNING {
            builtin.insert((Namespace::Xmp, TagId::Key((*key).to_string())), RiskTier::Warning);
        }
        for key in TEXT_WARNING {
            builtin.insert((Namespace::Text, TagId::Key((*key).to_string())), RiskTier::Warning);
        }
        Self {
            builtin,
            overrides: HashMap::new(),
        }
    }

    /// Tabla integrada con los ajustes de configuración aplicados encima.
    pub fn with_overrides(config: &RiskConfig) -> Result<Self> {
        let mut table = Self::builtin();
        for row in &config.overrides {
            let id = normalize(row.namespace, &row.tag_id()?);
            table.overrides.insert((row.namespace, id), row.tier);
        }
        Ok(table)
    }

    /// Clasificación total y determinista; lo desconocido es `Safe`.
    ///
    /// Todo lo procedente de GPS es `Critical` y ningún ajuste lo rebaja.
    pub fn classify(&self, namespace: Namespace, id: &TagId) -> RiskTier {
        if namespace == Namespace::Gps {
            return RiskTier::Critical;
        }
        let key = (namespace, normalize(namespace, id));
        if namespace == Namespace::Xmp
            && matches!(&key.1, TagId::Key(local) if local.starts_with("gps"))
        {
            return RiskTier::Critical;
        }
        self.overrides
            .get(&key)
            .or_else(|| self.builtin.get(&key))
            .copied()
            .unwrap_or(RiskTier::Safe)
    }
}

/// Nombre local en minúsculas del último componente de una clave XMP o de texto.
fn normalize(namespace: Namespace, id: &TagId) -> TagId {
    match (namespace, id) {
        (Namespace::Xmp | Namespace::Text, TagId::Key(key)) => {
            let last = key.rsplit('/').next().unwrap_or(key);
            let local = last.rsplit(':').next().unwrap_or(last);
            TagId::Key(local.to_ascii_lowercase())
        }
        _ => id.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RiskOverride;

    fn key(value: &str) -> TagId {
        TagId::Key(value.to_string())
    }

    #[test]
    fn gps_is_always_critical() {
        let table = RiskTable::builtin();
        assert_eq!(table.classify(Namespace::Gps, &TagId::Numeric(0x0002)), RiskTier::Critical);
        assert_eq!(table.classify(Namespace::Gps, &key("GPSPosition")), RiskTier::Critical);
        assert_eq!(table.classify(Namespace::Xmp, &key("exif:GPSLatitude")), RiskTier::Critical);
    }

    #[test]
    fn identity_fields_are_warnings() {
        let table = RiskTable::builtin();
        assert_eq!(table.classify(Namespace::Exif, &TagId::Numeric(0xA431)), RiskTier::Warning);
        assert_eq!(table.classify(Namespace::Exif, &TagId::Numeric(0xA435)), RiskTier::Warning);
        assert_eq!(table.classify(Namespace::Exif, &TagId::Numeric(0xA430)), RiskTier::Warning);
        let byline = TagId::Dataset {
            record: 2,
            dataset: 80,
        };
        assert_eq!(table.classify(Namespace::Iptc, &byline), RiskTier::Warning);
        assert_eq!(table.classify(Namespace::Xmp, &key("dc:creator")), RiskTier::Warning);
        assert_eq!(
            table.classify(
                Namespace::Xmp,
                &key("Iptc4xmpCore:CreatorContactInfo/Iptc4xmpCore:CiEmailWork")
            ),
            RiskTier::Warning
        );
        assert_eq!(table.classify(Namespace::Text, &key("Author")), RiskTier::Warning);
    }

    #[test]
    fn processing_and_unknown_fields_are_safe() {
        let table = RiskTable::builtin();
        assert_eq!(table.classify(Namespace::Exif, &TagId::Numeric(0x0131)), RiskTier::Safe);
        assert_eq!(table.classify(Namespace::Exif, &TagId::Numeric(0xBEEF)), RiskTier::Safe);
        assert_eq!(table.classify(Namespace::Xmp, &key("xmp:CreatorTool")), RiskTier::Safe);
        let caption = TagId::Dataset {
            record: 2,
            dataset: 120,
        };
        assert_eq!(table.classify(Namespace::Iptc, &caption), RiskTier::Safe);
    }

    #[test]
    fn overrides_apply_but_never_demote_gps() -> Result<()> {
        let config = RiskConfig {
            overrides: vec![
                RiskOverride {
                    namespace: Namespace::Iptc,
                    tag: "2:120".into(),
                    tier: RiskTier::Warning,
                },
                RiskOverride {
                    namespace: Namespace::Exif,
                    tag: "0x010F".into(),
                    tier: RiskTier::Safe,
                },
                RiskOverride {
                    namespace: Namespace::Gps,
                    tag: "2".into(),
                    tier: RiskTier::Safe,
                },
            ],
        };
        let table = RiskTable::with_overrides(&config)?;
        let caption = TagId::Dataset {
            record: 2,
            dataset: 120,
        };
        assert_eq!(table.classify(Namespace::Iptc, &caption), RiskTier::Warning);
        assert_eq!(table.classify(Namespace::Exif, &TagId::Numeric(0x010F)), RiskTier::Safe);
        assert_eq!(table.classify(Namespace::Gps, &TagId::Numeric(2)), RiskTier::Critical);
        Ok(())
    }

    #[test]
    fn classification_is_deterministic() {
        let a = RiskTable::builtin();
        let b = RiskTable::builtin();
        for tag in 0..=0xFFFFu16 {
            let id = TagId::Numeric(tag);
            assert_eq!(a.classify(Namespace::Exif, &id), b.classify(Namespace::Exif, &id));
        }
    }
}
