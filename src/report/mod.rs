//! Modelo del reporte de análisis y su construcción a partir de los segmentos decodificados.

mod basic;
pub mod export;

pub use basic::{BasicInfo, basic_info};

use crate::container::ImageFormat;
use crate::decode::DecodeOutcome;
use crate::error::DecodeIssue;
use crate::risk::{RiskTable, RiskTier};
use crate::tag::{MetadataTag, Namespace};
use serde::Serialize;
use tracing::warn;

/// Conteo de etiquetas por nivel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub critical: usize,
    pub warning: usize,
    pub safe: usize,
}

impl Summary {
    fn count(&mut self, tier: RiskTier) {
        match tier {
            RiskTier::Critical => self.critical += 1,
            RiskTier::Warning => self.warning += 1,
            RiskTier::Safe => self.safe += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.critical + self.warning + self.safe
    }
}

/// Reporte inmutable de un análisis.
///
/// `metadata` conserva el orden de decodificación; `notes` recoge los
/// problemas locales (segmentos rotos, ciclos, límites) que no abortaron el
/// análisis.
#[derive(Clone, Debug, Serialize)]
pub struct AnalysisReport {
    pub format: ImageFormat,
    #[serde(rename = "metadata")]
    pub tags: Vec<MetadataTag>,
    pub summary: Summary,
    pub partial: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<DecodeIssue>,
}

impl AnalysisReport {
    /// Imagen sin ninguna etiqueta de metadata.
    pub fn is_clean(&self) -> bool {
        self.tags.is_empty()
    }

    /// Etiquetas de mayor a menor riesgo, estable dentro de cada nivel.
    pub fn sorted_by_risk(&self) -> Vec<&MetadataTag> {
        let mut sorted: Vec<&MetadataTag> = self.tags.iter().collect();
        sorted.sort_by(|a, b| b.tier.cmp(&a.tier));
        sorted
    }

    /// Posición GPS derivada, si la imagen la tiene.
    pub fn gps_position(&self) -> Option<&MetadataTag> {
        self.tags
            .iter()
            .find(|tag| tag.namespace == Namespace::Gps && tag.name == "GPSPosition")
    }
}

/// Acumula los resultados de cada segmento y los clasifica.
pub struct ReportBuilder<'t> {
    table: &'t RiskTable,
    format: ImageFormat,
    tags: Vec<MetadataTag>,
    summary: Summary,
    partial: bool,
    notes: Vec<DecodeIssue>,
    max_tags: usize,
}

impl<'t> ReportBuilder<'t> {
    pub fn new(format: ImageFormat, table: &'t RiskTable) -> Self {
        Self {
            table,
            format,
            tags: Vec::new(),
            summary: Summary::default(),
            partial: false,
            notes: Vec::new(),
            max_tags: usize::MAX,
        }
    }

    /// Cota total de etiquetas del reporte.
    pub fn with_tag_limit(mut self, max_tags: usize) -> Self {
        self.max_tags = max_tags;
        self
    }

    /// Problemas del escaneo del contenedor.
    pub fn scan_issues(&mut self, issues: &[DecodeIssue], partial: bool) {
        self.partial |= partial;
        self.notes.extend_from_slice(issues);
    }

    /// Clasifica y añade las etiquetas de un segmento.
    pub fn add(&mut self, outcome: DecodeOutcome) {
        self.notes.extend(outcome.issues);
        for decoded in outcome.tags {
            if self.tags.len() >= self.max_tags {
                let issue = DecodeIssue::LimitExceeded {
                    resource: "etiquetas del reporte",
                    limit: self.max_tags,
                };
                warn!(%issue, "reporte truncado");
                self.notes.push(issue);
                self.partial = true;
                return;
            }
            let tier = self.table.classify(decoded.namespace, &decoded.id);
            self.summary.count(tier);
            self.tags.push(MetadataTag {
                name: decoded.name,
                value: decoded.value,
                tier,
                namespace: decoded.namespace,
                id: decoded.id,
            });
        }
    }

    pub fn finish(self) -> AnalysisReport {
        AnalysisReport {
            format: self.format,
            tags: self.tags,
            summary: self.summary,
            partial: self.partial,
            notes: self.notes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::DecodedTag;
    use crate::tag::TagId;

    fn decoded(namespace: Namespace, id: TagId, name: &str) -> DecodedTag {
        DecodedTag {
            namespace,
            id,
            name: name.to_string(),
            value: "x".to_string(),
        }
    }

    #[test]
    fn empty_builder_yields_clean_report() {
        let table = RiskTable::builtin();
        let report = ReportBuilder::new(ImageFormat::Png, &table).finish();
        assert!(report.is_clean());
        assert_eq!(report.summary, Summary::default());
        let json = serde_json::to_value(&report).expect("serializable");
        assert_eq!(json["metadata"], serde_json::json!([]));
        assert_eq!(json["summary"]["critical"], 0);
    }

    #[test]
    fn keeps_decode_order_and_counts_tiers() {
        let table = RiskTable::builtin();
        let mut builder = ReportBuilder::new(ImageFormat::Jpeg, &table);
        builder.add(DecodeOutcome {
            tags: vec![
                decoded(Namespace::Exif, TagId::Numeric(0x0131), "Software"),
                decoded(Namespace::Gps, TagId::Numeric(0x0002), "GPSLatitude"),
                decoded(Namespace::Exif, TagId::Numeric(0x010F), "Make"),
            ],
            issues: Vec::new(),
        });
        let report = builder.finish();

        let names: Vec<&str> = report.tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Software", "GPSLatitude", "Make"]);
        assert_eq!(
            report.summary,
            Summary {
                critical: 1,
                warning: 1,
                safe: 1
            }
        );

        let sorted: Vec<&str> = report.sorted_by_risk().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(sorted, vec!["GPSLatitude", "Make", "Software"]);
    }

    #[test]
    fn tag_limit_truncates_and_notes() {
        let table = RiskTable::builtin();
        let mut builder = ReportBuilder::new(ImageFormat::Jpeg, &table).with_tag_limit(1);
        builder.add(DecodeOutcome {
            tags: vec![
                decoded(Namespace::Exif, TagId::Numeric(0x010F), "Make"),
                decoded(Namespace::Exif, TagId::Numeric(0x0110), "Model"),
            ],
            issues: Vec::new(),
        });
        let report = builder.finish();
        assert_eq!(report.tags.len(), 1);
        assert_eq!(report.summary.total(), 1);
        assert!(report.partial);
        assert_eq!(report.notes.len(), 1);
    }
}
