//! Exportación de reportes de análisis en JSON y texto plano.

use super::{AnalysisReport, BasicInfo};
use crate::error::{Result, StripError};
use serde::Serialize;
use std::fs;
use std::path::Path;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Txt,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Txt => "txt",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ExportFormat::Json => "JSON",
            ExportFormat::Txt => "TXT",
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = StripError;

    fn from_str(input: &str) -> Result<Self> {
        match input.to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "txt" | "text" => Ok(ExportFormat::Txt),
            _ => Err(StripError::Config(format!(
                "formato de exportación '{input}' no reconocido"
            ))),
        }
    }
}

/// Reporte de un archivo tal como se exporta.
#[derive(Serialize)]
pub struct ExportDocument<'a> {
    pub file: &'a str,
    pub basic_info: &'a BasicInfo,
    #[serde(flatten)]
    pub report: &'a AnalysisReport,
}

pub fn export_report(document: &ExportDocument<'_>, format: ExportFormat, path: &Path) -> Result<()> {
    let contents = match format {
        ExportFormat::Json => render_json(document)?,
        ExportFormat::Txt => render_txt(document),
    };
    fs::write(path, contents)?;
    Ok(())
}

pub fn render_json(document: &ExportDocument<'_>) -> Result<String> {
    serde_json::to_string_pretty(document).map_err(|err| StripError::Io(err.into()))
}

pub fn render_txt(document: &ExportDocument<'_>) -> String {
    let report = document.report;
    let basic = document.basic_info;
    let mut output = String::new();
    output.push_str("Reporte de metadata\n");
    output.push_str("===================\n\n");

    append_title(&mut output, "Información básica");
    output.push_str(&format!("- Archivo: {}\n", document.file));
    output.push_str(&format!("- Formato: {}\n", basic.format));
    output.push_str(&format!("- Resolución: {}\n", basic.size));
    output.push_str(&format!("- Modo: {}\n", basic.mode));
    output.push_str(&format!("- MIME: {}\n\n", basic.mime));

    append_title(&mut output, "Metadata");
    if report.is_clean() {
        output.push_str("(Sin metadata)\n\n");
    } else {
        for tag in report.sorted_by_risk() {
            output.push_str(&format!(
                "- [{}] {}: {} ({})\n",
                tag.namespace, tag.name, tag.value, tag.tier
            ));
        }
        output.push('\n');
    }

    append_title(&mut output, "Resumen");
    output.push_str(&format!("- Críticas: {}\n", report.summary.critical));
    output.push_str(&format!("- Advertencias: {}\n", report.summary.warning));
    output.push_str(&format!("- Seguras: {}\n\n", report.summary.safe));

    if let Some(position) = report.gps_position() {
        output.push_str(&format!(
            "Nota: la imagen revela su ubicación ({}).\n\n",
            position.value
        ));
    }

    if !report.notes.is_empty() {
        append_title(&mut output, "Avisos");
        for note in &report.notes {
            output.push_str(&format!("- {note}\n"));
        }
        output.push('\n');
    }

    output
}

fn append_title(output: &mut String, title: &str) {
    output.push_str(title);
    output.push('\n');
    output.push_str(&"-".repeat(title.chars().count()));
    output.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ImageFormat;
    use crate::report::Summary;
    use crate::risk::RiskTier;
    use crate::tag::{MetadataTag, Namespace, TagId};
    use tempfile::tempdir;

    fn sample() -> (BasicInfo, AnalysisReport) {
        let basic = BasicInfo {
            format: "JPEG".into(),
            size: "4×3".into(),
            mode: "RGB".into(),
            mime: "image/jpeg".into(),
            dimensions: Some((4, 3)),
        };
        let report = AnalysisReport {
            format: ImageFormat::Jpeg,
            tags: vec![
                MetadataTag {
                    name: "Software".into(),
                    value: "GIMP".into(),
                    tier: RiskTier::Safe,
                    namespace: Namespace::Exif,
                    id: TagId::Numeric(0x0131),
                },
                MetadataTag {
                    name: "GPSPosition".into(),
                    value: "40.446111, -79.982222".into(),
                    tier: RiskTier::Critical,
                    namespace: Namespace::Gps,
                    id: TagId::Key("GPSPosition".into()),
                },
            ],
            summary: Summary {
                critical: 1,
                warning: 0,
                safe: 1,
            },
            partial: false,
            notes: Vec::new(),
        };
        (basic, report)
    }

    #[test]
    fn parses_format_names() {
        assert_eq!("JSON".parse::<ExportFormat>().ok(), Some(ExportFormat::Json));
        assert_eq!("text".parse::<ExportFormat>().ok(), Some(ExportFormat::Txt));
        assert!("xlsx".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn txt_lists_critical_first_with_gps_note() {
        let (basic, report) = sample();
        let document = ExportDocument {
            file: "foto.jpg",
            basic_info: &basic,
            report: &report,
        };
        let text = render_txt(&document);
        let gps = text.find("GPSPosition").expect("GPS listado");
        let software = text.find("Software").expect("Software listado");
        assert!(gps < software);
        assert!(text.contains("revela su ubicación"));
        assert!(text.contains("- Resolución: 4×3"));
    }

    #[test]
    fn json_export_is_written() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let (basic, report) = sample();
        let document = ExportDocument {
            file: "foto.jpg",
            basic_info: &basic,
            report: &report,
        };
        let dir = tempdir()?;
        let path = dir.path().join("reporte.json");
        export_report(&document, ExportFormat::Json, &path)?;

        let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        assert_eq!(json["file"], "foto.jpg");
        assert_eq!(json["basic_info"]["size"], "4×3");
        assert_eq!(json["metadata"][1]["threat"], "critical");
        assert_eq!(json["summary"]["safe"], 1);
        Ok(())
    }
}
