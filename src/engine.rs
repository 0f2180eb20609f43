//! Punto de entrada del motor: análisis y limpieza de una imagen en memoria.
//!
//! Cada llamada es un pipeline independiente sobre un buffer prestado. Lo
//! único compartido entre peticiones es la tabla de riesgo global, de solo
//! lectura.

use crate::config::EngineConfig;
use crate::container::{ImageContainer, ImageFormat, detect_format};
use crate::deadline::Deadline;
use crate::decode::decode_segment;
use crate::error::Result;
use crate::report::{AnalysisReport, BasicInfo, ReportBuilder, basic_info};
use crate::risk::{self, RiskTable};
use crate::sanitize::{SanitizeOptions, sanitize};
use tracing::{field, info, info_span};

/// Resultado de una limpieza.
#[derive(Debug, Clone)]
pub struct CleanOutput {
    pub data: Vec<u8>,
    pub format: ImageFormat,
    /// Segmentos de metadata que tenía la entrada.
    pub removed: usize,
}

#[derive(Debug, Clone)]
pub struct Engine {
    config: EngineConfig,
    table: &'static RiskTable,
}

impl Engine {
    /// Valida la configuración e instala la tabla de riesgo global.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let table = risk::install(&config.risk)?;
        Ok(Self { config, table })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Plazo nuevo según `limits.decode_timeout_ms`.
    pub fn deadline(&self) -> Deadline {
        Deadline::after(self.config.limits.decode_timeout())
    }

    pub fn analyze(&self, data: &[u8]) -> Result<AnalysisReport> {
        self.analyze_with(data, &self.deadline())
    }

    /// Escanea, decodifica y clasifica la metadata de `data`.
    ///
    /// Solo los fallos del contenedor son errores; los problemas de cada
    /// segmento quedan en `notes` del reporte.
    pub fn analyze_with(&self, data: &[u8], deadline: &Deadline) -> Result<AnalysisReport> {
        let limits = &self.config.limits;
        limits.check_input(data.len())?;

        let span = info_span!("analyze", format = field::Empty, size_bytes = data.len());
        let _guard = span.enter();

        let container = ImageContainer::parse(data, limits)?;
        span.record("format", container.format().name());
        deadline.checkpoint("escaneo")?;

        let mut builder =
            ReportBuilder::new(container.format(), self.table).with_tag_limit(limits.max_tags);
        builder.scan_issues(container.issues(), container.is_partial());
        for segment in container.metadata_segments() {
            builder.add(decode_segment(&container, segment, limits));
            deadline.checkpoint("decodificación")?;
        }

        let report = builder.finish();
        info!(
            critical = report.summary.critical,
            warning = report.summary.warning,
            safe = report.summary.safe,
            partial = report.partial,
            elapsed_ms = deadline.elapsed().as_millis() as u64,
            "análisis completado"
        );
        Ok(report)
    }

    pub fn clean(&self, data: &[u8], options: &SanitizeOptions) -> Result<CleanOutput> {
        self.clean_with(data, options, &self.deadline())
    }

    /// Devuelve `data` sin metadata, con los píxeles intactos.
    pub fn clean_with(
        &self,
        data: &[u8],
        options: &SanitizeOptions,
        deadline: &Deadline,
    ) -> Result<CleanOutput> {
        let limits = &self.config.limits;
        limits.check_input(data.len())?;

        let span = info_span!("clean", format = field::Empty, size_bytes = data.len());
        let _guard = span.enter();

        let container = ImageContainer::parse(data, limits)?;
        span.record("format", container.format().name());
        deadline.checkpoint("escaneo")?;

        let removed = container.metadata_segments().count();
        let cleaned = sanitize(&container, options, limits)?;
        deadline.checkpoint("reescritura")?;

        info!(
            removed,
            before = data.len(),
            after = cleaned.len(),
            elapsed_ms = deadline.elapsed().as_millis() as u64,
            "limpieza completada"
        );
        Ok(CleanOutput {
            data: cleaned,
            format: container.format(),
            removed,
        })
    }

    /// Formato, dimensiones, modo de color y MIME de `data`.
    pub fn basic_info(&self, data: &[u8]) -> Result<BasicInfo> {
        self.config.limits.check_input(data.len())?;
        let format = detect_format(data)?;
        Ok(basic_info(data, format))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Limits;
    use crate::error::{DecodeIssue, StripError};
    use crate::fixtures;
    use crate::risk::RiskTier;
    use crate::tag::Namespace;

    fn engine() -> Engine {
        Engine::new(EngineConfig::default()).expect("configuración por defecto")
    }

    #[test]
    fn image_without_metadata_reports_nothing() {
        let report = engine().analyze(&fixtures::bare_png()).expect("PNG válido");
        assert!(report.is_clean());
        assert_eq!(report.summary.total(), 0);
        assert!(!report.partial);
    }

    #[test]
    fn gps_coordinates_are_critical() {
        let report = engine()
            .analyze(&fixtures::jpeg_with_segments(&[fixtures::jpeg_app1_exif(
                &fixtures::gps_exif(),
            )]))
            .expect("JPEG válido");
        assert!(report.summary.critical >= 1);
        let latitude = report
            .tags
            .iter()
            .find(|tag| tag.name == "GPSLatitude")
            .expect("latitud informada");
        assert_eq!(latitude.tier, RiskTier::Critical);
        assert!(report.gps_position().is_some());
    }

    #[test]
    fn iptc_byline_is_a_warning() {
        let report = engine().analyze(&fixtures::jpeg_with_everything()).expect("JPEG válido");
        let byline = report
            .tags
            .iter()
            .find(|tag| tag.namespace == Namespace::Iptc && tag.value.contains("Ana Fotógrafa"))
            .expect("autor IPTC informado");
        assert_eq!(byline.tier, RiskTier::Warning);
    }

    #[test]
    fn cyclic_ifd_keeps_tags_before_the_loop() {
        let data = fixtures::jpeg_with_segments(&[fixtures::jpeg_app1_exif(&fixtures::cyclic_exif())]);
        let report = engine().analyze(&data).expect("análisis con ciclo");
        assert!(report.tags.iter().any(|tag| tag.name == "Make"));
        assert!(!report.notes.is_empty());
    }

    #[test]
    fn soi_only_jpeg_is_truncated_for_both_operations() {
        let engine = engine();
        let data = [0xFF, 0xD8];
        assert!(matches!(engine.analyze(&data), Err(StripError::TruncatedInput { .. })));
        assert!(matches!(
            engine.clean(&data, &SanitizeOptions::default()),
            Err(StripError::TruncatedInput { .. })
        ));
    }

    #[test]
    fn cleaned_output_analyzes_as_clean() {
        let engine = engine();
        let samples = [
            fixtures::jpeg_with_everything(),
            fixtures::png_with_everything(),
            fixtures::webp_with_everything(),
            fixtures::tiff_with_metadata(),
        ];
        for sample in &samples {
            let before = engine.analyze(sample).expect("análisis previo");
            assert!(!before.is_clean());

            let cleaned = engine
                .clean(sample, &SanitizeOptions::default())
                .expect("limpieza");
            assert!(cleaned.removed > 0);
            let after = engine.analyze(&cleaned.data).expect("análisis posterior");
            assert!(after.is_clean(), "{:?}: {:?}", cleaned.format, after.tags);
        }
    }

    #[test]
    fn artist_on_a_later_tiff_page_is_reported_and_cleaned() {
        let engine = engine();
        let original = fixtures::three_page_tiff();
        let report = engine.analyze(&original).expect("TIFF de tres páginas");
        let artist = report
            .tags
            .iter()
            .find(|tag| tag.name == "Artist")
            .expect("autor de la tercera página");
        assert_eq!(artist.value, "Ana Fotografa");

        let cleaned = engine
            .clean(&original, &SanitizeOptions::default())
            .expect("limpieza");
        assert!(engine.analyze(&cleaned.data).expect("salida").is_clean());
    }

    #[test]
    fn deeply_nested_xmp_becomes_a_note() {
        let packet = fixtures::deeply_nested_xmp(4000);
        let data = fixtures::jpeg_with_segments(&[fixtures::jpeg_app1_xmp(&packet)]);
        let report = engine().analyze(&data).expect("JPEG con XMP anidado");
        assert!(report.tags.iter().all(|tag| tag.namespace != Namespace::Xmp));
        assert!(
            report
                .notes
                .iter()
                .any(|note| matches!(note, DecodeIssue::LimitExceeded { .. }))
        );
    }

    #[test]
    fn oversized_input_is_rejected_before_parsing() {
        let engine = Engine {
            config: EngineConfig {
                limits: Limits {
                    max_input_bytes: 8,
                    ..Limits::default()
                },
                ..EngineConfig::default()
            },
            table: risk::table(),
        };
        let result = engine.analyze(&fixtures::bare_png());
        assert!(matches!(result, Err(StripError::InputTooLarge { limit: 8, .. })));
    }

    #[test]
    fn cancelled_deadline_stops_analysis() {
        let engine = engine();
        let deadline = Deadline::none();
        deadline.handle().cancel();
        let result = engine.analyze_with(&fixtures::jpeg_with_everything(), &deadline);
        assert!(matches!(result, Err(StripError::Cancelled)));
    }

    #[test]
    fn basic_info_detects_format_first() {
        let engine = engine();
        assert_eq!(engine.basic_info(&fixtures::bare_png()).expect("PNG").size, "1×1");
        assert!(matches!(
            engine.basic_info(b"GIF89a......"),
            Err(StripError::UnsupportedFormat)
        ));
    }
}
