//! Configuración del motor: límites por petición y ajustes de la tabla de riesgo.

use crate::error::{Result, StripError};
use crate::risk::RiskTier;
use crate::tag::{Namespace, TagId};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuración completa del motor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub limits: Limits,
    pub risk: RiskConfig,
}

/// Cotas de recursos aplicadas a cada petición antes y durante la decodificación.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Tamaño máximo de la imagen de entrada en bytes
    pub max_input_bytes: usize,

    /// Segmentos de metadata que se registran por contenedor
    pub max_segments: usize,

    /// Marcadores o chunks recorridos por contenedor
    pub max_chunks: usize,

    /// Entradas leídas por IFD
    pub max_ifd_entries: usize,

    /// Etiquetas decodificadas por petición
    pub max_tags: usize,

    /// Datasets IPTC por segmento
    pub max_iptc_datasets: usize,

    /// Plazo de procesamiento en milisegundos (0 = sin plazo)
    pub decode_timeout_ms: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_input_bytes: 25 * 1024 * 1024,
            max_segments: 256,
            max_chunks: 100_000,
            max_ifd_entries: 1024,
            max_tags: 4096,
            max_iptc_datasets: 2048,
            decode_timeout_ms: 10_000,
        }
    }
}

impl Limits {
    pub fn decode_timeout(&self) -> Option<Duration> {
        (self.decode_timeout_ms > 0).then(|| Duration::from_millis(self.decode_timeout_ms))
    }

    /// Rechaza entradas por encima de `max_input_bytes`.
    pub fn check_input(&self, size: usize) -> Result<()> {
        if size > self.max_input_bytes {
            return Err(StripError::InputTooLarge {
                size,
                limit: self.max_input_bytes,
            });
        }
        Ok(())
    }
}

/// Ajustes de la tabla de riesgo aplicados sobre la tabla integrada.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub overrides: Vec<RiskOverride>,
}

/// Fila `{ namespace, tag, tier }` de la configuración.
///
/// `tag` acepta un id numérico (`"0x8825"`, `"34853"`), un par IPTC
/// `"2:80"` o una clave XMP/texto como `"dc:creator"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskOverride {
    pub namespace: Namespace,
    pub tag: String,
    pub tier: RiskTier,
}

impl RiskOverride {
    pub fn tag_id(&self) -> Result<TagId> {
        TagId::parse(self.namespace, &self.tag).ok_or_else(|| {
            StripError::Config(format!(
                "identificador de etiqueta '{}' inválido para {}",
                self.tag, self.namespace
            ))
        })
    }
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(raw).map_err(|err| StripError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        let limits = &self.limits;
        let required = [
            ("max_input_bytes", limits.max_input_bytes),
            ("max_segments", limits.max_segments),
            ("max_chunks", limits.max_chunks),
            ("max_ifd_entries", limits.max_ifd_entries),
            ("max_tags", limits.max_tags),
            ("max_iptc_datasets", limits.max_iptc_datasets),
        ];
        if let Some((name, _)) = required.iter().find(|(_, value)| *value == 0) {
            return Err(StripError::Config(format!("limits.{name} debe ser mayor que 0")));
        }
        for row in &self.risk.overrides {
            row.tag_id()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = EngineConfig::from_toml_str("").expect("configuración vacía");
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.limits.max_segments, 256);
        assert_eq!(config.limits.decode_timeout(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn parses_limits_and_overrides() {
        let raw = r#"
            [limits]
            max_input_bytes = 1048576
            decode_timeout_ms = 0

            [[risk.overrides]]
            namespace = "iptc"
            tag = "2:120"
            tier = "warning"

            [[risk.overrides]]
            namespace = "exif"
            tag = "0x0131"
            tier = "critical"
        "#;
        let config = EngineConfig::from_toml_str(raw).expect("configuración válida");
        assert_eq!(config.limits.max_input_bytes, 1_048_576);
        assert_eq!(config.limits.max_tags, 4096);
        assert!(config.limits.decode_timeout().is_none());
        assert_eq!(config.risk.overrides.len(), 2);
        assert_eq!(
            config.risk.overrides[1].tag_id().ok(),
            Some(TagId::Numeric(0x0131))
        );
    }

    #[test]
    fn rejects_zero_limits_and_bad_tags() {
        let zero = EngineConfig::from_toml_str("[limits]\nmax_segments = 0\n");
        assert!(matches!(zero, Err(StripError::Config(_))));

        let bad_tag = r#"
            [[risk.overrides]]
            namespace = "exif"
            tag = "no-es-un-numero"
            tier = "safe"
        "#;
        assert!(matches!(
            EngineConfig::from_toml_str(bad_tag),
            Err(StripError::Config(_))
        ));
    }

    #[test]
    fn input_size_is_checked() {
        let limits = Limits {
            max_input_bytes: 10,
            ..Limits::default()
        };
        assert!(limits.check_input(10).is_ok());
        assert!(matches!(
            limits.check_input(11),
            Err(StripError::InputTooLarge { size: 11, limit: 10 })
        ));
    }
}
