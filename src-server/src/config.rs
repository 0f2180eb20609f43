//! Configuración del servidor: dirección de escucha, CORS y motor.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use stripclean::EngineConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Acepta peticiones desde cualquier origen (el frontend corre en otro puerto).
    pub cors: bool,
    pub engine: EngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            cors: true,
            engine: EngineConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("no se pudo leer {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("configuración inválida en {}", path.display()))?;
        config.engine.validate()?;
        Ok(config)
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: ServerConfig = toml::from_str(
            r#"
            port = 8080

            [engine.limits]
            max_input_bytes = 1048576
            "#,
        )
        .expect("TOML válido");
        assert_eq!(config.port, 8080);
        assert_eq!(config.host, "127.0.0.1");
        assert!(config.cors);
        assert_eq!(config.engine.limits.max_input_bytes, 1_048_576);
        assert_eq!(config.engine.limits.max_segments, 256);
    }
}
