//! Tipos de error del motor de StripClean.
//!
//! Solo los fallos a nivel de contenedor son fatales y se devuelven como
//! [`StripError`]. Los problemas dentro de un segmento concreto se registran
//! como [`DecodeIssue`] y el análisis continúa con el resto de la imagen.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Error fatal para una petición completa.
#[derive(Debug, Error)]
pub enum StripError {
    /// La firma del archivo no corresponde a ningún formato soportado.
    #[error("Formato de imagen no soportado")]
    UnsupportedFormat,

    /// El buffer es más corto que una estructura obligatoria.
    #[error("Entrada truncada: se necesitaban {needed} bytes y solo hay {available}")]
    TruncatedInput { needed: usize, available: usize },

    /// No se puede garantizar una reescritura que preserve los píxeles.
    #[error("Reescritura insegura: {0}")]
    UnsafeRewrite(String),

    /// La entrada supera el límite configurado.
    #[error("La entrada ocupa {size} bytes y el límite es {limit}")]
    InputTooLarge { size: usize, limit: usize },

    /// El plazo de procesamiento expiró o el cliente canceló la petición.
    #[error("Procesamiento cancelado")]
    Cancelled,

    /// Configuración inválida.
    #[error("Error de configuración: {0}")]
    Config(String),

    #[error("Error de E/S: {0}")]
    Io(#[from] std::io::Error),
}

impl StripError {
    pub(crate) fn truncated(needed: usize, available: usize) -> Self {
        Self::TruncatedInput { needed, available }
    }

    /// Nombre estable de la clase de error, útil para respuestas y registros.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedFormat => "UnsupportedFormat",
            Self::TruncatedInput { .. } => "TruncatedInput",
            Self::UnsafeRewrite(_) => "UnsafeRewrite",
            Self::InputTooLarge { .. } => "InputTooLarge",
            Self::Cancelled => "Cancelled",
            Self::Config(_) => "Config",
            Self::Io(_) => "Io",
        }
    }
}

pub type Result<T> = std::result::Result<T, StripError>;

/// Problema recuperable detectado al recorrer o decodificar un segmento.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecodeIssue {
    /// La estructura interna del segmento está rota.
    MalformedSegment { offset: usize, reason: String },
    /// Un puntero de IFD apunta a un offset ya visitado.
    CycleDetected { offset: usize },
    /// Se alcanzó uno de los límites de recursos configurados.
    LimitExceeded { resource: &'static str, limit: usize },
}

impl DecodeIssue {
    pub(crate) fn malformed(offset: usize, reason: impl Into<String>) -> Self {
        Self::MalformedSegment {
            offset,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for DecodeIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedSegment { offset, reason } => {
                write!(f, "segmento mal formado en {offset:#x}: {reason}")
            }
            Self::CycleDetected { offset } => {
                write!(f, "ciclo de IFD detectado en {offset:#x}")
            }
            Self::LimitExceeded { resource, limit } => {
                write!(f, "límite de {resource} alcanzado ({limit})")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_includes_sizes() {
        let err = StripError::truncated(4, 2);
        assert_eq!(
            err.to_string(),
            "Entrada truncada: se necesitaban 4 bytes y solo hay 2"
        );
        assert_eq!(err.kind(), "TruncatedInput");
    }

    #[test]
    fn issue_display_uses_hex_offsets() {
        let issue = DecodeIssue::CycleDetected { offset: 0x1a };
        assert_eq!(issue.to_string(), "ciclo de IFD detectado en 0x1a");
    }
}
