//! StripClean: análisis y limpieza de metadata en imágenes JPEG, PNG, TIFF y WebP.
//!
//! El motor trabaja sobre un buffer en memoria. [`Engine::analyze`] informa
//! cada etiqueta EXIF, IPTC, XMP o de texto con su nivel de riesgo, y
//! [`Engine::clean`] devuelve la imagen sin metadata con los píxeles
//! intactos.

pub mod config;
pub mod container;
pub mod deadline;
pub mod decode;
pub mod engine;
pub mod error;
#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;
pub mod logging;
pub mod report;
pub mod risk;
pub mod sanitize;
pub mod tag;

pub use config::{EngineConfig, Limits, RiskConfig, RiskOverride};
pub use container::{ImageContainer, ImageFormat};
pub use deadline::{CancelHandle, CancelOnDrop, Deadline};
pub use engine::{CleanOutput, Engine};
pub use error::{DecodeIssue, Result, StripError};
pub use report::{AnalysisReport, BasicInfo, Summary};
pub use risk::RiskTier;
pub use sanitize::SanitizeOptions;
pub use tag::{MetadataTag, Namespace, TagId};
