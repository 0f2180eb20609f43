//! Clasificación de etiquetas por nivel de riesgo para la privacidad.
//!
//! La tabla se construye una vez al arrancar ([`install`]) a partir de la
//! tabla integrada y de los ajustes de configuración, y después solo se lee.

mod table;

pub use table::RiskTable;

use crate::config::RiskConfig;
use crate::error::Result;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

/// Nivel de riesgo, ordenado de menor a mayor.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    #[default]
    Safe,
    Warning,
    Critical,
}

impl RiskTier {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskTier::Safe => "safe",
            RiskTier::Warning => "warning",
            RiskTier::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static TABLE: OnceCell<RiskTable> = OnceCell::new();

/// Instala la tabla global con los ajustes de `config`.
///
/// Solo la primera llamada tiene efecto; las siguientes devuelven la tabla ya
/// instalada.
pub fn install(config: &RiskConfig) -> Result<&'static RiskTable> {
    if let Some(existing) = TABLE.get() {
        if !config.overrides.is_empty() {
            warn!("la tabla de riesgo ya estaba instalada; se ignoran los nuevos ajustes");
        }
        return Ok(existing);
    }
    let built = RiskTable::with_overrides(config)?;
    let overrides = config.overrides.len();
    let table = TABLE.get_or_init(|| built);
    info!(overrides, "tabla de riesgo instalada");
    Ok(table)
}

/// Tabla global; la integrada si nadie llamó a [`install`].
pub fn table() -> &'static RiskTable {
    TABLE.get_or_init(RiskTable::builtin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::{Namespace, TagId};

    #[test]
    fn tiers_are_ordered() {
        assert!(RiskTier::Critical > RiskTier::Warning);
        assert!(RiskTier::Warning > RiskTier::Safe);
        assert_eq!(serde_json::to_string(&RiskTier::Warning).ok().as_deref(), Some("\"warning\""));
    }

    #[test]
    fn global_table_is_stable_across_calls() {
        let first = table().classify(Namespace::Gps, &TagId::Numeric(2));
        let installed = install(&RiskConfig::default()).expect("instalación");
        assert_eq!(first, RiskTier::Critical);
        assert_eq!(installed.classify(Namespace::Gps, &TagId::Numeric(2)), first);
        assert!(std::ptr::eq(installed, table()));
    }
}
