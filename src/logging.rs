//! Inicialización del registro estructurado con `tracing`.

use std::sync::Once;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Filtro por defecto cuando `RUST_LOG` no está definido.
const DEFAULT_FILTER: &str = "stripclean=info,stripclean_server=info,tower_http=info";

fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("stripclean=debug,stripclean_server=debug,tower_http=debug")
        } else {
            EnvFilter::new(DEFAULT_FILTER)
        }
    })
}

/// Inicializa el suscriptor global en formato legible.
///
/// Las llamadas posteriores se ignoran.
pub fn init_tracing(verbose: bool) {
    INIT.call_once(|| {
        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr);

        let _ = tracing_subscriber::registry()
            .with(env_filter(verbose))
            .with(fmt_layer)
            .try_init();

        info!("registro de StripClean inicializado");
    });
}

/// Inicializa el suscriptor global con salida JSON.
pub fn init_tracing_json(verbose: bool) {
    INIT.call_once(|| {
        let fmt_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_writer(std::io::stderr);

        let _ = tracing_subscriber::registry()
            .with(env_filter(verbose))
            .with(fmt_layer)
            .try_init();

        info!("registro de StripClean inicializado (JSON)");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_tracing_is_idempotent() {
        init_tracing(false);
        init_tracing(true);
        init_tracing_json(false);
    }
}
