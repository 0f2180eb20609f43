//! Plazos y cancelación cooperativa de una petición.
//!
//! El motor no se interrumpe a sí mismo: consulta [`Deadline::checkpoint`]
//! después de escanear el contenedor y después de decodificar cada segmento.

use crate::error::{Result, StripError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::warn;

/// Plazo de una petición más una bandera de cancelación compartida.
#[derive(Debug, Clone)]
pub struct Deadline {
    start: Instant,
    limit: Option<Duration>,
    cancelled: Arc<AtomicBool>,
}

impl Default for Deadline {
    fn default() -> Self {
        Self::none()
    }
}

impl Deadline {
    /// Sin plazo; solo se cancela con [`CancelHandle::cancel`].
    pub fn none() -> Self {
        Self {
            start: Instant::now(),
            limit: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Expira `limit` después de ahora; `None` equivale a [`Deadline::none`].
    pub fn after(limit: Option<Duration>) -> Self {
        Self {
            limit,
            ..Self::none()
        }
    }

    /// Manejador para cancelar desde otro hilo.
    pub fn handle(&self) -> CancelHandle {
        CancelHandle {
            cancelled: Arc::clone(&self.cancelled),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Devuelve `Cancelled` si el plazo venció o alguien canceló.
    pub fn checkpoint(&self, stage: &str) -> Result<()> {
        if self.cancelled.load(Ordering::Relaxed) {
            warn!(stage, "petición cancelada");
            return Err(StripError::Cancelled);
        }
        if let Some(limit) = self.limit {
            let elapsed = self.start.elapsed();
            if elapsed > limit {
                warn!(stage, ?elapsed, ?limit, "plazo de procesamiento agotado");
                return Err(StripError::Cancelled);
            }
        }
        Ok(())
    }
}

/// Extremo de cancelación de un [`Deadline`].
#[derive(Debug, Clone)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Guardia que cancela al soltarse salvo que se desarme con [`CancelOnDrop::disarm`].
    pub fn on_drop(self) -> CancelOnDrop {
        CancelOnDrop {
            handle: Some(self),
        }
    }
}

/// Cancela la petición si el futuro que la espera se descarta.
#[derive(Debug)]
pub struct CancelOnDrop {
    handle: Option<CancelHandle>,
}

impl CancelOnDrop {
    pub fn disarm(mut self) {
        self.handle = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_deadline_passes_checkpoints() {
        let deadline = Deadline::none();
        assert!(deadline.checkpoint("escaneo").is_ok());
    }

    #[test]
    fn expired_deadline_is_cancelled() {
        let deadline = Deadline::after(Some(Duration::ZERO));
        std::thread::sleep(Duration::from_millis(2));
        assert!(matches!(deadline.checkpoint("decodificación"), Err(StripError::Cancelled)));
    }

    #[test]
    fn dropping_guard_cancels_unless_disarmed() {
        let deadline = Deadline::none();
        deadline.handle().on_drop().disarm();
        assert!(deadline.checkpoint("x").is_ok());

        drop(deadline.handle().on_drop());
        assert!(matches!(deadline.checkpoint("x"), Err(StripError::Cancelled)));
    }
}
