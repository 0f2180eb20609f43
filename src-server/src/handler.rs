//! Rutas HTTP de StripClean.
//!
//! - `GET  /`        — texto de disponibilidad
//! - `GET  /health`  — sonda JSON
//! - `POST /analyze` — campo multipart `image`; reporte de metadata en JSON
//! - `POST /clean`   — campo multipart `image`; la imagen sin metadata
//!
//! El motor corre en el pool bloqueante de tokio bajo el plazo configurado.
//! Si el plazo vence o el cliente se desconecta, la petición se cancela en
//! el siguiente punto de control del motor.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, State},
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;
use stripclean::{AnalysisReport, BasicInfo, Deadline, Engine, SanitizeOptions, StripError};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Margen para las cabeceras y delimitadores del cuerpo multipart.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

pub fn router(state: AppState, cors: bool) -> Router {
    let body_limit = state.engine.config().limits.max_input_bytes + MULTIPART_OVERHEAD;
    let router = Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .route("/analyze", post(analyze))
        .route("/clean", post(clean))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if cors {
        router.layer(
            CorsLayer::new()
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
                .allow_origin(Any),
        )
    } else {
        router
    }
}

// =============================================================================
// Errores
// =============================================================================

/// Error de la API: `{"success": false, "error": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl From<StripError> for ApiError {
    fn from(err: StripError) -> Self {
        let status = match &err {
            StripError::UnsupportedFormat => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            StripError::TruncatedInput { .. } | StripError::UnsafeRewrite(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            StripError::InputTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            StripError::Cancelled => StatusCode::REQUEST_TIMEOUT,
            StripError::Config(_) => StatusCode::BAD_REQUEST,
            StripError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "success": false,
            "error": self.message,
        }));
        (self.status, body).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /
async fn home() -> &'static str {
    "StripClean backend en marcha: /clean y /analyze listos"
}

/// GET /health
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Serialize)]
struct AnalyzeResponse {
    success: bool,
    basic_info: BasicInfo,
    #[serde(flatten)]
    report: AnalysisReport,
}

/// POST /analyze
async fn analyze(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let upload = read_image(multipart).await?;
    let size = upload.data.len();

    let (basic_info, report) = run_engine(&state, move |engine, deadline| {
        let report = engine.analyze_with(&upload.data, deadline)?;
        let basic = engine.basic_info(&upload.data)?;
        Ok((basic, report))
    })
    .await?;

    info!(
        format = %report.format,
        size_bytes = size,
        tags = report.tags.len(),
        critical = report.summary.critical,
        "POST /analyze"
    );
    Ok(Json(AnalyzeResponse {
        success: true,
        basic_info,
        report,
    }))
}

/// POST /clean
async fn clean(State(state): State<AppState>, multipart: Multipart) -> Result<Response, ApiError> {
    let upload = read_image(multipart).await?;
    if upload.filename.is_empty() {
        return Err(ApiError::bad_request("Nombre de archivo vacío"));
    }
    let download_name = format!("cleaned_{}", secure_filename(&upload.filename));
    let size = upload.data.len();

    let output = run_engine(&state, move |engine, deadline| {
        engine.clean_with(&upload.data, &SanitizeOptions::default(), deadline)
    })
    .await?;

    info!(
        format = %output.format,
        size_bytes = size,
        removed = output.removed,
        "POST /clean"
    );

    let disposition = HeaderValue::from_str(&format!("inline; filename=\"{download_name}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("inline"));
    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(output.format.mime_type())),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        output.data,
    )
        .into_response())
}

// =============================================================================
// Helpers
// =============================================================================

struct Upload {
    filename: String,
    data: Bytes,
}

/// Primer campo `image` del formulario.
async fn read_image(mut multipart: Multipart) -> Result<Upload, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::new(err.status(), err.body_text()))?
    {
        if field.name() != Some("image") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let data = field
            .bytes()
            .await
            .map_err(|err| ApiError::new(err.status(), err.body_text()))?;
        return Ok(Upload { filename, data });
    }
    Err(ApiError::bad_request("No se recibió ninguna imagen"))
}

/// Ejecuta `work` en el pool bloqueante con el plazo del motor.
///
/// Si este futuro se descarta antes de terminar, la guardia cancela el
/// trabajo en curso.
async fn run_engine<T, F>(state: &AppState, work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Engine, &Deadline) -> stripclean::Result<T> + Send + 'static,
{
    let engine = Arc::clone(&state.engine);
    let deadline = engine.deadline();
    let guard = deadline.handle().on_drop();
    let limit = engine.config().limits.decode_timeout();

    let task = tokio::task::spawn_blocking(move || work(&engine, &deadline));
    let joined = match limit {
        Some(limit) => tokio::time::timeout(limit, task)
            .await
            .map_err(|_| ApiError::from(StripError::Cancelled))?,
        None => task.await,
    };
    guard.disarm();

    match joined {
        Ok(result) => result.map_err(ApiError::from),
        Err(err) => {
            error!(%err, "la tarea del motor terminó de forma anómala");
            Err(ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error interno al procesar la imagen",
            ))
        }
    }
}

/// Nombre de archivo seguro para una cabecera: ASCII alfanumérico, `.`, `-` y `_`.
fn secure_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();
    let trimmed = cleaned.trim_start_matches(['.', '_']);
    if trimmed.is_empty() {
        "imagen".to_string()
    } else {
        trimmed.to_string()
    }
}
