//! HTTP front end for the labeling loop.
//!
//! A thin layer over [`RandomSampler`] and [`AnnotationStore`]. Filesystem
//! work runs on the blocking pool, one request at a time per connection.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Annotation page |
//! | `GET`  | `/images/random` | `{"url": ...}` of a random unlabeled image |
//! | `GET`  | `/images/{name}` | Raw image bytes, streamed from disk |
//! | `POST` | `/images/{name}` | Commit boxes for an image, `201` on success |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! Error responses carry a JSON body:
//!
//! ```json
//! { "error": { "code": "unprocessable_entity", "message": "expected value at line 1 column 1" } }
//! ```
//!
//! Error codes: `not_found` (404), `no_samples` (404), `unprocessable_entity`,
//! `invalid_name` and `unknown_image` (422), `log_write_failed` and
//! `internal` (500). Unsupported methods get a bare 405.

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, Path, Request, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower::ServiceExt;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeFile;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::StartupError;
use crate::models::{BoundingBox, ImageName};
use crate::paths::ResolvedPaths;
use crate::sampler::{RandomSampler, SampleError};
use crate::store::{AnnotationStore, CommitError, MoveOutcome};

const INDEX_HTML: &str = include_str!("../assets/index.html");

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    paths: Arc<ResolvedPaths>,
    store: AnnotationStore,
    sampler: RandomSampler,
}

/// Build the application router. Exposed so tests can serve it on their
/// own listener.
pub fn build_router(config: &Config, paths: Arc<ResolvedPaths>) -> Router {
    let state = AppState {
        config: Arc::new(config.clone()),
        store: AnnotationStore::new(paths.clone()),
        sampler: RandomSampler::new(paths.clone()),
        paths,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_index))
        .route("/health", get(handle_health))
        .route("/images/random", get(handle_random))
        .route("/images/", any(handle_empty_name))
        .route("/images/{name}", get(handle_get_image).post(handle_submit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind the configured address and serve until Ctrl-C.
///
/// A bind failure is returned as [`StartupError::Bind`] inside the
/// `anyhow::Error` so the caller can pick the exit status.
pub async fn run_server(config: &Config, paths: Arc<ResolvedPaths>) -> anyhow::Result<()> {
    let bind_addr = config.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|source| StartupError::Bind {
            addr: bind_addr.clone(),
            source,
        })?;

    info!(
        images = %paths.image_root.display(),
        output = %paths.output_file.display(),
        "marker listening on http://{}",
        bind_addr
    );

    let app = build_router(config, paths);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn unprocessable(code: &'static str, message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::UNPROCESSABLE_ENTITY,
        code,
        message: message.into(),
    }
}

fn internal(code: &'static str, message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code,
        message: message.into(),
    }
}

impl From<CommitError> for AppError {
    fn from(err: CommitError) -> Self {
        match &err {
            CommitError::InvalidName(_) => unprocessable("invalid_name", err.to_string()),
            CommitError::UnknownImage(_) => unprocessable("unknown_image", err.to_string()),
            CommitError::LogWrite { .. } => {
                error!(error = ?err, "sample log append failed");
                internal("log_write_failed", err.to_string())
            }
        }
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        error!(error = %err, "blocking task failed");
        internal("internal", "internal error")
    }
}

// ============ GET / ============

async fn handle_index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /images/random ============

#[derive(Serialize)]
struct RandomImageResponse {
    url: String,
}

/// Handler for `GET /images/random`.
///
/// The URL's authority comes from `server.public_url` when configured,
/// otherwise from the request's `Host` header, otherwise `localhost:<port>`.
async fn handle_random(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<RandomImageResponse>, AppError> {
    let sampler = state.sampler.clone();
    let picked = tokio::task::spawn_blocking(move || sampler.pick_random()).await?;

    let name = picked.map_err(|e| match e {
        SampleError::NoSamples => AppError {
            status: StatusCode::NOT_FOUND,
            code: "no_samples",
            message: e.to_string(),
        },
    })?;

    let base = base_url(&state.config, &headers);
    Ok(Json(RandomImageResponse {
        url: format!("{}/images/{}", base, encode_path_segment(name.as_str())),
    }))
}

fn base_url(config: &Config, headers: &HeaderMap) -> String {
    if let Some(url) = &config.server.public_url {
        return url.trim_end_matches('/').to_string();
    }
    match headers.get(header::HOST).and_then(|h| h.to_str().ok()) {
        Some(host) if !host.is_empty() => format!("http://{}", host),
        _ => format!("http://localhost:{}", config.server.port),
    }
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
fn encode_path_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

// ============ GET /images/{name} ============

/// Handler for `GET /images/{name}`.
///
/// The name is validated and joined here; [`ServeFile`] then streams the
/// file with a content type guessed from its extension and honours range
/// requests.
async fn handle_get_image(
    State(state): State<AppState>,
    Path(name): Path<String>,
    req: Request,
) -> Result<Response, AppError> {
    let image = ImageName::parse(&name).map_err(|e| not_found(e.to_string()))?;
    let path = state
        .paths
        .image_path(&image)
        .map_err(|e| not_found(e.to_string()))?;
    if path == state.paths.output_file {
        return Err(not_found(format!("no such image: {}", image)));
    }

    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => {}
        // a stray subfolder
        Ok(_) => return Err(not_found(format!("no such image: {}", image))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(not_found(format!("no such image: {}", image)))
        }
        Err(e) => {
            error!(image = %image, error = %e, "failed to stat image");
            return Err(internal("internal", format!("failed to read image: {}", e)));
        }
    }

    Ok(ServeFile::new(&path).oneshot(req).await.into_response())
}

// ============ POST /images/{name} ============

#[derive(Serialize)]
struct SubmitResponse {
    message: String,
    image: String,
    boxes: usize,
}

/// Handler for `POST /images/{name}`.
///
/// The body is parsed here rather than through `Json` so every unreadable
/// or malformed body maps to 422, with or without a content type.
async fn handle_submit(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Result<Bytes, BytesRejection>,
) -> Result<(StatusCode, Json<SubmitResponse>), AppError> {
    let body = body.map_err(|e| {
        warn!(image = %name, error = %e, "failed to read request body");
        unprocessable("unprocessable_entity", e.body_text())
    })?;
    let boxes: Vec<BoundingBox> = serde_json::from_slice(&body).map_err(|e| {
        warn!(image = %name, error = %e, "failed to parse boxes");
        unprocessable("unprocessable_entity", e.to_string())
    })?;

    let store = state.store.clone();
    let receipt = tokio::task::spawn_blocking(move || store.commit(&name, boxes)).await??;

    if let MoveOutcome::Moved(dest) = &receipt.moved {
        info!(image = %receipt.image, destination = %dest.display(), "image marked");
    }

    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            message: format!(
                "saved {} box(es) for {}",
                receipt.record.boxes.len(),
                receipt.image
            ),
            image: receipt.image.to_string(),
            boxes: receipt.record.boxes.len(),
        }),
    ))
}

/// `/images/` with nothing after the slash.
async fn handle_empty_name(method: Method) -> AppError {
    if method == Method::POST {
        unprocessable("invalid_name", "image name must not be empty")
    } else {
        not_found("no image name given")
    }
}
