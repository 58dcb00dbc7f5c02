//! HTTP server: media streaming, uploads and static assets.

use std::path::{Component, Path as FsPath, PathBuf};
use std::sync::Arc;

use axum::Router;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::HeaderMap;
use axum::http::header::RANGE;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::error::ServeError;
use crate::file::MediaFile;
use crate::range::RangeRequest;
use crate::upload;
use crate::Streamed;

/// State shared by all handlers.
#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) config: Arc<ServerConfig>,
}

/// Build the application router.
///
/// - `GET /media/{file}` streams a file from the media directory
/// - `POST /upload` stores a multipart `file` field in the media directory
/// - `/static/*` serves assets from the static directory
pub fn router(config: ServerConfig) -> Router {
    let static_files = ServeDir::new(&config.static_dir);
    let upload_limit = DefaultBodyLimit::max(config.max_upload_bytes);
    let state = AppState { config: Arc::new(config) };

    Router::new()
        .route("/media/{file}", get(media))
        .route("/upload", post(upload::upload).layer(upload_limit))
        .nest_service("/static", static_files)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind a listener on `addr`.
pub async fn bind(addr: std::net::SocketAddr) -> Result<TcpListener, ServeError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServeError::Bind { addr, source })
}

/// Serve on an already bound listener until `shutdown` is cancelled.
///
/// In-flight responses are allowed to finish once shutdown begins.
pub async fn serve(
    listener: TcpListener,
    config: ServerConfig,
    shutdown: CancellationToken,
) -> Result<(), ServeError> {
    axum::serve(listener, router(config))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

/// Bind `config.listen_addr` and serve until `shutdown` is cancelled.
pub async fn run(config: ServerConfig, shutdown: CancellationToken) -> Result<(), ServeError> {
    let listener = bind(config.listen_addr).await?;

    tracing::info!("listening on {}", listener.local_addr()?);
    tracing::info!("media folder: {}", config.media_dir.display());

    serve(listener, config, shutdown).await
}

/// Stream a media file, honouring a `Range` header.
async fn media(
    State(state): State<AppState>,
    Path(file): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ServeError> {
    // an empty `Range` value counts as no header at all
    let range = headers
        .get(RANGE)
        .filter(|value| !value.is_empty())
        .map(RangeRequest::from_header);
    tracing::debug!(file = %file, ?range, "media request");

    let path = media_path(&state.config.media_dir, &file)?;
    let body = MediaFile::open(&path)
        .await
        .map_err(|source| ServeError::Open { path, source })?;

    Ok(Streamed::new(range, body)
        .with_chunk_size(state.config.chunk_size)
        .into_response())
}

/// Join `name` onto `dir`, accepting only a single plain file name.
pub(crate) fn media_path(dir: &FsPath, name: &str) -> Result<PathBuf, ServeError> {
    let mut components = FsPath::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(file)), None) => Ok(dir.join(file)),
        _ => Err(ServeError::InvalidFileName(name.to_string())),
    }
}
