//! Multipart uploads into the media directory.

use std::io;
use std::path::Path;

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::http::header::LOCATION;
use axum::response::{IntoResponse, Response};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::error::ServeError;
use crate::server::{media_path, AppState};

/// Form field holding the uploaded file.
const FILE_FIELD: &str = "file";

/// Store the `file` field of a multipart form under its client file name,
/// replacing any existing file, and answer `201` pointing at its media URL.
pub(crate) async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ServeError> {
    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let name = field.file_name().unwrap_or_default().to_string();
        let path = media_path(&state.config.media_dir, &name)?;
        tracing::debug!(file = %name, content_type = ?field.content_type(), "receiving upload");

        let mut file = File::create(&path).await.map_err(|e| store_error(&path, e))?;
        let mut written = 0u64;
        while let Some(chunk) = field.chunk().await? {
            file.write_all(&chunk).await.map_err(|e| store_error(&path, e))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| store_error(&path, e))?;

        tracing::info!(file = %name, bytes = written, "stored upload");

        let location = format!("/media/{}", urlencoding::encode(&name));
        return Ok((StatusCode::CREATED, [(LOCATION, location)]).into_response());
    }

    Err(ServeError::MissingUploadField)
}

fn store_error(path: &Path, source: io::Error) -> ServeError {
    ServeError::Store { path: path.to_path_buf(), source }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::config::ServerConfig;
    use crate::server::router;

    const BOUNDARY: &str = "media-stream-boundary";

    fn form(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, file_name, data) in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            let disposition = match file_name {
                Some(file_name) => format!("form-data; name=\"{name}\"; filename=\"{file_name}\""),
                None => format!("form-data; name=\"{name}\""),
            };
            body.extend_from_slice(format!("Content-Disposition: {disposition}\r\n").as_bytes());
            body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn post(body: Vec<u8>) -> Request<Body> {
        Request::post("/upload")
            .header("Content-Type", format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .unwrap()
    }

    fn app(media: &std::path::Path) -> axum::Router {
        router(ServerConfig {
            media_dir: media.to_path_buf(),
            ..ServerConfig::default()
        })
    }

    #[tokio::test]
    async fn test_upload_stores_file() {
        let media = tempfile::tempdir().unwrap();
        let data = vec![42u8; 20_000];
        let body = form(&[("title", None, &b"ignored"[..]), ("file", Some("new clip.mp4"), &data[..])]);

        let response = app(media.path()).oneshot(post(body)).await.unwrap();

        assert_eq!(StatusCode::CREATED, response.status());
        assert_eq!("/media/new%20clip.mp4", response.headers()["location"].to_str().unwrap());
        assert_eq!(data, std::fs::read(media.path().join("new clip.mp4")).unwrap());
    }

    #[tokio::test]
    async fn test_upload_replaces_existing_file() {
        let media = tempfile::tempdir().unwrap();
        std::fs::write(media.path().join("clip.mp4"), vec![1u8; 500]).unwrap();
        let body = form(&[("file", Some("clip.mp4"), &b"short"[..])]);

        let response = app(media.path()).oneshot(post(body)).await.unwrap();

        assert_eq!(StatusCode::CREATED, response.status());
        assert_eq!(b"short".to_vec(), std::fs::read(media.path().join("clip.mp4")).unwrap());
    }

    #[tokio::test]
    async fn test_upload_without_file_field() {
        let media = tempfile::tempdir().unwrap();
        let body = form(&[("title", None, &b"no file here"[..])]);

        let response = app(media.path()).oneshot(post(body)).await.unwrap();

        assert_eq!(StatusCode::BAD_REQUEST, response.status());
    }

    #[tokio::test]
    async fn test_upload_rejects_path_in_file_name() {
        let media = tempfile::tempdir().unwrap();
        let body = form(&[("file", Some("../escape.mp4"), &b"data"[..])]);

        let response = app(media.path()).oneshot(post(body)).await.unwrap();

        assert_eq!(StatusCode::BAD_REQUEST, response.status());
        assert!(!media.path().parent().unwrap().join("escape.mp4").exists());
    }

    #[tokio::test]
    async fn test_upload_get_not_allowed() {
        let media = tempfile::tempdir().unwrap();
        let request = Request::get("/upload").body(Body::empty()).unwrap();

        let response = app(media.path()).oneshot(request).await.unwrap();

        assert_eq!(StatusCode::METHOD_NOT_ALLOWED, response.status());
    }
}
