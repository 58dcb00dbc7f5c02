//! # media-stream
//!
//! Range-aware media streaming for [`axum`][1].
//!
//! [`Streamed`] turns any body implementing [`MediaBody`] plus an optional
//! [`RangeRequest`] into a response: `200 OK` with the whole body, or
//! `206 Partial Content` with exactly the requested window. Bytes are copied
//! in fixed-size chunks by [`ChunkedStream`], so a multi-gigabyte file never
//! sits in memory.
//!
//! Any type implementing both [`AsyncRead`] and [`AsyncSeekStart`] can be
//! used through the [`MediaFile`] adapter. [`MediaFile::open`] opens and stats
//! a [`tokio::fs::File`] in one step.
//!
//! ```no_run
//! use axum::Router;
//! use axum::http::{HeaderMap, StatusCode};
//! use axum::http::header::RANGE;
//! use axum::routing::get;
//!
//! use media_stream::{MediaFile, RangeRequest, Streamed};
//!
//! async fn video(headers: HeaderMap) -> Result<Streamed<MediaFile<tokio::fs::File>>, StatusCode> {
//!     let body = MediaFile::open("video.mp4")
//!         .await
//!         .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
//!     let range = headers.get(RANGE).map(RangeRequest::from_header);
//!     Ok(Streamed::new(range, body))
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let _app = Router::<()>::new().route("/video.mp4", get(video));
//! }
//! ```
//!
//! The [`server`] module wires this into the `stream-server` binary.
//!
//! [1]: https://docs.rs/axum

pub mod config;
mod error;
mod file;
mod range;
pub mod server;
mod stream;
pub mod telemetry;
mod upload;

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum_extra::TypedHeader;
use axum_extra::headers::{AcceptRanges, ContentLength, ContentRange};
use tokio::io::{AsyncRead, AsyncSeek};

pub use config::{ConfigError, ServerConfig};
pub use error::ServeError;
pub use file::MediaFile;
pub use range::{RangeRequest, ResolvedRange};
pub use stream::{ChunkedStream, DEFAULT_CHUNK_SIZE};

/// `Content-Type` sent with every media response, whatever the file holds.
pub const MEDIA_CONTENT_TYPE: &str = "video/mp4";

/// [`AsyncSeek`] narrowed to only allow seeking from start.
pub trait AsyncSeekStart {
    /// Same semantics as [`AsyncSeek::start_seek`], always passing position as the `SeekFrom::Start` variant.
    fn start_seek(self: Pin<&mut Self>, position: u64) -> io::Result<()>;

    /// Same semantics as [`AsyncSeek::poll_complete`], returning `()` instead of the new stream position.
    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>>;
}

impl<T: AsyncSeek> AsyncSeekStart for T {
    fn start_seek(self: Pin<&mut Self>, position: u64) -> io::Result<()> {
        AsyncSeek::start_seek(self, io::SeekFrom::Start(position))
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        AsyncSeek::poll_complete(self, cx).map_ok(|_| ())
    }
}

/// An [`AsyncRead`] and [`AsyncSeekStart`] with a fixed known byte size.
pub trait MediaBody: AsyncRead + AsyncSeekStart {
    /// The total size of the underlying media.
    ///
    /// Queried once per response. If the media grows or shrinks while it is
    /// being streamed the body is cut short or stops at the old size.
    fn byte_size(&self) -> u64;
}

/// The main responder type. Implements [`IntoResponse`].
#[derive(Debug)]
pub struct Streamed<B: MediaBody + Send + 'static> {
    range: Option<RangeRequest>,
    body: B,
    chunk_size: usize,
}

impl<B: MediaBody + Send + 'static> Streamed<B> {
    /// Construct a response over any type implementing [`MediaBody`] and an
    /// optional parsed `Range` header.
    pub fn new(range: Option<RangeRequest>, body: B) -> Self {
        Streamed { range, body, chunk_size: DEFAULT_CHUNK_SIZE }
    }

    /// Override the number of bytes read and sent per chunk.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Computes status, headers and body window as a [`StreamedResponse`].
    /// Returns [`RangeNotSatisfiable`] if a range was requested and not a
    /// single byte of it lies inside the body.
    pub fn try_respond(self) -> Result<StreamedResponse<B>, RangeNotSatisfiable> {
        let total_bytes = self.body.byte_size();

        match self.range {
            None => {
                let content_range = ResolvedRange::full(total_bytes)
                    .and_then(|full| full.content_range(total_bytes))
                    .unwrap_or_else(|| ContentRange::unsatisfied_bytes(total_bytes));
                let stream = ChunkedStream::new(self.body, 0, total_bytes, self.chunk_size);

                Ok(StreamedResponse::Full {
                    content_length: ContentLength(total_bytes),
                    content_range,
                    stream,
                })
            }
            Some(range) => {
                let unsatisfiable = || RangeNotSatisfiable(ContentRange::unsatisfied_bytes(total_bytes));

                let Some(resolved) = range.resolve(total_bytes) else {
                    tracing::debug!(?range, total_bytes, "range not satisfiable");
                    return Err(unsatisfiable());
                };
                let content_range = resolved.content_range(total_bytes).ok_or_else(unsatisfiable)?;

                tracing::debug!(
                    start = resolved.start(),
                    end = resolved.end(),
                    total_bytes,
                    "serving partial content",
                );

                let stream = ChunkedStream::new(self.body, resolved.start(), resolved.len(), self.chunk_size);

                Ok(StreamedResponse::Partial {
                    content_length: ContentLength(resolved.len()),
                    content_range,
                    stream,
                })
            }
        }
    }
}

impl<B: MediaBody + Send + 'static> IntoResponse for Streamed<B> {
    fn into_response(self) -> Response {
        self.try_respond().into_response()
    }
}

/// Error type indicating that the requested range was not satisfiable. Implements [`IntoResponse`].
#[derive(Debug, Clone)]
pub struct RangeNotSatisfiable(pub ContentRange);

impl IntoResponse for RangeNotSatisfiable {
    fn into_response(self) -> Response {
        let status = StatusCode::RANGE_NOT_SATISFIABLE;
        let header = TypedHeader(self.0);
        (status, header, ()).into_response()
    }
}

/// Computed headers and body for a media response. Implements [`IntoResponse`].
#[derive(Debug)]
pub enum StreamedResponse<B> {
    /// No range requested: the whole body, `200 OK`.
    Full {
        content_length: ContentLength,
        content_range: ContentRange,
        stream: ChunkedStream<B>,
    },
    /// One resolved window, `206 Partial Content`.
    Partial {
        content_length: ContentLength,
        content_range: ContentRange,
        stream: ChunkedStream<B>,
    },
}

impl<B: MediaBody + Send + 'static> IntoResponse for StreamedResponse<B> {
    fn into_response(self) -> Response {
        let (status, content_length, content_range, stream) = match self {
            StreamedResponse::Full { content_length, content_range, stream } => {
                (StatusCode::OK, content_length, content_range, stream)
            }
            StreamedResponse::Partial { content_length, content_range, stream } => {
                (StatusCode::PARTIAL_CONTENT, content_length, content_range, stream)
            }
        };

        (
            status,
            [(CONTENT_TYPE, HeaderValue::from_static(MEDIA_CONTENT_TYPE))],
            TypedHeader(AcceptRanges::bytes()),
            TypedHeader(content_length),
            TypedHeader(content_range),
            stream,
        )
            .into_response()
    }
}
