use std::fmt;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};

use pin_project::pin_project;
use tokio::fs::File;
use tokio::io::{AsyncRead, ReadBuf};

use crate::{AsyncSeekStart, MediaBody};

/// Implements [`MediaBody`] for any [`AsyncRead`] and [`AsyncSeekStart`] whose
/// size is determined once, up front.
#[pin_project]
pub struct MediaFile<B: AsyncRead + AsyncSeekStart> {
    byte_size: u64,
    #[pin]
    body: B,
}

impl<B: AsyncRead + AsyncSeekStart> fmt::Debug for MediaFile<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaFile")
            .field("byte_size", &self.byte_size)
            .finish()
    }
}

impl MediaFile<File> {
    /// Opens the file at `path` and stats it for its size.
    pub async fn open(path: impl AsRef<Path>) -> io::Result<MediaFile<File>> {
        let file = File::open(path.as_ref()).await?;
        Self::file(file).await
    }

    /// Calls [`File::metadata`] to determine file size. Anything other than a
    /// regular file is rejected with [`io::ErrorKind::InvalidInput`].
    pub async fn file(file: File) -> io::Result<MediaFile<File>> {
        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"));
        }
        Ok(MediaFile { byte_size: metadata.len(), body: file })
    }
}

impl<B: AsyncRead + AsyncSeekStart> MediaFile<B> {
    /// Construct a [`MediaFile`] with a byte size supplied manually.
    pub fn sized(body: B, byte_size: u64) -> Self {
        MediaFile { byte_size, body }
    }
}

impl<B: AsyncRead + AsyncSeekStart> AsyncRead for MediaFile<B> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.project().body.poll_read(cx, buf)
    }
}

impl<B: AsyncRead + AsyncSeekStart> AsyncSeekStart for MediaFile<B> {
    fn start_seek(self: Pin<&mut Self>, position: u64) -> io::Result<()> {
        self.project().body.start_seek(position)
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().body.poll_complete(cx)
    }
}

impl<B: AsyncRead + AsyncSeekStart> MediaBody for MediaFile<B> {
    fn byte_size(&self) -> u64 {
        self.byte_size
    }
}
