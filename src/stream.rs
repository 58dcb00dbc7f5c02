use std::fmt;
use std::io;
use std::mem;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::response::{IntoResponse, Response};
use bytes::{Bytes, BytesMut};
use futures::Stream;
use http_body::{Body, Frame, SizeHint};
use pin_project::pin_project;
use tokio::io::ReadBuf;

use crate::MediaBody;

/// Bytes read from the body per chunk unless configured otherwise.
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

/// Response body stream over one byte window of a [`MediaBody`].
/// Implements [`Stream`], [`Body`], and [`IntoResponse`].
///
/// Every chunk is yielded as its own frame, so the connection writes and
/// flushes it before the next read. A failed seek or read ends the stream
/// without an error: the response head is already on the wire by then.
#[pin_project]
pub struct ChunkedStream<B> {
    state: StreamState,
    length: u64,
    chunk_size: usize,
    #[pin]
    body: B,
}

impl<B: MediaBody + Send + 'static> ChunkedStream<B> {
    pub(crate) fn new(body: B, start: u64, length: u64, chunk_size: usize) -> Self {
        let state = if length == 0 {
            StreamState::Done
        } else {
            StreamState::Seek { start }
        };

        ChunkedStream {
            state,
            length,
            chunk_size: chunk_size.max(1),
            body,
        }
    }
}

impl<B> fmt::Debug for ChunkedStream<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkedStream")
            .field("state", &self.state)
            .field("length", &self.length)
            .finish()
    }
}

#[derive(Debug)]
enum StreamState {
    Seek { start: u64 },
    Seeking { remaining: u64 },
    Reading { buffer: BytesMut, remaining: u64 },
    Done,
}

impl<B: MediaBody + Send + 'static> IntoResponse for ChunkedStream<B> {
    fn into_response(self) -> Response {
        Response::new(axum::body::Body::new(self))
    }
}

impl<B: MediaBody> Body for ChunkedStream<B> {
    type Data = Bytes;
    type Error = io::Error;

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.length)
    }

    fn is_end_stream(&self) -> bool {
        matches!(self.state, StreamState::Done)
    }

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>)
        -> Poll<Option<io::Result<Frame<Bytes>>>>
    {
        self.poll_next(cx).map(|item| item.map(|result| result.map(Frame::data)))
    }
}

impl<B: MediaBody> Stream for ChunkedStream<B> {
    type Item = io::Result<Bytes>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>
    ) -> Poll<Option<io::Result<Bytes>>> {
        let mut this = self.project();

        loop {
            match this.state {
                StreamState::Seek { start } => {
                    let start = *start;
                    match this.body.as_mut().start_seek(start) {
                        Err(e) => {
                            tracing::warn!(start, "seek failed, ending body: {e}");
                            *this.state = StreamState::Done;
                        }
                        Ok(()) => {
                            *this.state = StreamState::Seeking { remaining: *this.length };
                        }
                    }
                }

                StreamState::Seeking { remaining } => {
                    let remaining = *remaining;
                    match this.body.as_mut().poll_complete(cx) {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(Err(e)) => {
                            tracing::warn!("seek failed, ending body: {e}");
                            *this.state = StreamState::Done;
                        }
                        Poll::Ready(Ok(())) => {
                            let buffer = BytesMut::with_capacity(*this.chunk_size);
                            *this.state = StreamState::Reading { buffer, remaining };
                        }
                    }
                }

                StreamState::Reading { buffer, remaining } => {
                    if *remaining == 0 {
                        *this.state = StreamState::Done;
                        continue;
                    }

                    let uninit = buffer.spare_capacity_mut();

                    // never read past the end of the window: the last chunk is
                    // cut down to exactly the bytes still owed
                    let nbytes = std::cmp::min(
                        uninit.len(),
                        usize::try_from(*remaining).unwrap_or(usize::MAX),
                    );

                    let mut read_buf = ReadBuf::uninit(&mut uninit[..nbytes]);

                    match this.body.as_mut().poll_read(cx, &mut read_buf) {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(Err(e)) => {
                            tracing::warn!(remaining = *remaining, "read failed, truncating body: {e}");
                            *this.state = StreamState::Done;
                        }
                        Poll::Ready(Ok(())) => {
                            let n = read_buf.filled().len();
                            if n == 0 {
                                tracing::debug!(remaining = *remaining, "body ended before window");
                                *this.state = StreamState::Done;
                                continue;
                            }

                            // SAFETY: poll_read has initialised `n` more bytes
                            // of the spare capacity
                            unsafe { buffer.set_len(buffer.len() + n); }

                            let chunk = mem::replace(buffer, BytesMut::with_capacity(*this.chunk_size));

                            // n <= remaining because of the min above
                            *remaining -= n as u64;

                            return Poll::Ready(Some(Ok(chunk.freeze())));
                        }
                    }
                }

                StreamState::Done => return Poll::Ready(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{self, Cursor};
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use bytes::Bytes;
    use futures::StreamExt;
    use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};

    use super::{ChunkedStream, DEFAULT_CHUNK_SIZE};
    use crate::MediaFile;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn cursor(data: &[u8]) -> MediaFile<Cursor<Vec<u8>>> {
        MediaFile::sized(Cursor::new(data.to_vec()), data.len() as u64)
    }

    async fn chunks<B: crate::MediaBody + Send + 'static>(stream: ChunkedStream<B>) -> Vec<Bytes> {
        stream.map(|chunk| chunk.unwrap()).collect().await
    }

    /// Serves `data` until `fail_at`, then every read errors.
    struct FailingReader {
        data: Vec<u8>,
        pos: usize,
        fail_at: usize,
    }

    impl AsyncRead for FailingReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            let this = self.get_mut();
            if this.pos >= this.fail_at {
                return Poll::Ready(Err(io::Error::other("device went away")));
            }
            let n = buf.remaining().min(this.fail_at - this.pos);
            buf.put_slice(&this.data[this.pos..this.pos + n]);
            this.pos += n;
            Poll::Ready(Ok(()))
        }
    }

    impl AsyncSeek for FailingReader {
        fn start_seek(self: Pin<&mut Self>, position: io::SeekFrom) -> io::Result<()> {
            match position {
                io::SeekFrom::Start(pos) => {
                    self.get_mut().pos = pos as usize;
                    Ok(())
                }
                _ => Err(io::Error::new(io::ErrorKind::Unsupported, "start only")),
            }
        }

        fn poll_complete(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
            Poll::Ready(Ok(self.pos as u64))
        }
    }

    #[tokio::test]
    async fn test_fixed_size_chunks() {
        let data = pattern(20_000);
        let stream = ChunkedStream::new(cursor(&data), 0, data.len() as u64, DEFAULT_CHUNK_SIZE);

        let sizes: Vec<usize> = chunks(stream).await.iter().map(Bytes::len).collect();
        assert_eq!(vec![8192, 8192, 3616], sizes);
    }

    #[tokio::test]
    async fn test_last_chunk_truncated_to_window() {
        let data = pattern(20_000);
        let stream = ChunkedStream::new(cursor(&data), 100, 9_000, DEFAULT_CHUNK_SIZE);

        let chunks = chunks(stream).await;
        assert_eq!(vec![8192, 808], chunks.iter().map(Bytes::len).collect::<Vec<_>>());
        assert_eq!(&data[100..9_100], &chunks.concat()[..]);
    }

    #[tokio::test]
    async fn test_window_exactly_one_chunk() {
        let data = pattern(10_000);
        let stream = ChunkedStream::new(cursor(&data), 10, 8192, DEFAULT_CHUNK_SIZE);

        let chunks = chunks(stream).await;
        assert_eq!(1, chunks.len());
        assert_eq!(&data[10..8202], &chunks[0][..]);
    }

    #[tokio::test]
    async fn test_custom_chunk_size() {
        let data = pattern(10);
        let stream = ChunkedStream::new(cursor(&data), 0, 10, 4);

        let sizes: Vec<usize> = chunks(stream).await.iter().map(Bytes::len).collect();
        assert_eq!(vec![4, 4, 2], sizes);
    }

    #[tokio::test]
    async fn test_empty_window_yields_nothing() {
        let stream = ChunkedStream::new(cursor(&[]), 0, 0, DEFAULT_CHUNK_SIZE);
        assert!(chunks(stream).await.is_empty());
    }

    #[tokio::test]
    async fn test_short_body_ends_early() {
        // size claims more bytes than the source holds
        let data = pattern(50);
        let body = MediaFile::sized(Cursor::new(data.clone()), 80);
        let stream = ChunkedStream::new(body, 0, 80, DEFAULT_CHUNK_SIZE);

        assert_eq!(data, chunks(stream).await.concat());
    }

    #[tokio::test]
    async fn test_read_error_truncates_silently() {
        let data = pattern(30_000);
        let reader = FailingReader { data: data.clone(), pos: 0, fail_at: 10_000 };
        let body = MediaFile::sized(reader, 30_000);
        let stream = ChunkedStream::new(body, 0, 30_000, DEFAULT_CHUNK_SIZE);

        let received = chunks(stream).await.concat();
        assert_eq!(&data[..10_000], &received[..]);
    }

    #[tokio::test]
    async fn test_size_hint_is_window() {
        use http_body::Body;

        let data = pattern(100);
        let stream = ChunkedStream::new(cursor(&data), 10, 40, DEFAULT_CHUNK_SIZE);
        assert_eq!(Some(40), stream.size_hint().exact());
    }
}
