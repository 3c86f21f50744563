//! Output helpers.

use bytes::{Buf, Bytes, BytesMut};
use parking_lot::Mutex;
use std::fmt::Write as _;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};
use tokio::io::AsyncWrite;

/// Timestamp format of [`Timestamper::new`], such as "10/18/26 14:03:59.123".
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%m/%d/%y %H:%M:%S%.3f";

/// In-memory output sink that can be shared between concurrent writers.
///
/// Clones write into (and read from) the same buffer, so pass a clone as the
/// sink of a container or command and keep another one around to look at the
/// output later.
#[derive(Clone, Debug, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<BytesMut>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything written so far.
    pub fn contents(&self) -> Bytes {
        Bytes::copy_from_slice(&self.inner.lock())
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.inner.lock()).into_owned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

impl AsyncWrite for SharedBuffer {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.inner.lock().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Writer prefixing every line with the local time it was written at.
///
/// Written data is stamped and buffered, then passed on to the inner writer
/// on the next write or flush.
#[derive(Debug)]
pub struct Timestamper<W> {
    inner: W,
    format: String,
    at_line_start: bool,
    pending: BytesMut,
}

impl<W> Timestamper<W> {
    pub fn new(inner: W) -> Self {
        Self::with_format(inner, DEFAULT_TIMESTAMP_FORMAT)
    }

    /// Stamp lines using a `chrono` strftime `format`. Stamps of an
    /// invalid format come out empty.
    pub fn with_format(inner: W, format: impl Into<String>) -> Self {
        Self {
            inner,
            format: format.into(),
            at_line_start: true,
            pending: BytesMut::new(),
        }
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Stamp `buf` into the pending output; all lines starting in `buf`
    /// share the same timestamp.
    fn stamp(&mut self, buf: &[u8]) {
        let mut now = String::new();
        if write!(now, "{} ", chrono::Local::now().format(&self.format)).is_err() {
            now.clear();
        }
        for line in buf.split_inclusive(|b| *b == b'\n') {
            if self.at_line_start {
                self.pending.extend_from_slice(now.as_bytes());
            }
            self.pending.extend_from_slice(line);
            self.at_line_start = line.ends_with(b"\n");
        }
    }
}

impl<W: AsyncWrite + Unpin> Timestamper<W> {
    fn poll_drain(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        while !self.pending.is_empty() {
            let n = ready!(Pin::new(&mut self.inner).poll_write(cx, &self.pending))?;
            if n == 0 {
                return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
            }
            self.pending.advance(n);
        }
        Poll::Ready(Ok(()))
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for Timestamper<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        ready!(this.poll_drain(cx))?;
        if !buf.is_empty() {
            this.stamp(buf);
        }
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(this.poll_drain(cx))?;
        Pin::new(&mut this.inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(this.poll_drain(cx))?;
        Pin::new(&mut this.inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    /// Writer failing once `limit` bytes have been written.
    struct LimitedWriter {
        limit: usize,
    }

    impl AsyncWrite for LimitedWriter {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            if self.limit == 0 {
                return Poll::Ready(Err(io::Error::other("write limit exceeded")));
            }
            let n = buf.len().min(self.limit);
            self.limit -= n;
            Poll::Ready(Ok(n))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn stamps_lines_across_write_boundaries() {
        let buf = SharedBuffer::new();
        let mut tw = Timestamper::with_format(buf.clone(), "[T]");

        tw.write_all(b"first line\nsec").await.unwrap();
        tw.write_all(b"ond line\n").await.unwrap();
        tw.flush().await.unwrap();
        assert_eq!(buf.to_string_lossy(), "[T] first line\n[T] second line\n");

        tw.write_all(b"third line").await.unwrap();
        tw.write_all(b"\nfo(u)rth line").await.unwrap();
        tw.flush().await.unwrap();
        assert_eq!(
            buf.to_string_lossy(),
            "[T] first line\n[T] second line\n[T] third line\n[T] fo(u)rth line"
        );
    }

    #[tokio::test]
    async fn default_format_stamps_date_and_millis() {
        let buf = SharedBuffer::new();
        let mut tw = Timestamper::new(buf.clone());
        tw.write_all(b"hello\n").await.unwrap();
        tw.flush().await.unwrap();

        let out = buf.to_string_lossy();
        let (stamp, rest) = out.split_at("01/02/06 15:04:05.000 ".len());
        assert_eq!(rest, "hello\n");
        let shape: String = stamp
            .chars()
            .map(|c| if c.is_ascii_digit() { '9' } else { c })
            .collect();
        assert_eq!(shape, "99/99/99 99:99:99.999 ");
    }

    #[tokio::test]
    async fn inner_write_errors_surface() {
        let mut tw = Timestamper::with_format(LimitedWriter { limit: 4 }, "");
        tw.write_all(b"A\nB\nC\n").await.unwrap();
        let err = tw.flush().await.unwrap_err();
        assert_eq!(err.to_string(), "write limit exceeded");
    }

    #[tokio::test]
    async fn clones_share_contents() {
        let buf = SharedBuffer::new();
        let mut writer = buf.clone();
        writer.write_all(b"hello, ").await.unwrap();
        writer.write_all(b"world").await.unwrap();

        assert_eq!(buf.to_string_lossy(), "hello, world");
        assert_eq!(buf.len(), 12);

        buf.clear();
        assert!(writer.is_empty());
    }

    #[tokio::test]
    async fn concurrent_writers_do_not_lose_bytes() {
        let buf = SharedBuffer::new();
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let mut writer = buf.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..100 {
                    writer.write_all(b"x").await.unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(buf.len(), 800);
    }
}
