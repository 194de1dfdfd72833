//! Timeout enforcement.
//!
//! # Responsibilities
//! - Bound transport establishment with the connect timeout
//! - Bound the wait for response headers with the response timeout
//! - Detect stalled writes at the transport and stalled body reads
//! - Translate every expiry into a distinct `TransportFailure`
//!
//! # Design Decisions
//! - Uses Tokio's timer facilities; each deadline is independent
//! - Stall detection measures inactivity, not total transfer time
//! - A body that breaks mid-transfer is a stall, never a partial success

use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::Sleep;

use crate::error::{StallDirection, TransportFailure};

/// Run `fut` under an optional deadline. `None` waits forever.
pub async fn within<T, F>(
    limit: Option<Duration>,
    fut: F,
    on_elapsed: impl FnOnce(Duration) -> TransportFailure,
) -> Result<T, TransportFailure>
where
    F: Future<Output = Result<T, TransportFailure>>,
{
    match limit {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(on_elapsed(limit)),
        },
        None => fut.await,
    }
}

/// Collect a response body, failing if no frame arrives within `read_stall`.
pub async fn read_body(mut body: Incoming, read_stall: Option<Duration>) -> Result<Bytes, TransportFailure> {
    let mut buf = BytesMut::new();
    loop {
        let next = match read_stall {
            Some(limit) => match tokio::time::timeout(limit, body.frame()).await {
                Ok(next) => next,
                Err(_) => {
                    return Err(TransportFailure::StreamStall {
                        direction: StallDirection::Read,
                        reason: format!("no body data for {limit:?}"),
                    })
                }
            },
            None => body.frame().await,
        };

        match next {
            None => break,
            Some(Ok(frame)) => {
                if let Ok(data) = frame.into_data() {
                    buf.extend_from_slice(&data);
                }
            }
            Some(Err(e)) => {
                return Err(TransportFailure::StreamStall {
                    direction: StallDirection::Read,
                    reason: format!("body interrupted after {} bytes: {}", buf.len(), e),
                })
            }
        }
    }
    Ok(buf.freeze())
}

/// Marker carried inside the `io::Error` raised by [`StallGuard`].
#[derive(Debug)]
pub struct WriteStalled(pub Duration);

impl fmt::Display for WriteStalled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no write progress for {:?}", self.0)
    }
}

impl StdError for WriteStalled {}

/// Write-stall limit shared between a pooled connection and its transport.
///
/// A pooled transport outlives any single call, so each call sets the limit
/// before it writes. Zero means no limit.
#[derive(Debug, Clone, Default)]
pub struct StallLimit(Arc<AtomicU64>);

impl StallLimit {
    pub fn new(limit: Option<Duration>) -> Self {
        let this = Self::default();
        this.set(limit);
        this
    }

    pub fn set(&self, limit: Option<Duration>) {
        let ms = limit
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        self.0.store(ms, Ordering::Relaxed);
    }

    pub fn get(&self) -> Option<Duration> {
        match self.0.load(Ordering::Relaxed) {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

/// Transport wrapper that fails a write which makes no progress for the current limit.
#[derive(Debug)]
pub struct StallGuard<T> {
    inner: T,
    write_stall: StallLimit,
    write_deadline: Option<Pin<Box<Sleep>>>,
}

impl<T> StallGuard<T> {
    pub fn new(inner: T, write_stall: StallLimit) -> Self {
        Self {
            inner,
            write_stall,
            write_deadline: None,
        }
    }

    /// Called while the inner write is pending.
    fn poll_stalled<R>(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<R>> {
        let Some(limit) = self.write_stall.get() else {
            return Poll::Pending;
        };
        let deadline = self
            .write_deadline
            .get_or_insert_with(|| Box::pin(tokio::time::sleep(limit)));
        match deadline.as_mut().poll(cx) {
            Poll::Ready(()) => {
                self.write_deadline = None;
                Poll::Ready(Err(io::Error::new(io::ErrorKind::TimedOut, WriteStalled(limit))))
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn progressed<R>(&mut self, result: io::Result<R>) -> Poll<io::Result<R>> {
        self.write_deadline = None;
        Poll::Ready(result)
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for StallGuard<T> {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for StallGuard<T> {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_write(cx, buf) {
            Poll::Ready(result) => this.progressed(result),
            Poll::Pending => this.poll_stalled(cx),
        }
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_write_vectored(cx, bufs) {
            Poll::Ready(result) => this.progressed(result),
            Poll::Pending => this.poll_stalled(cx),
        }
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_flush(cx) {
            Poll::Ready(result) => this.progressed(result),
            Poll::Pending => this.poll_stalled(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

/// True if `err` (or anything in its source chain) is a [`StallGuard`] write stall.
pub fn is_write_stall(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.downcast_ref::<WriteStalled>().is_some() {
            return true;
        }
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            if io_err
                .get_ref()
                .map(|inner| inner.downcast_ref::<WriteStalled>().is_some())
                .unwrap_or(false)
            {
                return true;
            }
        }
        current = e.source();
    }
    false
}

/// Map an error from sending a request into a transport failure.
pub fn send_failure(err: hyper::Error) -> TransportFailure {
    if is_write_stall(&err) {
        return TransportFailure::StreamStall {
            direction: StallDirection::Write,
            reason: err.to_string(),
        };
    }
    match err.source() {
        Some(source) => TransportFailure::Connection(format!("{err}: {source}")),
        None => TransportFailure::Connection(err.to_string()),
    }
}
