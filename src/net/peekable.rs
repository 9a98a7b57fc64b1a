//! Connection wrapper that replays sniffed bytes.
//!
//! Classification consumes the first bytes of a connection. `PeekableStream`
//! hands those bytes back to whoever reads next, then falls through to the
//! socket. Writes and shutdown are untouched.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, Bytes};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

use crate::net::connection::ConnectionId;
use crate::net::listener::ConnectionPermit;

/// A stream whose first reads are served from an already-read prefix.
#[derive(Debug)]
pub struct PeekableStream<S = TcpStream> {
    inner: S,
    replay: Bytes,
    id: ConnectionId,
    permit: Option<ConnectionPermit>,
}

impl<S> PeekableStream<S> {
    /// Wrap `inner`, replaying `replay` before any live bytes.
    pub fn new(inner: S, replay: Bytes) -> Self {
        Self {
            inner,
            replay,
            id: ConnectionId::new(),
            permit: None,
        }
    }

    /// Hold `permit` for as long as this stream lives.
    pub fn with_permit(mut self, permit: ConnectionPermit) -> Self {
        self.permit = Some(permit);
        self
    }

    /// Detach the connection slot so its lifetime can be tied to something
    /// other than the stream.
    pub fn take_permit(&mut self) -> Option<ConnectionPermit> {
        self.permit.take()
    }

    /// Identifier assigned when the connection was accepted.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Bytes not yet handed back to a reader.
    pub fn buffered(&self) -> &[u8] {
        &self.replay
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for PeekableStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.replay.has_remaining() {
            let n = this.replay.len().min(buf.remaining());
            buf.put_slice(&this.replay[..n]);
            this.replay.advance(n);
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for PeekableStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }
}
