//! Protocol classification of freshly accepted connections.
//!
//! One read of at most `window` bytes decides whether a connection speaks
//! HTTP. The bytes are returned so the caller can replay them; nothing past
//! that single read is consumed. A request head that does not fit in the
//! window is classified as [`Protocol::Raw`].

use std::io;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Default number of bytes inspected per connection.
pub const DEFAULT_SNIFF_WINDOW: usize = 1024;

/// Header slots handed to the parser, matching hyper's default limit.
const MAX_HEADERS: usize = 100;

/// Application protocol spoken by a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// A complete HTTP/1.x request head.
    Http,
    /// Anything else; served by the line-oriented broker.
    Raw,
}

impl Protocol {
    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Raw => "raw",
        }
    }
}

/// Classify the first bytes of a connection.
pub fn classify(bytes: &[u8]) -> Protocol {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut request = httparse::Request::new(&mut headers);
    match request.parse(bytes) {
        Ok(httparse::Status::Complete(_)) => Protocol::Http,
        _ => Protocol::Raw,
    }
}

/// Perform the single classification read.
///
/// Returns the bytes read. A peer that closes before sending anything yields
/// `UnexpectedEof`; a peer that stays silent past `timeout` yields `TimedOut`.
pub async fn read_prefix<S>(stream: &mut S, window: usize, timeout: Duration) -> io::Result<Bytes>
where
    S: AsyncRead + Unpin,
{
    let mut buf = BytesMut::zeroed(window);
    let n = tokio::time::timeout(timeout, stream.read(&mut buf))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "no data before sniff timeout"))??;
    if n == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed before sniffing",
        ));
    }
    buf.truncate(n);
    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn complete_request_is_http() {
        let req = b"POST /publish HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: 2\r\n\r\n{}";
        assert_eq!(classify(req), Protocol::Http);
    }

    #[test]
    fn request_without_headers_is_http() {
        assert_eq!(classify(b"GET / HTTP/1.0\r\n\r\n"), Protocol::Http);
    }

    #[test]
    fn topic_lines_are_raw() {
        assert_eq!(classify(b"orders\n"), Protocol::Raw);
        assert_eq!(classify(b"orders\nfills\n"), Protocol::Raw);
        assert_eq!(classify(b"GET\n"), Protocol::Raw);
    }

    #[test]
    fn empty_and_binary_are_raw() {
        assert_eq!(classify(b""), Protocol::Raw);
        assert_eq!(classify(&[0x16, 0x03, 0x01, 0x00, 0xa5, 0x01]), Protocol::Raw);
        assert_eq!(classify(&[0xff; 32]), Protocol::Raw);
    }

    #[test]
    fn truncated_head_is_raw() {
        assert_eq!(
            classify(b"GET /status HTTP/1.1\r\nHost: localhost\r\n"),
            Protocol::Raw
        );
    }

    #[test]
    fn head_larger_than_window_is_raw() {
        let mut req = b"GET / HTTP/1.1\r\nX-Padding: ".to_vec();
        req.extend(std::iter::repeat(b'a').take(DEFAULT_SNIFF_WINDOW));
        req.extend_from_slice(b"\r\n\r\n");
        assert_eq!(classify(&req[..DEFAULT_SNIFF_WINDOW]), Protocol::Raw);
        assert_eq!(classify(&req), Protocol::Http);
    }

    #[tokio::test]
    async fn read_prefix_reads_once_up_to_window() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(b"orders\nfills\n").await.unwrap();

        let prefix = read_prefix(&mut server, 7, Duration::from_secs(1)).await.unwrap();
        assert_eq!(&prefix[..], b"orders\n");
    }

    #[tokio::test]
    async fn read_prefix_reports_eof() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);

        let err = read_prefix(&mut server, 16, Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn read_prefix_times_out_on_silence() {
        let (_client, mut server) = tokio::io::duplex(64);

        let err = read_prefix(&mut server, 16, Duration::from_millis(20)).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }
}
