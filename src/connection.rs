//! Line transport over a byte stream.
//!
//! [`Connection`] frames a bidirectional stream into newline-terminated
//! text lines with a buffered reader, the way the broker speaks. The
//! [`Dialer`] trait is the seam to the outside world: it turns a host
//! string into a stream, and [`TcpDialer`] is the default.

use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace};

use crate::codec;
use crate::config::{ClientConfig, DEFAULT_MAX_LINE_LENGTH};
use crate::error::{Error, Result};

/// Default read/write buffer size (8 KB).
const DEFAULT_BUF_SIZE: usize = 8 * 1024;

/// Opens a raw stream to a host.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// The stream produced by a successful dial.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Connect to `host`.
    async fn dial(&self, host: &str) -> Result<Self::Stream>;
}

/// Plain TCP dialer.
#[derive(Debug, Clone, Default)]
pub struct TcpDialer {
    connect_timeout: Option<Duration>,
    nodelay: bool,
}

impl TcpDialer {
    /// Build a dialer from the client settings.
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout,
            nodelay: config.nodelay,
        }
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    type Stream = TcpStream;

    async fn dial(&self, host: &str) -> Result<TcpStream> {
        let connect = TcpStream::connect(host);
        let tcp = match self.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, connect)
                .await
                .map_err(|_| Error::Timeout(limit))?,
            None => connect.await,
        }
        .map_err(|source| Error::Dial {
            host: host.to_string(),
            source,
        })?;

        if self.nodelay {
            tcp.set_nodelay(true).map_err(|source| Error::Dial {
                host: host.to_string(),
                source,
            })?;
        }
        Ok(tcp)
    }
}

/// A stream framed into text lines.
pub struct Connection<S> {
    stream: S,
    read_buf: BytesMut,
    write_buf: BytesMut,
    max_line_length: usize,
}

impl<S> std::fmt::Debug for Connection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("buffered", &self.read_buf.len())
            .field("max_line_length", &self.max_line_length)
            .finish()
    }
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap a stream with the default line limit.
    pub fn new(stream: S) -> Self {
        Self::with_max_line_length(stream, DEFAULT_MAX_LINE_LENGTH)
    }

    /// Wrap a stream, refusing lines longer than `max_line_length` bytes.
    pub fn with_max_line_length(stream: S, max_line_length: usize) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(DEFAULT_BUF_SIZE),
            write_buf: BytesMut::with_capacity(DEFAULT_BUF_SIZE),
            max_line_length,
        }
    }

    /// Write one line; the terminator is appended here.
    pub async fn send_line(&mut self, line: &str) -> Result<()> {
        self.write_buf.clear();
        codec::encode_line(line, &mut self.write_buf);
        trace!(line, "send");

        let result = match self.stream.write_all(&self.write_buf).await {
            Ok(()) => self.stream.flush().await,
            Err(e) => Err(e),
        };
        self.write_buf.clear();

        result.map_err(|e| {
            debug!(error = %e, "write failed");
            Error::ConnectionClosed
        })
    }

    /// Block until a full line is buffered.
    ///
    /// Fails with [`Error::ConnectionClosed`] when the stream ends or
    /// errors before a terminator arrives.
    pub async fn read_line(&mut self) -> Result<String> {
        loop {
            if let Some(line) = codec::decode_line(&mut self.read_buf, self.max_line_length)? {
                trace!(line = %line, "recv");
                return Ok(line);
            }

            let n = self.stream.read_buf(&mut self.read_buf).await.map_err(|e| {
                debug!(error = %e, "read failed");
                Error::ConnectionClosed
            })?;

            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
        }
    }

    /// Shut down the write half; pending and later reads see end of stream
    /// once the peer closes too.
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!(error = %e, "shutdown failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_send_and_read_lines() {
        let (client, server) = duplex(64);
        let mut client = Connection::new(client);
        let mut server = Connection::new(server);

        client.send_line("sr;r1;0;0").await.unwrap();
        assert_eq!(server.read_line().await.unwrap(), "sr;r1;0;0");

        server.send_line("ok").await.unwrap();
        assert_eq!(client.read_line().await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_read_line_spanning_chunks() {
        let (client, mut server) = duplex(64);
        let mut client = Connection::new(client);

        server.write_all(b"msg;1;").await.unwrap();
        server.write_all(b"2;false;t;m\nnext").await.unwrap();
        assert_eq!(client.read_line().await.unwrap(), "msg;1;2;false;t;m");
    }

    #[tokio::test]
    async fn test_read_line_after_peer_close() {
        let (client, mut server) = duplex(64);
        let mut client = Connection::new(client);

        server.write_all(b"half a line").await.unwrap();
        drop(server);
        assert!(client.read_line().await.unwrap_err().is_connection_closed());
    }

    #[tokio::test]
    async fn test_send_after_peer_close() {
        let (client, server) = duplex(64);
        let mut client = Connection::new(client);
        drop(server);
        assert!(client.send_line("ok").await.unwrap_err().is_connection_closed());
    }

    #[tokio::test]
    async fn test_line_limit() {
        let (client, mut server) = duplex(64);
        let mut client = Connection::with_max_line_length(client, 8);

        server.write_all(b"0123456789abcdef\n").await.unwrap();
        assert!(matches!(
            client.read_line().await,
            Err(Error::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_tcp_dialer_unreachable_host() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let dialer = TcpDialer::new(&ClientConfig::default());
        match dialer.dial(&addr).await {
            Err(Error::Dial { host, .. }) => assert_eq!(host, addr),
            other => panic!("expected dial failure, got {:?}", other.map(|_| ())),
        }
    }
}
