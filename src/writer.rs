//! Append sessions: one request line out, one acknowledgment line in.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, trace};

use crate::codec::{ChapterCodec, FrameCodec, OffsetCodec};
use crate::config::{ProducerConfig, WriterConfig};
use crate::connection::{Connection, Dialer, TcpDialer};
use crate::error::Result;
use crate::handshake::{self, Established};
use crate::types::SessionKind;

/// Appends and receives the new compound mark (`sw` sessions).
pub type Writer<S = TcpStream> = Append<S, ChapterCodec>;

/// Appends and receives an opaque id (`p` sessions).
pub type Producer<S = TcpStream> = Append<S, OffsetCodec>;

/// A synchronous append session. No buffering, no batching: every call is
/// a full round trip.
pub struct Append<S, C: FrameCodec> {
    conn: Connection<S>,
    codec: C,
    host: String,
    last_receipt: Option<C::Receipt>,
}

impl<S, C: FrameCodec> std::fmt::Debug for Append<S, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Append")
            .field("host", &self.host)
            .field("last_receipt", &self.last_receipt)
            .finish()
    }
}

impl Writer<TcpStream> {
    /// Dial the configured hosts and open a write session.
    pub async fn connect(config: &WriterConfig) -> Result<Self> {
        Self::connect_with(config, &TcpDialer::new(&config.client)).await
    }
}

impl<S> Writer<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Open a write session through a custom dialer.
    pub async fn connect_with<D>(config: &WriterConfig, dialer: &D) -> Result<Self>
    where
        D: Dialer<Stream = S>,
    {
        let command = ChapterCodec.encode_command(SessionKind::Write, &[]);
        let established = handshake::connect(dialer, &config.client, &command).await?;
        Ok(Self::from_established(established, ChapterCodec))
    }
}

impl Producer<TcpStream> {
    /// Dial the configured hosts and open a produce session.
    pub async fn connect(config: &ProducerConfig) -> Result<Self> {
        Self::connect_with(config, &TcpDialer::new(&config.client)).await
    }
}

impl<S> Producer<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Open a produce session through a custom dialer.
    pub async fn connect_with<D>(config: &ProducerConfig, dialer: &D) -> Result<Self>
    where
        D: Dialer<Stream = S>,
    {
        let command = OffsetCodec.encode_command(SessionKind::Produce, &[]);
        let established = handshake::connect(dialer, &config.client, &command).await?;
        Ok(Self::from_established(established, OffsetCodec))
    }
}

impl<S, C> Append<S, C>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    C: FrameCodec,
{
    /// Wrap a connection whose handshake already succeeded.
    pub fn from_established(established: Established<S>, codec: C) -> Self {
        Self {
            conn: established.conn,
            codec,
            host: established.host,
            last_receipt: None,
        }
    }

    /// The host this session is bound to.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Receipt of the most recent successful append.
    pub fn last_receipt(&self) -> Option<&C::Receipt> {
        self.last_receipt.as_ref()
    }

    /// Append `message` to `topic` and wait for the broker's receipt.
    ///
    /// Any leading token other than `ok` fails with [`Error::Rejected`](crate::Error::Rejected).
    /// A chapter response without both mark fields fails with
    /// [`Error::Protocol`](crate::Error::Protocol).
    pub async fn append(&mut self, topic: &str, message: &str) -> Result<C::Receipt> {
        let request = self.codec.encode_append(topic, message);
        self.conn.send_line(&request).await?;
        let response = self.conn.read_line().await?;

        match self.codec.decode_ack_response(&response) {
            Ok(receipt) => {
                trace!(topic, receipt = ?receipt, "appended");
                self.last_receipt = Some(receipt.clone());
                Ok(receipt)
            }
            Err(e) => {
                debug!(topic, response = %response, error = %e, "append failed");
                Err(e)
            }
        }
    }

    /// Shut the transport down.
    pub async fn close(mut self) {
        self.conn.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, DuplexStream};

    use crate::types::Mark;

    fn established(stream: DuplexStream) -> Established<DuplexStream> {
        Established {
            host: "test".into(),
            conn: Connection::new(stream),
        }
    }

    #[tokio::test]
    async fn test_append_returns_mark() {
        let (client, server) = duplex(256);
        let mut writer = Append::from_established(established(client), ChapterCodec);
        let mut broker = Connection::new(server);

        let task = tokio::spawn(async move {
            let request = broker.read_line().await.unwrap();
            broker.send_line("ok;5;12").await.unwrap();
            let second = broker.read_line().await.unwrap();
            broker.send_line("err;bad").await.unwrap();
            (request, second)
        });

        let mark = writer.append("orders", "created").await.unwrap();
        assert_eq!(mark, Mark::new(5, 12));
        assert_eq!(writer.last_receipt(), Some(&Mark::new(5, 12)));

        let err = writer.append("orders", "again").await.unwrap_err();
        assert!(err.is_rejected());
        // A rejection leaves the previous receipt in place.
        assert_eq!(writer.last_receipt(), Some(&Mark::new(5, 12)));

        let (request, second) = task.await.unwrap();
        assert_eq!(request, "orders;created");
        assert_eq!(second, "orders;again");
    }

    #[tokio::test]
    async fn test_produce_returns_id() {
        let (client, server) = duplex(256);
        let mut producer = Append::from_established(established(client), OffsetCodec);
        let mut broker = Connection::new(server);

        tokio::spawn(async move {
            let _ = broker.read_line().await.unwrap();
            broker.send_line("ok;evt-77").await.unwrap();
        });

        assert_eq!(producer.append("payments", "x").await.unwrap(), "evt-77");
    }

    #[tokio::test]
    async fn test_append_on_closed_connection() {
        let (client, server) = duplex(256);
        let mut writer = Append::from_established(established(client), ChapterCodec);
        drop(server);

        let err = writer.append("orders", "x").await.unwrap_err();
        assert!(err.is_connection_closed());
        assert!(writer.last_receipt().is_none());
    }
}
