//! Tailing sessions: pull one message, hand it to the caller, acknowledge,
//! repeat.
//!
//! A [`Tail`] never has more than one message in flight. The next line is
//! read only after the previous delivery has been answered with `ok`, so
//! a slow handler applies backpressure all the way to the broker. A
//! handler failure is answered with `nok` and ends the session.
//!
//! [`Reader`] tails a topic from a compound [`Mark`](crate::Mark);
//! [`Consumer`] tails as a consumer-group member with flat offsets.
//!
//! # Closing
//!
//! [`CloseHandle::close`] may be called from any thread or task. It sets
//! the close flag and wakes a read that is blocked waiting for the broker.
//! A handler that is already running is not interrupted; the session ends
//! at the next read boundary, and [`Tail::run`] returns `Ok(())`.

use std::future::Future;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::codec::{ChapterCodec, FrameCodec, OffsetCodec, ACK, NAK};
use crate::config::{ConsumerConfig, ReaderConfig};
use crate::connection::{Connection, Dialer, TcpDialer};
use crate::error::{BoxError, Error, Result};
use crate::handshake::{self, Established};
use crate::types::{Delivery, SessionKind};

/// Tails a topic from a compound mark (`sr` sessions).
pub type Reader<S = TcpStream> = Tail<S, ChapterCodec>;

/// Tails as a consumer-group member with flat offsets (`c` sessions).
pub type Consumer<S = TcpStream> = Tail<S, OffsetCodec>;

/// Cross-thread handle that ends a session's loop.
#[derive(Debug, Clone)]
pub struct CloseHandle {
    flag: Arc<watch::Sender<bool>>,
}

impl CloseHandle {
    pub(crate) fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { flag: Arc::new(tx) }, rx)
    }

    /// Ask the session to stop. Idempotent.
    pub fn close(&self) {
        self.flag.send_replace(true);
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        *self.flag.borrow()
    }
}

/// Lifecycle of a tailing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailState {
    /// Handshake done; the loop may run.
    Open,
    /// The loop ended with an error. The transport is still writable.
    Failed,
    /// Closed locally; the transport has been shut down.
    Closed,
}

/// A tailing session over any line transport and wire variant.
pub struct Tail<S, C> {
    conn: Option<Connection<S>>,
    codec: C,
    host: String,
    state: TailState,
    close: CloseHandle,
    closing: watch::Receiver<bool>,
}

impl<S, C> std::fmt::Debug for Tail<S, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tail")
            .field("host", &self.host)
            .field("state", &self.state)
            .finish()
    }
}

impl Reader<TcpStream> {
    /// Dial the configured hosts and open a read session at `config.mark`.
    pub async fn connect(config: &ReaderConfig) -> Result<Self> {
        Self::connect_with(config, &TcpDialer::new(&config.client)).await
    }
}

impl<S> Reader<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Open a read session through a custom dialer.
    pub async fn connect_with<D>(config: &ReaderConfig, dialer: &D) -> Result<Self>
    where
        D: Dialer<Stream = S>,
    {
        let params = [
            config.id.clone(),
            config.mark.segment.to_string(),
            config.mark.index.to_string(),
        ];
        let command = ChapterCodec.encode_command(SessionKind::Read, &params);
        let established = handshake::connect(dialer, &config.client, &command).await?;
        Ok(Self::from_established(established, ChapterCodec))
    }
}

impl Consumer<TcpStream> {
    /// Dial the configured hosts and join the consumer group.
    pub async fn connect(config: &ConsumerConfig) -> Result<Self> {
        Self::connect_with(config, &TcpDialer::new(&config.client)).await
    }
}

impl<S> Consumer<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Join the consumer group through a custom dialer.
    pub async fn connect_with<D>(config: &ConsumerConfig, dialer: &D) -> Result<Self>
    where
        D: Dialer<Stream = S>,
    {
        let params = [
            config.id.clone(),
            config.group.clone(),
            config.offset.to_param(),
        ];
        let command = OffsetCodec.encode_command(SessionKind::Consume, &params);
        let established = handshake::connect(dialer, &config.client, &command).await?;
        Ok(Self::from_established(established, OffsetCodec))
    }
}

impl<S, C> Tail<S, C>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    C: FrameCodec,
{
    /// Wrap a connection whose handshake already succeeded.
    pub fn from_established(established: Established<S>, codec: C) -> Self {
        let (close, closing) = CloseHandle::new();
        Self {
            conn: Some(established.conn),
            codec,
            host: established.host,
            state: TailState::Open,
            close,
            closing,
        }
    }

    /// The host this session is bound to.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TailState {
        self.state
    }

    /// A handle that can end [`run`](Self::run) from another thread.
    pub fn close_handle(&self) -> CloseHandle {
        self.close.clone()
    }

    /// Close from the owning task: set the flag and shut the transport.
    pub async fn close(&mut self) {
        self.close.close();
        self.shutdown().await;
    }

    /// Run the delivery loop until the session is closed or fails.
    ///
    /// Each delivery is passed to `handler` exactly once. `Ok(())` from the
    /// handler is acknowledged with `ok` and the loop continues; an error is
    /// answered with `nok` and returned as [`Error::Handler`]. Read errors
    /// are answered with `nok` as well. A local close always yields `Ok(())`.
    pub async fn run<F, Fut, E>(&mut self, mut handler: F) -> Result<()>
    where
        F: FnMut(Delivery) -> Fut,
        Fut: Future<Output = std::result::Result<(), E>>,
        E: Into<BoxError>,
    {
        if self.state != TailState::Open {
            return Err(Error::ConnectionClosed);
        }

        let outcome = self.deliver_loop(&mut handler).await;
        match outcome {
            Ok(()) => {
                debug!(host = %self.host, "session closed");
                self.shutdown().await;
                Ok(())
            }
            Err(e) => {
                warn!(host = %self.host, error = %e, "session failed");
                self.state = TailState::Failed;
                Err(e)
            }
        }
    }

    async fn deliver_loop<F, Fut, E>(&mut self, handler: &mut F) -> Result<()>
    where
        F: FnMut(Delivery) -> Fut,
        Fut: Future<Output = std::result::Result<(), E>>,
        E: Into<BoxError>,
    {
        let Some(conn) = self.conn.as_mut() else {
            return Err(Error::ConnectionClosed);
        };
        let mut closing = self.closing.clone();

        loop {
            let read = tokio::select! {
                biased;
                _ = closing.wait_for(|closed| *closed) => None,
                line = conn.read_line() => Some(line),
            };

            // Whatever the read produced, a close that raced it wins.
            if *closing.borrow() {
                return Ok(());
            }

            let line = match read {
                None => return Ok(()),
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    send_nak(conn).await;
                    return Err(e);
                }
            };

            let Some(delivery) = self.codec.decode_delivery(&line) else {
                trace!(line = %line, "skipping non-delivery line");
                continue;
            };
            trace!(topic = %delivery.topic, position = %delivery.position, "delivering");

            if let Err(e) = handler(delivery).await {
                let err = Error::handler(e);
                debug!(error = %err, "handler failed, sending nok");
                send_nak(conn).await;
                return Err(err);
            }

            conn.send_line(ACK).await?;
            trace!("acknowledged");
        }
    }

    async fn shutdown(&mut self) {
        self.state = TailState::Closed;
        if let Some(mut conn) = self.conn.take() {
            conn.shutdown().await;
        }
    }
}

/// Negative acknowledgment; a write failure here never replaces the error
/// that caused it.
async fn send_nak<S>(conn: &mut Connection<S>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    if let Err(e) = conn.send_line(NAK).await {
        warn!(error = %e, "failed to send nok");
    }
}
