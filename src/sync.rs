//! Sync sessions: a stream of consumer-group health summaries.
//!
//! Each summary is one JSON line. Two shapes are understood: a map of
//! group name to [`GroupHealth`], and a single consumer's
//! [`ConsumerStatusReport`]. Lines matching neither are skipped.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::codec::{FrameCodec, OffsetCodec};
use crate::config::SyncConfig;
use crate::connection::{Connection, Dialer, TcpDialer};
use crate::error::{Error, Result};
use crate::handshake::{self, Established};
use crate::reader::CloseHandle;
use crate::types::SessionKind;

/// Read/unread/restart counters for one consumer group. Missing counters
/// decode as 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupHealth {
    /// Messages the group has acknowledged.
    #[serde(rename = "read", alias = "Read", alias = "readCount")]
    pub read_count: u64,
    /// Messages still waiting for the group.
    #[serde(rename = "notRead", alias = "NotRead", alias = "unreadCount")]
    pub unread_count: u64,
    /// How many times members of the group restarted.
    #[serde(rename = "reboot", alias = "Reboot", alias = "restartCount")]
    pub restart_count: u64,
}

/// How far a consumer is from the tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsumerStatus {
    /// Close to the tail.
    #[serde(rename = "almost")]
    AboutToCatchUp,
    /// Well behind the tail.
    #[serde(rename = "faraway")]
    FarBehind,
    /// At the tail.
    #[serde(rename = "readIt")]
    CaughtUp,
}

/// Status of a single consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerStatusReport {
    /// The consumer the report is about.
    #[serde(rename = "consumerId", alias = "ConsumerID", alias = "consumer_id")]
    pub consumer_id: String,
    /// Its position relative to the tail.
    #[serde(alias = "Status")]
    pub status: ConsumerStatus,
}

/// One summary pushed by the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SyncSummary {
    /// A single consumer's status.
    Consumer(ConsumerStatusReport),
    /// Health of every consumer group, keyed by group name.
    Groups(HashMap<String, GroupHealth>),
}

impl SyncSummary {
    /// Decode one summary line.
    pub fn parse(line: &str) -> Option<Self> {
        serde_json::from_str(line).ok()
    }
}

/// A subscription to consumer-group summaries.
pub struct SyncSession<S = TcpStream> {
    conn: Option<Connection<S>>,
    host: String,
    close: CloseHandle,
    closing: watch::Receiver<bool>,
}

impl<S> std::fmt::Debug for SyncSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSession")
            .field("host", &self.host)
            .field("open", &self.conn.is_some())
            .finish()
    }
}

impl SyncSession<TcpStream> {
    /// Dial the configured hosts and subscribe.
    pub async fn connect(config: &SyncConfig) -> Result<Self> {
        Self::connect_with(config, &TcpDialer::new(&config.client)).await
    }
}

impl<S> SyncSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Subscribe through a custom dialer.
    pub async fn connect_with<D>(config: &SyncConfig, dialer: &D) -> Result<Self>
    where
        D: Dialer<Stream = S>,
    {
        let command = OffsetCodec.encode_command(SessionKind::Sync, &[]);
        let established = handshake::connect(dialer, &config.client, &command).await?;
        Ok(Self::from_established(established))
    }

    /// Wrap a connection whose handshake already succeeded.
    pub fn from_established(established: Established<S>) -> Self {
        let (close, closing) = CloseHandle::new();
        Self {
            conn: Some(established.conn),
            host: established.host,
            close,
            closing,
        }
    }

    /// The host this session is bound to.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// A handle that can end [`listen`](Self::listen) from another thread.
    pub fn close_handle(&self) -> CloseHandle {
        self.close.clone()
    }

    /// Close from the owning task: set the flag and shut the transport.
    pub async fn close(&mut self) {
        self.close.close();
        if let Some(mut conn) = self.conn.take() {
            conn.shutdown().await;
        }
    }

    /// Feed each summary to `keep_listening` until it returns `false`, the
    /// session is closed, or the transport fails.
    ///
    /// Returning `false` stops listening but leaves the transport open; the
    /// caller may listen again or [`close`](Self::close) it.
    pub async fn listen<F>(&mut self, mut keep_listening: F) -> Result<()>
    where
        F: FnMut(SyncSummary) -> bool,
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

            if *closing.borrow() {
                break;
            }

            let line = match read {
                None => break,
                Some(line) => line?,
            };

            let Some(summary) = SyncSummary::parse(&line) else {
                warn!(line = %line, "skipping undecodable summary");
                continue;
            };
            trace!(summary = ?summary, "summary received");

            if !keep_listening(summary) {
                debug!(host = %self.host, "listener stopped");
                return Ok(());
            }
        }

        debug!(host = %self.host, "sync session closed");
        if let Some(mut conn) = self.conn.take() {
            conn.shutdown().await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::io::{duplex, DuplexStream};

    fn sync_pair() -> (SyncSession<DuplexStream>, Connection<DuplexStream>) {
        let (client, server) = duplex(1024);
        let sync = SyncSession::from_established(Established {
            host: "test".into(),
            conn: Connection::new(client),
        });
        (sync, Connection::new(server))
    }

    #[test]
    fn test_parse_group_summary() {
        let summary =
            SyncSummary::parse(r#"{"billing":{"read":10,"notRead":2,"reboot":1}}"#).unwrap();
        let SyncSummary::Groups(groups) = summary else {
            panic!("expected groups");
        };
        assert_eq!(
            groups["billing"],
            GroupHealth {
                read_count: 10,
                unread_count: 2,
                restart_count: 1
            }
        );
    }

    #[test]
    fn test_parse_group_summary_missing_counters() {
        let summary = SyncSummary::parse(r#"{"audit":{"read":3},"idle":{}}"#).unwrap();
        let SyncSummary::Groups(groups) = summary else {
            panic!("expected groups");
        };
        assert_eq!(
            groups["audit"],
            GroupHealth {
                read_count: 3,
                unread_count: 0,
                restart_count: 0
            }
        );
        assert_eq!(groups["idle"], GroupHealth::default());
    }

    #[test]
    fn test_parse_consumer_summary() {
        let summary = SyncSummary::parse(r#"{"ConsumerID":"c1","Status":"faraway"}"#).unwrap();
        assert_eq!(
            summary,
            SyncSummary::Consumer(ConsumerStatusReport {
                consumer_id: "c1".into(),
                status: ConsumerStatus::FarBehind,
            })
        );
        assert!(SyncSummary::parse("msg;1;2").is_none());
        assert!(SyncSummary::parse(r#"{"consumerId":"c1","status":"lost"}"#).is_none());
    }

    #[tokio::test]
    async fn test_predicate_false_stops_without_closing() {
        let (mut sync, mut broker) = sync_pair();

        broker
            .send_line(r#"{"consumerId":"c1","status":"almost"}"#)
            .await
            .unwrap();
        broker.send_line("garbage").await.unwrap();
        broker
            .send_line(r#"{"consumerId":"c1","status":"readIt"}"#)
            .await
            .unwrap();

        let mut seen = Vec::new();
        sync.listen(|summary| {
            seen.push(summary);
            seen.len() < 2
        })
        .await
        .unwrap();
        assert_eq!(seen.len(), 2);

        // Still subscribed: the next summary arrives on the same transport.
        broker
            .send_line(r#"{"g":{"read":1,"notRead":0,"reboot":0}}"#)
            .await
            .unwrap();
        let mut next = None;
        sync.listen(|summary| {
            next = Some(summary);
            false
        })
        .await
        .unwrap();
        assert!(matches!(next, Some(SyncSummary::Groups(_))));
    }

    #[tokio::test]
    async fn test_close_handle_ends_listen() {
        let (mut sync, _broker) = sync_pair();
        let handle = sync.close_handle();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.close();
        });

        let result = tokio::time::timeout(Duration::from_secs(5), sync.listen(|_| true))
            .await
            .expect("close should unblock the read");
        assert!(result.is_ok());
        assert!(sync
            .listen(|_| true)
            .await
            .unwrap_err()
            .is_connection_closed());
    }

    #[tokio::test]
    async fn test_remote_close_is_an_error() {
        let (mut sync, broker) = sync_pair();
        drop(broker);
        assert!(sync
            .listen(|_| true)
            .await
            .unwrap_err()
            .is_connection_closed());
    }
}
