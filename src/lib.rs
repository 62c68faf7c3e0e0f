//! # fabula: client for the fabula topic log
//!
//! A client for a line-oriented, topic-based log broker. Every session is a
//! single TCP connection carrying newline-terminated text, opened with a
//! one-line handshake and dedicated to one role for its lifetime.
//!
//! ## Features
//!
//! - **Tailing**: [`Reader`] (compound marks) and [`Consumer`] (flat
//!   offsets, consumer groups) with strict pull/ack alternation
//! - **Appending**: [`Writer`] and [`Producer`], one round trip per message
//! - **Sync**: [`SyncSession`] streams consumer-group health summaries
//! - **Failover**: hosts are tried in order until one accepts the handshake
//! - **Blocking wrappers**: [`BlockingReader`], [`BlockingWriter`] and
//!   friends for non-async callers
//!
//! ## Quick Start (async)
//!
//! ```ignore
//! use fabula::{ClientConfig, Mark, Reader, ReaderConfig};
//!
//! #[tokio::main]
//! async fn main() -> fabula::Result<()> {
//!     let client = ClientConfig::from_hosts(["10.0.0.1:9999", "10.0.0.2:9999"]);
//!     let mut reader = Reader::connect(&ReaderConfig::new(client, "audit", Mark::new(3, 0))).await?;
//!
//!     reader
//!         .run(|delivery| async move {
//!             println!("{} @ {}: {}", delivery.topic, delivery.position, delivery.message);
//!             Ok::<(), std::io::Error>(())
//!         })
//!         .await
//! }
//! ```
//!
//! ## Quick Start (blocking)
//!
//! ```ignore
//! use fabula::{BlockingWriter, WriterConfig};
//!
//! fn main() -> fabula::Result<()> {
//!     let mut writer = BlockingWriter::connect(&WriterConfig::default())?;
//!     let mark = writer.write("orders", "created")?;
//!     println!("stored at {}", mark);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod handshake;
pub mod reader;
pub mod sync;
pub mod types;
pub mod writer;

// ── Re-exports for ergonomic top-level usage ────────────────────────────────

pub use client::{
    BlockingAppend, BlockingConsumer, BlockingProducer, BlockingReader, BlockingSync,
    BlockingTail, BlockingWriter,
};
pub use codec::{ChapterCodec, FrameCodec, OffsetCodec};
pub use config::{
    ClientConfig, ConsumerConfig, ProducerConfig, ReaderConfig, SyncConfig, WriterConfig,
};
pub use connection::{Connection, Dialer, TcpDialer};
pub use error::{BoxError, Error, Result};
pub use handshake::Established;
pub use reader::{CloseHandle, Consumer, Reader, Tail, TailState};
pub use sync::{ConsumerStatus, ConsumerStatusReport, GroupHealth, SyncSession, SyncSummary};
pub use types::{Delivery, Mark, OffsetStrategy, Position, SessionKind};
pub use writer::{Append, Producer, Writer};
