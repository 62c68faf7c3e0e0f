//! Synchronous (blocking) sessions.
//!
//! Each wrapper owns a single-threaded Tokio runtime and drives the async
//! session on the calling thread, giving the classic model: one blocking
//! control loop per session, run on a thread of the caller's choosing.
//! The library itself spawns no threads. [`CloseHandle`]s stay usable from
//! any other thread.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::runtime::Runtime;

use crate::codec::{ChapterCodec, FrameCodec, OffsetCodec};
use crate::config::{ConsumerConfig, ProducerConfig, ReaderConfig, SyncConfig, WriterConfig};
use crate::error::{BoxError, Error, Result};
use crate::reader::{CloseHandle, Consumer, Reader, Tail, TailState};
use crate::sync::{SyncSession, SyncSummary};
use crate::types::{Delivery, Mark};
use crate::writer::{Append, Producer, Writer};

fn runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(Error::Io)
}

/// A blocking tailing session.
///
/// # Examples
///
/// ```ignore
/// use fabula::{BlockingReader, ClientConfig, Mark, ReaderConfig};
///
/// let config = ReaderConfig::new(ClientConfig::default(), "audit", Mark::new(0, 0));
/// let mut reader = BlockingReader::connect(&config)?;
/// let closer = reader.close_handle();
/// std::thread::spawn(move || {
///     std::thread::sleep(std::time::Duration::from_secs(60));
///     closer.close();
/// });
/// reader.run(|delivery| {
///     println!("{} @ {}: {}", delivery.topic, delivery.position, delivery.message);
///     Ok::<(), std::io::Error>(())
/// })?;
/// ```
pub struct BlockingTail<C> {
    inner: Tail<TcpStream, C>,
    rt: Runtime,
}

/// Blocking [`Reader`].
pub type BlockingReader = BlockingTail<ChapterCodec>;

/// Blocking [`Consumer`].
pub type BlockingConsumer = BlockingTail<OffsetCodec>;

impl BlockingReader {
    /// Dial the configured hosts and open a read session.
    pub fn connect(config: &ReaderConfig) -> Result<Self> {
        let rt = runtime()?;
        let inner = rt.block_on(Reader::<TcpStream>::connect(config))?;
        Ok(Self { inner, rt })
    }
}

impl BlockingConsumer {
    /// Dial the configured hosts and join the consumer group.
    pub fn connect(config: &ConsumerConfig) -> Result<Self> {
        let rt = runtime()?;
        let inner = rt.block_on(Consumer::<TcpStream>::connect(config))?;
        Ok(Self { inner, rt })
    }
}

impl<C: FrameCodec> BlockingTail<C> {
    /// The host this session is bound to.
    pub fn host(&self) -> &str {
        self.inner.host()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TailState {
        self.inner.state()
    }

    /// A handle that ends [`run`](Self::run) from another thread.
    pub fn close_handle(&self) -> CloseHandle {
        self.inner.close_handle()
    }

    /// Block on the delivery loop. See [`Tail::run`].
    pub fn run<F, E>(&mut self, mut handler: F) -> Result<()>
    where
        F: FnMut(Delivery) -> std::result::Result<(), E>,
        E: Into<BoxError>,
    {
        let inner = &mut self.inner;
        self.rt
            .block_on(inner.run(|delivery| std::future::ready(handler(delivery))))
    }

    /// Close from the owning thread.
    pub fn close(&mut self) {
        let inner = &mut self.inner;
        self.rt.block_on(inner.close());
    }
}

/// A blocking append session.
pub struct BlockingAppend<C: FrameCodec> {
    inner: Append<TcpStream, C>,
    rt: Runtime,
}

/// Blocking [`Writer`].
pub type BlockingWriter = BlockingAppend<ChapterCodec>;

/// Blocking [`Producer`].
pub type BlockingProducer = BlockingAppend<OffsetCodec>;

impl BlockingWriter {
    /// Dial the configured hosts and open a write session.
    pub fn connect(config: &WriterConfig) -> Result<Self> {
        let rt = runtime()?;
        let inner = rt.block_on(Writer::<TcpStream>::connect(config))?;
        Ok(Self { inner, rt })
    }

    /// Append and return the new mark.
    pub fn write(&mut self, topic: &str, message: &str) -> Result<Mark> {
        self.append(topic, message)
    }
}

impl BlockingProducer {
    /// Dial the configured hosts and open a produce session.
    pub fn connect(config: &ProducerConfig) -> Result<Self> {
        let rt = runtime()?;
        let inner = rt.block_on(Producer::<TcpStream>::connect(config))?;
        Ok(Self { inner, rt })
    }

    /// Append and return the broker's id for the message.
    pub fn produce(&mut self, topic: &str, message: &str) -> Result<String> {
        self.append(topic, message)
    }
}

impl<C: FrameCodec> BlockingAppend<C> {
    /// The host this session is bound to.
    pub fn host(&self) -> &str {
        self.inner.host()
    }

    /// Receipt of the most recent successful append.
    pub fn last_receipt(&self) -> Option<&C::Receipt> {
        self.inner.last_receipt()
    }

    /// Append `message` to `topic`. See [`Append::append`].
    pub fn append(&mut self, topic: &str, message: &str) -> Result<C::Receipt> {
        let inner = &mut self.inner;
        self.rt.block_on(inner.append(topic, message))
    }

    /// Shut the transport down.
    pub fn close(self) {
        let Self { inner, rt } = self;
        rt.block_on(inner.close());
    }
}

/// A blocking sync subscription.
pub struct BlockingSync {
    inner: SyncSession<TcpStream>,
    rt: Runtime,
}

impl BlockingSync {
    /// Dial the configured hosts and subscribe.
    pub fn connect(config: &SyncConfig) -> Result<Self> {
        let rt = runtime()?;
        let inner = rt.block_on(SyncSession::<TcpStream>::connect(config))?;
        Ok(Self { inner, rt })
    }

    /// The host this session is bound to.
    pub fn host(&self) -> &str {
        self.inner.host()
    }

    /// A handle that ends [`listen`](Self::listen) from another thread.
    pub fn close_handle(&self) -> CloseHandle {
        self.inner.close_handle()
    }

    /// Block, feeding summaries to `keep_listening` until it returns
    /// `false`. See [`SyncSession::listen`].
    pub fn listen<F>(&mut self, keep_listening: F) -> Result<()>
    where
        F: FnMut(SyncSummary) -> bool,
    {
        let inner = &mut self.inner;
        self.rt.block_on(inner.listen(keep_listening))
    }

    /// Like [`listen`](Self::listen), but gives up after `limit` and
    /// returns [`Error::Timeout`]. The subscription stays open.
    pub fn listen_for<F>(&mut self, limit: Duration, keep_listening: F) -> Result<()>
    where
        F: FnMut(SyncSummary) -> bool,
    {
        let inner = &mut self.inner;
        self.rt.block_on(async {
            tokio::time::timeout(limit, inner.listen(keep_listening))
                .await
                .map_err(|_| Error::Timeout(limit))?
        })
    }

    /// Close from the owning thread.
    pub fn close(&mut self) {
        let inner = &mut self.inner;
        self.rt.block_on(inner.close());
    }
}
