//! Shared test utilities for fabula integration tests.
//!
//! Import via `mod common;` in integration test files:
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```

use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::net::{TcpListener, TcpStream};

use fabula::Connection;

// ============================================================================
// Logging
// ============================================================================

/// Route `tracing` output to the test harness. Honors `RUST_LOG`.
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Fake broker
// ============================================================================

/// Bind a listener on a random port, serve exactly one connection with
/// `script`, and return the address to dial.
#[allow(dead_code)]
pub async fn spawn_broker<F, Fut>(script: F) -> String
where
    F: FnOnce(Connection<TcpStream>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("should bind to random port");
    let addr = listener.local_addr().expect("should have local addr");

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("should accept");
        script(Connection::new(stream)).await;
    });

    addr.to_string()
}

/// A broker that answers the handshake with `response` and then hangs up.
#[allow(dead_code)]
pub async fn spawn_rejecting_broker(response: &'static str) -> String {
    spawn_broker(move |mut conn| async move {
        let _ = conn.read_line().await;
        let _ = conn.send_line(response).await;
    })
    .await
}

/// An address nothing listens on.
#[allow(dead_code)]
pub async fn unbound_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("should bind to random port");
    let addr = listener.local_addr().expect("should have local addr");
    drop(listener);
    addr.to_string()
}

// ============================================================================
// Transcript
// ============================================================================

/// Ordered log of what each side saw, shared between the broker script
/// and the client's handler.
#[derive(Clone, Default)]
#[allow(dead_code)]
pub struct Transcript {
    events: Arc<Mutex<Vec<String>>>,
}

#[allow(dead_code)]
impl Transcript {
    pub fn record(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}
