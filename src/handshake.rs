//! Session establishment: the handshake exchange and host failover.
//!
//! A session is usable only after the broker answers its command line
//! with `ok`. Hosts are tried strictly in order; the first one that both
//! dials and accepts the handshake wins. Nothing is retried afterwards,
//! and no state is kept between calls.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::codec::ACK;
use crate::config::ClientConfig;
use crate::connection::{Connection, Dialer};
use crate::error::{Error, Result};

/// A connection that passed the handshake.
#[derive(Debug)]
pub struct Established<S> {
    /// The host that accepted the session.
    pub host: String,
    /// The live line transport.
    pub conn: Connection<S>,
}

/// Send `command` and wait for the single-line acknowledgment.
pub async fn handshake<S>(conn: &mut Connection<S>, host: &str, command: &str) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let rejected = |response: Option<String>| Error::HandshakeRejected {
        host: host.to_string(),
        response,
    };

    conn.send_line(command).await.map_err(|_| rejected(None))?;
    let response = match conn.read_line().await {
        Ok(line) => line,
        Err(e @ Error::Protocol(_)) => return Err(e),
        Err(_) => return Err(rejected(None)),
    };

    if response != ACK {
        return Err(rejected(Some(response)));
    }
    Ok(())
}

/// Dial the configured hosts in order and handshake with the first one
/// that answers. On exhaustion the last dial or handshake error is
/// returned.
pub async fn connect<D>(
    dialer: &D,
    config: &ClientConfig,
    command: &str,
) -> Result<Established<D::Stream>>
where
    D: Dialer,
{
    config.validate()?;

    let mut last_error = None;
    for (attempt, host) in config.hosts.iter().enumerate() {
        debug!(host = %host, attempt = attempt + 1, "dialing");

        let stream = match dialer.dial(host).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(host = %host, error = %e, "dial failed");
                last_error = Some(e);
                continue;
            }
        };

        let mut conn = Connection::with_max_line_length(stream, config.max_line_length);
        match handshake(&mut conn, host, command).await {
            Ok(()) => {
                info!(host = %host, "session established");
                return Ok(Established {
                    host: host.clone(),
                    conn,
                });
            }
            Err(e) => {
                warn!(host = %host, error = %e, "handshake failed");
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| Error::Config("host list cannot be empty".to_string())))
}
