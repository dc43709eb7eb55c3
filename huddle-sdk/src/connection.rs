//! Broker connection lifecycle: connect, handshake, backoff, resubscribe.
//!
//! The state machine is
//! `Disconnected → Connecting → Connected → Reconnecting → Connecting → …`
//! with `Closed` as the only terminal state. Retries are unbounded while
//! the owning session is alive; backoff is capped exponential with jitter
//! so a broker restart doesn't get a thundering herd of synchronized
//! reconnects.
//!
//! Supports plaintext TCP and TLS endpoints.

use std::sync::Arc;
use std::time::Duration;
use std::{fmt, io};

use anyhow::{Result, anyhow, bail};
use rand::Rng;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls;

use crate::identity::Identity;
use crate::topic::Topic;
use crate::wire::{ClientFrame, ServerFrame};

/// Where the session's connection currently stands. Published through a
/// watch channel so presentation can gate its affordances (e.g. grey out
/// the send box while reconnecting).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Backoff policy between reconnect attempts.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Ceiling for the delay.
    pub max_delay: Duration,
    /// Multiplier applied after each failed attempt.
    pub backoff_factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
        }
    }
}

impl ReconnectConfig {
    /// Next delay after `current`: scaled, jittered (up to 25% of the
    /// current delay), capped.
    pub(crate) fn next_delay(&self, current: Duration) -> Duration {
        let current_ms = current.as_millis() as u64;
        let jitter_max = current_ms / 4;
        let jitter = if jitter_max == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_max)
        };
        let scaled = (current_ms as f64 * self.backoff_factor) as u64 + jitter;
        Duration::from_millis(scaled.min(self.max_delay.as_millis() as u64))
    }
}

/// How to reach the broker.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Broker endpoint (host:port).
    pub endpoint: String,
    /// Connect over TLS.
    pub tls: bool,
    /// How long one connect + handshake attempt may take.
    pub handshake_timeout: Duration,
    pub reconnect: ReconnectConfig,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            endpoint: "127.0.0.1:9430".to_string(),
            tls: false,
            handshake_timeout: Duration::from_secs(5),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Reads broker frames off the link. Keeps a persistent line buffer so a
/// read cancelled by `select!` mid-line resumes without losing bytes.
pub(crate) struct FrameReader {
    inner: Box<dyn AsyncBufRead + Send + Unpin>,
    line_buf: String,
}

impl FrameReader {
    /// Next parseable frame, or `None` on EOF. Unparseable lines are
    /// logged and skipped; one bad line must not kill the session.
    pub(crate) async fn read_frame(&mut self) -> io::Result<Option<ServerFrame>> {
        loop {
            let n = self.inner.read_line(&mut self.line_buf).await?;
            if n == 0 {
                return Ok(None);
            }
            if self.line_buf.trim_end().is_empty() {
                self.line_buf.clear();
                continue;
            }
            let parsed = ServerFrame::parse(self.line_buf.trim_end());
            self.line_buf.clear();
            match parsed {
                Ok(frame) => return Ok(Some(frame)),
                Err(err) => {
                    tracing::warn!(error = %err, "ignoring unparseable broker line");
                }
            }
        }
    }
}

/// Writes client frames to the link.
pub(crate) struct FrameWriter {
    inner: Box<dyn AsyncWrite + Send + Unpin>,
}

impl FrameWriter {
    pub(crate) async fn write_frame(&mut self, frame: &ClientFrame) -> io::Result<()> {
        self.inner.write_all(frame.format().as_bytes()).await?;
        self.inner.flush().await
    }
}

/// An established, handshaken, subscribed link. Split halves so the
/// session task can await reads and issue writes from different `select!`
/// arms. Dropping both halves releases the transport.
pub(crate) struct Link {
    pub(crate) reader: FrameReader,
    pub(crate) writer: FrameWriter,
    /// Which connect attempt produced this link; for log correlation.
    pub(crate) generation: u64,
}

/// Owns the lifecycle state machine for one session's connection.
pub(crate) struct ConnectionManager {
    config: BrokerConfig,
    topic: Topic,
    identity: Identity,
    state_tx: watch::Sender<ConnectionState>,
    generation: u64,
    /// Backoff before the next dial. `None` means dial immediately; set on
    /// every failure or drop, cleared only once a link reaches Connected.
    retry_delay: Option<Duration>,
}

impl ConnectionManager {
    pub(crate) fn new(
        config: BrokerConfig,
        topic: Topic,
        identity: Identity,
    ) -> (Self, watch::Receiver<ConnectionState>) {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        (
            Self {
                config,
                topic,
                identity,
                state_tx,
                generation: 0,
                retry_delay: None,
            },
            state_rx,
        )
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }

    /// Transport dropped out from under us; announce before re-opening.
    /// The next `open` waits out the backoff before its first dial.
    pub(crate) fn mark_reconnecting(&mut self) {
        self.schedule_retry();
    }

    fn schedule_retry(&mut self) {
        self.set_state(ConnectionState::Reconnecting);
        if self.retry_delay.is_none() {
            self.retry_delay = Some(self.config.reconnect.initial_delay);
        }
    }

    /// Terminal. A new session must be created to connect again.
    pub(crate) fn close(&self) {
        self.set_state(ConnectionState::Closed);
    }

    /// Drive to Connected, retrying forever with backoff.
    ///
    /// The backoff delay persists across calls: entering from Reconnecting
    /// waits out the current delay before the first dial, and the delay
    /// resets only when an attempt actually reaches Connected. Without
    /// that, a broker that accepts and immediately drops would be dialed
    /// in a tight loop.
    ///
    /// Every successful attempt re-issues the topic subscription — a
    /// subscription does not survive a disconnect, and a stale one would
    /// silently drop inbound events after a reconnect.
    ///
    /// Cancel-safe: dropping the returned future (session teardown) aborts
    /// whichever of the handshake or the backoff sleep is in flight.
    pub(crate) async fn open(&mut self) -> Link {
        loop {
            if let Some(delay) = self.retry_delay {
                tracing::debug!(
                    delay_ms = delay.as_millis() as u64,
                    "backing off before retry"
                );
                tokio::time::sleep(delay).await;
                self.retry_delay = Some(self.config.reconnect.next_delay(delay));
            }
            self.set_state(ConnectionState::Connecting);
            self.generation += 1;
            let generation = self.generation;
            match timeout(self.config.handshake_timeout, self.establish(generation)).await {
                Ok(Ok(mut link)) => {
                    let subscribe = ClientFrame::Subscribe {
                        topic: self.topic.as_str().to_string(),
                    };
                    match link.writer.write_frame(&subscribe).await {
                        Ok(()) => {
                            self.retry_delay = None;
                            self.set_state(ConnectionState::Connected);
                            tracing::info!(
                                generation,
                                endpoint = %self.config.endpoint,
                                topic = %self.topic,
                                "connected and subscribed"
                            );
                            return link;
                        }
                        Err(err) => {
                            tracing::warn!(generation, error = %err, "subscribe failed");
                        }
                    }
                }
                Ok(Err(err)) => {
                    tracing::warn!(generation, error = %err, "handshake failed");
                }
                Err(_) => {
                    tracing::warn!(
                        generation,
                        timeout_ms = self.config.handshake_timeout.as_millis() as u64,
                        "handshake timed out"
                    );
                }
            }
            self.schedule_retry();
        }
    }

    /// One connect + CONNECT/CONNECTED handshake attempt.
    async fn establish(&self, generation: u64) -> Result<Link> {
        let tcp = TcpStream::connect(&self.config.endpoint)
            .await
            .map_err(|e| anyhow!("TCP connect to {} failed: {e}", self.config.endpoint))?;
        tracing::debug!(generation, endpoint = %self.config.endpoint, "TCP connected");

        let mut link = if self.config.tls {
            let connector = TlsConnector::from(Arc::new(tls_client_config()));
            let host = self
                .config
                .endpoint
                .split(':')
                .next()
                .unwrap_or("localhost");
            let dns_name = rustls::pki_types::ServerName::try_from(host.to_string())?;
            let tls = connector
                .connect(dns_name, tcp)
                .await
                .map_err(|e| anyhow!("TLS handshake with {} failed: {e}", self.config.endpoint))?;
            let (reader, writer) = tokio::io::split(tls);
            Link {
                reader: FrameReader {
                    inner: Box::new(BufReader::new(reader)),
                    line_buf: String::new(),
                },
                writer: FrameWriter {
                    inner: Box::new(writer),
                },
                generation,
            }
        } else {
            let (reader, writer) = tcp.into_split();
            Link {
                reader: FrameReader {
                    inner: Box::new(BufReader::new(reader)),
                    line_buf: String::new(),
                },
                writer: FrameWriter {
                    inner: Box::new(writer),
                },
                generation,
            }
        };

        link.writer
            .write_frame(&ClientFrame::Connect {
                tenant_id: self.identity.tenant_id.clone(),
                member_id: self.identity.member_id,
            })
            .await?;
        match link.reader.read_frame().await? {
            Some(ServerFrame::Connected) => Ok(link),
            Some(other) => bail!("unexpected handshake reply: {other:?}"),
            None => bail!("connection closed during handshake"),
        }
    }
}

fn install_crypto_provider() {
    #[cfg(feature = "ring")]
    {
        let _ = rustls::crypto::ring::default_provider().install_default();
    }
    #[cfg(all(feature = "aws-lc-rs", not(feature = "ring")))]
    {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    }
}

fn tls_client_config() -> rustls::ClientConfig {
    install_crypto_provider();
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth()
}
