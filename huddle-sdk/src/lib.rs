//! huddle-sdk — client SDK for the huddle tenant chat broker.
//!
//! A session resolves a tenant identity from a bearer credential, keeps a
//! reconnecting connection to the broker, subscribes to the tenant's topic,
//! and delivers presence and chat events in `(sent_at, arrival_seq)` order.
//!
//! The pieces, bottom up:
//!
//! - [`identity`] — pulls `{displayName, tenantId, memberId}` out of the
//!   bearer token; fails closed before any socket is touched.
//! - [`event`] — the [`ChatEvent`] taxonomy and its JSON codec.
//! - [`wire`] — the line-delimited broker protocol.
//! - [`queue`] — FIFO buffer for publishes issued while offline.
//! - [`connection`] — connect/handshake/backoff state machine.
//! - [`topic`] — tenant → topic mapping and inbound demux.
//! - [`log`] — the append-only ordered event log.
//! - [`session`] — ties it all together; one task per chat view.
//!
//! ## Example
//!
//! ```rust,no_run
//! use huddle_sdk::{BrokerConfig, Session};
//!
//! # async fn demo(token: &str) -> Result<(), huddle_sdk::ChatError> {
//! let config = BrokerConfig {
//!     endpoint: "chat.example.com:9430".to_string(),
//!     tls: true,
//!     ..Default::default()
//! };
//! let (session, mut events) = Session::open(config, token)?;
//! let _ = session.send("hello").await?;
//! while let Some(entry) = events.recv().await {
//!     println!("{:?}", entry.event);
//! }
//! session.close().await;
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod event;
pub mod identity;
pub mod log;
pub mod queue;
pub mod session;
pub mod topic;
pub mod wire;

pub use connection::{BrokerConfig, ConnectionState, ReconnectConfig};
pub use error::ChatError;
pub use event::{ChatEvent, CodecError};
pub use identity::{CredentialError, Identity, resolve};
pub use log::{EventLog, LogEntry};
pub use queue::OutboundQueue;
pub use session::{Delivery, Session};
pub use topic::{Topic, TopicRouter};
