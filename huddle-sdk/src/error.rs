//! The error type consumers see.
//!
//! Transport trouble never shows up here: handshake failures and dropped
//! connections are retried internally and surface only through
//! [`ConnectionState`](crate::ConnectionState). Malformed inbound frames are
//! dropped and logged. The only terminal, caller-visible failure at session
//! creation is a bad credential.

use thiserror::Error;

use crate::identity::CredentialError;

#[derive(Debug, Error)]
pub enum ChatError {
    /// The bearer credential could not be resolved to a tenant identity.
    /// No connection is attempted when this is returned.
    #[error("invalid credential: {0}")]
    InvalidCredential(#[from] CredentialError),

    /// `send` was called with empty content. Join/Leave are the only
    /// events that carry no content.
    #[error("message content must not be empty")]
    EmptyMessage,

    /// The session has been closed; a new session must be opened.
    #[error("session is closed")]
    SessionClosed,
}
