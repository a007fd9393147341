//! Transport layer errors.

use thiserror::Error;

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;

/// Transport errors.
#[derive(Debug, Error)]
pub enum Error {
    /// No secure session is established yet.
    #[error("Not connected: secure session not established")]
    NotConnected,

    /// The wrapper was closed, by the caller or by a fatal handshake outcome.
    #[error("Connection closed")]
    Closed,

    /// The identity provider has no key pair for this client.
    #[error("No identity key pair available")]
    MissingIdentity,

    /// Raw transport failure.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Protocol error from core.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ptls_core::Error),

    /// Identity provider error.
    #[error("Platform error: {0}")]
    Platform(#[from] ptls_platform::Error),
}
