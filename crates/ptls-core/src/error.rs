//! Error types for protocol operations.

use thiserror::Error;

/// Result type alias for protocol operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Protocol operation errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid frame format.
    #[error("Invalid frame format: {0}")]
    InvalidFrame(String),

    /// Insufficient data.
    #[error("Insufficient data: need {0} bytes")]
    InsufficientData(usize),

    /// Operation not legal in the current session phase.
    #[error("Invalid state: {operation} not allowed in {phase}")]
    InvalidState {
        /// Operation that was attempted.
        operation: &'static str,
        /// Phase the session was in.
        phase: &'static str,
    },

    /// Protocol violation.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// The lock echoed a transcript hash that differs from ours.
    #[error("Transcript hash mismatch")]
    HashMismatch,

    /// The lock's signature did not verify against the certificate key.
    #[error("Peer authentication failed: {0}")]
    AuthenticationFailed(String),

    /// ClientVerify was requested before the lock's signature was verified.
    #[error("Peer signature has not been verified")]
    PeerNotVerified,

    /// Application data requires an established session.
    #[error("Session not established")]
    NotEstablished,

    /// Cryptographic error.
    #[error("Crypto error: {0}")]
    Crypto(#[from] ptls_crypto::Error),

    /// Identity key error.
    #[error("Platform error: {0}")]
    Platform(#[from] ptls_platform::Error),
}

impl Error {
    /// Whether this error means the peer failed a cryptographic check.
    ///
    /// Security failures end the connection instead of triggering a silent
    /// re-handshake.
    pub fn is_security_failure(&self) -> bool {
        matches!(
            self,
            Self::HashMismatch
                | Self::AuthenticationFailed(_)
                | Self::PeerNotVerified
                | Self::Crypto(ptls_crypto::Error::Decryption(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_classification() {
        assert!(Error::HashMismatch.is_security_failure());
        assert!(Error::AuthenticationFailed("bad".into()).is_security_failure());
        assert!(Error::PeerNotVerified.is_security_failure());
        assert!(Error::Crypto(ptls_crypto::Error::Decryption("tag".into())).is_security_failure());

        assert!(!Error::InvalidFrame("short".into()).is_security_failure());
        assert!(!Error::NotEstablished.is_security_failure());
        assert!(
            !Error::Crypto(ptls_crypto::Error::NonceExhausted { limit: 1 }).is_security_failure()
        );
        assert!(!Error::Crypto(ptls_crypto::Error::InvalidPublicKey("x".into()))
            .is_security_failure());
    }
}
