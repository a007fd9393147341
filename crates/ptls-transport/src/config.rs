//! Transport configuration.

use ptls_core::{SessionConfig, SessionId};
use std::time::Duration;

/// Default time to wait for the ServerHello.
pub const DEFAULT_HELLO_TIMEOUT_MS: u64 = 5000;

/// Configuration for a [`SecureTransportWrapper`](crate::SecureTransportWrapper).
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Milliseconds to wait for the ServerHello before retrying.
    pub hello_timeout_ms: u64,
    /// Consecutive failed attempts allowed before the wrapper closes.
    /// Reset whenever a session becomes ready. `None` keeps re-handshaking
    /// until the caller closes.
    pub max_handshake_attempts: Option<u32>,
    /// Session settings.
    pub session: SessionConfig,
    /// Session id persisted from an earlier connection, if any.
    pub resumption_session_id: Option<SessionId>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            hello_timeout_ms: DEFAULT_HELLO_TIMEOUT_MS,
            max_handshake_attempts: None,
            session: SessionConfig::default(),
            resumption_session_id: None,
        }
    }
}

impl TransportConfig {
    /// Hello timeout as a [`Duration`].
    pub fn hello_timeout(&self) -> Duration {
        Duration::from_millis(self.hello_timeout_ms)
    }
}

/// Logical channels of the lock's GATT service.
///
/// Mapping a role to a characteristic UUID is deployment configuration owned
/// by the [`RawTransport`](crate::RawTransport) implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelRole {
    /// Handshake frames towards the lock.
    HandshakeSend,
    /// Handshake frames from the lock.
    HandshakeReceive,
    /// Application frames towards the lock.
    ApplicationSend,
    /// Application frames from the lock.
    ApplicationReceive,
    /// Unsolicited lock notifications, framed like application frames.
    AsyncNotify,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TransportConfig::default();
        assert_eq!(config.hello_timeout(), Duration::from_secs(5));
        assert_eq!(config.max_handshake_attempts, None);
        assert_eq!(config.session.hello_header, [2, 0, 0]);
        assert!(config.resumption_session_id.is_none());
    }
}
