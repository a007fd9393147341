//! Caller-visible session events.

use ptls_core::{AlertCode, SessionId};

/// Event delivered to the owner of a
/// [`SecureTransportWrapper`](crate::SecureTransportWrapper).
///
/// Events arrive in order on a single channel. Every handshake attempt ends
/// with exactly one of `Ready`, `Reconnecting` or `Closed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The secure session is established.
    Ready(SessionId),
    /// Application-channel payload, decrypted or cleartext.
    Indication(Vec<u8>),
    /// The current attempt failed and a new one has started.
    Reconnecting(RetryReason),
    /// No further attempts will be made.
    Closed(CloseReason),
}

/// Why a new handshake attempt was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    /// No ServerHello before the hello timeout.
    HelloTimeout,
    /// The lock sent a non-fatal alert.
    Alert(AlertCode),
    /// A handshake message could not be processed.
    HandshakeError,
    /// Writing to the raw transport failed.
    Transport,
    /// An application record failed and the session was cleared.
    RecordRejected,
}

/// Why the wrapper closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The caller closed the connection.
    Requested,
    /// The lock has no trusted time; obtain signed time and reconnect.
    NoTrustedTime,
    /// The lock does not know this client; registration is required.
    NotRegistered,
    /// The lock rejected the access certificate.
    InvalidCertificate,
    /// The lock failed a cryptographic check.
    AuthenticationFailed,
    /// The configured attempt cap was reached.
    AttemptsExhausted,
}

impl CloseReason {
    /// Close reason for a fatal alert, `None` if the alert is retryable.
    pub fn from_alert(code: AlertCode) -> Option<Self> {
        match code {
            AlertCode::NoTrustedTime => Some(Self::NoTrustedTime),
            AlertCode::NotRegistered => Some(Self::NotRegistered),
            AlertCode::InvalidCertificate => Some(Self::InvalidCertificate),
            AlertCode::Error | AlertCode::Timeout | AlertCode::Unknown(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_policy() {
        assert_eq!(
            CloseReason::from_alert(AlertCode::from_u8(2)),
            Some(CloseReason::NoTrustedTime)
        );
        assert_eq!(
            CloseReason::from_alert(AlertCode::from_u8(5)),
            Some(CloseReason::InvalidCertificate)
        );
        assert_eq!(
            CloseReason::from_alert(AlertCode::from_u8(6)),
            Some(CloseReason::NotRegistered)
        );
        for retryable in [1u8, 3, 4, 0x7F] {
            assert_eq!(CloseReason::from_alert(AlertCode::from_u8(retryable)), None);
        }
    }
}
