//! Traffic-secret derivation.
//!
//! Every traffic secret is bound to a direction/phase label and to the
//! transcript hash at the moment of derivation:
//!
//! ```text
//! secret = HMAC-SHA256(key = shared_secret, label || transcript_hash)
//! ```
//!
//! Four labels exist across one handshake; a secret is never derived twice
//! under the same label for the same transcript.

use crate::{Error, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

/// Length of a derived traffic secret in bytes.
pub const TRAFFIC_SECRET_LEN: usize = 32;

/// Direction and phase a traffic secret protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrafficLabel {
    /// Client to lock, handshake phase (ClientVerify).
    ClientHandshake,
    /// Lock to client, handshake phase (ServerVerify).
    ServerHandshake,
    /// Client to lock, application records.
    ClientApplication,
    /// Lock to client, application records.
    ServerApplication,
}

impl TrafficLabel {
    /// Label bytes mixed into the HMAC input.
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            Self::ClientHandshake => b"ptlsc hs traffic",
            Self::ServerHandshake => b"ptlss hs traffic",
            Self::ClientApplication => b"ptlsc ap traffic",
            Self::ServerApplication => b"ptlss ap traffic",
        }
    }

    /// Whether this label protects client-originated records.
    pub fn is_client(self) -> bool {
        matches!(self, Self::ClientHandshake | Self::ClientApplication)
    }
}

/// Derive the traffic secret for `label` bound to `transcript_hash`.
///
/// # Errors
///
/// Returns `Error::KeyDerivation` if `secret` is empty.
///
/// # Example
///
/// ```
/// use ptls_crypto::kdf::derive_traffic_secret;
/// use ptls_crypto::TrafficLabel;
///
/// let shared = [0x11u8; 32];
/// let hash = [0x22u8; 32];
/// let client = derive_traffic_secret(&shared, TrafficLabel::ClientHandshake, &hash).unwrap();
/// let server = derive_traffic_secret(&shared, TrafficLabel::ServerHandshake, &hash).unwrap();
/// assert_ne!(*client, *server);
/// ```
pub fn derive_traffic_secret(
    secret: &[u8],
    label: TrafficLabel,
    transcript_hash: &[u8],
) -> Result<Zeroizing<[u8; TRAFFIC_SECRET_LEN]>> {
    if secret.is_empty() {
        return Err(Error::KeyDerivation("empty input secret".into()));
    }

    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret)
        .map_err(|_| Error::KeyDerivation("HMAC key rejected".into()))?;
    mac.update(label.as_bytes());
    mac.update(transcript_hash);

    let mut out = Zeroizing::new([0u8; TRAFFIC_SECRET_LEN]);
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHARED: [u8; 32] = [0x11; 32];
    const HASH: [u8; 32] = [0x22; 32];

    #[test]
    fn test_known_vectors() {
        let cases = [
            (
                TrafficLabel::ClientHandshake,
                "9891e896815c52fd889d09b9920ca97899eaf9d1c4c061a3df07e7ab647e171a",
            ),
            (
                TrafficLabel::ServerHandshake,
                "e1c47147848e1bff595ac0f13c770c800afa010c272448db7ce46e3e928e6032",
            ),
            (
                TrafficLabel::ClientApplication,
                "e470df3032cc80bac761db9ee6798e6ff75ed18b226de2bfadd6ac50af6313d6",
            ),
            (
                TrafficLabel::ServerApplication,
                "8d3cf49820fad48ad10ec2cef75c7b9fdff5290fef6ae5d526859e9898f34b6f",
            ),
        ];

        for (label, expected) in cases {
            let secret = derive_traffic_secret(&SHARED, label, &HASH).unwrap();
            assert_eq!(hex::encode(*secret), expected, "label {label:?}");
        }
    }

    #[test]
    fn test_transcript_binding() {
        let a = derive_traffic_secret(&SHARED, TrafficLabel::ClientApplication, &HASH).unwrap();
        let b =
            derive_traffic_secret(&SHARED, TrafficLabel::ClientApplication, &[0x23; 32]).unwrap();
        assert_ne!(*a, *b);
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(derive_traffic_secret(&[], TrafficLabel::ClientHandshake, &HASH).is_err());
    }

    #[test]
    fn test_label_direction() {
        assert!(TrafficLabel::ClientHandshake.is_client());
        assert!(TrafficLabel::ClientApplication.is_client());
        assert!(!TrafficLabel::ServerHandshake.is_client());
        assert!(!TrafficLabel::ServerApplication.is_client());
    }
}
