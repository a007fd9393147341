//! Device certificate handed in by the caller.

use crate::Result;
use ptls_crypto::point::{self, ENCODED_POINT_LEN};

/// Access certificate for one lock, issued by the lock owner's backend.
///
/// `certificate` is sent to the lock as ClientVerify auth data;
/// `device_public_key` is the lock's long-term key used to check the
/// ServerVerify signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCertificate {
    pub(crate) certificate: Vec<u8>,
    pub(crate) device_public_key: [u8; ENCODED_POINT_LEN],
}

impl DeviceCertificate {
    /// Build a certificate, validating the lock key is a P-256 point.
    pub fn new(certificate: Vec<u8>, device_public_key: &[u8]) -> Result<Self> {
        let key = point::decode_public_key(device_public_key)?;
        Ok(Self {
            certificate,
            device_public_key: point::encode_public_key(&key),
        })
    }

    /// Certificate bytes.
    pub fn certificate(&self) -> &[u8] {
        &self.certificate
    }

    /// Lock's long-term public key in wire form.
    pub fn device_public_key(&self) -> &[u8; ENCODED_POINT_LEN] {
        &self.device_public_key
    }
}
