//! Mock implementations for testing.
//!
//! Provides deterministic, reproducible identity keys for automated tests.

use crate::error::{Error, Result};
use crate::traits::{IdentityKey, IdentityKeyProvider};
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use p256::PublicKey;
use ptls_crypto::point::{self, ENCODED_POINT_LEN};
use std::sync::{Arc, RwLock};
use zeroize::Zeroizing;

/// Scalar behind [`MockIdentityKey::new_deterministic`].
pub const DETERMINISTIC_SCALAR: [u8; 32] = [0x42; 32];

/// In-memory ECDSA P-256 identity key.
///
/// The signing key is zeroed when the last handle is dropped.
#[derive(Clone)]
pub struct MockIdentityKey {
    signing_key: SigningKey,
}

impl MockIdentityKey {
    /// Key with a fixed scalar, identical across instances.
    pub fn new_deterministic() -> Self {
        // The fixed scalar is in range, so the random fallback never runs.
        let scalar = Zeroizing::new(DETERMINISTIC_SCALAR);
        Self::from_scalar(&*scalar).unwrap_or_else(|_| Self::new_random())
    }

    /// Key with a fresh random scalar.
    pub fn new_random() -> Self {
        Self {
            signing_key: SigningKey::random(&mut rand::rngs::OsRng),
        }
    }

    /// Key from an explicit 32-byte scalar.
    ///
    /// # Errors
    ///
    /// Returns `Error::Keystore` if the scalar is zero or out of range.
    pub fn from_scalar(scalar: &[u8]) -> Result<Self> {
        let signing_key = SigningKey::from_slice(scalar)
            .map_err(|_| Error::Keystore("invalid P-256 scalar".into()))?;
        Ok(Self { signing_key })
    }

    /// Copy of the private scalar, for persisting a test fixture.
    pub fn scalar(&self) -> Zeroizing<[u8; 32]> {
        let mut scalar = Zeroizing::new([0u8; 32]);
        scalar.copy_from_slice(&self.signing_key.to_bytes());
        scalar
    }
}

impl IdentityKey for MockIdentityKey {
    fn public_key(&self) -> [u8; ENCODED_POINT_LEN] {
        point::encode_public_key(&PublicKey::from(self.signing_key.verifying_key()))
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let signature: Signature = self
            .signing_key
            .try_sign(message)
            .map_err(|e| Error::Signing(e.to_string()))?;
        Ok(signature.to_der().as_bytes().to_vec())
    }
}

/// Mock identity provider for testing.
///
/// # Example
///
/// ```
/// use ptls_platform::mock::MockKeyProvider;
/// use ptls_platform::traits::IdentityKeyProvider;
///
/// let provider = MockKeyProvider::new_deterministic();
/// let a = provider.get_identity().unwrap().unwrap();
/// let b = provider.get_identity().unwrap().unwrap();
/// assert_eq!(a.public_key(), b.public_key());
/// ```
#[derive(Clone, Default)]
pub struct MockKeyProvider {
    identity: Arc<RwLock<Option<Arc<MockIdentityKey>>>>,
}

impl MockKeyProvider {
    /// Provider with no identity provisioned.
    pub fn new_empty() -> Self {
        Self::default()
    }

    /// Provider holding the deterministic identity key.
    pub fn new_deterministic() -> Self {
        Self::with_identity(MockIdentityKey::new_deterministic())
    }

    /// Provider holding a random identity key.
    pub fn new_random() -> Self {
        Self::with_identity(MockIdentityKey::new_random())
    }

    /// Provider holding `key`.
    pub fn with_identity(key: MockIdentityKey) -> Self {
        Self {
            identity: Arc::new(RwLock::new(Some(Arc::new(key)))),
        }
    }
}

impl IdentityKeyProvider for MockKeyProvider {
    fn get_identity(&self) -> Result<Option<Arc<dyn IdentityKey>>> {
        let guard = self
            .identity
            .read()
            .map_err(|_| Error::Keystore("identity store poisoned".into()))?;
        Ok(guard
            .as_ref()
            .map(|key| Arc::clone(key) as Arc<dyn IdentityKey>))
    }

    fn generate_identity(&self) -> Result<Arc<dyn IdentityKey>> {
        let key = Arc::new(MockIdentityKey::new_random());
        let mut guard = self
            .identity
            .write()
            .map_err(|_| Error::Keystore("identity store poisoned".into()))?;
        *guard = Some(Arc::clone(&key));
        tracing::debug!("generated mock identity key");
        Ok(key)
    }
}
