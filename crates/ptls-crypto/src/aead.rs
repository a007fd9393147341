//! Record protection: the direction-scoped `MessageCipher`.
//!
//! Each traffic secret yields one AES-128-GCM instance:
//! - key = `secret[0..16]`
//! - IV base = `secret[16..28]`
//! - nonce = IV base with bytes 10..12 XORed by a 16-bit big-endian counter
//!
//! The counter advances on every transform, including ones that fail
//! authentication, so both peers stay in lock-step. No associated data is
//! used; a 16-byte tag is appended to every ciphertext.

use crate::kdf::TRAFFIC_SECRET_LEN;
use crate::{Error, Result};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Nonce};
use zeroize::Zeroizing;

/// AES-128 key length in bytes.
pub const KEY_LEN: usize = 16;

/// GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// Authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Size of the nonce counter space (16-bit counter).
pub const COUNTER_SPACE: u32 = 0x1_0000;

/// Default number of messages a cipher may process before the session must
/// be re-established.
pub const DEFAULT_COUNTER_LIMIT: u32 = 0xF000;

/// Direction a [`MessageCipher`] transforms in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherMode {
    /// Plaintext in, ciphertext || tag out.
    Encrypt,
    /// Ciphertext || tag in, plaintext out.
    Decrypt,
}

impl CipherMode {
    fn name(self) -> &'static str {
        match self {
            Self::Encrypt => "encrypt",
            Self::Decrypt => "decrypt",
        }
    }
}

/// AEAD engine for one traffic secret and one direction.
pub struct MessageCipher {
    cipher: Aes128Gcm,
    iv: Zeroizing<[u8; NONCE_LEN]>,
    mode: CipherMode,
    counter: u32,
    limit: u32,
}

impl MessageCipher {
    /// Build a cipher from a derived traffic secret.
    ///
    /// # Errors
    ///
    /// Returns `Error::KeyDerivation` if the AES key cannot be initialised.
    pub fn new(secret: &[u8; TRAFFIC_SECRET_LEN], mode: CipherMode) -> Result<Self> {
        let cipher = Aes128Gcm::new_from_slice(&secret[..KEY_LEN])
            .map_err(|_| Error::KeyDerivation("AES-128 key rejected".into()))?;

        let mut iv = Zeroizing::new([0u8; NONCE_LEN]);
        iv.copy_from_slice(&secret[KEY_LEN..KEY_LEN + NONCE_LEN]);

        Ok(Self {
            cipher,
            iv,
            mode,
            counter: 0,
            limit: DEFAULT_COUNTER_LIMIT,
        })
    }

    /// Override the message limit. Values above the counter space are clamped.
    pub fn with_counter_limit(mut self, limit: u32) -> Self {
        self.limit = limit.min(COUNTER_SPACE);
        self
    }

    /// Direction this cipher was built for.
    pub fn mode(&self) -> CipherMode {
        self.mode
    }

    /// Number of transforms performed so far.
    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Number of transforms left before the cipher refuses to continue.
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.counter)
    }

    fn next_nonce(&mut self) -> Result<[u8; NONCE_LEN]> {
        if self.counter >= self.limit {
            return Err(Error::NonceExhausted { limit: self.limit });
        }

        let mut nonce = *self.iv;
        let counter = (self.counter as u16).to_be_bytes();
        nonce[NONCE_LEN - 2] ^= counter[0];
        nonce[NONCE_LEN - 1] ^= counter[1];

        self.counter += 1;
        Ok(nonce)
    }

    fn check_mode(&self, wanted: CipherMode) -> Result<()> {
        if self.mode == wanted {
            Ok(())
        } else {
            Err(Error::WrongMode {
                expected: self.mode.name(),
                actual: wanted.name(),
            })
        }
    }

    /// Encrypt `plaintext`, returning ciphertext with the tag appended.
    pub fn seal(&mut self, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.check_mode(CipherMode::Encrypt)?;
        let nonce = self.next_nonce()?;

        self.cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| Error::Encryption("AES-128-GCM encryption failed".into()))
    }

    /// Verify and decrypt `ciphertext || tag`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Decryption` on tag mismatch or a record shorter than
    /// the tag; no partial plaintext is produced.
    pub fn open(&mut self, ciphertext_and_tag: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        self.check_mode(CipherMode::Decrypt)?;
        let nonce = self.next_nonce()?;

        if ciphertext_and_tag.len() < TAG_LEN {
            return Err(Error::Decryption(format!(
                "record of {} bytes is shorter than the tag",
                ciphertext_and_tag.len()
            )));
        }

        self.cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext_and_tag)
            .map(Zeroizing::new)
            .map_err(|_| Error::Decryption("AES-128-GCM authentication failed".into()))
    }

    /// Transform `input` in this cipher's direction.
    pub fn transform(&mut self, input: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        match self.mode {
            CipherMode::Encrypt => self.seal(input).map(Zeroizing::new),
            CipherMode::Decrypt => self.open(input),
        }
    }
}

impl core::fmt::Debug for MessageCipher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MessageCipher")
            .field("mode", &self.mode)
            .field("counter", &self.counter)
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::derive_traffic_secret;
    use crate::TrafficLabel;

    fn pair() -> (MessageCipher, MessageCipher) {
        let secret =
            derive_traffic_secret(&[0x11; 32], TrafficLabel::ClientHandshake, &[0x22; 32])
                .unwrap();
        (
            MessageCipher::new(&secret, CipherMode::Encrypt).unwrap(),
            MessageCipher::new(&secret, CipherMode::Decrypt).unwrap(),
        )
    }

    #[test]
    fn test_known_ciphertexts() {
        let (mut enc, _) = pair();

        assert_eq!(
            hex::encode(enc.seal(b"AA").unwrap()),
            "36abca0f91c733d608ffef1825d57e920a4a"
        );
        assert_eq!(
            hex::encode(enc.seal(b"AA").unwrap()),
            "43d14f92ac803ded9bf0b6a28d45a9be5254"
        );
        assert_eq!(enc.counter(), 2);
    }

    #[test]
    fn test_known_empty_and_text() {
        let (mut enc, _) = pair();
        assert_eq!(
            hex::encode(enc.seal(b"").unwrap()),
            "4969f4f9135a974cbd8594fb49fefce6"
        );

        let (mut enc, _) = pair();
        assert_eq!(
            hex::encode(enc.seal(b"hello lock").unwrap()),
            "1f8f31c84711b534e0f10390a62902c052c2ed03bda95e96fbdf"
        );
    }

    #[test]
    fn test_decrypt_inverts_encrypt_for_lengths() {
        let (mut enc, mut dec) = pair();
        for len in 0..64usize {
            let plaintext: Vec<u8> = (0..len as u8).collect();
            let sealed = enc.seal(&plaintext).unwrap();
            assert_eq!(sealed.len(), len + TAG_LEN);
            assert_eq!(*dec.open(&sealed).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_every_tag_bit_flip_rejected() {
        let (mut enc, _) = pair();
        let sealed = enc.seal(b"unlock").unwrap();
        let tag_start = sealed.len() - TAG_LEN;

        for byte in tag_start..sealed.len() {
            for bit in 0..8 {
                let (_, mut dec) = pair();
                let mut tampered = sealed.clone();
                tampered[byte] ^= 1 << bit;
                assert!(matches!(dec.open(&tampered), Err(Error::Decryption(_))));
            }
        }
    }

    #[test]
    fn test_counter_advances_on_failure() {
        let (mut enc, mut dec) = pair();
        let first = enc.seal(b"one").unwrap();
        let second = enc.seal(b"two").unwrap();

        let mut broken = first.clone();
        broken[0] ^= 0xff;
        assert!(dec.open(&broken).is_err());
        assert_eq!(dec.counter(), 1);

        // Lock-step with the sender is preserved.
        assert_eq!(&**dec.open(&second).unwrap(), b"two");
    }

    #[test]
    fn test_short_record_rejected() {
        let (_, mut dec) = pair();
        assert!(matches!(dec.open(&[0u8; 15]), Err(Error::Decryption(_))));
    }

    #[test]
    fn test_counter_limit_enforced() {
        let (enc, _) = pair();
        let mut enc = enc.with_counter_limit(2);

        enc.seal(b"a").unwrap();
        enc.seal(b"b").unwrap();
        assert_eq!(enc.remaining(), 0);
        assert!(matches!(
            enc.seal(b"c"),
            Err(Error::NonceExhausted { limit: 2 })
        ));
    }

    #[test]
    fn test_limit_clamped_to_counter_space() {
        let (enc, _) = pair();
        let enc = enc.with_counter_limit(u32::MAX);
        assert_eq!(enc.remaining(), COUNTER_SPACE);
    }

    #[test]
    fn test_wrong_mode_rejected() {
        let (mut enc, mut dec) = pair();
        assert!(matches!(enc.open(&[0u8; 32]), Err(Error::WrongMode { .. })));
        assert!(matches!(dec.seal(b"x"), Err(Error::WrongMode { .. })));
        assert_eq!(enc.counter(), 0);
    }

    #[test]
    fn test_transform_dispatches_on_mode() {
        let (mut enc, mut dec) = pair();
        let sealed = enc.transform(b"AA").unwrap();
        assert_eq!(sealed.len(), 18);
        assert_eq!(&**dec.transform(&sealed).unwrap(), b"AA");
    }
}
