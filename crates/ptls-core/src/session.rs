//! Client side of the lock handshake and application record protection.
//!
//! Implements:
//! - Handshake message construction and parsing (ClientHello, ServerHello,
//!   ServerVerify, ClientVerify, SessionInitialized)
//! - Transcript-bound key schedule (handshake and application ciphers)
//! - Mutual signature build / verify
//! - Session resumption (cached session id and resumption proof)
//!
//! Each protocol phase is a variant of [`SessionState`] carrying only the key
//! material valid in that phase. Leaving a phase drops its variant, which
//! zeroes the ephemeral private key, the shared secret and the handshake
//! ciphers.

use crate::binding::HelloBinding;
use crate::certificate::DeviceCertificate;
use crate::frame::{
    chunk_record, ClientHello, HandshakeChunk, ServerHello, SessionId, VerifyRecord,
    ENCRYPTED_RANDOM_LEN, HEADER_LEN, PROTOCOL_VERSION, RANDOM_LEN,
};
use crate::{Error, Result};
use ptls_crypto::aead::DEFAULT_COUNTER_LIMIT;
use ptls_crypto::kex::EcdhP256KeyPair;
use ptls_crypto::point::{self, FIELD_SIZE};
use ptls_crypto::suite::{self, Role};
use ptls_crypto::transcript::HASH_LEN;
use ptls_crypto::{signature, MessageCipher, TrafficLabel, Transcript};
use ptls_platform::IdentityKey;
use rand::RngCore;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Header placed at the start of every ClientHello.
    pub hello_header: [u8; HEADER_LEN],
    /// Messages each traffic cipher may protect before a re-handshake is
    /// forced.
    pub nonce_limit: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            hello_header: [PROTOCOL_VERSION, 0, 0],
            nonce_limit: DEFAULT_COUNTER_LIMIT,
        }
    }
}

/// Externally visible protocol phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No handshake in progress.
    Idle,
    /// ClientHello built, waiting for the ServerHello.
    HelloSent,
    /// Handshake ciphers derived, waiting for ServerVerify.
    ServerHelloReceived,
    /// ServerVerify decrypted, lock signature pending or checked.
    ServerVerifyReceived,
    /// ClientVerify built, application ciphers derived, waiting for
    /// SessionInitialized.
    VerifyExchanged,
    /// Application records may flow.
    Established,
    /// Closed for good.
    Terminated,
}

impl Phase {
    /// Stable name for logs and errors.
    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::HelloSent => "HelloSent",
            Self::ServerHelloReceived => "ServerHelloReceived",
            Self::ServerVerifyReceived => "ServerVerifyReceived",
            Self::VerifyExchanged => "VerifyExchanged",
            Self::Established => "Established",
            Self::Terminated => "Terminated",
        }
    }
}

/// Key material from the ServerHello until ClientVerify is sent.
struct HandshakeKeys {
    binding: HelloBinding,
    max_packet_size: u8,
    shared_secret: Zeroizing<[u8; FIELD_SIZE]>,
    transcript: Transcript,
    hello_hash: [u8; HASH_LEN],
    client_hs: MessageCipher,
    server_hs: MessageCipher,
}

/// Contents of the lock's ServerVerify record.
struct PeerVerify {
    auth_data: Vec<u8>,
    signature: Vec<u8>,
    hello_verify_hash: [u8; HASH_LEN],
}

/// Application ciphers, one per direction.
struct TrafficCiphers {
    outbound: MessageCipher,
    inbound: MessageCipher,
}

/// Session states during and after the handshake.
enum SessionState {
    Idle,
    HelloSent {
        keypair: EcdhP256KeyPair,
        hello: ClientHello,
        transcript: Transcript,
    },
    ServerHelloReceived(Box<HandshakeKeys>),
    ServerVerifyReceived {
        keys: Box<HandshakeKeys>,
        peer: PeerVerify,
        peer_verified: bool,
    },
    VerifyExchanged(TrafficCiphers),
    Established(TrafficCiphers),
    Terminated,
}

impl SessionState {
    fn phase(&self) -> Phase {
        match self {
            Self::Idle => Phase::Idle,
            Self::HelloSent { .. } => Phase::HelloSent,
            Self::ServerHelloReceived(_) => Phase::ServerHelloReceived,
            Self::ServerVerifyReceived { .. } => Phase::ServerVerifyReceived,
            Self::VerifyExchanged(_) => Phase::VerifyExchanged,
            Self::Established(_) => Phase::Established,
            Self::Terminated => Phase::Terminated,
        }
    }
}

/// Secure session with one lock.
///
/// Single-owner: one orchestrator drives it, and concurrent handshakes need
/// separate instances.
pub struct SecureSession {
    config: SessionConfig,
    certificate: Arc<DeviceCertificate>,
    identity: Arc<dyn IdentityKey>,
    state: SessionState,
    /// Id issued by the lock on the last successful handshake.
    session_id: Option<SessionId>,
    /// Outbound application cipher of the previous session, used to prove
    /// continuity when resuming.
    resumption: Option<MessageCipher>,
}

impl SecureSession {
    /// Create a session with the default configuration.
    pub fn new(certificate: Arc<DeviceCertificate>, identity: Arc<dyn IdentityKey>) -> Self {
        Self::with_config(certificate, identity, SessionConfig::default())
    }

    /// Create a session with a custom configuration.
    pub fn with_config(
        certificate: Arc<DeviceCertificate>,
        identity: Arc<dyn IdentityKey>,
        config: SessionConfig,
    ) -> Self {
        Self {
            config,
            certificate,
            identity,
            state: SessionState::Idle,
            session_id: None,
            resumption: None,
        }
    }

    /// Seed a session id persisted from an earlier connection.
    pub fn with_resumption(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id).filter(|id| !id.is_empty());
        self
    }

    /// Current protocol phase.
    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    /// Whether application records may be exchanged.
    pub fn is_established(&self) -> bool {
        matches!(self.state, SessionState::Established(_))
    }

    /// Cached resumption id, if any.
    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id
    }

    /// Lock's max packet size, known between ServerHello and ClientVerify.
    pub fn max_packet_size(&self) -> Option<u8> {
        match &self.state {
            SessionState::ServerHelloReceived(keys)
            | SessionState::ServerVerifyReceived { keys, .. } => Some(keys.max_packet_size),
            _ => None,
        }
    }

    /// Certificate this session authenticates with.
    pub fn certificate(&self) -> &DeviceCertificate {
        &self.certificate
    }

    fn invalid(&self, operation: &'static str) -> Error {
        Error::InvalidState {
            operation,
            phase: self.phase().name(),
        }
    }

    fn derive(&self, secret: &[u8], label: TrafficLabel, hash: &[u8]) -> Result<MessageCipher> {
        Ok(suite::derive_cipher_for(Role::Client, secret, label, hash)?
            .with_counter_limit(self.config.nonce_limit))
    }

    /// Start a new handshake attempt.
    ///
    /// Generates a fresh ephemeral key pair, discards any previous handshake
    /// material and returns the ClientHello body (without the tag byte).
    pub fn build_hello(&mut self) -> Result<Vec<u8>> {
        if matches!(self.state, SessionState::Terminated) {
            return Err(self.invalid("build_hello"));
        }
        self.reset_session();

        let keypair = EcdhP256KeyPair::generate()?;
        let mut random = [0u8; RANDOM_LEN];
        rand::rngs::OsRng.fill_bytes(&mut random);
        let (encrypted_random, session_id) = self.resumption_proof(&random);

        let hello = ClientHello {
            header: self.config.hello_header,
            random,
            public_key: *keypair.public_key(),
            encrypted_random,
            session_id,
        };
        let bytes = hello.to_bytes();

        let mut transcript = Transcript::new();
        transcript.append(&bytes);

        tracing::debug!(
            resuming = !session_id.is_empty(),
            proof = hello.has_resumption_proof(),
            "built ClientHello"
        );
        self.state = SessionState::HelloSent {
            keypair,
            hello,
            transcript,
        };
        Ok(bytes)
    }

    fn resumption_proof(
        &mut self,
        random: &[u8; RANDOM_LEN],
    ) -> ([u8; ENCRYPTED_RANDOM_LEN], SessionId) {
        let mut proof = [0u8; ENCRYPTED_RANDOM_LEN];
        let Some(session_id) = self.session_id else {
            return (proof, SessionId::default());
        };

        if let Some(cipher) = self.resumption.as_mut() {
            match cipher.seal(random) {
                Ok(sealed) if sealed.len() == ENCRYPTED_RANDOM_LEN => proof.copy_from_slice(&sealed),
                Ok(_) => self.resumption = None,
                Err(e) => {
                    tracing::warn!(error = %e, "resumption cipher unusable, sending zero proof");
                    self.resumption = None;
                }
            }
        }
        (proof, session_id)
    }

    /// Process the ServerHello body (without the tag byte).
    ///
    /// Computes the shared secret and derives both handshake ciphers bound to
    /// the hello hash. On failure the session is cleared, so the session id
    /// and resumption cipher are forgotten and the next attempt is a full
    /// handshake.
    pub fn parse_hello(&mut self, message: &[u8]) -> Result<()> {
        let (keypair, hello, transcript) =
            match std::mem::replace(&mut self.state, SessionState::Idle) {
                SessionState::HelloSent {
                    keypair,
                    hello,
                    transcript,
                } => (keypair, hello, transcript),
                old_state => {
                    self.state = old_state;
                    return Err(self.invalid("parse_hello"));
                }
            };

        match self.handshake_keys(keypair, &hello, transcript, message) {
            Ok(keys) => {
                tracing::debug!(max_packet_size = keys.max_packet_size, "processed ServerHello");
                self.state = SessionState::ServerHelloReceived(keys);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to process ServerHello");
                self.clear_session();
                Err(e)
            }
        }
    }

    fn handshake_keys(
        &self,
        keypair: EcdhP256KeyPair,
        hello: &ClientHello,
        mut transcript: Transcript,
        message: &[u8],
    ) -> Result<Box<HandshakeKeys>> {
        let server = ServerHello::parse(message)?;
        let server_public = point::decode_public_key(&server.public_key)?;
        let shared_secret = keypair.exchange(&server_public);
        drop(keypair);

        transcript.append(message);
        let hello_hash = transcript.hash();
        let client_hs = self.derive(&*shared_secret, TrafficLabel::ClientHandshake, &hello_hash)?;
        let server_hs = self.derive(&*shared_secret, TrafficLabel::ServerHandshake, &hello_hash)?;

        Ok(Box::new(HandshakeKeys {
            binding: HelloBinding::new(hello, &server),
            max_packet_size: server.max_packet_size(),
            shared_secret,
            transcript,
            hello_hash,
            client_hs,
            server_hs,
        }))
    }

    /// Decrypt and check the ServerVerify record.
    ///
    /// The echoed hash must equal the hello hash; otherwise the handshake
    /// material is discarded and `Error::HashMismatch` is returned.
    pub fn parse_verify(&mut self, record: &[u8]) -> Result<()> {
        let mut keys = match std::mem::replace(&mut self.state, SessionState::Idle) {
            SessionState::ServerHelloReceived(keys) => keys,
            old_state => {
                self.state = old_state;
                return Err(self.invalid("parse_verify"));
            }
        };

        let plaintext = keys.server_hs.open(record)?;
        let (verify, consumed) = VerifyRecord::parse(&plaintext)?;

        if !bool::from(verify.transcript_hash.ct_eq(&keys.hello_hash)) {
            tracing::warn!("ServerVerify echoed a different transcript hash");
            return Err(Error::HashMismatch);
        }

        keys.transcript.append(&plaintext[..consumed]);
        let hello_verify_hash = keys.transcript.hash();

        self.state = SessionState::ServerVerifyReceived {
            keys,
            peer: PeerVerify {
                auth_data: verify.auth_data,
                signature: verify.signature,
                hello_verify_hash,
            },
            peer_verified: false,
        };
        Ok(())
    }

    /// Check the lock's ServerVerify signature against its long-term key.
    ///
    /// Returns `Ok(false)` for a well-formed signature that does not verify;
    /// [`SecureSession::verify`] refuses to run until this returned `true`.
    /// A malformed signature discards the handshake material.
    pub fn peer_verify(&mut self, lock_public_key: &[u8]) -> Result<bool> {
        let phase = self.phase();
        let SessionState::ServerVerifyReceived {
            keys,
            peer,
            peer_verified,
        } = &mut self.state
        else {
            return Err(Error::InvalidState {
                operation: "peer_verify",
                phase: phase.name(),
            });
        };

        let input = keys.binding.server_signature_input(&peer.auth_data)?;
        match signature::verify_der(lock_public_key, &input, &peer.signature) {
            Ok(valid) => {
                *peer_verified = valid;
                if !valid {
                    tracing::warn!("lock signature did not verify");
                }
                Ok(valid)
            }
            Err(e) => {
                self.reset_session();
                Err(Error::AuthenticationFailed(e.to_string()))
            }
        }
    }

    /// Build the ClientVerify record and switch to application ciphers.
    ///
    /// Returns the encrypted record split into packet-sized chunks; only the
    /// last is tagged `ClientVerifyEnd`.
    pub fn verify(&mut self) -> Result<Vec<HandshakeChunk>> {
        let (mut keys, peer) = match std::mem::replace(&mut self.state, SessionState::Idle) {
            SessionState::ServerVerifyReceived {
                keys,
                peer,
                peer_verified: true,
            } => (keys, peer),
            SessionState::ServerVerifyReceived { .. } => return Err(Error::PeerNotVerified),
            old_state => {
                self.state = old_state;
                return Err(self.invalid("verify"));
            }
        };

        let auth_data = self.certificate.certificate();
        let input = keys.binding.client_signature_input(
            &peer.auth_data,
            &peer.signature,
            &keys.hello_hash,
            auth_data,
        )?;
        let signature = self.identity.sign(&input)?;

        let record = VerifyRecord {
            auth_data: auth_data.to_vec(),
            signature,
            transcript_hash: peer.hello_verify_hash,
        }
        .to_bytes()?;

        keys.transcript.append(&record);
        let ciphertext = keys.client_hs.seal(&record)?;

        let application_hash = keys.transcript.hash();
        let traffic = TrafficCiphers {
            outbound: self.derive(
                &*keys.shared_secret,
                TrafficLabel::ClientApplication,
                &application_hash,
            )?,
            inbound: self.derive(
                &*keys.shared_secret,
                TrafficLabel::ServerApplication,
                &application_hash,
            )?,
        };

        let chunks = chunk_record(&ciphertext, keys.max_packet_size)?;
        drop(keys);

        tracing::debug!(chunks = chunks.len(), "built ClientVerify");
        self.state = SessionState::VerifyExchanged(traffic);
        Ok(chunks)
    }

    /// Finish the handshake with the SessionInitialized payload.
    ///
    /// A non-empty id replaces the cached one.
    pub fn ready(&mut self, session_id: &[u8]) -> Result<()> {
        if !matches!(self.state, SessionState::VerifyExchanged(_)) {
            return Err(self.invalid("ready"));
        }
        let issued = SessionId::from_payload(session_id)?;

        if let SessionState::VerifyExchanged(traffic) =
            std::mem::replace(&mut self.state, SessionState::Idle)
        {
            self.state = SessionState::Established(traffic);
        }
        if let Some(id) = issued {
            self.session_id = Some(id);
        }

        tracing::info!(
            session_id = %self.session_id.unwrap_or_default(),
            "secure session ready"
        );
        Ok(())
    }

    /// Encrypt an application payload.
    ///
    /// Returns `Ok(None)` without touching any cipher when the session is not
    /// established. A cipher failure clears the session.
    pub fn write(&mut self, plaintext: &[u8]) -> Result<Option<Vec<u8>>> {
        let phase = self.phase();
        let SessionState::Established(traffic) = &mut self.state else {
            tracing::warn!(phase = phase.name(), "write before session established, dropped");
            return Ok(None);
        };

        match traffic.outbound.seal(plaintext) {
            Ok(ciphertext) => Ok(Some(ciphertext)),
            Err(e) => {
                tracing::error!(error = %e, "failed to encrypt application record");
                self.clear_session();
                Err(e.into())
            }
        }
    }

    /// Decrypt an application record (ciphertext with tag).
    ///
    /// Returns `Ok(None)` when the session is not established. A rejected
    /// record clears the session.
    pub fn read(&mut self, ciphertext: &[u8]) -> Result<Option<Zeroizing<Vec<u8>>>> {
        let phase = self.phase();
        let SessionState::Established(traffic) = &mut self.state else {
            tracing::warn!(phase = phase.name(), "read before session established, dropped");
            return Ok(None);
        };

        match traffic.inbound.open(ciphertext) {
            Ok(plaintext) => Ok(Some(plaintext)),
            Err(e) => {
                tracing::error!(error = %e, "failed to decrypt application record");
                self.clear_session();
                Err(e.into())
            }
        }
    }

    /// Drop all handshake key material, keeping the session id and the
    /// resumption cipher for the next attempt.
    pub fn reset_session(&mut self) {
        if matches!(self.state, SessionState::Terminated) {
            return;
        }
        match std::mem::replace(&mut self.state, SessionState::Idle) {
            SessionState::VerifyExchanged(traffic) | SessionState::Established(traffic) => {
                self.resumption = Some(traffic.outbound);
            }
            _ => {}
        }
    }

    /// Drop everything, forcing a full handshake next time.
    pub fn clear_session(&mut self) {
        if !matches!(self.state, SessionState::Terminated) {
            self.state = SessionState::Idle;
        }
        self.session_id = None;
        self.resumption = None;
    }

    /// Close the session for good. Later handshake calls fail.
    pub fn terminate(&mut self) {
        self.state = SessionState::Terminated;
        self.resumption = None;
    }
}

impl core::fmt::Debug for SecureSession {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SecureSession")
            .field("phase", &self.phase())
            .field("session_id", &self.session_id)
            .field("resumable", &self.resumption.is_some())
            .finish_non_exhaustive()
    }
}
