//! Simulated lock for testing.
//!
//! [`MockLock`] plays the device side of the handshake with its own key
//! schedule, so a [`SecureSession`](crate::SecureSession) can be run against
//! an independent peer in tests without radio hardware.

use crate::binding::HelloBinding;
use crate::certificate::DeviceCertificate;
use crate::frame::{
    ClientHello, HandshakeTag, ServerHello, SessionId, VerifyRecord, RANDOM_LEN,
};
use crate::{Error, Result};
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use p256::PublicKey;
use ptls_crypto::kex::EcdhP256KeyPair;
use ptls_crypto::point::{self, ENCODED_POINT_LEN, FIELD_SIZE};
use ptls_crypto::suite::{self, Role};
use ptls_crypto::transcript::HASH_LEN;
use ptls_crypto::{signature, MessageCipher, TrafficLabel, Transcript};
use rand::RngCore;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// Typical BLE characteristic payload size.
pub const DEFAULT_MAX_PACKET_SIZE: u8 = 20;

/// Certificate bytes handed out by [`MockLock::certificate`].
pub const MOCK_CERTIFICATE: &[u8] = b"mock access certificate for ptls";

/// Auth data the lock sends in ServerVerify.
pub const MOCK_LOCK_AUTH: &[u8] = b"mock lock";

struct LockHandshake {
    binding: HelloBinding,
    shared_secret: Zeroizing<[u8; FIELD_SIZE]>,
    transcript: Transcript,
    hello_hash: [u8; HASH_LEN],
    client_hs: MessageCipher,
    server_hs: MessageCipher,
    server_signature: Vec<u8>,
    hello_verify_hash: [u8; HASH_LEN],
    client_verify: Vec<u8>,
}

enum LockState {
    Idle,
    HelloReceived(Box<LockHandshake>),
    VerifySent(Box<LockHandshake>),
    Established {
        inbound: MessageCipher,
        outbound: MessageCipher,
    },
}

/// Lock endpoint of the handshake.
pub struct MockLock {
    device_key: SigningKey,
    client_identity: Option<[u8; ENCODED_POINT_LEN]>,
    max_packet_size: u8,
    next_session_id: SessionId,
    state: LockState,
    /// Session id and client cipher of the last established session.
    resumable: Option<(SessionId, MessageCipher)>,
    resumed: bool,
}

impl Default for MockLock {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLock {
    /// Lock with a random device key that accepts any client identity.
    pub fn new() -> Self {
        Self {
            device_key: SigningKey::random(&mut rand::rngs::OsRng),
            client_identity: None,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            next_session_id: SessionId::new([0x5E, 0x55, 0x10, 0x01]),
            state: LockState::Idle,
            resumable: None,
            resumed: false,
        }
    }

    /// Only accept ClientVerify signatures from this identity key.
    pub fn with_client_identity(mut self, public_key: [u8; ENCODED_POINT_LEN]) -> Self {
        self.client_identity = Some(public_key);
        self
    }

    /// Advertise a different max packet size in the ServerHello.
    pub fn with_max_packet_size(mut self, max_packet_size: u8) -> Self {
        self.max_packet_size = max_packet_size;
        self
    }

    /// Certificate a client needs to talk to this lock.
    pub fn certificate(&self) -> DeviceCertificate {
        let public = point::encode_public_key(&PublicKey::from(self.device_key.verifying_key()));
        DeviceCertificate {
            certificate: MOCK_CERTIFICATE.to_vec(),
            device_public_key: public,
        }
    }

    /// Whether the last accepted hello carried a valid resumption proof.
    pub fn resumed(&self) -> bool {
        self.resumed
    }

    /// Whether the handshake has completed on the lock side.
    pub fn is_established(&self) -> bool {
        matches!(self.state, LockState::Established { .. })
    }

    fn derive(secret: &[u8], label: TrafficLabel, hash: &[u8]) -> Result<MessageCipher> {
        Ok(suite::derive_cipher_for(Role::Lock, secret, label, hash)?)
    }

    /// Process a ClientHello body and return the ServerHello body.
    pub fn accept_hello(&mut self, message: &[u8]) -> Result<Vec<u8>> {
        let client = ClientHello::parse(message)?;
        self.resumed = self.check_resumption(&client);

        let keypair = EcdhP256KeyPair::generate()?;
        let mut random = [0u8; RANDOM_LEN];
        rand::rngs::OsRng.fill_bytes(&mut random);
        let server = ServerHello::new(self.max_packet_size, &random, keypair.public_key());
        let server_bytes = server.to_bytes();

        let shared_secret = keypair.exchange_encoded(&client.public_key)?;

        let mut transcript = Transcript::new();
        transcript.append(message);
        transcript.append(&server_bytes);
        let hello_hash = transcript.hash();

        self.state = LockState::HelloReceived(Box::new(LockHandshake {
            binding: HelloBinding::new(&client, &server),
            client_hs: Self::derive(&*shared_secret, TrafficLabel::ClientHandshake, &hello_hash)?,
            server_hs: Self::derive(&*shared_secret, TrafficLabel::ServerHandshake, &hello_hash)?,
            shared_secret,
            transcript,
            hello_hash,
            server_signature: Vec::new(),
            hello_verify_hash: [0u8; HASH_LEN],
            client_verify: Vec::new(),
        }));
        Ok(server_bytes)
    }

    fn check_resumption(&mut self, client: &ClientHello) -> bool {
        if !client.has_resumption_proof() {
            return false;
        }
        let Some((id, cipher)) = self.resumable.as_mut() else {
            return false;
        };
        if *id != client.session_id {
            return false;
        }
        match cipher.open(&client.encrypted_random) {
            Ok(random) => random.as_slice() == client.random.as_slice(),
            Err(_) => false,
        }
    }

    /// Build the encrypted ServerVerify record.
    pub fn server_verify(&mut self) -> Result<Vec<u8>> {
        let LockState::HelloReceived(mut hs) = std::mem::replace(&mut self.state, LockState::Idle)
        else {
            return Err(Error::ProtocolViolation("ServerVerify before hello".into()));
        };

        let input = hs.binding.server_signature_input(MOCK_LOCK_AUTH)?;
        let signature: Signature = self
            .device_key
            .try_sign(&input)
            .map_err(|e| ptls_platform::Error::Signing(e.to_string()))?;
        hs.server_signature = signature.to_der().as_bytes().to_vec();

        let record = VerifyRecord {
            auth_data: MOCK_LOCK_AUTH.to_vec(),
            signature: hs.server_signature.clone(),
            transcript_hash: hs.hello_hash,
        }
        .to_bytes()?;
        hs.transcript.append(&record);
        hs.hello_verify_hash = hs.transcript.hash();

        let ciphertext = hs.server_hs.seal(&record)?;
        self.state = LockState::VerifySent(hs);
        Ok(ciphertext)
    }

    /// Accept one ClientVerify frame (tag byte included).
    ///
    /// Returns the SessionInitialized payload once the end chunk has been
    /// received and the client's record checks out.
    pub fn accept_client_verify(&mut self, frame: &[u8]) -> Result<Option<Vec<u8>>> {
        let LockState::VerifySent(hs) = &mut self.state else {
            return Err(Error::ProtocolViolation("ClientVerify before ServerVerify".into()));
        };
        let (&tag, payload) = frame.split_first().ok_or(Error::InsufficientData(1))?;
        hs.client_verify.extend_from_slice(payload);

        match HandshakeTag::from_u8(tag) {
            Some(HandshakeTag::ClientVerify) => Ok(None),
            Some(HandshakeTag::ClientVerifyEnd) => self.finish_handshake().map(Some),
            _ => Err(Error::InvalidFrame(format!("unexpected tag {tag} in ClientVerify"))),
        }
    }

    fn finish_handshake(&mut self) -> Result<Vec<u8>> {
        let LockState::VerifySent(mut hs) = std::mem::replace(&mut self.state, LockState::Idle)
        else {
            return Err(Error::ProtocolViolation("no handshake to finish".into()));
        };

        let plaintext = hs.client_hs.open(&hs.client_verify)?;
        let (record, consumed) = VerifyRecord::parse(&plaintext)?;

        if !bool::from(record.transcript_hash.ct_eq(&hs.hello_verify_hash)) {
            return Err(Error::HashMismatch);
        }
        if record.auth_data != MOCK_CERTIFICATE {
            return Err(Error::AuthenticationFailed("unknown certificate".into()));
        }
        if let Some(identity) = self.client_identity {
            let input = hs.binding.client_signature_input(
                MOCK_LOCK_AUTH,
                &hs.server_signature,
                &hs.hello_hash,
                &record.auth_data,
            )?;
            if !signature::verify_der(&identity, &input, &record.signature)? {
                return Err(Error::AuthenticationFailed("client signature".into()));
            }
        }

        hs.transcript.append(&plaintext[..consumed]);
        let application_hash = hs.transcript.hash();
        let inbound = Self::derive(
            &*hs.shared_secret,
            TrafficLabel::ClientApplication,
            &application_hash,
        )?;
        let outbound = Self::derive(
            &*hs.shared_secret,
            TrafficLabel::ServerApplication,
            &application_hash,
        )?;

        self.state = LockState::Established { inbound, outbound };
        Ok(self.next_session_id.as_bytes().to_vec())
    }

    /// Encrypt an application payload towards the client.
    pub fn seal(&mut self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let LockState::Established { outbound, .. } = &mut self.state else {
            return Err(Error::NotEstablished);
        };
        Ok(outbound.seal(plaintext)?)
    }

    /// Decrypt an application record from the client.
    pub fn open(&mut self, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let LockState::Established { inbound, .. } = &mut self.state else {
            return Err(Error::NotEstablished);
        };
        Ok(inbound.open(ciphertext)?)
    }

    /// Drop the current session, keeping its client cipher so the next
    /// hello can prove continuity.
    pub fn disconnect(&mut self) {
        if let LockState::Established { inbound, .. } =
            std::mem::replace(&mut self.state, LockState::Idle)
        {
            self.resumable = Some((self.next_session_id, inbound));
        }
    }

    /// Answer one outbound handshake-channel frame the way the lock would.
    ///
    /// - Hello: replies with the ServerHello
    /// - ServerVerify time request: replies with the ServerVerify record
    /// - ClientVerify chunks: silent until the end chunk, then
    ///   SessionInitialized
    pub fn respond(&mut self, frame: &[u8]) -> Result<Vec<Vec<u8>>> {
        let (&tag, payload) = frame.split_first().ok_or(Error::InsufficientData(1))?;

        match HandshakeTag::from_u8(tag) {
            Some(HandshakeTag::Hello) => {
                let hello = self.accept_hello(payload)?;
                Ok(vec![HandshakeTag::Hello.frame(&hello)])
            }
            Some(HandshakeTag::ServerVerify) => {
                let record = self.server_verify()?;
                Ok(vec![HandshakeTag::ServerVerify.frame(&record)])
            }
            Some(HandshakeTag::ClientVerify | HandshakeTag::ClientVerifyEnd) => {
                Ok(self
                    .accept_client_verify(frame)?
                    .map(|id| HandshakeTag::SessionInitialized.frame(&id))
                    .into_iter()
                    .collect())
            }
            _ => Err(Error::InvalidFrame(format!("lock cannot answer tag {tag}"))),
        }
    }
}
