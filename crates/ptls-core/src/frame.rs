//! Wire formats for the lock handshake.
//!
//! Implements the byte layouts exchanged on the handshake channel:
//! - ClientHello / ServerHello bodies
//! - Verify records (the plaintext inside ServerVerify and ClientVerify)
//! - Handshake tags, alert codes and the diagnostic sequence nibble
//! - Chunking of oversized records to the lock's packet size
//!
//! All multi-byte integers are big-endian.

use crate::{Error, Result};
use ptls_crypto::point::ENCODED_POINT_LEN;
use ptls_crypto::transcript::HASH_LEN;

/// Protocol version carried in the first hello header byte.
pub const PROTOCOL_VERSION: u8 = 2;
/// Hello header length (version, max packet size / reserved, reserved).
pub const HEADER_LEN: usize = 3;
/// Random nonce length.
pub const RANDOM_LEN: usize = 32;
/// Header plus random: the "random data" each side signs over.
pub const HELLO_PREFIX_LEN: usize = HEADER_LEN + RANDOM_LEN;
/// Encrypted resumption random: 32-byte ciphertext plus 16-byte tag.
pub const ENCRYPTED_RANDOM_LEN: usize = 48;
/// Session id length.
pub const SESSION_ID_LEN: usize = 4;
/// Length prefix size inside verify records and signature inputs.
pub const LENGTH_PREFIX_LEN: usize = 2;
/// Full ClientHello body length.
pub const CLIENT_HELLO_LEN: usize =
    HELLO_PREFIX_LEN + ENCODED_POINT_LEN + ENCRYPTED_RANDOM_LEN + SESSION_ID_LEN;
/// Index of the max packet size inside the ServerHello header.
pub const MTU_INDEX: usize = 1;
/// Outer header byte reserved in every transport packet.
pub const PACKET_HEADER_LEN: usize = 1;
/// Length of the ServerVerify request body (Unix time in milliseconds).
pub const SERVER_VERIFY_REQUEST_LEN: usize = 8;
/// Bits of the first inbound byte that carry the value; the upper nibble is a
/// diagnostic sequence counter.
pub const SEQUENCE_MASK: u8 = 0x0F;

/// First byte of every handshake-channel frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum HandshakeTag {
    /// ClientHello (outbound) or ServerHello (inbound).
    Hello = 3,
    /// Alert from the lock; the next byte is an [`AlertCode`].
    Alert = 4,
    /// ServerVerify record (inbound) or time request (outbound).
    ServerVerify = 5,
    /// Intermediate ClientVerify chunk.
    ClientVerify = 6,
    /// Last ClientVerify chunk.
    ClientVerifyEnd = 7,
    /// Handshake complete; the payload is the session id.
    SessionInitialized = 8,
}

impl HandshakeTag {
    /// Convert to wire format.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Convert from wire format.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            3 => Some(Self::Hello),
            4 => Some(Self::Alert),
            5 => Some(Self::ServerVerify),
            6 => Some(Self::ClientVerify),
            7 => Some(Self::ClientVerifyEnd),
            8 => Some(Self::SessionInitialized),
            _ => None,
        }
    }

    /// Prefix `payload` with this tag.
    pub fn frame(self, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + payload.len());
        out.push(self.to_u8());
        out.extend_from_slice(payload);
        out
    }
}

/// Alert codes sent by the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertCode {
    /// Generic error (1).
    Error,
    /// The lock has no trusted time (2).
    NoTrustedTime,
    /// The lock timed out waiting for us (3).
    Timeout,
    /// The presented certificate was rejected (5).
    InvalidCertificate,
    /// The mobile is not registered with this lock (6).
    NotRegistered,
    /// Any other code, including the unassigned 4.
    Unknown(u8),
}

impl AlertCode {
    /// Convert from wire format.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Error,
            2 => Self::NoTrustedTime,
            3 => Self::Timeout,
            5 => Self::InvalidCertificate,
            6 => Self::NotRegistered,
            other => Self::Unknown(other),
        }
    }

    /// Convert to wire format.
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Error => 1,
            Self::NoTrustedTime => 2,
            Self::Timeout => 3,
            Self::InvalidCertificate => 5,
            Self::NotRegistered => 6,
            Self::Unknown(other) => other,
        }
    }

    /// Whether a new handshake attempt cannot help without caller action.
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            Self::NoTrustedTime | Self::InvalidCertificate | Self::NotRegistered
        )
    }
}

/// Mask the diagnostic sequence nibble off the first byte of `frame`.
///
/// Returns the sequence counter, or `None` for an empty frame.
pub fn strip_sequence(frame: &mut [u8]) -> Option<u8> {
    let first = frame.first_mut()?;
    let sequence = *first >> 4;
    *first &= SEQUENCE_MASK;
    Some(sequence)
}

/// Resumption token issued by the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SessionId([u8; SESSION_ID_LEN]);

impl SessionId {
    /// Wrap raw id bytes.
    pub fn new(bytes: [u8; SESSION_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse the SessionInitialized payload.
    ///
    /// An empty or all-zero payload means the lock issued no id. Bytes past
    /// the id are ignored.
    pub fn from_payload(payload: &[u8]) -> Result<Option<Self>> {
        if payload.is_empty() {
            return Ok(None);
        }
        if payload.len() < SESSION_ID_LEN {
            return Err(Error::InsufficientData(SESSION_ID_LEN));
        }

        let mut id = [0u8; SESSION_ID_LEN];
        id.copy_from_slice(&payload[..SESSION_ID_LEN]);
        Ok(Some(Self(id)).filter(|id| !id.is_empty()))
    }

    /// Raw id bytes.
    pub fn as_bytes(&self) -> &[u8; SESSION_ID_LEN] {
        &self.0
    }

    /// Whether this is the all-zero "no session" value.
    pub fn is_empty(&self) -> bool {
        self.0 == [0u8; SESSION_ID_LEN]
    }
}

impl core::fmt::Display for SessionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// ClientHello body (without the tag byte).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello {
    /// Header: version, reserved, reserved.
    pub header: [u8; HEADER_LEN],
    /// Client random.
    pub random: [u8; RANDOM_LEN],
    /// Client ephemeral ECDH public key.
    pub public_key: [u8; ENCODED_POINT_LEN],
    /// Fresh random sealed under the previous application cipher, or zeros.
    pub encrypted_random: [u8; ENCRYPTED_RANDOM_LEN],
    /// Cached session id, or zeros.
    pub session_id: SessionId,
}

impl ClientHello {
    /// Serialize to wire format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(CLIENT_HELLO_LEN);
        out.extend_from_slice(&self.header);
        out.extend_from_slice(&self.random);
        out.extend_from_slice(&self.public_key);
        out.extend_from_slice(&self.encrypted_random);
        out.extend_from_slice(self.session_id.as_bytes());
        out
    }

    /// Parse from wire format.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() != CLIENT_HELLO_LEN {
            return Err(Error::InvalidFrame(format!(
                "ClientHello must be {CLIENT_HELLO_LEN} bytes, got {}",
                data.len()
            )));
        }

        let mut reader = Reader::new(data);
        Ok(Self {
            header: reader.array()?,
            random: reader.array()?,
            public_key: reader.array()?,
            encrypted_random: reader.array()?,
            session_id: SessionId(reader.array()?),
        })
    }

    /// Header plus random, as covered by signatures.
    pub fn prefix(&self) -> [u8; HELLO_PREFIX_LEN] {
        let mut out = [0u8; HELLO_PREFIX_LEN];
        out[..HEADER_LEN].copy_from_slice(&self.header);
        out[HEADER_LEN..].copy_from_slice(&self.random);
        out
    }

    /// Whether the encrypted-random field carries a resumption proof.
    pub fn has_resumption_proof(&self) -> bool {
        self.encrypted_random.iter().any(|&b| b != 0)
    }
}

/// ServerHello body (without the tag byte).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHello {
    /// Header plus server random, as covered by signatures.
    pub prefix: [u8; HELLO_PREFIX_LEN],
    /// Server ephemeral ECDH public key, as received.
    pub public_key: Vec<u8>,
}

impl ServerHello {
    /// Parse from wire format.
    ///
    /// The public key is not validated here; that happens when the shared
    /// secret is computed.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() <= HELLO_PREFIX_LEN {
            return Err(Error::InsufficientData(HELLO_PREFIX_LEN + 1));
        }

        let mut prefix = [0u8; HELLO_PREFIX_LEN];
        prefix.copy_from_slice(&data[..HELLO_PREFIX_LEN]);
        Ok(Self {
            prefix,
            public_key: data[HELLO_PREFIX_LEN..].to_vec(),
        })
    }

    /// Build a ServerHello body.
    pub fn new(
        max_packet_size: u8,
        random: &[u8; RANDOM_LEN],
        public_key: &[u8; ENCODED_POINT_LEN],
    ) -> Self {
        let mut prefix = [0u8; HELLO_PREFIX_LEN];
        prefix[0] = PROTOCOL_VERSION;
        prefix[MTU_INDEX] = max_packet_size;
        prefix[HEADER_LEN..].copy_from_slice(random);
        Self {
            prefix,
            public_key: public_key.to_vec(),
        }
    }

    /// Serialize to wire format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HELLO_PREFIX_LEN + self.public_key.len());
        out.extend_from_slice(&self.prefix);
        out.extend_from_slice(&self.public_key);
        out
    }

    /// Largest transport packet the lock accepts, in bytes.
    pub fn max_packet_size(&self) -> u8 {
        self.prefix[MTU_INDEX]
    }
}

/// Decrypted ServerVerify / ClientVerify body.
///
/// Layout: `[u16 len][auth data][u16 len][signature][u16 len=32][transcript hash]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyRecord {
    /// Sender's authentication data (certificate bytes for the client).
    pub auth_data: Vec<u8>,
    /// DER ECDSA signature over the hello binding.
    pub signature: Vec<u8>,
    /// Transcript hash the sender echoes back.
    pub transcript_hash: [u8; HASH_LEN],
}

impl VerifyRecord {
    /// Parse a record, returning it with the number of bytes consumed.
    ///
    /// Trailing bytes after the hash are left to the caller.
    pub fn parse(data: &[u8]) -> Result<(Self, usize)> {
        let mut reader = Reader::new(data);
        let auth_data = reader.length_prefixed()?.to_vec();
        let signature = reader.length_prefixed()?.to_vec();

        let hash = reader.length_prefixed()?;
        if hash.len() != HASH_LEN {
            return Err(Error::InvalidFrame(format!(
                "echoed transcript hash must be {HASH_LEN} bytes, got {}",
                hash.len()
            )));
        }
        let mut transcript_hash = [0u8; HASH_LEN];
        transcript_hash.copy_from_slice(hash);

        Ok((
            Self {
                auth_data,
                signature,
                transcript_hash,
            },
            reader.position(),
        ))
    }

    /// Serialize to wire format.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(
            3 * LENGTH_PREFIX_LEN + self.auth_data.len() + self.signature.len() + HASH_LEN,
        );
        put_length_prefixed(&mut out, &self.auth_data)?;
        put_length_prefixed(&mut out, &self.signature)?;
        put_length_prefixed(&mut out, &self.transcript_hash)?;
        Ok(out)
    }
}

/// Append `u16 len || bytes`.
pub fn put_length_prefixed(out: &mut Vec<u8>, bytes: &[u8]) -> Result<()> {
    let len = u16::try_from(bytes.len()).map_err(|_| {
        Error::InvalidFrame(format!("field of {} bytes exceeds u16 length", bytes.len()))
    })?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(bytes);
    Ok(())
}

/// One packet-sized piece of a chunked handshake record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeChunk {
    /// `ClientVerify` for intermediate chunks, `ClientVerifyEnd` for the last.
    pub tag: HandshakeTag,
    /// Chunk payload.
    pub payload: Vec<u8>,
}

impl HandshakeChunk {
    /// Tag-prefixed frame ready for the handshake channel.
    pub fn to_frame(&self) -> Vec<u8> {
        self.tag.frame(&self.payload)
    }

    /// Whether this is the final chunk.
    pub fn is_end(&self) -> bool {
        self.tag == HandshakeTag::ClientVerifyEnd
    }
}

/// Split `record` into chunks that fit a `max_packet_size` packet.
///
/// One byte per packet is reserved for the tag, so each chunk carries at most
/// `max_packet_size - 1` bytes. Only the last chunk is tagged as the end.
pub fn chunk_record(record: &[u8], max_packet_size: u8) -> Result<Vec<HandshakeChunk>> {
    let chunk_len = usize::from(max_packet_size).saturating_sub(PACKET_HEADER_LEN);
    if chunk_len == 0 {
        return Err(Error::ProtocolViolation(format!(
            "max packet size {max_packet_size} leaves no room for payload"
        )));
    }

    let count = record.len().div_ceil(chunk_len);
    Ok(record
        .chunks(chunk_len)
        .enumerate()
        .map(|(index, piece)| HandshakeChunk {
            tag: if index + 1 == count {
                HandshakeTag::ClientVerifyEnd
            } else {
                HandshakeTag::ClientVerify
            },
            payload: piece.to_vec(),
        })
        .collect())
}

/// ServerVerify request sent after the ServerHello: tag plus the current
/// Unix time in milliseconds.
pub fn server_verify_request(unix_time_ms: u64) -> Vec<u8> {
    HandshakeTag::ServerVerify.frame(&unix_time_ms.to_be_bytes())
}

/// Inbound handshake-channel message, classified by its tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeMessage {
    /// ServerHello body.
    Hello(Vec<u8>),
    /// Alert with its code.
    Alert(AlertCode),
    /// Encrypted ServerVerify record.
    ServerVerify(Vec<u8>),
    /// Handshake finished; payload carries the session id.
    SessionInitialized(Vec<u8>),
}

impl HandshakeMessage {
    /// Classify a handshake frame whose sequence nibble is already masked.
    pub fn parse(frame: &[u8]) -> Result<Self> {
        let (&tag, payload) = frame.split_first().ok_or(Error::InsufficientData(1))?;

        match HandshakeTag::from_u8(tag) {
            Some(HandshakeTag::Hello) => Ok(Self::Hello(payload.to_vec())),
            Some(HandshakeTag::Alert) => {
                let code = payload.first().ok_or(Error::InsufficientData(2))?;
                Ok(Self::Alert(AlertCode::from_u8(*code)))
            }
            Some(HandshakeTag::ServerVerify) => Ok(Self::ServerVerify(payload.to_vec())),
            Some(HandshakeTag::SessionInitialized) => {
                Ok(Self::SessionInitialized(payload.to_vec()))
            }
            Some(other @ (HandshakeTag::ClientVerify | HandshakeTag::ClientVerifyEnd)) => Err(
                Error::InvalidFrame(format!("client-only tag {other:?} received from lock")),
            ),
            None => Err(Error::InvalidFrame(format!(
                "unknown handshake tag 0x{tag:02X}"
            ))),
        }
    }
}

/// Bounds-checked cursor over a byte slice.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or(Error::InsufficientData(self.pos.saturating_add(len)))?;
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn length_prefixed(&mut self) -> Result<&'a [u8]> {
        let len = u16::from_be_bytes(self.array()?);
        self.take(usize::from(len))
    }

    fn position(&self) -> usize {
        self.pos
    }
}
