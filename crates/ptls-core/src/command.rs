//! Application-channel framing.
//!
//! Every application-channel frame starts with a one-byte marker:
//! `0x00` for cleartext (provisioning) and `0x01` for a protected record.
//! Lock commands are an opcode followed by an opaque payload.

use crate::session::SecureSession;
use crate::{Error, Result};

/// Marker for a cleartext application frame.
pub const MARKER_CLEARTEXT: u8 = 0x00;

/// Marker for an encrypted application frame.
pub const MARKER_CIPHERTEXT: u8 = 0x01;

/// Application-channel frame after the sequence nibble has been stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplicationFrame {
    /// Plain bytes, forwarded as-is.
    Cleartext(Vec<u8>),
    /// Ciphertext and tag, to be opened by the session.
    Ciphertext(Vec<u8>),
}

impl ApplicationFrame {
    /// Classify a frame by its marker byte.
    pub fn parse(frame: &[u8]) -> Result<Self> {
        let (&marker, body) = frame.split_first().ok_or(Error::InsufficientData(1))?;
        match marker {
            MARKER_CLEARTEXT => Ok(Self::Cleartext(body.to_vec())),
            MARKER_CIPHERTEXT => Ok(Self::Ciphertext(body.to_vec())),
            other => Err(Error::InvalidFrame(format!(
                "unknown application marker 0x{other:02x}"
            ))),
        }
    }

    /// Serialize with the marker byte.
    pub fn to_bytes(&self) -> Vec<u8> {
        let (marker, body) = match self {
            Self::Cleartext(body) => (MARKER_CLEARTEXT, body),
            Self::Ciphertext(body) => (MARKER_CIPHERTEXT, body),
        };
        let mut out = Vec::with_capacity(1 + body.len());
        out.push(marker);
        out.extend_from_slice(body);
        out
    }
}

/// A lock command: opcode plus opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Command opcode, owned by the lock API.
    pub opcode: u8,
    /// Opaque command arguments.
    pub payload: Vec<u8>,
}

impl Command {
    /// Create a command.
    pub fn new(opcode: u8, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            opcode,
            payload: payload.into(),
        }
    }

    /// `[opcode][payload]`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.payload.len());
        out.push(self.opcode);
        out.extend_from_slice(&self.payload);
        out
    }

    /// Frame for the cleartext provisioning channel.
    pub fn cleartext_frame(&self) -> Vec<u8> {
        ApplicationFrame::Cleartext(self.to_bytes()).to_bytes()
    }

    /// Encrypt under the session's outbound application cipher and frame it.
    ///
    /// Fails with [`Error::NotEstablished`] before the handshake completes.
    pub fn encrypted_frame(&self, session: &mut SecureSession) -> Result<Vec<u8>> {
        let ciphertext = session
            .write(&self.to_bytes())?
            .ok_or(Error::NotEstablished)?;
        Ok(ApplicationFrame::Ciphertext(ciphertext).to_bytes())
    }
}
