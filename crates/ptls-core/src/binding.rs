//! Signature inputs binding both hellos.
//!
//! Both signatures in the handshake cover the exact wire values of the two
//! hellos, so a signature made for one handshake cannot be replayed into
//! another. The lock signs first; the client's input extends the lock's with
//! the lock's signature, the hello hash and the client's auth data.

use crate::frame::{
    put_length_prefixed, ClientHello, ServerHello, SessionId, ENCRYPTED_RANDOM_LEN,
    HELLO_PREFIX_LEN,
};
use crate::Result;
use ptls_crypto::point::ENCODED_POINT_LEN;

/// Wire values from one ClientHello / ServerHello pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloBinding {
    client_prefix: [u8; HELLO_PREFIX_LEN],
    client_public: [u8; ENCODED_POINT_LEN],
    encrypted_random: [u8; ENCRYPTED_RANDOM_LEN],
    session_id: SessionId,
    server_prefix: [u8; HELLO_PREFIX_LEN],
    server_public: Vec<u8>,
}

impl HelloBinding {
    /// Capture the fields of both hellos.
    pub fn new(client: &ClientHello, server: &ServerHello) -> Self {
        Self {
            client_prefix: client.prefix(),
            client_public: client.public_key,
            encrypted_random: client.encrypted_random,
            session_id: client.session_id,
            server_prefix: server.prefix,
            server_public: server.public_key.clone(),
        }
    }

    fn hellos(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            2 * HELLO_PREFIX_LEN + ENCODED_POINT_LEN + ENCRYPTED_RANDOM_LEN + self.server_public.len() + 4,
        );
        out.extend_from_slice(&self.client_prefix);
        out.extend_from_slice(&self.client_public);
        out.extend_from_slice(&self.encrypted_random);
        out.extend_from_slice(self.session_id.as_bytes());
        out.extend_from_slice(&self.server_prefix);
        out.extend_from_slice(&self.server_public);
        out
    }

    /// Bytes the lock signs in ServerVerify.
    ///
    /// `client random ‖ client pub ‖ encrypted random ‖ session id ‖
    /// server random ‖ server pub ‖ len ‖ server auth`
    pub fn server_signature_input(&self, server_auth: &[u8]) -> Result<Vec<u8>> {
        let mut out = self.hellos();
        put_length_prefixed(&mut out, server_auth)?;
        Ok(out)
    }

    /// Bytes the client signs in ClientVerify.
    ///
    /// The lock's input followed by `len ‖ server signature ‖ len ‖ hello
    /// hash ‖ len ‖ client auth`.
    pub fn client_signature_input(
        &self,
        server_auth: &[u8],
        server_signature: &[u8],
        hello_hash: &[u8],
        client_auth: &[u8],
    ) -> Result<Vec<u8>> {
        let mut out = self.server_signature_input(server_auth)?;
        put_length_prefixed(&mut out, server_signature)?;
        put_length_prefixed(&mut out, hello_hash)?;
        put_length_prefixed(&mut out, client_auth)?;
        Ok(out)
    }
}
