//! Secure channel between a client and a BLE door lock.
//!
//! This crate implements:
//! - Handshake wire formats (tags, alerts, hellos, verify records, chunking)
//! - `SecureSession`: the client handshake state machine and record
//!   protection
//! - Application-channel framing and lock commands
//! - A simulated lock (`mock::MockLock`) for tests
//!
//! Cryptographic primitives live in `ptls-crypto`; the long-term identity key
//! comes from a `ptls-platform` provider.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod binding;
pub mod certificate;
pub mod command;
pub mod error;
pub mod frame;
pub mod mock;
pub mod session;

pub use certificate::DeviceCertificate;
pub use command::{ApplicationFrame, Command};
pub use error::{Error, Result};
pub use frame::{AlertCode, HandshakeMessage, HandshakeTag, SessionId};
pub use session::{Phase, SecureSession, SessionConfig};
