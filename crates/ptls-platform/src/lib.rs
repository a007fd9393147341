//! Platform integrations for the ptls lock channel.
//!
//! The long-term identity key pair lives in platform secure storage and is
//! reached through the [`IdentityKeyProvider`] capability. The private half
//! never leaves its handle; callers only see the public key and signatures.
//!
//! Implements:
//! - [`traits`]: the capability traits
//! - [`mock`]: in-memory keys for tests and simulations

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod mock;
pub mod traits;

pub use error::{Error, Result};
pub use traits::{IdentityKey, IdentityKeyProvider};
