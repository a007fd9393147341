//! Secure channel runtime for the ptls lock protocol.
//!
//! Connects a [`SecureSession`](ptls_core::SecureSession) to a raw radio link:
//! - [`RawTransport`]: the boundary to an already-connected link
//! - `HandshakeOrchestrator`: attempts, hello timer, alert policy, retries
//! - [`SecureTransportWrapper`]: inbound demultiplexing and command sending
//! - Per-direction crypto queues keeping record order
//!
//! Built on tokio. Caller-visible progress arrives as [`SessionEvent`]s.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod event;
mod orchestrator;
mod queue;
pub mod raw;
pub mod wrapper;

pub use config::{ChannelRole, TransportConfig};
pub use error::{Error, Result};
pub use event::{CloseReason, RetryReason, SessionEvent};
pub use raw::RawTransport;
pub use wrapper::SecureTransportWrapper;
