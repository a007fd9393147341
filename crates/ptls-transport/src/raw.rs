//! Boundary to the already-connected radio link.

use crate::config::ChannelRole;
use crate::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Raw frame transport to one lock.
///
/// Implementations own discovery and connection; the secure channel only
/// writes whole frames and consumes inbound frames per channel.
#[async_trait]
pub trait RawTransport: Send + Sync + 'static {
    /// Write one frame to a send channel.
    async fn write(&self, channel: ChannelRole, frame: &[u8]) -> Result<()>;

    /// Start receiving frames from a receive channel.
    ///
    /// The stream ends when the link goes down.
    async fn subscribe(&self, channel: ChannelRole) -> Result<mpsc::Receiver<Vec<u8>>>;
}
