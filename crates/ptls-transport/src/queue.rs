//! Per-direction crypto queues.
//!
//! The record nonce is a message counter, so records must be sealed in the
//! order they are written and opened in the order they arrive. Each direction
//! is one task draining a channel, which keeps that order without holding up
//! the dispatch loop.

use crate::config::ChannelRole;
use crate::orchestrator::Dispatch;
use crate::raw::RawTransport;
use crate::{Error, Result};
use ptls_core::{ApplicationFrame, Command, SecureSession};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;

/// Session shared by the dispatch loop and both queues.
pub(crate) type SharedSession = Arc<RwLock<SecureSession>>;

/// How an outbound command is framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OutboundKind {
    Encrypted,
    Cleartext,
}

/// One queued application write and the caller waiting on it.
pub(crate) struct OutboundJob {
    pub(crate) command: Command,
    pub(crate) kind: OutboundKind,
    pub(crate) reply: oneshot::Sender<Result<()>>,
}

/// Open inbound application frames in arrival order.
///
/// Opened payloads and record failures are posted back to the dispatch loop
/// so callers see them in order with every other event.
pub(crate) fn spawn_inbound(
    session: SharedSession,
    mut frames: mpsc::UnboundedReceiver<ApplicationFrame>,
    dispatch: mpsc::UnboundedSender<Dispatch>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            let outcome = match frame {
                ApplicationFrame::Cleartext(payload) => Dispatch::Indication(payload),
                ApplicationFrame::Ciphertext(record) => {
                    let opened = session.write().await.read(&record);
                    match opened {
                        Ok(Some(plaintext)) => Dispatch::Indication(plaintext.to_vec()),
                        Ok(None) => continue,
                        Err(e) => Dispatch::RecordFailed(e.to_string()),
                    }
                }
            };
            if dispatch.send(outcome).is_err() {
                break;
            }
        }
    })
}

/// Seal and write outbound commands in submission order.
pub(crate) fn spawn_outbound(
    session: SharedSession,
    raw: Arc<dyn RawTransport>,
    mut jobs: mpsc::UnboundedReceiver<OutboundJob>,
    dispatch: mpsc::UnboundedSender<Dispatch>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(job) = jobs.recv().await {
            let result = send_one(&session, raw.as_ref(), &dispatch, &job.command, job.kind).await;
            // The caller may have stopped waiting.
            let _ = job.reply.send(result);
        }
    })
}

async fn send_one(
    session: &SharedSession,
    raw: &dyn RawTransport,
    dispatch: &mpsc::UnboundedSender<Dispatch>,
    command: &Command,
    kind: OutboundKind,
) -> Result<()> {
    let frame = match kind {
        OutboundKind::Cleartext => command.cleartext_frame(),
        OutboundKind::Encrypted => {
            let sealed = {
                let mut guard = session.write().await;
                command.encrypted_frame(&mut guard)
            };
            match sealed {
                Ok(frame) => frame,
                Err(ptls_core::Error::NotEstablished) => return Err(Error::NotConnected),
                Err(e) => {
                    // The session cleared itself; the dispatch loop re-handshakes.
                    let _ = dispatch.send(Dispatch::RecordFailed(e.to_string()));
                    return Err(e.into());
                }
            }
        }
    };
    raw.write(ChannelRole::ApplicationSend, &frame).await
}
