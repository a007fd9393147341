//! Secure channel over a raw lock transport.

use crate::config::{ChannelRole, TransportConfig};
use crate::event::SessionEvent;
use crate::orchestrator::{Dispatch, HandshakeOrchestrator, OrchestratorLinks};
use crate::queue::{self, OutboundJob, OutboundKind, SharedSession};
use crate::raw::RawTransport;
use crate::{Error, Result};
use ptls_core::frame::strip_sequence;
use ptls_core::{Command, DeviceCertificate, Phase, SecureSession, SessionId};
use ptls_platform::IdentityKeyProvider;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;

/// Secure connection to one lock.
///
/// Owns the raw transport's inbound streams, the handshake dispatch loop and
/// both crypto queues. Progress is reported on the event receiver returned by
/// [`SecureTransportWrapper::connect`].
///
/// # Example
///
/// ```no_run
/// # use std::sync::Arc;
/// # use ptls_core::{Command, DeviceCertificate};
/// # use ptls_platform::IdentityKeyProvider;
/// # use ptls_transport::{RawTransport, SecureTransportWrapper, SessionEvent, TransportConfig};
/// # async fn example(
/// #     raw: Arc<dyn RawTransport>,
/// #     certificate: DeviceCertificate,
/// #     provider: &dyn IdentityKeyProvider,
/// # ) -> ptls_transport::Result<()> {
/// let (wrapper, mut events) =
///     SecureTransportWrapper::connect(raw, certificate, provider, TransportConfig::default())
///         .await?;
///
/// while let Some(event) = events.recv().await {
///     if let SessionEvent::Ready(_) = event {
///         wrapper.send_command(Command::new(0x51, vec![0x00])).await?;
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct SecureTransportWrapper {
    session: SharedSession,
    dispatch: mpsc::UnboundedSender<Dispatch>,
    outbound: mpsc::UnboundedSender<OutboundJob>,
    closed: Arc<AtomicBool>,
    /// Inbound stream readers, stopped on close.
    readers: Vec<JoinHandle<()>>,
    /// Dispatch loop and crypto queues.
    workers: Vec<JoinHandle<()>>,
}

impl SecureTransportWrapper {
    /// Subscribe to the lock's channels and start the first handshake.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingIdentity`] without touching the transport when
    /// the provider has no identity key pair, and propagates provider and
    /// subscription failures.
    pub async fn connect(
        raw: Arc<dyn RawTransport>,
        certificate: DeviceCertificate,
        provider: &dyn IdentityKeyProvider,
        config: TransportConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SessionEvent>)> {
        let identity = provider.get_identity()?.ok_or_else(|| {
            tracing::error!("no identity key pair, secure session not started");
            Error::MissingIdentity
        })?;

        let lock_public_key = *certificate.device_public_key();
        let mut session =
            SecureSession::with_config(Arc::new(certificate), identity, config.session.clone());
        if let Some(session_id) = config.resumption_session_id {
            session = session.with_resumption(session_id);
        }
        let session = Arc::new(RwLock::new(session));

        let handshake_rx = raw.subscribe(ChannelRole::HandshakeReceive).await?;
        let application_rx = raw.subscribe(ChannelRole::ApplicationReceive).await?;
        let notify_rx = raw.subscribe(ChannelRole::AsyncNotify).await?;

        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));

        let readers = vec![
            forward(handshake_rx, dispatch_tx.clone(), Dispatch::Handshake),
            forward(application_rx, dispatch_tx.clone(), Dispatch::Application),
            forward(notify_rx, dispatch_tx.clone(), Dispatch::Application),
        ];

        let orchestrator = HandshakeOrchestrator::new(
            OrchestratorLinks {
                raw: Arc::clone(&raw),
                session: Arc::clone(&session),
                events: events_tx,
                dispatch: dispatch_tx.clone(),
                inbound: inbound_tx,
                closed: Arc::clone(&closed),
            },
            lock_public_key,
            config,
        );
        let workers = vec![
            queue::spawn_inbound(Arc::clone(&session), inbound_rx, dispatch_tx.clone()),
            queue::spawn_outbound(
                Arc::clone(&session),
                Arc::clone(&raw),
                outbound_rx,
                dispatch_tx.clone(),
            ),
            tokio::spawn(orchestrator.run(dispatch_rx)),
        ];

        tracing::debug!("secure transport wrapper started");
        Ok((
            Self {
                session,
                dispatch: dispatch_tx,
                outbound: outbound_tx,
                closed,
                readers,
                workers,
            },
            events_rx,
        ))
    }

    /// Encrypt a command and write it to the application channel.
    ///
    /// # Errors
    ///
    /// [`Error::NotConnected`] before the session is established,
    /// [`Error::Closed`] after close.
    pub async fn send_command(&self, command: Command) -> Result<()> {
        self.enqueue(command, OutboundKind::Encrypted).await
    }

    /// Write a command on the cleartext provisioning channel.
    ///
    /// Does not require an established session.
    pub async fn send_cleartext(&self, command: Command) -> Result<()> {
        self.enqueue(command, OutboundKind::Cleartext).await
    }

    async fn enqueue(&self, command: Command, kind: OutboundKind) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        let (reply, response) = oneshot::channel();
        self.outbound
            .send(OutboundJob {
                command,
                kind,
                reply,
            })
            .map_err(|_| Error::Closed)?;
        response.await.map_err(|_| Error::Closed)?
    }

    /// Close the connection.
    ///
    /// Key material is wiped before this returns; `SessionEvent::Closed` is
    /// delivered once pending events have drained. Calling it again, or
    /// after a fatal close, does nothing.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.session.write().await.terminate();
        for reader in &self.readers {
            reader.abort();
        }
        let _ = self.dispatch.send(Dispatch::Close);
    }

    /// Whether the connection has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Whether application records may be exchanged.
    pub async fn is_established(&self) -> bool {
        self.session.read().await.is_established()
    }

    /// Current session phase.
    pub async fn phase(&self) -> Phase {
        self.session.read().await.phase()
    }

    /// Session id to persist for resumption.
    pub async fn session_id(&self) -> Option<SessionId> {
        self.session.read().await.session_id()
    }
}

impl Drop for SecureTransportWrapper {
    fn drop(&mut self) {
        for task in self.readers.iter().chain(&self.workers) {
            task.abort();
        }
    }
}

impl std::fmt::Debug for SecureTransportWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureTransportWrapper")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Forward one inbound stream to the dispatch loop, masking the sequence
/// nibble.
fn forward(
    mut frames: mpsc::Receiver<Vec<u8>>,
    dispatch: mpsc::UnboundedSender<Dispatch>,
    wrap: fn(Vec<u8>) -> Dispatch,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(mut frame) = frames.recv().await {
            match strip_sequence(&mut frame) {
                Some(sequence) => tracing::trace!(sequence, len = frame.len(), "inbound frame"),
                None => {
                    tracing::warn!("dropping empty frame");
                    continue;
                }
            }
            if dispatch.send(wrap(frame)).is_err() {
                break;
            }
        }
        tracing::debug!("inbound stream ended");
    })
}
