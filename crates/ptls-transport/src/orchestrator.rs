//! Handshake orchestration.
//!
//! One dispatch loop per connection owns the [`HandshakeOrchestrator`] and
//! consumes a single channel of [`Dispatch`] events: inbound frames, results
//! of offloaded crypto, hello timer fires and the caller's close. Because
//! everything funnels through that loop, caller events are emitted strictly
//! in order and never concurrently.
//!
//! Handshake crypto (key generation, ECDH, ECDSA) runs on the blocking pool.
//! Each result carries the attempt number it was started for; results from a
//! superseded attempt, or arriving after close, are dropped.
//!
//! Attempt outcomes:
//! - ready: SessionInitialized processed, failure count reset
//! - retry: hello timeout, retryable alert, handshake error, failed write,
//!   or a rejected application record once ready
//! - close: fatal alert, security failure, the caller, or a configured
//!   attempt cap reached

use crate::config::{ChannelRole, TransportConfig};
use crate::event::{CloseReason, RetryReason, SessionEvent};
use crate::queue::SharedSession;
use crate::raw::RawTransport;
use ptls_core::frame::{server_verify_request, HandshakeChunk, HandshakeMessage};
use ptls_core::{ApplicationFrame, HandshakeTag, SecureSession};
use ptls_crypto::point::ENCODED_POINT_LEN;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

type CoreResult<T> = ptls_core::Result<T>;

/// Everything the dispatch loop reacts to.
#[derive(Debug)]
pub(crate) enum Dispatch {
    /// Handshake-channel frame, sequence nibble masked.
    Handshake(Vec<u8>),
    /// Application-channel or notification frame, sequence nibble masked.
    Application(Vec<u8>),
    HelloBuilt {
        attempt: u64,
        result: CoreResult<Vec<u8>>,
    },
    ServerHelloProcessed {
        attempt: u64,
        result: CoreResult<()>,
    },
    ClientVerifyBuilt {
        attempt: u64,
        result: CoreResult<Vec<HandshakeChunk>>,
    },
    HelloTimeout {
        attempt: u64,
    },
    /// Payload ready for the caller.
    Indication(Vec<u8>),
    /// An application record could not be sealed or opened.
    RecordFailed(String),
    /// Caller-initiated close.
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Establishing,
    Ready,
    Closed,
}

/// Drives handshake attempts for one [`SecureSession`].
pub(crate) struct HandshakeOrchestrator {
    raw: Arc<dyn RawTransport>,
    session: SharedSession,
    lock_public_key: [u8; ENCODED_POINT_LEN],
    config: TransportConfig,
    events: mpsc::UnboundedSender<SessionEvent>,
    dispatch: mpsc::UnboundedSender<Dispatch>,
    inbound: mpsc::UnboundedSender<ApplicationFrame>,
    closed: Arc<AtomicBool>,
    state: State,
    attempt: u64,
    /// Consecutive failed attempts since the last ready session.
    failures: u32,
    /// The current attempt's ClientHello is out and unanswered.
    awaiting_server_hello: bool,
    hello_timer: Option<JoinHandle<()>>,
}

/// Channels and shared state the orchestrator is wired to.
pub(crate) struct OrchestratorLinks {
    pub(crate) raw: Arc<dyn RawTransport>,
    pub(crate) session: SharedSession,
    pub(crate) events: mpsc::UnboundedSender<SessionEvent>,
    pub(crate) dispatch: mpsc::UnboundedSender<Dispatch>,
    pub(crate) inbound: mpsc::UnboundedSender<ApplicationFrame>,
    pub(crate) closed: Arc<AtomicBool>,
}

impl HandshakeOrchestrator {
    pub(crate) fn new(
        links: OrchestratorLinks,
        lock_public_key: [u8; ENCODED_POINT_LEN],
        config: TransportConfig,
    ) -> Self {
        Self {
            raw: links.raw,
            session: links.session,
            lock_public_key,
            config,
            events: links.events,
            dispatch: links.dispatch,
            inbound: links.inbound,
            closed: links.closed,
            state: State::Establishing,
            attempt: 0,
            failures: 0,
            awaiting_server_hello: false,
            hello_timer: None,
        }
    }

    /// Run the dispatch loop until the connection closes.
    pub(crate) async fn run(mut self, mut events: mpsc::UnboundedReceiver<Dispatch>) {
        self.begin_attempt();
        while let Some(event) = events.recv().await {
            self.handle(event).await;
            if self.state == State::Closed {
                break;
            }
        }
        self.cancel_hello_timer();
        tracing::debug!("dispatch loop stopped");
    }

    async fn handle(&mut self, event: Dispatch) {
        if self.closed.load(Ordering::Acquire) && !matches!(event, Dispatch::Close) {
            tracing::debug!("connection closed, ignoring {}", event_name(&event));
            return;
        }

        match event {
            Dispatch::Handshake(frame) => self.on_handshake_frame(frame).await,
            Dispatch::Application(frame) => self.on_application_frame(&frame),
            Dispatch::HelloBuilt { attempt, result } if self.is_current(attempt) => match result {
                Ok(hello) => {
                    if self.send_handshake(&HandshakeTag::Hello.frame(&hello)).await {
                        self.awaiting_server_hello = true;
                        self.arm_hello_timer();
                    }
                }
                Err(e) => self.fail(e).await,
            },
            Dispatch::ServerHelloProcessed { attempt, result } if self.is_current(attempt) => {
                match result {
                    Ok(()) => {
                        self.send_handshake(&server_verify_request(unix_time_ms()))
                            .await;
                    }
                    Err(e) => self.fail(e).await,
                }
            }
            Dispatch::ClientVerifyBuilt { attempt, result } if self.is_current(attempt) => {
                match result {
                    Ok(chunks) => {
                        for chunk in &chunks {
                            if !self.send_handshake(&chunk.to_frame()).await {
                                break;
                            }
                        }
                    }
                    Err(e) => self.fail(e).await,
                }
            }
            Dispatch::HelloTimeout { attempt } if self.is_current(attempt) => {
                tracing::info!(attempt, "no ServerHello before timeout");
                self.retry(RetryReason::HelloTimeout).await;
            }
            Dispatch::Indication(payload) => self.emit(SessionEvent::Indication(payload)),
            Dispatch::RecordFailed(reason) => self.on_record_failed(&reason).await,
            Dispatch::Close => self.close(CloseReason::Requested).await,
            stale => {
                tracing::debug!(
                    current = self.attempt,
                    "ignoring stale {}",
                    event_name(&stale)
                );
            }
        }
    }

    fn is_current(&self, attempt: u64) -> bool {
        attempt == self.attempt && self.state == State::Establishing
    }

    fn begin_attempt(&mut self) {
        self.attempt += 1;
        self.state = State::Establishing;
        self.awaiting_server_hello = false;
        tracing::debug!(attempt = self.attempt, "starting handshake attempt");
        self.offload(SecureSession::build_hello, |attempt, result| {
            Dispatch::HelloBuilt { attempt, result }
        });
    }

    /// Run `work` against the session on the blocking pool and post its
    /// result back tagged with the current attempt.
    fn offload<T, F>(&self, work: F, wrap: fn(u64, CoreResult<T>) -> Dispatch)
    where
        T: Send + 'static,
        F: FnOnce(&mut SecureSession) -> CoreResult<T> + Send + 'static,
    {
        let session = Arc::clone(&self.session);
        let dispatch = self.dispatch.clone();
        let closed = Arc::clone(&self.closed);
        let attempt = self.attempt;

        tokio::task::spawn_blocking(move || {
            if closed.load(Ordering::Acquire) {
                return;
            }
            let result = {
                let mut guard = session.blocking_write();
                work(&mut *guard)
            };
            let _ = dispatch.send(wrap(attempt, result));
        });
    }

    async fn on_handshake_frame(&mut self, frame: Vec<u8>) {
        if self.state != State::Establishing {
            tracing::debug!("handshake frame outside a handshake, dropped");
            return;
        }
        let message = match HandshakeMessage::parse(&frame) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed handshake frame");
                return;
            }
        };

        match message {
            HandshakeMessage::Hello(body) => {
                // A reply to a superseded ClientHello, or a duplicate.
                if !self.awaiting_server_hello {
                    tracing::debug!(attempt = self.attempt, "unexpected ServerHello dropped");
                    return;
                }
                self.awaiting_server_hello = false;
                self.cancel_hello_timer();
                self.offload(
                    move |session| session.parse_hello(&body),
                    |attempt, result| Dispatch::ServerHelloProcessed { attempt, result },
                );
            }
            HandshakeMessage::ServerVerify(record) => {
                let lock_key = self.lock_public_key;
                self.offload(
                    move |session| {
                        session.parse_verify(&record)?;
                        if !session.peer_verify(&lock_key)? {
                            tracing::error!("ServerVerify signature does not match the lock key");
                        }
                        session.verify()
                    },
                    |attempt, result| Dispatch::ClientVerifyBuilt { attempt, result },
                );
            }
            HandshakeMessage::Alert(code) => {
                self.cancel_hello_timer();
                tracing::warn!(alert = ?code, "lock sent alert");
                match CloseReason::from_alert(code) {
                    Some(reason) => self.close(reason).await,
                    None => self.retry(RetryReason::Alert(code)).await,
                }
            }
            HandshakeMessage::SessionInitialized(payload) => {
                self.cancel_hello_timer();
                let ready = {
                    let mut session = self.session.write().await;
                    session
                        .ready(&payload)
                        .map(|()| session.session_id().unwrap_or_default())
                };
                match ready {
                    Ok(session_id) => {
                        self.state = State::Ready;
                        self.failures = 0;
                        self.emit(SessionEvent::Ready(session_id));
                    }
                    Err(e) => self.fail(e).await,
                }
            }
        }
    }

    fn on_application_frame(&mut self, frame: &[u8]) {
        match ApplicationFrame::parse(frame) {
            Ok(frame) => {
                if self.inbound.send(frame).is_err() {
                    tracing::warn!("inbound queue stopped, application frame dropped");
                }
            }
            Err(e) => tracing::warn!(error = %e, "dropping malformed application frame"),
        }
    }

    async fn on_record_failed(&mut self, reason: &str) {
        if self.state != State::Ready {
            tracing::debug!(reason, "record failure outside an established session");
            return;
        }
        tracing::warn!(reason, "application record failed, session cleared");
        self.retry(RetryReason::RecordRejected).await;
    }

    /// Write a handshake frame. A failed write ends the attempt.
    async fn send_handshake(&mut self, frame: &[u8]) -> bool {
        match self.raw.write(ChannelRole::HandshakeSend, frame).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "handshake write failed");
                self.retry(RetryReason::Transport).await;
                false
            }
        }
    }

    async fn fail(&mut self, error: ptls_core::Error) {
        if error.is_security_failure() {
            tracing::error!(error = %error, "lock failed a security check");
            self.close(CloseReason::AuthenticationFailed).await;
        } else {
            tracing::warn!(error = %error, "handshake step failed");
            self.retry(RetryReason::HandshakeError).await;
        }
    }

    async fn retry(&mut self, reason: RetryReason) {
        self.cancel_hello_timer();
        self.failures += 1;
        let exhausted = self
            .config
            .max_handshake_attempts
            .is_some_and(|cap| self.failures >= cap.max(1));
        if exhausted {
            tracing::error!(failures = self.failures, "handshake attempts exhausted");
            self.close(CloseReason::AttemptsExhausted).await;
            return;
        }

        self.session.write().await.reset_session();
        tracing::info!(?reason, failures = self.failures, "re-establishing secure session");
        self.emit(SessionEvent::Reconnecting(reason));
        self.begin_attempt();
    }

    async fn close(&mut self, reason: CloseReason) {
        self.cancel_hello_timer();
        self.closed.store(true, Ordering::Release);
        self.session.write().await.terminate();
        self.state = State::Closed;

        if reason == CloseReason::Requested {
            tracing::info!("secure connection closed");
        } else {
            tracing::error!(?reason, "secure connection closed");
        }
        self.emit(SessionEvent::Closed(reason));
    }

    fn arm_hello_timer(&mut self) {
        self.cancel_hello_timer();
        let dispatch = self.dispatch.clone();
        let attempt = self.attempt;
        let timeout = self.config.hello_timeout();

        self.hello_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = dispatch.send(Dispatch::HelloTimeout { attempt });
        }));
    }

    fn cancel_hello_timer(&mut self) {
        if let Some(timer) = self.hello_timer.take() {
            timer.abort();
        }
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("event receiver dropped");
        }
    }
}

fn event_name(event: &Dispatch) -> &'static str {
    match event {
        Dispatch::Handshake(_) => "handshake frame",
        Dispatch::Application(_) => "application frame",
        Dispatch::HelloBuilt { .. } => "ClientHello",
        Dispatch::ServerHelloProcessed { .. } => "ServerHello result",
        Dispatch::ClientVerifyBuilt { .. } => "ClientVerify",
        Dispatch::HelloTimeout { .. } => "hello timeout",
        Dispatch::Indication(_) => "indication",
        Dispatch::RecordFailed(_) => "record failure",
        Dispatch::Close => "close",
    }
}

fn unix_time_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}
