//! End-to-end secure transport scenarios against a simulated lock.
//!
//! **Test Categories:**
//! 1. Establishment and application traffic
//! 2. Retry policy (hello timeout, retryable alerts, record rejection)
//! 3. Terminal outcomes (fatal alerts, authentication, exhaustion, close)


use ptls_core::mock::MockLock;
use ptls_core::{AlertCode, Command, Phase};
use ptls_platform::mock::MockKeyProvider;
use ptls_transport::{
    ChannelRole, CloseReason, Error, RetryReason, SecureTransportWrapper, SessionEvent,
    TransportConfig,
};
use std::sync::Arc;
use std::time::Duration;
use test_helpers::{
    assert_quiet, init_tracing, next_event, LockBehavior, LoopbackLock, FAST_HELLO_TIMEOUT_MS,
};
use tokio::sync::mpsc;

fn fast_config() -> TransportConfig {
    TransportConfig {
        hello_timeout_ms: FAST_HELLO_TIMEOUT_MS,
        ..TransportConfig::default()
    }
}

async fn connect(
    link: &Arc<LoopbackLock>,
    config: TransportConfig,
) -> (SecureTransportWrapper, mpsc::UnboundedReceiver<SessionEvent>) {
    init_tracing();
    let provider = MockKeyProvider::new_deterministic();
    SecureTransportWrapper::connect(
        Arc::clone(link) as Arc<dyn ptls_transport::RawTransport>,
        link.certificate(),
        &provider,
        config,
    )
    .await
    .expect("connect failed")
}

// ================================================================================================
// CATEGORY 1: Establishment and application traffic
// ================================================================================================

/// Scenario A: fresh pairing, then one encrypted command.
#[tokio::test]
async fn test_fresh_pairing_and_command() {
    let link = LoopbackLock::normal();
    let (wrapper, mut events) = connect(&link, fast_config()).await;

    let SessionEvent::Ready(session_id) = next_event(&mut events).await else {
        panic!("expected Ready");
    };
    assert_eq!(hex::encode(session_id.as_bytes()), "5e551001");
    assert!(wrapper.is_established().await);
    assert_eq!(wrapper.session_id().await, Some(session_id));

    // The first hello carries no resumption id.
    let written = link.written();
    let (channel, hello) = &written[0];
    assert_eq!(*channel, ChannelRole::HandshakeSend);
    assert_eq!(hello[0], 3);
    assert_eq!(&hello[hello.len() - 4..], &[0, 0, 0, 0]);

    wrapper
        .send_command(Command::new(b'A', vec![b'A']))
        .await
        .unwrap();

    let (channel, frame) = link.written().last().cloned().unwrap();
    assert_eq!(channel, ChannelRole::ApplicationSend);
    assert_eq!(frame.len(), 19);
    assert_eq!(frame[0], 0x01);
    assert_eq!(link.commands(), vec![b"AA".to_vec()]);

    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Indication(b"AA".to_vec())
    );
}

#[tokio::test]
async fn test_client_verify_sent_in_order() {
    let link = LoopbackLock::new(MockLock::new().with_max_packet_size(16), LockBehavior::Normal);
    let (_wrapper, mut events) = connect(&link, fast_config()).await;
    assert!(matches!(next_event(&mut events).await, SessionEvent::Ready(_)));

    let tags: Vec<u8> = link
        .written()
        .iter()
        .filter(|(channel, _)| *channel == ChannelRole::HandshakeSend)
        .map(|(_, frame)| frame[0])
        .collect();
    let (last, verify) = tags[2..].split_last().unwrap();
    assert_eq!(&tags[..2], &[3, 5]);
    assert_eq!(*last, 7);
    assert!(verify.len() > 1);
    assert!(verify.iter().all(|&tag| tag == 6));
}

#[tokio::test]
async fn test_commands_keep_order() {
    let link = LoopbackLock::normal();
    let (wrapper, mut events) = connect(&link, fast_config()).await;
    assert!(matches!(next_event(&mut events).await, SessionEvent::Ready(_)));

    for opcode in 0u8..8 {
        wrapper
            .send_command(Command::new(opcode, vec![opcode; 3]))
            .await
            .unwrap();
    }
    for opcode in 0u8..8 {
        assert_eq!(
            next_event(&mut events).await,
            SessionEvent::Indication(vec![opcode, opcode, opcode, opcode])
        );
    }
    assert_eq!(link.commands().len(), 8);
}

#[tokio::test]
async fn test_command_before_ready_is_not_connected() {
    let link = LoopbackLock::new(MockLock::new(), LockBehavior::Silent);
    let (wrapper, _events) = connect(&link, TransportConfig::default()).await;

    let result = wrapper.send_command(Command::new(0x51, vec![0])).await;
    assert!(matches!(result, Err(Error::NotConnected)));
    assert!(link
        .written()
        .iter()
        .all(|(channel, _)| *channel != ChannelRole::ApplicationSend));
}

#[tokio::test]
async fn test_cleartext_command_without_session() {
    let link = LoopbackLock::new(MockLock::new(), LockBehavior::Silent);
    let (wrapper, mut events) = connect(&link, TransportConfig::default()).await;

    wrapper
        .send_cleartext(Command::new(0x0C, vec![1, 2]))
        .await
        .unwrap();
    assert_eq!(link.commands(), vec![vec![0x0C, 1, 2]]);
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Indication(vec![0x0C, 1, 2])
    );
}

#[tokio::test]
async fn test_malformed_frames_are_dropped() {
    let link = LoopbackLock::normal();
    let (wrapper, mut events) = connect(&link, fast_config()).await;
    assert!(matches!(next_event(&mut events).await, SessionEvent::Ready(_)));

    link.inject(ChannelRole::HandshakeReceive, vec![0x0F, 0xAA]).await;
    link.inject(ChannelRole::ApplicationReceive, vec![0x02, 0xAA]).await;
    link.inject(ChannelRole::ApplicationReceive, Vec::new()).await;
    assert_quiet(&mut events, Duration::from_millis(200)).await;

    wrapper.send_command(Command::new(0x01, vec![])).await.unwrap();
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Indication(vec![0x01])
    );
}

#[tokio::test]
async fn test_async_notification_forwarded() {
    let link = LoopbackLock::normal();
    let (_wrapper, mut events) = connect(&link, fast_config()).await;
    assert!(matches!(next_event(&mut events).await, SessionEvent::Ready(_)));

    let mut frame = vec![0x01];
    frame.extend(link.seal(b"state changed"));
    // Upper nibble is a sequence counter and must be ignored.
    frame[0] |= 0x70;
    link.inject(ChannelRole::AsyncNotify, frame).await;

    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Indication(b"state changed".to_vec())
    );
}

#[tokio::test]
async fn test_resumption_id_from_config() {
    let link = LoopbackLock::new(MockLock::new(), LockBehavior::Silent);
    let config = TransportConfig {
        resumption_session_id: Some(ptls_core::SessionId::new([1, 2, 3, 4])),
        ..TransportConfig::default()
    };
    let (_wrapper, _events) = connect(&link, config).await;

    tokio::time::timeout(Duration::from_secs(5), async {
        while link.hello_count() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    let (_, hello) = link.written()[0].clone();
    assert_eq!(&hello[hello.len() - 4..], &[1, 2, 3, 4]);
}

// ================================================================================================
// CATEGORY 2: Retry policy
// ================================================================================================

/// Scenario B: no ServerHello in time means a second ClientHello.
#[tokio::test]
async fn test_hello_timeout_retries() {
    let link = LoopbackLock::new(MockLock::new(), LockBehavior::IgnoreHellos(1));
    let (_wrapper, mut events) = connect(&link, fast_config()).await;

    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Reconnecting(RetryReason::HelloTimeout)
    );
    assert!(matches!(next_event(&mut events).await, SessionEvent::Ready(_)));
    assert_eq!(link.hello_count(), 2);
}

/// A ServerHello answering a superseded ClientHello does not disturb the
/// current attempt.
#[tokio::test]
async fn test_late_server_hello_is_ignored() {
    let link = LoopbackLock::new(MockLock::new(), LockBehavior::LateServerHello);
    let (wrapper, mut events) = connect(&link, fast_config()).await;

    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Reconnecting(RetryReason::HelloTimeout)
    );
    assert!(matches!(next_event(&mut events).await, SessionEvent::Ready(_)));
    assert_quiet(&mut events, Duration::from_millis(300)).await;
    assert_eq!(link.hello_count(), 2);
    assert!(wrapper.is_established().await);
}

/// Without a cap, timeouts keep producing fresh hellos.
#[tokio::test]
async fn test_default_config_retries_past_three_failures() {
    let link = LoopbackLock::new(MockLock::new(), LockBehavior::IgnoreHellos(4));
    let (_wrapper, mut events) = connect(&link, fast_config()).await;

    for _ in 0..4 {
        assert_eq!(
            next_event(&mut events).await,
            SessionEvent::Reconnecting(RetryReason::HelloTimeout)
        );
    }
    assert!(matches!(next_event(&mut events).await, SessionEvent::Ready(_)));
    assert_eq!(link.hello_count(), 5);
}

#[tokio::test]
async fn test_retryable_alert_then_exhaustion() {
    let link = LoopbackLock::new(MockLock::new(), LockBehavior::AlertOnHello(1));
    let config = TransportConfig {
        max_handshake_attempts: Some(3),
        ..fast_config()
    };
    let (wrapper, mut events) = connect(&link, config).await;

    for _ in 0..2 {
        assert_eq!(
            next_event(&mut events).await,
            SessionEvent::Reconnecting(RetryReason::Alert(AlertCode::Error))
        );
    }
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Closed(CloseReason::AttemptsExhausted)
    );
    assert_eq!(link.hello_count(), 3);
    assert!(wrapper.is_closed());
}

#[tokio::test]
async fn test_unassigned_alert_is_retryable() {
    let link = LoopbackLock::new(MockLock::new(), LockBehavior::AlertOnce(4));
    let (_wrapper, mut events) = connect(&link, fast_config()).await;

    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Reconnecting(RetryReason::Alert(AlertCode::Unknown(4)))
    );
    assert!(matches!(next_event(&mut events).await, SessionEvent::Ready(_)));
}

/// Scenario D: a corrupted record clears the session and reconnects once.
#[tokio::test]
async fn test_rejected_record_reconnects_once() {
    let link = LoopbackLock::normal();
    let (wrapper, mut events) = connect(&link, fast_config()).await;
    assert!(matches!(next_event(&mut events).await, SessionEvent::Ready(_)));

    let mut record = link.seal(b"status");
    let last = record.len() - 1;
    record[last] ^= 0x01;
    let mut frame = vec![0x01];
    frame.extend(record);
    link.inject(ChannelRole::ApplicationReceive, frame).await;

    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Reconnecting(RetryReason::RecordRejected)
    );
    assert!(matches!(next_event(&mut events).await, SessionEvent::Ready(_)));
    assert_quiet(&mut events, Duration::from_millis(200)).await;

    // Clearing dropped the resumption id, so the new hello started fresh.
    assert!(!link.resumed());
    assert!(wrapper.is_established().await);
}

// ================================================================================================
// CATEGORY 3: Terminal outcomes
// ================================================================================================

/// Scenario C: no trusted time ends the connection without retrying.
#[tokio::test]
async fn test_no_trusted_time_is_fatal() {
    let link = LoopbackLock::new(MockLock::new(), LockBehavior::AlertOnHello(2));
    let (wrapper, mut events) = connect(&link, fast_config()).await;

    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Closed(CloseReason::NoTrustedTime)
    );
    assert_quiet(&mut events, Duration::from_millis(300)).await;
    assert_eq!(link.hello_count(), 1);
    assert!(wrapper.is_closed());
    assert_eq!(wrapper.phase().await, Phase::Terminated);
}

#[tokio::test]
async fn test_fatal_alerts_map_to_close_reasons() {
    for (code, reason) in [
        (5u8, CloseReason::InvalidCertificate),
        (6u8, CloseReason::NotRegistered),
    ] {
        let link = LoopbackLock::new(MockLock::new(), LockBehavior::AlertOnHello(code));
        let (_wrapper, mut events) = connect(&link, fast_config()).await;
        assert_eq!(next_event(&mut events).await, SessionEvent::Closed(reason));
        assert_eq!(link.hello_count(), 1);
    }
}

#[tokio::test]
async fn test_wrong_lock_key_fails_authentication() {
    init_tracing();
    let link = LoopbackLock::normal();
    let impostor_certificate = MockLock::new().certificate();
    let provider = MockKeyProvider::new_deterministic();

    let (_wrapper, mut events) = SecureTransportWrapper::connect(
        Arc::clone(&link) as Arc<dyn ptls_transport::RawTransport>,
        impostor_certificate,
        &provider,
        fast_config(),
    )
    .await
    .unwrap();

    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Closed(CloseReason::AuthenticationFailed)
    );
    // No ClientVerify was sent.
    assert!(link
        .written()
        .iter()
        .all(|(_, frame)| frame[0] != 6 && frame[0] != 7));
}

#[tokio::test]
async fn test_missing_identity_fails_connect() {
    init_tracing();
    let link = LoopbackLock::normal();
    let provider = MockKeyProvider::new_empty();

    let result = SecureTransportWrapper::connect(
        Arc::clone(&link) as Arc<dyn ptls_transport::RawTransport>,
        link.certificate(),
        &provider,
        TransportConfig::default(),
    )
    .await;

    assert!(matches!(result, Err(Error::MissingIdentity)));
    assert_eq!(link.subscription_count(), 0);
    assert!(link.written().is_empty());
}

#[tokio::test]
async fn test_close_is_final() {
    let link = LoopbackLock::normal();
    let (wrapper, mut events) = connect(&link, fast_config()).await;
    assert!(matches!(next_event(&mut events).await, SessionEvent::Ready(_)));

    wrapper.close().await;
    assert!(wrapper.is_closed());
    assert_eq!(wrapper.phase().await, Phase::Terminated);
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Closed(CloseReason::Requested)
    );

    let result = wrapper.send_command(Command::new(0x51, vec![0])).await;
    assert!(matches!(result, Err(Error::Closed)));

    // A second close is a no-op.
    wrapper.close().await;
    assert_quiet(&mut events, Duration::from_millis(200)).await;
}

#[tokio::test]
async fn test_close_during_handshake_stops_retries() {
    let link = LoopbackLock::new(MockLock::new(), LockBehavior::Silent);
    let (wrapper, mut events) = connect(&link, fast_config()).await;

    wrapper.close().await;
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Closed(CloseReason::Requested)
    );
    let hellos = link.hello_count();
    tokio::time::sleep(Duration::from_millis(FAST_HELLO_TIMEOUT_MS * 3)).await;
    assert_eq!(link.hello_count(), hellos);
}
