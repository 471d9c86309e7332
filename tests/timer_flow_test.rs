//! Timer-driven lifecycle flows, run against tokio's paused clock so the
//! full retransmission and linger schedules complete instantly.

use std::time::Duration;

use serial_test::serial;
use sip_transaction_core::{
    MessageView, Method, Party, Role, TimerSettings, TransactionEvent, TransactionFlags,
    TransactionManager, TransactionState, Via,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}

fn invite(call_id: &str, branch: &str) -> MessageView {
    MessageView::new(
        Method::Invite,
        call_id,
        Party::new("sip:alice@example.com", Some("from-tag-1")),
        Party::new("sip:bob@example.com", None),
        1,
        Via::new("UDP", "client.example.com:5060", Some(branch)),
        Some("sip:bob@example.com"),
    )
}

#[tokio::test(start_paused = true)]
#[serial]
async fn unanswered_request_retransmits_then_times_out() {
    init_tracing();
    let (manager, mut events) = TransactionManager::new(8, TimerSettings::default());
    let message = invite("timeout@example.com", "z9hG4bK-t1");
    let handle = manager
        .create_transaction(Role::Client, &message, TransactionFlags::default())
        .unwrap();
    manager.index_transaction(handle).unwrap();
    manager.arm_retransmit(handle).unwrap();

    // Rounds 1..6 request a resend; round 7 hits the ceiling.
    for round in 1..=6u8 {
        assert_eq!(
            events.recv().await,
            Some(TransactionEvent::RetransmitRequired { handle, round })
        );
    }
    assert_eq!(
        events.recv().await,
        Some(TransactionEvent::TimedOut { handle })
    );
    assert_eq!(
        events.recv().await,
        Some(TransactionEvent::Terminated { handle })
    );
    assert_eq!(manager.active_transactions(), 0);
}

#[tokio::test(start_paused = true)]
#[serial]
async fn final_response_stops_retransmissions_and_lingers() {
    let settings = TimerSettings {
        invite_linger: Duration::from_secs(2),
        ..Default::default()
    };
    init_tracing();
    let (manager, mut events) = TransactionManager::new(8, settings);
    let message = invite("answered@example.com", "z9hG4bK-a1");
    let handle = manager
        .create_transaction(Role::Server, &message, TransactionFlags::default())
        .unwrap();
    manager.index_transaction(handle).unwrap();
    manager.arm_retransmit(handle).unwrap();

    // First retransmission goes out, then the final response lands.
    assert_eq!(
        events.recv().await,
        Some(TransactionEvent::RetransmitRequired { handle, round: 1 })
    );
    manager.record_final_response(handle, 486).unwrap();
    assert_eq!(manager.state(handle).unwrap(), TransactionState::Completed);

    // The linger window elapses and the transaction is reclaimed; no
    // further retransmission events arrive in between.
    assert_eq!(
        events.recv().await,
        Some(TransactionEvent::Terminated { handle })
    );
    assert_eq!(manager.active_transactions(), 0);
}

#[tokio::test(start_paused = true)]
#[serial]
async fn provisional_timeout_fires_when_enabled() {
    let settings = TimerSettings {
        provisional: Duration::from_secs(10),
        ..Default::default()
    };
    init_tracing();
    let (manager, mut events) = TransactionManager::new(8, settings);
    let message = invite("prov@example.com", "z9hG4bK-p1");
    let handle = manager
        .create_transaction(Role::Client, &message, TransactionFlags::default())
        .unwrap();
    manager.index_transaction(handle).unwrap();
    manager.arm_provisional(handle).unwrap();

    assert_eq!(
        events.recv().await,
        Some(TransactionEvent::ProvisionalTimeout { handle })
    );
    // Provisional timeout is advisory; the transaction stays alive.
    assert_eq!(manager.state(handle).unwrap(), TransactionState::Active);
}

#[tokio::test(start_paused = true)]
#[serial]
async fn disabled_provisional_timer_never_fires() {
    let settings = TimerSettings {
        provisional: Duration::ZERO,
        ..Default::default()
    };
    init_tracing();
    let (manager, mut events) = TransactionManager::new(8, settings);
    let message = invite("noprov@example.com", "z9hG4bK-n1");
    let handle = manager
        .create_transaction(Role::Client, &message, TransactionFlags::default())
        .unwrap();
    manager.index_transaction(handle).unwrap();
    manager.arm_provisional(handle).unwrap();

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert!(events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
#[serial]
async fn unanswered_cancel_gives_up_and_terminates() {
    init_tracing();
    let (manager, mut events) = TransactionManager::new(8, TimerSettings::default());
    let message = invite("cancelled@example.com", "z9hG4bK-c1");
    let handle = manager
        .create_transaction(Role::Client, &message, TransactionFlags::default())
        .unwrap();
    manager.index_transaction(handle).unwrap();
    manager.arm_cancel_no_response(handle).unwrap();

    assert_eq!(
        events.recv().await,
        Some(TransactionEvent::CancelNoResponse { handle })
    );
    assert_eq!(
        events.recv().await,
        Some(TransactionEvent::Terminated { handle })
    );
}

#[tokio::test(start_paused = true)]
#[serial]
async fn termination_silences_pending_timers() {
    init_tracing();
    let (manager, mut events) = TransactionManager::new(8, TimerSettings::default());
    let message = invite("silence@example.com", "z9hG4bK-s1");
    let handle = manager
        .create_transaction(Role::Client, &message, TransactionFlags::default())
        .unwrap();
    manager.index_transaction(handle).unwrap();
    manager.arm_retransmit(handle).unwrap();
    manager.arm_provisional(handle).unwrap();

    manager.terminate_transaction(handle);
    assert_eq!(
        events.recv().await,
        Some(TransactionEvent::Terminated { handle })
    );

    // Let every configured interval elapse; nothing else may arrive.
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert!(events.try_recv().is_err());
}
