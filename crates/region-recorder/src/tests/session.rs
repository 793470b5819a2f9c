use crate::{
    coordinator::{PendingTimer, Phase, Session, TimerKind},
    protocol::TabId,
};

use std::time::Duration;

fn sleeping_timer(id: u64, kind: TimerKind) -> (PendingTimer, tokio::task::JoinHandle<()>) {
    let task = tokio::spawn(tokio::time::sleep(Duration::from_secs(60)));
    let timer = PendingTimer {
        id,
        kind,
        abort: task.abort_handle(),
    };
    (timer, task)
}

/// WHAT: Installing a timer cancels the one already pending
/// WHY: A session has at most one live timer
#[tokio::test]
async fn given_pending_timer_when_setting_another_then_first_aborted() {
    // Given: A session with a start-delay timer
    let mut session = Session::new(TabId(1));
    let (first, first_task) = sleeping_timer(1, TimerKind::StartDelay);
    session.set_timer(first);

    // When: Installing an auto-stop timer
    let (second, second_task) = sleeping_timer(2, TimerKind::AutoStop);
    session.set_timer(second);

    // Then: Only the second is pending and the first task was cancelled
    assert_eq!(session.pending_timer(), Some(TimerKind::AutoStop));
    assert!(first_task.await.is_err_and(|e| e.is_cancelled()));
    assert!(!second_task.is_finished());
}

/// WHAT: A fire from a replaced timer is not honoured
/// WHY: Clear-then-check drops stale timer callbacks
#[tokio::test]
async fn given_replaced_timer_when_old_id_fires_then_ignored() {
    // Given: Timer 2 replaced timer 1
    let mut session = Session::new(TabId(1));
    session.set_timer(sleeping_timer(1, TimerKind::StartDelay).0);
    session.set_timer(sleeping_timer(2, TimerKind::AutoStop).0);

    // When: Timer 1 and then timer 2 report firing
    let stale = session.take_fired_timer(1);
    let current = session.take_fired_timer(2);

    // Then: Only timer 2 is claimed, and the slot is empty afterwards
    assert_eq!(stale, None);
    assert_eq!(current, Some(TimerKind::AutoStop));
    assert_eq!(session.pending_timer(), None);
    assert_eq!(session.take_fired_timer(2), None);
}

/// WHAT: Clearing reports whether a timer was pending
/// WHY: Cancel paths clear unconditionally and must tolerate an empty slot
#[tokio::test]
async fn given_session_when_clearing_timer_then_reports_presence() {
    // Given: A session with one timer
    let mut session = Session::new(TabId(4));
    session.set_timer(sleeping_timer(9, TimerKind::AutoStop).0);

    // When: Clearing twice
    let first = session.clear_timer();
    let second = session.clear_timer();

    // Then: Only the first clear found a timer
    assert!(first);
    assert!(!second);
}

/// WHAT: Only armed or recording sessions accept a stop
/// WHY: Duplicate stops after finalize must be ignored
#[test]
fn given_phases_when_checking_stop_then_only_active_accept() {
    // Given: A fresh session
    let mut session = Session::new(TabId(2));

    // When/Then: Each phase answers as expected
    let cases = [
        (Phase::Idle, false),
        (Phase::Armed, true),
        (Phase::Recording { deadline: None }, true),
        (Phase::Stopping, false),
        (Phase::Stopped, false),
        (Phase::Exported, false),
        (Phase::Cancelling, false),
    ];
    for (phase, accepts) in cases {
        session.phase = phase;
        assert_eq!(session.accepts_stop(), accepts, "{phase:?}");
    }
}

/// WHAT: Epochs increase with every attempt
/// WHY: Late completions are matched by epoch
#[test]
fn given_session_when_advancing_epoch_then_strictly_increases() {
    // Given: A fresh session
    let mut session = Session::new(TabId(3));

    // When: Advancing twice
    let first = session.next_epoch();
    let second = session.next_epoch();

    // Then: 1 then 2
    assert_eq!((first, second), (1, 2));
    assert_eq!(session.epoch, 2);
}
