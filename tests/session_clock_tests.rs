// Integration tests for the countdown clock

use media_session::clock::COUNTDOWN_TICKER;
use media_session::{ClockEvent, CountdownState, ManualScheduler, SessionClock};
use tokio::sync::mpsc;

fn recorder() -> (
    impl FnMut(ClockEvent) + Send + 'static,
    mpsc::UnboundedReceiver<ClockEvent>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        move |event| {
            let _ = tx.send(event);
        },
        rx,
    )
}

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_arm_zero_only_expires() {
    let scheduler = ManualScheduler::new();
    let clock = SessionClock::new(scheduler.clone());
    let (on_event, mut rx) = recorder();

    let handle = clock.arm(0, on_event);
    assert_eq!(scheduler.tickers(COUNTDOWN_TICKER), 0);

    assert_eq!(rx.recv().await, Some(ClockEvent::Expired));
    assert_eq!(rx.recv().await, None);
    assert_eq!(
        handle.state(),
        CountdownState {
            remaining_seconds: 0,
            armed: true
        }
    );
    assert!(handle.state().is_expired());
}

#[tokio::test]
async fn test_ticks_count_down_then_expire_once() {
    let scheduler = ManualScheduler::new();
    let clock = SessionClock::new(scheduler.clone());
    let (on_event, mut rx) = recorder();

    let handle = clock.arm(3, on_event);
    for _ in 0..3 {
        assert_eq!(scheduler.fire(COUNTDOWN_TICKER), 1);
    }

    assert_eq!(rx.recv().await, Some(ClockEvent::Tick { remaining: 2 }));
    assert_eq!(rx.recv().await, Some(ClockEvent::Tick { remaining: 1 }));
    assert_eq!(rx.recv().await, Some(ClockEvent::Tick { remaining: 0 }));
    assert_eq!(rx.recv().await, Some(ClockEvent::Expired));
    assert_eq!(rx.recv().await, None);

    assert_eq!(handle.remaining_seconds(), 0);
    assert!(handle.state().armed);
    assert!(handle.state().is_expired());
}

#[tokio::test]
async fn test_cancel_stops_delivery() {
    let scheduler = ManualScheduler::new();
    let clock = SessionClock::new(scheduler.clone());
    let (on_event, mut rx) = recorder();

    let mut handle = clock.arm(5, on_event);
    scheduler.fire(COUNTDOWN_TICKER);
    assert_eq!(rx.recv().await, Some(ClockEvent::Tick { remaining: 4 }));

    clock.cancel(&mut handle);
    scheduler.fire(COUNTDOWN_TICKER);

    assert_eq!(rx.recv().await, None);
    assert_eq!(handle.remaining_seconds(), 4);
    assert!(!handle.state().armed);
    assert!(!handle.state().is_expired());
}

#[tokio::test]
async fn test_cancel_is_idempotent_and_safe_after_expiry() {
    let scheduler = ManualScheduler::new();
    let clock = SessionClock::new(scheduler.clone());
    let (on_event, mut rx) = recorder();

    let mut handle = clock.arm(1, on_event);
    scheduler.fire(COUNTDOWN_TICKER);
    assert_eq!(rx.recv().await, Some(ClockEvent::Tick { remaining: 0 }));
    assert_eq!(rx.recv().await, Some(ClockEvent::Expired));

    handle.cancel();
    clock.cancel(&mut handle);

    assert_eq!(rx.recv().await, None);
    // Still reads as expired, not as idle
    assert!(handle.state().armed);
    assert!(handle.state().is_expired());
}

#[tokio::test]
async fn test_dropping_handle_cancels() {
    let scheduler = ManualScheduler::new();
    let clock = SessionClock::new(scheduler.clone());
    let (on_event, mut rx) = recorder();

    let handle = clock.arm(10, on_event);
    drop(handle);
    settle().await;

    assert_eq!(scheduler.fire(COUNTDOWN_TICKER), 0);
    assert_eq!(rx.recv().await, None);
}
