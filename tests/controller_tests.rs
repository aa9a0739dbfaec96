// Integration tests for the task session controller
//
// Time is driven by hand through ManualScheduler; the simulated provider
// counts live tracks so every test can check that nothing leaks.

use media_session::clock::COUNTDOWN_TICKER;
use media_session::config::{DeviceConfig, MonitorConfig, Permission};
use media_session::level::{ConstantSpectrum, LEVEL_TICKER};
use media_session::{
    DeviceState, EndReason, LoudnessBucket, ManualScheduler, MediaError, MediaKinds,
    SessionEngine, SessionEvent, SimulatedProvider, TaskConfig, TaskSessionController,
    TaskSessionState,
};
use std::sync::Arc;
use tokio::sync::broadcast;

struct Harness {
    engine: SessionEngine,
    provider: Arc<SimulatedProvider>,
    scheduler: Arc<ManualScheduler>,
}

impl Harness {
    fn new(config: DeviceConfig) -> Self {
        Self::with_provider(SimulatedProvider::new(config))
    }

    fn with_provider(provider: SimulatedProvider) -> Self {
        let provider = Arc::new(provider);
        let scheduler = ManualScheduler::new();
        let engine = SessionEngine::new(
            provider.clone(),
            scheduler.clone(),
            &MonitorConfig::default(),
        )
        .with_signal_source(Arc::new(ConstantSpectrum::new(255, 128)));

        Self {
            engine,
            provider,
            scheduler,
        }
    }

    fn controller(&self, kinds: MediaKinds, seconds: u32) -> TaskSessionController {
        self.engine
            .controller(TaskConfig::new("task", kinds, seconds))
    }

    /// Nothing held, nothing scheduled
    async fn assert_quiet(&self) {
        settle().await;
        assert_eq!(self.provider.live_tracks(), 0);
        assert_eq!(self.scheduler.tickers(LEVEL_TICKER), 0);
        assert_eq!(self.scheduler.tickers(COUNTDOWN_TICKER), 0);
    }
}

async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

fn completions(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<EndReason> {
    let mut reasons = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::Completed { reason } = event {
            reasons.push(reason);
        }
    }
    reasons
}

#[tokio::test]
async fn test_countdown_auto_completes() {
    let h = Harness::new(DeviceConfig::default());
    let controller = h.controller(MediaKinds::BOTH, 5);
    let mut events = controller.events();

    controller.begin().await.unwrap();
    for _ in 0..5 {
        h.scheduler.fire(COUNTDOWN_TICKER);
    }

    assert_eq!(controller.wait_complete().await, Some(EndReason::Expired));
    let status = controller.status();
    assert_eq!(status.state, TaskSessionState::Complete);
    assert_eq!(status.remaining_secs, 0);
    assert!(status.completed_at.is_some());
    assert_eq!(completions(&mut events), vec![EndReason::Expired]);

    // Monitoring and countdown stop with the recording; devices stay for preview
    settle().await;
    assert_eq!(h.scheduler.tickers(LEVEL_TICKER), 0);
    assert_eq!(h.scheduler.tickers(COUNTDOWN_TICKER), 0);
    assert_eq!(controller.device_state(), DeviceState::Active);

    controller.dispose();
    h.assert_quiet().await;
}

#[tokio::test]
async fn test_level_reaches_status_while_recording() {
    let h = Harness::new(DeviceConfig::default());
    let controller = h.controller(MediaKinds::BOTH, 10);
    let mut status = controller.subscribe();

    controller.begin().await.unwrap();
    h.scheduler.fire(LEVEL_TICKER);

    let snapshot = status
        .wait_for(|s| s.loudness.is_some())
        .await
        .unwrap()
        .clone();
    assert_eq!(snapshot.loudness.map(|l| l.value()), Some(100.0));
    assert_eq!(snapshot.loudness_bucket, Some(LoudnessBucket::VeryLoud));
    assert!(snapshot.level_monitoring);
}

#[tokio::test]
async fn test_end_and_expiry_race_completes_once() {
    let h = Harness::new(DeviceConfig::default());
    let controller = h.controller(MediaKinds::BOTH, 1);
    let mut events = controller.events();

    controller.begin().await.unwrap();
    h.scheduler.fire(COUNTDOWN_TICKER);
    controller.end().unwrap();

    let reason = controller.wait_complete().await;
    settle().await;

    let reasons = completions(&mut events);
    assert_eq!(reasons.len(), 1);
    assert_eq!(reason, Some(reasons[0]));
    assert!(controller.end().is_ok());
    assert_eq!(controller.state(), TaskSessionState::Complete);
}

#[tokio::test]
async fn test_double_begin_is_rejected() {
    let h = Harness::new(DeviceConfig::default());
    let controller = h.controller(MediaKinds::BOTH, 10);

    controller.begin().await.unwrap();
    let err = controller.begin().await.unwrap_err();

    assert!(matches!(err, MediaError::InvalidTransition { op: "begin", .. }));
    assert_eq!(controller.state(), TaskSessionState::Recording);
    assert_eq!(h.provider.acquisitions(), 1);
    assert_eq!(h.scheduler.tickers(COUNTDOWN_TICKER), 1);
}

#[tokio::test]
async fn test_begin_after_complete_is_rejected() {
    let h = Harness::new(DeviceConfig::default());
    let controller = h.controller(MediaKinds::BOTH, 10);

    controller.begin().await.unwrap();
    controller.end().unwrap();

    assert!(controller.begin().await.is_err());
    assert_eq!(controller.state(), TaskSessionState::Complete);
}

#[tokio::test]
async fn test_video_only_stream_records_without_metering() {
    let h = Harness::new(DeviceConfig::default());
    let controller = h.controller(MediaKinds::VIDEO, 10);

    controller.begin().await.unwrap();

    let status = controller.status();
    assert_eq!(status.state, TaskSessionState::Recording);
    assert!(!status.level_monitoring);
    assert_eq!(status.loudness, None);
    assert_eq!(h.scheduler.tickers(LEVEL_TICKER), 0);
    assert_eq!(h.scheduler.tickers(COUNTDOWN_TICKER), 1);
}

#[tokio::test]
async fn test_granted_stream_without_microphone_records_unmetered() {
    let h = Harness::with_provider(
        SimulatedProvider::new(DeviceConfig::default()).without_microphone_track(),
    );
    let controller = h.controller(MediaKinds::BOTH, 10);

    controller.begin().await.unwrap();

    let status = controller.status();
    assert_eq!(status.state, TaskSessionState::Recording);
    assert_eq!(status.device, DeviceState::Active);
    assert!(!status.level_monitoring);
    assert_eq!(status.loudness, None);
    assert_eq!(h.provider.live_tracks(), 1);
    assert_eq!(h.scheduler.tickers(LEVEL_TICKER), 0);
    assert_eq!(h.scheduler.tickers(COUNTDOWN_TICKER), 1);

    controller.dispose();
    h.assert_quiet().await;
}

#[tokio::test]
async fn test_prepare_meters_level_while_idle() {
    let h = Harness::new(DeviceConfig::default());
    let controller = h.controller(MediaKinds::BOTH, 10);
    let mut status = controller.subscribe();

    controller.prepare().await.unwrap();
    assert_eq!(h.scheduler.tickers(LEVEL_TICKER), 1);
    h.scheduler.fire(LEVEL_TICKER);

    let snapshot = status
        .wait_for(|s| s.loudness.is_some())
        .await
        .unwrap()
        .clone();
    assert_eq!(snapshot.state, TaskSessionState::Idle);
    assert!(snapshot.level_monitoring);
    assert_eq!(snapshot.loudness_bucket, Some(LoudnessBucket::VeryLoud));
    assert_eq!(h.scheduler.tickers(COUNTDOWN_TICKER), 0);

    // Recording keeps the preview meter instead of starting another
    controller.begin().await.unwrap();
    assert_eq!(controller.state(), TaskSessionState::Recording);
    assert_eq!(h.scheduler.tickers(LEVEL_TICKER), 1);
    assert_eq!(h.provider.acquisitions(), 1);

    controller.dispose();
    h.assert_quiet().await;
}

#[tokio::test]
async fn test_status_shows_pending_during_retry() {
    let (provider, gate) = SimulatedProvider::new(DeviceConfig::default()).gated();
    let h = Harness::with_provider(provider);
    h.provider.fail_next(MediaError::PermissionDenied);
    let controller = Arc::new(h.controller(MediaKinds::BOTH, 10));

    gate.release_one();
    assert_eq!(controller.begin().await, Err(MediaError::PermissionDenied));
    assert_eq!(controller.status().device, DeviceState::Denied);

    let mut status = controller.subscribe();
    let retry = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.retry_device().await })
    };

    let pending = status
        .wait_for(|s| s.device == DeviceState::Pending)
        .await
        .unwrap()
        .clone();
    assert_eq!(pending.device_error, None);
    assert_eq!(pending.state, TaskSessionState::Idle);

    gate.release_one();
    assert_eq!(retry.await.unwrap(), Ok(()));
    assert_eq!(controller.status().device, DeviceState::Active);

    controller.dispose();
    h.assert_quiet().await;
}

#[tokio::test]
async fn test_denied_device_keeps_session_idle_until_retry() {
    let h = Harness::new(DeviceConfig {
        permission: Permission::Deny,
        ..DeviceConfig::default()
    });
    let controller = h.controller(MediaKinds::BOTH, 10);

    let err = controller.begin().await.unwrap_err();
    assert_eq!(err, MediaError::PermissionDenied);
    assert_eq!(controller.state(), TaskSessionState::Idle);

    let status = controller.status();
    assert_eq!(status.device, DeviceState::Denied);
    assert!(status.device_error.is_some());
    assert_eq!(h.scheduler.tickers(COUNTDOWN_TICKER), 0);

    // Still denied by the platform
    assert!(controller.retry_device().await.is_err());
    assert_eq!(controller.device_state(), DeviceState::Denied);
    assert_eq!(h.provider.acquisitions(), 2);
}

#[tokio::test]
async fn test_retry_recovers_from_transient_failure() {
    let h = Harness::new(DeviceConfig::default());
    h.provider.fail_next(MediaError::PermissionDenied);
    let controller = h.controller(MediaKinds::BOTH, 10);

    assert!(controller.begin().await.is_err());
    controller.retry_device().await.unwrap();
    assert_eq!(controller.device_state(), DeviceState::Active);

    controller.begin().await.unwrap();
    assert_eq!(controller.state(), TaskSessionState::Recording);
    assert_eq!(h.provider.acquisitions(), 2);
}

#[tokio::test]
async fn test_dispose_from_idle_is_leak_free() {
    let h = Harness::new(DeviceConfig::default());
    let controller = h.controller(MediaKinds::BOTH, 10);
    controller.prepare().await.unwrap();
    assert_eq!(h.provider.live_tracks(), 2);

    controller.dispose();
    controller.dispose();

    assert_eq!(controller.state(), TaskSessionState::Idle);
    assert!(controller.status().disposed);
    assert_eq!(controller.wait_complete().await, None);
    h.assert_quiet().await;
}

#[tokio::test]
async fn test_dispose_while_recording_is_leak_free() {
    let h = Harness::new(DeviceConfig::default());
    let controller = h.controller(MediaKinds::BOTH, 10);
    let mut events = controller.events();
    controller.begin().await.unwrap();

    controller.dispose();

    assert_eq!(controller.state(), TaskSessionState::Complete);
    assert_eq!(completions(&mut events), vec![EndReason::Disposed]);
    h.assert_quiet().await;

    // Late ticks find nothing to drive
    assert_eq!(h.scheduler.fire(COUNTDOWN_TICKER), 0);
    assert_eq!(h.scheduler.fire(LEVEL_TICKER), 0);
}

#[tokio::test]
async fn test_dispose_after_complete_is_leak_free() {
    let h = Harness::new(DeviceConfig::default());
    let controller = h.controller(MediaKinds::BOTH, 10);
    let mut events = controller.events();
    controller.begin().await.unwrap();
    controller.end().unwrap();

    controller.dispose();

    assert_eq!(completions(&mut events), vec![EndReason::Requested]);
    h.assert_quiet().await;
}

#[tokio::test]
async fn test_dispose_during_in_flight_begin() {
    let (provider, gate) = SimulatedProvider::new(DeviceConfig::default()).gated();
    let h = Harness::with_provider(provider);
    let controller = Arc::new(h.controller(MediaKinds::BOTH, 10));

    let begin = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.begin().await })
    };
    while h.provider.acquisitions() == 0 {
        tokio::task::yield_now().await;
    }

    controller.dispose();
    gate.release_one();

    assert_eq!(begin.await.unwrap(), Err(MediaError::Aborted));
    assert_eq!(controller.state(), TaskSessionState::Idle);
    h.assert_quiet().await;
}

#[tokio::test]
async fn test_drop_disposes() {
    let h = Harness::new(DeviceConfig::default());
    let controller = h.controller(MediaKinds::BOTH, 10);
    controller.begin().await.unwrap();

    drop(controller);

    h.assert_quiet().await;
}

#[tokio::test]
async fn test_controllers_are_independent() {
    let h = Harness::new(DeviceConfig::default());
    let first = h
        .engine
        .controller(TaskConfig::new("first", MediaKinds::BOTH, 1));
    let second = h
        .engine
        .controller(TaskConfig::new("second", MediaKinds::AUDIO, 10));

    first.begin().await.unwrap();
    second.begin().await.unwrap();
    first.dispose();

    assert_eq!(second.state(), TaskSessionState::Recording);
    assert_eq!(h.provider.live_tracks(), 1);

    second.dispose();
    h.assert_quiet().await;
}
