use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use super::config::TaskConfig;
use super::status::{EndReason, SessionEvent, SessionStatus, TaskSessionState};
use crate::clock::{ClockEvent, ClockHandle, SessionClock};
use crate::device::{DeviceState, DeviceStreamManager};
use crate::error::MediaError;
use crate::level::{LevelMonitor, LevelReading, LoudnessSample, Subscription};

/// Drives one task: acquire devices, meter the microphone, count down, and
/// report Idle -> Recording -> Complete.
///
/// Owns its device manager, level monitor and clock. Dropping the controller
/// disposes it: monitoring and countdown are cancelled and the stream is
/// released, whatever state it was in.
pub struct TaskSessionController {
    shared: Arc<Shared>,
}

struct Shared {
    task: TaskConfig,
    devices: DeviceStreamManager,
    monitor: LevelMonitor,
    clock: SessionClock,
    inner: Mutex<Inner>,
    status: watch::Sender<SessionStatus>,
    events: broadcast::Sender<SessionEvent>,
}

struct Inner {
    state: TaskSessionState,
    /// An acquisition for begin/prepare/retry is in flight
    starting: bool,
    disposed: bool,
    subscription: Option<Subscription>,
    countdown: Option<ClockHandle>,
    loudness: Option<LoudnessSample>,
    level_monitoring: bool,
    remaining: u32,
    end_reason: Option<EndReason>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    last_device: DeviceState,
}

impl TaskSessionController {
    pub fn new(
        task: TaskConfig,
        devices: DeviceStreamManager,
        monitor: LevelMonitor,
        clock: SessionClock,
    ) -> Self {
        info!(
            "Creating task session: {} ({}s, video={}, audio={})",
            task.task_id, task.duration_secs, task.video, task.audio
        );

        let (status, _) = watch::channel(SessionStatus::new(&task.task_id, task.duration_secs));
        let (events, _) = broadcast::channel(64);

        let remaining = task.duration_secs;
        let controller = Self {
            shared: Arc::new(Shared {
                task,
                devices,
                monitor,
                clock,
                inner: Mutex::new(Inner {
                    state: TaskSessionState::Idle,
                    starting: false,
                    disposed: false,
                    subscription: None,
                    countdown: None,
                    loudness: None,
                    level_monitoring: false,
                    remaining,
                    end_reason: None,
                    started_at: None,
                    completed_at: None,
                    last_device: DeviceState::Pending,
                }),
                status,
                events,
            }),
        };
        controller.shared.forward_device_status();
        controller
    }

    pub fn task(&self) -> &TaskConfig {
        &self.shared.task
    }

    pub fn state(&self) -> TaskSessionState {
        self.shared.lock().state
    }

    pub fn device_state(&self) -> DeviceState {
        self.shared.devices.state()
    }

    /// Latest status snapshot
    pub fn status(&self) -> SessionStatus {
        self.shared.status.borrow().clone()
    }

    /// Status snapshots, updated on every change
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.shared.status.subscribe()
    }

    /// Transition events (`Completed` fires once per controller)
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// Acquire the task's devices while Idle so the view can show a live
    /// preview, with the microphone level metered from the start.
    ///
    /// A later [`begin`](Self::begin) reuses the stream and the meter.
    pub async fn prepare(&self) -> Result<(), MediaError> {
        let guard = self.shared.enter("prepare")?;
        let acquired = self.shared.ensure_stream().await;
        drop(guard);

        if let Err(e) = acquired {
            self.shared.publish();
            return Err(e);
        }

        self.shared.start_preview()
    }

    /// Start recording: acquire (or reuse) the stream, start level monitoring
    /// when audio was requested, arm the countdown. Idle only.
    ///
    /// A device failure leaves the session Idle with the device Denied.
    /// A missing microphone track only disables metering.
    pub async fn begin(&self) -> Result<(), MediaError> {
        let guard = self.shared.enter("begin")?;
        let acquired = self.shared.ensure_stream().await;
        drop(guard);

        if let Err(e) = acquired {
            warn!("Task {} cannot start: {}", self.shared.task.task_id, e);
            self.shared.publish();
            return Err(e);
        }

        self.shared.start_recording()
    }

    /// Stop recording at the operator's request.
    ///
    /// Repeated triggers after completion are no-ops. Devices stay held so
    /// the preview keeps running; they are released by [`dispose`](Self::dispose).
    pub fn end(&self) -> Result<(), MediaError> {
        self.shared.finish(EndReason::Requested).map(|_| ())
    }

    /// User-initiated retry after a device failure. Idle only.
    pub async fn retry_device(&self) -> Result<(), MediaError> {
        let guard = self.shared.enter("retry device")?;
        let result = self.shared.devices.retry().await.map(|_| ());
        drop(guard);

        self.shared.publish();
        result
    }

    /// Tear everything down. Idempotent; safe from any state.
    pub fn dispose(&self) {
        self.shared.dispose();
    }

    /// Wait until the recording completes; `None` if disposed before it started
    pub async fn wait_complete(&self) -> Option<EndReason> {
        let mut rx = self.subscribe();
        let reason = rx
            .wait_for(|s| s.state == TaskSessionState::Complete || s.disposed)
            .await
            .ok()?
            .end_reason;
        reason
    }
}

impl Drop for TaskSessionController {
    fn drop(&mut self) {
        self.shared.dispose();
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enter(&self, op: &'static str) -> Result<StartingGuard<'_>, MediaError> {
        let mut inner = self.lock();

        let refused = if inner.disposed {
            Some("disposed".to_string())
        } else if inner.starting {
            Some("starting".to_string())
        } else if inner.state != TaskSessionState::Idle {
            Some(format!("{:?}", inner.state))
        } else {
            None
        };

        if let Some(from) = refused {
            warn!("Task {}: refusing {} while {}", self.task.task_id, op, from);
            return Err(MediaError::InvalidTransition { op, from });
        }

        inner.starting = true;
        Ok(StartingGuard { shared: self })
    }

    async fn ensure_stream(&self) -> Result<(), MediaError> {
        if self.devices.state() == DeviceState::Active {
            debug!("Reusing active stream for {}", self.task.task_id);
            return Ok(());
        }
        self.devices.acquire(self.task.kinds()).await.map(|_| ())
    }

    fn start_recording(self: &Arc<Self>) -> Result<(), MediaError> {
        let mut inner = self.lock();

        if inner.disposed {
            drop(inner);
            // Disposed while the acquisition was settling
            self.devices.release();
            return Err(MediaError::Aborted);
        }
        if inner.state != TaskSessionState::Idle {
            return Err(MediaError::invalid("begin", inner.state));
        }

        self.start_metering(&mut inner)?;

        let weak: Weak<Shared> = Arc::downgrade(self);
        inner.countdown = Some(self.clock.arm(self.task.duration_secs, move |event| {
            if let Some(shared) = weak.upgrade() {
                shared.on_clock(event);
            }
        }));

        inner.remaining = self.task.duration_secs;
        inner.state = TaskSessionState::Recording;
        inner.started_at = Some(Utc::now());
        self.emit(SessionEvent::StateChanged {
            from: TaskSessionState::Idle,
            to: TaskSessionState::Recording,
        });
        self.publish_locked(&mut inner);

        info!(
            "Task {} recording ({}s, metering={})",
            self.task.task_id, self.task.duration_secs, inner.level_monitoring
        );
        Ok(())
    }

    fn start_preview(self: &Arc<Self>) -> Result<(), MediaError> {
        let mut inner = self.lock();

        if inner.disposed {
            drop(inner);
            self.devices.release();
            return Err(MediaError::Aborted);
        }

        self.start_metering(&mut inner)?;
        self.publish_locked(&mut inner);

        info!(
            "Task {} previewing (metering={})",
            self.task.task_id, inner.level_monitoring
        );
        Ok(())
    }

    /// Start level monitoring on the held stream unless it already runs.
    /// A stream without a microphone track leaves metering off.
    fn start_metering(self: &Arc<Self>, inner: &mut Inner) -> Result<(), MediaError> {
        if !self.task.audio || inner.subscription.as_ref().is_some_and(|s| s.is_active()) {
            return Ok(());
        }

        let weak = Arc::downgrade(self);
        let started = self.devices.with_stream(|handle| {
            self.monitor.start(handle, move |reading| {
                if let Some(shared) = weak.upgrade() {
                    shared.on_level(reading);
                }
            })
        });

        match started {
            Some(Ok(subscription)) => {
                inner.subscription = Some(subscription);
                inner.level_monitoring = true;
            }
            Some(Err(e)) => {
                warn!(
                    "Task {}: {}; continuing video-only without level metering",
                    self.task.task_id, e
                );
                inner.subscription = None;
                inner.level_monitoring = false;
                inner.loudness = None;
            }
            None => {
                warn!("Task {}: stream vanished before metering", self.task.task_id);
                return Err(MediaError::Aborted);
            }
        }
        Ok(())
    }

    /// Recording -> Complete. Returns whether this call made the transition.
    fn finish(&self, reason: EndReason) -> Result<bool, MediaError> {
        let (subscription, countdown) = {
            let mut inner = self.lock();
            match inner.state {
                TaskSessionState::Recording => {}
                TaskSessionState::Complete => {
                    debug!(
                        "Task {} already complete; ignoring {:?} trigger",
                        self.task.task_id, reason
                    );
                    return Ok(false);
                }
                TaskSessionState::Idle => {
                    warn!("Task {}: end requested while Idle", self.task.task_id);
                    return Err(MediaError::invalid("end", inner.state));
                }
            }

            inner.state = TaskSessionState::Complete;
            inner.end_reason = Some(reason);
            inner.completed_at = Some(Utc::now());
            self.emit(SessionEvent::StateChanged {
                from: TaskSessionState::Recording,
                to: TaskSessionState::Complete,
            });
            self.emit(SessionEvent::Completed { reason });
            self.publish_locked(&mut inner);

            (inner.subscription.take(), inner.countdown.take())
        };

        stop(subscription, countdown);
        info!("Task {} complete ({:?})", self.task.task_id, reason);
        Ok(true)
    }

    fn dispose(&self) {
        let (subscription, countdown) = {
            let mut inner = self.lock();
            if inner.disposed {
                return;
            }
            inner.disposed = true;

            if inner.state == TaskSessionState::Recording {
                inner.state = TaskSessionState::Complete;
                inner.end_reason = Some(EndReason::Disposed);
                inner.completed_at = Some(Utc::now());
                self.emit(SessionEvent::StateChanged {
                    from: TaskSessionState::Recording,
                    to: TaskSessionState::Complete,
                });
                self.emit(SessionEvent::Completed {
                    reason: EndReason::Disposed,
                });
            }

            (inner.subscription.take(), inner.countdown.take())
        };

        stop(subscription, countdown);
        self.devices.release();
        self.publish();

        info!("Task session {} disposed", self.task.task_id);
    }

    fn on_level(&self, reading: LevelReading) {
        let mut inner = self.lock();
        // Idle preview and recording both meter; completion stops the loop
        if inner.state == TaskSessionState::Complete || inner.disposed || !inner.level_monitoring {
            return;
        }
        inner.loudness = Some(reading.sample);
        self.publish_locked(&mut inner);
    }

    fn on_clock(&self, event: ClockEvent) {
        match event {
            ClockEvent::Tick { remaining } => {
                let mut inner = self.lock();
                if inner.state != TaskSessionState::Recording {
                    return;
                }
                inner.remaining = remaining;
                self.publish_locked(&mut inner);
            }
            ClockEvent::Expired => {
                if let Err(e) = self.finish(EndReason::Expired) {
                    warn!("Task {}: countdown expiry ignored: {}", self.task.task_id, e);
                }
            }
        }
    }

    /// Mirror device transitions the manager makes on its own (e.g. the
    /// Denied -> Pending step of a retry) into the session status
    fn forward_device_status(self: &Arc<Self>) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("No runtime; device status is published on controller operations only");
            return;
        };

        let mut device = self.devices.subscribe();
        let weak = Arc::downgrade(self);
        runtime.spawn(async move {
            while device.changed().await.is_ok() {
                match weak.upgrade() {
                    Some(shared) => shared.publish(),
                    None => break,
                }
            }
        });
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn publish(&self) {
        let mut inner = self.lock();
        self.publish_locked(&mut inner);
    }

    fn publish_locked(&self, inner: &mut Inner) {
        let device = self.devices.status();
        if device.state != inner.last_device {
            inner.last_device = device.state;
            self.emit(SessionEvent::DeviceChanged {
                state: device.state,
            });
        }

        self.status.send_replace(SessionStatus {
            task_id: self.task.task_id.clone(),
            state: inner.state,
            device: device.state,
            device_error: device.last_error.map(|e| e.to_string()),
            loudness: inner.loudness,
            loudness_bucket: inner.loudness.map(|l| l.bucket()),
            level_monitoring: inner.level_monitoring,
            remaining_secs: inner.remaining,
            end_reason: inner.end_reason,
            started_at: inner.started_at,
            completed_at: inner.completed_at,
            disposed: inner.disposed,
        });
    }
}

fn stop(subscription: Option<Subscription>, countdown: Option<ClockHandle>) {
    if let Some(mut subscription) = subscription {
        subscription.stop();
    }
    if let Some(mut countdown) = countdown {
        countdown.cancel();
    }
}

/// Clears `starting` when a begin/prepare/retry finishes or is cancelled
struct StartingGuard<'a> {
    shared: &'a Shared,
}

impl Drop for StartingGuard<'_> {
    fn drop(&mut self) {
        self.shared.lock().starting = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::COUNTDOWN_TICKER;
    use crate::config::{DeviceConfig, MonitorConfig};
    use crate::device::{MediaKinds, SimulatedProvider};
    use crate::level::{ConstantSpectrum, LEVEL_TICKER};
    use crate::schedule::ManualScheduler;
    use crate::session::SessionEngine;

    fn engine() -> (SessionEngine, Arc<SimulatedProvider>, Arc<ManualScheduler>) {
        let provider = Arc::new(SimulatedProvider::new(DeviceConfig::default()));
        let scheduler = ManualScheduler::new();
        let engine = SessionEngine::new(provider.clone(), scheduler.clone(), &MonitorConfig::default())
            .with_signal_source(Arc::new(ConstantSpectrum::new(255, 128)));
        (engine, provider, scheduler)
    }

    #[tokio::test]
    async fn test_begin_starts_monitor_and_clock() {
        let (engine, provider, scheduler) = engine();
        let controller = engine.controller(TaskConfig::new("t", MediaKinds::BOTH, 3));

        controller.begin().await.unwrap();

        assert_eq!(controller.state(), TaskSessionState::Recording);
        assert_eq!(controller.device_state(), DeviceState::Active);
        assert_eq!(provider.live_tracks(), 2);
        assert_eq!(scheduler.tickers(LEVEL_TICKER), 1);
        assert_eq!(scheduler.tickers(COUNTDOWN_TICKER), 1);

        let status = controller.status();
        assert!(status.level_monitoring);
        assert_eq!(status.remaining_secs, 3);
        assert!(status.started_at.is_some());
    }

    #[tokio::test]
    async fn test_end_from_idle_is_rejected() {
        let (engine, _provider, _scheduler) = engine();
        let controller = engine.controller(TaskConfig::new("t", MediaKinds::BOTH, 3));

        let err = controller.end().unwrap_err();
        assert!(matches!(err, MediaError::InvalidTransition { op: "end", .. }));
        assert_eq!(controller.state(), TaskSessionState::Idle);
    }

    #[tokio::test]
    async fn test_end_twice_completes_once() {
        let (engine, _provider, _scheduler) = engine();
        let controller = engine.controller(TaskConfig::new("t", MediaKinds::BOTH, 3));
        let mut events = controller.events();

        controller.begin().await.unwrap();
        controller.end().unwrap();
        controller.end().unwrap();

        let mut completed = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, SessionEvent::Completed { .. }) {
                completed += 1;
            }
        }
        assert_eq!(completed, 1);
        assert_eq!(controller.status().end_reason, Some(EndReason::Requested));
    }

    #[tokio::test]
    async fn test_prepare_stream_is_reused_by_begin() {
        let (engine, provider, _scheduler) = engine();
        let controller = engine.controller(TaskConfig::new("t", MediaKinds::BOTH, 3));

        controller.prepare().await.unwrap();
        assert_eq!(controller.state(), TaskSessionState::Idle);
        assert_eq!(controller.device_state(), DeviceState::Active);

        controller.begin().await.unwrap();
        assert_eq!(provider.acquisitions(), 1);
    }

    #[tokio::test]
    async fn test_drop_releases_everything() {
        let (engine, provider, scheduler) = engine();
        let controller = engine.controller(TaskConfig::new("t", MediaKinds::BOTH, 3));
        controller.begin().await.unwrap();

        drop(controller);
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert_eq!(provider.live_tracks(), 0);
        assert_eq!(scheduler.fire(LEVEL_TICKER), 0);
        assert_eq!(scheduler.fire(COUNTDOWN_TICKER), 0);
    }
}
