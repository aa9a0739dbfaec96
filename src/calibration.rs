//! Pre-assessment device check
//!
//! Asks for the camera and microphone once, optionally listens to the
//! microphone for a short window, reports what it found, and hands the
//! devices straight back.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::device::{DeviceState, DeviceStreamManager, MediaKinds, MediaProvider, TrackKind};
use crate::level::{LevelMonitor, LoudnessBucket, LoudnessSample};

/// Level readings taken by a calibration (~1s at the default 33 ms tick)
pub const CALIBRATION_SAMPLES: usize = 30;

/// Per-device outcome of a calibration check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationReport {
    /// `Pending` when the camera was not requested
    pub camera: DeviceState,
    /// `Pending` when the microphone was not requested
    pub microphone: DeviceState,
    pub error: Option<String>,
    /// Mean loudness over the listening window; `None` if nothing was metered
    pub loudness: Option<LoudnessSample>,
    pub loudness_bucket: Option<LoudnessBucket>,
    /// Readings that went into `loudness`
    pub level_samples: usize,
}

impl CalibrationReport {
    /// Every requested device was granted
    pub fn is_ready(&self) -> bool {
        self.error.is_none()
            && self.camera != DeviceState::Denied
            && self.microphone != DeviceState::Denied
    }
}

/// Request `kinds` once through a throwaway device manager, then release.
pub async fn calibrate(provider: Arc<dyn MediaProvider>, kinds: MediaKinds) -> CalibrationReport {
    check_devices(provider, kinds, None).await
}

/// Like [`calibrate`], and also meter the microphone for `samples` readings
/// before releasing.
pub async fn calibrate_with_level(
    provider: Arc<dyn MediaProvider>,
    monitor: &LevelMonitor,
    kinds: MediaKinds,
    samples: usize,
) -> CalibrationReport {
    check_devices(provider, kinds, Some((monitor, samples))).await
}

async fn check_devices(
    provider: Arc<dyn MediaProvider>,
    kinds: MediaKinds,
    level: Option<(&LevelMonitor, usize)>,
) -> CalibrationReport {
    let manager = DeviceStreamManager::new(provider);

    let result = manager.acquire(kinds).await;
    let outcome = match &result {
        Ok(_) => DeviceState::Active,
        Err(_) => DeviceState::Denied,
    };
    let state_of = |kind: TrackKind| {
        if kinds.contains(kind) {
            outcome
        } else {
            DeviceState::Pending
        }
    };

    let mut report = CalibrationReport {
        camera: state_of(TrackKind::Video),
        microphone: state_of(TrackKind::Audio),
        error: result.err().map(|e| e.to_string()),
        loudness: None,
        loudness_bucket: None,
        level_samples: 0,
    };

    if let Some((monitor, samples)) = level {
        if report.microphone == DeviceState::Active && samples > 0 {
            listen(&manager, monitor, samples, &mut report).await;
        }
    }
    manager.release();

    match &report.error {
        None => info!(
            "Calibration passed: camera={:?}, microphone={:?}, loudness={:?}",
            report.camera,
            report.microphone,
            report.loudness.map(|l| l.value())
        ),
        Some(e) => warn!("Calibration failed: {}", e),
    }

    report
}

async fn listen(
    manager: &DeviceStreamManager,
    monitor: &LevelMonitor,
    samples: usize,
    report: &mut CalibrationReport,
) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let started = manager.with_stream(|handle| {
        monitor.start(handle, move |reading| {
            let _ = tx.send(reading.sample);
        })
    });

    let subscription = match started {
        Some(Ok(subscription)) => subscription,
        Some(Err(e)) => {
            warn!("Calibration cannot meter the microphone: {}", e);
            return;
        }
        None => return,
    };

    let mut total = 0.0f32;
    let mut count = 0usize;
    while count < samples {
        // Ends early if the track stops
        let Some(sample) = rx.recv().await else {
            break;
        };
        total += sample.value();
        count += 1;
    }
    monitor.stop(subscription);

    if count > 0 {
        let mean = LoudnessSample::new(total / count as f32);
        report.loudness = Some(mean);
        report.loudness_bucket = Some(mean.bucket());
        report.level_samples = count;
    }
}
