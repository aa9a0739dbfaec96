// Simulated media provider
//
// Stands in for camera/microphone hardware on headless hosts and in tests.
// The microphone produces a sine tone or replays decoded WAV samples; the
// camera is a liveness flag only. Every track created is counted so callers
// can prove that all hardware was handed back.

use std::collections::VecDeque;
use std::f32::consts::TAU;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, info};

use super::provider::MediaProvider;
use super::track::{MediaKinds, MediaTrack, StreamHandle, TrackKind};
use crate::config::{DeviceConfig, Permission};
use crate::error::MediaError;

/// Media provider backed by synthetic devices
pub struct SimulatedProvider {
    config: DeviceConfig,
    replay: Option<Arc<Vec<f32>>>,
    scripted: Mutex<VecDeque<MediaError>>,
    gate: Option<Arc<Semaphore>>,
    /// Grant audio requests without delivering a microphone track
    omit_microphone: bool,
    live_tracks: Arc<AtomicUsize>,
    acquisitions: AtomicUsize,
}

/// Holds acquisitions in flight until released, one per permit
#[derive(Clone)]
pub struct AcquireGate {
    permits: Arc<Semaphore>,
}

impl AcquireGate {
    /// Let one pending (or future) acquisition settle
    pub fn release_one(&self) {
        self.permits.add_permits(1);
    }
}

impl SimulatedProvider {
    pub fn new(config: DeviceConfig) -> Self {
        info!(
            "Simulated devices: camera={}, microphone={}, permission={:?}",
            config.has_camera, config.has_microphone, config.permission
        );

        Self {
            config,
            replay: None,
            scripted: Mutex::new(VecDeque::new()),
            gate: None,
            omit_microphone: false,
            live_tracks: Arc::new(AtomicUsize::new(0)),
            acquisitions: AtomicUsize::new(0),
        }
    }

    /// Replay `samples` (mono, -1.0..=1.0) as the microphone signal
    pub fn with_replay(mut self, samples: Vec<f32>) -> Self {
        self.replay = Some(Arc::new(samples));
        self
    }

    /// Make every acquisition wait for a permit from the returned gate
    pub fn gated(mut self) -> (Self, AcquireGate) {
        let permits = Arc::new(Semaphore::new(0));
        self.gate = Some(Arc::clone(&permits));
        (self, AcquireGate { permits })
    }

    /// Grant requests but leave the microphone track out of the stream,
    /// like a platform that accepts the prompt and delivers video only
    pub fn without_microphone_track(mut self) -> Self {
        self.omit_microphone = true;
        self
    }

    /// Fail the next acquisition with `error`, ahead of the configured behavior
    pub fn fail_next(&self, error: MediaError) {
        self.scripted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(error);
    }

    /// Tracks created and not yet stopped
    pub fn live_tracks(&self) -> usize {
        self.live_tracks.load(Ordering::SeqCst)
    }

    /// Acquisition requests seen so far (granted or not)
    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    fn check(&self, kinds: MediaKinds) -> Result<(), MediaError> {
        let scripted = self
            .scripted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        if let Some(error) = scripted {
            return Err(error);
        }

        if self.config.permission == Permission::Deny {
            return Err(MediaError::PermissionDenied);
        }
        if kinds.video && !self.config.has_camera {
            return Err(MediaError::DeviceUnavailable {
                kind: TrackKind::Video,
            });
        }
        if kinds.audio && !self.config.has_microphone {
            return Err(MediaError::DeviceUnavailable {
                kind: TrackKind::Audio,
            });
        }

        Ok(())
    }

    fn open_track(&self, kind: TrackKind) -> Arc<dyn MediaTrack> {
        let signal = match (kind, &self.replay) {
            (TrackKind::Video, _) => None,
            (TrackKind::Audio, Some(samples)) => Some(PcmSignal::Replay {
                samples: Arc::clone(samples),
                cursor: 0,
            }),
            (TrackKind::Audio, None) => Some(PcmSignal::Tone {
                step: TAU * self.config.tone_hz / self.config.sample_rate.max(1) as f32,
                amplitude: self.config.tone_amplitude.clamp(0.0, 1.0),
                phase: 0.0,
            }),
        };

        let label = match kind {
            TrackKind::Video => "Simulated Camera",
            TrackKind::Audio => "Simulated Microphone",
        };

        self.live_tracks.fetch_add(1, Ordering::SeqCst);
        Arc::new(SimulatedTrack {
            kind,
            label: label.to_string(),
            live: AtomicBool::new(true),
            live_tracks: Arc::clone(&self.live_tracks),
            signal: signal.map(Mutex::new),
        })
    }
}

#[async_trait::async_trait]
impl MediaProvider for SimulatedProvider {
    async fn acquire_media(&self, kinds: MediaKinds) -> Result<StreamHandle, MediaError> {
        self.acquisitions.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            // A closed gate never happens; treat it like an open one
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        if self.config.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.latency_ms)).await;
        }

        self.check(kinds)?;

        let tracks: Vec<Arc<dyn MediaTrack>> = kinds
            .iter()
            .filter(|&k| !(self.omit_microphone && k == TrackKind::Audio))
            .map(|k| self.open_track(k))
            .collect();
        debug!("Granted {} simulated track(s)", tracks.len());

        Ok(StreamHandle::new(tracks))
    }

    fn name(&self) -> &str {
        if self.replay.is_some() {
            "file replay"
        } else {
            "simulated"
        }
    }
}

enum PcmSignal {
    Tone { step: f32, amplitude: f32, phase: f32 },
    Replay { samples: Arc<Vec<f32>>, cursor: usize },
}

impl PcmSignal {
    fn fill(&mut self, out: &mut [f32]) {
        match self {
            PcmSignal::Tone {
                step,
                amplitude,
                phase,
            } => {
                for sample in out.iter_mut() {
                    *sample = *amplitude * phase.sin();
                    *phase = (*phase + *step) % TAU;
                }
            }
            PcmSignal::Replay { samples, cursor } => {
                if samples.is_empty() {
                    out.fill(0.0);
                    return;
                }
                for sample in out.iter_mut() {
                    *sample = samples[*cursor];
                    *cursor = (*cursor + 1) % samples.len();
                }
            }
        }
    }
}

struct SimulatedTrack {
    kind: TrackKind,
    label: String,
    live: AtomicBool,
    live_tracks: Arc<AtomicUsize>,
    signal: Option<Mutex<PcmSignal>>,
}

impl MediaTrack for SimulatedTrack {
    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        if self.live.swap(false, Ordering::SeqCst) {
            self.live_tracks.fetch_sub(1, Ordering::SeqCst);
            debug!("Stopped track: {}", self.label);
        }
    }

    fn read_samples(&self, out: &mut [f32]) -> usize {
        if !self.is_live() {
            return 0;
        }
        match &self.signal {
            Some(signal) => {
                signal.lock().unwrap_or_else(PoisonError::into_inner).fill(out);
                out.len()
            }
            None => 0,
        }
    }
}
