use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::analyzer::SignalSource;
use super::loudness::LoudnessSample;
use crate::device::StreamHandle;
use crate::error::MediaError;
use crate::schedule::Scheduler;

/// Scheduler label used by level sampling tickers
pub const LEVEL_TICKER: &str = "level";

/// One loudness sample with its position in the sampling sequence
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LevelReading {
    /// Monotonic sample index, starting at 0 for each subscription
    pub index: u64,
    pub sample: LoudnessSample,
}

/// Samples the microphone track of a stream at display-refresh rate
pub struct LevelMonitor {
    scheduler: Arc<dyn Scheduler>,
    source: Arc<dyn SignalSource>,
    period: Duration,
}

impl LevelMonitor {
    pub fn new(
        scheduler: Arc<dyn Scheduler>,
        source: Arc<dyn SignalSource>,
        period: Duration,
    ) -> Self {
        Self {
            scheduler,
            source,
            period,
        }
    }

    /// Start sampling the audio track of `handle`.
    ///
    /// `on_sample` runs once per tick with the latest reading. Sampling ends
    /// when the subscription is stopped or dropped, or when the track stops
    /// being live.
    pub fn start<F>(&self, handle: &StreamHandle, mut on_sample: F) -> Result<Subscription, MediaError>
    where
        F: FnMut(LevelReading) + Send + 'static,
    {
        let track = handle.audio_track().ok_or(MediaError::NoAudioTrack)?;

        info!("Starting level monitor on '{}' every {:?}", track.label(), self.period);

        let mut ticker = self.scheduler.every(LEVEL_TICKER, self.period);
        let source = Arc::clone(&self.source);
        let active = Arc::new(AtomicBool::new(true));
        let running = Arc::clone(&active);

        let task = tokio::spawn(async move {
            let mut bins = vec![0u8; source.bin_count()];
            let mut index = 0u64;

            while ticker.tick().await {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                if !track.is_live() {
                    debug!("Audio track '{}' ended; level monitor stopping", track.label());
                    break;
                }

                source.frequency_snapshot(track.as_ref(), &mut bins);
                on_sample(LevelReading {
                    index,
                    sample: LoudnessSample::from_bins(&bins),
                });
                index += 1;
            }

            running.store(false, Ordering::SeqCst);
        });

        Ok(Subscription {
            task: Some(task),
            active,
        })
    }

    /// Cancel a sampling loop. Safe after the stream was released.
    pub fn stop(&self, mut subscription: Subscription) {
        subscription.stop();
    }
}

/// A running sampling loop; stops on drop
pub struct Subscription {
    task: Option<JoinHandle<()>>,
    active: Arc<AtomicBool>,
}

impl Subscription {
    /// Whether the loop is still scheduled
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Idempotent
    pub fn stop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Level monitor stopped");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop();
    }
}
