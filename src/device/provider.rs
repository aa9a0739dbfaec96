use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use super::file::AudioFile;
use super::simulated::SimulatedProvider;
use super::track::{MediaKinds, StreamHandle};
use crate::config::{DeviceConfig, DeviceSource};
use crate::error::MediaError;

/// Platform capability that grants or denies hardware streams
///
/// Implementations:
/// - Simulated: tone-generator microphone and a synthetic camera
/// - File: microphone replays a WAV file (demos and batch runs)
/// - Tests: scripted failures and gated acquisitions via [`SimulatedProvider`]
#[async_trait::async_trait]
pub trait MediaProvider: Send + Sync {
    /// Request hardware access for `kinds`.
    ///
    /// Suspends until the platform answers; fails with `PermissionDenied`
    /// or `DeviceUnavailable`.
    async fn acquire_media(&self, kinds: MediaKinds) -> Result<StreamHandle, MediaError>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

/// Media provider factory
pub struct ProviderFactory;

impl ProviderFactory {
    /// Create the media provider described by the device configuration
    pub fn create(config: &DeviceConfig) -> Result<Arc<dyn MediaProvider>> {
        match config.source {
            DeviceSource::Simulated => {
                let provider = SimulatedProvider::new(config.clone());
                info!("Using simulated media provider");
                Ok(Arc::new(provider))
            }

            DeviceSource::File => {
                let path = config
                    .wav_path
                    .as_deref()
                    .context("devices.wav_path is required for source = \"file\"")?;
                let path = shellexpand::tilde(path);
                let audio = AudioFile::open(path.as_ref())
                    .with_context(|| format!("Failed to load microphone replay file {}", path))?;

                let mut devices = config.clone();
                devices.sample_rate = audio.sample_rate;
                let provider = SimulatedProvider::new(devices).with_replay(audio.to_mono());
                info!("Using file-backed media provider ({})", path);
                Ok(Arc::new(provider))
            }
        }
    }
}
