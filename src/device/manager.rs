use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::provider::MediaProvider;
use super::track::{MediaKinds, StreamHandle};
use crate::error::MediaError;

/// Device activation state as seen by the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    /// Nothing held yet (or released)
    #[default]
    Pending,
    /// A stream is held and live
    Active,
    /// Last acquisition failed; sticky until [`DeviceStreamManager::retry`]
    Denied,
}

/// Snapshot published on every device state change
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceStatus {
    pub state: DeviceState,
    pub last_error: Option<MediaError>,
}

struct Slot {
    state: DeviceState,
    handle: Option<StreamHandle>,
    last_error: Option<MediaError>,
    kinds: Option<MediaKinds>,
    /// Bumped by every release; an acquisition that settles under a newer
    /// generation has been overtaken and must hand its stream back.
    generation: u64,
    in_flight: bool,
}

/// Acquires and releases the camera/microphone stream for one owner
///
/// At most one stream is held at a time. Dropping the manager drops the held
/// [`StreamHandle`], which stops its tracks.
pub struct DeviceStreamManager {
    provider: Arc<dyn MediaProvider>,
    slot: Mutex<Slot>,
    status: watch::Sender<DeviceStatus>,
}

impl DeviceStreamManager {
    pub fn new(provider: Arc<dyn MediaProvider>) -> Self {
        let (status, _) = watch::channel(DeviceStatus::default());

        Self {
            provider,
            slot: Mutex::new(Slot {
                state: DeviceState::Pending,
                handle: None,
                last_error: None,
                kinds: None,
                generation: 0,
                in_flight: false,
            }),
            status,
        }
    }

    /// Request hardware access for `kinds`.
    ///
    /// Callers must [`release`](Self::release) before acquiring again. From
    /// `Denied` the sticky error is returned without asking the platform;
    /// use [`retry`](Self::retry) instead.
    pub async fn acquire(&self, kinds: MediaKinds) -> Result<MediaKinds, MediaError> {
        if kinds.is_empty() {
            return Err(MediaError::EmptyRequest);
        }

        let generation = {
            let mut slot = self.lock();
            if slot.handle.is_some() || slot.in_flight {
                warn!("Acquire requested while a stream is held or pending");
                return Err(MediaError::StreamHeld);
            }
            if slot.state == DeviceState::Denied {
                debug!("Acquire refused: device is denied until retried");
                return Err(slot
                    .last_error
                    .clone()
                    .unwrap_or(MediaError::PermissionDenied));
            }

            slot.in_flight = true;
            slot.kinds = Some(kinds);
            slot.generation
        };

        self.settle(kinds, generation).await
    }

    /// Re-attempt the last acquisition. Only valid from `Denied`.
    pub async fn retry(&self) -> Result<MediaKinds, MediaError> {
        let (kinds, generation) = {
            let mut slot = self.lock();
            if slot.state != DeviceState::Denied || slot.in_flight {
                warn!("Retry requested while device is {:?}", slot.state);
                return Err(MediaError::invalid("retry", slot.state));
            }
            let kinds = slot
                .kinds
                .ok_or_else(|| MediaError::invalid("retry", slot.state))?;

            info!("Retrying media access");
            slot.in_flight = true;
            slot.state = DeviceState::Pending;
            slot.last_error = None;
            self.publish(&slot);
            (kinds, slot.generation)
        };

        self.settle(kinds, generation).await
    }

    async fn settle(&self, kinds: MediaKinds, generation: u64) -> Result<MediaKinds, MediaError> {
        let mut guard = InFlightGuard {
            manager: self,
            armed: true,
        };

        info!(
            "Requesting media access from {} (video={}, audio={})",
            self.provider.name(),
            kinds.video,
            kinds.audio
        );
        let result = self.provider.acquire_media(kinds).await;
        guard.armed = false;

        let mut slot = self.lock();
        slot.in_flight = false;

        if slot.generation != generation {
            drop(slot);
            if let Ok(handle) = result {
                info!("Discarding stream {} acquired after release", handle.id());
                handle.stop_all();
            }
            return Err(MediaError::Aborted);
        }

        match result {
            Ok(handle) => {
                let granted = handle.kinds();
                info!("Media access granted: stream {}", handle.id());
                slot.handle = Some(handle);
                slot.state = DeviceState::Active;
                slot.last_error = None;
                self.publish(&slot);
                Ok(granted)
            }
            Err(e) => {
                warn!("Media access failed: {}", e);
                slot.state = DeviceState::Denied;
                slot.last_error = Some(e.clone());
                self.publish(&slot);
                Err(e)
            }
        }
    }

    /// Stop all tracks of the held stream, if any, and return to `Pending`.
    ///
    /// Idempotent. An acquisition still in flight is invalidated: its stream
    /// is stopped as soon as it arrives.
    pub fn release(&self) {
        let handle = {
            let mut slot = self.lock();
            slot.generation += 1;
            if slot.in_flight {
                debug!("Release overtook an in-flight acquisition");
            }
            slot.state = DeviceState::Pending;
            slot.last_error = None;
            let handle = slot.handle.take();
            self.publish(&slot);
            handle
        };

        if let Some(handle) = handle {
            handle.stop_all();
            info!("Released stream {}", handle.id());
        }
    }

    pub fn state(&self) -> DeviceState {
        self.lock().state
    }

    pub fn last_error(&self) -> Option<MediaError> {
        self.lock().last_error.clone()
    }

    /// Kinds of the most recent acquisition request
    pub fn kinds(&self) -> Option<MediaKinds> {
        self.lock().kinds
    }

    pub fn status(&self) -> DeviceStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DeviceStatus> {
        self.status.subscribe()
    }

    /// Borrow the held stream, if any
    pub fn with_stream<R>(&self, f: impl FnOnce(&StreamHandle) -> R) -> Option<R> {
        let slot = self.lock();
        slot.handle.as_ref().map(f)
    }

    fn publish(&self, slot: &Slot) {
        self.status.send_replace(DeviceStatus {
            state: slot.state,
            last_error: slot.last_error.clone(),
        });
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the in-flight marker if the acquire future is dropped mid-await
struct InFlightGuard<'a> {
    manager: &'a DeviceStreamManager,
    armed: bool,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            debug!("Acquisition cancelled before it settled");
            self.manager.lock().in_flight = false;
        }
    }
}
