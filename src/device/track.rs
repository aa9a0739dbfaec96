use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Hardware track kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    /// Camera
    Video,
    /// Microphone
    Audio,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Video => write!(f, "camera"),
            TrackKind::Audio => write!(f, "microphone"),
        }
    }
}

/// Which devices a session asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MediaKinds {
    #[serde(default)]
    pub video: bool,
    #[serde(default)]
    pub audio: bool,
}

impl MediaKinds {
    pub const VIDEO: MediaKinds = MediaKinds {
        video: true,
        audio: false,
    };
    pub const AUDIO: MediaKinds = MediaKinds {
        video: false,
        audio: true,
    };
    pub const BOTH: MediaKinds = MediaKinds {
        video: true,
        audio: true,
    };

    pub fn is_empty(&self) -> bool {
        !self.video && !self.audio
    }

    pub fn contains(&self, kind: TrackKind) -> bool {
        match kind {
            TrackKind::Video => self.video,
            TrackKind::Audio => self.audio,
        }
    }

    /// Requested kinds in a stable order (video first).
    pub fn iter(&self) -> impl Iterator<Item = TrackKind> {
        let kinds = *self;
        [TrackKind::Video, TrackKind::Audio]
            .into_iter()
            .filter(move |k| kinds.contains(*k))
    }
}

/// A live hardware track (camera or microphone)
///
/// Tracks are shared read-only with observers such as the level monitor;
/// only the owning [`StreamHandle`] stops them.
pub trait MediaTrack: Send + Sync {
    fn kind(&self) -> TrackKind;

    /// Human readable device label
    fn label(&self) -> &str;

    fn is_live(&self) -> bool;

    /// Stop the track. Must be idempotent.
    fn stop(&self);

    /// Copy the most recent time-domain samples (mono, -1.0..=1.0) into `out`.
    ///
    /// Returns the number of samples written; video tracks and stopped
    /// tracks write nothing.
    fn read_samples(&self, _out: &mut [f32]) -> usize {
        0
    }
}

/// Ownership token for the tracks of one acquisition
///
/// Dropping the handle stops every track, so a handle can never outlive its
/// hardware.
pub struct StreamHandle {
    id: Uuid,
    tracks: Vec<Arc<dyn MediaTrack>>,
}

impl StreamHandle {
    pub fn new(tracks: Vec<Arc<dyn MediaTrack>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tracks,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn tracks(&self) -> &[Arc<dyn MediaTrack>] {
        &self.tracks
    }

    pub fn kinds(&self) -> MediaKinds {
        MediaKinds {
            video: self.track(TrackKind::Video).is_some(),
            audio: self.track(TrackKind::Audio).is_some(),
        }
    }

    pub fn track(&self, kind: TrackKind) -> Option<Arc<dyn MediaTrack>> {
        self.tracks.iter().find(|t| t.kind() == kind).cloned()
    }

    pub fn audio_track(&self) -> Option<Arc<dyn MediaTrack>> {
        self.track(TrackKind::Audio)
    }

    /// True while at least one track is still live
    pub fn is_live(&self) -> bool {
        self.tracks.iter().any(|t| t.is_live())
    }

    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

impl fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<&str> = self.tracks.iter().map(|t| t.label()).collect();
        f.debug_struct("StreamHandle")
            .field("id", &self.id)
            .field("tracks", &labels)
            .finish()
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.stop_all();
    }
}
