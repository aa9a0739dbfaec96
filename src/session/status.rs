use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::device::DeviceState;
use crate::level::{LoudnessBucket, LoudnessSample};

/// Per-task recording lifecycle: Idle -> Recording -> Complete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskSessionState {
    #[default]
    Idle,
    Recording,
    Complete,
}

/// What ended a recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// Operator pressed stop
    Requested,
    /// Countdown reached zero
    Expired,
    /// Controller torn down mid-recording
    Disposed,
}

/// Snapshot pushed to the view layer on every change
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub task_id: String,

    pub state: TaskSessionState,

    /// Camera/microphone activation
    pub device: DeviceState,

    /// Why the device is denied, if it is
    pub device_error: Option<String>,

    /// Latest loudness; `None` while not metering
    pub loudness: Option<LoudnessSample>,

    pub loudness_bucket: Option<LoudnessBucket>,

    /// False when running video-only (no microphone track)
    pub level_monitoring: bool,

    pub remaining_secs: u32,

    pub end_reason: Option<EndReason>,

    pub started_at: Option<DateTime<Utc>>,

    pub completed_at: Option<DateTime<Utc>>,

    /// Controller has released its devices and accepts no more requests
    pub disposed: bool,
}

impl SessionStatus {
    pub fn new(task_id: impl Into<String>, duration_secs: u32) -> Self {
        Self {
            task_id: task_id.into(),
            state: TaskSessionState::Idle,
            device: DeviceState::Pending,
            device_error: None,
            loudness: None,
            loudness_bucket: None,
            level_monitoring: false,
            remaining_secs: duration_secs,
            end_reason: None,
            started_at: None,
            completed_at: None,
            disposed: false,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.state == TaskSessionState::Recording
    }
}

/// Discrete transitions, for consumers that act on events rather than state
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    StateChanged {
        from: TaskSessionState,
        to: TaskSessionState,
    },
    DeviceChanged {
        state: DeviceState,
    },
    /// Emitted exactly once per controller, on entering Complete
    Completed {
        reason: EndReason,
    },
}
