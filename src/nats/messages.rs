use serde::{Deserialize, Serialize};

use crate::clock::format_remaining;
use crate::device::DeviceState;
use crate::session::{EndReason, SessionStatus, TaskSessionState};

/// Session status message published to NATS
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub task_id: String,
    pub state: TaskSessionState,
    pub device: DeviceState,
    pub device_error: Option<String>,
    /// 0.0 - 100.0, absent while not metering
    pub loudness: Option<f32>,
    /// Operator-facing label ("Good", "Very Loud", ...)
    pub loudness_label: Option<String>,
    pub remaining_secs: u32,
    /// `m:ss` rendering of `remaining_secs`
    pub remaining: String,
    pub end_reason: Option<EndReason>,
    pub timestamp: String, // RFC3339 timestamp
}

impl From<&SessionStatus> for StatusMessage {
    fn from(status: &SessionStatus) -> Self {
        Self {
            task_id: status.task_id.clone(),
            state: status.state,
            device: status.device,
            device_error: status.device_error.clone(),
            loudness: status.loudness.map(|l| l.value()),
            loudness_label: status.loudness_bucket.map(|b| b.label().to_string()),
            remaining_secs: status.remaining_secs,
            remaining: format_remaining(status.remaining_secs),
            end_reason: status.end_reason,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
