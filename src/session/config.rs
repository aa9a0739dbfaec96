use serde::{Deserialize, Serialize};

use crate::device::MediaKinds;

/// Configuration for one timed task of the assessment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Stable identifier (e.g. "name-response")
    pub task_id: String,

    /// Operator-facing title
    #[serde(default)]
    pub title: String,

    /// Recording length; the countdown starts here
    pub duration_secs: u32,

    /// Record from the camera
    #[serde(default = "enabled")]
    pub video: bool,

    /// Record from (and meter) the microphone
    #[serde(default = "enabled")]
    pub audio: bool,
}

fn enabled() -> bool {
    true
}

impl TaskConfig {
    pub fn new(task_id: impl Into<String>, kinds: MediaKinds, duration_secs: u32) -> Self {
        let task_id = task_id.into();
        Self {
            title: task_id.clone(),
            task_id,
            duration_secs,
            video: kinds.video,
            audio: kinds.audio,
        }
    }

    pub fn kinds(&self) -> MediaKinds {
        MediaKinds {
            video: self.video,
            audio: self.audio,
        }
    }

    /// The three observation tasks, in order
    pub fn assessment() -> Vec<TaskConfig> {
        vec![
            TaskConfig {
                task_id: "name-response".to_string(),
                title: "Name Response".to_string(),
                duration_secs: 60,
                video: true,
                audio: true,
            },
            TaskConfig {
                task_id: "social-engagement".to_string(),
                title: "Social Engagement".to_string(),
                duration_secs: 90,
                video: true,
                audio: true,
            },
            TaskConfig {
                task_id: "free-play".to_string(),
                title: "Free Play Observation".to_string(),
                duration_secs: 120,
                video: true,
                audio: true,
            },
        ]
    }
}
