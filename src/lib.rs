pub mod calibration;
pub mod clock;
pub mod config;
pub mod device;
pub mod error;
pub mod http;
pub mod level;
pub mod nats;
pub mod schedule;
pub mod session;

pub use calibration::{calibrate, calibrate_with_level, CalibrationReport, CALIBRATION_SAMPLES};
pub use clock::{format_remaining, ClockEvent, ClockHandle, CountdownState, SessionClock};
pub use config::Config;
pub use device::{
    AudioFile, DeviceState, DeviceStatus, DeviceStreamManager, MediaKinds, MediaProvider,
    MediaTrack, ProviderFactory, SimulatedProvider, StreamHandle, TrackKind,
};
pub use error::MediaError;
pub use http::{create_router, AppState};
pub use level::{LevelMonitor, LevelReading, LoudnessBucket, LoudnessSample, SpectrumAnalyzer};
pub use nats::{StatusMessage, StatusPublisher};
pub use schedule::{ManualScheduler, Scheduler, Ticker, TokioScheduler};
pub use session::{
    EndReason, SessionEngine, SessionEvent, SessionStatus, TaskConfig, TaskSessionController,
    TaskSessionState,
};
