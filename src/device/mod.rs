//! Camera/microphone stream lifecycle
//!
//! - [`MediaProvider`]: the platform capability that grants streams
//! - [`StreamHandle`]: ownership token for the granted tracks
//! - [`DeviceStreamManager`]: holds at most one stream and tracks
//!   Pending/Active/Denied

pub mod file;
pub mod manager;
pub mod provider;
pub mod simulated;
pub mod track;

pub use file::AudioFile;
pub use manager::{DeviceState, DeviceStatus, DeviceStreamManager};
pub use provider::{MediaProvider, ProviderFactory};
pub use simulated::{AcquireGate, SimulatedProvider};
pub use track::{MediaKinds, MediaTrack, StreamHandle, TrackKind};
