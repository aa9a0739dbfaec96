//! Task session management
//!
//! A [`TaskSessionController`] drives one timed assessment task:
//! - Camera/microphone acquisition (with retry after denial)
//! - Live loudness metering while recording
//! - Countdown with automatic completion at zero
//! - Status snapshots and transition events for the view layer

mod config;
mod controller;
mod engine;
mod status;

pub use config::TaskConfig;
pub use controller::TaskSessionController;
pub use engine::SessionEngine;
pub use status::{EndReason, SessionEvent, SessionStatus, TaskSessionState};
