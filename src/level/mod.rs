//! Live microphone loudness
//!
//! A [`LevelMonitor`] asks a [`SignalSource`] for a byte spectrum on every
//! tick and reduces it to a [`LoudnessSample`] in 0..=100.

pub mod analyzer;
pub mod loudness;
pub mod monitor;

pub use analyzer::{ConstantSpectrum, SignalSource, SpectrumAnalyzer};
pub use loudness::{LoudnessBucket, LoudnessSample, METER_SEGMENTS};
pub use monitor::{LevelMonitor, LevelReading, Subscription, LEVEL_TICKER};
