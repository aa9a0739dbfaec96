use serde::Serialize;

/// Largest value a byte frequency bin can hold
pub const MAX_MAGNITUDE: u8 = u8::MAX;

/// Segments in the bar meter shown next to the microphone status
pub const METER_SEGMENTS: usize = 20;

/// Normalized microphone loudness, always within 0.0..=100.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize)]
#[serde(transparent)]
pub struct LoudnessSample(f32);

impl LoudnessSample {
    pub const SILENT: LoudnessSample = LoudnessSample(0.0);

    /// Clamp an arbitrary level into range (NaN reads as silence)
    pub fn new(level: f32) -> Self {
        if level.is_nan() {
            return Self::SILENT;
        }
        Self(level.clamp(0.0, 100.0))
    }

    /// Mean bin magnitude scaled so that all-max bins read 100
    pub fn from_bins(bins: &[u8]) -> Self {
        if bins.is_empty() {
            return Self::SILENT;
        }

        let sum: u64 = bins.iter().map(|&b| b as u64).sum();
        let mean = sum as f64 / bins.len() as f64;
        Self::new((mean / MAX_MAGNITUDE as f64 * 100.0) as f32)
    }

    pub fn value(self) -> f32 {
        self.0
    }

    pub fn bucket(self) -> LoudnessBucket {
        LoudnessBucket::from_level(self.0)
    }

    /// How many of the [`METER_SEGMENTS`] bars are lit (bar `i` lights above `5 * i`)
    pub fn lit_segments(self) -> usize {
        (0..METER_SEGMENTS)
            .filter(|&i| self.0 > (i * 5) as f32)
            .count()
    }
}

/// Operator-facing loudness classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoudnessBucket {
    VeryQuiet,
    Quiet,
    Good,
    Loud,
    VeryLoud,
}

impl LoudnessBucket {
    pub fn from_level(level: f32) -> Self {
        if level < 10.0 {
            LoudnessBucket::VeryQuiet
        } else if level < 30.0 {
            LoudnessBucket::Quiet
        } else if level < 60.0 {
            LoudnessBucket::Good
        } else if level < 80.0 {
            LoudnessBucket::Loud
        } else {
            LoudnessBucket::VeryLoud
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LoudnessBucket::VeryQuiet => "Very Quiet",
            LoudnessBucket::Quiet => "Quiet",
            LoudnessBucket::Good => "Good",
            LoudnessBucket::Loud => "Loud",
            LoudnessBucket::VeryLoud => "Very Loud",
        }
    }
}
