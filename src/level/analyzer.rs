// Frequency-domain snapshots of a microphone track
//
// SpectrumAnalyzer reproduces the byte spectrum a browser analyser node
// reports: Blackman window over the last `fft_size` samples, magnitude
// smoothing across snapshots, then a decibel range mapped onto 0..=255.

use std::f32::consts::TAU;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::config::MonitorConfig;
use crate::device::MediaTrack;

/// Supplies the current frequency-bin magnitudes of an audio track
pub trait SignalSource: Send + Sync {
    /// Number of bins written by [`frequency_snapshot`](Self::frequency_snapshot)
    fn bin_count(&self) -> usize;

    /// Fill `bins` with magnitudes (0..=255) computed at call time.
    ///
    /// Only reads from `track`; never stops or otherwise mutates it.
    fn frequency_snapshot(&self, track: &dyn MediaTrack, bins: &mut [u8]);
}

/// Reports the same magnitude in every bin regardless of input
pub struct ConstantSpectrum {
    value: AtomicU8,
    bins: usize,
}

impl ConstantSpectrum {
    pub fn new(value: u8, bins: usize) -> Self {
        Self {
            value: AtomicU8::new(value),
            bins,
        }
    }

    pub fn set(&self, value: u8) {
        self.value.store(value, Ordering::SeqCst);
    }
}

impl SignalSource for ConstantSpectrum {
    fn bin_count(&self) -> usize {
        self.bins
    }

    fn frequency_snapshot(&self, _track: &dyn MediaTrack, bins: &mut [u8]) {
        bins.fill(self.value.load(Ordering::SeqCst));
    }
}

struct AnalyzerState {
    time: Vec<f32>,
    smoothed: Vec<f32>,
}

/// Windowed DFT spectrum with smoothing and decibel mapping
pub struct SpectrumAnalyzer {
    fft_size: usize,
    smoothing: f32,
    min_decibels: f32,
    max_decibels: f32,
    window: Vec<f32>,
    cos_table: Vec<f32>,
    sin_table: Vec<f32>,
    state: Mutex<AnalyzerState>,
}

impl SpectrumAnalyzer {
    pub fn new(config: &MonitorConfig) -> Self {
        let fft_size = config.fft_size.clamp(32, 32768).next_power_of_two();
        let (min_decibels, max_decibels) = if config.min_decibels < config.max_decibels {
            (config.min_decibels, config.max_decibels)
        } else {
            (-100.0, -30.0)
        };

        let n = fft_size as f32;
        let window = (0..fft_size)
            .map(|i| {
                let x = i as f32 / n;
                0.42 - 0.5 * (TAU * x).cos() + 0.08 * (2.0 * TAU * x).cos()
            })
            .collect();
        let cos_table = (0..fft_size).map(|m| (TAU * m as f32 / n).cos()).collect();
        let sin_table = (0..fft_size).map(|m| (TAU * m as f32 / n).sin()).collect();

        Self {
            fft_size,
            smoothing: config.smoothing.clamp(0.0, 1.0),
            min_decibels,
            max_decibels,
            window,
            cos_table,
            sin_table,
            state: Mutex::new(AnalyzerState {
                time: vec![0.0; fft_size],
                smoothed: vec![0.0; fft_size / 2],
            }),
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    fn to_byte(&self, magnitude: f32) -> u8 {
        if magnitude <= 0.0 {
            return 0;
        }
        let db = 20.0 * magnitude.log10();
        let scaled = (db - self.min_decibels) / (self.max_decibels - self.min_decibels) * 255.0;
        scaled.clamp(0.0, 255.0) as u8
    }
}

impl SignalSource for SpectrumAnalyzer {
    fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    fn frequency_snapshot(&self, track: &dyn MediaTrack, bins: &mut [u8]) {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let state = &mut *guard;
        let n = self.fft_size;

        let read = track.read_samples(&mut state.time).min(n);
        state.time[read..].fill(0.0);

        for (k, smoothed) in state.smoothed.iter_mut().enumerate() {
            let mut re = 0.0f32;
            let mut im = 0.0f32;
            for (j, (&x, &w)) in state.time.iter().zip(&self.window).enumerate() {
                let v = x * w;
                let m = (k * j) % n;
                re += v * self.cos_table[m];
                im -= v * self.sin_table[m];
            }
            let magnitude = (re * re + im * im).sqrt() / n as f32;
            *smoothed = self.smoothing * *smoothed + (1.0 - self.smoothing) * magnitude;
        }

        for (bin, &magnitude) in bins.iter_mut().zip(&state.smoothed) {
            *bin = self.to_byte(magnitude);
        }
    }
}
