use anyhow::{Context, Result};
use serde::Deserialize;

use crate::session::TaskConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub devices: DeviceConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub nats: NatsConfig,
    #[serde(default = "TaskConfig::assessment")]
    pub tasks: Vec<TaskConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

/// Where device streams come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceSource {
    /// Synthetic camera and tone-generator microphone
    Simulated,
    /// Synthetic camera, microphone replays `wav_path`
    File,
}

/// How a simulated platform answers permission prompts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Grant,
    Deny,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub source: DeviceSource,
    pub has_camera: bool,
    pub has_microphone: bool,
    pub permission: Permission,
    /// Simulated permission-prompt latency
    pub latency_ms: u64,
    pub tone_hz: f32,
    /// Peak amplitude of the simulated microphone tone (0.0 - 1.0)
    pub tone_amplitude: f32,
    pub sample_rate: u32,
    pub wav_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Sampling period; ~30 Hz is enough for a live meter
    pub tick_ms: u64,
    /// Time-domain window; half of it is the number of frequency bins
    pub fft_size: usize,
    /// Spectrum smoothing time constant (0.0 - 1.0)
    pub smoothing: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    pub enabled: bool,
    pub url: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "media-session".to_string(),
            http: HttpConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8088,
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            source: DeviceSource::Simulated,
            has_camera: true,
            has_microphone: true,
            permission: Permission::Grant,
            latency_ms: 0,
            tone_hz: 440.0,
            tone_amplitude: 0.3,
            sample_rate: 16000,
            wav_path: None,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_ms: 33,     // ~30 Hz
            fft_size: 256,   // 128 bins
            smoothing: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "nats://localhost:4222".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            devices: DeviceConfig::default(),
            monitor: MonitorConfig::default(),
            nats: NatsConfig::default(),
            tasks: TaskConfig::assessment(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("MEDIA_SESSION").separator("__"))
            .build()
            .with_context(|| format!("Failed to read config {}", path))?;

        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_partial_file_uses_defaults() -> Result<()> {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
        writeln!(
            file,
            r#"
[devices]
permission = "deny"
latency_ms = 250

[[tasks]]
task_id = "warmup"
title = "Warm-up"
duration_secs = 5
video = false
audio = true
"#
        )?;

        let path = file.path().with_extension("");
        let cfg = Config::load(path.to_str().unwrap())?;

        assert_eq!(cfg.devices.permission, Permission::Deny);
        assert_eq!(cfg.devices.latency_ms, 250);
        assert!(cfg.devices.has_camera);
        assert_eq!(cfg.monitor.fft_size, 256);
        assert_eq!(cfg.service.http.port, 8088);
        assert_eq!(cfg.tasks.len(), 1);
        assert_eq!(cfg.tasks[0].duration_secs, 5);
        assert!(!cfg.tasks[0].kinds().video);

        Ok(())
    }

    #[test]
    fn test_default_catalog() {
        let cfg = Config::default();
        let ids: Vec<&str> = cfg.tasks.iter().map(|t| t.task_id.as_str()).collect();
        assert_eq!(ids, vec!["name-response", "social-engagement", "free-play"]);
    }
}
