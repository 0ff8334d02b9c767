// Configuration management for Delaycam

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::capture::DelaySettings;
use crate::encoding::{CodecPreference, ContainerPreference};

/// Shortest selectable playback delay
pub const MIN_DELAY_SECS: u32 = 1;
/// Longest selectable playback delay
pub const MAX_DELAY_SECS: u32 = 30;
/// Shortest retained history
pub const MIN_BUFFER_SECS: u32 = 5;
/// Longest retained history
pub const MAX_BUFFER_SECS: u32 = 60;
/// Capture/display tick rate
pub const DEFAULT_CADENCE_HZ: u32 = 10;
/// Fastest selectable tick rate
pub const MAX_CADENCE_HZ: u32 = 60;

/// Error type for configuration handling
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// How far behind live the mirror runs, in seconds (1-30)
    #[serde(default = "default_delay_secs")]
    pub delay_secs: u32,

    /// How much history is kept for export, in seconds (5-60).
    /// Never shorter than the delay in practice; the buffer grows to fit it.
    #[serde(default = "default_buffer_secs")]
    pub buffer_secs: u32,

    /// Capture and display ticks per second
    #[serde(default = "default_cadence_hz")]
    pub cadence_hz: u32,

    /// Preferred export codec ("auto", "av1", "hevc", "h264", "vp9")
    #[serde(default)]
    pub codec: CodecPreference,

    /// Preferred export container ("auto", "mkv", "mp4", "webm")
    #[serde(default)]
    pub container: ContainerPreference,

    /// Where exported clips are written
    #[serde(default = "get_default_export_dir")]
    pub export_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            delay_secs: default_delay_secs(),
            buffer_secs: default_buffer_secs(),
            cadence_hz: default_cadence_hz(),
            codec: CodecPreference::default(),
            container: ContainerPreference::default(),
            export_dir: get_default_export_dir(),
        }
    }
}

impl Config {
    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validated()
    }

    /// Load config from disk or return default
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Failed to load config from {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Save config to disk
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;

        Ok(())
    }

    /// Clamp delay, buffer and cadence into their bounds; reject a zero cadence
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        if self.cadence_hz == 0 {
            return Err(ConfigError::InvalidConfiguration(
                "cadence_hz must be greater than zero".into(),
            ));
        }

        if self.cadence_hz > MAX_CADENCE_HZ {
            log::warn!(
                "cadence_hz {} above {}, using {}",
                self.cadence_hz,
                MAX_CADENCE_HZ,
                MAX_CADENCE_HZ
            );
            self.cadence_hz = MAX_CADENCE_HZ;
        }

        let delay = self.delay_secs.clamp(MIN_DELAY_SECS, MAX_DELAY_SECS);
        if delay != self.delay_secs {
            log::warn!(
                "delay_secs {} out of range {}-{}, using {}",
                self.delay_secs,
                MIN_DELAY_SECS,
                MAX_DELAY_SECS,
                delay
            );
            self.delay_secs = delay;
        }

        let buffer = self.buffer_secs.clamp(MIN_BUFFER_SECS, MAX_BUFFER_SECS);
        if buffer != self.buffer_secs {
            log::warn!(
                "buffer_secs {} out of range {}-{}, using {}",
                self.buffer_secs,
                MIN_BUFFER_SECS,
                MAX_BUFFER_SECS,
                buffer
            );
            self.buffer_secs = buffer;
        }

        Ok(self)
    }

    /// Settings for the delay buffer
    pub fn delay_settings(&self) -> DelaySettings {
        DelaySettings::new(
            self.delay_secs as f64,
            self.buffer_secs as f64,
            self.cadence_hz as f64,
        )
    }

    /// Get the config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("delaycam")
            .join("config.toml")
    }
}

/// Get the default directory for exported clips
fn get_default_export_dir() -> PathBuf {
    dirs::video_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join("Videos")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Delaycam")
}

fn default_delay_secs() -> u32 {
    5
}

fn default_buffer_secs() -> u32 {
    30
}

fn default_cadence_hz() -> u32 {
    DEFAULT_CADENCE_HZ
}
