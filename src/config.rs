//! Environment configuration
//!
//! Numeric audio settings with the clamping rules the environment applies
//! before allocating buses. Settings can be loaded from TOML.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

pub const MIN_CHANNELS: usize = 1;
pub const MAX_CHANNELS: usize = 32;
pub const MAX_INPUT_BUSES: usize = 32;
pub const MAX_BUSES: usize = 1024;

/// What `get`/`set` do when a path does not resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathPolicy {
    /// Return an error immediately
    #[default]
    Hard,
    /// Log a warning and ignore the request
    Soft,
}

/// Base audio settings for an environment
///
/// # Example
/// ```toml
/// sample_rate = 48000.0
/// block_size = 128
/// chans = 2
/// num_buses = 16
/// path_policy = "soft"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Audio sample rate in Hz
    pub sample_rate: f64,
    /// Samples per audio-rate block
    pub block_size: usize,
    /// Hardware output channels (buses 0..chans)
    pub chans: usize,
    /// Total shared buses
    pub num_buses: usize,
    /// Buses reserved for hardware input, placed after the output buses
    pub num_input_buses: usize,
    /// Path resolution failure policy
    pub path_policy: PathPolicy,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: 44100.0,
            block_size: 64,
            chans: 2,
            num_buses: 8,
            num_input_buses: 2,
            path_policy: PathPolicy::Hard,
        }
    }
}

impl AudioSettings {
    /// Parse settings from a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings: AudioSettings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings.clamped())
    }

    /// Load settings from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    fn validate(&self) -> Result<()> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(Error::Config(format!(
                "sample_rate must be positive, got {}",
                self.sample_rate
            )));
        }
        Ok(())
    }

    /// Apply the channel and bus clamping rules.
    ///
    /// A sample rate that is not a positive finite number falls back to the
    /// default. Channel and input bus counts are clamped to their supported
    /// ranges, then the bus count is raised to cover every output and input bus.
    pub fn clamped(mut self) -> Self {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            warn!(sample_rate = self.sample_rate, "unusable sample rate, using default");
            self.sample_rate = Self::default().sample_rate;
        }
        self.block_size = self.block_size.max(1);
        self.chans = self.chans.clamp(MIN_CHANNELS, MAX_CHANNELS);
        self.num_input_buses = self.num_input_buses.min(MAX_INPUT_BUSES);
        self.num_buses = self
            .num_buses
            .clamp(MIN_CHANNELS, MAX_BUSES)
            .max(self.chans + self.num_input_buses);
        self
    }

    /// Index of the first hardware input bus
    pub fn first_input_bus(&self) -> usize {
        self.chans
    }

    /// Index of the first interconnect bus
    pub fn first_interconnect_bus(&self) -> usize {
        self.chans + self.num_input_buses
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = AudioSettings::default();
        assert_eq!(settings.sample_rate, 44100.0);
        assert_eq!(settings.block_size, 64);
        assert_eq!(settings.chans, 2);
        assert_eq!(settings.path_policy, PathPolicy::Hard);
    }

    #[test]
    fn test_clamp_channels_and_buses() {
        let settings = AudioSettings {
            chans: 100,
            num_buses: 2,
            num_input_buses: 64,
            ..AudioSettings::default()
        }
        .clamped();

        assert_eq!(settings.chans, MAX_CHANNELS);
        assert_eq!(settings.num_input_buses, MAX_INPUT_BUSES);
        assert_eq!(settings.num_buses, MAX_CHANNELS + MAX_INPUT_BUSES);
    }

    #[test]
    fn test_clamp_replaces_unusable_sample_rate() {
        for bad in [0.0, -48000.0, f64::NAN, f64::INFINITY] {
            let settings = AudioSettings {
                sample_rate: bad,
                ..AudioSettings::default()
            }
            .clamped();
            assert_eq!(settings.sample_rate, 44100.0);
        }

        let settings = AudioSettings {
            sample_rate: 8.0,
            ..AudioSettings::default()
        }
        .clamped();
        assert_eq!(settings.sample_rate, 8.0);
    }

    #[test]
    fn test_bus_count_raised_to_channel_count() {
        let settings = AudioSettings {
            chans: 4,
            num_buses: 1,
            num_input_buses: 0,
            ..AudioSettings::default()
        }
        .clamped();
        assert_eq!(settings.num_buses, 4);
        assert_eq!(settings.first_interconnect_bus(), 4);
    }

    #[test]
    fn test_from_toml() {
        let settings = AudioSettings::from_toml_str(
            r#"
            sample_rate = 48000.0
            block_size = 128
            path_policy = "soft"
            "#,
        )
        .unwrap();

        assert_eq!(settings.sample_rate, 48000.0);
        assert_eq!(settings.block_size, 128);
        assert_eq!(settings.chans, 2);
        assert_eq!(settings.path_policy, PathPolicy::Soft);
    }

    #[test]
    fn test_from_toml_rejects_bad_sample_rate() {
        let result = AudioSettings::from_toml_str("sample_rate = -1.0");
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
