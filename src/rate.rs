//! Rate system - the time granularities a unit generator can run at
//!
//! Each rate maps to a concrete sample rate and block size derived from the
//! environment's base audio settings.

use crate::config::AudioSettings;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Time granularity of a unit generator's output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rate {
    /// One sample per audio frame, `block_size` samples per block
    Audio,
    /// One sample per audio block
    Control,
    /// Never changes once constructed
    Constant,
    /// Produces a sample each time it is pulled
    Demand,
    /// Produces a sample each time a scheduler pushes a value
    Scheduled,
}

/// Concrete timing for a rate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateSpec {
    pub sample_rate: f64,
    pub block_size: usize,
}

impl Rate {
    /// Parse a rate tag or one of its short aliases ("ar", "kr", "cr", "dr", "sr")
    pub fn parse(token: &str) -> Result<Self> {
        match token {
            "audio" | "ar" => Ok(Rate::Audio),
            "control" | "kr" => Ok(Rate::Control),
            "constant" | "cr" => Ok(Rate::Constant),
            "demand" | "dr" => Ok(Rate::Demand),
            "scheduled" | "sr" => Ok(Rate::Scheduled),
            other => Err(Error::UnknownRate(other.to_string())),
        }
    }

    /// Canonical tag used in merged options and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Rate::Audio => "audio",
            Rate::Control => "control",
            Rate::Constant => "constant",
            Rate::Demand => "demand",
            Rate::Scheduled => "scheduled",
        }
    }

    /// Resolve this rate against the environment's audio settings.
    ///
    /// Control rate ticks once per audio block, so its sample rate is
    /// `sample_rate / block_size`. Demand and scheduled rates are not clocked.
    pub fn spec(&self, settings: &AudioSettings) -> RateSpec {
        match self {
            Rate::Audio => RateSpec {
                sample_rate: settings.sample_rate,
                block_size: settings.block_size,
            },
            Rate::Control | Rate::Constant => RateSpec {
                sample_rate: settings.sample_rate / settings.block_size as f64,
                block_size: 1,
            },
            Rate::Demand | Rate::Scheduled => RateSpec {
                sample_rate: 0.0,
                block_size: 1,
            },
        }
    }

    /// Inputs at this rate are read per sample (stride 1)
    pub fn is_audio(&self) -> bool {
        matches!(self, Rate::Audio)
    }

    /// Rates driven by the periodic block clock
    pub fn is_clocked(&self) -> bool {
        matches!(self, Rate::Audio | Rate::Control | Rate::Constant)
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_aliases() {
        assert_eq!(Rate::parse("ar").unwrap(), Rate::Audio);
        assert_eq!(Rate::parse("kr").unwrap(), Rate::Control);
        assert_eq!(Rate::parse("cr").unwrap(), Rate::Constant);
        assert_eq!(Rate::parse("dr").unwrap(), Rate::Demand);
        assert_eq!(Rate::parse("sr").unwrap(), Rate::Scheduled);
        assert_eq!(Rate::parse("control").unwrap(), Rate::Control);
        assert!(Rate::parse("fast").is_err());
    }

    #[test]
    fn test_rate_specs() {
        let settings = AudioSettings {
            sample_rate: 48000.0,
            block_size: 64,
            ..AudioSettings::default()
        };

        let audio = Rate::Audio.spec(&settings);
        assert_eq!(audio.block_size, 64);
        assert_eq!(audio.sample_rate, 48000.0);

        let control = Rate::Control.spec(&settings);
        assert_eq!(control.block_size, 1);
        assert_eq!(control.sample_rate, 750.0);

        let demand = Rate::Demand.spec(&settings);
        assert_eq!(demand.block_size, 1);
        assert_eq!(demand.sample_rate, 0.0);
    }
}
