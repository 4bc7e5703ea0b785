//! Settings document for one experimental setup.
//!
//! The settings are a TOML file with the clock parameters, the synthesizer link, and one table
//! per channel kind mapping channel names to addresses:
//!
//! ```toml
//! [clock]
//! rate = 1e6              # Hz
//! max_duration = 100.0    # s
//! start_offset = 100e-6   # s
//!
//! [novatech]
//! serial = "/dev/ttyUSB0"
//! min_trigger_width = 100e-6
//!
//! [ao_ch]
//! coil_sum = 0
//!
//! [do_ch]
//! shutter = 3
//!
//! [dds_ch]
//! cooling_freq = 0
//! ```
//!
//! Every section and key is optional and falls back to [`SequencerConfig::default`].

use indexmap::IndexMap;
use serde::Deserialize;
use std::path::Path;

use crate::channel::{ChannelKind, ChannelMap};
use crate::error::ConfigError;
use crate::sequencer::SequencerConfig;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClockSettings {
    pub rate: f64,
    pub max_duration: f64,
    pub start_offset: f64,
}

impl Default for ClockSettings {
    fn default() -> Self {
        let defaults = SequencerConfig::default();
        Self {
            rate: defaults.clock_rate,
            max_duration: defaults.max_duration,
            start_offset: defaults.start_offset,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct NovatechSettings {
    /// Serial device of the synthesizer. Absent or empty: the synthesizer is not programmed.
    pub serial: Option<String>,
    pub min_trigger_width: f64,
}

impl Default for NovatechSettings {
    fn default() -> Self {
        Self {
            serial: None,
            min_trigger_width: SequencerConfig::default().min_trigger_width,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub clock: ClockSettings,
    pub novatech: NovatechSettings,
    pub ao_ch: IndexMap<String, usize>,
    pub do_ch: IndexMap<String, usize>,
    pub dds_ch: IndexMap<String, usize>,
}

impl Settings {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        log::info!("Loading settings from {}", path.display());
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("clock.rate", self.clock.rate),
            ("clock.max_duration", self.clock.max_duration),
            ("novatech.min_trigger_width", self.novatech.min_trigger_width),
        ];
        for (key, value) in positive {
            if !value.is_finite() || value <= 0. {
                return Err(ConfigError::Invalid(format!(
                    "{key} must be finite and positive, got {value}"
                )));
            }
        }
        if !self.clock.start_offset.is_finite() || self.clock.start_offset < 0. {
            return Err(ConfigError::Invalid(format!(
                "clock.start_offset must be finite and non-negative, got {}",
                self.clock.start_offset
            )));
        }
        Ok(())
    }

    /// Serial device of the synthesizer, if one is configured.
    pub fn novatech_serial(&self) -> Option<&str> {
        self.novatech
            .serial
            .as_deref()
            .filter(|serial| !serial.trim().is_empty())
    }

    /// Builds the channel map from the `ao_ch`, `do_ch`, and `dds_ch` tables.
    ///
    /// A name may appear in only one table.
    pub fn channel_map(&self) -> Result<ChannelMap, ConfigError> {
        let mut channels = ChannelMap::new();
        let tables = [
            (ChannelKind::Analog, &self.ao_ch),
            (ChannelKind::Digital, &self.do_ch),
            (ChannelKind::Synth, &self.dds_ch),
        ];
        for (kind, table) in tables {
            for (name, address) in table.iter() {
                channels.add_channel(name, kind, *address)?;
            }
        }
        Ok(channels)
    }

    pub fn sequencer_config(&self) -> SequencerConfig {
        SequencerConfig {
            clock_rate: self.clock.rate,
            max_duration: self.clock.max_duration,
            start_offset: self.clock.start_offset,
            min_trigger_width: self.novatech.min_trigger_width,
            ..Default::default()
        }
    }
}
