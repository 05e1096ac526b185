//! Sound configuration
//!
//! The only recognized setting is `sound.numChannels`, the number of
//! channels in every computer's sound bank. It is read from the host's JSON
//! config file; any other keys in that file are ignored.

use crate::{Result, SoundError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Channels per bank when the setting is absent
pub const DEFAULT_NUM_CHANNELS: usize = 4;

/// Largest accepted `sound.numChannels`
pub const MAX_CHANNELS: usize = 256;

fn default_num_channels() -> usize {
    DEFAULT_NUM_CHANNELS
}

/// Configuration for sound banks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoundConfig {
    /// Number of channels in each computer's bank
    #[serde(rename = "sound.numChannels", default = "default_num_channels")]
    pub num_channels: usize,
}

impl SoundConfig {
    /// Parse a JSON config document
    pub fn from_json(json: &str) -> Result<Self> {
        let config: SoundConfig = serde_json::from_str(json)
            .map_err(|e| SoundError::Format(format!("Invalid sound config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Replace the channel count, validating it
    pub fn with_num_channels(mut self, num_channels: usize) -> Result<Self> {
        self.num_channels = num_channels;
        self.validate()?;
        Ok(self)
    }

    /// Check that every setting is in range
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_CHANNELS).contains(&self.num_channels) {
            return Err(SoundError::Validation(format!(
                "sound.numChannels must be between 1 and {}, got {}",
                MAX_CHANNELS, self.num_channels
            )));
        }
        Ok(())
    }
}

impl Default for SoundConfig {
    fn default() -> Self {
        SoundConfig {
            num_channels: DEFAULT_NUM_CHANNELS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_reads_channel_count() {
        let config = SoundConfig::from_json(r#"{"sound.numChannels": 8}"#).unwrap();
        assert_eq!(config.num_channels, 8);
    }

    #[test]
    fn test_absent_key_defaults() {
        let config = SoundConfig::from_json(r#"{"showFPS": true, "ramLimit": 1024}"#).unwrap();
        assert_eq!(config, SoundConfig::default());
        assert_eq!(config.num_channels, 4);
    }

    #[test]
    fn test_out_of_range_rejected() {
        assert!(matches!(
            SoundConfig::from_json(r#"{"sound.numChannels": 0}"#),
            Err(SoundError::Validation(_))
        ));
        assert!(SoundConfig::default().with_num_channels(257).is_err());
        assert!(SoundConfig::default().with_num_channels(256).is_ok());
    }

    #[test]
    fn test_bad_json_is_format_error() {
        assert!(matches!(
            SoundConfig::from_json(r#"{"sound.numChannels": "four"}"#),
            Err(SoundError::Format(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"sound.numChannels": 2}}"#).unwrap();
        let config = SoundConfig::load(file.path()).unwrap();
        assert_eq!(config.num_channels, 2);
    }
}
