//! Programmable sound channels and DFPWM tape playback for CraftOS-PC
//!
//! Two audio cores that plug into an external channel-based mixer:
//! a bank of per-computer software-synthesis channels (sine, triangle,
//! sawtooth, square with duty, noise, pitched noise and custom wavetables)
//! with click-free volume changes, stereo pan and linear fades; and a tape
//! drive that decodes 1-bit DFPWM audio to 8-bit PCM and plays it through the
//! same mixer with a live software volume.
//!
//! # Features
//! - Sample-accurate waveform synthesis rendered inside mixer effect callbacks
//! - Deferred amplitude commit on discontinuous waves (no zipper noise)
//! - DFPWM decoder with charge/strength adaptation, antijerk and low-pass
//! - `CTDT` tape images on disk with label, seek and byte I/O
//! - Any 8/16/32-bit integer or 32-bit float output layout, either byte order
//!
//! # Crate feature flags
//! - `synth` (default): sound channels, banks and the plugin registry (`synth`, `plugin`)
//! - `tape` (default): DFPWM decoder and tape drive (`tape`)
//! - `streaming` (opt-in): live output of a [`SoftMixer`] through `rodio`, plus the CLI
//!
//! # Quick start
//! ```no_run
//! # #[cfg(feature = "synth")]
//! # {
//! use craftos_sound::{SoftMixer, SoundConfig, SoundPlugin, WaveArg};
//! use std::sync::Arc;
//!
//! let mixer = Arc::new(SoftMixer::default());
//! let plugin = SoundPlugin::new(mixer.clone(), SoundConfig::default());
//! let bank = plugin.open(0).unwrap();
//! bank.set_wave_type(1, "sine", WaveArg::None).unwrap();
//! bank.set_frequency(1, 440).unwrap();
//! bank.set_volume(1, 0.8).unwrap();
//!
//! let mut block = vec![0u8; 4096];
//! mixer.render(&mut block);
//! # }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod format;
pub mod mixer;
#[cfg(feature = "synth")]
pub mod plugin; // Per-computer bank registry
#[cfg(feature = "streaming")]
pub mod streaming; // Audio Output & Streaming
#[cfg(feature = "synth")]
pub mod synth; // Sound Channels
#[cfg(feature = "tape")]
pub mod tape; // Tape Drive & DFPWM

/// Error types for sound channel and tape operations
#[derive(thiserror::Error, Debug)]
pub enum SoundError {
    /// Bad argument from the script side; nothing was changed
    #[error("{0}")]
    Validation(String),

    /// The mixer could not provide a slot or chunk
    #[error("Mixer resource error: {0}")]
    Resource(String),

    /// Malformed tape image or audio data
    #[error("Format error: {0}")]
    Format(String),

    /// IO error from the filesystem or audio device
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SoundError {
    /// Build a validation error in the host's `bad argument #N (reason)` form
    pub fn validation(arg: usize, reason: impl std::fmt::Display) -> Self {
        SoundError::Validation(format!("bad argument #{} ({})", arg, reason))
    }
}

/// Result type for sound operations
pub type Result<T> = std::result::Result<T, SoundError>;

pub use config::{SoundConfig, DEFAULT_NUM_CHANNELS, MAX_CHANNELS};
pub use format::{read_sample, scale_buffer, scale_sample, write_sample, SampleFormat};
pub use mixer::{Chunk, Effect, GroupTag, Loops, Mixer, MixerSpec, SlotId, SoftMixer};

#[cfg(feature = "synth")]
pub use plugin::{SoundPlugin, API_VERSION};
#[cfg(feature = "synth")]
pub use synth::{
    Channel, ChannelBank, Interpolation, InterpolationArg, WaveArg, WaveReport, WaveType,
    CUSTOM_WAVE_CAPACITY,
};

#[cfg(feature = "tape")]
pub use tape::{DfpwmDecoder, TapeDrive, TapeImage, TapeOptions, TapeState, BASE_SAMPLE_RATE};

#[cfg(feature = "streaming")]
pub use streaming::AudioDevice;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message() {
        let err = SoundError::validation(1, "channel out of range");
        assert_eq!(err.to_string(), "bad argument #1 (channel out of range)");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: SoundError = io.into();
        assert!(matches!(err, SoundError::Io(_)));
    }
}
