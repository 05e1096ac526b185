//! Live audio output
//!
//! Plays a [`SoftMixer`](crate::SoftMixer) on the system's default output
//! device. The device pulls fixed-size blocks from the mixer, so channel
//! effects and tape playback run on the audio thread exactly as they would
//! inside a host mixer.

pub mod audio_device;

pub use audio_device::AudioDevice;

/// Frames rendered per pull from the mixer
pub const DEFAULT_BLOCK_FRAMES: usize = 1024;
