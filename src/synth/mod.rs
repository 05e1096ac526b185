//! Programmable sound channels
//!
//! - [`waveform`]: wave shapes and the per-sample oracle
//! - [`channel`]: one channel's oscillator state and its mixer effect
//! - [`bank`]: the channels of one computer and their mixer slots
//! - [`api`]: validated script-facing operations on a bank

pub mod api;
pub mod bank;
pub mod channel;
pub mod waveform;

pub use api::{InterpolationArg, WaveArg, WaveReport};
pub use bank::{group_tag, ChannelBank, SILENT_CHUNK_BYTES};
pub use channel::{Channel, CUSTOM_WAVE_CAPACITY};
pub use waveform::{Interpolation, Shape, WaveType};
