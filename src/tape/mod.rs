//! Tape drive peripheral
//!
//! - [`dfpwm`]: 1-bit DFPWM to 8-bit PCM decoder
//! - [`image`]: `CTDT` tape image files
//! - [`drive`]: the drive itself and mixer playback

pub mod dfpwm;
pub mod drive;
pub mod image;

pub use dfpwm::DfpwmDecoder;
pub use drive::{build_wav, TapeDrive, TapeOptions, TapeState, BASE_SAMPLE_RATE};
pub use image::TapeImage;
