//! Script-facing channel operations
//!
//! Each operation takes the 1-based channel number the script passed,
//! validates every argument, and only then takes the channel lock. Errors
//! carry the host's `bad argument #N (...)` message.

use super::bank::ChannelBank;
use super::channel::CUSTOM_WAVE_CAPACITY;
use super::waveform::{Interpolation, WaveType};
use crate::{Result, SoundError};

/// Below this many seconds a fade request cancels the running fade
const FADE_EPSILON: f64 = 1e-6;

/// Optional third argument of `set_wave_type`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum WaveArg<'a> {
    /// Not given
    #[default]
    None,
    /// Square duty cycle in `[0, 1]`
    Duty(f64),
    /// Custom wavetable points in `[-1, 1]`
    Table(&'a [f64]),
}

/// Interpolation mode as passed from a script: a name or `1`/`2`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InterpolationArg<'a> {
    /// `"none"` or `"linear"`
    Name(&'a str),
    /// `1` (none) or `2` (linear)
    Index(i64),
}

impl<'a> From<&'a str> for InterpolationArg<'a> {
    fn from(name: &'a str) -> Self {
        InterpolationArg::Name(name)
    }
}

impl From<i64> for InterpolationArg<'_> {
    fn from(index: i64) -> Self {
        InterpolationArg::Index(index)
    }
}

impl From<Interpolation> for InterpolationArg<'_> {
    fn from(mode: Interpolation) -> Self {
        match mode {
            Interpolation::None => InterpolationArg::Index(1),
            Interpolation::Linear => InterpolationArg::Index(2),
        }
    }
}

/// Result of `get_wave_type`
#[derive(Debug, Clone, PartialEq)]
pub struct WaveReport {
    /// Current shape
    pub wave: WaveType,
    /// Duty cycle, for square waves
    pub duty: Option<f64>,
    /// Wavetable copy, for custom waves
    pub table: Option<Vec<f64>>,
}

impl WaveReport {
    /// Shape name as scripts see it
    pub fn name(&self) -> &'static str {
        self.wave.name()
    }
}

impl ChannelBank {
    /// Current wave shape, with the duty for square and the table for custom
    pub fn get_wave_type(&self, channel: i64) -> Result<WaveReport> {
        let state = self.channel(channel)?.lock();
        Ok(WaveReport {
            wave: state.wave,
            duty: (state.wave == WaveType::Square).then_some(state.duty),
            table: (state.wave == WaveType::Custom)
                .then(|| state.custom_wave[..state.custom_wave_size].to_vec()),
        })
    }

    /// Change the wave shape
    ///
    /// `square` takes an optional duty (default 0.5); `custom` requires a
    /// wavetable and restarts the phase; `pitched_noise` seeds a fresh noise
    /// table and restarts the phase. Other shapes ignore `arg`.
    pub fn set_wave_type(&self, channel: i64, name: &str, arg: WaveArg<'_>) -> Result<()> {
        let ch = self.channel(channel)?;
        let wave = WaveType::from_name(name).ok_or_else(|| {
            SoundError::validation(2, format!("invalid option '{}'", name.to_ascii_lowercase()))
        })?;

        match wave {
            WaveType::Square => {
                let duty = match arg {
                    WaveArg::None => 0.5,
                    WaveArg::Duty(duty) if (0.0..=1.0).contains(&duty) => duty,
                    WaveArg::Duty(_) => {
                        return Err(SoundError::validation(3, "duty out of range"))
                    }
                    WaveArg::Table(_) => {
                        return Err(SoundError::validation(3, "number expected, got table"))
                    }
                };
                let mut state = ch.lock();
                state.wave = wave;
                state.duty = duty;
            }
            WaveType::Custom => {
                let WaveArg::Table(points) = arg else {
                    return Err(SoundError::validation(3, "table expected"));
                };
                validate_wavetable(points)?;
                let mut state = ch.lock();
                state.custom_wave[..points.len()].copy_from_slice(points);
                state.custom_wave_size = points.len();
                state.wave = wave;
                state.phase = 0.0;
            }
            WaveType::PitchedNoise => {
                let mut state = ch.lock();
                state.wave = wave;
                state.seed_noise_table();
                state.phase = 0.0;
            }
            _ => ch.lock().wave = wave,
        }
        Ok(())
    }

    /// Frequency in Hz
    pub fn get_frequency(&self, channel: i64) -> Result<u32> {
        Ok(self.channel(channel)?.lock().frequency)
    }

    /// Set the frequency, `0..=sample_rate/2` Hz
    pub fn set_frequency(&self, channel: i64, frequency: i64) -> Result<()> {
        let ch = self.channel(channel)?;
        let nyquist = i64::from(self.spec().sample_rate / 2);
        if !(0..=nyquist).contains(&frequency) {
            return Err(SoundError::validation(2, "frequency out of range"));
        }
        ch.lock().frequency = frequency as u32;
        Ok(())
    }

    /// Committed volume; a pending change shows up once it is committed
    pub fn get_volume(&self, channel: i64) -> Result<f32> {
        Ok(self.channel(channel)?.lock().amplitude)
    }

    /// Request a new volume in `[0, 1]`
    ///
    /// Square and sawtooth waves apply it at the next phase wrap; other
    /// shapes apply it on the next frame.
    pub fn set_volume(&self, channel: i64, volume: f64) -> Result<()> {
        let ch = self.channel(channel)?;
        if !(0.0..=1.0).contains(&volume) {
            return Err(SoundError::validation(2, "volume out of range"));
        }
        ch.lock().pending_amplitude = Some(volume as f32);
        Ok(())
    }

    /// Stereo position, -1 (right) to 1 (left)
    pub fn get_pan(&self, channel: i64) -> Result<f32> {
        Ok(self.channel(channel)?.lock().pan)
    }

    /// Set the stereo position in `[-1, 1]`
    pub fn set_pan(&self, channel: i64, pan: f64) -> Result<()> {
        let ch = self.channel(channel)?;
        if !(-1.0..=1.0).contains(&pan) {
            return Err(SoundError::validation(2, "pan out of range"));
        }
        ch.lock().pan = pan as f32;
        Ok(())
    }

    /// Wavetable interpolation mode
    pub fn get_interpolation(&self, channel: i64) -> Result<Interpolation> {
        Ok(self.channel(channel)?.lock().interpolation)
    }

    /// Set the wavetable interpolation mode
    pub fn set_interpolation<'a>(
        &self,
        channel: i64,
        mode: impl Into<InterpolationArg<'a>>,
    ) -> Result<()> {
        let ch = self.channel(channel)?;
        let mode = match mode.into() {
            InterpolationArg::Name(name) => Interpolation::from_name(name)
                .ok_or_else(|| SoundError::validation(2, format!("invalid option {}", name))),
            InterpolationArg::Index(index) => Interpolation::from_index(index)
                .ok_or_else(|| SoundError::validation(2, format!("invalid option {}", index))),
        }?;
        ch.lock().interpolation = mode;
        Ok(())
    }

    /// Fade out over `seconds`; negative fades in, zero cancels
    pub fn fade_out(&self, channel: i64, seconds: f64) -> Result<()> {
        let ch = self.channel(channel)?;
        if !seconds.is_finite() {
            return Err(SoundError::validation(2, "number expected"));
        }

        let frames = if seconds.abs() < FADE_EPSILON {
            0
        } else {
            ((seconds.abs() * f64::from(self.spec().sample_rate)) as u32).max(1)
        };
        ch.lock().start_fade(frames, seconds < 0.0);
        Ok(())
    }
}

fn validate_wavetable(points: &[f64]) -> Result<()> {
    if points.is_empty() {
        return Err(SoundError::validation(3, "no points in wavetable"));
    }
    if points.len() > CUSTOM_WAVE_CAPACITY {
        return Err(SoundError::validation(3, "wavetable too large"));
    }
    if let Some(bad) = points.iter().position(|p| !(-1.0..=1.0).contains(p)) {
        return Err(SoundError::Validation(format!(
            "bad point {} in wavetable (value out of range)",
            bad + 1
        )));
    }
    Ok(())
}
