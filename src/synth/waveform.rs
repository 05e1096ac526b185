//! Waveform shapes and the per-sample oracle
//!
//! Every shape is evaluated from a normalized phase in `[0, 1)` and scaled
//! by the amplitude it is given, so one channel can evaluate the same phase
//! at different (panned) amplitudes for each speaker.

use std::f64::consts::PI;
use std::fmt;

/// Amplitudes below this produce silence
pub const SILENCE_THRESHOLD: f64 = 1e-4;

/// Shape of the wave a channel plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaveType {
    /// Silence
    #[default]
    None,
    /// Sine wave
    Sine,
    /// Triangle wave
    Triangle,
    /// Rising sawtooth
    Sawtooth,
    /// Falling sawtooth
    ReverseSawtooth,
    /// Square wave with adjustable duty cycle
    Square,
    /// White noise
    Noise,
    /// User-supplied wavetable
    Custom,
    /// Noise wavetable regenerated every period
    PitchedNoise,
}

impl WaveType {
    /// Name used by the scripting API
    pub fn name(self) -> &'static str {
        match self {
            WaveType::None => "none",
            WaveType::Sine => "sine",
            WaveType::Triangle => "triangle",
            WaveType::Sawtooth => "sawtooth",
            WaveType::ReverseSawtooth => "rsawtooth",
            WaveType::Square => "square",
            WaveType::Noise => "noise",
            WaveType::Custom => "custom",
            WaveType::PitchedNoise => "pitched_noise",
        }
    }

    /// Parse a script-side name, ignoring case
    pub fn from_name(name: &str) -> Option<Self> {
        let wave = match name.to_ascii_lowercase().as_str() {
            "none" => WaveType::None,
            "sine" => WaveType::Sine,
            "triangle" => WaveType::Triangle,
            "sawtooth" => WaveType::Sawtooth,
            "rsawtooth" => WaveType::ReverseSawtooth,
            "square" => WaveType::Square,
            "noise" => WaveType::Noise,
            "custom" => WaveType::Custom,
            "pitched_noise" | "pitchednoise" | "pnoise" => WaveType::PitchedNoise,
            _ => return None,
        };
        Some(wave)
    }

    /// Whether volume changes wait for the next phase wrap.
    ///
    /// Only the shapes with a jump inside the period defer. Triangle is
    /// continuous at the wrap but not at zero, and still commits immediately.
    pub fn defers_amplitude(self) -> bool {
        matches!(
            self,
            WaveType::Square | WaveType::Sawtooth | WaveType::ReverseSawtooth
        )
    }

    /// Whether the shape reads from the channel's wavetable
    pub fn uses_table(self) -> bool {
        matches!(self, WaveType::Custom | WaveType::PitchedNoise)
    }
}

impl fmt::Display for WaveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How wavetable shapes read between table points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    /// Hold each point
    #[default]
    None,
    /// Straight line to the next point (wrapping)
    Linear,
}

impl Interpolation {
    /// Name used by the scripting API
    pub fn name(self) -> &'static str {
        match self {
            Interpolation::None => "none",
            Interpolation::Linear => "linear",
        }
    }

    /// Parse a script-side name, ignoring case
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "none" => Some(Interpolation::None),
            "linear" => Some(Interpolation::Linear),
            _ => None,
        }
    }

    /// Parse the numeric form (`1` = none, `2` = linear)
    pub fn from_index(index: i64) -> Option<Self> {
        match index {
            1 => Some(Interpolation::None),
            2 => Some(Interpolation::Linear),
            _ => None,
        }
    }
}

impl fmt::Display for Interpolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything the oracle needs besides amplitude and phase
#[derive(Debug, Clone, Copy)]
pub struct Shape<'a> {
    /// Wave shape
    pub wave: WaveType,
    /// Square duty cycle
    pub duty: f64,
    /// Active wavetable points for Custom / PitchedNoise
    pub table: &'a [f64],
    /// Wavetable read mode
    pub interpolation: Interpolation,
}

impl Shape<'_> {
    /// Sample of this shape at `phase`, scaled by `amplitude`
    pub fn sample(&self, amplitude: f64, phase: f64) -> f64 {
        if amplitude < SILENCE_THRESHOLD {
            return 0.0;
        }

        match self.wave {
            WaveType::Sine => amplitude * (2.0 * phase * PI).sin(),
            WaveType::Triangle => {
                2.0 * (amplitude * ((2.0 * phase + 1.5) % 2.0) - amplitude).abs() - amplitude
            }
            WaveType::Sawtooth => amplitude * ((2.0 * phase + 1.0) % 2.0) - amplitude,
            WaveType::ReverseSawtooth => {
                amplitude * ((2.0 * (1.0 - phase) + 1.0) % 2.0) - amplitude
            }
            WaveType::Square => {
                if phase < self.duty {
                    amplitude
                } else {
                    -amplitude
                }
            }
            WaveType::Noise => amplitude * noise(),
            WaveType::Custom | WaveType::PitchedNoise => self.table_sample(phase) * amplitude,
            WaveType::None => 0.0,
        }
    }

    fn table_sample(&self, phase: f64) -> f64 {
        let size = self.table.len();
        if size == 0 {
            return 0.0;
        }

        let pos = phase * size as f64;
        let index = (pos as usize).min(size - 1);
        let current = self.table[index];
        match self.interpolation {
            Interpolation::None => current,
            Interpolation::Linear => {
                let next = self.table[(index + 1) % size];
                current + (next - current) * (pos - pos.floor())
            }
        }
    }
}

/// One uniform noise value in `[-1, 1]` from the thread-local generator
pub fn noise() -> f64 {
    rand::random_range(-1.0..=1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn shape(wave: WaveType) -> Shape<'static> {
        Shape {
            wave,
            duty: 0.5,
            table: &[],
            interpolation: Interpolation::None,
        }
    }

    #[test]
    fn test_names_round_trip() {
        for wave in [
            WaveType::None,
            WaveType::Sine,
            WaveType::Triangle,
            WaveType::Sawtooth,
            WaveType::ReverseSawtooth,
            WaveType::Square,
            WaveType::Noise,
            WaveType::Custom,
            WaveType::PitchedNoise,
        ] {
            assert_eq!(WaveType::from_name(wave.name()), Some(wave));
        }
    }

    #[test]
    fn test_name_aliases_and_case() {
        assert_eq!(WaveType::from_name("SINE"), Some(WaveType::Sine));
        assert_eq!(WaveType::from_name("pitchedNoise"), Some(WaveType::PitchedNoise));
        assert_eq!(WaveType::from_name("PNoise"), Some(WaveType::PitchedNoise));
        assert_eq!(WaveType::from_name("saw"), None);
    }

    #[test]
    fn test_interpolation_forms() {
        assert_eq!(Interpolation::from_name("Linear"), Some(Interpolation::Linear));
        assert_eq!(Interpolation::from_index(1), Some(Interpolation::None));
        assert_eq!(Interpolation::from_index(2), Some(Interpolation::Linear));
        assert_eq!(Interpolation::from_index(3), None);
    }

    #[test]
    fn test_sine_quarter_points() {
        let s = shape(WaveType::Sine);
        assert_relative_eq!(s.sample(1.0, 0.25), 1.0, epsilon = 1e-12);
        assert_relative_eq!(s.sample(0.5, 0.75), -0.5, epsilon = 1e-12);
        assert_relative_eq!(s.sample(1.0, 0.0), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_triangle_shape() {
        let s = shape(WaveType::Triangle);
        assert_relative_eq!(s.sample(1.0, 0.0), 0.0, epsilon = 1e-12);
        assert_relative_eq!(s.sample(1.0, 0.25), 1.0, epsilon = 1e-12);
        assert_relative_eq!(s.sample(1.0, 0.5), 0.0, epsilon = 1e-12);
        assert_relative_eq!(s.sample(1.0, 0.75), -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_saw_directions() {
        let saw = shape(WaveType::Sawtooth);
        let rsaw = shape(WaveType::ReverseSawtooth);
        assert_relative_eq!(saw.sample(1.0, 0.0), 0.0, epsilon = 1e-12);
        assert_relative_eq!(saw.sample(1.0, 0.25), 0.5, epsilon = 1e-12);
        assert_relative_eq!(saw.sample(1.0, 0.75), -0.5, epsilon = 1e-12);
        assert_relative_eq!(rsaw.sample(1.0, 0.25), -0.5, epsilon = 1e-12);
        assert_relative_eq!(rsaw.sample(1.0, 0.75), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_square_duty() {
        let mut s = shape(WaveType::Square);
        s.duty = 0.25;
        assert_eq!(s.sample(0.8, 0.1), 0.8);
        assert_eq!(s.sample(0.8, 0.25), -0.8);
        assert_eq!(s.sample(0.8, 0.9), -0.8);
    }

    #[test]
    fn test_quiet_amplitude_is_silent() {
        assert_eq!(shape(WaveType::Square).sample(0.00005, 0.1), 0.0);
        assert_eq!(shape(WaveType::Noise).sample(0.0, 0.1), 0.0);
    }

    #[test]
    fn test_noise_in_range() {
        let s = shape(WaveType::Noise);
        for _ in 0..1000 {
            let v = s.sample(0.5, 0.0);
            assert!((-0.5..=0.5).contains(&v));
        }
    }

    #[test]
    fn test_table_lookup() {
        let table = [0.0, 1.0, -1.0, 0.5];
        let mut s = Shape {
            wave: WaveType::Custom,
            duty: 0.5,
            table: &table,
            interpolation: Interpolation::None,
        };
        assert_eq!(s.sample(1.0, 0.3), 1.0);
        assert_eq!(s.sample(0.5, 0.9), 0.25);

        s.interpolation = Interpolation::Linear;
        assert_relative_eq!(s.sample(1.0, 0.125), 0.5, epsilon = 1e-12);
        // last point wraps back to the first
        assert_relative_eq!(s.sample(1.0, 0.875), 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_empty_table_is_silent() {
        let s = shape(WaveType::Custom);
        assert_eq!(s.sample(1.0, 0.5), 0.0);
    }
}
