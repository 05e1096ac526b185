//! DFPWM decoder
//!
//! Dynamic Filter Pulse Width Modulation packs one bit per sample: each bit
//! says whether the waveform heads up (+127) or down (-128). The decoder
//! tracks a charge that moves toward that target with an adaptive strength,
//! smooths direction changes (antijerk) and runs a fixed low-pass filter.

/// Strength rise rate while the target repeats
pub const RISE_RATE: i32 = 7;
/// Strength fall rate when the target flips
pub const FALL_RATE: i32 = 20;
/// Low-pass filter strength
pub const FILTER_STRENGTH: i32 = 100;

/// Samples produced per input byte
pub const SAMPLES_PER_BYTE: usize = 8;

/// Streaming DFPWM decoder state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DfpwmDecoder {
    charge: i32,
    strength: i32,
    last_target: i32,
    filter_charge: i32,
}

impl DfpwmDecoder {
    /// Decoder in its initial state
    pub fn new() -> Self {
        DfpwmDecoder {
            charge: 0,
            strength: 0,
            last_target: -128,
            filter_charge: 0,
        }
    }

    /// Decode one bit into one signed 8-bit sample
    #[inline]
    fn decode_bit(&mut self, bit: bool) -> i8 {
        let target = if bit { 127 } else { -128 };

        let mut charge = self.charge;
        let next_charge = charge + ((self.strength * (target - charge) + 0x80) >> 8);
        if next_charge == charge && next_charge != target {
            charge += if target == 127 { 1 } else { -1 };
        }
        let last_charge = charge;
        self.charge = next_charge;

        let repeat = target == self.last_target;
        let strength_target = if repeat { 255 } else { 0 };
        let rate = if repeat { RISE_RATE } else { FALL_RATE };
        let mut next_strength =
            self.strength + ((rate * (strength_target - self.strength) + 0x80) >> 8);
        if next_strength == self.strength && next_strength != strength_target {
            next_strength += if strength_target == 255 { 1 } else { -1 };
        }
        self.strength = next_strength;

        let out = if repeat {
            next_charge
        } else {
            (next_charge + last_charge) >> 1
        };

        self.filter_charge += (FILTER_STRENGTH * (out - self.filter_charge) + 0x80) >> 8;
        self.last_target = target;
        self.filter_charge as i8
    }

    /// Decode `input` into `output`, eight samples per byte, LSB first
    ///
    /// Decodes `min(input.len(), output.len() / 8)` bytes and returns the
    /// number of samples written.
    pub fn decode_into(&mut self, input: &[u8], output: &mut [i8]) -> usize {
        let mut written = 0;
        for (&byte, out) in input
            .iter()
            .zip(output.chunks_exact_mut(SAMPLES_PER_BYTE))
        {
            for (bit, sample) in out.iter_mut().enumerate() {
                *sample = self.decode_bit((byte >> bit) & 1 != 0);
            }
            written += SAMPLES_PER_BYTE;
        }
        written
    }

    /// Decode `input` into a new buffer of `8 * input.len()` samples
    pub fn decode(&mut self, input: &[u8]) -> Vec<i8> {
        let mut output = vec![0i8; input.len() * SAMPLES_PER_BYTE];
        self.decode_into(input, &mut output);
        output
    }
}

impl Default for DfpwmDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_golden_vector() {
        let out = DfpwmDecoder::new().decode(&[0xFF, 0x00]);
        assert_eq!(
            out,
            vec![0, 0, 1, 5, 11, 19, 28, 39, 39, 24, 6, -14, -34, -52, -68, -82]
        );
    }

    #[test]
    fn test_eight_samples_per_byte() {
        let mut decoder = DfpwmDecoder::new();
        for len in [0usize, 1, 7, 300] {
            let input: Vec<u8> = (0..len).map(|i| (i * 37) as u8).collect();
            assert_eq!(decoder.decode(&input).len(), len * 8);
        }
    }

    #[test]
    fn test_split_decode_matches_whole() {
        let input: Vec<u8> = (0..257u32).map(|i| (i * 91 + 13) as u8).collect();
        let whole = DfpwmDecoder::new().decode(&input);

        let mut decoder = DfpwmDecoder::new();
        let mut pieces = Vec::new();
        for part in [&input[..1], &input[1..100], &input[100..]] {
            pieces.extend(decoder.decode(part));
        }
        assert_eq!(whole, pieces);
    }

    #[test]
    fn test_pure_function_of_state() {
        let mut a = DfpwmDecoder::new();
        a.decode(&[0x5A, 0xC3]);
        let mut b = a;
        assert_eq!(a.decode(&[0x0F, 0xF0]), b.decode(&[0x0F, 0xF0]));
        assert_eq!(a, b);
    }

    #[test]
    fn test_short_output_buffer() {
        let mut out = [0i8; 12];
        let written = DfpwmDecoder::new().decode_into(&[0xFF, 0xFF], &mut out);
        assert_eq!(written, 8);
    }

    #[test]
    fn test_all_ones_rises() {
        let out = DfpwmDecoder::new().decode(&[0xFF; 16]);
        assert!(out.windows(2).all(|w| w[1] >= w[0]));
        assert!(*out.last().unwrap() > 100);
    }
}
