//! Output sample formats
//!
//! Converts normalized `f32` samples to and from the byte layouts an audio
//! mixer may request. Formats are identified by SDL-style 16-bit codes: the
//! low byte carries the sample width in bits, the high bits carry the
//! signedness, byte order and integer-vs-float flags.
//!
//! The unsigned integer mappings use a `(x + 1) * MAX` scale, so positive
//! samples saturate at `MAX`.

use bitflags::bitflags;

bitflags! {
    /// Flag bits of an SDL-style audio format code
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FormatFlags: u16 {
        /// Samples are IEEE floats
        const FLOAT = 0x0100;
        /// Samples are stored most significant byte first
        const BIG_ENDIAN = 0x1000;
        /// Samples are signed
        const SIGNED = 0x8000;
    }
}

/// Mask selecting the bit size from a format code
const BITSIZE_MASK: u16 = 0x00FF;

/// Sample layout of a mixer's output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    /// Unsigned 8-bit
    U8,
    /// Signed 8-bit
    S8,
    /// Unsigned 16-bit little-endian
    U16Le,
    /// Unsigned 16-bit big-endian
    U16Be,
    /// Signed 16-bit little-endian
    S16Le,
    /// Signed 16-bit big-endian
    S16Be,
    /// Signed 32-bit little-endian
    S32Le,
    /// Signed 32-bit big-endian
    S32Be,
    /// 32-bit float little-endian
    F32Le,
    /// 32-bit float big-endian
    F32Be,
    /// Any other format code; samples in this format are never written
    Unsupported(u16),
}

impl SampleFormat {
    /// Decode an SDL-style format code
    pub fn from_raw(raw: u16) -> Self {
        match raw {
            0x0008 => SampleFormat::U8,
            0x8008 => SampleFormat::S8,
            0x0010 => SampleFormat::U16Le,
            0x1010 => SampleFormat::U16Be,
            0x8010 => SampleFormat::S16Le,
            0x9010 => SampleFormat::S16Be,
            0x8020 => SampleFormat::S32Le,
            0x9020 => SampleFormat::S32Be,
            0x8120 => SampleFormat::F32Le,
            0x9120 => SampleFormat::F32Be,
            other => SampleFormat::Unsupported(other),
        }
    }

    /// Encode back into an SDL-style format code
    pub fn raw(self) -> u16 {
        match self {
            SampleFormat::U8 => 0x0008,
            SampleFormat::S8 => 0x8008,
            SampleFormat::U16Le => 0x0010,
            SampleFormat::U16Be => 0x1010,
            SampleFormat::S16Le => 0x8010,
            SampleFormat::S16Be => 0x9010,
            SampleFormat::S32Le => 0x8020,
            SampleFormat::S32Be => 0x9020,
            SampleFormat::F32Le => 0x8120,
            SampleFormat::F32Be => 0x9120,
            SampleFormat::Unsupported(raw) => raw,
        }
    }

    /// Flag bits of this format
    pub fn flags(self) -> FormatFlags {
        FormatFlags::from_bits_truncate(self.raw())
    }

    /// Width of one sample in bits
    pub fn bit_size(self) -> u16 {
        self.raw() & BITSIZE_MASK
    }

    /// Width of one sample in bytes
    ///
    /// Unsupported formats still report the width encoded in their code so
    /// callers can step over frames they cannot write.
    pub fn bytes_per_sample(self) -> usize {
        (self.bit_size() / 8) as usize
    }

    /// Whether samples in this format can be read and written
    pub fn is_supported(self) -> bool {
        !matches!(self, SampleFormat::Unsupported(_))
    }
}

impl Default for SampleFormat {
    fn default() -> Self {
        SampleFormat::S16Le
    }
}

#[inline]
fn to_int(x: f32, max: f64) -> f64 {
    (x as f64 * max).round()
}

#[inline]
fn to_uint(x: f32, max: f64) -> f64 {
    ((x as f64 + 1.0) * max).round()
}

/// Write one normalized sample into `out` using `format`
///
/// `out` must hold at least [`SampleFormat::bytes_per_sample`] bytes.
/// Unsupported formats are skipped without touching `out`.
#[inline]
pub fn write_sample(format: SampleFormat, sample: f32, out: &mut [u8]) {
    match format {
        SampleFormat::S8 => out[0] = (to_int(sample, i8::MAX as f64) as i8) as u8,
        SampleFormat::U8 => out[0] = to_uint(sample, u8::MAX as f64) as u8,
        SampleFormat::S16Le => {
            out[..2].copy_from_slice(&(to_int(sample, i16::MAX as f64) as i16).to_le_bytes())
        }
        SampleFormat::S16Be => {
            out[..2].copy_from_slice(&(to_int(sample, i16::MAX as f64) as i16).to_be_bytes())
        }
        SampleFormat::U16Le => {
            out[..2].copy_from_slice(&(to_uint(sample, u16::MAX as f64) as u16).to_le_bytes())
        }
        SampleFormat::U16Be => {
            out[..2].copy_from_slice(&(to_uint(sample, u16::MAX as f64) as u16).to_be_bytes())
        }
        SampleFormat::S32Le => {
            out[..4].copy_from_slice(&(to_int(sample, i32::MAX as f64) as i32).to_le_bytes())
        }
        SampleFormat::S32Be => {
            out[..4].copy_from_slice(&(to_int(sample, i32::MAX as f64) as i32).to_be_bytes())
        }
        SampleFormat::F32Le => out[..4].copy_from_slice(&sample.to_le_bytes()),
        SampleFormat::F32Be => out[..4].copy_from_slice(&sample.to_be_bytes()),
        SampleFormat::Unsupported(_) => {}
    }
}

/// Read one sample written by [`write_sample`] back as a normalized float
///
/// Returns `None` for unsupported formats.
#[inline]
pub fn read_sample(format: SampleFormat, bytes: &[u8]) -> Option<f32> {
    let value = match format {
        SampleFormat::S8 => bytes[0] as i8 as f64 / i8::MAX as f64,
        SampleFormat::U8 => bytes[0] as f64 / u8::MAX as f64 - 1.0,
        SampleFormat::S16Le => i16::from_le_bytes([bytes[0], bytes[1]]) as f64 / i16::MAX as f64,
        SampleFormat::S16Be => i16::from_be_bytes([bytes[0], bytes[1]]) as f64 / i16::MAX as f64,
        SampleFormat::U16Le => {
            u16::from_le_bytes([bytes[0], bytes[1]]) as f64 / u16::MAX as f64 - 1.0
        }
        SampleFormat::U16Be => {
            u16::from_be_bytes([bytes[0], bytes[1]]) as f64 / u16::MAX as f64 - 1.0
        }
        SampleFormat::S32Le => {
            i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64 / i32::MAX as f64
        }
        SampleFormat::S32Be => {
            i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64 / i32::MAX as f64
        }
        SampleFormat::F32Le => return Some(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        SampleFormat::F32Be => return Some(f32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        SampleFormat::Unsupported(_) => return None,
    };
    Some(value.clamp(-1.0, 1.0) as f32)
}

/// Scale one sample in place by `volume`, keeping its native type and byte order
///
/// This is the software volume stage of tape playback. Integer samples are
/// multiplied in their own domain and truncated, so unsigned formats scale
/// toward zero rather than toward their midpoint.
#[inline]
pub fn scale_sample(format: SampleFormat, bytes: &mut [u8], volume: f32) {
    let v = volume as f64;
    match format {
        SampleFormat::U8 => bytes[0] = (bytes[0] as f64 * v) as u8,
        SampleFormat::S8 => bytes[0] = ((bytes[0] as i8) as f64 * v) as i8 as u8,
        SampleFormat::U16Le => {
            let s = u16::from_le_bytes([bytes[0], bytes[1]]);
            bytes[..2].copy_from_slice(&((s as f64 * v) as u16).to_le_bytes());
        }
        SampleFormat::U16Be => {
            let s = u16::from_be_bytes([bytes[0], bytes[1]]);
            bytes[..2].copy_from_slice(&((s as f64 * v) as u16).to_be_bytes());
        }
        SampleFormat::S16Le => {
            let s = i16::from_le_bytes([bytes[0], bytes[1]]);
            bytes[..2].copy_from_slice(&((s as f64 * v) as i16).to_le_bytes());
        }
        SampleFormat::S16Be => {
            let s = i16::from_be_bytes([bytes[0], bytes[1]]);
            bytes[..2].copy_from_slice(&((s as f64 * v) as i16).to_be_bytes());
        }
        SampleFormat::S32Le => {
            let s = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            bytes[..4].copy_from_slice(&((s as f64 * v) as i32).to_le_bytes());
        }
        SampleFormat::S32Be => {
            let s = i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            bytes[..4].copy_from_slice(&((s as f64 * v) as i32).to_be_bytes());
        }
        SampleFormat::F32Le => {
            let s = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            bytes[..4].copy_from_slice(&(s * volume).to_le_bytes());
        }
        SampleFormat::F32Be => {
            let s = f32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            bytes[..4].copy_from_slice(&(s * volume).to_be_bytes());
        }
        SampleFormat::Unsupported(_) => {}
    }
}

/// Scale every sample of an interleaved buffer in place
pub fn scale_buffer(format: SampleFormat, stream: &mut [u8], volume: f32) {
    let width = format.bytes_per_sample();
    if width == 0 || !format.is_supported() {
        return;
    }
    for sample in stream.chunks_exact_mut(width) {
        scale_sample(format, sample, volume);
    }
}
