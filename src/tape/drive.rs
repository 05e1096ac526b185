//! Tape drive peripheral
//!
//! Holds a tape image with a read/write head. `play` decodes everything from
//! the head to the end of the tape, wraps it in a WAV at a speed-adjusted
//! rate and hands it to the mixer as a one-shot chunk, with a post-mix effect
//! applying the drive's volume.

use super::dfpwm::{DfpwmDecoder, SAMPLES_PER_BYTE};
use super::image::TapeImage;
use crate::format::{scale_buffer, SampleFormat};
use crate::mixer::{Effect, GroupTag, Loops, Mixer, SlotId};
use crate::{Result, SoundError};
use parking_lot::Mutex;
use std::fmt;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Sample rate of a tape played at speed 1.0
pub const BASE_SAMPLE_RATE: u32 = 32768;

/// Length of the WAV header `play` emits
pub const WAV_HEADER_LEN: usize = 44;

/// Accepted playback speeds
pub const SPEED_RANGE: std::ops::RangeInclusive<f32> = 0.25..=2.0;

const BYTES_PER_MIB: f64 = 1_048_576.0;

/// Mixer group holding tape playback slots; never a computer's sound group
pub const TAPE_GROUP: GroupTag = GroupTag(0);

/// How a tape drive is set up
#[derive(Debug, Clone, PartialEq)]
pub struct TapeOptions {
    /// Image file; memory-only tape when `None`
    pub path: Option<PathBuf>,
    /// Size of a new tape in MiB, `0.0625 <= size < 16`
    pub size_mib: f64,
}

impl TapeOptions {
    /// Memory-only 1 MiB tape
    pub fn new() -> Self {
        TapeOptions {
            path: None,
            size_mib: 1.0,
        }
    }

    /// Back the tape with an image file
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Size used when a new tape is created
    pub fn with_size_mib(mut self, size_mib: f64) -> Self {
        self.size_mib = size_mib;
        self
    }

    /// Check the tape size
    pub fn validate(&self) -> Result<()> {
        if !(0.0625..16.0).contains(&self.size_mib) {
            return Err(SoundError::Validation(
                "Tape size must be >= 64k and < 16M.".into(),
            ));
        }
        Ok(())
    }

    fn size_bytes(&self) -> usize {
        (self.size_mib * BYTES_PER_MIB) as usize
    }
}

impl Default for TapeOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether the drive is playing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapeState {
    /// A playback is in the mixer
    Playing,
    /// Nothing is playing
    Stopped,
}

impl TapeState {
    /// Name scripts see
    pub fn as_str(self) -> &'static str {
        match self {
            TapeState::Playing => "PLAYING",
            TapeState::Stopped => "STOPPED",
        }
    }
}

impl fmt::Display for TapeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build the mono 8-bit WAV the drive plays for `compressed` DFPWM data
pub fn build_wav(compressed: &[u8], speed: f32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: (BASE_SAMPLE_RATE as f32 * speed) as u32,
        bits_per_sample: 8,
        sample_format: hound::SampleFormat::Int,
    };

    let mut pcm = vec![0i8; compressed.len() * SAMPLES_PER_BYTE];
    DfpwmDecoder::new().decode_into(compressed, &mut pcm);

    let mut wav = Vec::with_capacity(WAV_HEADER_LEN + pcm.len());
    let mut writer = hound::WavWriter::new(Cursor::new(&mut wav), spec)
        .map_err(|e| SoundError::Format(format!("Failed to create WAV: {}", e)))?;
    for &sample in &pcm {
        writer
            .write_sample(sample)
            .map_err(|e| SoundError::Format(format!("Failed to write sample: {}", e)))?;
    }
    writer
        .finalize()
        .map_err(|e| SoundError::Format(format!("Failed to finalize WAV: {}", e)))?;
    Ok(wav)
}

#[derive(Debug, Clone, Copy)]
struct Playback {
    slot: SlotId,
    serial: u64,
}

/// State shared between the drive and its volume effect
struct Deck {
    volume: AtomicU32,
    serial: AtomicU64,
    playback: Mutex<Option<Playback>>,
}

impl Deck {
    fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Relaxed))
    }
}

struct VolumeEffect {
    deck: Arc<Deck>,
    format: SampleFormat,
    serial: u64,
}

impl Effect for VolumeEffect {
    fn process(&self, _slot: SlotId, stream: &mut [u8]) {
        scale_buffer(self.format, stream, self.deck.volume());
    }

    fn finished(&self, mixer: &dyn Mixer, slot: SlotId) {
        mixer.unregister_effect(slot);
        if let Err(e) = mixer.group_channel(slot, None) {
            warn!(slot = slot.0, "failed to release tape slot: {}", e);
        }
        let mut playback = self.deck.playback.lock();
        if matches!(*playback, Some(p) if p.serial == self.serial) {
            *playback = None;
        }
        debug!(slot = slot.0, "tape playback finished");
    }
}

/// A tape drive attached to a mixer
pub struct TapeDrive {
    mixer: Arc<dyn Mixer>,
    path: Option<PathBuf>,
    image: TapeImage,
    pos: usize,
    speed: f32,
    deck: Arc<Deck>,
}

impl TapeDrive {
    /// Load or create the tape described by `options`
    ///
    /// An existing image file is parsed; a missing one is created at once
    /// with a blank tape of the requested size.
    pub fn new(mixer: Arc<dyn Mixer>, options: TapeOptions) -> Result<Self> {
        options.validate()?;

        let image = match &options.path {
            None => TapeImage::new(options.size_bytes()),
            Some(path) => match std::fs::read(path) {
                Ok(bytes) => TapeImage::parse(&bytes)?,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    let image = TapeImage::new(options.size_bytes());
                    image.write_to(path)?;
                    debug!(path = %path.display(), size = image.len(), "created tape image");
                    image
                }
                Err(e) => return Err(e.into()),
            },
        };

        Ok(TapeDrive {
            mixer,
            path: options.path,
            image,
            pos: 0,
            speed: 1.0,
            deck: Arc::new(Deck {
                volume: AtomicU32::new(1.0f32.to_bits()),
                serial: AtomicU64::new(0),
                playback: Mutex::new(None),
            }),
        })
    }

    /// Whether a tape is inserted
    pub fn is_ready(&self) -> bool {
        true
    }

    /// Whether the head is at the end of the tape
    pub fn is_end(&self) -> bool {
        self.pos >= self.image.len()
    }

    /// Tape size in bytes
    pub fn get_size(&self) -> usize {
        self.image.len()
    }

    /// Head position in bytes
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Tape label
    pub fn get_label(&self) -> String {
        self.image.label()
    }

    /// Set the label, truncated to 27 bytes
    pub fn set_label(&mut self, label: &str) {
        self.image.set_label(label);
    }

    /// Playback state
    pub fn get_state(&self) -> TapeState {
        if self.deck.playback.lock().is_some() {
            TapeState::Playing
        } else {
            TapeState::Stopped
        }
    }

    /// Playback speed
    pub fn speed(&self) -> f32 {
        self.speed
    }

    /// Set the playback speed for the next `play`, `0.25..=2.0`
    pub fn set_speed(&mut self, speed: f64) -> Result<()> {
        let speed = speed as f32;
        if !SPEED_RANGE.contains(&speed) {
            return Err(SoundError::validation(1, "value out of range"));
        }
        self.speed = speed;
        Ok(())
    }

    /// Playback volume
    pub fn volume(&self) -> f32 {
        self.deck.volume()
    }

    /// Set the volume in `[0, 1]`; a running playback follows immediately
    pub fn set_volume(&mut self, volume: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(SoundError::validation(1, "value out of range"));
        }
        self.deck
            .volume
            .store((volume as f32).to_bits(), Ordering::Relaxed);
        Ok(())
    }

    /// Move the head by `offset` bytes, clamped to the tape; returns the
    /// distance actually moved
    pub fn seek(&mut self, offset: i64) -> i64 {
        let old = self.pos as i64;
        let new = old.saturating_add(offset).clamp(0, self.image.len() as i64);
        self.pos = new as usize;
        new - old
    }

    /// Read one byte, or `None` at the end of the tape
    pub fn read(&mut self) -> Option<u8> {
        let byte = *self.image.data().get(self.pos)?;
        self.pos += 1;
        Some(byte)
    }

    /// Read up to `count` bytes, or `None` at the end of the tape
    pub fn read_bytes(&mut self, count: i64) -> Result<Option<Vec<u8>>> {
        if count < 0 {
            return Err(SoundError::validation(1, "value out of range"));
        }
        if self.is_end() {
            return Ok(None);
        }
        let len = (count as u64).min((self.image.len() - self.pos) as u64) as usize;
        let bytes = self.image.data()[self.pos..self.pos + len].to_vec();
        self.pos += len;
        Ok(Some(bytes))
    }

    /// Write one byte at the head; returns false at the end of the tape
    pub fn write_byte(&mut self, byte: u8) -> bool {
        let Some(slot) = self.image.data_mut().get_mut(self.pos) else {
            return false;
        };
        *slot = byte;
        self.pos += 1;
        true
    }

    /// Write bytes at the head, truncated at the end of the tape; returns the
    /// number written
    pub fn write_bytes(&mut self, bytes: &[u8]) -> usize {
        let len = bytes.len().min(self.image.len().saturating_sub(self.pos));
        self.image.data_mut()[self.pos..self.pos + len].copy_from_slice(&bytes[..len]);
        self.pos += len;
        len
    }

    /// Play from the head to the end of the tape
    ///
    /// Any earlier playback is stopped first. The head does not move.
    pub fn play(&mut self) -> Result<()> {
        self.stop();

        let region = &self.image.data()[self.pos.min(self.image.len())..];
        if region.is_empty() {
            debug!("tape play at end of tape, nothing to do");
            return Ok(());
        }

        let wav = build_wav(region, self.speed)?;
        let chunk = self.mixer.chunk_from_wav(&wav)?;
        let format = self.mixer.spec().format;
        if !format.is_supported() {
            warn!(format = format.raw(), "unsupported mixer format, tape volume not applied");
        }

        // Attach the effect before the chunk starts; a short chunk can finish
        // before play_chunk returns.
        let slot = self.reserve_slot()?;
        let serial = self.deck.serial.fetch_add(1, Ordering::Relaxed) + 1;
        *self.deck.playback.lock() = Some(Playback { slot, serial });

        let effect = Arc::new(VolumeEffect {
            deck: self.deck.clone(),
            format,
            serial,
        });
        let started = self
            .mixer
            .register_effect(slot, effect)
            .and_then(|()| self.mixer.play_chunk(Some(slot), chunk, Loops::Once));
        if let Err(e) = started {
            self.mixer.unregister_effect(slot);
            if let Err(e) = self.mixer.group_channel(slot, None) {
                warn!(slot = slot.0, "failed to release tape slot: {}", e);
            }
            *self.deck.playback.lock() = None;
            return Err(e);
        }

        debug!(
            slot = slot.0,
            bytes = region.len(),
            speed = self.speed,
            "tape playback started"
        );
        Ok(())
    }

    /// Reserve a free mixer slot, growing the pool by one if none is left
    fn reserve_slot(&self) -> Result<SlotId> {
        if let Some(slot) = self.mixer.reserve_channel(TAPE_GROUP) {
            return Ok(slot);
        }
        let allocated = self.mixer.allocated_channels();
        self.mixer.allocate_channels(allocated + 1);
        self.mixer
            .reserve_channel(TAPE_GROUP)
            .ok_or_else(|| SoundError::Resource("no free mixer channel".into()))
    }

    /// Stop the current playback, if any
    pub fn stop(&mut self) {
        let current = *self.deck.playback.lock();
        if let Some(playback) = current {
            self.mixer.halt(playback.slot);
            debug!(slot = playback.slot.0, "tape playback stopped");
        }
    }

    /// Stop playback and write the image back to its file
    pub fn save(&mut self) -> Result<()> {
        self.stop();
        if let Some(path) = &self.path {
            self.image.write_to(path)?;
        }
        Ok(())
    }
}

impl Drop for TapeDrive {
    fn drop(&mut self) {
        if let Err(e) = self.save() {
            warn!("failed to save tape image: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixer::SoftMixer;

    fn drive() -> (Arc<SoftMixer>, TapeDrive) {
        let mixer = Arc::new(SoftMixer::default());
        let drive = TapeDrive::new(mixer.clone(), TapeOptions::new().with_size_mib(0.0625)).unwrap();
        (mixer, drive)
    }

    #[test]
    fn test_wav_header_bytes() {
        let wav = build_wav(&[0xFF, 0x00], 1.0).unwrap();
        assert_eq!(wav.len(), 44 + 16);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[4..8], &52u32.to_le_bytes());
        assert_eq!(&wav[8..16], b"WAVEfmt ");
        assert_eq!(&wav[16..20], &16u32.to_le_bytes());
        assert_eq!(&wav[20..24], &[1, 0, 1, 0]);
        assert_eq!(&wav[24..28], &32768u32.to_le_bytes());
        assert_eq!(&wav[28..32], &32768u32.to_le_bytes());
        assert_eq!(&wav[32..36], &[1, 0, 8, 0]);
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(&wav[40..44], &16u32.to_le_bytes());
        // decoder starts at 0, stored unsigned
        assert_eq!(wav[44], 128);
        assert_eq!(wav[51], 128 + 39);
    }

    #[test]
    fn test_wav_rate_follows_speed() {
        let wav = build_wav(&[], 0.25).unwrap();
        assert_eq!(wav.len(), 44);
        assert_eq!(&wav[24..28], &8192u32.to_le_bytes());
        assert_eq!(&wav[4..8], &36u32.to_le_bytes());
    }

    #[test]
    fn test_size_validation() {
        let mixer: Arc<dyn Mixer> = Arc::new(SoftMixer::default());
        for size in [0.0, 0.05, 16.0, f64::NAN] {
            let options = TapeOptions::new().with_size_mib(size);
            assert!(matches!(
                TapeDrive::new(mixer.clone(), options),
                Err(SoundError::Validation(_))
            ));
        }
    }

    #[test]
    fn test_seek_clamps() {
        let (_mixer, mut drive) = drive();
        assert_eq!(drive.seek(-5), 0);
        assert_eq!(drive.seek(100), 100);
        assert_eq!(drive.seek(-30), -30);
        assert_eq!(drive.seek(i64::MAX), 65536 - 70);
        assert!(drive.is_end());
        assert_eq!(drive.seek(i64::MIN), -65536);
        assert_eq!(drive.position(), 0);
    }

    #[test]
    fn test_read_write_at_end() {
        let (_mixer, mut drive) = drive();
        drive.seek(65534);
        assert_eq!(drive.write_bytes(b"xyz"), 2);
        assert!(drive.is_end());
        assert!(!drive.write_byte(1));
        assert_eq!(drive.read(), None);
        assert_eq!(drive.read_bytes(4).unwrap(), None);

        drive.seek(-2);
        assert_eq!(drive.read_bytes(10).unwrap(), Some(b"xy".to_vec()));
        assert!(drive.read_bytes(-1).is_err());
    }

    #[test]
    fn test_speed_and_volume_ranges() {
        let (_mixer, mut drive) = drive();
        assert!(drive.set_speed(0.2).is_err());
        assert!(drive.set_speed(2.5).is_err());
        drive.set_speed(2.0).unwrap();
        assert_eq!(drive.speed(), 2.0);
        assert_eq!(
            drive.set_volume(1.5).unwrap_err().to_string(),
            "bad argument #1 (value out of range)"
        );
        drive.set_volume(0.25).unwrap();
        assert_eq!(drive.volume(), 0.25);
    }

    #[test]
    fn test_play_and_stop() {
        let (mixer, mut drive) = drive();
        drive.write_bytes(&[0xAA; 64]);
        drive.seek(-64);
        drive.play().unwrap();
        assert_eq!(drive.get_state(), TapeState::Playing);
        assert_eq!(drive.position(), 0);
        assert!(mixer.allocated_channels() > 0);

        drive.stop();
        assert_eq!(drive.get_state(), TapeState::Stopped);
        assert!((0..mixer.allocated_channels()).all(|s| !mixer.has_effect(SlotId(s))));
    }

    #[test]
    fn test_play_at_end_is_noop() {
        let (_mixer, mut drive) = drive();
        drive.seek(i64::MAX);
        drive.play().unwrap();
        assert_eq!(drive.get_state(), TapeState::Stopped);
    }

    #[test]
    fn test_replay_replaces_playback() {
        let (mixer, mut drive) = drive();
        drive.play().unwrap();
        drive.play().unwrap();
        let playing = (0..mixer.allocated_channels())
            .filter(|&s| mixer.is_playing(SlotId(s)))
            .count();
        assert_eq!(playing, 1);
        assert_eq!(drive.get_state(), TapeState::Playing);
    }

    #[test]
    fn test_playback_ends_naturally() {
        let (mixer, mut drive) = drive();
        drive.seek(65536 - 4);
        drive.play().unwrap();
        // 32 samples at 32768 Hz become 46 frames at 48 kHz
        mixer.render_frames(64);
        assert_eq!(drive.get_state(), TapeState::Stopped);
        assert!((0..mixer.allocated_channels()).all(|s| !mixer.is_playing(SlotId(s))));
    }

    /// Mixer whose audio thread runs a whole second of output inside the
    /// drive's calls
    struct EagerMixer {
        inner: Arc<SoftMixer>,
    }

    impl Mixer for EagerMixer {
        fn spec(&self) -> crate::mixer::MixerSpec {
            self.inner.spec()
        }
        fn allocated_channels(&self) -> usize {
            self.inner.allocated_channels()
        }
        fn allocate_channels(&self, total: usize) -> usize {
            self.inner.allocate_channels(total)
        }
        fn group_available(&self, group: Option<GroupTag>) -> Option<SlotId> {
            self.inner.group_available(group)
        }
        fn reserve_channel(&self, group: GroupTag) -> Option<SlotId> {
            self.inner.reserve_channel(group)
        }
        fn group_channel(&self, slot: SlotId, group: Option<GroupTag>) -> Result<()> {
            self.inner.group_channel(slot, group)
        }
        fn chunk_from_raw(&self, data: Vec<u8>) -> Arc<crate::mixer::Chunk> {
            self.inner.chunk_from_raw(data)
        }
        fn chunk_from_wav(&self, wav: &[u8]) -> Result<Arc<crate::mixer::Chunk>> {
            self.inner.chunk_from_wav(wav)
        }
        fn play_chunk(
            &self,
            slot: Option<SlotId>,
            chunk: Arc<crate::mixer::Chunk>,
            loops: Loops,
        ) -> Result<SlotId> {
            let slot = self.inner.play_chunk(slot, chunk, loops)?;
            self.inner.render_frames(48_000);
            Ok(slot)
        }
        fn halt(&self, slot: SlotId) {
            self.inner.halt(slot)
        }
        fn is_playing(&self, slot: SlotId) -> bool {
            self.inner.is_playing(slot)
        }
        fn register_effect(&self, slot: SlotId, effect: Arc<dyn Effect>) -> Result<()> {
            self.inner.render_frames(48_000);
            self.inner.register_effect(slot, effect)
        }
        fn unregister_effect(&self, slot: SlotId) {
            self.inner.unregister_effect(slot)
        }
    }

    #[test]
    fn test_short_playback_finishing_during_play_stops_drive() {
        let inner = Arc::new(SoftMixer::default());
        let mixer = Arc::new(EagerMixer {
            inner: inner.clone(),
        });
        let mut drive =
            TapeDrive::new(mixer, TapeOptions::new().with_size_mib(0.0625)).unwrap();
        drive.seek(65536 - 16);
        drive.write_bytes(&[0xF0; 16]);
        drive.seek(-16);

        drive.play().unwrap();
        inner.render_frames(1024);
        assert_eq!(drive.get_state(), TapeState::Stopped);
        for s in 0..inner.allocated_channels() {
            assert!(!inner.is_playing(SlotId(s)));
            assert!(!inner.has_effect(SlotId(s)));
            assert_eq!(inner.slot_group(SlotId(s)), None);
        }
    }

    #[test]
    fn test_tape_slot_is_grouped_while_playing() {
        let (mixer, mut drive) = drive();
        drive.play().unwrap();
        let slot = (0..mixer.allocated_channels())
            .map(SlotId)
            .find(|&s| mixer.is_playing(s))
            .unwrap();
        assert_eq!(mixer.slot_group(slot), Some(TAPE_GROUP));
        assert_ne!(mixer.group_available(None), Some(slot));

        drive.stop();
        assert_eq!(mixer.slot_group(slot), None);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(TapeState::Playing.to_string(), "PLAYING");
        assert_eq!(TapeState::Stopped.to_string(), "STOPPED");
    }
}
