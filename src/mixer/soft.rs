//! In-process software mixer
//!
//! Renders every playing slot into its own buffer, runs the slot's effect on
//! it, then sums all slots into the caller's output buffer. Rendering is pull
//! based: whoever owns the audio device (or a test) calls [`SoftMixer::render`].

use super::{Chunk, Effect, GroupTag, Loops, Mixer, MixerSpec, SlotId};
use crate::format::{read_sample, write_sample};
use crate::{Result, SoundError};
use parking_lot::Mutex;
use std::io::Cursor;
use std::sync::Arc;
use tracing::trace;

/// Default upper bound on the slot pool
pub const DEFAULT_MAX_CHANNELS: usize = 256;

/// Initial pool size, matching SDL_mixer's default
const INITIAL_CHANNELS: usize = 8;

struct Voice {
    chunk: Arc<Chunk>,
    pos: usize,
    loops: Loops,
}

impl Voice {
    /// Copy the next bytes of the chunk over `buf` (pre-filled with silence).
    /// Returns true once a one-shot chunk has been fully consumed.
    fn fill(&mut self, buf: &mut [u8]) -> bool {
        let data = self.chunk.data();
        if data.is_empty() {
            return self.loops == Loops::Once;
        }

        let mut written = 0;
        while written < buf.len() {
            if self.pos >= data.len() {
                match self.loops {
                    Loops::Forever => self.pos = 0,
                    Loops::Once => break,
                }
            }
            let n = (data.len() - self.pos).min(buf.len() - written);
            buf[written..written + n].copy_from_slice(&data[self.pos..self.pos + n]);
            written += n;
            self.pos += n;
        }

        self.loops == Loops::Once && self.pos >= data.len()
    }
}

#[derive(Default)]
struct Slot {
    group: Option<GroupTag>,
    voice: Option<Voice>,
    effect: Option<Arc<dyn Effect>>,
    /// Stopped, but its `finished` callback has not run yet
    finishing: bool,
}

impl Slot {
    fn is_free(&self) -> bool {
        self.voice.is_none() && !self.finishing
    }
}

struct MixerState {
    slots: Vec<Slot>,
}

/// Software implementation of the [`Mixer`] contract
pub struct SoftMixer {
    spec: MixerSpec,
    max_channels: usize,
    /// One sample of silence in the output format
    silence: Vec<u8>,
    state: Mutex<MixerState>,
    /// Held for the whole effect pass of a render
    pass: Mutex<()>,
}

impl SoftMixer {
    /// Create a mixer with the given output spec
    pub fn new(spec: MixerSpec) -> Self {
        Self::with_max_channels(spec, DEFAULT_MAX_CHANNELS)
    }

    /// Create a mixer whose pool can never grow past `max_channels` slots
    pub fn with_max_channels(spec: MixerSpec, max_channels: usize) -> Self {
        let mut silence = vec![0u8; spec.format.bytes_per_sample()];
        if !silence.is_empty() {
            write_sample(spec.format, 0.0, &mut silence);
        }
        let initial = INITIAL_CHANNELS.min(max_channels);
        SoftMixer {
            spec,
            max_channels,
            silence,
            state: Mutex::new(MixerState {
                slots: (0..initial).map(|_| Slot::default()).collect(),
            }),
            pass: Mutex::new(()),
        }
    }

    /// Render the next block of mixed output into `out`
    ///
    /// `out` should hold a whole number of frames; trailing bytes of a
    /// partial frame are left untouched.
    pub fn render(&self, out: &mut [u8]) {
        let width = self.spec.format.bytes_per_sample();
        let frame = self.spec.frame_size();
        if width == 0 || frame == 0 {
            return;
        }
        let len = out.len() - out.len() % frame;

        let mut finished: Vec<(SlotId, Option<Arc<dyn Effect>>)> = Vec::new();
        {
            let _pass = self.pass.lock();

            let mut buffers = Vec::new();
            {
                let mut state = self.state.lock();
                for (index, slot) in state.slots.iter_mut().enumerate() {
                    let Some(voice) = slot.voice.as_mut() else {
                        continue;
                    };
                    let mut buf = self.silence.repeat(len / width);
                    if voice.fill(&mut buf) {
                        slot.voice = None;
                        slot.finishing = true;
                        finished.push((SlotId(index), slot.effect.clone()));
                    }
                    buffers.push((SlotId(index), buf, slot.effect.clone()));
                }
            }

            let mut mix = vec![0.0f32; len / width];
            for (slot, buf, effect) in buffers.iter_mut() {
                if let Some(effect) = effect {
                    effect.process(*slot, buf);
                }
                for (acc, sample) in mix.iter_mut().zip(buf.chunks_exact(width)) {
                    *acc += read_sample(self.spec.format, sample).unwrap_or(0.0);
                }
            }
            for (sample, dst) in mix.iter().zip(out[..len].chunks_exact_mut(width)) {
                write_sample(self.spec.format, sample.clamp(-1.0, 1.0), dst);
            }

            trace!(
                voices = buffers.len(),
                bytes = len,
                finished = finished.len(),
                "rendered mixer block"
            );
        }

        for (slot, effect) in finished {
            self.notify_finished(slot, effect);
        }
    }

    fn notify_finished(&self, slot: SlotId, effect: Option<Arc<dyn Effect>>) {
        if let Some(effect) = effect {
            effect.finished(self, slot);
        }
        if let Some(entry) = self.state.lock().slots.get_mut(slot.0) {
            entry.finishing = false;
        }
    }

    /// Render `frames` frames into a fresh buffer
    pub fn render_frames(&self, frames: usize) -> Vec<u8> {
        let mut out = vec![0u8; frames * self.spec.frame_size()];
        self.render(&mut out);
        out
    }

    /// Group a slot currently belongs to
    pub fn slot_group(&self, slot: SlotId) -> Option<GroupTag> {
        self.state.lock().slots.get(slot.0).and_then(|s| s.group)
    }

    /// Whether a slot has an effect registered
    pub fn has_effect(&self, slot: SlotId) -> bool {
        self.state
            .lock()
            .slots
            .get(slot.0)
            .is_some_and(|s| s.effect.is_some())
    }

    fn slot_error(slot: SlotId) -> SoundError {
        SoundError::Resource(format!("mixer channel {} does not exist", slot.0))
    }
}

impl Default for SoftMixer {
    fn default() -> Self {
        Self::new(MixerSpec::default())
    }
}

impl Mixer for SoftMixer {
    fn spec(&self) -> MixerSpec {
        self.spec
    }

    fn allocated_channels(&self) -> usize {
        self.state.lock().slots.len()
    }

    fn allocate_channels(&self, total: usize) -> usize {
        let mut state = self.state.lock();
        let target = total.min(self.max_channels);
        if target > state.slots.len() {
            state.slots.resize_with(target, Slot::default);
        }
        state.slots.len()
    }

    fn group_available(&self, group: Option<GroupTag>) -> Option<SlotId> {
        let state = self.state.lock();
        state
            .slots
            .iter()
            .position(|s| s.is_free() && s.group == group)
            .map(SlotId)
    }

    fn reserve_channel(&self, group: GroupTag) -> Option<SlotId> {
        let mut state = self.state.lock();
        let index = state
            .slots
            .iter()
            .position(|s| s.is_free() && s.group.is_none())?;
        state.slots[index].group = Some(group);
        Some(SlotId(index))
    }

    fn group_channel(&self, slot: SlotId, group: Option<GroupTag>) -> Result<()> {
        let mut state = self.state.lock();
        let entry = state
            .slots
            .get_mut(slot.0)
            .ok_or_else(|| Self::slot_error(slot))?;
        entry.group = group;
        Ok(())
    }

    fn chunk_from_raw(&self, data: Vec<u8>) -> Arc<Chunk> {
        Arc::new(Chunk::new(data))
    }

    fn chunk_from_wav(&self, wav: &[u8]) -> Result<Arc<Chunk>> {
        let reader = hound::WavReader::new(Cursor::new(wav))
            .map_err(|e| SoundError::Format(format!("Failed to parse WAV: {}", e)))?;
        let wav_spec = reader.spec();
        let source: Vec<f32> = match wav_spec.sample_format {
            hound::SampleFormat::Int => {
                let scale = (1u64 << (wav_spec.bits_per_sample.max(1) - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<std::result::Result<_, _>>()
            }
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<std::result::Result<_, _>>(),
        }
        .map_err(|e| SoundError::Format(format!("Failed to decode WAV samples: {}", e)))?;

        let src_channels = wav_spec.channels.max(1) as usize;
        let src_frames = source.len() / src_channels;
        let src_rate = wav_spec.sample_rate.max(1) as u64;
        let dst_rate = self.spec.sample_rate as u64;
        let dst_frames = (src_frames as u64 * dst_rate / src_rate) as usize;

        let width = self.spec.format.bytes_per_sample();
        let mut data = vec![0u8; dst_frames * self.spec.frame_size()];
        if width > 0 {
            for (i, frame) in data.chunks_exact_mut(self.spec.frame_size()).enumerate() {
                let src = ((i as u64 * src_rate / dst_rate) as usize).min(src_frames - 1);
                for (ch, out) in frame.chunks_exact_mut(width).enumerate() {
                    let sample = source[src * src_channels + ch.min(src_channels - 1)];
                    write_sample(self.spec.format, sample, out);
                }
            }
        }

        Ok(Arc::new(Chunk::new(data)))
    }

    fn play_chunk(
        &self,
        slot: Option<SlotId>,
        chunk: Arc<Chunk>,
        loops: Loops,
    ) -> Result<SlotId> {
        let mut state = self.state.lock();
        let slot = match slot {
            Some(slot) if slot.0 < state.slots.len() => slot,
            Some(slot) => return Err(Self::slot_error(slot)),
            None => state
                .slots
                .iter()
                .position(|s| s.is_free() && s.group.is_none())
                .map(SlotId)
                .ok_or_else(|| SoundError::Resource("no free mixer channel".into()))?,
        };
        state.slots[slot.0].voice = Some(Voice {
            chunk,
            pos: 0,
            loops,
        });
        Ok(slot)
    }

    fn halt(&self, slot: SlotId) {
        let effect = {
            let _pass = self.pass.lock();
            let mut state = self.state.lock();
            let Some(entry) = state.slots.get_mut(slot.0) else {
                return;
            };
            if entry.voice.take().is_none() {
                return;
            }
            entry.finishing = true;
            entry.effect.clone()
        };
        self.notify_finished(slot, effect);
    }

    fn is_playing(&self, slot: SlotId) -> bool {
        self.state
            .lock()
            .slots
            .get(slot.0)
            .is_some_and(|s| s.voice.is_some())
    }

    fn register_effect(&self, slot: SlotId, effect: Arc<dyn Effect>) -> Result<()> {
        let _pass = self.pass.lock();
        let mut state = self.state.lock();
        let entry = state
            .slots
            .get_mut(slot.0)
            .ok_or_else(|| Self::slot_error(slot))?;
        entry.effect = Some(effect);
        Ok(())
    }

    fn unregister_effect(&self, slot: SlotId) {
        let _pass = self.pass.lock();
        if let Some(entry) = self.state.lock().slots.get_mut(slot.0) {
            entry.effect = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::SampleFormat;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        processed: AtomicUsize,
        finished: AtomicUsize,
    }

    impl Counter {
        fn new() -> Arc<Self> {
            Arc::new(Counter {
                processed: AtomicUsize::new(0),
                finished: AtomicUsize::new(0),
            })
        }
    }

    impl Effect for Counter {
        fn process(&self, _slot: SlotId, stream: &mut [u8]) {
            self.processed.fetch_add(1, Ordering::SeqCst);
            stream.fill(0);
        }

        fn finished(&self, _mixer: &dyn Mixer, _slot: SlotId) {
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn mono_s16() -> SoftMixer {
        SoftMixer::new(MixerSpec::new(48_000, SampleFormat::S16Le, 1))
    }

    #[test]
    fn test_allocate_is_capped() {
        let mixer = SoftMixer::with_max_channels(MixerSpec::default(), 10);
        assert_eq!(mixer.allocated_channels(), 8);
        assert_eq!(mixer.allocate_channels(9), 9);
        assert_eq!(mixer.allocate_channels(4), 9);
        assert_eq!(mixer.allocate_channels(64), 10);
    }

    #[test]
    fn test_looping_chunk_repeats() {
        let mixer = mono_s16();
        let chunk = mixer.chunk_from_raw(vec![0x00, 0x40, 0x00, 0xC0]);
        let slot = mixer.play_chunk(None, chunk, Loops::Forever).unwrap();
        let out = mixer.render_frames(6);
        let samples: Vec<i16> = out
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(samples, vec![16384, -16384, 16384, -16384, 16384, -16384]);
        assert!(mixer.is_playing(slot));
    }

    #[test]
    fn test_one_shot_finishes_and_notifies() {
        let mixer = mono_s16();
        let counter = Counter::new();
        let chunk = mixer.chunk_from_raw(vec![0u8; 8]);
        let slot = mixer.play_chunk(None, chunk, Loops::Once).unwrap();
        mixer.register_effect(slot, counter.clone()).unwrap();

        mixer.render_frames(2);
        assert!(mixer.is_playing(slot));
        mixer.render_frames(2);
        assert!(!mixer.is_playing(slot));
        assert_eq!(counter.processed.load(Ordering::SeqCst), 2);
        assert_eq!(counter.finished.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_halt_notifies_only_when_playing() {
        let mixer = mono_s16();
        let counter = Counter::new();
        let slot = mixer
            .play_chunk(None, mixer.chunk_from_raw(vec![0u8; 4]), Loops::Forever)
            .unwrap();
        mixer.register_effect(slot, counter.clone()).unwrap();
        mixer.halt(slot);
        mixer.halt(slot);
        assert_eq!(counter.finished.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unregistered_effect_is_not_called() {
        let mixer = mono_s16();
        let counter = Counter::new();
        let slot = mixer
            .play_chunk(None, mixer.chunk_from_raw(vec![0u8; 4]), Loops::Forever)
            .unwrap();
        mixer.register_effect(slot, counter.clone()).unwrap();
        mixer.unregister_effect(slot);
        mixer.render_frames(16);
        assert_eq!(counter.processed.load(Ordering::SeqCst), 0);
        assert!(!mixer.has_effect(slot));
    }

    #[test]
    fn test_grouped_slots_are_not_picked_for_free_play() {
        let mixer = SoftMixer::with_max_channels(MixerSpec::default(), 1);
        let slot = mixer.group_available(None).unwrap();
        mixer.group_channel(slot, Some(GroupTag(7))).unwrap();
        assert_eq!(mixer.slot_group(slot), Some(GroupTag(7)));
        let err = mixer.play_chunk(None, mixer.chunk_from_raw(vec![]), Loops::Once);
        assert!(matches!(err, Err(SoundError::Resource(_))));
        assert_eq!(mixer.group_available(Some(GroupTag(7))), Some(slot));
    }

    #[test]
    fn test_reserved_slot_is_not_handed_out_again() {
        let mixer = SoftMixer::with_max_channels(MixerSpec::default(), 2);
        let a = mixer.reserve_channel(GroupTag(1)).unwrap();
        assert_eq!(mixer.slot_group(a), Some(GroupTag(1)));
        assert_ne!(mixer.group_available(None), Some(a));

        let b = mixer.reserve_channel(GroupTag(2)).unwrap();
        assert_ne!(a, b);
        assert_eq!(mixer.reserve_channel(GroupTag(3)), None);
        let err = mixer.play_chunk(None, mixer.chunk_from_raw(vec![0u8; 4]), Loops::Once);
        assert!(matches!(err, Err(SoundError::Resource(_))));
    }

    #[test]
    fn test_wav_is_converted_and_resampled() {
        // 4 frames of 8-bit unsigned mono at 24 kHz
        let mut wav = Vec::new();
        wav.extend_from_slice(b"RIFF");
        wav.extend_from_slice(&40u32.to_le_bytes());
        wav.extend_from_slice(b"WAVEfmt ");
        wav.extend_from_slice(&16u32.to_le_bytes());
        wav.extend_from_slice(&1u16.to_le_bytes());
        wav.extend_from_slice(&1u16.to_le_bytes());
        wav.extend_from_slice(&24_000u32.to_le_bytes());
        wav.extend_from_slice(&24_000u32.to_le_bytes());
        wav.extend_from_slice(&1u16.to_le_bytes());
        wav.extend_from_slice(&8u16.to_le_bytes());
        wav.extend_from_slice(b"data");
        wav.extend_from_slice(&4u32.to_le_bytes());
        wav.extend_from_slice(&[128, 192, 64, 128]);

        let mixer = SoftMixer::default();
        let chunk = mixer.chunk_from_wav(&wav).unwrap();
        // 48 kHz stereo S16: 8 frames of 4 bytes
        assert_eq!(chunk.len(), 32);
        let samples: Vec<i16> = chunk
            .data()
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(samples[0], 0);
        assert_eq!(samples[4], samples[5]);
        assert!(samples[4] > 16000);
        assert!(samples[8] < -16000);
    }

    #[test]
    fn test_invalid_wav_is_format_error() {
        let mixer = SoftMixer::default();
        assert!(matches!(
            mixer.chunk_from_wav(b"not a wav"),
            Err(SoundError::Format(_))
        ));
    }
}
