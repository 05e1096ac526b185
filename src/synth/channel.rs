//! One programmable sound channel
//!
//! A channel owns a mixer slot that loops a short silent chunk forever; the
//! slot's post-mix effect (this type's [`Effect`] impl) overwrites that
//! silence with the synthesized wave. All state sits behind one mutex that
//! the mixer thread holds for a whole buffer and control threads hold for a
//! single get/set.

use super::waveform::{noise, Interpolation, Shape, WaveType};
use crate::format::write_sample;
use crate::mixer::{Chunk, Effect, Loops, Mixer, MixerSpec, SlotId};
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Maximum number of points in a custom wavetable
pub const CUSTOM_WAVE_CAPACITY: usize = 512;

/// Linear amplitude ramp
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct Fade {
    /// Frames left in the ramp
    pub remaining: u32,
    /// Ramp length in frames; 0 when no fade is active
    pub total: u32,
    /// Amplitude distance covered by the whole ramp
    pub initial_delta: f32,
    /// -1 fades out, +1 fades in
    pub direction: f32,
}

/// Mutable channel state, guarded by the channel lock
pub(crate) struct ChannelState {
    pub phase: f64,
    pub wave: WaveType,
    pub duty: f64,
    pub frequency: u32,
    pub amplitude: f32,
    pub pending_amplitude: Option<f32>,
    pub pan: f32,
    pub fade: Fade,
    pub custom_wave: Box<[f64; CUSTOM_WAVE_CAPACITY]>,
    pub custom_wave_size: usize,
    pub interpolation: Interpolation,
}

impl Default for ChannelState {
    fn default() -> Self {
        ChannelState {
            phase: 0.0,
            wave: WaveType::None,
            duty: 0.5,
            frequency: 0,
            amplitude: 1.0,
            pending_amplitude: None,
            pan: 0.0,
            fade: Fade::default(),
            custom_wave: Box::new([0.0; CUSTOM_WAVE_CAPACITY]),
            custom_wave_size: 0,
            interpolation: Interpolation::None,
        }
    }
}

impl ChannelState {
    /// Fill the wavetable with fresh noise
    pub fn seed_noise_table(&mut self) {
        for point in self.custom_wave.iter_mut() {
            *point = noise();
        }
        self.custom_wave_size = CUSTOM_WAVE_CAPACITY;
    }

    /// Start, reverse or cancel a fade over `frames` frames
    pub fn start_fade(&mut self, frames: u32, fade_in: bool) {
        if frames == 0 {
            self.fade = Fade::default();
            return;
        }
        self.fade = if fade_in {
            Fade {
                remaining: frames,
                total: frames,
                initial_delta: 1.0 - self.amplitude,
                direction: 1.0,
            }
        } else {
            Fade {
                remaining: frames,
                total: frames,
                initial_delta: self.amplitude,
                direction: -1.0,
            }
        };
    }

    fn shape(&self) -> Shape<'_> {
        Shape {
            wave: self.wave,
            duty: self.duty,
            table: &self.custom_wave[..self.custom_wave_size],
            interpolation: self.interpolation,
        }
    }

    /// Produce one output frame and advance the oscillator
    fn render_frame(&mut self, frame: &mut [u8], spec: &MixerSpec) {
        let width = spec.format.bytes_per_sample();

        if self.frequency == 0 {
            for speaker in frame.chunks_exact_mut(width) {
                write_sample(spec.format, 0.0, speaker);
            }
        } else {
            let shape = self.shape();
            let amplitude = self.amplitude as f64;
            let phase = self.phase;
            if spec.channels == 1 {
                write_sample(spec.format, shape.sample(amplitude, phase) as f32, frame);
            } else {
                let pan = self.pan as f64;
                for (index, speaker) in frame.chunks_exact_mut(width).enumerate() {
                    let gain = match index {
                        0 => (1.0 + pan).min(1.0),
                        1 => (1.0 - pan).min(1.0),
                        _ => 1.0,
                    };
                    write_sample(
                        spec.format,
                        shape.sample(amplitude * gain, phase) as f32,
                        speaker,
                    );
                }
            }

            let step = self.frequency as f64 / spec.sample_rate as f64;
            self.phase += if self.wave == WaveType::PitchedNoise {
                step / 32.0
            } else {
                step
            };

            if let Some(pending) = self.pending_amplitude {
                if !self.wave.defers_amplitude() || self.phase >= 1.0 {
                    self.amplitude = pending;
                    self.pending_amplitude = None;
                }
            }
        }

        if self.wave == WaveType::PitchedNoise && self.phase >= 1.0 {
            self.seed_noise_table();
        }
        while self.phase >= 1.0 {
            self.phase -= 1.0;
        }

        if self.fade.total > 0 {
            let step = self.fade.initial_delta / self.fade.total as f32 * self.fade.direction;
            self.amplitude = (self.amplitude + step).clamp(0.0, 1.0);
            self.fade.remaining = self.fade.remaining.saturating_sub(1);
            if self.fade.remaining == 0 {
                self.amplitude = if self.fade.direction > 0.0 { 1.0 } else { 0.0 };
                self.fade = Fade::default();
            }
        }
    }
}

/// A sound channel bound to one mixer slot
pub struct Channel {
    id: usize,
    slot: SlotId,
    spec: MixerSpec,
    silence: Arc<Chunk>,
    halting: AtomicBool,
    state: Mutex<ChannelState>,
}

impl Channel {
    pub(crate) fn new(id: usize, slot: SlotId, spec: MixerSpec, silence: Arc<Chunk>) -> Self {
        Channel {
            id,
            slot,
            spec,
            silence,
            halting: AtomicBool::new(false),
            state: Mutex::new(ChannelState::default()),
        }
    }

    /// Zero-based index within the bank
    pub fn id(&self) -> usize {
        self.id
    }

    /// Mixer slot this channel plays on
    pub fn slot(&self) -> SlotId {
        self.slot
    }

    /// Mixer output configuration captured when the bank was created
    pub fn spec(&self) -> MixerSpec {
        self.spec
    }

    /// Current phase in `[0, 1)`
    pub fn phase(&self) -> f64 {
        self.state.lock().phase
    }

    /// Currently committed amplitude
    pub fn amplitude(&self) -> f32 {
        self.state.lock().amplitude
    }

    /// Amplitude waiting for the next commit point, if any
    pub fn pending_amplitude(&self) -> Option<f32> {
        self.state.lock().pending_amplitude
    }

    /// Whether a fade ramp is running
    pub fn is_fading(&self) -> bool {
        self.state.lock().fade.total > 0
    }

    /// Whether the channel is being torn down
    pub fn is_halting(&self) -> bool {
        self.halting.load(Ordering::Acquire)
    }

    pub(crate) fn set_halting(&self) {
        self.halting.store(true, Ordering::Release);
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock()
    }

    /// Synthesize as many whole frames as fit in `stream`
    pub fn render(&self, stream: &mut [u8]) {
        let frame = self.spec.frame_size();
        if frame == 0 {
            return;
        }
        let mut state = self.state.lock();
        for out in stream.chunks_exact_mut(frame) {
            state.render_frame(out, &self.spec);
        }
    }
}

impl Effect for Channel {
    fn process(&self, _slot: SlotId, stream: &mut [u8]) {
        self.render(stream);
    }

    fn finished(&self, mixer: &dyn Mixer, slot: SlotId) {
        if self.is_halting() {
            return;
        }
        if let Err(e) = mixer.play_chunk(Some(slot), self.silence.clone(), Loops::Forever) {
            warn!(channel = self.id, slot = slot.0, "failed to re-arm sound channel: {}", e);
        }
    }
}
