//! Audio mixer contract
//!
//! The sound channels and the tape drive never own an audio device. They
//! talk to a channel-based mixer (SDL_mixer style): a pool of numbered slots
//! that each play one chunk, with per-slot post-mix effect callbacks that
//! receive the slot's buffer before it is summed into the output.
//!
//! [`SoftMixer`] is an in-process implementation of this contract used by the
//! tests and by the streaming CLI.

pub mod soft;

pub use soft::SoftMixer;

use crate::format::SampleFormat;
use crate::Result;
use std::sync::Arc;

/// Output configuration of a mixer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MixerSpec {
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Sample layout of the output stream
    pub format: SampleFormat,
    /// Number of interleaved speakers (1 = mono, 2 = stereo, ...)
    pub channels: u16,
}

impl MixerSpec {
    /// Create a new spec
    pub fn new(sample_rate: u32, format: SampleFormat, channels: u16) -> Self {
        MixerSpec {
            sample_rate,
            format,
            channels,
        }
    }

    /// Bytes occupied by one frame (one sample per speaker)
    pub fn frame_size(&self) -> usize {
        self.format.bytes_per_sample() * self.channels as usize
    }
}

impl Default for MixerSpec {
    fn default() -> Self {
        MixerSpec::new(48_000, SampleFormat::S16Le, 2)
    }
}

/// Handle to one of the mixer's simultaneous voices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub usize);

/// Group tag used to reserve mixer slots for one owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupTag(pub u32);

/// How many times a chunk plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loops {
    /// Play once, then report the slot finished
    Once,
    /// Loop until halted
    Forever,
}

/// Immutable PCM data already in the mixer's output format
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    data: Vec<u8>,
}

impl Chunk {
    /// Wrap bytes that are already in the output format
    pub fn new(data: Vec<u8>) -> Self {
        Chunk { data }
    }

    /// Raw sample bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the chunk holds no audio
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Post-mix effect attached to a mixer slot
///
/// Both callbacks run on the mixer's thread. `process` may rewrite the slot's
/// buffer freely; `finished` fires when the slot stops, whether by reaching
/// the end of a one-shot chunk or by [`Mixer::halt`].
pub trait Effect: Send + Sync {
    /// Transform one buffer of the slot's audio in place
    fn process(&self, slot: SlotId, stream: &mut [u8]);

    /// The slot stopped playing
    fn finished(&self, mixer: &dyn Mixer, slot: SlotId);
}

/// Channel-based audio mixer
///
/// Implementations must never invoke effect callbacks while holding their
/// own state lock, and [`Mixer::halt`] / [`Mixer::unregister_effect`] must
/// wait for any `process` pass in flight, so that once
/// `unregister_effect` returns the effect is never called again.
pub trait Mixer: Send + Sync {
    /// Current output configuration
    fn spec(&self) -> MixerSpec;

    /// Number of slots in the pool
    fn allocated_channels(&self) -> usize;

    /// Grow (never shrink) the pool to `total` slots, returning the new size
    fn allocate_channels(&self, total: usize) -> usize;

    /// First slot in `group` that is not playing, or the first free
    /// ungrouped slot when `None`
    fn group_available(&self, group: Option<GroupTag>) -> Option<SlotId>;

    /// Find a free ungrouped slot and put it in `group` in one step
    ///
    /// Unlike `group_available` followed by `group_channel`, no other caller
    /// can claim the same slot in between.
    fn reserve_channel(&self, group: GroupTag) -> Option<SlotId>;

    /// Put a slot in a group, or take it out with `None`
    fn group_channel(&self, slot: SlotId, group: Option<GroupTag>) -> Result<()>;

    /// Build a chunk from bytes already in the output format
    fn chunk_from_raw(&self, data: Vec<u8>) -> Arc<Chunk>;

    /// Build a chunk from an in-memory WAV file, converting to the output format
    fn chunk_from_wav(&self, wav: &[u8]) -> Result<Arc<Chunk>>;

    /// Start `chunk` on `slot`, or on the first free ungrouped slot when `None`
    fn play_chunk(&self, slot: Option<SlotId>, chunk: Arc<Chunk>, loops: Loops)
        -> Result<SlotId>;

    /// Stop a slot; fires the effect's `finished` callback if it was playing
    fn halt(&self, slot: SlotId);

    /// Whether a slot currently has a chunk
    fn is_playing(&self, slot: SlotId) -> bool;

    /// Attach the post-mix effect of a slot
    fn register_effect(&self, slot: SlotId, effect: Arc<dyn Effect>) -> Result<()>;

    /// Detach the post-mix effect of a slot
    fn unregister_effect(&self, slot: SlotId);
}
