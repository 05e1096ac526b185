//! Per-computer bank of sound channels
//!
//! A bank claims one mixer slot per channel, tags them with the computer's
//! group, registers each channel as the slot's effect and starts the silent
//! loop that keeps the effect firing. Dropping the bank releases all of it.

use super::channel::Channel;
use crate::mixer::{Effect, GroupTag, Loops, Mixer, MixerSpec, SlotId};
use crate::{Result, SoundError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Size in bytes of the silent chunk each channel loops
pub const SILENT_CHUNK_BYTES: usize = 32;

/// Offset that turns a computer id into its mixer group tag
const GROUP_BASE: u32 = 0x74A800;

/// Mixer group tag reserved for a computer's channels
pub fn group_tag(computer_id: u32) -> GroupTag {
    GroupTag(computer_id | GROUP_BASE)
}

/// The sound channels of one computer
pub struct ChannelBank {
    mixer: Arc<dyn Mixer>,
    computer_id: u32,
    group: GroupTag,
    spec: MixerSpec,
    channels: Vec<Arc<Channel>>,
    closed: AtomicBool,
}

impl ChannelBank {
    /// Create a bank of `num_channels` channels for `computer_id`
    ///
    /// Either every channel is attached to the mixer or none is: a failure
    /// part way through tears down the channels already set up.
    pub fn new(mixer: Arc<dyn Mixer>, computer_id: u32, num_channels: usize) -> Result<Self> {
        let spec = mixer.spec();
        let silence = mixer.chunk_from_raw(vec![0u8; SILENT_CHUNK_BYTES]);
        let group = group_tag(computer_id);

        let wanted = mixer.allocated_channels() + num_channels;
        mixer.allocate_channels(wanted);

        let mut bank = ChannelBank {
            mixer,
            computer_id,
            group,
            spec,
            channels: Vec::with_capacity(num_channels),
            closed: AtomicBool::new(false),
        };

        for id in 0..num_channels {
            let slot = bank.claim_slot()?;
            let channel = Arc::new(Channel::new(id, slot, spec, silence.clone()));
            bank.channels.push(channel.clone());
            bank.mixer.register_effect(slot, channel as Arc<dyn Effect>)?;
            bank.mixer
                .play_chunk(Some(slot), silence.clone(), Loops::Forever)?;
            debug!(computer = computer_id, channel = id, slot = slot.0, "sound channel attached");
        }

        debug!(
            computer = computer_id,
            channels = num_channels,
            sample_rate = spec.sample_rate,
            format = ?spec.format,
            speakers = spec.channels,
            "sound bank created"
        );
        Ok(bank)
    }

    /// Reserve a free slot for this bank's group, growing the mixer pool one
    /// slot at a time until one is available
    fn claim_slot(&self) -> Result<SlotId> {
        loop {
            if let Some(slot) = self.mixer.reserve_channel(self.group) {
                return Ok(slot);
            }
            let before = self.mixer.allocated_channels();
            if self.mixer.allocate_channels(before + 1) <= before {
                return Err(SoundError::Resource(format!(
                    "mixer refused to grow past {} channels",
                    before
                )));
            }
        }
    }

    /// Computer this bank belongs to
    pub fn computer_id(&self) -> u32 {
        self.computer_id
    }

    /// Mixer group holding this bank's slots
    pub fn group(&self) -> GroupTag {
        self.group
    }

    /// Mixer output configuration captured at creation
    pub fn spec(&self) -> MixerSpec {
        self.spec
    }

    /// Number of channels
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether the bank has no channels
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// All channels, in order
    pub fn channels(&self) -> &[Arc<Channel>] {
        &self.channels
    }

    /// Resolve a 1-based script-side channel number
    pub fn channel(&self, channel: i64) -> Result<&Arc<Channel>> {
        usize::try_from(channel)
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|index| self.channels.get(index))
            .ok_or_else(|| SoundError::validation(1, "channel out of range"))
    }
}

impl ChannelBank {
    /// Whether [`ChannelBank::close`] has run
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop every channel and give its slot back to the mixer
    ///
    /// Runs once; later calls and the eventual drop do nothing. Handles still
    /// held afterwards keep working on channel state but produce no sound.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // no channel may re-arm once teardown has started
        for channel in &self.channels {
            channel.set_halting();
        }
        for channel in &self.channels {
            let slot = channel.slot();
            self.mixer.halt(slot);
            self.mixer.unregister_effect(slot);
            if let Err(e) = self.mixer.group_channel(slot, None) {
                warn!(slot = slot.0, "failed to ungroup sound channel: {}", e);
            }
        }
        debug!(
            computer = self.computer_id,
            channels = self.channels.len(),
            "sound bank destroyed"
        );
    }
}

impl Drop for ChannelBank {
    fn drop(&mut self) {
        self.close();
    }
}
