//! Sound plugin registry
//!
//! Holds the mixer handle and the sound configuration, and creates each
//! computer's [`ChannelBank`] the first time that computer opens the sound
//! library. Closing the computer destroys its bank.

use crate::config::SoundConfig;
use crate::mixer::Mixer;
use crate::synth::ChannelBank;
use crate::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Version number scripts see as `sound.version`
pub const API_VERSION: u32 = 2;

/// Per-computer sound banks sharing one mixer
pub struct SoundPlugin {
    mixer: Arc<dyn Mixer>,
    config: Mutex<SoundConfig>,
    banks: Mutex<HashMap<u32, Arc<ChannelBank>>>,
}

impl SoundPlugin {
    /// Create a registry on top of `mixer`
    pub fn new(mixer: Arc<dyn Mixer>, config: SoundConfig) -> Self {
        SoundPlugin {
            mixer,
            config: Mutex::new(config),
            banks: Mutex::new(HashMap::new()),
        }
    }

    /// Library version exposed to scripts
    pub fn version(&self) -> u32 {
        API_VERSION
    }

    /// Current configuration
    pub fn config(&self) -> SoundConfig {
        *self.config.lock()
    }

    /// Mixer the banks play on
    pub fn mixer(&self) -> &Arc<dyn Mixer> {
        &self.mixer
    }

    /// Bank of `computer_id`, created on first access
    pub fn open(&self, computer_id: u32) -> Result<Arc<ChannelBank>> {
        let mut banks = self.banks.lock();
        if let Some(bank) = banks.get(&computer_id) {
            return Ok(bank.clone());
        }

        let num_channels = self.config.lock().num_channels;
        let bank = Arc::new(ChannelBank::new(
            self.mixer.clone(),
            computer_id,
            num_channels,
        )?);
        banks.insert(computer_id, bank.clone());
        Ok(bank)
    }

    /// Whether `computer_id` currently has a bank
    pub fn is_open(&self, computer_id: u32) -> bool {
        self.banks.lock().contains_key(&computer_id)
    }

    /// Destroy the bank of `computer_id`
    ///
    /// The bank's slots are released at once, even if handles to it are still
    /// held elsewhere. Returns false if the computer had no bank.
    pub fn close(&self, computer_id: u32) -> bool {
        let removed = self.banks.lock().remove(&computer_id);
        match removed {
            Some(bank) => {
                bank.close();
                debug!(computer = computer_id, "sound library closed");
                true
            }
            None => false,
        }
    }

    /// Change `sound.numChannels`
    ///
    /// Existing banks keep their size; a computer picks up the new count the
    /// next time its bank is created.
    pub fn set_num_channels(&self, num_channels: usize) -> Result<()> {
        let mut config = self.config.lock();
        *config = config.with_num_channels(num_channels)?;
        debug!(num_channels, "sound.numChannels changed, takes effect on reopen");
        Ok(())
    }
}
