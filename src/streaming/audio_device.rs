//! Audio device integration using rodio

use super::DEFAULT_BLOCK_FRAMES;
use crate::format::read_sample;
use crate::mixer::{Mixer, SoftMixer};
use crate::{Result, SoundError};
use rodio::{OutputStream, Sink, Source};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Audio source that renders blocks from the mixer on demand
struct MixerSource {
    mixer: Arc<SoftMixer>,
    sample_rate: u32,
    channels: u16,
    finished: Arc<AtomicBool>,
    /// Rendered bytes in the mixer's output format
    block: Vec<u8>,
    /// Decoded samples of the current block
    buffer: Vec<f32>,
    buffer_pos: usize,
}

impl MixerSource {
    fn new(mixer: Arc<SoftMixer>, block_frames: usize, finished: Arc<AtomicBool>) -> Self {
        let spec = mixer.spec();
        MixerSource {
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            block: vec![0u8; block_frames * spec.frame_size()],
            buffer: Vec::with_capacity(block_frames * spec.channels as usize),
            buffer_pos: 0,
            mixer,
            finished,
        }
    }

    fn refill(&mut self) {
        let format = self.mixer.spec().format;
        let width = format.bytes_per_sample().max(1);
        self.mixer.render(&mut self.block);
        self.buffer.clear();
        self.buffer.extend(
            self.block
                .chunks_exact(width)
                .map(|bytes| read_sample(format, bytes).unwrap_or(0.0)),
        );
        self.buffer_pos = 0;
    }
}

impl Source for MixerSource {
    fn current_frame_len(&self) -> Option<usize> {
        Some(self.buffer.capacity().max(1))
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

impl Iterator for MixerSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.finished.load(Ordering::Relaxed) {
            return None;
        }
        if self.buffer_pos >= self.buffer.len() {
            self.refill();
        }
        let sample = self.buffer.get(self.buffer_pos).copied().unwrap_or(0.0);
        self.buffer_pos += 1;
        Some(sample)
    }
}

/// Audio playback device using rodio
pub struct AudioDevice {
    _stream: OutputStream,
    sink: Sink,
    finished: Arc<AtomicBool>,
}

impl AudioDevice {
    /// Open the default output device and start pulling from `mixer`
    pub fn new(mixer: Arc<SoftMixer>) -> Result<Self> {
        Self::with_block_frames(mixer, DEFAULT_BLOCK_FRAMES)
    }

    /// Like [`AudioDevice::new`] with a custom render block size
    pub fn with_block_frames(mixer: Arc<SoftMixer>, block_frames: usize) -> Result<Self> {
        let (stream, stream_handle) = OutputStream::try_default()
            .map_err(|e| SoundError::Resource(format!("Failed to create audio stream: {}", e)))?;
        let sink = Sink::try_new(&stream_handle)
            .map_err(|e| SoundError::Resource(format!("Failed to create audio sink: {}", e)))?;

        let finished = Arc::new(AtomicBool::new(false));
        sink.append(MixerSource::new(
            mixer,
            block_frames.max(1),
            Arc::clone(&finished),
        ));

        Ok(AudioDevice {
            _stream: stream,
            sink,
            finished,
        })
    }

    /// Pause playback
    pub fn pause(&self) {
        self.sink.pause();
    }

    /// Resume playback
    pub fn play(&self) {
        self.sink.play();
    }

    /// Stop pulling from the mixer
    pub fn finish(&self) {
        self.finished.store(true, Ordering::Relaxed);
    }
}

impl Drop for AudioDevice {
    fn drop(&mut self) {
        self.finish();
        self.sink.pause();
    }
}
