//! Fixed-size capture blocks from irregular device callbacks.
//!
//! Audio backends hand over whatever buffer size the driver picked, which can
//! change from one callback to the next. The voice processor expects one
//! callback per fixed block, so incoming samples are converted to f32 and
//! re-cut into blocks of `block_frames` interleaved frames before delivery.

use voice_processor_core::processing::frame_accumulator::FrameAccumulator;
use voice_processor_core::traits::capture_provider::AudioBufferCallback;

/// Frames per delivered block, matching a classic 4096-frame capture node.
pub const DEFAULT_BLOCK_FRAMES: usize = 4096;

/// Re-blocks interleaved device samples and forwards each full block.
pub struct BlockFramer {
    channels: u16,
    accumulator: FrameAccumulator<f32>,
    scratch: Vec<f32>,
    callback: AudioBufferCallback,
    blocks_emitted: u64,
}

impl BlockFramer {
    pub fn new(block_frames: usize, channels: u16, callback: AudioBufferCallback) -> Self {
        let channels = channels.max(1);
        Self {
            channels,
            accumulator: FrameAccumulator::new(block_frames.max(1) * usize::from(channels)),
            scratch: Vec::new(),
            callback,
            blocks_emitted: 0,
        }
    }

    /// Convert `data` with `convert` and forward every completed block.
    ///
    /// Returns the number of blocks delivered by this call.
    pub fn push<T, F>(&mut self, data: &[T], convert: F) -> usize
    where
        T: Copy,
        F: FnMut(T) -> f32,
    {
        self.scratch.clear();
        self.scratch.extend(data.iter().copied().map(convert));

        let callback = &self.callback;
        let channels = self.channels;
        let emitted = self
            .accumulator
            .push(&self.scratch, |block| callback(&block, channels));
        self.blocks_emitted += emitted as u64;
        emitted
    }

    pub fn push_f32(&mut self, data: &[f32]) -> usize {
        self.push(data, |s| s)
    }

    /// Interleaved samples held back waiting for a full block.
    pub fn pending_samples(&self) -> usize {
        self.accumulator.pending()
    }

    pub fn blocks_emitted(&self) -> u64 {
        self.blocks_emitted
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

pub fn i16_to_f32(sample: i16) -> f32 {
    f32::from(sample) / 32_768.0
}

pub fn u16_to_f32(sample: u16) -> f32 {
    (f32::from(sample) - 32_768.0) / 32_768.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn recording_framer(block_frames: usize, channels: u16) -> (BlockFramer, Arc<Mutex<Vec<(Vec<f32>, u16)>>>) {
        let blocks = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&blocks);
        let callback: AudioBufferCallback = Arc::new(move |samples: &[f32], channels: u16| {
            sink.lock().push((samples.to_vec(), channels));
        });
        (BlockFramer::new(block_frames, channels, callback), blocks)
    }

    #[test]
    fn irregular_callbacks_become_fixed_blocks() {
        let (mut framer, blocks) = recording_framer(4, 1);

        assert_eq!(framer.push_f32(&[0.1, 0.2, 0.3]), 0);
        assert_eq!(framer.push_f32(&[0.4, 0.5, 0.6, 0.7, 0.8, 0.9]), 2);
        assert_eq!(framer.pending_samples(), 1);
        assert_eq!(framer.blocks_emitted(), 2);

        let blocks = blocks.lock();
        assert_eq!(blocks[0].0, vec![0.1, 0.2, 0.3, 0.4]);
        assert_eq!(blocks[1].0, vec![0.5, 0.6, 0.7, 0.8]);
    }

    #[test]
    fn blocks_keep_channel_interleaving() {
        let (mut framer, blocks) = recording_framer(2, 2);
        framer.push_f32(&[1.0, -1.0, 0.5]);
        framer.push_f32(&[-0.5, 0.0]);

        let blocks = blocks.lock();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0], (vec![1.0, -1.0, 0.5, -0.5], 2));
        assert_eq!(framer.pending_samples(), 1);
    }

    #[test]
    fn integer_formats_are_normalized() {
        let (mut framer, blocks) = recording_framer(3, 1);
        framer.push(&[i16::MIN, 0, 16_384], i16_to_f32);
        framer.push(&[0u16, 32_768, 65_535], u16_to_f32);

        let blocks = blocks.lock();
        assert_eq!(blocks[0].0, vec![-1.0, 0.0, 0.5]);
        assert_eq!(blocks[1].0[0], -1.0);
        assert_eq!(blocks[1].0[1], 0.0);
        assert!(blocks[1].0[2] < 1.0);
    }

    #[test]
    fn zero_channels_is_treated_as_mono() {
        let (framer, _) = recording_framer(8, 0);
        assert_eq!(framer.channels(), 1);
    }
}
