use std::ops::Deref;
use std::sync::Arc;

/// An immutable, fixed-length block of 16-bit PCM samples.
///
/// Cloning is cheap and every clone shares the same samples, so one frame can
/// be fanned out to many engines without any of them being able to alter
/// what the others see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(Arc<[i16]>);

impl Frame {
    pub fn samples(&self) -> &[i16] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<i16> {
        self.0.to_vec()
    }
}

impl From<Vec<i16>> for Frame {
    fn from(samples: Vec<i16>) -> Self {
        Self(samples.into())
    }
}

impl From<&[i16]> for Frame {
    fn from(samples: &[i16]) -> Self {
        Self(samples.into())
    }
}

impl Deref for Frame {
    type Target = [i16];

    fn deref(&self) -> &[i16] {
        &self.0
    }
}

/// A block of captured audio handed to the resample worker.
///
/// Ownership of the samples moves into the worker with the request.
#[derive(Debug, Clone, PartialEq)]
pub enum InputFrame {
    /// Normalized samples in `[-1.0, 1.0)` as delivered by capture hardware.
    Float(Vec<f32>),
    /// Samples already in the native 16-bit format.
    Int16(Vec<i16>),
}

impl InputFrame {
    pub fn len(&self) -> usize {
        match self {
            Self::Float(samples) => samples.len(),
            Self::Int16(samples) => samples.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Convert to the native 16-bit representation.
    pub fn into_int16(self) -> Vec<i16> {
        match self {
            Self::Float(samples) => samples.iter().map(|&s| float_to_int16(s)).collect(),
            Self::Int16(samples) => samples,
        }
    }
}

/// Convert one normalized float sample to 16-bit PCM.
///
/// Negative values scale by 32768, non-negative by 32767, truncated toward
/// zero. Out-of-range input saturates.
pub fn float_to_int16(sample: f32) -> i16 {
    if sample < 0.0 {
        (sample * 32768.0) as i16
    } else {
        (sample * 32767.0) as i16
    }
}

/// Downmix interleaved multi-channel audio to mono by averaging channels per frame.
pub fn downmix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let frame_count = samples.len() / channels;
    let scale = 1.0 / channels as f32;
    let mut mono = Vec::with_capacity(frame_count);
    for frame in samples.chunks_exact(channels) {
        mono.push(frame.iter().sum::<f32>() * scale);
    }
    mono
}
