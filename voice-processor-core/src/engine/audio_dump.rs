use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

use crate::models::error::ProcessorError;
use crate::models::frame::Frame;
use crate::processing::wav_format;
use crate::traits::frame_handler::FrameHandler;

#[derive(Debug, Default)]
struct DumpBuffer {
    samples: Vec<i16>,
    frames: usize,
}

/// Inline engine that buffers every frame it receives.
#[derive(Debug, Default)]
pub struct AudioDumpEngine {
    buffer: Mutex<DumpBuffer>,
}

impl AudioDumpEngine {
    /// Create a recorder with room for `expected_samples` before reallocating.
    pub fn with_capacity(expected_samples: usize) -> Self {
        Self {
            buffer: Mutex::new(DumpBuffer {
                samples: Vec::with_capacity(expected_samples),
                frames: 0,
            }),
        }
    }

    pub fn frames_received(&self) -> usize {
        self.buffer.lock().frames
    }

    /// Concatenate everything received so far into one block and start over.
    pub fn take_samples(&self) -> Vec<i16> {
        let mut buffer = self.buffer.lock();
        buffer.frames = 0;
        std::mem::take(&mut buffer.samples)
    }
}

impl FrameHandler for AudioDumpEngine {
    fn on_frame(&self, frame: &Frame) {
        let mut buffer = self.buffer.lock();
        buffer.samples.extend_from_slice(frame);
        buffer.frames += 1;
    }
}

/// A finished audio dump: every output frame captured during the window, in order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioDump {
    pub id: Uuid,
    pub captured_at: DateTime<Utc>,
    pub sample_rate: u32,
    pub frame_length: usize,
    #[serde(skip)]
    pub samples: Vec<i16>,
}

impl AudioDump {
    pub fn new(samples: Vec<i16>, sample_rate: u32, frame_length: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            captured_at: Utc::now(),
            sample_rate,
            frame_length,
            samples,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Whole frames contained in the dump.
    pub fn frame_count(&self) -> usize {
        if self.frame_length == 0 {
            0
        } else {
            self.samples.len() / self.frame_length
        }
    }

    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / u64::from(self.sample_rate)
    }

    /// Raw little-endian 16-bit PCM.
    pub fn to_pcm_bytes(&self) -> Vec<u8> {
        wav_format::pcm_to_le_bytes(&self.samples)
    }

    /// A mono 16-bit WAV file.
    pub fn to_wav_bytes(&self) -> Vec<u8> {
        wav_format::mono_wav_bytes(&self.samples, self.sample_rate)
    }
}

/// Pending result of `VoiceProcessor::audio_dump`.
pub struct DumpHandle {
    rx: Receiver<Result<AudioDump, ProcessorError>>,
}

impl DumpHandle {
    pub(crate) fn new(rx: Receiver<Result<AudioDump, ProcessorError>>) -> Self {
        Self { rx }
    }

    /// Block until the dump window closes.
    pub fn wait(self) -> Result<AudioDump, ProcessorError> {
        self.rx
            .recv()
            .map_err(|_| ProcessorError::Worker("audio dump timer went away".into()))?
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Result<AudioDump, ProcessorError> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(ProcessorError::Worker(format!(
                "audio dump not finished within {} ms",
                timeout.as_millis()
            ))),
            Err(RecvTimeoutError::Disconnected) => {
                Err(ProcessorError::Worker("audio dump timer went away".into()))
            }
        }
    }
}
