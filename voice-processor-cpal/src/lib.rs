//! # voice-processor-cpal
//!
//! Cross-platform microphone backend for voice-processor, built on cpal.
//!
//! Provides:
//! - `CpalMicCapture`: microphone capture via the default cpal host (feature `cpal`)
//! - `BlockFramer`: re-blocks irregular device callbacks into fixed-size blocks
//!
//! ## Platform Requirements
//! - Linux: ALSA development headers (`libasound2-dev`) when building with `cpal`
//! - macOS: microphone permission for the hosting terminal or app
//!
//! ## Usage
//! ```ignore
//! use voice_processor_core::{ProcessorOptions, VoiceProcessor, VuMeterEngine};
//! use voice_processor_cpal::CpalMicCapture;
//!
//! let processor = VoiceProcessor::new(CpalMicCapture::default_device(), ProcessorOptions::default())?;
//! let meter = VuMeterEngine::spawn()?;
//! processor.subscribe(meter.engine())?;
//! ```

pub mod block_framer;
#[cfg(feature = "cpal")]
pub mod mic;

pub use block_framer::BlockFramer;
#[cfg(feature = "cpal")]
pub use mic::CpalMicCapture;
