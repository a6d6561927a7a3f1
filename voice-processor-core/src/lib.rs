//! # voice-processor-core
//!
//! Platform-agnostic voice capture pipeline.
//!
//! Takes microphone audio at whatever rate the device delivers, resamples it
//! on a dedicated worker thread, cuts the result into fixed-length 16-bit
//! frames and fans every frame out to the subscribed engines. Platform
//! backends (e.g. `voice-processor-cpal`) implement the `CaptureProvider`
//! trait and plug into `VoiceProcessor`.
//!
//! ## Architecture
//!
//! ```text
//! voice-processor-core (this crate)
//! ├── traits/       ← CaptureProvider, ResamplerModule, FrameHandler
//! ├── models/       ← ProcessorError, ProcessorOptions, ProcessorState, Frame, diagnostics
//! ├── processing/   ← FrameAccumulator, LinearResampler, WAV header generation
//! ├── worker/       ← ResampleWorker and its request/reply protocol
//! ├── engine/       ← Engine handles, EngineRegistry, VU meter, audio dump
//! ├── session/      ← VoiceProcessor (start/stop state machine)
//! └── storage/      ← dump export with checksum + metadata sidecar
//! ```

pub mod engine;
pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;
pub mod worker;

// Re-export key types at crate root for convenience.
pub use engine::audio_dump::{AudioDump, AudioDumpEngine, DumpHandle};
pub use engine::handle::{DeliveryError, Engine, EngineCapabilities, EngineId, EngineKind, EngineMessage, IntoEngines};
pub use engine::registry::{DispatchReport, EngineRegistry};
pub use engine::vu_meter::VuMeterEngine;
pub use models::audio_models::{AudioSource, AudioTransportType, CaptureContext, CaptureRequest, PipelineDiagnostics};
pub use models::config::ProcessorOptions;
pub use models::error::{CaptureError, ModuleError, ProcessorError};
pub use models::frame::{Frame, InputFrame};
pub use models::state::ProcessorState;
pub use processing::frame_accumulator::FrameAccumulator;
pub use processing::linear_resampler::{LinearResampler, LinearResamplerFactory};
pub use session::processor::VoiceProcessor;
pub use storage::dump_writer::{write_dump, DumpFile};
pub use traits::capture_provider::{AudioBufferCallback, CaptureProvider};
pub use traits::frame_handler::FrameHandler;
pub use traits::resampler_module::{ResamplerFactory, ResamplerModule};
pub use worker::protocol::Completion;
pub use worker::resample_worker::{ResampleWorker, WorkerConfig};
