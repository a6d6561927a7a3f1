use std::sync::Arc;

use crate::models::audio_models::{AudioSource, CaptureContext, CaptureRequest};
use crate::models::error::CaptureError;

/// Callback invoked once per fixed-size capture block.
///
/// Parameters:
/// - `samples`: Interleaved f32 samples in `[-1.0, 1.0)`.
/// - `channels`: Number of interleaved channels (1 = mono).
pub type AudioBufferCallback = Arc<dyn Fn(&[f32], u16) + Send + Sync + 'static>;

/// Interface for platform-specific capture adapters.
///
/// Implemented by:
/// - `CpalMicCapture` (voice-processor-cpal)
/// - In-memory scripted providers in tests
///
/// A provider is owned by one `VoiceProcessor` and reused across stop/start
/// cycles. `open` acquires the device and builds a fresh capture graph,
/// `start` begins delivery, `stop` stops the tracks and drops the graph.
pub trait CaptureProvider: Send {
    /// Whether capture is possible in this environment at all.
    fn is_available(&self) -> bool;

    /// Acquire the requested device and build a capture graph for it.
    fn open(&mut self, request: &CaptureRequest) -> Result<CaptureContext, CaptureError>;

    /// Start delivering blocks via `callback`.
    ///
    /// The callback fires on the platform audio thread and must return quickly.
    fn start(&mut self, callback: AudioBufferCallback) -> Result<(), CaptureError>;

    /// Stop capture and release the graph. The provider stays reusable.
    fn stop(&mut self) -> Result<(), CaptureError>;

    /// Whether blocks are currently flowing. A started graph that the
    /// platform suspended reports `false`.
    fn is_capturing(&self) -> bool;

    /// Information about the device backing this provider.
    fn device_info(&self) -> AudioSource;
}
