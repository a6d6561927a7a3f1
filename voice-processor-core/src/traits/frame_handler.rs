use crate::models::frame::Frame;

/// An inline engine that handles frames directly on the dispatch thread.
///
/// Called from the resample worker thread, not the caller's thread.
/// Implementations should hand heavy work off elsewhere.
pub trait FrameHandler: Send + Sync {
    fn on_frame(&self, frame: &Frame);
}
