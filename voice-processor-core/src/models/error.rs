use thiserror::Error;

/// Errors raised by a `CaptureProvider` while acquiring or driving the device.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("permission denied")]
    PermissionDenied,

    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("device unreadable: {0}")]
    DeviceUnreadable(String),

    #[error("audio capture is not supported in this environment")]
    CaptureUnsupported,

    #[error("capture already running")]
    AlreadyRunning,

    #[error("backend error: {0}")]
    Backend(String),
}

/// Errors reported by a native resampler module.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModuleError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("malloc failed: {0}")]
    Allocation(String),

    #[error("native call failed with status {0}")]
    Status(i32),
}

/// Errors surfaced by the voice processor and its resample worker.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProcessorError {
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    #[error("resampler initialization failed: {0}")]
    Initialization(String),

    #[error("resampler not initialized")]
    NotInitialized,

    #[error("microphone permission denied")]
    Permission,

    #[error("no matching capture device: {0}")]
    DeviceMissing(String),

    #[error("capture device could not be read: {0}")]
    DeviceRead(String),

    #[error("audio capture is disabled in this environment")]
    DeviceDisabled,

    #[error("invalid engine: {0}")]
    InvalidEngine(String),

    #[error("audio dump already in progress")]
    DumpInProgress,

    #[error("resample worker queue is full")]
    WorkerBusy,

    #[error("resample worker failed: {0}")]
    Worker(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Capture(#[from] CaptureError),
}

impl ProcessorError {
    /// Map a provider error raised during `start()` onto the typed device errors.
    ///
    /// Anything that is not a permission or device problem passes through unchanged.
    pub fn from_start_failure(error: CaptureError) -> Self {
        match error {
            CaptureError::PermissionDenied => Self::Permission,
            CaptureError::DeviceNotFound(msg) => Self::DeviceMissing(msg),
            CaptureError::DeviceUnreadable(msg) => Self::DeviceRead(msg),
            CaptureError::CaptureUnsupported => Self::DeviceDisabled,
            other => Self::Capture(other),
        }
    }
}
