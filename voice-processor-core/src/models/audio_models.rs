use serde::Serialize;

/// Transport type for an audio device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioTransportType {
    BuiltIn,
    Bluetooth,
    Usb,
    Virtual,
    Unknown,
}

/// A capture device as reported by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioSource {
    pub id: String,
    pub name: String,
    pub is_default: bool,
    pub transport_type: Option<AudioTransportType>,
}

/// Which device to open and how.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureRequest {
    /// Specific device, or None for the system default.
    pub device_id: Option<String>,
    /// Custom capture module locator, interpreted by the provider.
    pub capture_module: Option<String>,
}

/// The device context a provider opened: native format plus device identity.
///
/// Created on the first start and kept across stop/start cycles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureContext {
    pub sample_rate: u32,
    pub channels: u16,
    pub source: AudioSource,
}

/// Counters for debugging a running pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineDiagnostics {
    pub capture_callbacks: u64,
    pub input_samples: u64,
    pub input_frames_dropped: u64,
    pub frames_dispatched: u64,
    pub dispatch_failures: u64,
    pub starts: u64,
    pub stops: u64,
}
