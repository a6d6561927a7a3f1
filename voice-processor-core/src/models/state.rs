use serde::Serialize;

/// Lifecycle state of a `VoiceProcessor`.
///
/// State transitions:
/// ```text
/// stopped → started → stopped → ...
/// ```
/// Each `stopped → started` transition builds a fresh capture graph and
/// resample worker; the processor object itself persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessorState {
    #[default]
    Stopped,
    Started,
}

impl ProcessorState {
    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}
