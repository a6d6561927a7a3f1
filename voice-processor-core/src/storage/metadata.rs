use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::engine::audio_dump::AudioDump;
use crate::models::error::ProcessorError;

/// Description of an exported audio dump, stored as a JSON sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DumpMetadata {
    pub id: String,
    pub captured_at: String,
    pub sample_rate: u32,
    pub frame_length: usize,
    pub num_samples: usize,
    pub duration_ms: u64,
    pub file_path: String,
    pub checksum: String,
}

impl DumpMetadata {
    pub fn for_dump(dump: &AudioDump, file_path: &Path, checksum: &str) -> Self {
        Self {
            id: dump.id.to_string(),
            captured_at: dump.captured_at.to_rfc3339(),
            sample_rate: dump.sample_rate,
            frame_length: dump.frame_length,
            num_samples: dump.len(),
            duration_ms: dump.duration_ms(),
            file_path: file_path.to_string_lossy().into_owned(),
            checksum: checksum.to_string(),
        }
    }
}

/// Write dump metadata as a JSON sidecar file.
///
/// The sidecar sits next to the WAV file with its extension replaced:
/// `dump.wav` gets `dump.metadata.json`.
pub fn write_metadata(metadata: &DumpMetadata, dump_path: &Path) -> Result<(), ProcessorError> {
    let metadata_path = dump_path.with_extension("metadata.json");
    let json = serde_json::to_string_pretty(metadata)
        .map_err(|e| ProcessorError::Storage(format!("failed to serialize metadata: {}", e)))?;
    fs::write(&metadata_path, json)
        .map_err(|e| ProcessorError::Storage(format!("failed to write metadata: {}", e)))?;
    Ok(())
}

/// Read dump metadata from a JSON sidecar file.
pub fn read_metadata(dump_path: &Path) -> Result<DumpMetadata, ProcessorError> {
    let metadata_path = dump_path.with_extension("metadata.json");
    let json = fs::read_to_string(&metadata_path)
        .map_err(|e| ProcessorError::Storage(format!("failed to read metadata: {}", e)))?;
    serde_json::from_str(&json)
        .map_err(|e| ProcessorError::Storage(format!("failed to parse metadata: {}", e)))
}
