use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use super::metadata::{write_metadata, DumpMetadata};
use crate::engine::audio_dump::AudioDump;
use crate::models::error::ProcessorError;

/// Where a dump was written and how to verify it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpFile {
    pub path: PathBuf,
    pub checksum: String,
    pub metadata: DumpMetadata,
}

/// Write `dump` as a 16-bit mono WAV file with a JSON metadata sidecar.
///
/// ## File layout
///
/// ```text
/// {stem}.wav             [44-byte WAV header][little-endian PCM]
/// {stem}.metadata.json   id, timestamps, format, SHA-256 of the WAV file
/// ```
///
/// The sidecar replaces the extension of `path`: `dump.wav` pairs with
/// `dump.metadata.json`.
///
/// Missing parent directories are created.
pub fn write_dump(dump: &AudioDump, path: &Path) -> Result<DumpFile, ProcessorError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| ProcessorError::Storage(format!("failed to create directory: {}", e)))?;
    }

    let wav = dump.to_wav_bytes();
    fs::write(path, &wav)
        .map_err(|e| ProcessorError::Storage(format!("failed to write dump: {}", e)))?;

    let checksum = sha256_hex(&wav);
    let metadata = DumpMetadata::for_dump(dump, path, &checksum);
    write_metadata(&metadata, path)?;

    log::info!("wrote audio dump {} to {}", dump.id, path.display());
    Ok(DumpFile {
        path: path.to_path_buf(),
        checksum,
        metadata,
    })
}

impl AudioDump {
    /// Write this dump to `path`. See [`write_dump`].
    pub fn write_wav(&self, path: &Path) -> Result<DumpFile, ProcessorError> {
        write_dump(self, path)
    }
}

/// Recompute the checksum of a written dump and compare it with its sidecar.
pub fn verify_dump(path: &Path) -> Result<bool, ProcessorError> {
    let metadata = super::metadata::read_metadata(path)?;
    let data = fs::read(path)
        .map_err(|e| ProcessorError::Storage(format!("failed to read dump for checksum: {}", e)))?;
    Ok(sha256_hex(&data) == metadata.checksum)
}

fn sha256_hex(data: &[u8]) -> String {
    Sha256::digest(data).iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::wav_format::WAV_HEADER_SIZE;
    use crate::storage::metadata::read_metadata;

    fn temp_file_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("voice_processor_test_{}", std::process::id()))
            .join(name)
    }

    #[test]
    fn writes_wav_and_sidecar() {
        let path = temp_file_path("dump.wav");
        let dump = AudioDump::new(vec![0, 1, -1, 1000], 16000, 2);

        let written = write_dump(&dump, &path).unwrap();
        assert_eq!(written.checksum.len(), 64);

        let data = fs::read(&path).unwrap();
        assert_eq!(data.len(), WAV_HEADER_SIZE + 8);
        assert_eq!(&data[0..4], b"RIFF");
        let sample_rate = u32::from_le_bytes([data[24], data[25], data[26], data[27]]);
        assert_eq!(sample_rate, 16000);

        let sidecar = path.with_extension("metadata.json");
        let sidecar_name = sidecar.file_name().unwrap().to_string_lossy().into_owned();
        assert!(sidecar.exists());
        assert!(sidecar_name.ends_with("dump.metadata.json"));
        assert!(!sidecar_name.contains(".wav"));

        let metadata = read_metadata(&path).unwrap();
        assert_eq!(metadata, written.metadata);
        assert_eq!(metadata.id, dump.id.to_string());
        assert_eq!(metadata.num_samples, 4);
        assert!(verify_dump(&path).unwrap());

        fs::remove_file(&path).ok();
        fs::remove_file(path.with_extension("metadata.json")).ok();
    }

    #[test]
    fn tampered_dump_fails_verification() {
        let path = temp_file_path("tampered.wav");
        let dump = AudioDump::new(vec![5; 512], 16000, 512);
        write_dump(&dump, &path).unwrap();

        let mut data = fs::read(&path).unwrap();
        data[WAV_HEADER_SIZE] ^= 0xFF;
        fs::write(&path, data).unwrap();
        assert!(!verify_dump(&path).unwrap());

        fs::remove_file(&path).ok();
        fs::remove_file(path.with_extension("metadata.json")).ok();
    }

    #[test]
    fn missing_sidecar_is_a_storage_error() {
        let path = temp_file_path("missing.wav");
        assert!(matches!(read_metadata(&path), Err(ProcessorError::Storage(_))));
    }
}
