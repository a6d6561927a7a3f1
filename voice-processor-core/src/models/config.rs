use serde::{Deserialize, Serialize};

use super::error::ProcessorError;

/// Default output sample rate in Hz.
pub const DEFAULT_OUTPUT_SAMPLE_RATE: u32 = 16_000;

/// Default number of samples per output frame.
pub const DEFAULT_FRAME_LENGTH: usize = 512;

/// Default resampler filter order.
pub const DEFAULT_FILTER_ORDER: u32 = 50;

/// Per-session configuration for a `VoiceProcessor`.
///
/// Serialized with the camelCase keys of the public configuration surface,
/// e.g. `{"outputSampleRate": 16000, "frameLength": 512}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct ProcessorOptions {
    /// Sample rate delivered to engines (default: 16000).
    pub output_sample_rate: u32,

    /// Samples per frame delivered to engines (default: 512).
    pub frame_length: usize,

    /// Resampler filter order (default: 50).
    pub filter_order: u32,

    /// Specific capture device, or None for the system default.
    pub device_id: Option<String>,

    /// Locator of a custom capture module handed to the provider.
    #[serde(rename = "customRecorderProcessorURL")]
    pub custom_recorder_processor_url: Option<String>,
}

impl ProcessorOptions {
    pub fn validate(&self) -> Result<(), ProcessorError> {
        if self.output_sample_rate == 0 {
            return Err(ProcessorError::InvalidOptions(
                "output sample rate must be positive".into(),
            ));
        }
        if self.frame_length == 0 {
            return Err(ProcessorError::InvalidOptions(
                "frame length must be positive".into(),
            ));
        }
        if self.filter_order == 0 {
            return Err(ProcessorError::InvalidOptions(
                "filter order must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Parse and validate options from JSON.
    ///
    /// Missing keys take their defaults. Non-integer rates or lengths fail here.
    pub fn from_json_str(json: &str) -> Result<Self, ProcessorError> {
        let options: Self = serde_json::from_str(json)
            .map_err(|e| ProcessorError::InvalidOptions(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    /// Number of samples covering `duration_ms` at the output rate, rounded down.
    pub fn samples_for_duration_ms(&self, duration_ms: u64) -> usize {
        (duration_ms * u64::from(self.output_sample_rate) / 1000) as usize
    }
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            output_sample_rate: DEFAULT_OUTPUT_SAMPLE_RATE,
            frame_length: DEFAULT_FRAME_LENGTH,
            filter_order: DEFAULT_FILTER_ORDER,
            device_id: None,
            custom_recorder_processor_url: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_surface() {
        let options = ProcessorOptions::default();
        assert_eq!(options.output_sample_rate, 16000);
        assert_eq!(options.frame_length, 512);
        assert_eq!(options.filter_order, 50);
        assert!(options.device_id.is_none());
        assert!(options.validate().is_ok());
    }

    #[test]
    fn zero_values_are_rejected() {
        let options = ProcessorOptions {
            frame_length: 0,
            ..Default::default()
        };
        assert!(matches!(options.validate(), Err(ProcessorError::InvalidOptions(_))));

        let options = ProcessorOptions {
            output_sample_rate: 0,
            ..Default::default()
        };
        assert!(matches!(options.validate(), Err(ProcessorError::InvalidOptions(_))));
    }

    #[test]
    fn json_uses_camel_case_and_defaults() {
        let options =
            ProcessorOptions::from_json_str(r#"{"frameLength": 256, "deviceId": "mic-2"}"#).unwrap();
        assert_eq!(options.frame_length, 256);
        assert_eq!(options.output_sample_rate, 16000);
        assert_eq!(options.device_id.as_deref(), Some("mic-2"));

        let options = ProcessorOptions::from_json_str(
            r#"{"customRecorderProcessorURL": "file:///recorder.js"}"#,
        )
        .unwrap();
        assert_eq!(
            options.custom_recorder_processor_url.as_deref(),
            Some("file:///recorder.js")
        );
    }

    #[test]
    fn json_rejects_non_integer_values() {
        let err = ProcessorOptions::from_json_str(r#"{"outputSampleRate": 16000.5}"#).unwrap_err();
        assert!(matches!(err, ProcessorError::InvalidOptions(_)));

        let err = ProcessorOptions::from_json_str(r#"{"frameLength": "512"}"#).unwrap_err();
        assert!(matches!(err, ProcessorError::InvalidOptions(_)));
    }

    #[test]
    fn json_rejects_unknown_fields() {
        assert!(ProcessorOptions::from_json_str(r#"{"frameLenght": 512}"#).is_err());
    }

    #[test]
    fn duration_conversion_rounds_down() {
        let options = ProcessorOptions::default();
        assert_eq!(options.samples_for_duration_ms(1000), 16000);
        assert_eq!(options.samples_for_duration_ms(1), 16);

        let options = ProcessorOptions {
            output_sample_rate: 44100,
            ..Default::default()
        };
        assert_eq!(options.samples_for_duration_ms(3), 132); // 132.3
    }
}
