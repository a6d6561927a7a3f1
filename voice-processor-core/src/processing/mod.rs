pub mod frame_accumulator;
pub mod linear_resampler;
pub mod wav_format;
