pub mod capture_provider;
pub mod frame_handler;
pub mod resampler_module;
