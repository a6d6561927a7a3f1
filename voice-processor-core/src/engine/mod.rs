pub mod audio_dump;
pub mod handle;
pub mod registry;
pub mod vu_meter;
