pub mod protocol;
pub mod resample_worker;
