use crate::models::error::ModuleError;

/// A native resampling module instance.
///
/// Lives on the resample worker thread for its whole life and is never
/// shared, so it does not need to be `Send`.
pub trait ResamplerModule {
    /// Resample `input`, appending produced samples to `output`.
    ///
    /// Returns the number of samples produced, which varies call to call when
    /// the rate ratio is not an integer.
    fn process(&mut self, input: &[i16], output: &mut Vec<i16>) -> Result<usize, ModuleError>;

    /// Clear internal filter state.
    fn reset(&mut self);

    /// Release native resources. No other call is valid afterwards.
    fn release(&mut self);

    /// Input samples needed to produce `output_samples` at the configured ratio.
    fn num_input_samples(&self, output_samples: usize) -> usize;

    /// Output samples produced from `input_samples` at the configured ratio.
    fn num_output_samples(&self, input_samples: usize) -> usize;

    fn version(&self) -> &str;
}

/// Creates resampler modules; handed to the worker and invoked on its thread.
pub trait ResamplerFactory: Send + Sync {
    fn init(
        &self,
        input_sample_rate: u32,
        output_sample_rate: u32,
        filter_order: u32,
    ) -> Result<Box<dyn ResamplerModule>, ModuleError>;
}
