use std::collections::VecDeque;
use std::f64::consts::PI;

use crate::models::error::ModuleError;
use crate::traits::resampler_module::{ResamplerFactory, ResamplerModule};

pub const LINEAR_RESAMPLER_VERSION: &str = "1.0.0";

/// Status returned when a released module is used again.
pub const STATUS_INVALID_STATE: i32 = 10006;

/// Factory for the built-in `LinearResampler`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearResamplerFactory;

impl ResamplerFactory for LinearResamplerFactory {
    fn init(
        &self,
        input_sample_rate: u32,
        output_sample_rate: u32,
        filter_order: u32,
    ) -> Result<Box<dyn ResamplerModule>, ModuleError> {
        let resampler = LinearResampler::new(input_sample_rate, output_sample_rate, filter_order)?;
        Ok(Box::new(resampler))
    }
}

/// Streaming resampler for 16-bit mono PCM.
///
/// When downsampling, input first runs through a windowed-sinc low-pass FIR
/// of `filter_order` taps (cutoff at the output Nyquist rate). Output samples
/// are then taken by linear interpolation at an exact integer phase, so the
/// output count over any stream is `input * out / in` with no drift.
#[derive(Debug)]
pub struct LinearResampler {
    input_rate: u32,
    output_rate: u32,
    taps: Vec<f32>,
    delay: VecDeque<f32>,
    history: Vec<f32>,
    position: usize,
    phase: u64,
    released: bool,
}

impl LinearResampler {
    pub fn new(input_rate: u32, output_rate: u32, filter_order: u32) -> Result<Self, ModuleError> {
        if input_rate == 0 || output_rate == 0 {
            return Err(ModuleError::InvalidArgument(format!(
                "sample rates must be positive (input {}, output {})",
                input_rate, output_rate
            )));
        }
        if filter_order == 0 {
            return Err(ModuleError::InvalidArgument("filter order must be positive".into()));
        }

        let taps = if output_rate < input_rate {
            let cutoff = f64::from(output_rate) / (2.0 * f64::from(input_rate));
            design_lowpass(filter_order as usize, cutoff)
        } else {
            Vec::new()
        };
        let delay = VecDeque::from(vec![0.0f32; taps.len()]);

        Ok(Self {
            input_rate,
            output_rate,
            taps,
            delay,
            history: Vec::new(),
            position: 0,
            phase: 0,
            released: false,
        })
    }

    fn filter(&mut self, sample: f32) -> f32 {
        if self.taps.is_empty() {
            return sample;
        }
        self.delay.pop_front();
        self.delay.push_back(sample);
        self.taps
            .iter()
            .zip(self.delay.iter().rev())
            .map(|(tap, x)| tap * x)
            .sum()
    }
}

impl ResamplerModule for LinearResampler {
    fn process(&mut self, input: &[i16], output: &mut Vec<i16>) -> Result<usize, ModuleError> {
        if self.released {
            return Err(ModuleError::Status(STATUS_INVALID_STATE));
        }
        if self.input_rate == self.output_rate {
            output.extend_from_slice(input);
            return Ok(input.len());
        }

        self.history
            .try_reserve(input.len())
            .map_err(|e| ModuleError::Allocation(e.to_string()))?;
        for &sample in input {
            let filtered = self.filter(f32::from(sample));
            self.history.push(filtered);
        }

        let in_rate = u64::from(self.input_rate);
        let out_rate = u64::from(self.output_rate);
        let start = output.len();

        while self.position + 1 < self.history.len() {
            let a = self.history[self.position];
            let b = self.history[self.position + 1];
            let fraction = self.phase as f32 / out_rate as f32;
            output.push(to_int16(a + (b - a) * fraction));

            self.phase += in_rate;
            self.position += (self.phase / out_rate) as usize;
            self.phase %= out_rate;
        }

        // Keep only what the next call still needs.
        if self.position >= self.history.len() {
            self.position -= self.history.len();
            self.history.clear();
        } else {
            self.history.drain(..self.position);
            self.position = 0;
        }

        Ok(output.len() - start)
    }

    fn reset(&mut self) {
        self.delay.iter_mut().for_each(|x| *x = 0.0);
        self.history.clear();
        self.position = 0;
        self.phase = 0;
    }

    fn release(&mut self) {
        self.reset();
        self.taps = Vec::new();
        self.delay = VecDeque::new();
        self.released = true;
    }

    fn num_input_samples(&self, output_samples: usize) -> usize {
        let in_rate = u64::from(self.input_rate);
        let out_rate = u64::from(self.output_rate);
        ((output_samples as u64 * in_rate + out_rate - 1) / out_rate) as usize
    }

    fn num_output_samples(&self, input_samples: usize) -> usize {
        (input_samples as u64 * u64::from(self.output_rate) / u64::from(self.input_rate)) as usize
    }

    fn version(&self) -> &str {
        LINEAR_RESAMPLER_VERSION
    }
}

/// Hamming-windowed sinc low-pass, normalized to unity gain at DC.
///
/// `cutoff` is in cycles per input sample (0.0–0.5).
fn design_lowpass(order: usize, cutoff: f64) -> Vec<f32> {
    let center = (order as f64 - 1.0) / 2.0;
    let taps: Vec<f64> = (0..order)
        .map(|n| {
            let x = n as f64 - center;
            let sinc = if x.abs() < f64::EPSILON {
                2.0 * cutoff
            } else {
                (2.0 * PI * cutoff * x).sin() / (PI * x)
            };
            let window = if order == 1 {
                1.0
            } else {
                0.54 - 0.46 * (2.0 * PI * n as f64 / (order as f64 - 1.0)).cos()
            };
            sinc * window
        })
        .collect();

    let sum: f64 = taps.iter().sum();
    taps.iter().map(|t| (t / sum) as f32).collect()
}

fn to_int16(sample: f32) -> i16 {
    sample.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}
