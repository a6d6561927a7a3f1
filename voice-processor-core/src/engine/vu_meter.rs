use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::bounded;

use super::handle::{Engine, EngineMessage};
use crate::models::error::ProcessorError;

/// Level reported before any frame has arrived, and for silence.
pub const VU_FLOOR_DB: f32 = -90.0;

const FULL_SCALE: f32 = 32767.0;

/// Frames buffered for the meter thread before new ones are dropped.
const VU_QUEUE_DEPTH: usize = 16;

/// Loudness of a frame in dBFS: `10 * log10(mean(x^2) / 32767^2)`, floored at -90 dB.
pub fn frame_level_db(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return VU_FLOOR_DB;
    }
    let energy: f32 = samples
        .iter()
        .map(|&s| {
            let x = f32::from(s) / FULL_SCALE;
            x * x
        })
        .sum::<f32>()
        / samples.len() as f32;
    10.0 * energy.max(1e-9).log10()
}

/// Worker-backed engine that meters every frame on its own thread.
///
/// The latest level is readable at any time via `level_db`; an optional
/// callback also receives each new value on the meter thread. The thread
/// exits once every clone of the engine has been dropped.
pub struct VuMeterEngine {
    engine: Engine,
    level_bits: Arc<AtomicU32>,
}

impl VuMeterEngine {
    pub fn spawn() -> Result<Self, ProcessorError> {
        Self::spawn_with_callback(|_| {})
    }

    pub fn spawn_with_callback<F>(on_level: F) -> Result<Self, ProcessorError>
    where
        F: Fn(f32) + Send + 'static,
    {
        let (tx, rx) = bounded::<EngineMessage>(VU_QUEUE_DEPTH);
        let level_bits = Arc::new(AtomicU32::new(VU_FLOOR_DB.to_bits()));

        let level = Arc::clone(&level_bits);
        thread::Builder::new()
            .name("vu-meter".into())
            .spawn(move || {
                for message in rx {
                    let EngineMessage::Frame(frame) = message;
                    let db = frame_level_db(&frame);
                    level.store(db.to_bits(), Ordering::Relaxed);
                    on_level(db);
                }
            })
            .map_err(|e| ProcessorError::Initialization(format!("failed to spawn vu meter: {}", e)))?;

        Ok(Self {
            engine: Engine::worker(tx),
            level_bits,
        })
    }

    /// The engine to subscribe.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn level_db(&self) -> f32 {
        f32::from_bits(self.level_bits.load(Ordering::Relaxed))
    }
}
