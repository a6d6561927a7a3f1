use std::sync::Arc;

use parking_lot::Mutex;

use super::handle::Engine;
use crate::models::frame::Frame;

/// Outcome of delivering one frame to every engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

/// The set of engines receiving output frames.
///
/// Writers replace the whole member list under the lock; `dispatch` clones
/// the current list and iterates it outside the lock. A frame therefore sees
/// either the membership before a change or after it, never a mix.
#[derive(Debug, Default)]
pub struct EngineRegistry {
    engines: Mutex<Arc<Vec<Engine>>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add engines that are not yet members. Returns the ones actually added.
    pub fn add(&self, engines: &[Engine]) -> Vec<Engine> {
        let mut guard = self.engines.lock();
        let mut next = guard.as_ref().clone();
        let mut added = Vec::new();
        for engine in engines {
            if !next.contains(engine) {
                next.push(engine.clone());
                added.push(engine.clone());
            }
        }
        if !added.is_empty() {
            *guard = Arc::new(next);
        }
        added
    }

    /// Remove engines that are members. Returns how many were removed.
    pub fn remove(&self, engines: &[Engine]) -> usize {
        let mut guard = self.engines.lock();
        let before = guard.len();
        let next: Vec<Engine> = guard
            .iter()
            .filter(|member| !engines.contains(member))
            .cloned()
            .collect();
        let removed = before - next.len();
        if removed > 0 {
            *guard = Arc::new(next);
        }
        removed
    }

    /// Remove every engine, returning the previous members.
    pub fn clear(&self) -> Vec<Engine> {
        let previous = std::mem::take(&mut *self.engines.lock());
        Arc::try_unwrap(previous).unwrap_or_else(|shared| shared.as_ref().clone())
    }

    pub fn contains(&self, engine: &Engine) -> bool {
        self.engines.lock().contains(engine)
    }

    pub fn len(&self) -> usize {
        self.engines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.lock().is_empty()
    }

    /// The current members.
    pub fn snapshot(&self) -> Arc<Vec<Engine>> {
        Arc::clone(&self.engines.lock())
    }

    /// Deliver `frame` to every member. One engine failing does not stop the rest.
    pub fn dispatch(&self, frame: &Frame) -> DispatchReport {
        let engines = self.snapshot();
        let mut report = DispatchReport::default();
        for engine in engines.iter() {
            match engine.deliver(frame) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    log::warn!("{} ({}) dropped a frame: {}", engine.id(), engine.kind().name(), e);
                }
            }
        }
        report
    }
}
