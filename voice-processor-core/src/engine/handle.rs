use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Sender, TrySendError};
use thiserror::Error;

use crate::models::error::ProcessorError;
use crate::models::frame::Frame;
use crate::traits::frame_handler::FrameHandler;

/// Post-style consumer: a closure that takes ownership of a frame.
pub type DirectFn = Arc<dyn Fn(Frame) + Send + Sync + 'static>;

/// Message sent to a worker-backed engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineMessage {
    Frame(Frame),
}

/// Identity of a subscribed engine. Clones of an `Engine` share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EngineId(u64);

impl EngineId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "engine#{}", self.0)
    }
}

/// How an engine receives frames. Chosen once, when the engine is built.
#[derive(Clone)]
pub enum EngineKind {
    /// Engine running on its own thread behind a bounded channel.
    Worker(Sender<EngineMessage>),
    /// Closure invoked on the dispatch thread.
    Direct(DirectFn),
    /// Handler object invoked on the dispatch thread.
    Handler(Arc<dyn FrameHandler>),
}

impl EngineKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Worker(_) => "worker",
            Self::Direct(_) => "direct",
            Self::Handler(_) => "handler",
        }
    }
}

/// Why a single delivery failed. Never aborts delivery to other engines.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("engine queue is full")]
    Full,

    #[error("engine has gone away")]
    Disconnected,

    #[error("engine panicked: {0}")]
    Panicked(String),
}

/// A frame consumer that can be subscribed to a `VoiceProcessor`.
///
/// Membership is by identity: an `Engine` and its clones are the same
/// member, two engines built from the same closure are not.
#[derive(Clone)]
pub struct Engine {
    id: EngineId,
    kind: EngineKind,
}

impl Engine {
    pub fn new(kind: EngineKind) -> Self {
        Self {
            id: EngineId::next(),
            kind,
        }
    }

    pub fn worker(sender: Sender<EngineMessage>) -> Self {
        Self::new(EngineKind::Worker(sender))
    }

    pub fn direct<F>(post: F) -> Self
    where
        F: Fn(Frame) + Send + Sync + 'static,
    {
        Self::new(EngineKind::Direct(Arc::new(post)))
    }

    pub fn handler(handler: Arc<dyn FrameHandler>) -> Self {
        Self::new(EngineKind::Handler(handler))
    }

    pub fn id(&self) -> EngineId {
        self.id
    }

    pub fn kind(&self) -> &EngineKind {
        &self.kind
    }

    /// Hand one frame to this engine.
    ///
    /// Worker engines never block the caller: a full queue drops the frame.
    /// Panics raised by direct and handler engines are caught here.
    pub fn deliver(&self, frame: &Frame) -> Result<(), DeliveryError> {
        match &self.kind {
            EngineKind::Worker(sender) => {
                sender
                    .try_send(EngineMessage::Frame(frame.clone()))
                    .map_err(|e| match e {
                        TrySendError::Full(_) => DeliveryError::Full,
                        TrySendError::Disconnected(_) => DeliveryError::Disconnected,
                    })
            }
            EngineKind::Direct(post) => {
                let frame = frame.clone();
                catch_unwind(AssertUnwindSafe(|| post(frame))).map_err(panic_message)
            }
            EngineKind::Handler(handler) => {
                catch_unwind(AssertUnwindSafe(|| handler.on_frame(frame))).map_err(panic_message)
            }
        }
    }
}

impl PartialEq for Engine {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Engine {}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("id", &self.id)
            .field("kind", &self.kind.name())
            .finish()
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> DeliveryError {
    let message = if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    };
    DeliveryError::Panicked(message)
}

/// The capabilities a caller-supplied consumer exposes, any of which may be absent.
///
/// `into_engine` picks one, preferring a worker, then a post-style closure,
/// then a handler. A consumer with none of them is rejected.
///
/// The identity is fixed when the value is built and shared by its clones,
/// so subscribing the same capabilities twice registers one engine and
/// unsubscribing them removes it.
#[derive(Clone)]
pub struct EngineCapabilities {
    id: EngineId,
    worker: Option<Sender<EngineMessage>>,
    post: Option<DirectFn>,
    on_message: Option<Arc<dyn FrameHandler>>,
}

impl Default for EngineCapabilities {
    fn default() -> Self {
        Self {
            id: EngineId::next(),
            worker: None,
            post: None,
            on_message: None,
        }
    }
}

impl EngineCapabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_worker(mut self, sender: Sender<EngineMessage>) -> Self {
        self.worker = Some(sender);
        self
    }

    pub fn with_post<F>(mut self, post: F) -> Self
    where
        F: Fn(Frame) + Send + Sync + 'static,
    {
        self.post = Some(Arc::new(post));
        self
    }

    pub fn with_handler(mut self, handler: Arc<dyn FrameHandler>) -> Self {
        self.on_message = Some(handler);
        self
    }

    /// Identity the resulting `Engine` will carry.
    pub fn id(&self) -> EngineId {
        self.id
    }

    pub fn into_engine(self) -> Result<Engine, ProcessorError> {
        let kind = if let Some(sender) = self.worker {
            EngineKind::Worker(sender)
        } else if let Some(post) = self.post {
            EngineKind::Direct(post)
        } else if let Some(handler) = self.on_message {
            EngineKind::Handler(handler)
        } else {
            return Err(ProcessorError::InvalidEngine(
                "engine must expose a worker, a post method or a message handler".into(),
            ));
        };
        Ok(Engine { id: self.id, kind })
    }
}

/// One engine or several, as accepted by `subscribe` and `unsubscribe`.
///
/// Conversion is all-or-nothing: if any entry is invalid, none are returned.
pub trait IntoEngines {
    fn into_engines(self) -> Result<Vec<Engine>, ProcessorError>;
}

impl IntoEngines for Engine {
    fn into_engines(self) -> Result<Vec<Engine>, ProcessorError> {
        Ok(vec![self])
    }
}

impl IntoEngines for &Engine {
    fn into_engines(self) -> Result<Vec<Engine>, ProcessorError> {
        Ok(vec![self.clone()])
    }
}

impl IntoEngines for Vec<Engine> {
    fn into_engines(self) -> Result<Vec<Engine>, ProcessorError> {
        Ok(self)
    }
}

impl IntoEngines for &[Engine] {
    fn into_engines(self) -> Result<Vec<Engine>, ProcessorError> {
        Ok(self.to_vec())
    }
}

impl<const N: usize> IntoEngines for [Engine; N] {
    fn into_engines(self) -> Result<Vec<Engine>, ProcessorError> {
        Ok(self.into())
    }
}

impl IntoEngines for EngineCapabilities {
    fn into_engines(self) -> Result<Vec<Engine>, ProcessorError> {
        Ok(vec![self.into_engine()?])
    }
}

impl IntoEngines for &EngineCapabilities {
    fn into_engines(self) -> Result<Vec<Engine>, ProcessorError> {
        Ok(vec![self.clone().into_engine()?])
    }
}

impl IntoEngines for Vec<EngineCapabilities> {
    fn into_engines(self) -> Result<Vec<Engine>, ProcessorError> {
        self.into_iter().map(EngineCapabilities::into_engine).collect()
    }
}
