//! Messages exchanged between the resample worker proxy and its thread.
//!
//! Every request carries a `RequestId`. Requests that expect an answer
//! (`init`, `reset`, `release`, `numRequiredInputSamples`) register the id in
//! the pending table before sending; the worker thread resolves exactly that
//! entry, so overlapping requests never settle each other's completions.
//! `process` requests are fire-and-forget and only report failures in the log.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::models::error::ProcessorError;
use crate::models::frame::InputFrame;
use crate::traits::resampler_module::ResamplerFactory;

pub type RequestId = u64;

pub(crate) type ReplySender = Sender<Result<WorkerReply, ProcessorError>>;

/// Pending completions keyed by request id.
pub(crate) type PendingTable = Arc<Mutex<HashMap<RequestId, ReplySender>>>;

pub(crate) struct WorkerRequest {
    pub id: RequestId,
    pub command: WorkerCommand,
}

pub(crate) enum WorkerCommand {
    Init {
        module: Arc<dyn ResamplerFactory>,
        input_sample_rate: u32,
        output_sample_rate: u32,
        frame_length: usize,
        filter_order: u32,
    },
    Process {
        input_frame: InputFrame,
    },
    Reset,
    Release,
    NumRequiredInputSamples {
        num_samples: usize,
    },
}

impl WorkerCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Init { .. } => "init",
            Self::Process { .. } => "process",
            Self::Reset => "reset",
            Self::Release => "release",
            Self::NumRequiredInputSamples { .. } => "numRequiredInputSamples",
        }
    }
}

/// Successful worker replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerReply {
    Ready { version: String },
    Done,
    RequiredInputSamples(usize),
}

impl fmt::Display for WorkerReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready { version } => write!(f, "ready (version {})", version),
            Self::Done => write!(f, "ok"),
            Self::RequiredInputSamples(n) => write!(f, "ok ({} samples)", n),
        }
    }
}

/// The eventual result of a request sent to the resample worker.
pub struct Completion<T> {
    rx: Receiver<Result<WorkerReply, ProcessorError>>,
    extract: fn(WorkerReply) -> Result<T, ProcessorError>,
}

impl<T> Completion<T> {
    pub(crate) fn new(
        rx: Receiver<Result<WorkerReply, ProcessorError>>,
        extract: fn(WorkerReply) -> Result<T, ProcessorError>,
    ) -> Self {
        Self { rx, extract }
    }

    /// Block until the worker answers.
    ///
    /// A worker that is torn down before answering yields `NotInitialized`.
    pub fn wait(self) -> Result<T, ProcessorError> {
        let reply = self.rx.recv().map_err(|_| ProcessorError::NotInitialized)??;
        (self.extract)(reply)
    }

    /// Block for at most `timeout`. The completion stays usable after a timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<T, ProcessorError> {
        match self.rx.recv_timeout(timeout) {
            Ok(reply) => (self.extract)(reply?),
            Err(RecvTimeoutError::Timeout) => Err(ProcessorError::Worker(format!(
                "no reply within {} ms",
                timeout.as_millis()
            ))),
            Err(RecvTimeoutError::Disconnected) => Err(ProcessorError::NotInitialized),
        }
    }
}

pub(crate) fn expect_done(reply: WorkerReply) -> Result<(), ProcessorError> {
    match reply {
        WorkerReply::Done => Ok(()),
        other => Err(unexpected(other)),
    }
}

pub(crate) fn expect_ready(reply: WorkerReply) -> Result<String, ProcessorError> {
    match reply {
        WorkerReply::Ready { version } => Ok(version),
        other => Err(unexpected(other)),
    }
}

pub(crate) fn expect_samples(reply: WorkerReply) -> Result<usize, ProcessorError> {
    match reply {
        WorkerReply::RequiredInputSamples(n) => Ok(n),
        other => Err(unexpected(other)),
    }
}

fn unexpected(reply: WorkerReply) -> ProcessorError {
    ProcessorError::Worker(format!("unexpected reply: {}", reply))
}
