use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, select, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;

use crate::models::error::ProcessorError;
use crate::models::frame::{Frame, InputFrame};
use crate::processing::frame_accumulator::FrameAccumulator;
use crate::traits::resampler_module::{ResamplerFactory, ResamplerModule};
use crate::worker::protocol::{
    expect_done, expect_ready, expect_samples, Completion, PendingTable, RequestId, WorkerCommand,
    WorkerReply, WorkerRequest,
};

/// Callback invoked on the worker thread once per completed output frame.
pub type FrameCallback = Arc<dyn Fn(Frame) + Send + Sync + 'static>;

/// Default depth of the worker's request queue, in requests.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Parameters for a resample worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
    pub filter_order: u32,
    pub frame_length: usize,
    pub queue_capacity: usize,
}

impl WorkerConfig {
    pub fn new(input_sample_rate: u32, output_sample_rate: u32, filter_order: u32, frame_length: usize) -> Self {
        Self {
            input_sample_rate,
            output_sample_rate,
            filter_order,
            frame_length,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

struct WorkerShared {
    requests: Sender<WorkerRequest>,
    shutdown: Mutex<Option<Sender<()>>>,
    pending: PendingTable,
    next_id: AtomicU64,
    terminated: Arc<AtomicBool>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
    thread_id: thread::ThreadId,
    // Disconnects when the worker thread returns.
    exited: Receiver<()>,
}

/// Proxy for a resampler module running on its own thread.
///
/// ```text
/// process(InputFrame) ──► [bounded queue] ──► resample-worker thread
///                                               module.process → FrameAccumulator
///                                               ──► on_frame(Frame) per full frame
/// ```
///
/// Clones share the same worker thread. Frames reach `on_frame` in the order
/// their input was submitted.
#[derive(Clone)]
pub struct ResampleWorker {
    shared: Arc<WorkerShared>,
    version: Arc<str>,
}

impl ResampleWorker {
    /// Spawn the worker thread and initialize a module from `factory` on it.
    ///
    /// Blocks until the worker acknowledges init. Fails with `Initialization`
    /// if the module rejects the configuration.
    pub fn create(
        config: WorkerConfig,
        factory: Arc<dyn ResamplerFactory>,
        on_frame: FrameCallback,
    ) -> Result<Self, ProcessorError> {
        let (request_tx, request_rx) = bounded(config.queue_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let pending: PendingTable = Arc::default();
        let terminated = Arc::new(AtomicBool::new(false));
        let (exit_guard, exited) = bounded::<()>(0);

        let handle = {
            let pending = Arc::clone(&pending);
            let terminated = Arc::clone(&terminated);
            thread::Builder::new()
                .name("resample-worker".into())
                .spawn(move || {
                    let _exit_guard = exit_guard;
                    run_worker(request_rx, shutdown_rx, pending, terminated, on_frame)
                })
                .map_err(|e| {
                    ProcessorError::Initialization(format!("failed to spawn resample worker: {}", e))
                })?
        };
        let thread_id = handle.thread().id();

        let worker = Self {
            shared: Arc::new(WorkerShared {
                requests: request_tx,
                shutdown: Mutex::new(Some(shutdown_tx)),
                pending,
                next_id: AtomicU64::new(1),
                terminated,
                handle: Mutex::new(Some(handle)),
                thread_id,
                exited,
            }),
            version: Arc::from(""),
        };

        let init = worker.request(
            WorkerCommand::Init {
                module: factory,
                input_sample_rate: config.input_sample_rate,
                output_sample_rate: config.output_sample_rate,
                frame_length: config.frame_length,
                filter_order: config.filter_order,
            },
            expect_ready,
        )?;

        match init.wait() {
            Ok(version) => {
                log::debug!(
                    "resample worker ready: {} Hz -> {} Hz, order {}, frame {} (module {})",
                    config.input_sample_rate,
                    config.output_sample_rate,
                    config.filter_order,
                    config.frame_length,
                    version
                );
                Ok(Self {
                    shared: worker.shared,
                    version: Arc::from(version),
                })
            }
            Err(e) => {
                worker.terminate();
                Err(match e {
                    ProcessorError::Initialization(_) => e,
                    other => ProcessorError::Initialization(other.to_string()),
                })
            }
        }
    }

    /// Queue a block of captured audio. Does not wait for the result.
    ///
    /// Fails with `WorkerBusy` when the queue is full; the block is dropped.
    pub fn process(&self, input_frame: InputFrame) -> Result<(), ProcessorError> {
        self.ensure_alive()?;
        let request = WorkerRequest {
            id: self.next_id(),
            command: WorkerCommand::Process { input_frame },
        };
        self.shared.requests.try_send(request).map_err(|e| match e {
            TrySendError::Full(_) => ProcessorError::WorkerBusy,
            TrySendError::Disconnected(_) => ProcessorError::NotInitialized,
        })
    }

    /// Clear the module's filter state and the partial output frame together.
    ///
    /// Blocks of input queued before the reset are processed first.
    pub fn reset(&self) -> Result<Completion<()>, ProcessorError> {
        self.request(WorkerCommand::Reset, expect_done)
    }

    /// Input samples the module needs to produce `num_samples` output samples.
    pub fn num_required_input_samples(&self, num_samples: usize) -> Result<Completion<usize>, ProcessorError> {
        self.request(WorkerCommand::NumRequiredInputSamples { num_samples }, expect_samples)
    }

    /// Release the module, then tear the worker down.
    ///
    /// Every later call fails with `NotInitialized`.
    pub fn release(&self) -> Result<(), ProcessorError> {
        let result = self.request(WorkerCommand::Release, expect_done)?.wait();
        self.terminate();
        if !self.on_worker_thread() {
            if let Some(handle) = self.shared.handle.lock().take() {
                let _ = handle.join();
            }
        }
        result
    }

    /// Terminate, then wait up to `grace` for the worker thread to exit.
    ///
    /// Once this returns `true` no frame from this worker is in flight. Called
    /// from the worker thread itself it only terminates and returns `false`.
    pub fn shutdown(&self, grace: Duration) -> bool {
        self.terminate();
        if self.on_worker_thread() {
            return false;
        }
        match self.shared.exited.recv_timeout(grace) {
            Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.shared.handle.lock().take() {
                    let _ = handle.join();
                }
                true
            }
            Ok(()) | Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "resample worker still busy {} ms after terminate, detaching",
                    grace.as_millis()
                );
                false
            }
        }
    }

    /// Tear the worker down without waiting for queued work.
    ///
    /// Pending blocks are abandoned and no further frames are delivered.
    /// Outstanding completions resolve with `NotInitialized`.
    pub fn terminate(&self) {
        if self.shared.terminated.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.shutdown.lock().take();
        fail_pending(&self.shared.pending);
        log::debug!("resample worker terminated");
    }

    pub fn is_terminated(&self) -> bool {
        self.shared.terminated.load(Ordering::Acquire)
    }

    /// Version string reported by the module at init.
    pub fn version(&self) -> &str {
        &self.version
    }

    fn request<T>(
        &self,
        command: WorkerCommand,
        extract: fn(WorkerReply) -> Result<T, ProcessorError>,
    ) -> Result<Completion<T>, ProcessorError> {
        self.ensure_alive()?;
        let id = self.next_id();
        let (reply_tx, reply_rx) = bounded(1);
        self.shared.pending.lock().insert(id, reply_tx);

        if self.shared.requests.send(WorkerRequest { id, command }).is_err() {
            self.shared.pending.lock().remove(&id);
            return Err(ProcessorError::NotInitialized);
        }
        Ok(Completion::new(reply_rx, extract))
    }

    fn on_worker_thread(&self) -> bool {
        thread::current().id() == self.shared.thread_id
    }

    fn ensure_alive(&self) -> Result<(), ProcessorError> {
        if self.is_terminated() {
            return Err(ProcessorError::NotInitialized);
        }
        Ok(())
    }

    fn next_id(&self) -> RequestId {
        self.shared.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// Module-side state owned by the worker thread.
struct WorkerState {
    module: Box<dyn ResamplerModule>,
    accumulator: FrameAccumulator<i16>,
    input_chunk: usize,
    scratch: Vec<i16>,
}

fn run_worker(
    requests: Receiver<WorkerRequest>,
    shutdown: Receiver<()>,
    pending: PendingTable,
    terminated: Arc<AtomicBool>,
    on_frame: FrameCallback,
) {
    let mut state: Option<WorkerState> = None;

    loop {
        let request = select! {
            recv(shutdown) -> _ => break,
            recv(requests) -> msg => match msg {
                Ok(request) => request,
                Err(_) => break,
            },
        };
        if terminated.load(Ordering::Acquire) {
            break;
        }

        let name = request.command.name();
        let result = handle_command(&mut state, request.command, &on_frame, &terminated);
        let waiter = pending.lock().remove(&request.id);
        match waiter {
            Some(reply) => {
                let _ = reply.send(result);
            }
            None => {
                if let Err(e) = result {
                    log::error!("resample worker {} failed: {}", name, e);
                }
            }
        }
    }

    if let Some(mut state) = state.take() {
        state.module.release();
    }
    fail_pending(&pending);
}

fn handle_command(
    state: &mut Option<WorkerState>,
    command: WorkerCommand,
    on_frame: &FrameCallback,
    terminated: &AtomicBool,
) -> Result<WorkerReply, ProcessorError> {
    match command {
        WorkerCommand::Init {
            module,
            input_sample_rate,
            output_sample_rate,
            frame_length,
            filter_order,
        } => {
            if state.is_some() {
                return Err(ProcessorError::Initialization("resampler already initialized".into()));
            }
            let module = module
                .init(input_sample_rate, output_sample_rate, filter_order)
                .map_err(|e| ProcessorError::Initialization(e.to_string()))?;
            let input_chunk = module.num_input_samples(frame_length) + 1;
            let version = module.version().to_string();
            *state = Some(WorkerState {
                module,
                accumulator: FrameAccumulator::new(frame_length),
                input_chunk,
                scratch: Vec::with_capacity(frame_length * 2),
            });
            Ok(WorkerReply::Ready { version })
        }
        WorkerCommand::Process { input_frame } => {
            let state = state.as_mut().ok_or(ProcessorError::NotInitialized)?;
            let samples = input_frame.into_int16();
            for chunk in samples.chunks(state.input_chunk) {
                state.scratch.clear();
                state
                    .module
                    .process(chunk, &mut state.scratch)
                    .map_err(|e| ProcessorError::Worker(e.to_string()))?;
                state.accumulator.push(&state.scratch, |frame| {
                    if !terminated.load(Ordering::Acquire) {
                        on_frame(Frame::from(frame));
                    }
                });
            }
            Ok(WorkerReply::Done)
        }
        WorkerCommand::Reset => {
            let state = state.as_mut().ok_or(ProcessorError::NotInitialized)?;
            state.module.reset();
            state.accumulator.reset();
            Ok(WorkerReply::Done)
        }
        WorkerCommand::Release => {
            let mut released = state.take().ok_or(ProcessorError::NotInitialized)?;
            released.module.release();
            Ok(WorkerReply::Done)
        }
        WorkerCommand::NumRequiredInputSamples { num_samples } => {
            let state = state.as_ref().ok_or(ProcessorError::NotInitialized)?;
            Ok(WorkerReply::RequiredInputSamples(
                state.module.num_input_samples(num_samples),
            ))
        }
    }
}

fn fail_pending(pending: &PendingTable) {
    for (_, reply) in pending.lock().drain() {
        let _ = reply.send(Err(ProcessorError::NotInitialized));
    }
}
