use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::bounded;
use parking_lot::Mutex;

use crate::engine::audio_dump::{AudioDump, AudioDumpEngine, DumpHandle};
use crate::engine::handle::{Engine, IntoEngines};
use crate::engine::registry::EngineRegistry;
use crate::models::audio_models::{CaptureContext, CaptureRequest, PipelineDiagnostics};
use crate::models::config::ProcessorOptions;
use crate::models::error::ProcessorError;
use crate::models::frame::{downmix_to_mono, Frame, InputFrame};
use crate::models::state::ProcessorState;
use crate::processing::linear_resampler::LinearResamplerFactory;
use crate::traits::capture_provider::{AudioBufferCallback, CaptureProvider};
use crate::traits::resampler_module::ResamplerFactory;
use crate::worker::resample_worker::{FrameCallback, ResampleWorker, WorkerConfig};

/// How long `stop` waits for a frame still being dispatched by the old worker.
const WORKER_STOP_GRACE: Duration = Duration::from_secs(1);

/// Lifecycle state, guarded by one lock so start and stop never overlap.
struct Lifecycle {
    state: ProcessorState,
    options: ProcessorOptions,
    provider: Box<dyn CaptureProvider>,
    resampler: Arc<dyn ResamplerFactory>,
    worker: Option<ResampleWorker>,
    context: Option<CaptureContext>,
}

struct ProcessorInner {
    lifecycle: Mutex<Lifecycle>,
    registry: Arc<EngineRegistry>,
    diagnostics: Arc<Mutex<PipelineDiagnostics>>,
    dump_in_progress: AtomicBool,
}

/// Captures microphone audio, resamples it and fans fixed-size frames out to engines.
///
/// Data flow:
/// ```text
/// [CaptureProvider] ─ f32 blocks ─► downmix ─► [ResampleWorker] ─ Frame ─► [EngineRegistry]
///   (audio thread)                              (resample-worker)            ├─► worker engine
///                                                                            ├─► direct engine
///                                                                            └─► handler engine
/// ```
///
/// Capture runs exactly while at least one engine is subscribed: the first
/// `subscribe` starts it and the `unsubscribe` that empties the registry stops
/// it. Every start opens a fresh capture graph and resample worker; the
/// processor itself lives across cycles. Clones share the same session.
#[derive(Clone)]
pub struct VoiceProcessor {
    inner: Arc<ProcessorInner>,
}

impl VoiceProcessor {
    /// Create a stopped processor using the built-in linear resampler.
    pub fn new<P>(provider: P, options: ProcessorOptions) -> Result<Self, ProcessorError>
    where
        P: CaptureProvider + 'static,
    {
        Self::with_resampler(provider, options, Arc::new(LinearResamplerFactory))
    }

    /// Create a stopped processor with a custom resampler module.
    pub fn with_resampler<P>(
        provider: P,
        options: ProcessorOptions,
        resampler: Arc<dyn ResamplerFactory>,
    ) -> Result<Self, ProcessorError>
    where
        P: CaptureProvider + 'static,
    {
        options.validate()?;
        Ok(Self {
            inner: Arc::new(ProcessorInner {
                lifecycle: Mutex::new(Lifecycle {
                    state: ProcessorState::Stopped,
                    options,
                    provider: Box::new(provider),
                    resampler,
                    worker: None,
                    context: None,
                }),
                registry: Arc::new(EngineRegistry::new()),
                diagnostics: Arc::new(Mutex::new(PipelineDiagnostics::default())),
                dump_in_progress: AtomicBool::new(false),
            }),
        })
    }

    /// Add one or more engines, starting capture if it is not running.
    ///
    /// Engines already subscribed are ignored. If capture fails to start, the
    /// engines added by this call are removed again and the start error is
    /// returned.
    pub fn subscribe<E: IntoEngines>(&self, engines: E) -> Result<(), ProcessorError> {
        let engines = engines.into_engines()?;
        let mut lifecycle = self.inner.lifecycle.lock();

        let added = self.inner.registry.add(&engines);
        if self.inner.registry.is_empty() {
            return Ok(());
        }
        if let Err(e) = self.start_locked(&mut lifecycle) {
            self.inner.registry.remove(&added);
            return Err(e);
        }
        Ok(())
    }

    /// Remove one or more engines. Stops capture once no engine is left.
    pub fn unsubscribe<E: IntoEngines>(&self, engines: E) -> Result<(), ProcessorError> {
        let engines = engines.into_engines()?;
        let mut lifecycle = self.inner.lifecycle.lock();

        self.inner.registry.remove(&engines);
        if self.inner.registry.is_empty() {
            self.stop_locked(&mut lifecycle);
        }
        Ok(())
    }

    /// Remove every engine and stop capture.
    pub fn reset(&self) {
        let mut lifecycle = self.inner.lifecycle.lock();
        let removed = self.inner.registry.clear();
        if !removed.is_empty() {
            log::debug!("removed {} engine(s) on reset", removed.len());
        }
        self.stop_locked(&mut lifecycle);
    }

    /// Replace the options.
    ///
    /// Without `force_update` they apply from the next start. With it, a
    /// running session is stopped and started again right away.
    pub fn set_options(&self, options: ProcessorOptions, force_update: bool) -> Result<(), ProcessorError> {
        options.validate()?;
        let mut lifecycle = self.inner.lifecycle.lock();
        lifecycle.options = options;
        log::info!("voice processor options updated (force: {})", force_update);

        if force_update && lifecycle.state.is_started() {
            self.stop_locked(&mut lifecycle);
            self.start_locked(&mut lifecycle)?;
        }
        Ok(())
    }

    /// Clear the resampler's filter state and partial frame while capture runs.
    ///
    /// Returns once the worker has applied the reset.
    pub fn reset_resampler(&self) -> Result<(), ProcessorError> {
        let worker = self
            .inner
            .lifecycle
            .lock()
            .worker
            .clone()
            .ok_or(ProcessorError::NotInitialized)?;
        worker.reset()?.wait()
    }

    /// Record output frames for `duration`, then unsubscribe the recorder.
    ///
    /// Starts capture if no other engine is subscribed. Only one dump may run
    /// at a time. The result covers whole frames only, so its length is within
    /// one frame of `duration` at the output rate.
    pub fn audio_dump(&self, duration: Duration) -> Result<DumpHandle, ProcessorError> {
        if self.inner.dump_in_progress.swap(true, Ordering::AcqRel) {
            return Err(ProcessorError::DumpInProgress);
        }

        let (sample_rate, frame_length, expected) = {
            let lifecycle = self.inner.lifecycle.lock();
            let options = &lifecycle.options;
            (
                options.output_sample_rate,
                options.frame_length,
                options.samples_for_duration_ms(duration.as_millis() as u64),
            )
        };

        let recorder = Arc::new(AudioDumpEngine::with_capacity(expected + frame_length));
        let engine = Engine::handler(recorder.clone());
        if let Err(e) = self.subscribe(&engine) {
            self.inner.dump_in_progress.store(false, Ordering::Release);
            return Err(e);
        }

        let (tx, rx) = bounded(1);
        let processor = self.clone();
        let timer_engine = engine.clone();
        let spawned = thread::Builder::new()
            .name("audio-dump-timer".into())
            .spawn(move || {
                thread::sleep(duration);
                let result = processor
                    .unsubscribe(&timer_engine)
                    .map(|()| AudioDump::new(recorder.take_samples(), sample_rate, frame_length));
                processor.inner.dump_in_progress.store(false, Ordering::Release);
                if let Ok(dump) = &result {
                    log::info!("audio dump {} finished: {} samples", dump.id, dump.len());
                }
                let _ = tx.send(result);
            });

        if let Err(e) = spawned {
            let _ = self.unsubscribe(&engine);
            self.inner.dump_in_progress.store(false, Ordering::Release);
            return Err(ProcessorError::Worker(format!("failed to spawn audio dump timer: {}", e)));
        }
        Ok(DumpHandle::new(rx))
    }

    /// Whether frames are flowing: started, and the device is not suspended.
    pub fn is_recording(&self) -> bool {
        let lifecycle = self.inner.lifecycle.lock();
        lifecycle.state.is_started() && lifecycle.provider.is_capturing()
    }

    /// Whether the capture graph and resample worker are torn down.
    pub fn is_released(&self) -> bool {
        self.inner.lifecycle.lock().worker.is_none()
    }

    /// The device context opened by the most recent start, kept across stops.
    pub fn audio_context(&self) -> Option<CaptureContext> {
        self.inner.lifecycle.lock().context.clone()
    }

    pub fn state(&self) -> ProcessorState {
        self.inner.lifecycle.lock().state
    }

    pub fn options(&self) -> ProcessorOptions {
        self.inner.lifecycle.lock().options.clone()
    }

    pub fn engine_count(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn is_dumping(&self) -> bool {
        self.inner.dump_in_progress.load(Ordering::Acquire)
    }

    pub fn diagnostics(&self) -> PipelineDiagnostics {
        self.inner.diagnostics.lock().clone()
    }

    /// Start capture. Caller holds the lifecycle lock.
    fn start_locked(&self, lifecycle: &mut Lifecycle) -> Result<(), ProcessorError> {
        if lifecycle.state.is_started() {
            if lifecycle.provider.is_capturing() {
                return Ok(());
            }
            log::info!("capture suspended by the platform, restarting");
            self.stop_locked(lifecycle);
        }

        if !lifecycle.provider.is_available() {
            return Err(ProcessorError::DeviceDisabled);
        }

        let request = CaptureRequest {
            device_id: lifecycle.options.device_id.clone(),
            capture_module: lifecycle.options.custom_recorder_processor_url.clone(),
        };
        let context = lifecycle
            .provider
            .open(&request)
            .map_err(ProcessorError::from_start_failure)?;

        let options = &lifecycle.options;
        let config = WorkerConfig::new(
            context.sample_rate,
            options.output_sample_rate,
            options.filter_order,
            options.frame_length,
        );
        let worker = match ResampleWorker::create(config, Arc::clone(&lifecycle.resampler), self.frame_sink()) {
            Ok(worker) => worker,
            Err(e) => {
                let _ = lifecycle.provider.stop();
                return Err(e);
            }
        };

        if let Err(e) = lifecycle.provider.start(self.capture_sink(&worker)) {
            worker.terminate();
            let _ = lifecycle.provider.stop();
            return Err(ProcessorError::from_start_failure(e));
        }

        log::info!(
            "voice processor started: {} ({} Hz, {} ch) -> {} Hz, {} samples/frame",
            context.source.name,
            context.sample_rate,
            context.channels,
            options.output_sample_rate,
            options.frame_length
        );
        lifecycle.worker = Some(worker);
        lifecycle.context = Some(context);
        lifecycle.state = ProcessorState::Started;
        self.inner.diagnostics.lock().starts += 1;
        Ok(())
    }

    /// Stop capture. Caller holds the lifecycle lock.
    fn stop_locked(&self, lifecycle: &mut Lifecycle) {
        if lifecycle.state.is_stopped() {
            return;
        }
        if let Some(worker) = lifecycle.worker.take() {
            worker.shutdown(WORKER_STOP_GRACE);
        }
        if let Err(e) = lifecycle.provider.stop() {
            log::warn!("failed to stop capture cleanly: {}", e);
        }
        lifecycle.state = ProcessorState::Stopped;
        self.inner.diagnostics.lock().stops += 1;
        log::info!("voice processor stopped");
    }

    /// Per-frame callback for the resample worker: fan out to the registry.
    fn frame_sink(&self) -> FrameCallback {
        let registry = Arc::clone(&self.inner.registry);
        let diagnostics = Arc::clone(&self.inner.diagnostics);
        Arc::new(move |frame: Frame| {
            let report = registry.dispatch(&frame);
            let mut diagnostics = diagnostics.lock();
            diagnostics.frames_dispatched += 1;
            diagnostics.dispatch_failures += report.failed as u64;
        })
    }

    /// Capture callback: downmix and hand the block to the worker without waiting.
    fn capture_sink(&self, worker: &ResampleWorker) -> AudioBufferCallback {
        let worker = worker.clone();
        let diagnostics = Arc::clone(&self.inner.diagnostics);
        Arc::new(move |samples: &[f32], channels: u16| {
            let mono = downmix_to_mono(samples, usize::from(channels));
            let count = mono.len() as u64;
            let result = worker.process(InputFrame::Float(mono));

            let mut diagnostics = diagnostics.lock();
            diagnostics.capture_callbacks += 1;
            diagnostics.input_samples += count;
            if let Err(ProcessorError::WorkerBusy) = result {
                diagnostics.input_frames_dropped += 1;
                drop(diagnostics);
                log::warn!("resample worker is behind, dropped {} input samples", count);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    use crossbeam_channel::{unbounded, Receiver};

    use crate::engine::handle::EngineCapabilities;
    use crate::models::audio_models::{AudioSource, AudioTransportType};
    use crate::models::error::CaptureError;

    const WAIT: Duration = Duration::from_secs(5);

    #[derive(Default)]
    struct Script {
        unavailable: bool,
        open_error: Option<CaptureError>,
        sample_rate: u32,
        channels: u16,
        callback: Option<AudioBufferCallback>,
        capturing: bool,
        opens: usize,
        starts: usize,
        stops: usize,
        overlapping_starts: usize,
        last_request: Option<CaptureRequest>,
    }

    /// In-memory provider whose blocks are pushed by the test.
    #[derive(Clone, Default)]
    struct ScriptedProvider {
        script: Arc<Mutex<Script>>,
    }

    impl ScriptedProvider {
        fn at_rate(sample_rate: u32, channels: u16) -> Self {
            let provider = Self::default();
            {
                let mut script = provider.script.lock();
                script.sample_rate = sample_rate;
                script.channels = channels;
            }
            provider
        }

        fn feed(&self, samples: &[f32]) {
            let (callback, channels) = {
                let script = self.script.lock();
                (script.callback.clone(), script.channels)
            };
            if let Some(callback) = callback {
                callback(samples, channels);
            }
        }

        fn suspend(&self) {
            self.script.lock().capturing = false;
        }
    }

    impl CaptureProvider for ScriptedProvider {
        fn is_available(&self) -> bool {
            !self.script.lock().unavailable
        }

        fn open(&mut self, request: &CaptureRequest) -> Result<CaptureContext, CaptureError> {
            let mut script = self.script.lock();
            script.opens += 1;
            script.last_request = Some(request.clone());
            if let Some(error) = script.open_error.clone() {
                return Err(error);
            }
            Ok(CaptureContext {
                sample_rate: script.sample_rate,
                channels: script.channels,
                source: self.device_info(),
            })
        }

        fn start(&mut self, callback: AudioBufferCallback) -> Result<(), CaptureError> {
            let mut script = self.script.lock();
            if script.capturing {
                script.overlapping_starts += 1;
                return Err(CaptureError::AlreadyRunning);
            }
            script.callback = Some(callback);
            script.capturing = true;
            script.starts += 1;
            Ok(())
        }

        fn stop(&mut self) -> Result<(), CaptureError> {
            let mut script = self.script.lock();
            script.callback = None;
            script.capturing = false;
            script.stops += 1;
            Ok(())
        }

        fn is_capturing(&self) -> bool {
            self.script.lock().capturing
        }

        fn device_info(&self) -> AudioSource {
            AudioSource {
                id: "scripted".into(),
                name: "Scripted microphone".into(),
                is_default: true,
                transport_type: Some(AudioTransportType::Virtual),
            }
        }
    }

    fn channel_engine() -> (Engine, Receiver<Frame>) {
        let (tx, rx) = unbounded();
        let engine = Engine::direct(move |frame| {
            let _ = tx.send(frame);
        });
        (engine, rx)
    }

    fn processor(provider: &ScriptedProvider) -> VoiceProcessor {
        VoiceProcessor::new(provider.clone(), ProcessorOptions::default()).unwrap()
    }

    #[test]
    fn rejects_invalid_options() {
        let options = ProcessorOptions {
            frame_length: 0,
            ..Default::default()
        };
        let result = VoiceProcessor::new(ScriptedProvider::at_rate(16000, 1), options);
        assert!(matches!(result, Err(ProcessorError::InvalidOptions(_))));
    }

    #[test]
    fn first_subscribe_starts_and_last_unsubscribe_stops() {
        let provider = ScriptedProvider::at_rate(48000, 1);
        let processor = processor(&provider);
        assert_eq!(processor.state(), ProcessorState::Stopped);
        assert!(processor.is_released());
        assert!(processor.audio_context().is_none());

        let (first, _rx1) = channel_engine();
        let (second, _rx2) = channel_engine();
        processor.subscribe(&first).unwrap();
        assert_eq!(processor.state(), ProcessorState::Started);
        assert!(processor.is_recording());
        assert!(!processor.is_released());

        processor.subscribe(&second).unwrap();
        assert_eq!(provider.script.lock().opens, 1);

        processor.unsubscribe(&first).unwrap();
        assert_eq!(processor.state(), ProcessorState::Started);
        processor.unsubscribe(&second).unwrap();
        assert_eq!(processor.state(), ProcessorState::Stopped);
        assert!(!processor.is_recording());
        assert!(processor.is_released());

        let context = processor.audio_context().unwrap();
        assert_eq!(context.sample_rate, 48000);
        assert_eq!(provider.script.lock().stops, 1);
    }

    #[test]
    fn one_second_at_48k_yields_31_frames() {
        let provider = ScriptedProvider::at_rate(48000, 1);
        let processor = processor(&provider);
        let (engine, frames) = channel_engine();
        processor.subscribe(&engine).unwrap();

        for block in vec![0.25f32; 48000].chunks(4096) {
            provider.feed(block);
        }

        for _ in 0..31 {
            let frame = frames.recv_timeout(WAIT).unwrap();
            assert_eq!(frame.len(), 512);
        }
        assert!(frames.recv_timeout(Duration::from_millis(200)).is_err());
        assert_eq!(processor.diagnostics().input_samples, 48000);
    }

    #[test]
    fn stereo_input_is_downmixed() {
        let provider = ScriptedProvider::at_rate(16000, 2);
        let processor = processor(&provider);
        let (engine, frames) = channel_engine();
        processor.subscribe(&engine).unwrap();

        let stereo: Vec<f32> = (0..1024).map(|i| if i % 2 == 0 { 0.5 } else { 0.0 }).collect();
        provider.feed(&stereo);

        let frame = frames.recv_timeout(WAIT).unwrap();
        assert_eq!(frame.len(), 512);
        assert!(frame.iter().all(|&s| s == 8191)); // 0.25 * 32767, truncated
    }

    #[test]
    fn duplicate_subscribe_delivers_once() {
        let provider = ScriptedProvider::at_rate(16000, 1);
        let processor = processor(&provider);
        let (engine, frames) = channel_engine();

        processor.subscribe(&engine).unwrap();
        processor.subscribe(vec![engine.clone(), engine.clone()]).unwrap();
        assert_eq!(processor.engine_count(), 1);

        provider.feed(&[0.1; 512]);
        frames.recv_timeout(WAIT).unwrap();
        assert!(frames.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn same_capabilities_are_one_member() {
        let provider = ScriptedProvider::at_rate(16000, 1);
        let processor = processor(&provider);
        let (tx, messages) = unbounded();
        let caps = EngineCapabilities::new().with_worker(tx);

        processor.subscribe(caps.clone()).unwrap();
        processor.subscribe(&caps).unwrap();
        assert_eq!(processor.engine_count(), 1);

        provider.feed(&[0.1; 512]);
        messages.recv_timeout(WAIT).unwrap();
        assert!(messages.recv_timeout(Duration::from_millis(200)).is_err());

        processor.unsubscribe(caps).unwrap();
        assert_eq!(processor.engine_count(), 0);
        assert_eq!(processor.state(), ProcessorState::Stopped);
    }

    #[test]
    fn invalid_engine_is_rejected_without_side_effects() {
        let provider = ScriptedProvider::at_rate(16000, 1);
        let processor = processor(&provider);

        let result = processor.subscribe(EngineCapabilities::default());
        assert!(matches!(result, Err(ProcessorError::InvalidEngine(_))));
        assert_eq!(processor.engine_count(), 0);
        assert_eq!(processor.state(), ProcessorState::Stopped);
        assert_eq!(provider.script.lock().opens, 0);
    }

    #[test]
    fn unsubscribing_unknown_engine_is_noop() {
        let provider = ScriptedProvider::at_rate(16000, 1);
        let processor = processor(&provider);
        let (member, _rx) = channel_engine();
        let (stranger, _) = channel_engine();

        processor.subscribe(&member).unwrap();
        processor.unsubscribe(&stranger).unwrap();
        assert_eq!(processor.engine_count(), 1);
        assert!(processor.is_recording());
    }

    #[test]
    fn start_errors_are_mapped_and_rolled_back() {
        let cases = [
            (CaptureError::PermissionDenied, ProcessorError::Permission),
            (
                CaptureError::DeviceNotFound("usb".into()),
                ProcessorError::DeviceMissing("usb".into()),
            ),
            (
                CaptureError::DeviceUnreadable("busy".into()),
                ProcessorError::DeviceRead("busy".into()),
            ),
            (
                CaptureError::Backend("boom".into()),
                ProcessorError::Capture(CaptureError::Backend("boom".into())),
            ),
        ];

        for (raised, expected) in cases {
            let provider = ScriptedProvider::at_rate(16000, 1);
            provider.script.lock().open_error = Some(raised);
            let processor = processor(&provider);
            let (engine, _rx) = channel_engine();

            assert_eq!(processor.subscribe(&engine), Err(expected));
            assert_eq!(processor.engine_count(), 0);
            assert_eq!(processor.state(), ProcessorState::Stopped);
        }
    }

    #[test]
    fn unavailable_capture_is_device_disabled() {
        let provider = ScriptedProvider::at_rate(16000, 1);
        provider.script.lock().unavailable = true;
        let processor = processor(&provider);
        let (engine, _rx) = channel_engine();

        assert_eq!(processor.subscribe(&engine), Err(ProcessorError::DeviceDisabled));
        assert_eq!(provider.script.lock().opens, 0);
    }

    #[test]
    fn options_reach_the_provider() {
        let provider = ScriptedProvider::at_rate(16000, 1);
        let options = ProcessorOptions {
            device_id: Some("mic-7".into()),
            custom_recorder_processor_url: Some("file:///recorder".into()),
            ..Default::default()
        };
        let processor = VoiceProcessor::new(provider.clone(), options).unwrap();
        let (engine, _rx) = channel_engine();
        processor.subscribe(&engine).unwrap();

        let request = provider.script.lock().last_request.clone().unwrap();
        assert_eq!(request.device_id.as_deref(), Some("mic-7"));
        assert_eq!(request.capture_module.as_deref(), Some("file:///recorder"));
    }

    #[test]
    fn set_options_applies_on_restart_or_when_forced() {
        let provider = ScriptedProvider::at_rate(16000, 1);
        let processor = processor(&provider);
        let (engine, frames) = channel_engine();
        processor.subscribe(&engine).unwrap();

        let short_frames = ProcessorOptions {
            frame_length: 256,
            ..Default::default()
        };
        processor.set_options(short_frames.clone(), false).unwrap();
        assert_eq!(provider.script.lock().opens, 1);
        provider.feed(&[0.0; 512]);
        assert_eq!(frames.recv_timeout(WAIT).unwrap().len(), 512);

        processor.set_options(short_frames, true).unwrap();
        assert_eq!(provider.script.lock().opens, 2);
        assert_eq!(processor.state(), ProcessorState::Started);
        provider.feed(&[0.0; 256]);
        assert_eq!(frames.recv_timeout(WAIT).unwrap().len(), 256);
    }

    #[test]
    fn forced_restart_waits_for_the_old_worker() {
        let provider = ScriptedProvider::at_rate(16000, 1);
        let processor = processor(&provider);
        let (entered_tx, entered_rx) = bounded::<()>(1);
        let lengths = Arc::new(Mutex::new(Vec::new()));
        let active = Arc::new(Mutex::new(0usize));
        let overlapped = Arc::new(AtomicBool::new(false));

        let engine = {
            let lengths = Arc::clone(&lengths);
            let active = Arc::clone(&active);
            let overlapped = Arc::clone(&overlapped);
            Engine::direct(move |frame| {
                {
                    let mut active = active.lock();
                    *active += 1;
                    if *active > 1 {
                        overlapped.store(true, Ordering::SeqCst);
                    }
                }
                let _ = entered_tx.try_send(());
                thread::sleep(Duration::from_millis(100));
                lengths.lock().push(frame.len());
                *active.lock() -= 1;
            })
        };
        processor.subscribe(&engine).unwrap();

        provider.feed(&[0.0; 512]);
        entered_rx.recv_timeout(WAIT).unwrap();
        let short_frames = ProcessorOptions {
            frame_length: 256,
            ..Default::default()
        };
        processor.set_options(short_frames, true).unwrap();
        assert_eq!(*lengths.lock(), vec![512]);

        provider.feed(&[0.0; 256]);
        let deadline = Instant::now() + WAIT;
        while lengths.lock().len() < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(*lengths.lock(), vec![512, 256]);
        assert!(!overlapped.load(Ordering::SeqCst));
    }

    #[test]
    fn set_options_validates() {
        let provider = ScriptedProvider::at_rate(16000, 1);
        let processor = processor(&provider);
        let bad = ProcessorOptions {
            output_sample_rate: 0,
            ..Default::default()
        };
        assert!(processor.set_options(bad, true).is_err());
        assert_eq!(processor.options(), ProcessorOptions::default());
    }

    #[test]
    fn reset_removes_engines_and_stops() {
        let provider = ScriptedProvider::at_rate(16000, 1);
        let processor = processor(&provider);
        let (a, _rx_a) = channel_engine();
        let (b, _rx_b) = channel_engine();
        processor.subscribe([a, b]).unwrap();

        processor.reset();
        assert_eq!(processor.engine_count(), 0);
        assert_eq!(processor.state(), ProcessorState::Stopped);
        assert!(!provider.script.lock().capturing);
    }

    #[test]
    fn reset_resampler_drops_partial_frame() {
        let provider = ScriptedProvider::at_rate(16000, 1);
        let processor = processor(&provider);
        assert_eq!(processor.reset_resampler(), Err(ProcessorError::NotInitialized));

        let (engine, frames) = channel_engine();
        processor.subscribe(&engine).unwrap();
        provider.feed(&[0.5; 300]);
        processor.reset_resampler().unwrap();
        provider.feed(&[0.5; 300]);
        assert!(frames.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn suspended_capture_is_restarted_on_subscribe() {
        let provider = ScriptedProvider::at_rate(16000, 1);
        let processor = processor(&provider);
        let (first, _rx1) = channel_engine();
        processor.subscribe(&first).unwrap();

        provider.suspend();
        assert!(!processor.is_recording());

        let (second, _rx2) = channel_engine();
        processor.subscribe(&second).unwrap();
        assert!(processor.is_recording());
        assert_eq!(provider.script.lock().opens, 2);
    }

    #[test]
    fn panicking_engine_does_not_starve_others() {
        let provider = ScriptedProvider::at_rate(16000, 1);
        let processor = processor(&provider);
        let broken = Engine::direct(|_| panic!("engine failure"));
        let (healthy, frames) = channel_engine();
        processor.subscribe([broken, healthy]).unwrap();

        provider.feed(&[0.0; 512]);
        frames.recv_timeout(WAIT).unwrap();
        let diagnostics = processor.diagnostics();
        assert_eq!(diagnostics.frames_dispatched, 1);
        assert_eq!(diagnostics.dispatch_failures, 1);
    }

    #[test]
    fn concurrent_subscribe_and_unsubscribe_stay_consistent() {
        let provider = ScriptedProvider::at_rate(16000, 1);
        let processor = processor(&provider);

        let threads: Vec<_> = (0..8)
            .map(|i| {
                let processor = processor.clone();
                thread::spawn(move || {
                    let (engine, _rx) = channel_engine();
                    for round in 0..25 {
                        processor.subscribe(&engine).unwrap();
                        if (i + round) % 7 == 0 {
                            processor.reset();
                        }
                        processor.unsubscribe(&engine).unwrap();
                    }
                })
            })
            .collect();
        for handle in threads {
            handle.join().unwrap();
        }

        let script = provider.script.lock();
        assert_eq!(script.overlapping_starts, 0);
        assert_eq!(script.starts, script.stops);
        assert!(!script.capturing);
        drop(script);

        assert_eq!(processor.engine_count(), 0);
        assert_eq!(processor.state(), ProcessorState::Stopped);
        let diagnostics = processor.diagnostics();
        assert_eq!(diagnostics.starts, diagnostics.stops);
    }

    #[test]
    fn audio_dump_records_about_one_second_and_cleans_up() {
        let provider = ScriptedProvider::at_rate(48000, 1);
        let processor = processor(&provider);
        let (engine, _frames) = channel_engine();
        processor.subscribe(&engine).unwrap();

        // Feed 100 ms blocks in real time while the dump window is open.
        let feeder = {
            let provider = provider.clone();
            thread::spawn(move || {
                let start = Instant::now();
                let block = vec![0.1f32; 4800];
                for i in 0..16u32 {
                    let due = start + Duration::from_millis(100) * i;
                    if let Some(wait) = due.checked_duration_since(Instant::now()) {
                        thread::sleep(wait);
                    }
                    provider.feed(&block);
                }
            })
        };

        let dump = processor.audio_dump(Duration::from_millis(1000)).unwrap();
        assert_eq!(processor.engine_count(), 2);
        assert!(processor.is_dumping());

        let dump = dump.wait_timeout(WAIT).unwrap();
        feeder.join().unwrap();

        assert_eq!(dump.sample_rate, 16000);
        assert_eq!(dump.len() % 512, 0);
        let len = dump.len() as i64;
        assert!((len - 16000).abs() <= 2560, "dump held {} samples", len);
        assert_eq!(processor.engine_count(), 1);
        assert!(!processor.is_dumping());
        assert!(processor.is_recording());
    }

    #[test]
    fn second_dump_is_rejected_while_running() {
        let provider = ScriptedProvider::at_rate(16000, 1);
        let processor = processor(&provider);

        let first = processor.audio_dump(Duration::from_millis(100)).unwrap();
        assert_eq!(processor.state(), ProcessorState::Started);
        assert!(matches!(
            processor.audio_dump(Duration::from_millis(100)),
            Err(ProcessorError::DumpInProgress)
        ));

        provider.feed(&[0.0; 1024]);
        let dump = first.wait_timeout(WAIT).unwrap();
        assert_eq!(dump.len(), 1024);
        assert_eq!(processor.engine_count(), 0);
        assert_eq!(processor.state(), ProcessorState::Stopped);

        assert!(processor.audio_dump(Duration::from_millis(10)).is_ok());
    }
}
