//! cpal microphone capture provider.
//!
//! Opens an input device through the default cpal host and delivers f32
//! blocks of a fixed size via the `AudioBufferCallback`. The cpal stream is
//! created, played and dropped on a dedicated capture thread, so the provider
//! itself holds no platform stream handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BackendSpecificError, BuildStreamError, DefaultStreamConfigError, DevicesError, PlayStreamError,
    SampleFormat, SizedSample, StreamConfig,
};
use crossbeam_channel::{bounded, Sender};
use parking_lot::Mutex;

use voice_processor_core::models::audio_models::{AudioSource, CaptureContext, CaptureRequest};
use voice_processor_core::models::error::CaptureError;
use voice_processor_core::traits::capture_provider::{AudioBufferCallback, CaptureProvider};

use crate::block_framer::{i16_to_f32, u16_to_f32, BlockFramer, DEFAULT_BLOCK_FRAMES};

/// Device resolved by `open`, reused by `start`.
#[derive(Debug, Clone)]
struct OpenedDevice {
    name: String,
    is_default: bool,
    sample_rate: u32,
    channels: u16,
}

/// Microphone capture through cpal.
pub struct CpalMicCapture {
    preferred_device: Option<String>,
    block_frames: usize,
    opened: Option<OpenedDevice>,
    running: Arc<AtomicBool>,
    stop_tx: Option<Sender<()>>,
    capture_handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl CpalMicCapture {
    /// Capture from the system default input device.
    pub fn default_device() -> Self {
        Self::with_device(None)
    }

    /// Capture from the input device called `name`, or the default when `None`.
    ///
    /// A `device_id` in the `CaptureRequest` passed to `open` takes precedence.
    pub fn with_device(name: Option<String>) -> Self {
        Self {
            preferred_device: name,
            block_frames: DEFAULT_BLOCK_FRAMES,
            opened: None,
            running: Arc::new(AtomicBool::new(false)),
            stop_tx: None,
            capture_handle: Mutex::new(None),
        }
    }

    /// Frames per delivered block (default 4096).
    pub fn block_frames(mut self, frames: usize) -> Self {
        self.block_frames = frames.max(1);
        self
    }

    /// Names of the available input devices.
    pub fn list_devices() -> Result<Vec<AudioSource>, CaptureError> {
        let host = cpal::default_host();
        let default_name = host.default_input_device().and_then(|d| d.name().ok());
        let devices = host
            .input_devices()
            .map_err(map_devices_error)?;

        Ok(devices
            .filter_map(|device| device.name().ok())
            .map(|name| AudioSource {
                id: name.clone(),
                is_default: default_name.as_deref() == Some(name.as_str()),
                name,
                transport_type: None,
            })
            .collect())
    }
}

impl CaptureProvider for CpalMicCapture {
    /// The host can enumerate input devices. A host with no microphone is
    /// still available; `open` reports the missing device.
    fn is_available(&self) -> bool {
        host_is_available(cpal::default_host().input_devices())
    }

    fn open(&mut self, request: &CaptureRequest) -> Result<CaptureContext, CaptureError> {
        if let Some(module) = &request.capture_module {
            log::debug!("ignoring custom capture module {} (not supported by cpal)", module);
        }
        let wanted = request.device_id.clone().or_else(|| self.preferred_device.clone());
        let (device, is_default) = resolve_device(wanted.as_deref())?;
        let name = device
            .name()
            .map_err(|e| CaptureError::DeviceUnreadable(e.to_string()))?;
        let config = device.default_input_config().map_err(map_config_error)?;

        let opened = OpenedDevice {
            name,
            is_default,
            sample_rate: config.sample_rate().0,
            channels: config.channels(),
        };
        log::info!(
            "opened input device '{}' ({} Hz, {} ch, {:?})",
            opened.name,
            opened.sample_rate,
            opened.channels,
            config.sample_format()
        );

        let context = CaptureContext {
            sample_rate: opened.sample_rate,
            channels: opened.channels,
            source: source_for(&opened),
        };
        self.opened = Some(opened);
        Ok(context)
    }

    fn start(&mut self, callback: AudioBufferCallback) -> Result<(), CaptureError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(CaptureError::AlreadyRunning);
        }
        let opened = self
            .opened
            .clone()
            .ok_or_else(|| CaptureError::Backend("start called before open".into()))?;

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (ready_tx, ready_rx) = bounded::<Result<(), CaptureError>>(1);
        let running = Arc::clone(&self.running);
        let block_frames = self.block_frames;

        let handle = thread::Builder::new()
            .name("cpal-mic-capture".into())
            .spawn(move || {
                let stream = match open_stream(&opened, block_frames, callback, Arc::clone(&running)) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                running.store(true, Ordering::SeqCst);
                let _ = ready_tx.send(Ok(()));

                // Parked until stop() sends or drops the sender.
                let _ = stop_rx.recv();
                if let Err(e) = stream.pause() {
                    log::warn!("failed to pause input stream: {}", e);
                }
                drop(stream);
                running.store(false, Ordering::SeqCst);
            })
            .map_err(|e| CaptureError::Backend(format!("failed to spawn capture thread: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.stop_tx = Some(stop_tx);
                *self.capture_handle.lock() = Some(handle);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(CaptureError::Backend("capture thread exited during start".into()))
            }
        }
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(handle) = self.capture_handle.lock().take() {
            handle
                .join()
                .map_err(|_| CaptureError::Backend("capture thread panicked".into()))?;
        }
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn device_info(&self) -> AudioSource {
        match &self.opened {
            Some(opened) => source_for(opened),
            None => AudioSource {
                id: self.preferred_device.clone().unwrap_or_else(|| "default-mic".into()),
                name: self
                    .preferred_device
                    .clone()
                    .unwrap_or_else(|| "Default Microphone".into()),
                is_default: self.preferred_device.is_none(),
                transport_type: None,
            },
        }
    }
}

impl Drop for CpalMicCapture {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn source_for(opened: &OpenedDevice) -> AudioSource {
    AudioSource {
        id: opened.name.clone(),
        name: opened.name.clone(),
        is_default: opened.is_default,
        transport_type: None,
    }
}

fn resolve_device(name: Option<&str>) -> Result<(cpal::Device, bool), CaptureError> {
    let host = cpal::default_host();
    match name {
        Some(name) => {
            let mut devices = host.input_devices().map_err(map_devices_error)?;
            let device = devices
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| CaptureError::DeviceNotFound(format!("input device '{}' not found", name)))?;
            let is_default = host
                .default_input_device()
                .and_then(|d| d.name().ok())
                .is_some_and(|n| n == name);
            Ok((device, is_default))
        }
        None => host
            .default_input_device()
            .map(|device| (device, true))
            .ok_or_else(|| CaptureError::DeviceNotFound("no default input device available".into())),
    }
}

/// Build and start the input stream. Runs on the capture thread.
fn open_stream(
    opened: &OpenedDevice,
    block_frames: usize,
    callback: AudioBufferCallback,
    running: Arc<AtomicBool>,
) -> Result<cpal::Stream, CaptureError> {
    let (device, _) = resolve_device(Some(&opened.name))?;
    let supported = device.default_input_config().map_err(map_config_error)?;
    let format = supported.sample_format();
    let config: StreamConfig = supported.into();

    if config.sample_rate.0 != opened.sample_rate || config.channels != opened.channels {
        return Err(CaptureError::DeviceUnreadable(format!(
            "device format changed since open ({} Hz, {} ch)",
            config.sample_rate.0, config.channels
        )));
    }

    let framer = BlockFramer::new(block_frames, config.channels, callback);
    let stream = match format {
        SampleFormat::F32 => build_stream::<f32, _>(&device, &config, framer, |s| s, running)?,
        SampleFormat::I16 => build_stream::<i16, _>(&device, &config, framer, i16_to_f32, running)?,
        SampleFormat::U16 => build_stream::<u16, _>(&device, &config, framer, u16_to_f32, running)?,
        other => {
            return Err(CaptureError::DeviceUnreadable(format!(
                "unsupported sample format: {:?}",
                other
            )))
        }
    };
    stream.play().map_err(map_play_error)?;
    Ok(stream)
}

fn build_stream<T, F>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut framer: BlockFramer,
    convert: F,
    running: Arc<AtomicBool>,
) -> Result<cpal::Stream, CaptureError>
where
    T: SizedSample,
    F: Fn(T) -> f32 + Send + 'static,
{
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                framer.push(data, &convert);
            },
            move |err| {
                log::error!("input stream error: {}", err);
                running.store(false, Ordering::SeqCst);
            },
            None,
        )
        .map_err(map_build_error)
}

fn host_is_available<I>(devices: Result<I, DevicesError>) -> bool {
    match devices {
        Ok(_) => true,
        Err(e) => {
            log::warn!("audio host cannot enumerate input devices: {}", e);
            false
        }
    }
}

fn map_devices_error(error: DevicesError) -> CaptureError {
    match error {
        DevicesError::BackendSpecific { err } => map_backend_specific(err),
    }
}

fn map_config_error(error: DefaultStreamConfigError) -> CaptureError {
    match error {
        DefaultStreamConfigError::DeviceNotAvailable => {
            CaptureError::DeviceUnreadable("input device is no longer available".into())
        }
        DefaultStreamConfigError::StreamTypeNotSupported => {
            CaptureError::DeviceUnreadable("device does not support input streams".into())
        }
        DefaultStreamConfigError::BackendSpecific { err } => map_backend_specific(err),
    }
}

fn map_build_error(error: BuildStreamError) -> CaptureError {
    match error {
        BuildStreamError::DeviceNotAvailable => {
            CaptureError::DeviceUnreadable("input device is no longer available".into())
        }
        BuildStreamError::StreamConfigNotSupported => {
            CaptureError::DeviceUnreadable("device rejected the input stream configuration".into())
        }
        BuildStreamError::BackendSpecific { err } => map_backend_specific(err),
        other => CaptureError::Backend(other.to_string()),
    }
}

fn map_play_error(error: PlayStreamError) -> CaptureError {
    match error {
        PlayStreamError::DeviceNotAvailable => {
            CaptureError::DeviceUnreadable("input device is no longer available".into())
        }
        PlayStreamError::BackendSpecific { err } => map_backend_specific(err),
    }
}

/// Backends only describe OS refusals in text; permission is the one case
/// that has its own error.
fn map_backend_specific(err: BackendSpecificError) -> CaptureError {
    let lower = err.description.to_lowercase();
    if lower.contains("permission") || lower.contains("access denied") || lower.contains("not authorized") {
        CaptureError::PermissionDenied
    } else {
        CaptureError::Backend(err.description)
    }
}
