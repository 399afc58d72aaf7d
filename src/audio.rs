use crate::error::Result;
use std::sync::Arc;

#[cfg(feature = "device")]
use crate::error::MorseError;
#[cfg(feature = "device")]
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
#[cfg(feature = "device")]
use log::{debug, error};
#[cfg(feature = "device")]
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(feature = "device")]
use std::sync::mpsc;
#[cfg(feature = "device")]
use std::thread::{self, JoinHandle};
#[cfg(feature = "device")]
use std::time::Duration;

/// Clock and output sink shared by every playback of one audio handle.
pub trait PlaybackContext: Send + Sync {
    /// Monotonic context time in seconds.
    fn current_time(&self) -> f64;

    /// Starts playing `buffer` from `offset` seconds.
    fn start(
        &self,
        buffer: Arc<[f32]>,
        sample_rate: u32,
        offset: f64,
    ) -> Result<Box<dyn PlaybackSource>>;

    fn close(&self) -> Result<()>;
}

/// A single started playback. Stopped at most once by its owner.
pub trait PlaybackSource: Send {
    fn stop(&mut self) -> Result<()>;
}

/// Context that keeps time but produces no sound.
///
/// Its clock is `tokio::time::Instant`, so paused-time tests can drive it.
#[derive(Debug, Clone)]
pub struct HeadlessContext {
    origin: tokio::time::Instant,
}

impl HeadlessContext {
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for HeadlessContext {
    fn default() -> Self {
        Self::new()
    }
}

struct HeadlessSource;

impl PlaybackSource for HeadlessSource {
    fn stop(&mut self) -> Result<()> {
        Ok(())
    }
}

impl PlaybackContext for HeadlessContext {
    fn current_time(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn start(
        &self,
        _buffer: Arc<[f32]>,
        _sample_rate: u32,
        _offset: f64,
    ) -> Result<Box<dyn PlaybackSource>> {
        Ok(Box::new(HeadlessSource))
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Context backed by the default cpal output device.
#[cfg(feature = "device")]
pub struct DeviceContext {
    device_name: String,
    origin: std::time::Instant,
}

#[cfg(feature = "device")]
impl DeviceContext {
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| MorseError::AudioDevice("No output device found".into()))?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".into());
        debug!("Using output device {}", device_name);

        Ok(Self {
            device_name,
            origin: std::time::Instant::now(),
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

#[cfg(feature = "device")]
impl PlaybackContext for DeviceContext {
    fn current_time(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn start(
        &self,
        buffer: Arc<[f32]>,
        sample_rate: u32,
        offset: f64,
    ) -> Result<Box<dyn PlaybackSource>> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let (ready_tx, ready_rx) = mpsc::channel();
        let start_at = ((offset.max(0.0) * sample_rate as f64) as usize).min(buffer.len());

        // cpal streams are not Send on every host, so one thread owns each stream.
        let handle = thread::spawn(move || {
            let stream = match open_stream(buffer, sample_rate, start_at) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(()));

            while !stop_flag.load(Ordering::Acquire) {
                thread::sleep(Duration::from_millis(10));
            }
            drop(stream);
        });

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Box::new(DeviceSource {
                stop,
                handle: Some(handle),
            })),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => Err(MorseError::AudioDevice(
                "Playback thread exited before starting".into(),
            )),
        }
    }

    fn close(&self) -> Result<()> {
        debug!("Closing output device {}", self.device_name);
        Ok(())
    }
}

#[cfg(feature = "device")]
fn open_stream(buffer: Arc<[f32]>, sample_rate: u32, start_at: usize) -> Result<cpal::Stream> {
    let device = cpal::default_host()
        .default_output_device()
        .ok_or_else(|| MorseError::AudioDevice("No output device found".into()))?;

    let config = cpal::StreamConfig {
        channels: crate::CHANNELS,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let mut position = start_at;
    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                for sample in data.iter_mut() {
                    *sample = buffer.get(position).copied().unwrap_or(0.0);
                    position = position.saturating_add(1);
                }
            },
            |err| error!("Audio output error: {}", err),
            None,
        )
        .map_err(|e| MorseError::AudioDevice(e.to_string()))?;

    stream
        .play()
        .map_err(|e| MorseError::AudioDevice(e.to_string()))?;

    Ok(stream)
}

#[cfg(feature = "device")]
struct DeviceSource {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

#[cfg(feature = "device")]
impl PlaybackSource for DeviceSource {
    fn stop(&mut self) -> Result<()> {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| MorseError::AudioDevice("Playback thread panicked".into()))?;
        }
        Ok(())
    }
}

#[cfg(feature = "device")]
impl Drop for DeviceSource {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}

/// Context used by [`crate::audio()`]. Requires the `device` feature.
pub fn default_context() -> Result<Arc<dyn PlaybackContext>> {
    #[cfg(feature = "device")]
    {
        Ok(Arc::new(DeviceContext::new()?))
    }
    #[cfg(not(feature = "device"))]
    {
        Err(crate::error::MorseError::AudioDevice(
            "built without the `device` feature, no audio output available".into(),
        ))
    }
}

#[cfg(feature = "device")]
pub fn list_audio_devices() -> Vec<String> {
    let host = cpal::default_host();
    let mut devices = Vec::new();

    if let Ok(output_devices) = host.output_devices() {
        for device in output_devices {
            if let Ok(name) = device.name() {
                devices.push(name);
            }
        }
    }

    devices
}
