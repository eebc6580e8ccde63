//! Streams and device discovery through CPAL.
//!
//! `cpal::Stream` is not `Send` on every platform, so each open stream lives
//! on a dedicated thread that builds it, starts it, and then sleeps until the
//! device closes. Closing wakes the thread, which drops the stream (and with
//! it the render callback) and exits; the closing thread joins it.
//!
//! # Example: List Devices
//!
//! ```no_run
//! use tonband::CpalBackend;
//!
//! for (host, name) in CpalBackend::hosts().iter().enumerate() {
//!     println!("host [{host}] {name}");
//!     for device in CpalBackend::output_devices(Some(host)) {
//!         println!("  [{}] {} ({} Hz, {} ch)",
//!             device.index, device.name, device.sample_rate, device.channels);
//!     }
//! }
//! ```

use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample, StreamConfig, SupportedStreamConfig};
use tracing::{debug, error, info, warn};

use crate::config::{EngineConfig, Endpoints};
use crate::device::{AudioBackend, RenderFn, StreamFormat};
use crate::error::{DeviceError, DeviceResult, EndpointKind};
use crate::output::{Interleaved, OutputBuffer};

/// A device found on a host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Position in the host's input or output device list
    pub index: usize,
    pub name: String,
    pub sample_rate: u32,
    pub channels: u16,
}

/// The system audio backend.
#[derive(Clone, Copy, Debug, Default)]
pub struct CpalBackend;

impl CpalBackend {
    /// Names of the host APIs available on this system, in index order.
    pub fn hosts() -> Vec<String> {
        cpal::available_hosts()
            .into_iter()
            .map(|id| id.name().to_string())
            .collect()
    }

    /// Output devices of a host (`None` for the default host).
    ///
    /// Returns an empty list if the host is unavailable or enumeration fails.
    pub fn output_devices(host: Option<usize>) -> Vec<DeviceInfo> {
        let Ok(host) = resolve_host(host) else {
            return Vec::new();
        };
        host.output_devices()
            .map(|devices| {
                devices
                    .enumerate()
                    .filter_map(|(index, device)| {
                        let config = device.default_output_config().ok()?;
                        Some(describe(index, &device, &config))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Input devices of a host (`None` for the default host).
    pub fn input_devices(host: Option<usize>) -> Vec<DeviceInfo> {
        let Ok(host) = resolve_host(host) else {
            return Vec::new();
        };
        host.input_devices()
            .map(|devices| {
                devices
                    .enumerate()
                    .filter_map(|(index, device)| {
                        let config = device.default_input_config().ok()?;
                        Some(describe(index, &device, &config))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Keeps a CPAL stream alive on its own thread. Drop to stop it.
pub struct CpalStream {
    shutdown: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CpalStream {
    /// Stop the stream and wait for its thread to exit.
    fn stop(&mut self) -> DeviceResult<()> {
        // Hanging up wakes the stream thread
        drop(self.shutdown.take());
        match self.thread.take().map(JoinHandle::join) {
            Some(Err(_)) => Err(DeviceError::StreamThread("audio stream thread panicked".into())),
            _ => Ok(()),
        }
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            error!(%err, "failed to stop audio stream");
        }
    }
}

impl AudioBackend for CpalBackend {
    type Stream = CpalStream;

    fn open_stream(
        &self,
        host: Option<usize>,
        endpoints: Endpoints,
        config: &EngineConfig,
        render: RenderFn,
    ) -> DeviceResult<(CpalStream, StreamFormat)> {
        let config = config.clone();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<DeviceResult<StreamFormat>>(1);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let thread = thread::Builder::new()
            .name("tonband-stream".into())
            .spawn(move || {
                let stream = match start_stream(host, endpoints, &config, render) {
                    Ok((stream, format)) => {
                        let _ = ready_tx.send(Ok(format));
                        stream
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };

                // Nothing is ever sent; this returns when the handle hangs up
                let _ = shutdown_rx.recv();
                drop(stream);
                debug!("audio stream released");
            })
            .map_err(|e| DeviceError::StreamThread(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(format)) => Ok((
                CpalStream {
                    shutdown: Some(shutdown_tx),
                    thread: Some(thread),
                },
                format,
            )),
            Ok(Err(err)) => {
                let _ = thread.join();
                Err(err)
            }
            Err(_) => {
                let _ = thread.join();
                Err(DeviceError::StreamThread("stream thread exited during setup".into()))
            }
        }
    }

    fn close_stream(&self, mut stream: CpalStream) -> DeviceResult<()> {
        stream.stop()
    }
}

fn describe(index: usize, device: &cpal::Device, config: &SupportedStreamConfig) -> DeviceInfo {
    DeviceInfo {
        index,
        name: device.name().unwrap_or_else(|_| "Unknown".into()),
        sample_rate: config.sample_rate().0,
        channels: config.channels(),
    }
}

fn resolve_host(host: Option<usize>) -> DeviceResult<cpal::Host> {
    let Some(index) = host else {
        return Ok(cpal::default_host());
    };
    let id = cpal::available_hosts()
        .get(index)
        .copied()
        .ok_or_else(|| DeviceError::HostUnavailable(format!("no host at index {index}")))?;
    cpal::host_from_id(id).map_err(|e| DeviceError::HostUnavailable(e.to_string()))
}

fn start_stream(
    host: Option<usize>,
    endpoints: Endpoints,
    config: &EngineConfig,
    render: RenderFn,
) -> DeviceResult<(cpal::Stream, StreamFormat)> {
    let host = resolve_host(host)?;

    // Capture is not streamed; the input endpoint only has to exist
    if let Some(index) = endpoints.input {
        host.input_devices()
            .map_err(|e| DeviceError::ConfigError(e.to_string()))?
            .nth(index)
            .ok_or(DeviceError::DeviceNotFound {
                kind: EndpointKind::Input,
                index,
            })?;
    }

    let device = match endpoints.output {
        Some(index) => host
            .output_devices()
            .map_err(|e| DeviceError::ConfigError(e.to_string()))?
            .nth(index)
            .ok_or(DeviceError::DeviceNotFound {
                kind: EndpointKind::Output,
                index,
            })?,
        None => host.default_output_device().ok_or(DeviceError::NoDefaultDevice)?,
    };

    let name = device.name().unwrap_or_else(|_| "Unknown".into());
    let supported = output_config(&device, config)?;
    let sample_format = supported.sample_format();

    let mut stream_config: StreamConfig = supported.config();
    let buffer_frames = config.fixed_buffer_frames();
    if let Some(frames) = buffer_frames {
        stream_config.buffer_size = cpal::BufferSize::Fixed(frames);
    }

    let format = StreamFormat {
        sample_rate: stream_config.sample_rate.0,
        channels: stream_config.channels,
        buffer_frames,
    };
    info!(device = %name, ?format, ?sample_format, "starting output stream");

    let stream = build_stream(&device, sample_format, &stream_config, render)?;
    stream
        .play()
        .map_err(|e| DeviceError::StreamPlayError(e.to_string()))?;

    Ok((stream, format))
}

/// The device default, moved to the preferred sample rate when the device supports it.
fn output_config(device: &cpal::Device, config: &EngineConfig) -> DeviceResult<SupportedStreamConfig> {
    let default = device
        .default_output_config()
        .map_err(|e| DeviceError::ConfigError(e.to_string()))?;

    let Some(rate) = config.sample_rate else {
        return Ok(default);
    };
    if rate == default.sample_rate().0 {
        return Ok(default);
    }

    let matching = device
        .supported_output_configs()
        .map_err(|e| DeviceError::ConfigError(e.to_string()))?
        .filter(|c| c.channels() == default.channels() && c.sample_format() == default.sample_format())
        .find(|c| rate >= c.min_sample_rate().0 && rate <= c.max_sample_rate().0);

    match matching {
        Some(range) => Ok(range.with_sample_rate(cpal::SampleRate(rate))),
        None => {
            warn!(rate, fallback = default.sample_rate().0, "device does not support preferred sample rate");
            Ok(default)
        }
    }
}

fn build_stream(
    device: &cpal::Device,
    sample_format: SampleFormat,
    stream_config: &StreamConfig,
    render: RenderFn,
) -> DeviceResult<cpal::Stream> {
    let stream = match sample_format {
        SampleFormat::F32 => build::<f32>(device, stream_config, render),
        SampleFormat::I16 => build::<i16>(device, stream_config, render),
        SampleFormat::U16 => build::<u16>(device, stream_config, render),
        other => return Err(DeviceError::UnsupportedFormat(format!("{other:?}"))),
    };

    stream.map_err(|e| DeviceError::StreamBuildError(e.to_string()))
}

/// A stream whose callbacks each run one render pass, converting to `T` as
/// the engine writes.
fn build<T>(
    device: &cpal::Device,
    stream_config: &StreamConfig,
    mut render: RenderFn,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = stream_config.channels as usize;

    device.build_output_stream(
        stream_config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let mut output = Interleaved::new(data, channels);
            render(&mut output as &mut dyn OutputBuffer);
        },
        |err: cpal::StreamError| error!(%err, "audio stream error"),
        None,
    )
}
