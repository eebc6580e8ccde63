//! A backend with no hardware behind it.
//!
//! The caller plays the part of the audio driver: every call to
//! [`OfflineBackend::render`] runs one callback of the open stream. Useful for
//! headless rendering and for exercising devices in tests.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dasp_sample::{FromSample, Sample};

use crate::config::{EngineConfig, Endpoints};
use crate::device::{AudioBackend, RenderFn, StreamFormat};
use crate::error::{DeviceError, DeviceResult, EndpointKind};
use crate::output::{Interleaved, OutputBuffer};

struct Inner {
    format: StreamFormat,
    output_devices: usize,
    input_devices: usize,
    /// Render callback of the open stream, tagged with its stream id
    render: Mutex<Option<(u64, RenderFn)>>,
    next_stream: AtomicU64,
    opens: AtomicUsize,
    closes: AtomicUsize,
    fail_next_open: AtomicBool,
    fail_next_close: AtomicBool,
    last_endpoints: Mutex<Option<Endpoints>>,
}

/// Hand-driven [`AudioBackend`]. Clones share the same virtual driver.
#[derive(Clone)]
pub struct OfflineBackend {
    inner: Arc<Inner>,
}

impl OfflineBackend {
    /// A single host with one output and one input device.
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self::with_devices(sample_rate, channels, 1, 1)
    }

    pub fn with_devices(sample_rate: u32, channels: u16, output_devices: usize, input_devices: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                format: StreamFormat {
                    sample_rate,
                    channels: channels.max(1),
                    buffer_frames: None,
                },
                output_devices,
                input_devices,
                render: Mutex::new(None),
                next_stream: AtomicU64::new(0),
                opens: AtomicUsize::new(0),
                closes: AtomicUsize::new(0),
                fail_next_open: AtomicBool::new(false),
                fail_next_close: AtomicBool::new(false),
                last_endpoints: Mutex::new(None),
            }),
        }
    }

    /// Run one callback of `frames` frames and return the interleaved output,
    /// or `None` if no stream is open.
    pub fn render(&self, frames: usize) -> Option<Vec<f32>> {
        self.render_as(frames)
    }

    /// Like [`render`](Self::render), for a device that wants samples of type `T`.
    pub fn render_as<T>(&self, frames: usize) -> Option<Vec<T>>
    where
        T: Sample + FromSample<f32>,
    {
        let mut output = vec![T::EQUILIBRIUM; frames * self.inner.format.channels as usize];
        self.render_into(&mut output).then_some(output)
    }

    /// Run one callback into `output`. Returns `false` if no stream is open.
    pub fn render_into<T>(&self, output: &mut [T]) -> bool
    where
        T: Sample + FromSample<f32>,
    {
        let channels = self.inner.format.channels as usize;
        match lock(&self.inner.render).as_mut() {
            Some((_, render)) => {
                let mut buffer = Interleaved::new(output, channels);
                render(&mut buffer as &mut dyn OutputBuffer);
                true
            }
            None => false,
        }
    }

    pub fn is_streaming(&self) -> bool {
        lock(&self.inner.render).is_some()
    }

    pub fn format(&self) -> StreamFormat {
        self.inner.format
    }

    /// Streams opened so far
    pub fn opens(&self) -> usize {
        self.inner.opens.load(Ordering::SeqCst)
    }

    /// Streams closed so far
    pub fn closes(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }

    /// Endpoints of the most recent successful open
    pub fn last_endpoints(&self) -> Option<Endpoints> {
        *lock(&self.inner.last_endpoints)
    }

    /// Make the next `open_stream` fail as if the driver refused to start.
    pub fn fail_next_open(&self) {
        self.inner.fail_next_open.store(true, Ordering::SeqCst);
    }

    /// Make the next `close_stream` report that the driver did not stop cleanly.
    pub fn fail_next_close(&self) {
        self.inner.fail_next_close.store(true, Ordering::SeqCst);
    }
}

impl AudioBackend for OfflineBackend {
    type Stream = OfflineStream;

    fn open_stream(
        &self,
        host: Option<usize>,
        endpoints: Endpoints,
        config: &EngineConfig,
        render: RenderFn,
    ) -> DeviceResult<(OfflineStream, StreamFormat)> {
        if let Some(host) = host.filter(|&h| h != 0) {
            return Err(DeviceError::HostUnavailable(format!("no host at index {host}")));
        }
        if let Some(index) = endpoints.output.filter(|&i| i >= self.inner.output_devices) {
            return Err(DeviceError::DeviceNotFound {
                kind: EndpointKind::Output,
                index,
            });
        }
        if endpoints.output.is_none() && self.inner.output_devices == 0 {
            return Err(DeviceError::NoDefaultDevice);
        }
        if let Some(index) = endpoints.input.filter(|&i| i >= self.inner.input_devices) {
            return Err(DeviceError::DeviceNotFound {
                kind: EndpointKind::Input,
                index,
            });
        }
        if self.inner.fail_next_open.swap(false, Ordering::SeqCst) {
            return Err(DeviceError::StreamPlayError("driver refused to start".into()));
        }

        let id = self.inner.next_stream.fetch_add(1, Ordering::SeqCst);
        *lock(&self.inner.render) = Some((id, render));
        *lock(&self.inner.last_endpoints) = Some(endpoints);
        self.inner.opens.fetch_add(1, Ordering::SeqCst);

        let format = StreamFormat {
            buffer_frames: config.fixed_buffer_frames(),
            ..self.inner.format
        };
        let stream = OfflineStream {
            id,
            inner: Arc::clone(&self.inner),
        };
        Ok((stream, format))
    }

    fn close_stream(&self, stream: OfflineStream) -> DeviceResult<()> {
        drop(stream);
        if self.inner.fail_next_close.swap(false, Ordering::SeqCst) {
            return Err(DeviceError::StreamThread("driver did not stop cleanly".into()));
        }
        Ok(())
    }
}

/// Stream handle of an [`OfflineBackend`]. Dropping it detaches the render callback.
pub struct OfflineStream {
    id: u64,
    inner: Arc<Inner>,
}

impl Drop for OfflineStream {
    fn drop(&mut self) {
        // Waits for a render in progress
        let detached = {
            let mut render = lock(&self.inner.render);
            match render.as_ref() {
                Some((id, _)) if *id == self.id => render.take(),
                _ => None,
            }
        };
        drop(detached);
        self.inner.closes.fetch_add(1, Ordering::SeqCst);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
