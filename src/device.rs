//! An audio device: one output stream bound to a transport exchange.
//!
//! [`AudioDevice`] opens a stream through an [`AudioBackend`], moves the
//! real-time half of its exchange plus a [`TransportEngine`] into the stream's
//! render callback, and exposes the transport to every other thread.
//!
//! # Example
//!
//! ```no_run
//! # use std::sync::Arc;
//! use tonband::{AudioDevice, CpalBackend, EngineConfig, PcmDocument, PlayRequest};
//!
//! let device = AudioDevice::new(CpalBackend, None, EngineConfig::default());
//! device.open_device(None, None).expect("no audio device");
//!
//! let document = Arc::new(PcmDocument::from_channels(vec![vec![0.0; 48000]], 48000));
//! device.play(PlayRequest::new(document, 0, 24000)).ok();
//!
//! while device.is_playing() {
//!     println!("at frame {}", device.playback_position());
//!     std::thread::sleep(std::time::Duration::from_millis(50));
//! }
//! ```

use core::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rtrb::{Consumer, RingBuffer};
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, Endpoints};
use crate::engine::TransportEngine;
use crate::error::{DeviceResult, PostError};
use crate::exchange::{FaultSet, StateExchange};
use crate::output::OutputBuffer;
use crate::transport::{Command, PlayRequest, TransportState, TransportView};

/// The render callback handed to a backend.
///
/// Called on the audio thread once per device callback. It fills the whole
/// buffer and publishes the transport state once.
pub type RenderFn = Box<dyn FnMut(&mut dyn OutputBuffer) + Send + 'static>;

/// The transport flavour of [`StateExchange`].
pub type TransportExchange = StateExchange<TransportState, TransportView, Command>;

/// Format the backend negotiated for an open stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
    /// Fixed callback size, if one was requested and granted
    pub buffer_frames: Option<u32>,
}

/// Something that can open output streams.
///
/// Dropping the returned stream must stop the callbacks and must not return
/// before the render callback has been dropped.
pub trait AudioBackend: Send + Sync + 'static {
    type Stream: Send + 'static;

    fn open_stream(
        &self,
        host: Option<usize>,
        endpoints: Endpoints,
        config: &EngineConfig,
        render: RenderFn,
    ) -> DeviceResult<(Self::Stream, StreamFormat)>;

    /// Stop a stream and report whether it shut down cleanly. The stream is
    /// gone either way.
    fn close_stream(&self, stream: Self::Stream) -> DeviceResult<()> {
        drop(stream);
        Ok(())
    }
}

struct OpenStream<S> {
    endpoints: Endpoints,
    format: StreamFormat,
    retired: Consumer<PlayRequest>,
    stream: S,
}

/// One output stream and the transport running on it.
///
/// Opening and closing are serialized by an internal mutex that the audio
/// thread never touches. Commands and views go through the exchange and never
/// wait for the audio thread.
pub struct AudioDevice<B: AudioBackend> {
    backend: B,
    host: Option<usize>,
    config: EngineConfig,
    exchange: TransportExchange,
    stream: Mutex<Option<OpenStream<B::Stream>>>,
}

impl<B: AudioBackend> AudioDevice<B> {
    /// Create a closed device on the given host API (`None` for the default host).
    pub fn new(backend: B, host: Option<usize>, config: EngineConfig) -> Self {
        let (exchange, _detached) = StateExchange::new(TransportState::default(), config.command_capacity);
        Self {
            backend,
            host,
            config,
            exchange,
            stream: Mutex::new(None),
        }
    }

    /// Open a stream on the given devices (`None` for the host default output
    /// and for no input).
    ///
    /// Does nothing if this exact pair is already open. Otherwise any open
    /// stream is closed first. On failure the device is left closed with its
    /// transport at defaults.
    pub fn open_device(&self, input: Option<usize>, output: Option<usize>) -> DeviceResult<()> {
        let endpoints = Endpoints { input, output };
        let mut slot = self.lock_stream();

        if let Some(open) = slot.as_ref() {
            if open.endpoints == endpoints {
                debug!(?endpoints, "device already open");
                return Ok(());
            }
        }

        if let Some(open) = slot.take() {
            if let Err(err) = self.shut_down(open) {
                warn!(%err, "previous stream did not close cleanly");
            }
        }

        let mut realtime = self.exchange.reattach(TransportState::default());
        let (retire_tx, retire_rx) = RingBuffer::new(self.config.retire_capacity.max(1));
        let mut engine = TransportEngine::new(&self.config, realtime.faults().clone(), retire_tx);

        let render: RenderFn = Box::new(move |output: &mut dyn OutputBuffer| {
            realtime.run_cycle(&mut engine, |engine, state| engine.render(state, output));
        });

        match self.backend.open_stream(self.host, endpoints, &self.config, render) {
            Ok((stream, format)) => {
                info!(?endpoints, ?format, host = ?self.host, "audio device opened");
                *slot = Some(OpenStream {
                    endpoints,
                    format,
                    retired: retire_rx,
                    stream,
                });
                Ok(())
            }
            Err(err) => {
                warn!(%err, ?endpoints, host = ?self.host, "failed to open audio device");
                self.exchange.reset(TransportState::default());
                Err(err)
            }
        }
    }

    /// Stop and release the stream. Blocks until the audio thread has let go
    /// of the transport. No-op when already closed.
    ///
    /// The device is closed and its transport reset even when this returns
    /// an error; the error only reports that the backend did not stop cleanly.
    pub fn close_device(&self) -> DeviceResult<()> {
        let mut slot = self.lock_stream();
        match slot.take() {
            Some(open) => self.shut_down(open),
            None => {
                debug!("close requested on a closed device");
                Ok(())
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.lock_stream().is_some()
    }

    /// Devices of the open stream
    pub fn endpoints(&self) -> Option<Endpoints> {
        self.lock_stream().as_ref().map(|open| open.endpoints)
    }

    /// Format of the open stream
    pub fn format(&self) -> Option<StreamFormat> {
        self.lock_stream().as_ref().map(|open| open.format)
    }

    pub fn host(&self) -> Option<usize> {
        self.host
    }

    /// Latest published transport state.
    pub fn view(&self) -> TransportView {
        self.exchange.current_view()
    }

    pub fn is_playing(&self) -> bool {
        self.view().is_playing()
    }

    pub fn playback_position(&self) -> i64 {
        self.view().playback_position()
    }

    /// Queue a command for the audio thread. See [`StateExchange::post`].
    ///
    /// A closed device has no audio thread to run commands, so they are
    /// handed back in [`PostError::Closed`]. Waits for an open or close in
    /// progress, never for the audio thread.
    pub fn post(&self, command: Command) -> Result<(), PostError<Command>> {
        let mut slot = self.lock_stream();
        let Some(open) = slot.as_mut() else {
            return Err(PostError::Closed(command));
        };
        collect_retired(&mut open.retired);
        self.exchange.post(command)
    }

    pub fn play(&self, request: PlayRequest) -> Result<(), PostError<Command>> {
        self.post(Command::Play(request))
    }

    pub fn stop(&self) -> Result<(), PostError<Command>> {
        self.post(Command::Stop)
    }

    /// Read and clear the faults raised on the audio thread.
    pub fn take_faults(&self) -> FaultSet {
        self.exchange.faults().take()
    }

    pub fn exchange(&self) -> &TransportExchange {
        &self.exchange
    }

    fn shut_down(&self, open: OpenStream<B::Stream>) -> DeviceResult<()> {
        let OpenStream {
            endpoints,
            mut retired,
            stream,
            ..
        } = open;

        // Returns once the render callback, and the engine inside it, are gone
        let closed = self.backend.close_stream(stream);
        collect_retired(&mut retired);

        self.exchange.reset(TransportState::default());
        match &closed {
            Ok(()) => info!(?endpoints, "audio device closed"),
            Err(err) => warn!(%err, ?endpoints, "audio device closed with an error"),
        }
        closed
    }

    fn lock_stream(&self) -> MutexGuard<'_, Option<OpenStream<B::Stream>>> {
        self.stream.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<B: AudioBackend> fmt::Debug for AudioDevice<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioDevice")
            .field("host", &self.host)
            .field("endpoints", &self.endpoints())
            .field("view", &self.view())
            .finish()
    }
}

impl<B: AudioBackend> Drop for AudioDevice<B> {
    fn drop(&mut self) {
        // Already logged by `shut_down`
        let _ = self.close_device();
    }
}

/// Drop requests the audio thread is done with.
fn collect_retired(retired: &mut Consumer<PlayRequest>) {
    while let Ok(request) = retired.pop() {
        drop(request);
    }
}
